use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

// ── Error codes ─────────────────────────────────────────────────────
//
// Stable, machine-readable identifiers. Callers match on these,
// never on the human-readable message string.

/// Stable error code constants.
pub mod error_code {
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const CONFLICT: &str = "CONFLICT";
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const INTERNAL: &str = "INTERNAL";
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
}

/// Boxed cause carried by storage failures.
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

// ── FieldErrors ─────────────────────────────────────────────────────

/// Field name → user-facing message, collected while validating a form.
///
/// Serializes as a flat JSON object so a controller can hand it back to the
/// form renderer unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message for `field`. The first message per field wins.
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_insert_with(|| message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `Ok(())` when nothing was recorded, otherwise a validation error.
    pub fn into_result(self) -> Result<(), ServiceError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::Validation(self))
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}: {v}")).collect();
        f.write_str(&parts.join("; "))
    }
}

// ── ServiceError ────────────────────────────────────────────────────

/// Unified service error type used across all modules.
///
/// `Storage` keeps the user-safe message separate from the underlying cause:
/// `Display` shows only the message, `source()` yields the cause for logs.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Caller-supplied data failed a precondition. Nothing was written.
    #[error("{0}")]
    Validation(FieldErrors),

    /// The row exists but was changed by someone else since it was read.
    #[error("{0}")]
    Conflict(String),

    /// The target of a write does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Data-access failure. Any open transaction was rolled back.
    #[error("{message}")]
    Storage {
        message: String,
        #[source]
        source: Cause,
    },

    /// Unexpected internal error.
    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    /// Wrap a data-access failure with a user-safe message.
    pub fn storage(message: impl Into<String>, source: impl Into<Cause>) -> Self {
        ServiceError::Storage {
            message: message.into(),
            source: source.into(),
        }
    }

    /// Stable, machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => error_code::VALIDATION_FAILED,
            ServiceError::Conflict(_) => error_code::CONFLICT,
            ServiceError::NotFound(_) => error_code::NOT_FOUND,
            ServiceError::Storage { .. } => error_code::STORAGE_ERROR,
            ServiceError::Internal(_) => error_code::INTERNAL,
        }
    }

    /// Field errors, when this is a validation failure.
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            ServiceError::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn error_code_mapping() {
        assert_eq!(ServiceError::Validation(FieldErrors::new()).error_code(), "VALIDATION_FAILED");
        assert_eq!(ServiceError::Conflict("x".into()).error_code(), "CONFLICT");
        assert_eq!(ServiceError::NotFound("x".into()).error_code(), "NOT_FOUND");
        assert_eq!(ServiceError::storage("x", "io").error_code(), "STORAGE_ERROR");
        assert_eq!(ServiceError::Internal("x".into()).error_code(), "INTERNAL");
    }

    #[test]
    fn storage_display_hides_cause() {
        let err = ServiceError::storage("No se pudo guardar el contrato", "UNIQUE constraint failed");
        assert_eq!(err.to_string(), "No se pudo guardar el contrato");
        let cause = err.source().unwrap();
        assert_eq!(cause.to_string(), "UNIQUE constraint failed");
    }

    #[test]
    fn field_errors_first_message_wins() {
        let mut errors = FieldErrors::new();
        errors.add("valor_base", "El valor base debe ser mayor a 0");
        errors.add("valor_base", "otro");
        errors.add("id_cooperativa", "Seleccione una cooperativa");
        assert_eq!(errors.len(), 2);
        assert_eq!(errors.get("valor_base"), Some("El valor base debe ser mayor a 0"));

        let err = errors.into_result().unwrap_err();
        assert_eq!(
            err.to_string(),
            "id_cooperativa: Seleccione una cooperativa; valor_base: El valor base debe ser mayor a 0"
        );
        assert!(err.field_errors().unwrap().contains("id_cooperativa"));
    }

    #[test]
    fn field_errors_serialize_flat() {
        let mut errors = FieldErrors::new();
        errors.add("periodo", "requerido");
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json, serde_json::json!({"periodo": "requerido"}));
    }

    #[test]
    fn empty_field_errors_is_ok() {
        assert!(FieldErrors::new().into_result().is_ok());
    }
}
