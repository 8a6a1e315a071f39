use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use coopdesk_core::ServiceError;
use coopdesk_sql::Row;

use crate::normalize::{normalize_date, parse_stored_amount};

// ---------------------------------------------------------------------------
// Fixed catalogs
// ---------------------------------------------------------------------------

/// Payment state of a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EstadoPago {
    Pendiente,
    Pagado,
    Vencido,
    Anulado,
}

impl EstadoPago {
    /// Canonical validation set for `estado_pago`.
    pub const ALL: [EstadoPago; 4] = [Self::Pendiente, Self::Pagado, Self::Vencido, Self::Anulado];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pendiente => "PENDIENTE",
            Self::Pagado => "PAGADO",
            Self::Vencido => "VENCIDO",
            Self::Anulado => "ANULADO",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDIENTE" => Some(Self::Pendiente),
            "PAGADO" => Some(Self::Pagado),
            "VENCIDO" => Some(Self::Vencido),
            "ANULADO" => Some(Self::Anulado),
            _ => None,
        }
    }
}

impl std::fmt::Display for EstadoPago {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Billing period and contract type share this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Periodo {
    Mensual,
    Trimestral,
    Semestral,
    Anual,
    Indefinido,
}

impl Periodo {
    pub const ALL: [Periodo; 5] = [
        Self::Mensual,
        Self::Trimestral,
        Self::Semestral,
        Self::Anual,
        Self::Indefinido,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mensual => "Mensual",
            Self::Trimestral => "Trimestral",
            Self::Semestral => "Semestral",
            Self::Anual => "Anual",
            Self::Indefinido => "Indefinido",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == s)
    }
}

impl std::fmt::Display for Periodo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a ledger entry.
///
/// Any status may follow any other; no transition is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerStatus {
    Pendiente,
    Pagado,
    Vencido,
    Parcial,
    Anulado,
}

impl LedgerStatus {
    pub const ALL: [LedgerStatus; 5] = [
        Self::Pendiente,
        Self::Pagado,
        Self::Vencido,
        Self::Parcial,
        Self::Anulado,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pendiente => "pendiente",
            Self::Pagado => "pagado",
            Self::Vencido => "vencido",
            Self::Parcial => "parcial",
            Self::Anulado => "anulado",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.as_str() == s)
    }

    /// Still owed money: counts toward the pending/overdue dashboard figure.
    pub fn is_outstanding(&self) -> bool {
        matches!(self, Self::Pendiente | Self::Vencido)
    }
}

impl std::fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Reference data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Servicio {
    pub id: i64,
    pub nombre: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Red {
    pub codigo: String,
    pub nombre: String,
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// A service linked to a contract through the pivot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceRef {
    pub id: i64,
    pub nombre: String,
}

/// Ledger activity for one contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LedgerSummary {
    pub registros: i64,
    pub ultimo_estado: Option<LedgerStatus>,
}

/// A contract as returned by `find` and `paginate`, with its linked services
/// and ledger summary.
#[derive(Debug, Clone, Serialize)]
pub struct ContractRow {
    pub id: i64,
    pub version: i64,
    pub id_cooperativa: i64,
    pub cooperativa: String,
    pub id_servicio: i64,
    pub servicio: Option<String>,
    pub servicios: Vec<ServiceRef>,
    pub servicios_label: String,
    pub periodo_facturacion: Periodo,
    pub tipo_contrato: Periodo,
    pub terminacion: String,
    pub estado_pago: EstadoPago,
    pub activo: bool,
    pub fecha_contratacion: Option<NaiveDate>,
    pub fecha_caducidad: Option<NaiveDate>,
    pub fecha_desvinculacion: Option<NaiveDate>,
    pub fecha_fin: Option<NaiveDate>,
    pub fecha_ultimo_pago: Option<NaiveDate>,
    pub valor_base: Decimal,
    pub iva_porcentaje: Decimal,
    pub valor_iva: Decimal,
    pub valor_total: Decimal,
    pub valor_individual: Option<Decimal>,
    pub valor_grupal: Option<Decimal>,
    pub numero_licencias: Option<i64>,
    pub documento_contrato: String,
    pub observaciones: Option<String>,
    /// The contract's own network code, if any.
    pub codigo_red: Option<String>,
    /// Network in effect: the contract's own, else the cooperativa's.
    pub red_codigo: Option<String>,
    pub red_nombre: Option<String>,
    pub historial: LedgerSummary,
    pub created_at: String,
    pub updated_at: String,
}

impl ContractRow {
    pub(crate) fn from_row(row: &Row) -> Result<Self, ServiceError> {
        Ok(Self {
            id: int_col(row, "id")?,
            version: row.get_i64("version").unwrap_or(1),
            id_cooperativa: int_col(row, "id_cooperativa")?,
            cooperativa: row.get_string("cooperativa").unwrap_or_default(),
            id_servicio: int_col(row, "id_servicio")?,
            servicio: row.get_string("servicio"),
            servicios: Vec::new(),
            servicios_label: String::new(),
            periodo_facturacion: enum_col(row, "periodo_facturacion", Periodo::from_str)?,
            tipo_contrato: enum_col(row, "tipo_contrato", Periodo::from_str)?,
            terminacion: row.get_string("terminacion").unwrap_or_default(),
            estado_pago: enum_col(row, "estado_pago", EstadoPago::from_str)?,
            activo: row.get_i64("activo").unwrap_or(0) != 0,
            fecha_contratacion: date_col(row, "fecha_contratacion"),
            fecha_caducidad: date_col(row, "fecha_caducidad"),
            fecha_desvinculacion: date_col(row, "fecha_desvinculacion"),
            fecha_fin: date_col(row, "fecha_fin"),
            fecha_ultimo_pago: date_col(row, "fecha_ultimo_pago"),
            valor_base: amount_col(row, "valor_base"),
            iva_porcentaje: amount_col(row, "iva_porcentaje"),
            valor_iva: amount_col(row, "valor_iva"),
            valor_total: amount_col(row, "valor_total"),
            valor_individual: opt_amount_col(row, "valor_individual"),
            valor_grupal: opt_amount_col(row, "valor_grupal"),
            numero_licencias: row.get_i64("numero_licencias"),
            documento_contrato: row.get_string("documento_contrato").unwrap_or_default(),
            observaciones: row.get_string("observaciones"),
            codigo_red: row.get_string("codigo_red"),
            red_codigo: row.get_string("red_codigo"),
            red_nombre: row.get_string("red_nombre"),
            historial: LedgerSummary::default(),
            created_at: row.get_string("created_at").unwrap_or_default(),
            updated_at: row.get_string("updated_at").unwrap_or_default(),
        })
    }
}

/// Contract form payload.
///
/// Scalars arrive the way an HTML form or JSON body sends them: numbers may
/// be strings, money may carry separators, dates may be in any accepted
/// shape. Normalization happens in [`crate::form`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContractInput {
    #[serde(deserialize_with = "lenient::int")]
    pub id_cooperativa: i64,
    /// Primary service; also the fallback member when `servicios_ids` is empty.
    #[serde(deserialize_with = "lenient::int")]
    pub id_servicio: i64,
    #[serde(deserialize_with = "lenient::int_list")]
    pub servicios_ids: Vec<i64>,
    #[serde(deserialize_with = "lenient::text")]
    pub periodo_facturacion: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub tipo_contrato: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub terminacion: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub estado_pago: Option<String>,
    #[serde(deserialize_with = "lenient::flag")]
    pub activo: bool,
    #[serde(deserialize_with = "lenient::text")]
    pub fecha_contratacion: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub fecha_caducidad: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub fecha_desvinculacion: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub fecha_fin: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub fecha_ultimo_pago: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub valor_base: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub iva_porcentaje: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub valor_iva: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub valor_total: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub valor_individual: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub valor_grupal: Option<String>,
    #[serde(deserialize_with = "lenient::opt_int")]
    pub numero_licencias: Option<i64>,
    /// Path returned by upload storage. `None` or empty keeps the stored one on update.
    #[serde(deserialize_with = "lenient::text")]
    pub documento_contrato: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub observaciones: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub codigo_red: Option<String>,
    /// Version read by the caller; required on update.
    #[serde(deserialize_with = "lenient::opt_int")]
    pub version: Option<i64>,
}

/// Contract search filters. Absent fields add no predicate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ContractFilters {
    pub q: Option<String>,
    pub estado: Option<EstadoPago>,
    /// Matches the primary service or any pivot member.
    pub servicio: Option<i64>,
    /// Matches the contract's network code, or the cooperativa's when the
    /// contract has none.
    pub red: Option<String>,
    pub activo: Option<bool>,
}

impl ContractFilters {
    /// Build from a request map. Unknown keys and unusable values are ignored.
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        Self {
            q: non_blank(map.get("q")),
            estado: non_blank(map.get("estado")).and_then(|s| EstadoPago::from_str(&s)),
            servicio: positive_int(map.get("servicio")),
            red: non_blank(map.get("red")),
            activo: match map.get("activo").map(|s| s.trim()) {
                Some("1") => Some(true),
                Some("0") => Some(false),
                _ => None,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// A billing/payment event.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerRow {
    pub id: i64,
    pub id_cooperativa: i64,
    pub cooperativa: String,
    pub id_contrato: Option<i64>,
    /// Primary service of the referenced contract.
    pub servicio: Option<String>,
    pub periodo: String,
    pub fecha_emision: NaiveDate,
    pub fecha_vencimiento: Option<NaiveDate>,
    pub fecha_pago: Option<NaiveDate>,
    pub monto_base: Decimal,
    pub monto_iva: Decimal,
    pub monto_total: Decimal,
    pub estado: LedgerStatus,
    pub comprobante: Option<String>,
    pub observaciones: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl LedgerRow {
    pub(crate) fn from_row(row: &Row) -> Result<Self, ServiceError> {
        Ok(Self {
            id: int_col(row, "id")?,
            id_cooperativa: int_col(row, "id_cooperativa")?,
            cooperativa: row.get_string("cooperativa").unwrap_or_default(),
            id_contrato: row.get_i64("id_contrato"),
            servicio: row.get_string("servicio"),
            periodo: row.get_string("periodo").unwrap_or_default(),
            fecha_emision: date_col(row, "fecha_emision").ok_or_else(|| {
                ServiceError::Internal("registro de pago sin fecha de emisión".into())
            })?,
            fecha_vencimiento: date_col(row, "fecha_vencimiento"),
            fecha_pago: date_col(row, "fecha_pago"),
            monto_base: amount_col(row, "monto_base"),
            monto_iva: amount_col(row, "monto_iva"),
            monto_total: amount_col(row, "monto_total"),
            estado: enum_col(row, "estado", LedgerStatus::from_str)?,
            comprobante: row.get_string("comprobante"),
            observaciones: row.get_string("observaciones"),
            created_at: row.get_string("created_at").unwrap_or_default(),
            updated_at: row.get_string("updated_at").unwrap_or_default(),
        })
    }
}

/// Ledger form payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LedgerInput {
    #[serde(deserialize_with = "lenient::int")]
    pub id_cooperativa: i64,
    /// Zero or absent means the entry is not tied to a contract.
    #[serde(deserialize_with = "lenient::opt_int")]
    pub id_contrato: Option<i64>,
    #[serde(deserialize_with = "lenient::text")]
    pub periodo: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub fecha_emision: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub fecha_vencimiento: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub fecha_pago: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub monto_base: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub monto_iva: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub monto_total: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub estado: Option<String>,
    /// Path of a freshly stored receipt. `None` keeps the stored one on update.
    #[serde(deserialize_with = "lenient::text")]
    pub comprobante: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub observaciones: Option<String>,
}

/// Ledger search filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LedgerFilters {
    /// Matches cooperativa name or observations.
    pub q: Option<String>,
    pub cooperativa: Option<i64>,
    pub contrato: Option<i64>,
    pub estado: Option<LedgerStatus>,
    /// Inclusive lower bound on issue date.
    pub desde: Option<NaiveDate>,
    /// Inclusive upper bound on issue date.
    pub hasta: Option<NaiveDate>,
}

impl LedgerFilters {
    /// Build from a request map. Unknown keys and unusable values are ignored.
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        Self {
            q: non_blank(map.get("q")),
            cooperativa: positive_int(map.get("cooperativa")),
            contrato: positive_int(map.get("contrato")),
            estado: non_blank(map.get("estado")).and_then(|s| LedgerStatus::from_str(&s)),
            desde: map.get("desde").and_then(|s| normalize_date(s)),
            hasta: map.get("hasta").and_then(|s| normalize_date(s)),
        }
    }
}

// ---------------------------------------------------------------------------
// Row decoding helpers
// ---------------------------------------------------------------------------

fn int_col(row: &Row, name: &str) -> Result<i64, ServiceError> {
    row.get_i64(name)
        .ok_or_else(|| ServiceError::Internal(format!("columna {name} ausente")))
}

fn enum_col<T>(row: &Row, name: &str, parse: fn(&str) -> Option<T>) -> Result<T, ServiceError> {
    let raw = row.get_str(name).unwrap_or_default();
    parse(raw).ok_or_else(|| ServiceError::Internal(format!("valor desconocido en {name}: {raw:?}")))
}

fn date_col(row: &Row, name: &str) -> Option<NaiveDate> {
    row.get_str(name)
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

fn amount_col(row: &Row, name: &str) -> Decimal {
    row.get_str(name).map(parse_stored_amount).unwrap_or_default()
}

fn opt_amount_col(row: &Row, name: &str) -> Option<Decimal> {
    row.get_str(name)
        .filter(|s| !s.is_empty())
        .map(parse_stored_amount)
}

fn non_blank(v: Option<&String>) -> Option<String> {
    v.map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn positive_int(v: Option<&String>) -> Option<i64> {
    v.and_then(|s| s.trim().parse::<i64>().ok()).filter(|n| *n > 0)
}

/// Deserializers that accept what HTML forms and loose JSON send.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    fn to_text(v: Value) -> Option<String> {
        match v {
            Value::Null => None,
            Value::String(s) => Some(s),
            Value::Bool(b) => Some(if b { "1".into() } else { "0".into() }),
            Value::Number(n) => Some(n.to_string()),
            other => Some(other.to_string()),
        }
    }

    fn to_int(v: Value) -> Option<i64> {
        match v {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            Value::Bool(b) => Some(b as i64),
            _ => None,
        }
    }

    pub fn text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(Option::<Value>::deserialize(d)?.and_then(to_text))
    }

    pub fn int<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        Ok(Option::<Value>::deserialize(d)?.and_then(to_int).unwrap_or(0))
    }

    pub fn opt_int<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        Ok(Option::<Value>::deserialize(d)?.and_then(to_int))
    }

    pub fn int_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<i64>, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::Array(items)) => items.into_iter().filter_map(to_int).collect(),
            Some(Value::String(s)) => s
                .split(',')
                .filter_map(|p| p.trim().parse().ok())
                .collect(),
            Some(other) => to_int(other).into_iter().collect(),
            None => Vec::new(),
        })
    }

    pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::Bool(b)) => b,
            Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
            Some(Value::String(s)) => matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "1" | "on" | "true" | "si" | "sí"
            ),
            _ => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogs_round_trip_through_strings() {
        for e in EstadoPago::ALL {
            assert_eq!(EstadoPago::from_str(e.as_str()), Some(e));
        }
        for p in Periodo::ALL {
            assert_eq!(Periodo::from_str(p.as_str()), Some(p));
        }
        for s in LedgerStatus::ALL {
            assert_eq!(LedgerStatus::from_str(s.as_str()), Some(s));
        }
        assert_eq!(EstadoPago::from_str("pagado"), None);
        assert_eq!(LedgerStatus::from_str("PAGADO"), None);
    }

    #[test]
    fn contract_input_accepts_form_shapes() {
        let input: ContractInput = serde_json::from_value(serde_json::json!({
            "id_cooperativa": "12",
            "id_servicio": 3,
            "servicios_ids": ["3", 4, "x", "4"],
            "activo": "on",
            "valor_base": 100.5,
            "numero_licencias": "",
            "observaciones": null,
            "campo_desconocido": "ignored"
        }))
        .unwrap();
        assert_eq!(input.id_cooperativa, 12);
        assert_eq!(input.id_servicio, 3);
        assert_eq!(input.servicios_ids, vec![3, 4, 4]);
        assert!(input.activo);
        assert_eq!(input.valor_base.as_deref(), Some("100.5"));
        assert_eq!(input.numero_licencias, None);
        assert_eq!(input.observaciones, None);
        assert_eq!(input.version, None);
    }

    #[test]
    fn comma_separated_service_ids() {
        let input: ContractInput =
            serde_json::from_value(serde_json::json!({"servicios_ids": "1, 2,3"})).unwrap();
        assert_eq!(input.servicios_ids, vec![1, 2, 3]);
    }

    #[test]
    fn contract_filters_from_map_ignore_noise() {
        let map: HashMap<String, String> = [
            ("q", "  jardín "),
            ("estado", "PAGADO"),
            ("servicio", "abc"),
            ("red", ""),
            ("activo", "yes"),
            ("otro", "1"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let filters = ContractFilters::from_map(&map);
        assert_eq!(filters.q.as_deref(), Some("jardín"));
        assert_eq!(filters.estado, Some(EstadoPago::Pagado));
        assert_eq!(filters.servicio, None);
        assert_eq!(filters.red, None);
        assert_eq!(filters.activo, None);
    }

    #[test]
    fn ledger_filters_from_map() {
        let map: HashMap<String, String> = [
            ("cooperativa", "5"),
            ("estado", "parcial"),
            ("desde", "01/02/2024"),
            ("hasta", "not-a-date"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let filters = LedgerFilters::from_map(&map);
        assert_eq!(filters.cooperativa, Some(5));
        assert_eq!(filters.estado, Some(LedgerStatus::Parcial));
        assert_eq!(filters.desde, NaiveDate::from_ymd_opt(2024, 2, 1));
        assert_eq!(filters.hasta, None);
    }
}
