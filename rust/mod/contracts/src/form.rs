//! Validation and normalization of contract and ledger form payloads.
//!
//! A record built here is ready to bind: dates are `YYYY-MM-DD`, money is
//! rounded to cents, derived amounts are filled in. Building never touches
//! storage.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use coopdesk_core::{FieldErrors, ServiceError};

use crate::model::{ContractInput, EstadoPago, LedgerInput, LedgerStatus, Periodo};
use crate::normalize::{
    derive_iva, derive_total, effective_iva_percent, exceeds_limit, normalize_amount,
    normalize_opt_amount, normalize_opt_date, resolve_service_ids, supplied_or,
};

/// Longest accepted termination note, in characters.
pub const MAX_TERMINACION_CHARS: usize = 255;

/// Ledger entries derive IVA at this fixed rate.
pub const LEDGER_IVA_PERCENT: Decimal = Decimal::from_parts(15, 0, 0, false, 0);

const AMOUNT_TOO_LARGE: &str = "El monto supera el máximo permitido";

/// A validated, normalized contract ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractRecord {
    pub id_cooperativa: i64,
    pub id_servicio: i64,
    /// Never empty; always contains `id_servicio`.
    pub servicios_ids: Vec<i64>,
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
    pub documento_contrato: Option<String>,
    pub observaciones: Option<String>,
    pub codigo_red: Option<String>,
}

impl ContractRecord {
    /// Validate `input` for a create.
    pub fn for_create(input: &ContractInput) -> Result<Self, ServiceError> {
        Self::build(input, false)
    }

    /// Validate `input` for an update; the caller's `version` is required.
    pub fn for_update(input: &ContractInput) -> Result<Self, ServiceError> {
        Self::build(input, true)
    }

    fn build(input: &ContractInput, require_version: bool) -> Result<Self, ServiceError> {
        let mut errors = FieldErrors::new();

        if input.id_cooperativa <= 0 {
            errors.add("id_cooperativa", "Seleccione una cooperativa");
        }

        // The primary service falls back to the first listed one.
        let primary = if input.id_servicio > 0 {
            input.id_servicio
        } else {
            input.servicios_ids.iter().copied().find(|id| *id > 0).unwrap_or(0)
        };
        if primary <= 0 {
            errors.add("id_servicio", "Seleccione al menos un servicio");
        }

        let periodo_facturacion = parse_periodo(
            input.periodo_facturacion.as_deref(),
            "periodo_facturacion",
            "Periodo de facturación inválido",
            &mut errors,
        );
        let tipo_contrato = parse_periodo(
            input.tipo_contrato.as_deref(),
            "tipo_contrato",
            "Tipo de contrato inválido",
            &mut errors,
        );

        let terminacion = trimmed(input.terminacion.as_deref()).unwrap_or_default();
        if terminacion.chars().count() > MAX_TERMINACION_CHARS {
            errors.add("terminacion", "La terminación no puede superar 255 caracteres");
        }

        let estado_pago = match trimmed(input.estado_pago.as_deref()) {
            None => EstadoPago::Pendiente,
            Some(s) => EstadoPago::from_str(&s).unwrap_or_else(|| {
                errors.add("estado_pago", "Estado de pago inválido");
                EstadoPago::Pendiente
            }),
        };

        let valor_base = normalize_amount(input.valor_base.as_deref().unwrap_or_default());
        if valor_base <= Decimal::ZERO {
            errors.add("valor_base", "El valor base debe ser mayor a 0");
        }
        check_limit(&mut errors, "valor_base", Some(valor_base));

        let iva_supplied = normalize_opt_amount(input.iva_porcentaje.as_deref());
        if iva_supplied.is_some_and(|p| p > Decimal::ONE_HUNDRED) {
            errors.add("iva_porcentaje", "El porcentaje de IVA no puede superar 100");
        }
        let valor_iva = normalize_opt_amount(input.valor_iva.as_deref());
        let valor_total = normalize_opt_amount(input.valor_total.as_deref());
        check_limit(&mut errors, "valor_iva", valor_iva);
        check_limit(&mut errors, "valor_total", valor_total);

        let valor_individual = normalize_opt_amount(input.valor_individual.as_deref());
        let valor_grupal = normalize_opt_amount(input.valor_grupal.as_deref());
        if valor_individual.is_some_and(|v| v < Decimal::ZERO) {
            errors.add("valor_individual", "El valor individual no puede ser negativo");
        }
        if valor_grupal.is_some_and(|v| v < Decimal::ZERO) {
            errors.add("valor_grupal", "El valor grupal no puede ser negativo");
        }
        check_limit(&mut errors, "valor_individual", valor_individual);
        check_limit(&mut errors, "valor_grupal", valor_grupal);

        if input.numero_licencias.is_some_and(|n| n < 0) {
            errors.add("numero_licencias", "El número de licencias no puede ser negativo");
        }

        if require_version && input.version.is_none_or(|v| v <= 0) {
            errors.add("version", "Falta la versión del contrato que se está editando");
        }

        errors.into_result()?;

        let iva_porcentaje = effective_iva_percent(iva_supplied);
        let valor_iva = supplied_or(valor_iva, || derive_iva(valor_base, iva_porcentaje))
            .ok_or_else(|| too_large("valor_iva"))?;
        let valor_total = supplied_or(valor_total, || derive_total(valor_base, valor_iva))
            .ok_or_else(|| too_large("valor_total"))?;

        Ok(Self {
            id_cooperativa: input.id_cooperativa,
            id_servicio: primary,
            servicios_ids: resolve_service_ids(&input.servicios_ids, primary),
            // Both are Some: a missing value recorded an error above.
            periodo_facturacion: periodo_facturacion.unwrap_or(Periodo::Mensual),
            tipo_contrato: tipo_contrato.unwrap_or(Periodo::Mensual),
            terminacion,
            estado_pago,
            activo: input.activo,
            fecha_contratacion: normalize_opt_date(input.fecha_contratacion.as_deref()),
            fecha_caducidad: normalize_opt_date(input.fecha_caducidad.as_deref()),
            fecha_desvinculacion: normalize_opt_date(input.fecha_desvinculacion.as_deref()),
            fecha_fin: normalize_opt_date(input.fecha_fin.as_deref()),
            fecha_ultimo_pago: normalize_opt_date(input.fecha_ultimo_pago.as_deref()),
            valor_base,
            iva_porcentaje,
            valor_iva,
            valor_total,
            valor_individual,
            valor_grupal,
            numero_licencias: input.numero_licencias,
            documento_contrato: trimmed(input.documento_contrato.as_deref()),
            observaciones: trimmed(input.observaciones.as_deref()),
            codigo_red: trimmed(input.codigo_red.as_deref()),
        })
    }
}

/// A validated, normalized ledger entry ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRecord {
    pub id_cooperativa: i64,
    pub id_contrato: Option<i64>,
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
}

impl LedgerRecord {
    pub fn from_input(input: &LedgerInput) -> Result<Self, ServiceError> {
        let mut errors = FieldErrors::new();

        if input.id_cooperativa <= 0 {
            errors.add("id_cooperativa", "Seleccione una cooperativa");
        }

        let periodo = trimmed(input.periodo.as_deref()).unwrap_or_default();
        if periodo.is_empty() {
            errors.add("periodo", "El periodo es obligatorio");
        }

        let fecha_emision = normalize_opt_date(input.fecha_emision.as_deref());
        if fecha_emision.is_none() {
            errors.add("fecha_emision", "La fecha de emisión es obligatoria");
        }

        let estado = match trimmed(input.estado.as_deref()) {
            None => LedgerStatus::Pendiente,
            Some(s) => LedgerStatus::from_str(&s).unwrap_or_else(|| {
                errors.add("estado", "Estado inválido");
                LedgerStatus::Pendiente
            }),
        };

        let monto_base = normalize_amount(input.monto_base.as_deref().unwrap_or_default());
        if monto_base < Decimal::ZERO {
            errors.add("monto_base", "El monto base no puede ser negativo");
        }
        let monto_iva = normalize_opt_amount(input.monto_iva.as_deref());
        let monto_total = normalize_opt_amount(input.monto_total.as_deref());
        check_limit(&mut errors, "monto_base", Some(monto_base));
        check_limit(&mut errors, "monto_iva", monto_iva);
        check_limit(&mut errors, "monto_total", monto_total);

        errors.into_result()?;

        let monto_iva = supplied_or(monto_iva, || derive_iva(monto_base, LEDGER_IVA_PERCENT))
            .ok_or_else(|| too_large("monto_iva"))?;
        let monto_total = supplied_or(monto_total, || derive_total(monto_base, monto_iva))
            .ok_or_else(|| too_large("monto_total"))?;

        let Some(fecha_emision) = fecha_emision else {
            return Err(ServiceError::Internal("fecha de emisión ausente".into()));
        };

        Ok(Self {
            id_cooperativa: input.id_cooperativa,
            id_contrato: input.id_contrato.filter(|id| *id > 0),
            periodo,
            fecha_emision,
            fecha_vencimiento: normalize_opt_date(input.fecha_vencimiento.as_deref()),
            fecha_pago: normalize_opt_date(input.fecha_pago.as_deref()),
            monto_base,
            monto_iva,
            monto_total,
            estado,
            comprobante: trimmed(input.comprobante.as_deref()),
            observaciones: trimmed(input.observaciones.as_deref()),
        })
    }
}

fn parse_periodo(
    raw: Option<&str>,
    field: &str,
    message: &str,
    errors: &mut FieldErrors,
) -> Option<Periodo> {
    let parsed = trimmed(raw).and_then(|s| Periodo::from_str(&s));
    if parsed.is_none() {
        errors.add(field, message);
    }
    parsed
}

fn check_limit(errors: &mut FieldErrors, field: &str, amount: Option<Decimal>) {
    if amount.is_some_and(exceeds_limit) {
        errors.add(field, AMOUNT_TOO_LARGE);
    }
}

fn too_large(field: &str) -> ServiceError {
    let mut errors = FieldErrors::new();
    errors.add(field, AMOUNT_TOO_LARGE);
    ServiceError::Validation(errors)
}

fn trimmed(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
