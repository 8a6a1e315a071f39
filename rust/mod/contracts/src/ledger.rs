use std::sync::Arc;

use tracing::{debug, info, warn};

use coopdesk_core::{Page, PageRequest, ServiceError, now_rfc3339};
use coopdesk_sql::{Filter, Predicate, SQLError, SQLStore, Value, contains_pattern};

use crate::contract::{amount_value, date_value};
use crate::form::LedgerRecord;
use crate::model::{LedgerFilters, LedgerInput, LedgerRow, LedgerStatus};
use crate::normalize::format_date;

const SELECT_COLUMNS: &str = "\
    h.id, h.id_cooperativa, co.nombre AS cooperativa, h.id_contrato, s.nombre AS servicio, \
    h.periodo, h.fecha_emision, h.fecha_vencimiento, h.fecha_pago, \
    h.monto_base, h.monto_iva, h.monto_total, h.estado, h.comprobante, h.observaciones, \
    h.created_at, h.updated_at";

const BASE_FROM: &str = "\
    FROM historial_pagos h \
    LEFT JOIN cooperativas co ON co.id = h.id_cooperativa \
    LEFT JOIN contratos c ON c.id = h.id_contrato \
    LEFT JOIN servicios s ON s.id = c.id_servicio";

const ORDER_BY: &str = "ORDER BY h.fecha_emision DESC, h.id DESC";

const TEXT_SEARCH: &str = "\
    fold(co.nombre) LIKE ? ESCAPE '\\' \
    OR fold(h.observaciones) LIKE ? ESCAPE '\\'";

/// Billing and payment events.
pub struct BillingLedger {
    db: Arc<dyn SQLStore>,
}

impl BillingLedger {
    /// The schema must already be migrated.
    pub fn new(db: Arc<dyn SQLStore>) -> Self {
        Self { db }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn paginate(
        &self,
        filters: &LedgerFilters,
        req: PageRequest,
    ) -> Result<Page<LedgerRow>, ServiceError> {
        let rendered = build_filter(filters).render(1);

        let count_sql = format!("SELECT COUNT(*) AS total {BASE_FROM} {}", rendered.clause);
        let total = self
            .db
            .query(&count_sql, &rendered.params)
            .map_err(read_error)?
            .first()
            .and_then(|r| r.get_i64("total"))
            .unwrap_or(0) as usize;

        debug!(
            "ledger search: {} params, {} matches",
            rendered.params.len(),
            total
        );
        if total == 0 {
            return Ok(Page::empty(req));
        }

        let page_sql = format!(
            "SELECT {SELECT_COLUMNS} {BASE_FROM} {} {ORDER_BY} LIMIT ?{} OFFSET ?{}",
            rendered.clause,
            rendered.next_index,
            rendered.next_index + 1
        );
        let mut params = rendered.params;
        params.push(Value::Integer(req.per_page() as i64));
        params.push(Value::Integer(req.offset() as i64));

        let items = self
            .db
            .query(&page_sql, &params)
            .map_err(read_error)?
            .iter()
            .map(LedgerRow::from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            items,
            total,
            page: req.page(),
            per_page: req.per_page(),
        })
    }

    /// Every entry of one contract, newest first.
    pub fn list_by_contrato(&self, id_contrato: i64) -> Result<Vec<LedgerRow>, ServiceError> {
        let sql = format!("SELECT {SELECT_COLUMNS} {BASE_FROM} WHERE h.id_contrato = ?1 {ORDER_BY}");
        self.db
            .query(&sql, &[Value::Integer(id_contrato)])
            .map_err(read_error)?
            .iter()
            .map(LedgerRow::from_row)
            .collect()
    }

    pub fn find(&self, id: i64) -> Result<Option<LedgerRow>, ServiceError> {
        let sql = format!("SELECT {SELECT_COLUMNS} {BASE_FROM} WHERE h.id = ?1");
        self.db
            .query(&sql, &[Value::Integer(id)])
            .map_err(read_error)?
            .first()
            .map(LedgerRow::from_row)
            .transpose()
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Validate and insert an entry. Returns the new id.
    pub fn create(&self, input: &LedgerInput) -> Result<i64, ServiceError> {
        let record = LedgerRecord::from_input(input).inspect_err(|e| {
            warn!("ledger create rejected: {}", e);
        })?;

        let mut params = bind(&record);
        params.push(Value::Text(now_rfc3339()));

        let id = self
            .db
            .query(
                "INSERT INTO historial_pagos (id_cooperativa, id_contrato, periodo, \
                 fecha_emision, fecha_vencimiento, fecha_pago, monto_base, monto_iva, \
                 monto_total, estado, comprobante, observaciones, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13) \
                 RETURNING id",
                &params,
            )
            .map_err(|e| write_error("No se pudo guardar el registro de pago", e))?
            .first()
            .and_then(|r| r.get_i64("id"))
            .ok_or_else(|| ServiceError::Internal("el registro insertado no devolvió id".into()))?;

        info!(
            "ledger entry {} created: {} {} ({})",
            id,
            record.periodo,
            format_date(record.fecha_emision),
            record.estado
        );
        Ok(id)
    }

    /// Validate and replace entry `id`. The stored receipt is kept unless a new
    /// one is supplied.
    pub fn update(&self, id: i64, input: &LedgerInput) -> Result<(), ServiceError> {
        let record = LedgerRecord::from_input(input).inspect_err(|e| {
            warn!("ledger entry {} update rejected: {}", id, e);
        })?;

        let mut params = bind(&record);
        params.push(Value::Text(now_rfc3339()));
        params.push(Value::Integer(id));

        let affected = self
            .db
            .exec(
                "UPDATE historial_pagos SET id_cooperativa = ?1, id_contrato = ?2, \
                 periodo = ?3, fecha_emision = ?4, fecha_vencimiento = ?5, fecha_pago = ?6, \
                 monto_base = ?7, monto_iva = ?8, monto_total = ?9, estado = ?10, \
                 comprobante = COALESCE(?11, comprobante), observaciones = ?12, \
                 updated_at = ?13 \
                 WHERE id = ?14",
                &params,
            )
            .map_err(|e| write_error("No se pudo actualizar el registro de pago", e))?;

        if affected == 0 {
            return Err(ServiceError::NotFound(format!("registro de pago {id}")));
        }
        info!("ledger entry {} updated ({})", id, record.estado);
        Ok(())
    }

    /// Delete entry `id`. Returns whether a row was removed.
    pub fn delete(&self, id: i64) -> Result<bool, ServiceError> {
        let affected = self
            .db
            .exec("DELETE FROM historial_pagos WHERE id = ?1", &[Value::Integer(id)])
            .map_err(|e| write_error("No se pudo eliminar el registro de pago", e))?;
        if affected > 0 {
            info!("ledger entry {} deleted", id);
        }
        Ok(affected > 0)
    }

    pub fn estados(&self) -> &'static [LedgerStatus] {
        &LedgerStatus::ALL
    }
}

fn read_error(e: SQLError) -> ServiceError {
    ServiceError::storage("No se pudo consultar el historial de pagos", e)
}

fn write_error(message: &str, e: SQLError) -> ServiceError {
    warn!("{}: {}", message, e);
    ServiceError::storage(message, e)
}

fn build_filter(filters: &LedgerFilters) -> Filter {
    let mut filter = Filter::new();
    if let Some(q) = filters.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let pattern = Value::Text(contains_pattern(q));
        filter.push(Predicate::Fragment(TEXT_SEARCH, vec![pattern.clone(), pattern]));
    }
    if let Some(cooperativa) = filters.cooperativa {
        filter.push(Predicate::Eq("h.id_cooperativa", Value::Integer(cooperativa)));
    }
    if let Some(contrato) = filters.contrato {
        filter.push(Predicate::Eq("h.id_contrato", Value::Integer(contrato)));
    }
    if let Some(estado) = filters.estado {
        filter.push(Predicate::Eq("h.estado", Value::from(estado.as_str())));
    }
    if let Some(desde) = filters.desde {
        filter.push(Predicate::AtLeast("h.fecha_emision", Value::Text(format_date(desde))));
    }
    if let Some(hasta) = filters.hasta {
        filter.push(Predicate::AtMost("h.fecha_emision", Value::Text(format_date(hasta))));
    }
    filter
}

/// Parameters `?1..?12` shared by insert and update.
fn bind(record: &LedgerRecord) -> Vec<Value> {
    vec![
        Value::Integer(record.id_cooperativa),
        record.id_contrato.into(),
        Value::from(record.periodo.as_str()),
        Value::Text(format_date(record.fecha_emision)),
        date_value(record.fecha_vencimiento),
        date_value(record.fecha_pago),
        amount_value(record.monto_base),
        amount_value(record.monto_iva),
        amount_value(record.monto_total),
        Value::from(record.estado.as_str()),
        record.comprobante.clone().into(),
        record.observaciones.clone().into(),
    ]
}
