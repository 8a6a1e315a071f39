use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use coopdesk_core::{Page, PageRequest, ServiceError, now_rfc3339};
use coopdesk_sql::{
    Filter, Predicate, SQLError, SQLStore, Value, contains_pattern, in_transaction,
    numbered_list,
};

use crate::form::ContractRecord;
use crate::model::{
    ContractFilters, ContractInput, ContractRow, EstadoPago, LedgerStatus, LedgerSummary,
    Periodo, Red, ServiceRef, Servicio,
};
use crate::normalize::{format_amount, format_date};
use crate::service_link;

const SELECT_COLUMNS: &str = "\
    c.id, c.version, c.id_cooperativa, co.nombre AS cooperativa, \
    c.id_servicio, s.nombre AS servicio, \
    c.periodo_facturacion, c.tipo_contrato, c.terminacion, c.estado_pago, c.activo, \
    c.fecha_contratacion, c.fecha_caducidad, c.fecha_desvinculacion, c.fecha_fin, \
    c.fecha_ultimo_pago, \
    c.valor_base, c.iva_porcentaje, c.valor_iva, c.valor_total, \
    c.valor_individual, c.valor_grupal, c.numero_licencias, \
    c.documento_contrato, c.observaciones, c.codigo_red, \
    COALESCE(NULLIF(c.codigo_red, ''), co.codigo_red) AS red_codigo, r.nombre AS red_nombre, \
    c.created_at, c.updated_at";

const BASE_FROM: &str = "\
    FROM contratos c \
    LEFT JOIN cooperativas co ON co.id = c.id_cooperativa \
    LEFT JOIN servicios s ON s.id = c.id_servicio \
    LEFT JOIN redes r ON r.codigo = COALESCE(NULLIF(c.codigo_red, ''), co.codigo_red)";

/// Cooperativa name, then the comma-joined label of linked services (the
/// primary service name when nothing is linked), then id.
const ORDER_BY: &str = "\
    ORDER BY co.nombre, \
    COALESCE((SELECT group_concat(os.nombre, ', ' ORDER BY os.nombre, os.id) \
              FROM contrato_servicios ocs JOIN servicios os ON os.id = ocs.id_servicio \
              WHERE ocs.id_contrato = c.id), s.nombre), \
    c.id";

const TEXT_SEARCH: &str = "\
    fold(co.nombre) LIKE ? ESCAPE '\\' \
    OR fold(s.nombre) LIKE ? ESCAPE '\\' \
    OR EXISTS (SELECT 1 FROM contrato_servicios qcs \
               JOIN servicios qs ON qs.id = qcs.id_servicio \
               WHERE qcs.id_contrato = c.id AND fold(qs.nombre) LIKE ? ESCAPE '\\')";

const SERVICE_MEMBER: &str = "\
    c.id_servicio = ? \
    OR EXISTS (SELECT 1 FROM contrato_servicios fcs \
               WHERE fcs.id_contrato = c.id AND fcs.id_servicio = ?)";

const INSERT_SQL: &str = "\
    INSERT INTO contratos (\
        id_cooperativa, id_servicio, periodo_facturacion, tipo_contrato, terminacion, \
        estado_pago, activo, fecha_contratacion, fecha_caducidad, fecha_desvinculacion, \
        fecha_fin, fecha_ultimo_pago, valor_base, iva_porcentaje, valor_iva, valor_total, \
        valor_individual, valor_grupal, numero_licencias, documento_contrato, \
        observaciones, codigo_red, created_at, updated_at) \
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, \
            ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?23) \
    RETURNING id";

const UPDATE_SQL: &str = "\
    UPDATE contratos SET \
        id_cooperativa = ?1, id_servicio = ?2, periodo_facturacion = ?3, \
        tipo_contrato = ?4, terminacion = ?5, estado_pago = ?6, activo = ?7, \
        fecha_contratacion = ?8, fecha_caducidad = ?9, fecha_desvinculacion = ?10, \
        fecha_fin = ?11, fecha_ultimo_pago = ?12, valor_base = ?13, iva_porcentaje = ?14, \
        valor_iva = ?15, valor_total = ?16, valor_individual = ?17, valor_grupal = ?18, \
        numero_licencias = ?19, documento_contrato = ?20, observaciones = ?21, \
        codigo_red = ?22, updated_at = ?23, version = version + 1 \
    WHERE id = ?24 AND version = ?25";

/// Contracts and their service links.
pub struct ContractStore {
    db: Arc<dyn SQLStore>,
}

impl ContractStore {
    /// The schema must already be migrated.
    pub fn new(db: Arc<dyn SQLStore>) -> Self {
        Self { db }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// One page of contracts matching `filters`, plus the total match count.
    ///
    /// Rows are ordered by cooperativa name, then by `servicios_label`.
    pub fn paginate(
        &self,
        filters: &ContractFilters,
        req: PageRequest,
    ) -> Result<Page<ContractRow>, ServiceError> {
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
            "contract search: {} params, {} matches",
            rendered.params.len(),
            total
        );
        if total == 0 {
            return Ok(Page::empty(req));
        }

        let limit_idx = rendered.next_index;
        let page_sql = format!(
            "SELECT {SELECT_COLUMNS} {BASE_FROM} {} {ORDER_BY} LIMIT ?{} OFFSET ?{}",
            rendered.clause,
            limit_idx,
            limit_idx + 1
        );
        let mut params = rendered.params;
        params.push(Value::Integer(req.per_page() as i64));
        params.push(Value::Integer(req.offset() as i64));

        let rows = self.db.query(&page_sql, &params).map_err(read_error)?;
        let mut items = rows
            .iter()
            .map(ContractRow::from_row)
            .collect::<Result<Vec<_>, _>>()?;
        self.enrich(&mut items).map_err(read_error)?;

        Ok(Page {
            items,
            total,
            page: req.page(),
            per_page: req.per_page(),
        })
    }

    /// A single contract with the same enrichment as [`paginate`](Self::paginate).
    pub fn find(&self, id: i64) -> Result<Option<ContractRow>, ServiceError> {
        let sql = format!("SELECT {SELECT_COLUMNS} {BASE_FROM} WHERE c.id = ?1");
        let rows = self
            .db
            .query(&sql, &[Value::Integer(id)])
            .map_err(read_error)?;
        let Some(row) = rows.first() else {
            return Ok(None);
        };

        let mut items = vec![ContractRow::from_row(row)?];
        self.enrich(&mut items).map_err(read_error)?;
        Ok(items.pop())
    }

    /// Attach linked services and the ledger summary to each row.
    fn enrich(&self, items: &mut [ContractRow]) -> Result<(), SQLError> {
        if items.is_empty() {
            return Ok(());
        }
        let ids: Vec<Value> = items.iter().map(|c| Value::Integer(c.id)).collect();
        let in_list = numbered_list(1, ids.len());

        let links = self.db.query(
            &format!(
                "SELECT cs.id_contrato, s.id, s.nombre \
                 FROM contrato_servicios cs JOIN servicios s ON s.id = cs.id_servicio \
                 WHERE cs.id_contrato IN ({in_list}) \
                 ORDER BY s.nombre, s.id"
            ),
            &ids,
        )?;
        let mut services: HashMap<i64, Vec<ServiceRef>> = HashMap::new();
        for row in &links {
            let (Some(contract), Some(id)) = (row.get_i64("id_contrato"), row.get_i64("id")) else {
                continue;
            };
            services.entry(contract).or_default().push(ServiceRef {
                id,
                nombre: row.get_string("nombre").unwrap_or_default(),
            });
        }

        let summaries = self.db.query(
            &format!(
                "SELECT h.id_contrato, COUNT(*) AS registros, \
                 (SELECT h2.estado FROM historial_pagos h2 \
                  WHERE h2.id_contrato = h.id_contrato \
                  ORDER BY h2.fecha_emision DESC, h2.id DESC LIMIT 1) AS ultimo_estado \
                 FROM historial_pagos h \
                 WHERE h.id_contrato IN ({in_list}) \
                 GROUP BY h.id_contrato"
            ),
            &ids,
        )?;
        let mut historial: HashMap<i64, LedgerSummary> = summaries
            .iter()
            .filter_map(|row| {
                let contract = row.get_i64("id_contrato")?;
                Some((
                    contract,
                    LedgerSummary {
                        registros: row.get_i64("registros").unwrap_or(0),
                        ultimo_estado: row.get_str("ultimo_estado").and_then(LedgerStatus::from_str),
                    },
                ))
            })
            .collect();

        for item in items.iter_mut() {
            item.servicios = services.remove(&item.id).unwrap_or_default();
            if item.servicios.is_empty() {
                if let Some(nombre) = &item.servicio {
                    item.servicios.push(ServiceRef {
                        id: item.id_servicio,
                        nombre: nombre.clone(),
                    });
                }
            }
            item.servicios_label = item
                .servicios
                .iter()
                .map(|s| s.nombre.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            item.historial = historial.remove(&item.id).unwrap_or_default();
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Validate and insert a contract with its service links. Returns the new id.
    pub fn create(&self, input: &ContractInput) -> Result<i64, ServiceError> {
        let record = ContractRecord::for_create(input).inspect_err(|e| {
            warn!("contract create rejected: {}", e);
        })?;

        let now = now_rfc3339();
        let mut params = bind(&record, record.documento_contrato.clone().unwrap_or_default());
        params.push(Value::Text(now));

        let id = in_transaction(self.db.as_ref(), |tx| -> Result<i64, WriteError> {
            let id = tx
                .query(INSERT_SQL, &params)?
                .first()
                .and_then(|r| r.get_i64("id"))
                .ok_or_else(|| {
                    WriteError::Rejected(ServiceError::Internal(
                        "el contrato insertado no devolvió id".into(),
                    ))
                })?;
            service_link::sync(tx, id, &record.servicios_ids)?;
            Ok(id)
        })
        .map_err(|e| e.into_service("No se pudo guardar el contrato"))?;

        info!(
            "contract {} created for cooperativa {} with services {:?}",
            id, record.id_cooperativa, record.servicios_ids
        );
        Ok(id)
    }

    /// Validate and replace contract `id`. Returns the new version.
    ///
    /// `input.version` must match the stored version. The stored document path
    /// is kept unless a new one is supplied.
    pub fn update(&self, id: i64, input: &ContractInput) -> Result<i64, ServiceError> {
        let record = ContractRecord::for_update(input).inspect_err(|e| {
            warn!("contract {} update rejected: {}", id, e);
        })?;
        let expected = input.version.unwrap_or_default();
        let now = now_rfc3339();

        let version = in_transaction(self.db.as_ref(), |tx| -> Result<i64, WriteError> {
            let current = tx.query(
                "SELECT version, documento_contrato FROM contratos WHERE id = ?1",
                &[Value::Integer(id)],
            )?;
            let Some(current) = current.first() else {
                return Err(WriteError::Rejected(ServiceError::NotFound(format!(
                    "contrato {id}"
                ))));
            };
            let stored = current.get_i64("version").unwrap_or(1);
            if stored != expected {
                return Err(WriteError::Rejected(stale(id)));
            }

            let documento = record
                .documento_contrato
                .clone()
                .or_else(|| current.get_string("documento_contrato"))
                .unwrap_or_default();
            let mut params = bind(&record, documento);
            params.push(Value::Text(now.clone()));
            params.push(Value::Integer(id));
            params.push(Value::Integer(expected));

            if tx.exec(UPDATE_SQL, &params)? == 0 {
                return Err(WriteError::Rejected(stale(id)));
            }
            service_link::sync(tx, id, &record.servicios_ids)?;
            Ok(stored + 1)
        })
        .map_err(|e| e.into_service("No se pudo actualizar el contrato"))
        .inspect_err(|e| {
            if matches!(e, ServiceError::Conflict(_)) {
                warn!("contract {} update conflict at version {}", id, expected);
            }
        })?;

        info!("contract {} updated to version {}", id, version);
        Ok(version)
    }

    /// Delete contract `id`. Returns whether a row was removed.
    ///
    /// Service links go with it; ledger entries stay, detached.
    pub fn delete(&self, id: i64) -> Result<bool, ServiceError> {
        let affected = self
            .db
            .exec("DELETE FROM contratos WHERE id = ?1", &[Value::Integer(id)])
            .map_err(|e| ServiceError::storage("No se pudo eliminar el contrato", e))?;
        if affected > 0 {
            info!("contract {} deleted", id);
        }
        Ok(affected > 0)
    }

    // -----------------------------------------------------------------------
    // Catalogs
    // -----------------------------------------------------------------------

    /// Active services, by name.
    pub fn servicios(&self) -> Result<Vec<Servicio>, ServiceError> {
        let rows = self
            .db
            .query(
                "SELECT id, nombre FROM servicios WHERE activo = 1 ORDER BY nombre, id",
                &[],
            )
            .map_err(read_error)?;
        Ok(rows
            .iter()
            .filter_map(|r| {
                Some(Servicio {
                    id: r.get_i64("id")?,
                    nombre: r.get_string("nombre").unwrap_or_default(),
                })
            })
            .collect())
    }

    pub fn redes(&self) -> Result<Vec<Red>, ServiceError> {
        let rows = self
            .db
            .query("SELECT codigo, nombre FROM redes ORDER BY nombre, codigo", &[])
            .map_err(read_error)?;
        Ok(rows
            .iter()
            .filter_map(|r| {
                Some(Red {
                    codigo: r.get_string("codigo")?,
                    nombre: r.get_string("nombre").unwrap_or_default(),
                })
            })
            .collect())
    }

    pub fn estados_pago(&self) -> &'static [EstadoPago] {
        &EstadoPago::ALL
    }

    pub fn periodos(&self) -> &'static [Periodo] {
        &Periodo::ALL
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Failure inside a write transaction: either the database refused, or a
/// check on the stored row rejected the write.
enum WriteError {
    Sql(SQLError),
    Rejected(ServiceError),
}

impl From<SQLError> for WriteError {
    fn from(e: SQLError) -> Self {
        WriteError::Sql(e)
    }
}

impl WriteError {
    fn into_service(self, message: &str) -> ServiceError {
        match self {
            WriteError::Sql(e) => {
                warn!("{}: {}", message, e);
                ServiceError::storage(message, e)
            }
            WriteError::Rejected(e) => e,
        }
    }
}

fn stale(id: i64) -> ServiceError {
    ServiceError::Conflict(format!(
        "El contrato {id} fue modificado por otro usuario; recargue e intente de nuevo"
    ))
}

fn read_error(e: SQLError) -> ServiceError {
    ServiceError::storage("No se pudieron consultar los contratos", e)
}

fn build_filter(filters: &ContractFilters) -> Filter {
    let mut filter = Filter::new();
    if let Some(q) = filters.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let pattern = Value::Text(contains_pattern(q));
        filter.push(Predicate::Fragment(
            TEXT_SEARCH,
            vec![pattern.clone(), pattern.clone(), pattern],
        ));
    }
    if let Some(estado) = filters.estado {
        filter.push(Predicate::Eq("c.estado_pago", Value::from(estado.as_str())));
    }
    if let Some(servicio) = filters.servicio {
        filter.push(Predicate::Fragment(
            SERVICE_MEMBER,
            vec![Value::Integer(servicio), Value::Integer(servicio)],
        ));
    }
    if let Some(red) = filters.red.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        filter.push(Predicate::Eq(
            "COALESCE(NULLIF(c.codigo_red, ''), co.codigo_red)",
            Value::from(red),
        ));
    }
    if let Some(activo) = filters.activo {
        filter.push(Predicate::Eq("c.activo", Value::from(activo)));
    }
    filter
}

/// Parameters `?1..?22` shared by insert and update.
fn bind(record: &ContractRecord, documento: String) -> Vec<Value> {
    vec![
        Value::Integer(record.id_cooperativa),
        Value::Integer(record.id_servicio),
        Value::from(record.periodo_facturacion.as_str()),
        Value::from(record.tipo_contrato.as_str()),
        Value::from(record.terminacion.as_str()),
        Value::from(record.estado_pago.as_str()),
        Value::from(record.activo),
        date_value(record.fecha_contratacion),
        date_value(record.fecha_caducidad),
        date_value(record.fecha_desvinculacion),
        date_value(record.fecha_fin),
        date_value(record.fecha_ultimo_pago),
        amount_value(record.valor_base),
        amount_value(record.iva_porcentaje),
        amount_value(record.valor_iva),
        amount_value(record.valor_total),
        record.valor_individual.map(format_amount).into(),
        record.valor_grupal.map(format_amount).into(),
        record.numero_licencias.into(),
        Value::Text(documento),
        record.observaciones.clone().into(),
        record.codigo_red.clone().into(),
    ]
}

pub(crate) fn date_value(d: Option<NaiveDate>) -> Value {
    d.map(format_date).into()
}

pub(crate) fn amount_value(d: Decimal) -> Value {
    Value::Text(format_amount(d))
}
