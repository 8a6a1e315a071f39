use std::sync::Arc;

use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use coopdesk_core::ServiceError;
use coopdesk_sql::{SQLError, SQLStore, Value};

use crate::normalize::{format_date, parse_stored_amount, round2};

/// Headline figures for the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    /// First day of the month the monthly figures cover.
    pub mes: String,
    pub contratos_activos: i64,
    /// Distinct services across active contracts, primary or linked.
    pub servicios_contratados: i64,
    /// Ledger entries issued this month.
    pub registros_mes: i64,
    /// Ledger entries still `pendiente` or `vencido`, any month.
    pub pendientes: i64,
    /// Total issued this month, excluding `anulado` entries.
    pub facturado_mes: Decimal,
    /// Total of `pagado` entries paid this month (issue date when no payment
    /// date was recorded).
    pub cobrado_mes: Decimal,
}

/// Read-only aggregates over contracts and the ledger.
pub struct Reports {
    db: Arc<dyn SQLStore>,
}

impl Reports {
    pub fn new(db: Arc<dyn SQLStore>) -> Self {
        Self { db }
    }

    /// Figures as of `today`; monthly ones cover `today`'s calendar month.
    pub fn dashboard(&self, today: NaiveDate) -> Result<Dashboard, ServiceError> {
        self.collect(today)
            .map_err(|e| ServiceError::storage("No se pudo calcular el resumen", e))
    }

    fn collect(&self, today: NaiveDate) -> Result<Dashboard, SQLError> {
        let start = today.with_day(1).unwrap_or(today);
        let end = start.checked_add_months(Months::new(1)).unwrap_or(start);
        let month = [Value::Text(format_date(start)), Value::Text(format_date(end))];

        let contratos_activos = self.count("SELECT COUNT(*) AS n FROM contratos WHERE activo = 1", &[])?;
        let servicios_contratados = self.count(
            "SELECT COUNT(DISTINCT id_servicio) AS n FROM (\
                SELECT id_servicio FROM contratos WHERE activo = 1 \
                UNION \
                SELECT cs.id_servicio FROM contrato_servicios cs \
                JOIN contratos c ON c.id = cs.id_contrato WHERE c.activo = 1)",
            &[],
        )?;
        let registros_mes = self.count(
            "SELECT COUNT(*) AS n FROM historial_pagos \
             WHERE fecha_emision >= ?1 AND fecha_emision < ?2",
            &month,
        )?;
        let pendientes = self.count(
            "SELECT COUNT(*) AS n FROM historial_pagos WHERE estado IN ('pendiente', 'vencido')",
            &[],
        )?;
        let facturado_mes = self.sum(
            "SELECT monto_total FROM historial_pagos \
             WHERE fecha_emision >= ?1 AND fecha_emision < ?2 AND estado <> 'anulado'",
            &month,
        )?;
        let cobrado_mes = self.sum(
            "SELECT monto_total FROM historial_pagos \
             WHERE estado = 'pagado' \
             AND COALESCE(NULLIF(fecha_pago, ''), fecha_emision) >= ?1 \
             AND COALESCE(NULLIF(fecha_pago, ''), fecha_emision) < ?2",
            &month,
        )?;

        debug!(
            "dashboard for {}: {} active contracts, {} ledger entries",
            format_date(start),
            contratos_activos,
            registros_mes
        );
        Ok(Dashboard {
            mes: format_date(start),
            contratos_activos,
            servicios_contratados,
            registros_mes,
            pendientes,
            facturado_mes,
            cobrado_mes,
        })
    }

    fn count(&self, sql: &str, params: &[Value]) -> Result<i64, SQLError> {
        Ok(self
            .db
            .query(sql, params)?
            .first()
            .and_then(|r| r.get_i64("n"))
            .unwrap_or(0))
    }

    /// Amounts are stored as text, so they are added here rather than in SQL.
    fn sum(&self, sql: &str, params: &[Value]) -> Result<Decimal, SQLError> {
        let total = self
            .db
            .query(sql, params)?
            .iter()
            .filter_map(|r| r.get_str("monto_total"))
            .map(parse_stored_amount)
            .fold(Decimal::ZERO, Decimal::saturating_add);
        Ok(round2(total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    use coopdesk_sql::{SQLExecutor, SqliteStore};

    use crate::schema::migrate;

    #[test]
    fn empty_database() {
        let db = Arc::new(SqliteStore::open_in_memory().unwrap());
        migrate(db.as_ref()).unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();

        let dash = Reports::new(db).dashboard(today).unwrap();
        assert_eq!(dash.mes, "2024-03-01");
        assert_eq!(dash.contratos_activos, 0);
        assert_eq!(dash.facturado_mes, Decimal::from_str("0.00").unwrap());
    }

    #[test]
    fn figures_over_seeded_data() {
        let db = Arc::new(SqliteStore::open_in_memory().unwrap());
        migrate(db.as_ref()).unwrap();
        db.exec_batch(
            "INSERT INTO cooperativas (id, nombre) VALUES (1, 'Andina');
             INSERT INTO servicios (id, nombre) VALUES (1, 'A'), (2, 'B'), (3, 'C'), (4, 'D');
             INSERT INTO contratos (id, id_cooperativa, id_servicio, periodo_facturacion,
                 tipo_contrato, activo, valor_base, iva_porcentaje, valor_iva, valor_total,
                 created_at, updated_at) VALUES
                 (1, 1, 1, 'Mensual', 'Anual', 1, '1.00', '15.00', '0.15', '1.15', 'x', 'x'),
                 (2, 1, 2, 'Mensual', 'Anual', 1, '1.00', '15.00', '0.15', '1.15', 'x', 'x'),
                 (3, 1, 4, 'Mensual', 'Anual', 0, '1.00', '15.00', '0.15', '1.15', 'x', 'x');
             INSERT INTO contrato_servicios VALUES (1, 1), (1, 3), (2, 2), (3, 4);
             INSERT INTO historial_pagos (id_cooperativa, id_contrato, periodo, fecha_emision,
                 fecha_pago, monto_base, monto_iva, monto_total, estado, created_at, updated_at)
             VALUES
                 (1, 1, 'Marzo', '2024-03-01', '2024-03-05', '100.00', '15.00', '115.00', 'pagado', 'x', 'x'),
                 (1, 1, 'Marzo', '2024-03-10', NULL, '10.00', '1.50', '11.50', 'pendiente', 'x', 'x'),
                 (1, 2, 'Marzo', '2024-03-31', NULL, '20.00', '3.00', '23.00', 'anulado', 'x', 'x'),
                 (1, 2, 'Febrero', '2024-02-28', '2024-03-02', '40.00', '6.00', '46.00', 'pagado', 'x', 'x'),
                 (1, 2, 'Enero', '2024-01-31', NULL, '40.00', '6.00', '46.00', 'vencido', 'x', 'x'),
                 (1, NULL, 'Abril', '2024-04-01', NULL, '5.00', '0.75', '5.75', 'pendiente', 'x', 'x');",
        )
        .unwrap();

        let today = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();
        let dash = Reports::new(db).dashboard(today).unwrap();
        assert_eq!(dash.contratos_activos, 2);
        assert_eq!(dash.servicios_contratados, 3);
        assert_eq!(dash.registros_mes, 3);
        assert_eq!(dash.pendientes, 3);
        assert_eq!(dash.facturado_mes, Decimal::from_str("126.50").unwrap());
        assert_eq!(dash.cobrado_mes, Decimal::from_str("161.00").unwrap());
    }
}
