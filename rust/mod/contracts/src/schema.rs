use coopdesk_core::ServiceError;
use coopdesk_sql::{SQLError, SQLExecutor, SQLStore, in_transaction};
use tracing::info;

/// Ordered schema migrations. Entry `i` moves the database to version `i + 1`.
///
/// Amounts are stored as fixed two-decimal text (`"115.00"`), dates as
/// `YYYY-MM-DD` text.
const MIGRATIONS: &[&str] = &[
    // v1: reference tables, contracts, service pivot, ledger.
    "
    CREATE TABLE IF NOT EXISTS cooperativas (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        nombre      TEXT NOT NULL,
        codigo_red  TEXT
    );
    CREATE TABLE IF NOT EXISTS servicios (
        id      INTEGER PRIMARY KEY AUTOINCREMENT,
        nombre  TEXT NOT NULL,
        activo  INTEGER NOT NULL DEFAULT 1
    );
    CREATE TABLE IF NOT EXISTS redes (
        codigo  TEXT PRIMARY KEY,
        nombre  TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS contratos (
        id                    INTEGER PRIMARY KEY AUTOINCREMENT,
        id_cooperativa        INTEGER NOT NULL REFERENCES cooperativas(id),
        id_servicio           INTEGER NOT NULL REFERENCES servicios(id),
        periodo_facturacion   TEXT NOT NULL,
        tipo_contrato         TEXT NOT NULL,
        terminacion           TEXT NOT NULL DEFAULT '',
        estado_pago           TEXT NOT NULL DEFAULT 'PENDIENTE',
        activo                INTEGER NOT NULL DEFAULT 1,
        fecha_contratacion    TEXT,
        fecha_caducidad       TEXT,
        fecha_desvinculacion  TEXT,
        fecha_fin             TEXT,
        fecha_ultimo_pago     TEXT,
        valor_base            TEXT NOT NULL,
        iva_porcentaje        TEXT NOT NULL,
        valor_iva             TEXT NOT NULL,
        valor_total           TEXT NOT NULL,
        valor_individual      TEXT,
        valor_grupal          TEXT,
        numero_licencias      INTEGER,
        documento_contrato    TEXT NOT NULL DEFAULT '',
        observaciones         TEXT,
        codigo_red            TEXT,
        created_at            TEXT NOT NULL,
        updated_at            TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS contrato_servicios (
        id_contrato  INTEGER NOT NULL REFERENCES contratos(id) ON DELETE CASCADE,
        id_servicio  INTEGER NOT NULL REFERENCES servicios(id),
        PRIMARY KEY (id_contrato, id_servicio)
    );
    CREATE TABLE IF NOT EXISTS historial_pagos (
        id                 INTEGER PRIMARY KEY AUTOINCREMENT,
        id_cooperativa     INTEGER NOT NULL REFERENCES cooperativas(id),
        id_contrato        INTEGER REFERENCES contratos(id) ON DELETE SET NULL,
        periodo            TEXT NOT NULL,
        fecha_emision      TEXT NOT NULL,
        fecha_vencimiento  TEXT,
        fecha_pago         TEXT,
        monto_base         TEXT NOT NULL,
        monto_iva          TEXT NOT NULL,
        monto_total        TEXT NOT NULL,
        estado             TEXT NOT NULL DEFAULT 'pendiente',
        comprobante        TEXT,
        observaciones      TEXT,
        created_at         TEXT NOT NULL,
        updated_at         TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_contratos_cooperativa ON contratos(id_cooperativa);
    CREATE INDEX IF NOT EXISTS idx_contratos_servicio ON contratos(id_servicio);
    CREATE INDEX IF NOT EXISTS idx_contratos_estado ON contratos(estado_pago);
    CREATE INDEX IF NOT EXISTS idx_cs_servicio ON contrato_servicios(id_servicio);
    CREATE INDEX IF NOT EXISTS idx_hist_contrato ON historial_pagos(id_contrato);
    CREATE INDEX IF NOT EXISTS idx_hist_cooperativa ON historial_pagos(id_cooperativa);
    CREATE INDEX IF NOT EXISTS idx_hist_emision ON historial_pagos(fecha_emision);
    ",
    // v2: optimistic locking for contract updates.
    "ALTER TABLE contratos ADD COLUMN version INTEGER NOT NULL DEFAULT 1;",
];

/// Schema version this build expects.
pub const CURRENT_VERSION: u32 = MIGRATIONS.len() as u32;

/// Read `PRAGMA user_version`.
pub fn schema_version(exec: &dyn SQLExecutor) -> Result<u32, SQLError> {
    let rows = exec.query("PRAGMA user_version", &[])?;
    Ok(rows
        .first()
        .and_then(|r| r.get_i64("user_version"))
        .unwrap_or(0) as u32)
}

/// Apply every migration newer than the stored version, in one transaction.
///
/// Returns the resulting version. Running it again is a no-op.
pub fn migrate(db: &dyn SQLStore) -> Result<u32, ServiceError> {
    in_transaction(db, |tx| -> Result<u32, SQLError> {
        let current = schema_version(tx)?;
        for (i, ddl) in MIGRATIONS.iter().enumerate().skip(current as usize) {
            let version = i as u32 + 1;
            tx.exec_batch(ddl)?;
            tx.exec_batch(&format!("PRAGMA user_version = {version}"))?;
            info!("schema migrated to v{}", version);
        }
        Ok(current.max(CURRENT_VERSION))
    })
    .map_err(|e| ServiceError::storage("No se pudo preparar la base de datos", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use coopdesk_sql::SqliteStore;

    #[test]
    fn migrates_fresh_database() {
        let db = SqliteStore::open_in_memory().unwrap();
        assert_eq!(schema_version(&db).unwrap(), 0);

        assert_eq!(migrate(&db).unwrap(), CURRENT_VERSION);
        assert_eq!(schema_version(&db).unwrap(), CURRENT_VERSION);

        let cols = db.query("PRAGMA table_info(contratos)", &[]).unwrap();
        assert!(cols.iter().any(|r| r.get_str("name") == Some("version")));
    }

    #[test]
    fn migrate_is_idempotent() {
        let db = SqliteStore::open_in_memory().unwrap();
        migrate(&db).unwrap();
        assert_eq!(migrate(&db).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn upgrades_from_v1() {
        let db = SqliteStore::open_in_memory().unwrap();
        db.exec_batch(MIGRATIONS[0]).unwrap();
        db.exec_batch("PRAGMA user_version = 1").unwrap();
        db.exec("INSERT INTO cooperativas (nombre) VALUES ('Andina')", &[])
            .unwrap();
        db.exec("INSERT INTO servicios (nombre) VALUES ('Core')", &[])
            .unwrap();
        db.exec(
            "INSERT INTO contratos (id_cooperativa, id_servicio, periodo_facturacion, \
             tipo_contrato, valor_base, iva_porcentaje, valor_iva, valor_total, \
             created_at, updated_at) \
             VALUES (1, 1, 'Mensual', 'Anual', '10.00', '15.00', '1.50', '11.50', 'x', 'x')",
            &[],
        )
        .unwrap();

        migrate(&db).unwrap();

        let rows = db.query("SELECT version FROM contratos", &[]).unwrap();
        assert_eq!(rows[0].get_i64("version"), Some(1));
    }
}
