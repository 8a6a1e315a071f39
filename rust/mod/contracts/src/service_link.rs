//! Contract ↔ service pivot maintenance.
//!
//! Both functions take an executor rather than the store so they run on the
//! caller's open transaction.

use coopdesk_sql::{SQLError, SQLExecutor, Value};
use tracing::debug;

use crate::normalize::positive_unique;

/// Replace the service set of `contract_id` with `desired`.
///
/// Non-positive and repeated ids are dropped. Running it twice with the same
/// set leaves the pivot unchanged.
pub fn sync(tx: &dyn SQLExecutor, contract_id: i64, desired: &[i64]) -> Result<(), SQLError> {
    tx.exec(
        "DELETE FROM contrato_servicios WHERE id_contrato = ?1",
        &[Value::Integer(contract_id)],
    )?;

    let ids = positive_unique(desired);
    if ids.is_empty() {
        return Ok(());
    }

    // (?1, ?2), (?1, ?3), ...
    let tuples: Vec<String> = (0..ids.len())
        .map(|i| format!("(?1, ?{})", i + 2))
        .collect();
    let sql = format!(
        "INSERT INTO contrato_servicios (id_contrato, id_servicio) VALUES {}",
        tuples.join(", ")
    );

    let mut params = Vec::with_capacity(ids.len() + 1);
    params.push(Value::Integer(contract_id));
    params.extend(ids.iter().map(|id| Value::Integer(*id)));
    tx.exec(&sql, &params)?;

    debug!("contract {} linked to services {:?}", contract_id, ids);
    Ok(())
}

/// Service ids currently linked to `contract_id`, ascending.
pub fn linked_ids(exec: &dyn SQLExecutor, contract_id: i64) -> Result<Vec<i64>, SQLError> {
    let rows = exec.query(
        "SELECT id_servicio FROM contrato_servicios WHERE id_contrato = ?1 ORDER BY id_servicio",
        &[Value::Integer(contract_id)],
    )?;
    Ok(rows.iter().filter_map(|r| r.get_i64("id_servicio")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::migrate;
    use coopdesk_sql::{SQLStore, SqliteStore, in_transaction};

    fn setup() -> SqliteStore {
        let db = SqliteStore::open_in_memory().unwrap();
        migrate(&db).unwrap();
        db.exec_batch(
            "INSERT INTO cooperativas (id, nombre) VALUES (1, 'Andina');
             INSERT INTO servicios (id, nombre) VALUES (1, 'Core'), (2, 'Web'), (3, 'App'), (4, 'Sms');
             INSERT INTO contratos (id, id_cooperativa, id_servicio, periodo_facturacion,
                 tipo_contrato, valor_base, iva_porcentaje, valor_iva, valor_total,
                 created_at, updated_at)
             VALUES (10, 1, 1, 'Mensual', 'Anual', '1.00', '15.00', '0.15', '1.15', 'x', 'x');",
        )
        .unwrap();
        db
    }

    #[test]
    fn replaces_whole_set() {
        let db = setup();
        sync(&db, 10, &[1, 2, 3]).unwrap();
        assert_eq!(linked_ids(&db, 10).unwrap(), vec![1, 2, 3]);

        sync(&db, 10, &[4, 2]).unwrap();
        assert_eq!(linked_ids(&db, 10).unwrap(), vec![2, 4]);
    }

    #[test]
    fn sync_is_idempotent() {
        let db = setup();
        sync(&db, 10, &[3, 1, 3, 0, -2]).unwrap();
        let first = linked_ids(&db, 10).unwrap();
        sync(&db, 10, &[3, 1, 3, 0, -2]).unwrap();
        assert_eq!(linked_ids(&db, 10).unwrap(), first);
        assert_eq!(first, vec![1, 3]);
    }

    #[test]
    fn empty_set_clears_links() {
        let db = setup();
        sync(&db, 10, &[1, 2]).unwrap();
        sync(&db, 10, &[]).unwrap();
        assert!(linked_ids(&db, 10).unwrap().is_empty());
    }

    #[test]
    fn unknown_service_fails_and_rolls_back() {
        let db = setup();
        sync(&db, 10, &[1]).unwrap();

        let store: &dyn SQLStore = &db;
        let result = in_transaction(store, |tx| sync(tx, 10, &[2, 999]));
        assert!(result.is_err());
        assert_eq!(linked_ids(&db, 10).unwrap(), vec![1]);
    }
}
