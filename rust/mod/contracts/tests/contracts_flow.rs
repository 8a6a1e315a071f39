use std::collections::HashMap;
use std::sync::Arc;

use contracts::{ContractFilters, ContractInput, ContractsModule, LedgerFilters, LedgerInput};
use coopdesk_core::PageRequest;
use coopdesk_sql::{SQLExecutor, SQLStore, SqliteStore};

fn seed(db: &SqliteStore) {
    db.exec_batch(
        "INSERT INTO redes (codigo, nombre) VALUES ('R1', 'Red Uno');
         INSERT INTO cooperativas (id, nombre, codigo_red) VALUES
             (1, 'Alianza del Valle', 'R1'), (2, 'Oscus', NULL), (3, 'Pilahuín Tío', NULL);
         INSERT INTO servicios (id, nombre) VALUES
             (1, 'Core'), (2, 'Web'), (3, 'Móvil'), (4, 'SMS'), (5, 'Tarjetas'),
             (6, 'Nómina'), (7, 'Soporte'), (8, 'Hosting');",
    )
    .unwrap();
}

fn open() -> (tempfile::TempDir, Arc<SqliteStore>, ContractsModule) {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(SqliteStore::open(&dir.path().join("coopdesk.sqlite")).unwrap());
    let module = ContractsModule::new(db.clone()).unwrap();
    seed(&db);
    (dir, db, module)
}

fn contract(cooperativa: i64, primary: i64, linked: &[i64]) -> ContractInput {
    ContractInput {
        id_cooperativa: cooperativa,
        id_servicio: primary,
        servicios_ids: linked.to_vec(),
        periodo_facturacion: Some("Mensual".into()),
        tipo_contrato: Some("Indefinido".into()),
        valor_base: Some("250.00".into()),
        activo: true,
        ..Default::default()
    }
}

fn count(db: &SqliteStore, table: &str) -> i64 {
    db.query(&format!("SELECT COUNT(*) AS n FROM {table}"), &[])
        .unwrap()[0]
        .get_i64("n")
        .unwrap()
}

#[test]
fn service_filter_matches_primary_or_linked() {
    let (_dir, _db, module) = open();
    let store = module.contracts();

    let a = store.create(&contract(1, 3, &[])).unwrap();
    let b = store.create(&contract(2, 1, &[3, 4])).unwrap();
    store.create(&contract(3, 2, &[5])).unwrap();
    store.create(&contract(1, 6, &[7])).unwrap();
    store.create(&contract(2, 8, &[])).unwrap();

    let filters = ContractFilters {
        servicio: Some(3),
        ..Default::default()
    };
    let page = store.paginate(&filters, PageRequest::default()).unwrap();
    let mut ids: Vec<i64> = page.items.iter().map(|c| c.id).collect();
    ids.sort();
    assert_eq!(page.total, 2);
    assert_eq!(ids, vec![a, b]);
}

#[test]
fn pages_cover_every_match_once() {
    let (_dir, _db, module) = open();
    let store = module.contracts();
    for i in 0..23 {
        store
            .create(&contract(i % 3 + 1, i % 8 + 1, &[(i + 3) % 8 + 1]))
            .unwrap();
    }

    let filters = ContractFilters::default();
    for per_page in [5, 7, 10, 50] {
        let first = store.paginate(&filters, PageRequest::new(1, per_page)).unwrap();
        assert_eq!(first.total, 23);

        let mut seen = Vec::new();
        for page in 1..=first.page_count() {
            let p = store
                .paginate(&filters, PageRequest::new(page as i64, per_page))
                .unwrap();
            assert_eq!(p.total, 23);
            seen.extend(p.items.into_iter().map(|c| c.id));
        }
        let len = seen.len();
        seen.sort();
        seen.dedup();
        assert_eq!(len, 23);
        assert_eq!(seen.len(), 23);
    }

    // Out-of-range page sizes are clamped.
    let tiny = store.paginate(&filters, PageRequest::new(0, 1)).unwrap();
    assert_eq!((tiny.page, tiny.per_page, tiny.items.len()), (1, 5, 5));
    let huge = store.paginate(&filters, PageRequest::new(1, 500)).unwrap();
    assert_eq!(huge.per_page, 50);
    assert_eq!(huge.items.len(), 23);
}

#[test]
fn failed_link_sync_leaves_no_contract() {
    let (_dir, db, module) = open();
    let err = module
        .contracts()
        .create(&contract(1, 1, &[2, 404]))
        .unwrap_err();
    assert_eq!(err.error_code(), "STORAGE_ERROR");
    assert!(std::error::Error::source(&err).is_some());
    assert_eq!(count(&db, "contratos"), 0);
    assert_eq!(count(&db, "contrato_servicios"), 0);

    let page = module
        .contracts()
        .paginate(&ContractFilters::default(), PageRequest::default())
        .unwrap();
    assert_eq!(page.total, 0);
}

#[test]
fn filters_from_request_map() {
    let (_dir, _db, module) = open();
    let store = module.contracts();
    store.create(&contract(1, 1, &[])).unwrap();
    let mut inactive = contract(3, 2, &[]);
    inactive.activo = false;
    store.create(&inactive).unwrap();

    let map: HashMap<String, String> = [("activo", "0"), ("q", "pilahuin tio"), ("x", "y")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let page = store
        .paginate(&ContractFilters::from_map(&map), PageRequest::default())
        .unwrap();
    assert_eq!(page.total, 1);
    assert!(!page.items[0].activo);

    let by_red: HashMap<String, String> =
        [("red".to_string(), "R1".to_string())].into_iter().collect();
    let page = store
        .paginate(&ContractFilters::from_map(&by_red), PageRequest::default())
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].red_nombre.as_deref(), Some("Red Uno"));
}

#[test]
fn ledger_follows_contract_lifecycle() {
    let (_dir, db, module) = open();
    let id = module.contracts().create(&contract(2, 1, &[2])).unwrap();

    let entry = LedgerInput {
        id_cooperativa: 2,
        id_contrato: Some(id),
        periodo: Some("Enero 2024".into()),
        fecha_emision: Some("2024-01-31".into()),
        monto_base: Some("250".into()),
        ..Default::default()
    };
    let entry_id = module.ledger().create(&entry).unwrap();

    let row = module.contracts().find(id).unwrap().unwrap();
    assert_eq!(row.historial.registros, 1);

    let filters = LedgerFilters {
        contrato: Some(id),
        ..Default::default()
    };
    let page = module
        .ledger()
        .paginate(&filters, PageRequest::default())
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].monto_total.to_string(), "287.50");

    assert!(module.contracts().delete(id).unwrap());
    let detached = module.ledger().find(entry_id).unwrap().unwrap();
    assert_eq!(detached.id_contrato, None);
    assert_eq!(count(&db, "contrato_servicios"), 0);
}

#[test]
fn reopening_keeps_data_and_schema() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("coopdesk.sqlite");

    let id = {
        let db = Arc::new(SqliteStore::open(&path).unwrap());
        let module = ContractsModule::new(db.clone()).unwrap();
        seed(&db);
        module.contracts().create(&contract(1, 1, &[])).unwrap()
    };

    let db: Arc<dyn SQLStore> = Arc::new(SqliteStore::open(&path).unwrap());
    let module = ContractsModule::new(db).unwrap();
    let row = module.contracts().find(id).unwrap().unwrap();
    assert_eq!(row.version, 1);
    assert_eq!(row.cooperativa, "Alianza del Valle");
}
