pub mod contract;
pub mod form;
pub mod ledger;
pub mod model;
pub mod normalize;
pub mod report;
pub mod schema;
pub mod service_link;

use std::sync::Arc;

use coopdesk_core::ServiceError;
use coopdesk_sql::SQLStore;
use tracing::info;

pub use contract::ContractStore;
pub use ledger::BillingLedger;
pub use model::{
    ContractFilters, ContractInput, ContractRow, EstadoPago, LedgerFilters, LedgerInput,
    LedgerRow, LedgerStatus, LedgerSummary, Periodo, Red, ServiceRef, Servicio,
};
pub use report::{Dashboard, Reports};

/// The contracts module: contract store, billing ledger and reports over one
/// database.
///
/// Construction migrates the schema, so every store sees the columns it
/// expects.
pub struct ContractsModule {
    contracts: ContractStore,
    ledger: BillingLedger,
    reports: Reports,
}

impl ContractsModule {
    pub fn new(db: Arc<dyn SQLStore>) -> Result<Self, ServiceError> {
        let version = schema::migrate(db.as_ref())?;
        info!("contracts module ready (schema v{})", version);

        Ok(Self {
            contracts: ContractStore::new(Arc::clone(&db)),
            ledger: BillingLedger::new(Arc::clone(&db)),
            reports: Reports::new(db),
        })
    }

    pub fn contracts(&self) -> &ContractStore {
        &self.contracts
    }

    pub fn ledger(&self) -> &BillingLedger {
        &self.ledger
    }

    pub fn reports(&self) -> &Reports {
        &self.reports
    }
}
