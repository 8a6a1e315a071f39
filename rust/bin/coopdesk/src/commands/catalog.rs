//! Read-only commands: `catalog` and `report`.

use anyhow::Result;
use serde_json::json;

use ::contracts::normalize::normalize_date;

use super::{App, print_json};

pub fn catalog(app: &App) -> Result<()> {
    let contracts = app.module.contracts();
    print_json(&json!({
        "servicios": contracts.servicios()?,
        "redes": contracts.redes()?,
        "estadosPago": contracts.estados_pago(),
        "periodos": contracts.periodos(),
        "estadosHistorial": app.module.ledger().estados(),
    }))
}

/// Dashboard as of `date` (any accepted date shape), default today.
pub fn report(app: &App, date: Option<&str>) -> Result<()> {
    let today = match date {
        Some(raw) => normalize_date(raw).ok_or_else(|| anyhow::anyhow!("invalid date: {}", raw))?,
        None => chrono::Local::now().date_naive(),
    };
    print_json(&app.module.reports().dashboard(today)?)
}
