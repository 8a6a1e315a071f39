//! `coopdesk ledger ...`

use std::path::Path;

use anyhow::Result;
use serde_json::json;

use ::contracts::{LedgerFilters, LedgerInput};
use coopdesk_core::PageRequest;

use super::{App, confirm, filter_map, print_json, read_body, upload_present, with_upload};

/// Folder under the upload dir for payment receipts.
const RECEIPT_FOLDER: &str = "comprobantes";

pub struct ListArgs {
    pub q: Option<String>,
    pub cooperativa: Option<String>,
    pub contrato: Option<String>,
    pub estado: Option<String>,
    pub desde: Option<String>,
    pub hasta: Option<String>,
    pub page: i64,
    pub per_page: i64,
}

pub fn list(app: &App, args: ListArgs) -> Result<()> {
    let map = filter_map([
        ("q", args.q),
        ("cooperativa", args.cooperativa),
        ("contrato", args.contrato),
        ("estado", args.estado),
        ("desde", args.desde),
        ("hasta", args.hasta),
    ]);
    let filters = LedgerFilters::from_map(&map);
    let page = app
        .module
        .ledger()
        .paginate(&filters, PageRequest::new(args.page, args.per_page))?;
    print_json(&page)
}

pub fn show(app: &App, id: i64) -> Result<()> {
    match app.module.ledger().find(id)? {
        Some(entry) => {
            let comprobante = upload_present(&app.blobs, entry.comprobante.as_deref())?;
            print_json(&json!({ "entry": entry, "comprobanteDisponible": comprobante }))
        }
        None => anyhow::bail!("ledger entry {} not found", id),
    }
}

pub fn create(
    app: &App,
    json_body: Option<String>,
    file: Option<&Path>,
    receipt: Option<&Path>,
) -> Result<()> {
    let mut input: LedgerInput = serde_json::from_value(read_body(json_body, file)?)?;
    let id = with_upload(&app.blobs, receipt, RECEIPT_FOLDER, |stored| {
        if stored.is_some() {
            input.comprobante = stored;
        }
        app.module.ledger().create(&input)
    })?;
    print_json(&json!({ "id": id }))
}

pub fn update(
    app: &App,
    id: i64,
    json_body: Option<String>,
    file: Option<&Path>,
    receipt: Option<&Path>,
) -> Result<()> {
    let mut input: LedgerInput = serde_json::from_value(read_body(json_body, file)?)?;
    with_upload(&app.blobs, receipt, RECEIPT_FOLDER, |stored| {
        if stored.is_some() {
            input.comprobante = stored;
        }
        app.module.ledger().update(id, &input)
    })?;
    print_json(&json!({ "id": id, "updated": true }))
}

pub fn delete(app: &App, id: i64, yes: bool) -> Result<()> {
    if !confirm(yes)? {
        println!("Cancelled.");
        return Ok(());
    }
    let deleted = app.module.ledger().delete(id)?;
    print_json(&json!({ "id": id, "deleted": deleted }))
}
