//! `coopdesk contracts ...`

use std::path::Path;

use anyhow::Result;
use serde_json::json;

use ::contracts::{ContractFilters, ContractInput};
use coopdesk_core::PageRequest;

use super::{App, confirm, filter_map, print_json, read_body, upload_present, with_upload};

/// Folder under the upload dir for signed contract documents.
const DOCUMENT_FOLDER: &str = "contratos";

pub struct ListArgs {
    pub q: Option<String>,
    pub estado: Option<String>,
    pub servicio: Option<String>,
    pub red: Option<String>,
    pub activo: Option<String>,
    pub page: i64,
    pub per_page: i64,
}

pub fn list(app: &App, args: ListArgs) -> Result<()> {
    let map = filter_map([
        ("q", args.q),
        ("estado", args.estado),
        ("servicio", args.servicio),
        ("red", args.red),
        ("activo", args.activo),
    ]);
    let filters = ContractFilters::from_map(&map);
    let page = app
        .module
        .contracts()
        .paginate(&filters, PageRequest::new(args.page, args.per_page))?;
    print_json(&page)
}

/// Print one contract with its ledger entries.
pub fn show(app: &App, id: i64) -> Result<()> {
    let Some(contract) = app.module.contracts().find(id)? else {
        anyhow::bail!("contract {} not found", id);
    };
    let historial = app.module.ledger().list_by_contrato(id)?;
    let documento = upload_present(&app.blobs, Some(contract.documento_contrato.as_str()))?;
    print_json(&json!({
        "contract": contract,
        "historial": historial,
        "documentoDisponible": documento,
    }))
}

pub fn create(
    app: &App,
    json_body: Option<String>,
    file: Option<&Path>,
    document: Option<&Path>,
) -> Result<()> {
    let mut input: ContractInput = serde_json::from_value(read_body(json_body, file)?)?;
    let id = with_upload(&app.blobs, document, DOCUMENT_FOLDER, |stored| {
        if stored.is_some() {
            input.documento_contrato = stored;
        }
        app.module.contracts().create(&input)
    })?;
    print_json(&json!({ "id": id }))
}

pub fn update(
    app: &App,
    id: i64,
    json_body: Option<String>,
    file: Option<&Path>,
    document: Option<&Path>,
) -> Result<()> {
    let mut input: ContractInput = serde_json::from_value(read_body(json_body, file)?)?;
    let version = with_upload(&app.blobs, document, DOCUMENT_FOLDER, |stored| {
        if stored.is_some() {
            input.documento_contrato = stored;
        }
        app.module.contracts().update(id, &input)
    })?;
    print_json(&json!({ "id": id, "version": version }))
}

pub fn delete(app: &App, id: i64, yes: bool) -> Result<()> {
    if !confirm(yes)? {
        println!("Cancelled.");
        return Ok(());
    }
    let deleted = app.module.contracts().delete(id)?;
    print_json(&json!({ "id": id, "deleted": deleted }))
}
