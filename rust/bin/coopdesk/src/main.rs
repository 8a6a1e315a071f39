//! `coopdesk`: administration CLI for cooperativa contracts and billing.
//!
//! Every command opens the configured SQLite database (migrating it when
//! needed), runs one operation and prints JSON on stdout. Logs go to stderr.

mod commands;
mod config;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use coopdesk_core::ServiceConfig;
use tracing::info;

use config::FileConfig;

/// coopdesk CLI tool.
#[derive(Parser, Debug)]
#[command(name = "coopdesk", about = "Contracts and billing ledger for cooperativas")]
struct Cli {
    /// Path to config file (default: ~/.coopdesk/config.toml).
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    /// Data directory (overrides [storage] data_dir).
    #[arg(long = "data-dir", global = true)]
    data_dir: Option<PathBuf>,

    /// SQLite database file (overrides [storage] sqlite_path).
    #[arg(long = "sqlite", global = true)]
    sqlite: Option<PathBuf>,

    /// Upload directory (overrides [storage] blob_dir).
    #[arg(long = "blob-dir", global = true)]
    blob_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create or upgrade the database schema.
    Migrate,

    /// Contract operations.
    Contracts {
        #[command(subcommand)]
        action: ContractAction,
    },

    /// Billing ledger operations.
    Ledger {
        #[command(subcommand)]
        action: LedgerAction,
    },

    /// Dashboard figures.
    Report {
        /// Reference date (default: today).
        #[arg(long)]
        date: Option<String>,
    },

    /// Services, networks and fixed value lists.
    Catalog,

    /// Show version.
    Version,
}

#[derive(Args, Debug)]
struct PageArgs {
    #[arg(long, default_value_t = 1)]
    page: i64,
    #[arg(long = "per-page", default_value_t = 10)]
    per_page: i64,
}

#[derive(Args, Debug)]
struct BodyArgs {
    /// JSON body.
    #[arg(long = "json")]
    json_body: Option<String>,
    /// Read JSON from file.
    #[arg(short = 'f', long = "file")]
    file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum ContractAction {
    /// Search contracts.
    List {
        /// Free text over cooperativa and service names.
        #[arg(long)]
        q: Option<String>,
        /// Payment state (PENDIENTE, PAGADO, VENCIDO, ANULADO).
        #[arg(long)]
        estado: Option<String>,
        /// Service id, primary or linked.
        #[arg(long)]
        servicio: Option<String>,
        /// Network code.
        #[arg(long)]
        red: Option<String>,
        /// 1 for active, 0 for inactive.
        #[arg(long)]
        activo: Option<String>,
        #[command(flatten)]
        paging: PageArgs,
    },
    /// Show one contract with its ledger entries.
    Show { id: i64 },
    /// Create a contract.
    Create {
        #[command(flatten)]
        body: BodyArgs,
        /// Signed contract document to upload (pdf, jpg, png).
        #[arg(long)]
        document: Option<PathBuf>,
    },
    /// Replace a contract. The body must carry the `version` last read.
    Update {
        id: i64,
        #[command(flatten)]
        body: BodyArgs,
        #[arg(long)]
        document: Option<PathBuf>,
    },
    /// Delete a contract.
    Delete {
        id: i64,
        /// Skip confirmation.
        #[arg(long = "yes", short = 'y')]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
enum LedgerAction {
    /// Search ledger entries.
    List {
        /// Free text over cooperativa name and observations.
        #[arg(long)]
        q: Option<String>,
        #[arg(long)]
        cooperativa: Option<String>,
        #[arg(long)]
        contrato: Option<String>,
        /// pendiente, pagado, vencido, parcial or anulado.
        #[arg(long)]
        estado: Option<String>,
        /// Issued on or after this date.
        #[arg(long)]
        desde: Option<String>,
        /// Issued on or before this date.
        #[arg(long)]
        hasta: Option<String>,
        #[command(flatten)]
        paging: PageArgs,
    },
    /// Show one ledger entry.
    Show { id: i64 },
    /// Record a billing or payment event.
    Create {
        #[command(flatten)]
        body: BodyArgs,
        /// Payment receipt to upload (pdf, jpg, png).
        #[arg(long)]
        receipt: Option<PathBuf>,
    },
    /// Replace a ledger entry.
    Update {
        id: i64,
        #[command(flatten)]
        body: BodyArgs,
        #[arg(long)]
        receipt: Option<PathBuf>,
    },
    /// Delete a ledger entry.
    Delete {
        id: i64,
        #[arg(long = "yes", short = 'y')]
        yes: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(FileConfig::default_path);
    let file_config = FileConfig::load(&config_path)?;

    // Initialize logging.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| file_config.log.level.as_str().into()),
        )
        .init();

    let storage = file_config.storage.merge(ServiceConfig {
        data_dir: cli.data_dir,
        sqlite_path: cli.sqlite,
        blob_dir: cli.blob_dir,
    });

    match cli.command {
        Commands::Version => {
            println!("coopdesk v{}", env!("CARGO_PKG_VERSION"));
        }

        Commands::Migrate => {
            let db = commands::open_db(&storage)?;
            let version = contracts::schema::migrate(db.as_ref())?;
            info!("database {} at schema v{}", storage.resolve_sqlite_path().display(), version);
            commands::print_json(&serde_json::json!({ "schemaVersion": version }))?;
        }

        Commands::Contracts { action } => {
            let app = commands::open(&storage)?;
            match action {
                ContractAction::List {
                    q,
                    estado,
                    servicio,
                    red,
                    activo,
                    paging,
                } => commands::contracts::list(
                    &app,
                    commands::contracts::ListArgs {
                        q,
                        estado,
                        servicio,
                        red,
                        activo,
                        page: paging.page,
                        per_page: paging.per_page,
                    },
                )?,
                ContractAction::Show { id } => commands::contracts::show(&app, id)?,
                ContractAction::Create { body, document } => commands::contracts::create(
                    &app,
                    body.json_body,
                    body.file.as_deref(),
                    document.as_deref(),
                )?,
                ContractAction::Update { id, body, document } => commands::contracts::update(
                    &app,
                    id,
                    body.json_body,
                    body.file.as_deref(),
                    document.as_deref(),
                )?,
                ContractAction::Delete { id, yes } => commands::contracts::delete(&app, id, yes)?,
            }
        }

        Commands::Ledger { action } => {
            let app = commands::open(&storage)?;
            match action {
                LedgerAction::List {
                    q,
                    cooperativa,
                    contrato,
                    estado,
                    desde,
                    hasta,
                    paging,
                } => commands::ledger::list(
                    &app,
                    commands::ledger::ListArgs {
                        q,
                        cooperativa,
                        contrato,
                        estado,
                        desde,
                        hasta,
                        page: paging.page,
                        per_page: paging.per_page,
                    },
                )?,
                LedgerAction::Show { id } => commands::ledger::show(&app, id)?,
                LedgerAction::Create { body, receipt } => commands::ledger::create(
                    &app,
                    body.json_body,
                    body.file.as_deref(),
                    receipt.as_deref(),
                )?,
                LedgerAction::Update { id, body, receipt } => commands::ledger::update(
                    &app,
                    id,
                    body.json_body,
                    body.file.as_deref(),
                    receipt.as_deref(),
                )?,
                LedgerAction::Delete { id, yes } => commands::ledger::delete(&app, id, yes)?,
            }
        }

        Commands::Report { date } => {
            let app = commands::open(&storage)?;
            commands::catalog::report(&app, date.as_deref())?;
        }

        Commands::Catalog => {
            let app = commands::open(&storage)?;
            commands::catalog::catalog(&app)?;
        }
    }

    Ok(())
}
