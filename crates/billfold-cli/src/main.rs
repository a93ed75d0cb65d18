//! billfold CLI - Command-line access to the offline-first invoice cache
//!
//! Every command goes through the same repository the library exposes, so
//! reads fall back to cached data and writes queue up while offline.

mod cli;
mod commands;
mod error;

use billfold_core::{InvoiceDraft, InvoiceFilter, InvoicePatch, Resolution};
use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::common::{load_config, open_repository};
use crate::commands::conflicts::run_conflicts;
use crate::commands::create::run_create;
use crate::commands::delete::run_delete;
use crate::commands::get::run_get;
use crate::commands::list::run_list;
use crate::commands::refresh::run_refresh;
use crate::commands::resolve::run_resolve;
use crate::commands::sync::run_sync;
use crate::commands::update::run_update;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "billfold=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = load_config(cli.config, cli.db_path)?;
    let repo = open_repository(&config)?;

    match cli.command {
        Commands::List {
            statuses,
            from,
            to,
            min,
            max,
            customer,
            json,
        } => {
            let filter = InvoiceFilter {
                statuses: statuses.into_iter().collect(),
                issued_from: from,
                issued_to: to,
                min_amount: min,
                max_amount: max,
                customer_ref: customer,
            };
            run_list(&repo, &filter, json).await?;
        }
        Commands::Get { id, json } => run_get(&repo, id, json).await?,
        Commands::Create {
            customer,
            issue,
            due,
            lines,
            status,
        } => {
            let draft = InvoiceDraft::from_lines(customer, issue, due, lines).with_status(status);
            run_create(&repo, draft).await?;
        }
        Commands::Update { id, status, due } => {
            let patch = InvoicePatch {
                status,
                due_date: due,
                ..InvoicePatch::default()
            };
            run_update(&repo, id, &patch).await?;
        }
        Commands::Delete { id } => run_delete(&repo, id).await?,
        Commands::Refresh { id } => run_refresh(&repo, id).await?,
        Commands::Sync { json } => run_sync(&repo, json).await?,
        Commands::Conflicts { json } => run_conflicts(&repo, json)?,
        Commands::Resolve {
            id, keep_local, ..
        } => {
            let resolution = if keep_local {
                Resolution::KeepLocal
            } else {
                Resolution::AcceptRemote
            };
            run_resolve(&repo, id, resolution).await?;
        }
    }

    Ok(())
}
