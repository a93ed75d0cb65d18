use std::path::PathBuf;

use billfold_core::{InvoiceId, InvoiceStatus, LineItem};
use chrono::NaiveDate;
use clap::{ArgGroup, Parser, Subcommand};
use rust_decimal::Decimal;

use crate::commands::common::parse_line_item;

#[derive(Parser)]
#[command(name = "billfold")]
#[command(about = "Work with invoices offline and keep them in sync with the billing API")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the JSON config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Optional path to the local cache database
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List invoices, newest first
    #[command(alias = "ls")]
    List {
        /// Only these statuses (repeatable)
        #[arg(long = "status", value_name = "STATUS")]
        statuses: Vec<InvoiceStatus>,
        /// Issued on or after this date
        #[arg(long, value_name = "DATE")]
        from: Option<NaiveDate>,
        /// Issued on or before this date
        #[arg(long, value_name = "DATE")]
        to: Option<NaiveDate>,
        /// Minimum amount
        #[arg(long, value_name = "AMOUNT")]
        min: Option<Decimal>,
        /// Maximum amount
        #[arg(long, value_name = "AMOUNT")]
        max: Option<Decimal>,
        /// Only this customer
        #[arg(long, value_name = "REF")]
        customer: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one invoice
    Get {
        id: InvoiceId,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create an invoice
    #[command(alias = "new")]
    Create {
        /// Customer reference
        #[arg(long, value_name = "REF")]
        customer: String,
        /// Issue date (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        issue: NaiveDate,
        /// Due date (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        due: NaiveDate,
        /// Line as "description:quantity:unit_price" (repeatable)
        #[arg(long = "line", value_name = "LINE", required = true, value_parser = parse_line_item)]
        lines: Vec<LineItem>,
        /// Initial status
        #[arg(long, default_value = "draft")]
        status: InvoiceStatus,
    },
    /// Change the status or due date of an invoice
    Update {
        id: InvoiceId,
        #[arg(long)]
        status: Option<InvoiceStatus>,
        #[arg(long, value_name = "DATE")]
        due: Option<NaiveDate>,
    },
    /// Delete an invoice
    #[command(alias = "rm")]
    Delete { id: InvoiceId },
    /// Refetch one invoice, or everything when no id is given
    Refresh { id: Option<InvoiceId> },
    /// Push pending edits and deferred deletes
    Sync {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List invoices waiting for a conflict decision
    Conflicts {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Settle a conflicted invoice
    #[command(group(ArgGroup::new("side").required(true).args(["keep_local", "accept_remote"])))]
    Resolve {
        id: InvoiceId,
        /// Push the local copy over the remote one
        #[arg(long)]
        keep_local: bool,
        /// Discard the local edit
        #[arg(long)]
        accept_remote: bool,
    },
}
