use std::env;
use std::path::{Path, PathBuf};

use billfold_core::{
    BillfoldConfig, Freshness, HttpRemoteSource, Invoice, InvoiceRepository, LineItem,
    SqliteInvoiceStore, SyncCoordinator, SyncState,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::CliError;

pub type Repository = InvoiceRepository<SqliteInvoiceStore, HttpRemoteSource>;

#[derive(Debug, Serialize)]
pub struct InvoiceListOutput<'a> {
    pub freshness: &'a Freshness,
    pub invoices: &'a [Invoice],
}

/// Parse a `description:quantity:unit_price` line argument.
///
/// The description may itself contain colons; the last two fields are numeric.
pub fn parse_line_item(raw: &str) -> Result<LineItem, String> {
    let mut parts = raw.rsplitn(3, ':');
    let (Some(price), Some(quantity), Some(description)) =
        (parts.next(), parts.next(), parts.next())
    else {
        return Err(format!(
            "expected \"description:quantity:unit_price\", got \"{raw}\""
        ));
    };
    let description = description.trim();
    if description.is_empty() {
        return Err("line description cannot be empty".to_string());
    }
    let quantity = quantity
        .trim()
        .parse::<Decimal>()
        .map_err(|error| format!("invalid quantity \"{quantity}\": {error}"))?;
    let unit_price = price
        .trim()
        .parse::<Decimal>()
        .map_err(|error| format!("invalid unit price \"{price}\": {error}"))?;
    Ok(LineItem::new(description, quantity, unit_price))
}

pub fn resolve_config_path(cli_config: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_config.or_else(|| env::var_os("BILLFOLD_CONFIG").map(PathBuf::from)) {
        return Ok(path);
    }
    dirs::config_dir()
        .map(|dir| dir.join("billfold").join("config.json"))
        .ok_or_else(|| CliError::Config("failed to resolve the user config directory".into()))
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("billfold").join("billfold.db"))
        .ok_or_else(|| CliError::Config("failed to resolve the user data directory".into()))
}

/// Config file, then `BILLFOLD_*` variables, then command-line flags.
pub fn load_config(
    cli_config: Option<PathBuf>,
    cli_db_path: Option<PathBuf>,
) -> Result<BillfoldConfig, CliError> {
    let path = resolve_config_path(cli_config)?;
    let mut config = BillfoldConfig::load_from_path(&path)?.with_env_overrides()?;
    if let Some(db_path) = cli_db_path {
        config.database_path = Some(db_path);
    }
    Ok(config)
}

pub fn open_repository(config: &BillfoldConfig) -> Result<Repository, CliError> {
    let remote_config = config
        .remote
        .as_ref()
        .ok_or(CliError::RemoteNotConfigured)?;
    let remote = HttpRemoteSource::new(remote_config, config.sync.request_timeout())?;

    let db_path = match &config.database_path {
        Some(path) => path.clone(),
        None => default_db_path()?,
    };
    ensure_parent_dir(&db_path)?;
    let store = SqliteInvoiceStore::open(&db_path)?;
    tracing::debug!(path = %db_path.display(), "Opened local invoice cache");

    let sync = SyncCoordinator::new(store, remote, config.sync)?;
    Ok(InvoiceRepository::new(sync))
}

fn ensure_parent_dir(path: &Path) -> Result<(), CliError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub fn sync_marker(state: SyncState) -> &'static str {
    match state {
        SyncState::Clean => "",
        SyncState::PendingPush => "[pending]",
        SyncState::PendingPull => "[outdated]",
        SyncState::Conflict => "[CONFLICT]",
    }
}

/// Warning line for a result that could not be confirmed by the remote.
pub fn freshness_notice(freshness: &Freshness) -> Option<String> {
    match freshness {
        Freshness::Fresh => None,
        Freshness::Stale { cause } => Some(format!("(stale: showing cached data, {cause})")),
        Freshness::Conflict => Some(
            "(conflict: local edit diverges from the remote, see `billfold resolve`)".to_string(),
        ),
    }
}

pub fn format_invoice_lines(invoices: &[Invoice]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    invoices
        .iter()
        .map(|invoice| {
            let id = invoice.id.to_string();
            let short_id = id.chars().take(13).collect::<String>();
            let customer = truncate(&invoice.customer_ref, 20);
            let relative_time = format_relative_time(invoice.updated_at, now_ms);
            let marker = sync_marker(invoice.sync_state());
            let line = format!(
                "{short_id:<13}  {customer:<20}  {amount:>12}  {status:<9}  {due}  {relative_time}",
                amount = invoice.amount,
                status = invoice.status.as_str(),
                due = invoice.due_date,
            );
            if marker.is_empty() {
                line.trim_end().to_string()
            } else {
                format!("{line}  {marker}")
            }
        })
        .collect()
}

pub fn format_invoice_detail(invoice: &Invoice) -> Vec<String> {
    let mut lines = vec![
        format!("id:        {}", invoice.id),
        format!("customer:  {}", invoice.customer_ref),
        format!("status:    {}", invoice.status),
        format!("issued:    {}", invoice.issue_date),
        format!("due:       {}", invoice.due_date),
        format!("amount:    {}", invoice.amount),
        format!("sync:      {}", invoice.sync_state()),
        format!("updated:   {}", format_timestamp(invoice.updated_at)),
        "lines:".to_string(),
    ];
    lines.extend(invoice.line_items.iter().map(|line| {
        let subtotal = line
            .subtotal()
            .map_or_else(|| "overflow".to_string(), |value| value.to_string());
        format!(
            "  {} x {} @ {} = {subtotal}",
            line.description, line.quantity, line.unit_price
        )
    }));
    lines
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        value.to_string()
    } else {
        let mut truncated = value
            .chars()
            .take(max_chars.saturating_sub(3))
            .collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}
