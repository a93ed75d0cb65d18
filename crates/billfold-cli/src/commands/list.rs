use billfold_core::InvoiceFilter;

use crate::commands::common::{
    format_invoice_lines, freshness_notice, InvoiceListOutput, Repository,
};
use crate::error::CliError;

pub async fn run_list(
    repo: &Repository,
    filter: &InvoiceFilter,
    as_json: bool,
) -> Result<(), CliError> {
    let snapshot = repo.list_invoices(filter).await?;

    if as_json {
        let output = InvoiceListOutput {
            freshness: &snapshot.freshness,
            invoices: &snapshot.value,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if let Some(notice) = freshness_notice(&snapshot.freshness) {
        eprintln!("{notice}");
    }
    if snapshot.value.is_empty() {
        println!("No invoices found.");
        return Ok(());
    }
    for line in format_invoice_lines(&snapshot.value) {
        println!("{line}");
    }
    Ok(())
}
