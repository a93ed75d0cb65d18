use billfold_core::InvoiceId;

use crate::commands::common::{format_invoice_detail, freshness_notice, Repository};
use crate::error::CliError;

pub async fn run_get(repo: &Repository, id: InvoiceId, as_json: bool) -> Result<(), CliError> {
    let Some(snapshot) = repo.get_invoice(id).await? else {
        return Err(CliError::InvoiceNotFound(id.to_string()));
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    if let Some(notice) = freshness_notice(&snapshot.freshness) {
        eprintln!("{notice}");
    }
    for line in format_invoice_detail(&snapshot.value) {
        println!("{line}");
    }
    Ok(())
}
