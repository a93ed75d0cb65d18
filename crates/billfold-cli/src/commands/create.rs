use billfold_core::InvoiceDraft;

use crate::commands::common::{sync_marker, Repository};
use crate::error::CliError;

pub async fn run_create(repo: &Repository, draft: InvoiceDraft) -> Result<(), CliError> {
    let invoice = repo.create_invoice(draft).await?;
    let marker = sync_marker(invoice.sync_state());
    if marker.is_empty() {
        println!("{}", invoice.id);
    } else {
        println!("{}  {marker}", invoice.id);
    }
    Ok(())
}
