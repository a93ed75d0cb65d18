use billfold_core::{InvoiceId, InvoicePatch};

use crate::commands::common::{sync_marker, Repository};
use crate::error::CliError;

pub async fn run_update(
    repo: &Repository,
    id: InvoiceId,
    patch: &InvoicePatch,
) -> Result<(), CliError> {
    if patch.is_empty() {
        return Err(CliError::EmptyUpdate);
    }

    let invoice = repo.update_invoice(id, patch).await?;
    let marker = sync_marker(invoice.sync_state());
    if marker.is_empty() {
        println!("{}", invoice.id);
    } else {
        println!("{}  {marker}", invoice.id);
    }
    Ok(())
}
