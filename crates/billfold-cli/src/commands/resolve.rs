use billfold_core::{InvoiceId, Resolution};

use crate::commands::common::{sync_marker, Repository};
use crate::error::CliError;

pub async fn run_resolve(
    repo: &Repository,
    id: InvoiceId,
    resolution: Resolution,
) -> Result<(), CliError> {
    match repo.resolve_conflict(id, resolution).await? {
        Some(invoice) => {
            let marker = sync_marker(invoice.sync_state());
            if marker.is_empty() {
                println!("{}", invoice.id);
            } else {
                println!("{}  {marker}", invoice.id);
            }
        }
        None => println!("{id} no longer exists remotely; removed locally"),
    }
    Ok(())
}
