use billfold_core::{DeleteOutcome, InvoiceId};

use crate::commands::common::Repository;
use crate::error::CliError;

pub async fn run_delete(repo: &Repository, id: InvoiceId) -> Result<(), CliError> {
    match repo.delete_invoice(id).await? {
        DeleteOutcome::Removed => println!("{id}"),
        DeleteOutcome::Deferred => {
            println!("{id}  [pending]");
            eprintln!("Remote unreachable; the delete will be retried on the next sync.");
        }
    }
    Ok(())
}
