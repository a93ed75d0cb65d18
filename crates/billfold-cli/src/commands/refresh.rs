use billfold_core::{Freshness, InvoiceId, RefreshScope};

use crate::commands::common::{freshness_notice, Repository};
use crate::error::CliError;

pub async fn run_refresh(repo: &Repository, id: Option<InvoiceId>) -> Result<(), CliError> {
    let scope = id.map_or(RefreshScope::All, RefreshScope::One);
    let freshness = repo.refresh(scope).await?;

    match freshness_notice(&freshness) {
        None => println!("Refresh completed"),
        Some(notice) => println!("{notice}"),
    }
    if matches!(freshness, Freshness::Stale { .. }) {
        tracing::warn!("Refresh could not reach the remote");
    }
    Ok(())
}
