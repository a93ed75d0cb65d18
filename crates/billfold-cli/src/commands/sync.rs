use crate::commands::common::Repository;
use crate::error::CliError;

pub async fn run_sync(repo: &Repository, as_json: bool) -> Result<(), CliError> {
    let report = repo.sync_pending().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "pushed={} removed={} still_pending={} conflicts={}",
        report.pushed, report.removed, report.still_pending, report.conflicts
    );
    if report.conflicts > 0 {
        eprintln!("Run `billfold conflicts` to review diverged invoices.");
    }
    Ok(())
}
