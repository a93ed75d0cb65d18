use crate::commands::common::{format_invoice_lines, Repository};
use crate::error::CliError;

pub fn run_conflicts(repo: &Repository, as_json: bool) -> Result<(), CliError> {
    let conflicts = repo.conflicts()?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&conflicts)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts.");
        return Ok(());
    }
    for line in format_invoice_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}
