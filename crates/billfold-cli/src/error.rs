use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] billfold_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invoice not found: {0}")]
    InvoiceNotFound(String),
    #[error("Nothing to update; pass --status or --due")]
    EmptyUpdate,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "Remote API is not configured. Set BILLFOLD_API_URL or add remote.base_url to the config file."
    )]
    RemoteNotConfigured,
}
