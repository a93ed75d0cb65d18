//! billfold-core - Core library for billfold
//!
//! This crate contains the invoice models, the local cache, the remote source
//! boundary and the sync coordinator that keeps the two consistent. The
//! `InvoiceRepository` facade is the surface presentation code consumes.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod repository;
pub mod state;
pub mod sync;
pub mod util;

pub use config::{BillfoldConfig, RemoteConfig, SyncSettings};
pub use db::{LocalStore, MemoryInvoiceStore, SqliteInvoiceStore};
pub use error::{Error, Result};
pub use models::{
    CacheEntry, Invoice, InvoiceDraft, InvoiceFilter, InvoiceId, InvoicePatch, InvoiceStatus,
    LineItem, SyncState, VersionToken,
};
pub use remote::{
    FetchOutcome, HttpRemoteSource, PushOutcome, RemoteInvoice, RemoteResult, RemoteSource,
    RemoveOutcome, TransportError,
};
pub use repository::{InvoiceRepository, RefreshScope};
pub use state::{Freshness, Snapshot, SyncPhase};
pub use sync::{DeleteOutcome, FlushReport, Resolution, SyncCoordinator};
