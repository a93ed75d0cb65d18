//! Data models for billfold

mod cache_entry;
mod filter;
mod invoice;

pub use cache_entry::{CacheEntry, VersionToken};
pub use filter::InvoiceFilter;
pub use invoice::{
    next_modified, Invoice, InvoiceDraft, InvoiceId, InvoicePatch, InvoiceStatus, LineItem,
    SyncState,
};
