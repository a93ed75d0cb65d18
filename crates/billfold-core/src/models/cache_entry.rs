//! Cached invoice record as held by the local store

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::invoice::{Invoice, InvoiceId, SyncState};

/// Opaque version token issued by the remote (an ETag or revision id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(String);

impl VersionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An invoice plus the bookkeeping needed to decide freshness and conflicts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub invoice: Invoice,
    /// When the remote last confirmed this record (Unix ms, 0 = never)
    pub fetched_at: i64,
    /// Last version acknowledged by the remote, `None` if never pushed or pulled
    pub version: Option<VersionToken>,
    /// Deleted locally, removal not yet acknowledged by the remote
    pub tombstoned: bool,
}

impl CacheEntry {
    /// Entry for a record that was just confirmed by the remote.
    pub fn synced(mut invoice: Invoice, version: VersionToken, fetched_at: i64) -> Self {
        invoice.set_sync_state(SyncState::Clean);
        Self {
            invoice,
            fetched_at,
            version: Some(version),
            tombstoned: false,
        }
    }

    pub const fn id(&self) -> InvoiceId {
        self.invoice.id
    }

    pub const fn sync_state(&self) -> SyncState {
        self.invoice.sync_state
    }

    /// Whether the entry was confirmed within `threshold` of `now_ms`.
    ///
    /// Entries marked `PendingPull` are never fresh.
    pub fn is_fresh(&self, now_ms: i64, threshold: Duration) -> bool {
        if self.sync_state() == SyncState::PendingPull || self.fetched_at <= 0 {
            return false;
        }
        let threshold_ms = i64::try_from(threshold.as_millis()).unwrap_or(i64::MAX);
        now_ms.saturating_sub(self.fetched_at) < threshold_ms
    }
}
