//! Reconciliation rules for remote answers against the local copy
//!
//! Pure decisions; the coordinator applies them through the `LocalStore`.

use crate::models::{CacheEntry, SyncState};
use crate::remote::RemoteInvoice;

/// What to do with the local entry after a remote answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Merge {
    /// Store this entry
    Write(CacheEntry),
    /// Leave the local entry as is
    Keep(CacheEntry),
    /// Remove the local entry
    Delete,
    /// Nothing stored and nothing to show
    Skip,
}

impl Merge {
    /// The entry callers should see once the merge is applied.
    pub fn into_visible(self) -> Option<CacheEntry> {
        match self {
            Self::Write(entry) | Self::Keep(entry) if !entry.tombstoned => Some(entry),
            _ => None,
        }
    }
}

fn touched(mut entry: CacheEntry, now: i64) -> CacheEntry {
    entry.fetched_at = now;
    entry
}

/// The remote returned a record.
///
/// `started_at` is when the fetch was issued; a clean entry confirmed after
/// that point is newer than the answer and is kept.
pub fn found(
    current: Option<CacheEntry>,
    incoming: RemoteInvoice,
    now: i64,
    started_at: i64,
) -> Merge {
    let Some(current) = current else {
        return Merge::Write(CacheEntry::synced(incoming.invoice, incoming.version, now));
    };
    if current.tombstoned {
        return Merge::Skip;
    }
    let same_version = current.version.as_ref() == Some(&incoming.version);
    match current.sync_state() {
        SyncState::Clean if same_version => Merge::Write(touched(current, now)),
        SyncState::Clean if current.fetched_at > started_at => Merge::Keep(current),
        SyncState::Clean | SyncState::PendingPull => {
            let mut invoice = incoming.invoice;
            invoice.updated_at = invoice
                .updated_at
                .max(current.invoice.updated_at.saturating_add(1));
            Merge::Write(CacheEntry::synced(invoice, incoming.version, now))
        }
        SyncState::PendingPush if same_version => Merge::Write(touched(current, now)),
        SyncState::PendingPush if current.invoice.same_content(&incoming.invoice) => {
            // the push landed but its acknowledgement never arrived
            let mut invoice = current.invoice;
            invoice.updated_at = invoice.updated_at.max(incoming.invoice.updated_at);
            Merge::Write(CacheEntry::synced(invoice, incoming.version, now))
        }
        SyncState::PendingPush => {
            let mut conflicted = current;
            conflicted.invoice.set_sync_state(SyncState::Conflict);
            Merge::Write(conflicted)
        }
        SyncState::Conflict => Merge::Keep(current),
    }
}

/// The remote has no such record.
pub fn not_found(current: Option<CacheEntry>) -> Merge {
    let Some(current) = current else {
        return Merge::Skip;
    };
    if current.tombstoned {
        return Merge::Delete;
    }
    match current.sync_state() {
        SyncState::Clean | SyncState::PendingPull => Merge::Delete,
        // created locally, never acknowledged
        SyncState::PendingPush if current.version.is_none() => Merge::Keep(current),
        SyncState::PendingPush => {
            let mut conflicted = current;
            conflicted.invoice.set_sync_state(SyncState::Conflict);
            Merge::Write(conflicted)
        }
        SyncState::Conflict => Merge::Keep(current),
    }
}

/// The remote confirmed the cached version is current.
pub fn not_modified(current: Option<CacheEntry>, now: i64) -> Merge {
    match current {
        Some(entry) if !entry.tombstoned => Merge::Write(touched(entry, now)),
        _ => Merge::Skip,
    }
}
