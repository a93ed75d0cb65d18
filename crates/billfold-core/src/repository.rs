//! Invoice repository
//!
//! The surface a presentation layer talks to. Every call routes through the
//! sync coordinator; the repository itself keeps no state.

use std::time::Duration;

use tokio::task::JoinHandle;

use crate::db::LocalStore;
use crate::error::Result;
use crate::models::{
    CacheEntry, Invoice, InvoiceDraft, InvoiceFilter, InvoiceId, InvoicePatch, VersionToken,
};
use crate::remote::RemoteSource;
use crate::state::{Freshness, Snapshot, SyncPhase};
use crate::sync::{DeleteOutcome, FlushReport, Resolution, SyncCoordinator};

/// What a refresh should cover
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshScope {
    One(InvoiceId),
    /// Flush pending work, then refetch everything
    All,
}

/// Facade over the sync coordinator
pub struct InvoiceRepository<L, R> {
    sync: SyncCoordinator<L, R>,
}

impl<L, R> Clone for InvoiceRepository<L, R> {
    fn clone(&self) -> Self {
        Self {
            sync: self.sync.clone(),
        }
    }
}

impl<L: LocalStore, R: RemoteSource> InvoiceRepository<L, R> {
    pub const fn new(sync: SyncCoordinator<L, R>) -> Self {
        Self { sync }
    }

    /// Invoices matching `filter`, newest first
    pub async fn list_invoices(&self, filter: &InvoiceFilter) -> Result<Snapshot<Vec<Invoice>>> {
        self.sync.list(filter).await
    }

    pub async fn get_invoice(&self, id: InvoiceId) -> Result<Option<Snapshot<Invoice>>> {
        self.sync.get(id).await
    }

    pub async fn create_invoice(&self, draft: InvoiceDraft) -> Result<Invoice> {
        self.sync.create(draft).await
    }

    pub async fn update_invoice(&self, id: InvoiceId, patch: &InvoicePatch) -> Result<Invoice> {
        self.sync.update(id, patch).await
    }

    pub async fn delete_invoice(&self, id: InvoiceId) -> Result<DeleteOutcome> {
        self.sync.delete(id).await
    }

    /// Refetch regardless of freshness; returns how current the result is.
    ///
    /// A single invoice that no longer exists anywhere counts as `Fresh`.
    pub async fn refresh(&self, scope: RefreshScope) -> Result<Freshness> {
        match scope {
            RefreshScope::One(id) => Ok(self
                .sync
                .refresh_one(id)
                .await?
                .map_or(Freshness::Fresh, |snapshot| snapshot.freshness)),
            RefreshScope::All => Ok(self.sync.refresh_all().await?.freshness),
        }
    }

    /// Push pending edits and deferred deletes without fetching.
    pub async fn sync_pending(&self) -> Result<FlushReport> {
        self.sync.flush_pending().await
    }

    pub async fn resolve_conflict(
        &self,
        id: InvoiceId,
        resolution: Resolution,
    ) -> Result<Option<Invoice>> {
        self.sync.resolve_conflict(id, resolution).await
    }

    /// Invoices waiting for a conflict decision
    pub fn conflicts(&self) -> Result<Vec<Invoice>> {
        self.sync.conflicts()
    }

    /// Cached record with its sync bookkeeping, without contacting the remote
    pub fn cache_entry(&self, id: &InvoiceId) -> Result<Option<CacheEntry>> {
        self.sync.entry(id)
    }

    /// Last version token the remote acknowledged for `id`
    pub fn version_of(&self, id: &InvoiceId) -> Result<Option<VersionToken>> {
        self.sync.version_of(id)
    }

    /// Where the fetch of `id` stands; `Idle` when none is outstanding.
    pub fn phase(&self, id: &InvoiceId) -> SyncPhase {
        self.sync.phase(id)
    }

    pub fn list_phase(&self, filter: &InvoiceFilter) -> SyncPhase {
        self.sync.list_phase(filter)
    }

    /// Remote fetches currently outstanding
    pub fn in_flight(&self) -> usize {
        self.sync.in_flight()
    }

    /// Run a full refresh every `interval` until the handle is aborted.
    ///
    /// The first refresh happens immediately. Failures are logged and the
    /// loop keeps going.
    pub fn spawn_background_sync(&self, interval: Duration) -> JoinHandle<()> {
        let repository = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match repository.refresh(RefreshScope::All).await {
                    Ok(Freshness::Stale { cause }) => {
                        tracing::warn!(
                            error = %cause,
                            "Background sync could not reach the remote"
                        );
                    }
                    Ok(_) => tracing::debug!("Background sync completed"),
                    Err(error) => tracing::warn!(%error, "Background sync failed"),
                }
            }
        })
    }
}
