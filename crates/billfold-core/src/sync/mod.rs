//! Sync coordinator
//!
//! Decides per request whether to answer from the local cache, go to the
//! remote, or both, and reconciles what comes back. Remote fetches run on
//! spawned tasks behind single-flight tickets, so a caller that gives up only
//! detaches; the fetch still completes for everyone else attached to it.
//!
//! Locking, per invoice id:
//! - `write_locks` guard every local read-modify-write, so one writer at a
//!   time touches a cache entry and local edits land in issue order.
//! - `push_locks` serialize remote writes and removals of the same invoice.

mod keyed;
mod merge;
mod retry;
mod tickets;

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::config::SyncSettings;
use crate::db::store::{LIST_SYNCED_PREFIX, SOURCE_KEY};
use crate::db::LocalStore;
use crate::error::{Error, Result};
use crate::models::{
    next_modified, CacheEntry, Invoice, InvoiceDraft, InvoiceFilter, InvoiceId, InvoicePatch,
    SyncState, VersionToken,
};
use crate::remote::{FetchOutcome, PushOutcome, RemoteResult, RemoteSource, TransportError};
use crate::state::{Freshness, Snapshot, SyncPhase};
use crate::util::now_millis;

use keyed::KeyedLocks;
use merge::Merge;
pub use retry::RetryPolicy;
use tickets::{Leader, TicketTable};

type ItemResult = Result<ItemSync>;

/// Result of an item fetch, shared by every caller attached to it
#[derive(Debug, Clone)]
struct ItemSync {
    snapshot: Option<Snapshot<Invoice>>,
    /// Version the remote reported; `Ok(None)` when it has no such record
    remote_version: RemoteResult<Option<VersionToken>>,
}

/// Result of a list fetch, shared by every caller attached to it
#[derive(Debug, Clone)]
enum ListSync {
    Synced(Vec<Invoice>),
    Failed(TransportError),
}

/// How a delete ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeleteOutcome {
    /// Gone from the remote and from the local cache
    Removed,
    /// Remote unreachable; tombstoned locally, removal retried on the next flush
    Deferred,
}

/// Caller decision for an invoice in `Conflict`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Push the local copy over the current remote version
    KeepLocal,
    /// Drop the local edit and take whatever the remote holds
    AcceptRemote,
}

/// Counts from one pass over pending local work
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    pub pushed: usize,
    pub removed: usize,
    pub still_pending: usize,
    pub conflicts: usize,
}

fn list_meta_key(cache_key: &str) -> String {
    format!("{LIST_SYNCED_PREFIX}{cache_key}")
}

fn snapshot_of(entry: CacheEntry) -> Snapshot<Invoice> {
    let freshness = if entry.sync_state() == SyncState::Conflict {
        Freshness::Conflict
    } else {
        Freshness::Fresh
    };
    Snapshot {
        value: entry.invoice,
        freshness,
    }
}

fn invoices(entries: Vec<CacheEntry>) -> Vec<Invoice> {
    entries.into_iter().map(|entry| entry.invoice).collect()
}

struct Inner<L, R> {
    store: L,
    remote: R,
    settings: SyncSettings,
    retry: RetryPolicy,
    items: TicketTable<InvoiceId, ItemResult>,
    lists: TicketTable<String, ListSync>,
    write_locks: KeyedLocks<InvoiceId>,
    push_locks: KeyedLocks<InvoiceId>,
}

/// Coordinates the local cache with the remote source
pub struct SyncCoordinator<L, R> {
    inner: Arc<Inner<L, R>>,
}

impl<L, R> Clone for SyncCoordinator<L, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: LocalStore, R: RemoteSource> SyncCoordinator<L, R> {
    /// Create a coordinator and bind the store to the remote's identity.
    pub fn new(store: L, remote: R, settings: SyncSettings) -> Result<Self> {
        settings.validate()?;
        let source = remote.source_name();
        let coordinator = Self {
            inner: Arc::new(Inner {
                store,
                remote,
                retry: RetryPolicy::from_settings(&settings),
                settings,
                items: TicketTable::new(),
                lists: TicketTable::new(),
                write_locks: KeyedLocks::new(),
                push_locks: KeyedLocks::new(),
            }),
        };
        coordinator.bind_source(&source)?;
        Ok(coordinator)
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.inner.settings
    }

    /// Read one invoice, from the cache while fresh, otherwise from the remote.
    ///
    /// `None` means the invoice does not exist, or is being deleted.
    pub async fn get(&self, id: InvoiceId) -> Result<Option<Snapshot<Invoice>>> {
        if let Some(entry) = self.inner.cached(&id) {
            if entry.tombstoned {
                return Ok(None);
            }
            if entry.is_fresh(now_millis(), self.inner.settings.freshness()) {
                tracing::debug!(%id, "Cache hit");
                return Ok(Some(snapshot_of(entry)));
            }
        }
        self.fetch_item(id).await
    }

    /// Fetch one invoice regardless of freshness.
    pub async fn refresh_one(&self, id: InvoiceId) -> Result<Option<Snapshot<Invoice>>> {
        self.fetch_item(id).await
    }

    async fn fetch_item(&self, id: InvoiceId) -> Result<Option<Snapshot<Invoice>>> {
        Ok(self.join_item(id).await?.snapshot)
    }

    async fn join_item(&self, id: InvoiceId) -> ItemResult {
        let (leader, waiter) = self.inner.items.join(&id);
        if let Some(leader) = leader {
            tracing::debug!(%id, "Fetching invoice");
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                let result = inner.sync_item(id, &leader).await;
                leader.complete(result);
            });
        } else {
            tracing::debug!(%id, "Joined in-flight fetch");
        }
        waiter.wait().await.unwrap_or_else(|| {
            Err(Error::Interrupted(format!(
                "fetch of invoice {id} ended without a result"
            )))
        })
    }

    /// List invoices matching `filter`, newest first.
    pub async fn list(&self, filter: &InvoiceFilter) -> Result<Snapshot<Vec<Invoice>>> {
        filter.validate()?;
        if self.inner.list_is_fresh(&filter.cache_key()) {
            match self.inner.store.list(filter) {
                Ok(entries) => {
                    tracing::debug!(filter = %filter.cache_key(), "List cache hit");
                    return Ok(Snapshot::fresh(invoices(entries)));
                }
                Err(error) => {
                    tracing::warn!(%error, "Local list failed, treating as cache miss");
                }
            }
        }
        self.fetch_list(filter).await
    }

    /// Push pending work, then fetch every invoice from the remote.
    pub async fn refresh_all(&self) -> Result<Snapshot<Vec<Invoice>>> {
        let report = self.flush_pending().await?;
        tracing::debug!(?report, "Flushed before full refresh");
        self.fetch_list(&InvoiceFilter::default()).await
    }

    async fn fetch_list(&self, filter: &InvoiceFilter) -> Result<Snapshot<Vec<Invoice>>> {
        let key = filter.cache_key();
        let (leader, waiter) = self.inner.lists.join(&key);
        if let Some(leader) = leader {
            let inner = Arc::clone(&self.inner);
            let filter = filter.clone();
            tokio::spawn(async move {
                let result = inner.sync_list(&filter, &leader).await;
                leader.complete(result);
            });
        }
        let synced = waiter.wait().await.ok_or_else(|| {
            Error::Interrupted(format!("list fetch for {key} ended without a result"))
        })?;

        match (self.inner.store.list(filter), synced) {
            (Ok(entries), ListSync::Synced(_)) => Ok(Snapshot::fresh(invoices(entries))),
            (Ok(entries), ListSync::Failed(cause)) => {
                Ok(Snapshot::stale(invoices(entries), cause))
            }
            (Err(error), ListSync::Synced(remote)) => {
                tracing::warn!(%error, "Local list failed after sync, serving remote result");
                let mut visible = Vec::with_capacity(remote.len());
                for invoice in remote {
                    // the reconciled local copy wins; tombstoned ids stay hidden
                    let invoice = match self.inner.store.get(&invoice.id) {
                        Ok(Some(entry)) if entry.tombstoned => continue,
                        Ok(Some(entry)) => entry.invoice,
                        Ok(None) => invoice,
                        Err(_) => return Err(error),
                    };
                    if filter.matches(&invoice) {
                        visible.push(invoice);
                    }
                }
                visible.sort_by(|a, b| {
                    b.updated_at
                        .cmp(&a.updated_at)
                        .then_with(|| a.id.cmp(&b.id))
                });
                Ok(Snapshot::fresh(visible))
            }
            (Err(error), ListSync::Failed(_)) => Err(error),
        }
    }

    /// Validate and store a new invoice locally, then push it.
    ///
    /// A push deferred by transport failures still succeeds; the returned
    /// invoice is then `PendingPush`.
    pub async fn create(&self, draft: InvoiceDraft) -> Result<Invoice> {
        let mut invoice = Invoice::from_draft(draft)?;
        invoice.set_sync_state(SyncState::PendingPush);
        let id = invoice.id;
        {
            let _guard = self.inner.write_locks.lock(&id).await;
            self.inner.store.upsert(&CacheEntry {
                invoice,
                fetched_at: 0,
                version: None,
                tombstoned: false,
            })?;
        }
        tracing::info!(%id, "Created invoice locally");
        self.inner.push(id).await
    }

    /// Apply `patch` locally, then push the new revision.
    pub async fn update(&self, id: InvoiceId, patch: &InvoicePatch) -> Result<Invoice> {
        if patch.is_empty() {
            return Err(Error::Validation("update contains no changes".into()));
        }
        if self.inner.cached(&id).is_none() {
            self.fetch_item(id).await?;
        }
        {
            let _guard = self.inner.write_locks.lock(&id).await;
            let mut entry = self
                .inner
                .store
                .get(&id)?
                .filter(|entry| !entry.tombstoned)
                .ok_or(Error::NotFound(id))?;
            if entry.sync_state() == SyncState::Conflict {
                return Err(Error::Conflict(id));
            }
            let mut next = entry
                .invoice
                .patched(patch, next_modified(entry.invoice.updated_at))?;
            next.set_sync_state(SyncState::PendingPush);
            entry.invoice = next;
            self.inner.store.upsert(&entry)?;
        }
        tracing::info!(%id, "Updated invoice locally");
        self.inner.push(id).await
    }

    /// Remove an invoice, remote first.
    pub async fn delete(&self, id: InvoiceId) -> Result<DeleteOutcome> {
        self.inner.remove(id).await
    }

    /// Push every pending edit and retry every deferred removal.
    pub async fn flush_pending(&self) -> Result<FlushReport> {
        let mut report = FlushReport::default();
        for entry in self.inner.store.pending()? {
            let id = entry.id();
            if entry.tombstoned {
                match self.inner.remove(id).await? {
                    DeleteOutcome::Removed => report.removed += 1,
                    DeleteOutcome::Deferred => report.still_pending += 1,
                }
                continue;
            }
            match self.inner.push(id).await {
                Ok(invoice) => match invoice.sync_state() {
                    SyncState::Clean => report.pushed += 1,
                    SyncState::Conflict => report.conflicts += 1,
                    SyncState::PendingPush | SyncState::PendingPull => report.still_pending += 1,
                },
                Err(Error::Rejected { .. } | Error::Conflict(_)) => report.conflicts += 1,
                Err(Error::NotFound(_)) => {}
                Err(error) => return Err(error),
            }
        }
        if report != FlushReport::default() {
            tracing::info!(
                pushed = report.pushed,
                removed = report.removed,
                still_pending = report.still_pending,
                conflicts = report.conflicts,
                "Flushed pending work"
            );
        }
        Ok(report)
    }

    /// Record which remote populates the cache.
    ///
    /// Switching to a different source drops every entry without unsynced
    /// work and forgets list freshness; pending edits, conflicts and
    /// tombstones survive the switch.
    pub fn bind_source(&self, name: &str) -> Result<()> {
        let store = &self.inner.store;
        let previous = store.get_meta(SOURCE_KEY)?;
        if previous.as_deref() == Some(name) {
            return Ok(());
        }
        if let Some(previous) = previous {
            let purged = store.purge_synced()?;
            store.remove_meta_prefix(LIST_SYNCED_PREFIX)?;
            tracing::info!(%previous, source = %name, purged, "Remote source changed, cache reset");
        }
        store.set_meta(SOURCE_KEY, name)
    }

    /// Settle an invoice in `Conflict`.
    ///
    /// Returns the invoice as it stands afterwards, or `None` when accepting
    /// the remote means the invoice no longer exists.
    /// Fails with `Error::Transport` when the remote copy cannot be read; the
    /// invoice then stays in `Conflict`.
    pub async fn resolve_conflict(
        &self,
        id: InvoiceId,
        resolution: Resolution,
    ) -> Result<Option<Invoice>> {
        self.require_conflict(&id)?;
        match resolution {
            Resolution::AcceptRemote => {
                {
                    let _guard = self.inner.write_locks.lock(&id).await;
                    self.require_conflict(&id)?;
                    self.inner.store.mark_sync_state(&id, SyncState::PendingPull)?;
                }
                let cause = match self.fetch_item(id).await {
                    Ok(Some(Snapshot {
                        freshness: Freshness::Stale { cause },
                        ..
                    })) => Error::Transport(cause),
                    Ok(snapshot) => {
                        tracing::info!(%id, "Conflict resolved in favour of the remote");
                        return Ok(snapshot.map(|fetched| fetched.value));
                    }
                    Err(error) => error,
                };
                self.restore_conflict(&id).await?;
                tracing::warn!(%id, error = %cause, "Remote copy unavailable, conflict kept");
                Err(cause)
            }
            Resolution::KeepLocal => {
                let inner = &self.inner;
                let base = self.join_item(id).await?.remote_version?;
                {
                    let _guard = inner.write_locks.lock(&id).await;
                    let mut entry = self.require_conflict(&id)?;
                    entry.version = base;
                    entry.invoice.updated_at = next_modified(entry.invoice.updated_at);
                    entry.invoice.set_sync_state(SyncState::PendingPush);
                    inner.store.upsert(&entry)?;
                }
                tracing::info!(%id, "Conflict resolved in favour of the local copy");
                inner.push(id).await.map(Some)
            }
        }
    }

    /// Put an entry left in `PendingPull` by a failed resolution back into `Conflict`.
    async fn restore_conflict(&self, id: &InvoiceId) -> Result<()> {
        let _guard = self.inner.write_locks.lock(id).await;
        let pending_pull = self.inner.store.get(id)?.is_some_and(|entry| {
            !entry.tombstoned && entry.sync_state() == SyncState::PendingPull
        });
        if pending_pull {
            self.inner.store.mark_sync_state(id, SyncState::Conflict)?;
        }
        Ok(())
    }

    fn require_conflict(&self, id: &InvoiceId) -> Result<CacheEntry> {
        let entry = self
            .inner
            .store
            .get(id)?
            .filter(|entry| !entry.tombstoned)
            .ok_or(Error::NotFound(*id))?;
        if entry.sync_state() != SyncState::Conflict {
            return Err(Error::Validation(format!(
                "invoice {id} has no conflict to resolve"
            )));
        }
        Ok(entry)
    }

    /// Invoices awaiting a conflict decision, newest first.
    pub fn conflicts(&self) -> Result<Vec<Invoice>> {
        Ok(self
            .inner
            .store
            .list(&InvoiceFilter::default())?
            .into_iter()
            .filter(|entry| entry.sync_state() == SyncState::Conflict)
            .map(|entry| entry.invoice)
            .collect())
    }

    /// The cached record, including sync bookkeeping. Never touches the remote.
    pub fn entry(&self, id: &InvoiceId) -> Result<Option<CacheEntry>> {
        self.inner.store.get(id)
    }

    /// Last version token the remote acknowledged for `id`.
    pub fn version_of(&self, id: &InvoiceId) -> Result<Option<VersionToken>> {
        Ok(self.entry(id)?.and_then(|entry| entry.version))
    }

    pub fn phase(&self, id: &InvoiceId) -> SyncPhase {
        self.inner.items.phase(id)
    }

    pub fn list_phase(&self, filter: &InvoiceFilter) -> SyncPhase {
        self.inner.lists.phase(&filter.cache_key())
    }

    /// Outstanding fetch tickets, items and lists together.
    pub fn in_flight(&self) -> usize {
        self.inner.items.len() + self.inner.lists.len()
    }
}

impl<L: LocalStore, R: RemoteSource> Inner<L, R> {
    /// Local read where a storage failure counts as a miss.
    fn cached(&self, id: &InvoiceId) -> Option<CacheEntry> {
        match self.store.get(id) {
            Ok(entry) => entry,
            Err(error) => {
                tracing::warn!(%id, %error, "Local read failed, treating as cache miss");
                None
            }
        }
    }

    /// Decide against the current local entry and store the outcome.
    ///
    /// The caller holds the write lock for `id`. When the local entry cannot
    /// be read nothing is written, so pending edits are never clobbered.
    fn reconcile(
        &self,
        id: &InvoiceId,
        decide: impl FnOnce(Option<CacheEntry>) -> Merge,
    ) -> Option<CacheEntry> {
        let current = match self.store.get(id) {
            Ok(current) => current,
            Err(error) => {
                tracing::warn!(%id, %error, "Local read failed, remote result not cached");
                return decide(None).into_visible();
            }
        };
        let merge = decide(current);
        let written = match &merge {
            Merge::Write(entry) => self.store.upsert(entry),
            Merge::Delete => self.store.delete(id).map(|_| ()),
            Merge::Keep(_) | Merge::Skip => Ok(()),
        };
        if let Err(error) = written {
            tracing::warn!(%id, %error, "Failed to write remote result to the local cache");
        }
        if let Merge::Write(entry) | Merge::Keep(entry) = &merge {
            if entry.sync_state() == SyncState::Conflict {
                tracing::warn!(%id, "Local edit conflicts with the remote copy");
            }
        }
        merge.into_visible()
    }

    async fn sync_item(&self, id: InvoiceId, leader: &Leader<InvoiceId, ItemResult>) -> ItemResult {
        let started_at = now_millis();
        let known = self
            .cached(&id)
            .filter(|entry| !entry.tombstoned && entry.sync_state() != SyncState::PendingPull)
            .and_then(|entry| entry.version);
        let outcome = self
            .retry
            .run("fetch", || self.remote.fetch(id, known.as_ref()))
            .await;

        leader.set_phase(SyncPhase::Reconciling);
        let _guard = self.write_locks.lock(&id).await;
        let now = now_millis();
        let (visible, remote_version) = match outcome {
            Ok(FetchOutcome::Found(remote)) => {
                let version = remote.version.clone();
                let visible =
                    self.reconcile(&id, |current| merge::found(current, remote, now, started_at));
                (visible, Some(version))
            }
            Ok(FetchOutcome::NotModified) => (
                self.reconcile(&id, |current| merge::not_modified(current, now)),
                known,
            ),
            Ok(FetchOutcome::NotFound) => (self.reconcile(&id, merge::not_found), None),
            Err(cause) => {
                let snapshot = match self.cached(&id).filter(|entry| !entry.tombstoned) {
                    Some(entry) if entry.sync_state() == SyncState::Conflict => snapshot_of(entry),
                    Some(entry) => {
                        tracing::warn!(%id, error = %cause, "Serving stale invoice");
                        Snapshot::stale(entry.invoice, cause.clone())
                    }
                    None => return Err(Error::Transport(cause)),
                };
                return Ok(ItemSync {
                    snapshot: Some(snapshot),
                    remote_version: Err(cause),
                });
            }
        };
        tracing::debug!(%id, present = visible.is_some(), "Invoice reconciled");
        Ok(ItemSync {
            snapshot: visible.map(snapshot_of),
            remote_version: Ok(remote_version),
        })
    }

    fn list_is_fresh(&self, cache_key: &str) -> bool {
        let synced_at = match self.store.get_meta(&list_meta_key(cache_key)) {
            Ok(value) => value.and_then(|value| value.parse::<i64>().ok()),
            Err(error) => {
                tracing::warn!(%error, "Failed to read list freshness");
                None
            }
        };
        let threshold = i64::try_from(self.settings.freshness_ms).unwrap_or(i64::MAX);
        synced_at.is_some_and(|at| now_millis().saturating_sub(at) < threshold)
    }

    async fn sync_list(
        &self,
        filter: &InvoiceFilter,
        leader: &Leader<String, ListSync>,
    ) -> ListSync {
        let key = filter.cache_key();
        let started_at = now_millis();
        let outcome = self
            .retry
            .run("fetch_all", || self.remote.fetch_all(filter))
            .await;

        leader.set_phase(SyncPhase::Reconciling);
        let remote = match outcome {
            Ok(remote) => remote,
            Err(cause) => {
                tracing::warn!(filter = %key, error = %cause, "Serving stale invoice list");
                return ListSync::Failed(cause);
            }
        };

        let now = now_millis();
        let mut seen = HashSet::with_capacity(remote.len());
        let mut fetched = Vec::with_capacity(remote.len());
        for item in remote {
            let id = item.invoice.id;
            seen.insert(id);
            fetched.push(item.invoice.clone());
            let _guard = self.write_locks.lock(&id).await;
            self.reconcile(&id, |current| merge::found(current, item, now, started_at));
        }
        if filter.is_unrestricted() {
            self.purge_missing(&seen, started_at).await;
        }
        if let Err(error) = self.store.set_meta(&list_meta_key(&key), &now.to_string()) {
            tracing::warn!(%error, "Failed to record list freshness");
        }
        tracing::info!(filter = %key, count = fetched.len(), "Synced invoice list");
        ListSync::Synced(fetched)
    }

    /// Drop clean entries the remote no longer lists.
    async fn purge_missing(&self, seen: &HashSet<InvoiceId>, started_at: i64) {
        let entries = match self.store.list(&InvoiceFilter::default()) {
            Ok(entries) => entries,
            Err(error) => {
                tracing::warn!(%error, "Skipping purge of remotely deleted invoices");
                return;
            }
        };
        let candidates = entries
            .into_iter()
            .filter(|entry| entry.sync_state() == SyncState::Clean && !seen.contains(&entry.id()))
            .map(|entry| entry.id());
        for id in candidates {
            let _guard = self.write_locks.lock(&id).await;
            // confirmed after the listing was requested: keep it
            let removable = match self.store.get(&id) {
                Ok(Some(entry)) => {
                    entry.sync_state() == SyncState::Clean
                        && !entry.tombstoned
                        && entry.fetched_at <= started_at
                }
                Ok(None) => false,
                Err(error) => {
                    tracing::warn!(%id, %error, "Failed to re-read invoice before purge");
                    false
                }
            };
            if !removable {
                continue;
            }
            match self.store.delete(&id) {
                Ok(_) => tracing::debug!(%id, "Removed invoice deleted remotely"),
                Err(error) => {
                    tracing::warn!(%id, %error, "Failed to remove invoice deleted remotely");
                }
            }
        }
    }

    /// Push the current local revision of `id` if it is `PendingPush`.
    async fn push(&self, id: InvoiceId) -> Result<Invoice> {
        let _push = self.push_locks.lock(&id).await;
        let entry = self
            .store
            .get(&id)?
            .filter(|entry| !entry.tombstoned)
            .ok_or(Error::NotFound(id))?;
        if entry.sync_state() != SyncState::PendingPush {
            return Ok(entry.invoice);
        }

        let outcome = self
            .retry
            .run("push", || self.remote.push(&entry.invoice, entry.version.as_ref()))
            .await;

        let _guard = self.write_locks.lock(&id).await;
        let mut current = self.store.get(&id)?.ok_or(Error::NotFound(id))?;
        match outcome {
            Ok(PushOutcome::Accepted(version)) => {
                current.version = Some(version);
                let same_revision = current.invoice.updated_at == entry.invoice.updated_at;
                if current.sync_state() == SyncState::PendingPush && same_revision {
                    current.invoice.set_sync_state(SyncState::Clean);
                    current.fetched_at = now_millis();
                    tracing::info!(%id, "Push acknowledged");
                } else {
                    tracing::debug!(
                        %id,
                        state = %current.sync_state(),
                        "Push acknowledged for an earlier revision"
                    );
                }
                self.store.upsert(&current)?;
                Ok(current.invoice)
            }
            Ok(PushOutcome::Rejected(reason)) => {
                self.store.mark_sync_state(&id, SyncState::Conflict)?;
                tracing::warn!(%id, %reason, "Push rejected by remote");
                Err(Error::Rejected { id, reason })
            }
            Err(cause) => {
                tracing::warn!(%id, error = %cause, "Push deferred, invoice stays pending");
                Ok(current.invoice)
            }
        }
    }

    /// Remote removal first; local removal only once the remote agrees.
    async fn remove(&self, id: InvoiceId) -> Result<DeleteOutcome> {
        let _push = self.push_locks.lock(&id).await;
        let outcome = self.retry.run("remove", || self.remote.remove(id)).await;

        let _guard = self.write_locks.lock(&id).await;
        match outcome {
            Ok(answer) => {
                self.store.delete(&id)?;
                tracing::info!(%id, ?answer, "Invoice deleted");
                Ok(DeleteOutcome::Removed)
            }
            Err(cause) => {
                if self.store.get(&id)?.is_none() {
                    return Err(Error::Transport(cause));
                }
                self.store.tombstone(&id)?;
                tracing::warn!(%id, error = %cause, "Remote delete deferred, invoice tombstoned");
                Ok(DeleteOutcome::Deferred)
            }
        }
    }
}
