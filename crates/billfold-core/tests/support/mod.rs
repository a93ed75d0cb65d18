//! Scripted in-process remote and helpers shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use billfold_core::{
    CacheEntry, Error, FetchOutcome, Invoice, InvoiceDraft, InvoiceFilter, InvoiceId,
    InvoiceRepository, InvoiceStatus, LineItem, LocalStore, MemoryInvoiceStore, PushOutcome,
    RemoteInvoice, RemoteResult, RemoteSource, RemoveOutcome, SyncCoordinator, SyncSettings,
    SyncState, TransportError, VersionToken,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::watch;

/// A push answer queued ahead of the default behaviour
#[derive(Debug, Clone)]
pub enum ScriptedPush {
    Reject(String),
    Fail(TransportError),
}

#[derive(Default)]
struct Records {
    invoices: HashMap<InvoiceId, RemoteInvoice>,
    next_version: u64,
    pushes: VecDeque<ScriptedPush>,
}

struct Inner {
    name: String,
    records: Mutex<Records>,
    offline: watch::Sender<bool>,
    removes_failing: watch::Sender<bool>,
    fetch_gate: watch::Sender<bool>,
    push_gate: watch::Sender<bool>,
    fetches: AtomicUsize,
    fetch_alls: AtomicUsize,
    pushes: AtomicUsize,
    removes: AtomicUsize,
}

/// In-process `RemoteSource` with call counters and gates that hold calls in flight
#[derive(Clone)]
pub struct FakeRemote {
    inner: Arc<Inner>,
}

fn unreachable() -> TransportError {
    TransportError::Unreachable("connection refused".into())
}

async fn pass(gate: &watch::Sender<bool>) {
    let mut open = gate.subscribe();
    let _ = open.wait_for(|held| !*held).await;
}

impl FakeRemote {
    pub fn named(name: &str) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.to_string(),
                records: Mutex::new(Records::default()),
                offline: watch::Sender::new(false),
                removes_failing: watch::Sender::new(false),
                fetch_gate: watch::Sender::new(false),
                push_gate: watch::Sender::new(false),
                fetches: AtomicUsize::new(0),
                fetch_alls: AtomicUsize::new(0),
                pushes: AtomicUsize::new(0),
                removes: AtomicUsize::new(0),
            }),
        }
    }

    pub fn new() -> Self {
        Self::named("fake")
    }

    fn records(&self) -> std::sync::MutexGuard<'_, Records> {
        self.inner.records.lock().unwrap()
    }

    /// Store `invoice` remotely under a fresh version; returns that version.
    pub fn put(&self, invoice: Invoice) -> VersionToken {
        let mut records = self.records();
        records.next_version += 1;
        let version = VersionToken::new(format!("v{}", records.next_version));
        // remote records never carry local bookkeeping
        let invoice = CacheEntry::synced(invoice, version.clone(), 0).invoice;
        records.invoices.insert(
            invoice.id,
            RemoteInvoice {
                invoice,
                version: version.clone(),
            },
        );
        version
    }

    /// Change an invoice's status remotely, as another client would.
    pub fn set_status(&self, id: InvoiceId, status: InvoiceStatus) -> VersionToken {
        let mut invoice = self.get(id).expect("remote record").invoice;
        invoice.status = status;
        invoice.updated_at += 1;
        self.put(invoice)
    }

    pub fn forget(&self, id: InvoiceId) {
        self.records().invoices.remove(&id);
    }

    pub fn get(&self, id: InvoiceId) -> Option<RemoteInvoice> {
        self.records().invoices.get(&id).cloned()
    }

    pub fn version_of(&self, id: InvoiceId) -> Option<VersionToken> {
        self.get(id).map(|record| record.version)
    }

    pub fn script_push(&self, answer: ScriptedPush) {
        self.records().pushes.push_back(answer);
    }

    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.send_replace(offline);
    }

    pub fn set_removes_failing(&self, failing: bool) {
        self.inner.removes_failing.send_replace(failing);
    }

    pub fn hold_fetches(&self) {
        self.inner.fetch_gate.send_replace(true);
    }

    pub fn release_fetches(&self) {
        self.inner.fetch_gate.send_replace(false);
    }

    pub fn hold_pushes(&self) {
        self.inner.push_gate.send_replace(true);
    }

    pub fn release_pushes(&self) {
        self.inner.push_gate.send_replace(false);
    }

    pub fn fetches(&self) -> usize {
        self.inner.fetches.load(Ordering::SeqCst)
    }

    pub fn fetch_alls(&self) -> usize {
        self.inner.fetch_alls.load(Ordering::SeqCst)
    }

    pub fn pushes(&self) -> usize {
        self.inner.pushes.load(Ordering::SeqCst)
    }

    pub fn removes(&self) -> usize {
        self.inner.removes.load(Ordering::SeqCst)
    }

    fn is_offline(&self) -> bool {
        *self.inner.offline.borrow()
    }
}

impl RemoteSource for FakeRemote {
    fn source_name(&self) -> String {
        self.inner.name.clone()
    }

    async fn fetch(
        &self,
        id: InvoiceId,
        known: Option<&VersionToken>,
    ) -> RemoteResult<FetchOutcome> {
        self.inner.fetches.fetch_add(1, Ordering::SeqCst);
        pass(&self.inner.fetch_gate).await;
        if self.is_offline() {
            return Err(unreachable());
        }
        Ok(match self.get(id) {
            None => FetchOutcome::NotFound,
            Some(record) if known == Some(&record.version) => FetchOutcome::NotModified,
            Some(record) => FetchOutcome::Found(record),
        })
    }

    async fn fetch_all(&self, filter: &InvoiceFilter) -> RemoteResult<Vec<RemoteInvoice>> {
        self.inner.fetch_alls.fetch_add(1, Ordering::SeqCst);
        pass(&self.inner.fetch_gate).await;
        if self.is_offline() {
            return Err(unreachable());
        }
        Ok(self
            .records()
            .invoices
            .values()
            .filter(|record| filter.matches(&record.invoice))
            .cloned()
            .collect())
    }

    async fn push(
        &self,
        invoice: &Invoice,
        base: Option<&VersionToken>,
    ) -> RemoteResult<PushOutcome> {
        self.inner.pushes.fetch_add(1, Ordering::SeqCst);
        pass(&self.inner.push_gate).await;
        let scripted = self.records().pushes.pop_front();
        match scripted {
            Some(ScriptedPush::Reject(reason)) => return Ok(PushOutcome::Rejected(reason)),
            Some(ScriptedPush::Fail(error)) => return Err(error),
            None => {}
        }
        if self.is_offline() {
            return Err(unreachable());
        }
        let current = self.version_of(invoice.id);
        if base.is_some() && base != current.as_ref() {
            return Ok(PushOutcome::Rejected("version mismatch".into()));
        }
        Ok(PushOutcome::Accepted(self.put(invoice.clone())))
    }

    async fn remove(&self, id: InvoiceId) -> RemoteResult<RemoveOutcome> {
        self.inner.removes.fetch_add(1, Ordering::SeqCst);
        if self.is_offline() || *self.inner.removes_failing.borrow() {
            return Err(unreachable());
        }
        Ok(match self.records().invoices.remove(&id) {
            Some(_) => RemoveOutcome::Accepted,
            None => RemoveOutcome::NotFound,
        })
    }
}

/// In-memory store whose reads can be switched to fail
#[derive(Clone, Default)]
pub struct FlakyStore {
    inner: Arc<FlakyInner>,
}

#[derive(Default)]
struct FlakyInner {
    store: MemoryInvoiceStore,
    failing_gets: AtomicBool,
    failing_lists: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_gets(&self, failing: bool) {
        self.inner.failing_gets.store(failing, Ordering::SeqCst);
    }

    pub fn fail_lists(&self, failing: bool) {
        self.inner.failing_lists.store(failing, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool) -> Result<(), Error> {
        if flag.load(Ordering::SeqCst) {
            return Err(Error::Storage("disk I/O error".into()));
        }
        Ok(())
    }
}

impl LocalStore for FlakyStore {
    fn get(&self, id: &InvoiceId) -> Result<Option<CacheEntry>, Error> {
        Self::check(&self.inner.failing_gets)?;
        self.inner.store.get(id)
    }

    fn list(&self, filter: &InvoiceFilter) -> Result<Vec<CacheEntry>, Error> {
        Self::check(&self.inner.failing_lists)?;
        self.inner.store.list(filter)
    }

    fn upsert(&self, entry: &CacheEntry) -> Result<(), Error> {
        self.inner.store.upsert(entry)
    }

    fn delete(&self, id: &InvoiceId) -> Result<bool, Error> {
        self.inner.store.delete(id)
    }

    fn mark_sync_state(&self, id: &InvoiceId, state: SyncState) -> Result<(), Error> {
        self.inner.store.mark_sync_state(id, state)
    }

    fn tombstone(&self, id: &InvoiceId) -> Result<(), Error> {
        self.inner.store.tombstone(id)
    }

    fn pending(&self) -> Result<Vec<CacheEntry>, Error> {
        self.inner.store.pending()
    }

    fn purge_synced(&self) -> Result<usize, Error> {
        self.inner.store.purge_synced()
    }

    fn get_meta(&self, key: &str) -> Result<Option<String>, Error> {
        self.inner.store.get_meta(key)
    }

    fn set_meta(&self, key: &str, value: &str) -> Result<(), Error> {
        self.inner.store.set_meta(key, value)
    }

    fn remove_meta_prefix(&self, prefix: &str) -> Result<(), Error> {
        self.inner.store.remove_meta_prefix(prefix)
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn draft(customer: &str, price: Decimal) -> InvoiceDraft {
    InvoiceDraft::from_lines(
        customer,
        date(2024, 4, 1),
        date(2024, 4, 30),
        vec![LineItem::new("Consulting", dec!(1), price)],
    )
}

/// An invoice that only exists remotely so far.
pub fn remote_invoice(amount: Decimal, status: InvoiceStatus) -> Invoice {
    Invoice::with_id(InvoiceId::new(), draft("ACME", amount).with_status(status), 1_000).unwrap()
}

/// Fast retries so failure paths finish quickly.
pub fn settings() -> SyncSettings {
    SyncSettings::default()
        .with_backoff(Duration::from_millis(1), Duration::from_millis(4))
        .with_request_timeout(Duration::from_secs(5))
}

pub type Repo = InvoiceRepository<MemoryInvoiceStore, FakeRemote>;

pub fn repository_with(remote: &FakeRemote, settings: SyncSettings) -> Repo {
    let sync = SyncCoordinator::new(MemoryInvoiceStore::new(), remote.clone(), settings).unwrap();
    InvoiceRepository::new(sync)
}

pub fn repository(remote: &FakeRemote) -> Repo {
    repository_with(remote, settings())
}

pub fn repository_on<L: LocalStore>(
    store: L,
    remote: &FakeRemote,
) -> InvoiceRepository<L, FakeRemote> {
    InvoiceRepository::new(SyncCoordinator::new(store, remote.clone(), settings()).unwrap())
}

/// Poll `condition` until it holds, failing the test after two seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
