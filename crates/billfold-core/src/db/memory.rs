//! In-memory `LocalStore`, for tests and throwaway sessions

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::store::LocalStore;
use crate::error::{Error, Result};
use crate::models::{CacheEntry, InvoiceFilter, InvoiceId, SyncState};

#[derive(Default)]
struct Tables {
    invoices: HashMap<InvoiceId, CacheEntry>,
    meta: BTreeMap<String, String>,
}

/// Volatile store keeping every entry in a map
#[derive(Default)]
pub struct MemoryInvoiceStore {
    tables: Mutex<Tables>,
}

impl MemoryInvoiceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| Error::Storage("memory store lock poisoned".into()))
    }
}

fn newest_first(a: &CacheEntry, b: &CacheEntry) -> std::cmp::Ordering {
    b.invoice
        .updated_at
        .cmp(&a.invoice.updated_at)
        .then_with(|| a.id().cmp(&b.id()))
}

impl LocalStore for MemoryInvoiceStore {
    fn get(&self, id: &InvoiceId) -> Result<Option<CacheEntry>> {
        Ok(self.lock()?.invoices.get(id).cloned())
    }

    fn list(&self, filter: &InvoiceFilter) -> Result<Vec<CacheEntry>> {
        let tables = self.lock()?;
        let mut entries: Vec<_> = tables
            .invoices
            .values()
            .filter(|entry| !entry.tombstoned && filter.matches(&entry.invoice))
            .cloned()
            .collect();
        entries.sort_by(newest_first);
        Ok(entries)
    }

    fn upsert(&self, entry: &CacheEntry) -> Result<()> {
        self.lock()?.invoices.insert(entry.id(), entry.clone());
        Ok(())
    }

    fn delete(&self, id: &InvoiceId) -> Result<bool> {
        Ok(self.lock()?.invoices.remove(id).is_some())
    }

    fn mark_sync_state(&self, id: &InvoiceId, state: SyncState) -> Result<()> {
        let mut tables = self.lock()?;
        let entry = tables.invoices.get_mut(id).ok_or(Error::NotFound(*id))?;
        entry.invoice.set_sync_state(state);
        Ok(())
    }

    fn tombstone(&self, id: &InvoiceId) -> Result<()> {
        let mut tables = self.lock()?;
        let entry = tables.invoices.get_mut(id).ok_or(Error::NotFound(*id))?;
        entry.tombstoned = true;
        entry.invoice.set_sync_state(SyncState::PendingPush);
        Ok(())
    }

    fn pending(&self) -> Result<Vec<CacheEntry>> {
        let tables = self.lock()?;
        let mut entries: Vec<_> = tables
            .invoices
            .values()
            .filter(|entry| entry.sync_state() == SyncState::PendingPush)
            .cloned()
            .collect();
        entries.sort_by_key(|entry| (entry.invoice.updated_at, entry.id()));
        Ok(entries)
    }

    fn purge_synced(&self) -> Result<usize> {
        let mut tables = self.lock()?;
        let before = tables.invoices.len();
        tables.invoices.retain(|_, entry| {
            entry.tombstoned
                || !matches!(
                    entry.sync_state(),
                    SyncState::Clean | SyncState::PendingPull
                )
        });
        Ok(before - tables.invoices.len())
    }

    fn get_meta(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.meta.get(key).cloned())
    }

    fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.meta.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_meta_prefix(&self, prefix: &str) -> Result<()> {
        self.lock()?.meta.retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::tests::exercise_store;

    #[test]
    fn test_memory_store_contract() {
        exercise_store(&MemoryInvoiceStore::new());
    }
}
