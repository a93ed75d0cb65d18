//! Local invoice cache
//!
//! `LocalStore` is the narrow contract the sync coordinator depends on. Every
//! operation completes synchronously and is safe to call from many threads;
//! implementations serialize writes to the same identifier.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, OptionalExtension};
use rust_decimal::Decimal;

use super::Database;
use crate::error::{Error, Result};
use crate::models::{CacheEntry, Invoice, InvoiceFilter, InvoiceId, SyncState, VersionToken};

/// Meta key prefix under which list freshness is recorded
pub const LIST_SYNCED_PREFIX: &str = "list_synced_at:";
/// Meta key recording which remote populated the cache
pub const SOURCE_KEY: &str = "source";

/// Trait for local invoice cache operations
pub trait LocalStore: Send + Sync + 'static {
    /// Get an entry by ID, tombstoned entries included
    fn get(&self, id: &InvoiceId) -> Result<Option<CacheEntry>>;

    /// Entries matching `filter`, tombstones excluded, ordered by last
    /// modification descending then identifier ascending
    fn list(&self, filter: &InvoiceFilter) -> Result<Vec<CacheEntry>>;

    /// Insert or replace an entry
    fn upsert(&self, entry: &CacheEntry) -> Result<()>;

    /// Physically remove an entry; returns whether it existed
    fn delete(&self, id: &InvoiceId) -> Result<bool>;

    /// Set the sync state of an existing entry
    fn mark_sync_state(&self, id: &InvoiceId, state: SyncState) -> Result<()>;

    /// Hide an entry pending remote removal (state becomes `PendingPush`)
    fn tombstone(&self, id: &InvoiceId) -> Result<()>;

    /// Every `PendingPush` entry, tombstones included, oldest edit first
    fn pending(&self) -> Result<Vec<CacheEntry>>;

    /// Remove entries without unsynced work (`Clean` / `PendingPull`, not
    /// tombstoned); returns how many were removed
    fn purge_synced(&self) -> Result<usize>;

    fn get_meta(&self, key: &str) -> Result<Option<String>>;

    fn set_meta(&self, key: &str, value: &str) -> Result<()>;

    /// Remove every meta key starting with `prefix`
    fn remove_meta_prefix(&self, prefix: &str) -> Result<()>;
}

/// `SQLite` implementation of `LocalStore`
pub struct SqliteInvoiceStore {
    db: Mutex<Database>,
}

impl SqliteInvoiceStore {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    /// Open (and migrate) a store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Database::open(path)?))
    }

    /// Open an in-memory store (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|_| Error::Storage("local store lock poisoned".into()))
    }

    fn query_entries(&self, sql: &str) -> Result<Vec<CacheEntry>> {
        let db = self.lock()?;
        let mut stmt = db.connection().prepare(sql)?;
        let rows = stmt
            .query_map([], RawRow::read)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(CacheEntry::try_from).collect()
    }
}

const SELECT_COLUMNS: &str = "SELECT id, issue_date, due_date, amount, status, customer_ref,
    line_items, updated_at, sync_state, fetched_at, version, tombstoned FROM invoices";

/// Row exactly as stored; parsed into domain types outside the row closure
struct RawRow {
    id: String,
    issue_date: String,
    due_date: String,
    amount: String,
    status: String,
    customer_ref: String,
    line_items: String,
    updated_at: i64,
    sync_state: String,
    fetched_at: i64,
    version: Option<String>,
    tombstoned: bool,
}

impl RawRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            issue_date: row.get(1)?,
            due_date: row.get(2)?,
            amount: row.get(3)?,
            status: row.get(4)?,
            customer_ref: row.get(5)?,
            line_items: row.get(6)?,
            updated_at: row.get(7)?,
            sync_state: row.get(8)?,
            fetched_at: row.get(9)?,
            version: row.get(10)?,
            tombstoned: row.get::<_, i32>(11)? != 0,
        })
    }
}

impl TryFrom<RawRow> for CacheEntry {
    type Error = Error;

    fn try_from(row: RawRow) -> Result<Self> {
        let corrupt = |field: &str, detail: String| {
            Error::Storage(format!("corrupt {field} for invoice {}: {detail}", row.id))
        };
        let id = row
            .id
            .parse::<InvoiceId>()
            .map_err(|error| corrupt("id", error.to_string()))?;
        let invoice = Invoice {
            id,
            issue_date: row
                .issue_date
                .parse()
                .map_err(|error: chrono::ParseError| corrupt("issue_date", error.to_string()))?,
            due_date: row
                .due_date
                .parse()
                .map_err(|error: chrono::ParseError| corrupt("due_date", error.to_string()))?,
            amount: Decimal::from_str(&row.amount)
                .map_err(|error| corrupt("amount", error.to_string()))?,
            status: row
                .status
                .parse()
                .map_err(|error: Error| corrupt("status", error.to_string()))?,
            customer_ref: row.customer_ref.clone(),
            line_items: serde_json::from_str(&row.line_items)
                .map_err(|error| corrupt("line_items", error.to_string()))?,
            updated_at: row.updated_at,
            sync_state: row
                .sync_state
                .parse()
                .map_err(|error: Error| corrupt("sync_state", error.to_string()))?,
        };
        Ok(Self {
            invoice,
            fetched_at: row.fetched_at,
            version: row.version.map(VersionToken::new),
            tombstoned: row.tombstoned,
        })
    }
}

impl LocalStore for SqliteInvoiceStore {
    fn get(&self, id: &InvoiceId) -> Result<Option<CacheEntry>> {
        let row = {
            let db = self.lock()?;
            db.connection()
                .query_row(
                    &format!("{SELECT_COLUMNS} WHERE id = ?"),
                    params![id.as_str()],
                    RawRow::read,
                )
                .optional()?
        };
        row.map(CacheEntry::try_from).transpose()
    }

    fn list(&self, filter: &InvoiceFilter) -> Result<Vec<CacheEntry>> {
        let entries = self.query_entries(&format!(
            "{SELECT_COLUMNS} WHERE tombstoned = 0 ORDER BY updated_at DESC, id ASC"
        ))?;
        Ok(entries
            .into_iter()
            .filter(|entry| filter.matches(&entry.invoice))
            .collect())
    }

    fn upsert(&self, entry: &CacheEntry) -> Result<()> {
        let invoice = &entry.invoice;
        let line_items = serde_json::to_string(&invoice.line_items)?;
        let db = self.lock()?;
        db.connection().execute(
            "INSERT INTO invoices (id, issue_date, due_date, amount, status, customer_ref,
                line_items, updated_at, sync_state, fetched_at, version, tombstoned)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                issue_date = excluded.issue_date,
                due_date = excluded.due_date,
                amount = excluded.amount,
                status = excluded.status,
                customer_ref = excluded.customer_ref,
                line_items = excluded.line_items,
                updated_at = excluded.updated_at,
                sync_state = excluded.sync_state,
                fetched_at = excluded.fetched_at,
                version = excluded.version,
                tombstoned = excluded.tombstoned",
            params![
                invoice.id.as_str(),
                invoice.issue_date.to_string(),
                invoice.due_date.to_string(),
                invoice.amount.to_string(),
                invoice.status.as_str(),
                invoice.customer_ref,
                line_items,
                invoice.updated_at,
                invoice.sync_state.as_str(),
                entry.fetched_at,
                entry.version.as_ref().map(VersionToken::as_str),
                i32::from(entry.tombstoned),
            ],
        )?;
        Ok(())
    }

    fn delete(&self, id: &InvoiceId) -> Result<bool> {
        let db = self.lock()?;
        let rows = db
            .connection()
            .execute("DELETE FROM invoices WHERE id = ?", params![id.as_str()])?;
        Ok(rows > 0)
    }

    fn mark_sync_state(&self, id: &InvoiceId, state: SyncState) -> Result<()> {
        let db = self.lock()?;
        let rows = db.connection().execute(
            "UPDATE invoices SET sync_state = ? WHERE id = ?",
            params![state.as_str(), id.as_str()],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(*id));
        }
        Ok(())
    }

    fn tombstone(&self, id: &InvoiceId) -> Result<()> {
        let db = self.lock()?;
        let rows = db.connection().execute(
            "UPDATE invoices SET tombstoned = 1, sync_state = ? WHERE id = ?",
            params![SyncState::PendingPush.as_str(), id.as_str()],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(*id));
        }
        Ok(())
    }

    fn pending(&self) -> Result<Vec<CacheEntry>> {
        self.query_entries(&format!(
            "{SELECT_COLUMNS} WHERE sync_state = '{}' ORDER BY updated_at ASC, id ASC",
            SyncState::PendingPush.as_str()
        ))
    }

    fn purge_synced(&self) -> Result<usize> {
        let db = self.lock()?;
        let rows = db.connection().execute(
            "DELETE FROM invoices WHERE tombstoned = 0 AND sync_state IN (?, ?)",
            params![SyncState::Clean.as_str(), SyncState::PendingPull.as_str()],
        )?;
        Ok(rows)
    }

    fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let db = self.lock()?;
        let value = db
            .connection()
            .query_row(
                "SELECT value FROM sync_meta WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        let db = self.lock()?;
        db.connection().execute(
            "INSERT INTO sync_meta (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove_meta_prefix(&self, prefix: &str) -> Result<()> {
        let db = self.lock()?;
        db.connection().execute(
            "DELETE FROM sync_meta WHERE substr(key, 1, length(?1)) = ?1",
            params![prefix],
        )?;
        Ok(())
    }
}
