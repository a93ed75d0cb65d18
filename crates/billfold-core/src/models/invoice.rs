//! Invoice model

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// A unique identifier for an invoice, using UUID v7 (time-sortable)
///
/// Assigned once on creation and never reused after deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InvoiceId(Uuid);

impl InvoiceId {
    /// Create a new unique invoice ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for InvoiceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for InvoiceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s.trim())?))
    }
}

/// Business status of an invoice
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Issued,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub const ALL: [Self; 5] = [
        Self::Draft,
        Self::Issued,
        Self::Paid,
        Self::Overdue,
        Self::Cancelled,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Issued => "issued",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = Error;

    /// Case-insensitive, so minor casing drift from callers is tolerated.
    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::Validation(format!("unknown invoice status: {wanted}")))
    }
}

/// Synchronization state of the local copy of an invoice
///
/// Only the sync coordinator moves an invoice between these states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Local copy matches the last acknowledged remote version
    #[default]
    Clean,
    /// Local edit (or deletion) not yet acknowledged by the remote
    PendingPush,
    /// Local copy is known to be outdated and must be fetched again
    PendingPull,
    /// Local and remote diverged; a caller has to decide
    Conflict,
}

impl SyncState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::PendingPush => "pending_push",
            Self::PendingPull => "pending_pull",
            Self::Conflict => "conflict",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "clean" => Ok(Self::Clean),
            "pending_push" => Ok(Self::PendingPush),
            "pending_pull" => Ok(Self::PendingPull),
            "conflict" => Ok(Self::Conflict),
            other => Err(Error::Serialization(format!("unknown sync state: {other}"))),
        }
    }
}

/// A single billed line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

impl LineItem {
    pub fn new(description: impl Into<String>, quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            description: description.into(),
            quantity,
            unit_price,
        }
    }

    /// Exact `quantity * unit_price`, or `None` when it overflows.
    #[must_use]
    pub fn subtotal(&self) -> Option<Decimal> {
        self.quantity.checked_mul(self.unit_price)
    }
}

fn checked_total(line_items: &[LineItem]) -> Option<Decimal> {
    line_items
        .iter()
        .try_fold(Decimal::ZERO, |total, line| total.checked_add(line.subtotal()?))
}

/// User-entered data for a new invoice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceDraft {
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub amount: Decimal,
    pub status: InvoiceStatus,
    pub customer_ref: String,
    pub line_items: Vec<LineItem>,
}

impl InvoiceDraft {
    /// Draft whose amount is the sum of the given lines.
    ///
    /// An overflowing sum leaves the amount at zero; validation rejects it.
    pub fn from_lines(
        customer_ref: impl Into<String>,
        issue_date: NaiveDate,
        due_date: NaiveDate,
        line_items: Vec<LineItem>,
    ) -> Self {
        let amount = checked_total(&line_items).unwrap_or_default();
        Self {
            issue_date,
            due_date,
            amount,
            status: InvoiceStatus::Draft,
            customer_ref: customer_ref.into(),
            line_items,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: InvoiceStatus) -> Self {
        self.status = status;
        self
    }
}

/// Partial update; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicePatch {
    #[serde(default)]
    pub issue_date: Option<NaiveDate>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub status: Option<InvoiceStatus>,
    #[serde(default)]
    pub customer_ref: Option<String>,
    #[serde(default)]
    pub line_items: Option<Vec<LineItem>>,
}

impl InvoicePatch {
    pub const fn status(status: InvoiceStatus) -> Self {
        Self {
            issue_date: None,
            due_date: None,
            amount: None,
            status: Some(status),
            customer_ref: None,
            line_items: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// An invoice in the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    /// Unique identifier, stable across sync
    pub id: InvoiceId,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    /// Always equal to the sum of the line subtotals
    pub amount: Decimal,
    pub status: InvoiceStatus,
    pub customer_ref: String,
    /// Ordered lines
    pub line_items: Vec<LineItem>,
    /// Last modification (Unix ms); strictly increases per identifier
    pub updated_at: i64,
    #[serde(default)]
    pub(crate) sync_state: SyncState,
}

impl Invoice {
    /// Build a brand-new invoice from a draft, assigning a fresh id.
    pub fn from_draft(draft: InvoiceDraft) -> Result<Self> {
        Self::with_id(InvoiceId::new(), draft, chrono::Utc::now().timestamp_millis())
    }

    /// Build an invoice with a known identity, e.g. one received from the remote.
    pub fn with_id(id: InvoiceId, draft: InvoiceDraft, updated_at: i64) -> Result<Self> {
        let invoice = Self {
            id,
            issue_date: draft.issue_date,
            due_date: draft.due_date,
            amount: draft.amount,
            status: draft.status,
            customer_ref: draft.customer_ref,
            line_items: draft.line_items,
            updated_at,
            sync_state: SyncState::Clean,
        };
        invoice.validate()?;
        Ok(invoice)
    }

    pub const fn sync_state(&self) -> SyncState {
        self.sync_state
    }

    pub(crate) fn set_sync_state(&mut self, state: SyncState) {
        self.sync_state = state;
    }

    /// Sum of all line subtotals, or `None` when the arithmetic overflows.
    #[must_use]
    pub fn line_total(&self) -> Option<Decimal> {
        checked_total(&self.line_items)
    }

    /// Check every model invariant; violations are rejected, never corrected.
    pub fn validate(&self) -> Result<()> {
        if self.customer_ref.trim().is_empty() {
            return Err(Error::Validation("customer reference is empty".into()));
        }
        if self.due_date < self.issue_date {
            return Err(Error::Validation(format!(
                "due date {} precedes issue date {}",
                self.due_date, self.issue_date
            )));
        }
        for (index, line) in self.line_items.iter().enumerate() {
            if line.description.trim().is_empty() {
                return Err(Error::Validation(format!(
                    "line {} has no description",
                    index + 1
                )));
            }
            if line.quantity.is_sign_negative() || line.unit_price.is_sign_negative() {
                return Err(Error::Validation(format!(
                    "line {} has a negative quantity or price",
                    index + 1
                )));
            }
        }
        let total = self
            .line_total()
            .ok_or_else(|| Error::Validation("line total overflows".into()))?;
        if self.amount != total {
            return Err(Error::Validation(format!(
                "amount {} does not equal line total {}",
                self.amount, total
            )));
        }
        Ok(())
    }

    /// Apply a patch, producing a new validated revision stamped `updated_at`.
    pub fn patched(&self, patch: &InvoicePatch, updated_at: i64) -> Result<Self> {
        let mut next = self.clone();
        if let Some(issue_date) = patch.issue_date {
            next.issue_date = issue_date;
        }
        if let Some(due_date) = patch.due_date {
            next.due_date = due_date;
        }
        if let Some(amount) = patch.amount {
            next.amount = amount;
        }
        if let Some(status) = patch.status {
            next.status = status;
        }
        if let Some(customer_ref) = &patch.customer_ref {
            next.customer_ref.clone_from(customer_ref);
        }
        if let Some(line_items) = &patch.line_items {
            next.line_items.clone_from(line_items);
        }
        next.updated_at = updated_at;
        next.validate()?;
        Ok(next)
    }

    /// Data-only comparison, ignoring sync bookkeeping.
    pub fn same_content(&self, other: &Self) -> bool {
        self.id == other.id
            && self.issue_date == other.issue_date
            && self.due_date == other.due_date
            && self.amount == other.amount
            && self.status == other.status
            && self.customer_ref == other.customer_ref
            && self.line_items == other.line_items
    }
}

/// Next modification stamp: wall clock, but never at or below `previous`.
pub fn next_modified(previous: i64) -> i64 {
    chrono::Utc::now()
        .timestamp_millis()
        .max(previous.saturating_add(1))
}
