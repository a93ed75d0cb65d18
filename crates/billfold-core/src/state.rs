//! Sync state types shared by the coordinator and its callers.

use serde::Serialize;

use crate::remote::TransportError;

/// Where a key stands in its fetch cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum SyncPhase {
    #[default]
    Idle,
    Fetching,
    Reconciling,
}

/// How far a read result can be trusted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Freshness {
    /// Confirmed by the remote within the freshness window
    Fresh,
    /// Remote unavailable; last-known local value
    Stale { cause: TransportError },
    /// Local edit diverges from the remote and needs a decision
    Conflict,
}

impl Freshness {
    pub const fn is_stale(&self) -> bool {
        matches!(self, Self::Stale { .. })
    }
}

/// A read result plus its freshness.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Snapshot<T> {
    pub value: T,
    pub freshness: Freshness,
}

impl<T> Snapshot<T> {
    pub const fn fresh(value: T) -> Self {
        Self {
            value,
            freshness: Freshness::Fresh,
        }
    }

    pub const fn stale(value: T, cause: TransportError) -> Self {
        Self {
            value,
            freshness: Freshness::Stale { cause },
        }
    }
}
