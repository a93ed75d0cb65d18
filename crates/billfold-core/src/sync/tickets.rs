//! Single-flight ticket table
//!
//! A ticket exists per key while one remote fetch for that key is
//! outstanding. The first caller becomes the leader and owns the fetch; every
//! later caller subscribes to the same result channel.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::state::SyncPhase;

struct Ticket<V> {
    phase: SyncPhase,
    rx: watch::Receiver<Option<V>>,
}

type Tickets<K, V> = Arc<Mutex<HashMap<K, Ticket<V>>>>;

fn lock<K, V>(tickets: &Tickets<K, V>) -> MutexGuard<'_, HashMap<K, Ticket<V>>> {
    tickets.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Outstanding fetches keyed by invoice id or list query
pub struct TicketTable<K, V> {
    tickets: Tickets<K, V>,
}

impl<K, V> TicketTable<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            tickets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Attach to the ticket for `key`, opening one if none is outstanding.
    ///
    /// Returns a `Leader` only to the caller that opened the ticket. Lookup
    /// and insertion happen under one lock, so two callers can never both
    /// become leader for the same key.
    pub fn join(&self, key: &K) -> (Option<Leader<K, V>>, Waiter<V>) {
        let mut tickets = lock(&self.tickets);
        if let Some(ticket) = tickets.get(key) {
            return (None, Waiter { rx: ticket.rx.clone() });
        }
        let (tx, rx) = watch::channel(None);
        tickets.insert(
            key.clone(),
            Ticket {
                phase: SyncPhase::Fetching,
                rx: rx.clone(),
            },
        );
        let leader = Leader {
            key: key.clone(),
            tx: Some(tx),
            tickets: Arc::clone(&self.tickets),
        };
        (Some(leader), Waiter { rx })
    }

    pub fn phase(&self, key: &K) -> SyncPhase {
        lock(&self.tickets)
            .get(key)
            .map_or(SyncPhase::Idle, |ticket| ticket.phase)
    }

    pub fn len(&self) -> usize {
        lock(&self.tickets).len()
    }
}

impl<K, V> Default for TicketTable<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// The caller responsible for running the fetch behind a ticket
///
/// Dropping a leader without completing it closes the ticket; attached
/// waiters then observe `None`.
pub struct Leader<K: Eq + Hash, V> {
    key: K,
    tx: Option<watch::Sender<Option<V>>>,
    tickets: Tickets<K, V>,
}

impl<K: Eq + Hash, V> Leader<K, V> {
    pub fn set_phase(&self, phase: SyncPhase) {
        if let Some(ticket) = lock(&self.tickets).get_mut(&self.key) {
            ticket.phase = phase;
        }
    }

    /// Close the ticket and hand `value` to every attached waiter.
    pub fn complete(mut self, value: V) {
        let mut tickets = lock(&self.tickets);
        tickets.remove(&self.key);
        if let Some(tx) = self.tx.take() {
            // No receivers left means every caller detached; nothing to deliver.
            let _ = tx.send(Some(value));
        }
    }
}

impl<K: Eq + Hash, V> Drop for Leader<K, V> {
    fn drop(&mut self) {
        if self.tx.take().is_some() {
            lock(&self.tickets).remove(&self.key);
        }
    }
}

/// A caller attached to a ticket
pub struct Waiter<V> {
    rx: watch::Receiver<Option<V>>,
}

impl<V: Clone> Waiter<V> {
    /// Wait for the shared result; `None` if the ticket closed without one.
    pub async fn wait(mut self) -> Option<V> {
        let value = self.rx.wait_for(Option::is_some).await.ok()?;
        value.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_second_caller_attaches() {
        let table = TicketTable::<u32, String>::new();
        let (leader, first) = table.join(&1);
        let (none, second) = table.join(&1);
        assert!(leader.is_some());
        assert!(none.is_none());
        assert_eq!(table.len(), 1);
        assert_eq!(table.phase(&1), SyncPhase::Fetching);

        let leader = leader.unwrap();
        leader.set_phase(SyncPhase::Reconciling);
        assert_eq!(table.phase(&1), SyncPhase::Reconciling);
        leader.complete("done".to_string());

        assert_eq!(first.wait().await.as_deref(), Some("done"));
        assert_eq!(second.wait().await.as_deref(), Some("done"));
        assert_eq!(table.phase(&1), SyncPhase::Idle);
        assert_eq!(table.len(), 0);
    }

    #[tokio::test]
    async fn test_completed_ticket_is_not_reused() {
        let table = TicketTable::<u32, u8>::new();
        let (leader, _) = table.join(&1);
        leader.unwrap().complete(1);
        let (leader, _) = table.join(&1);
        assert!(leader.is_some());
    }

    #[tokio::test]
    async fn test_dropped_leader_releases_waiters() {
        let table = TicketTable::<u32, u8>::new();
        let (leader, waiter) = table.join(&7);
        drop(leader);
        assert_eq!(waiter.wait().await, None);
        assert_eq!(table.len(), 0);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let table = TicketTable::<u32, u8>::new();
        let (a, _) = table.join(&1);
        let (b, _) = table.join(&2);
        assert!(a.is_some() && b.is_some());
        assert_eq!(table.len(), 2);
    }
}
