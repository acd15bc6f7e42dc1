//! Single-flight request coalescing.
//!
//! When several callers miss the cache for the same key at once, only the
//! first (the leader) calls the remote; the rest subscribe and receive the
//! leader's result.
//!
//! ```text
//! list("Movie") ─┐
//!                │                            remote
//! list("Movie") ─┼──► Coalescer ──leader────► get_item()
//!                │        │                       │
//! stat("Movie") ─┘        ▼                       ▼
//!                   [all three receive  ◄───── one result]
//! ```
//!
//! If the leader is dropped before completing (a read timed out, say),
//! its guard removes the in-flight entry and closes the channel; waiters
//! observe the closure and race to become the new leader.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use std::hash::Hash;
use tokio::sync::broadcast;
use tracing::trace;

/// Keyed single-flight map.
pub struct Coalescer<K, V> {
    in_flight: DashMap<K, broadcast::Sender<V>>,
}

/// Outcome of registering interest in a key.
enum CoalesceResult<'a, K: Eq + Hash + Clone, V: Clone> {
    /// Caller is the leader and must call [`LeaderGuard::complete`].
    NewRequest(LeaderGuard<'a, K, V>),
    /// Another caller is in flight; wait on the receiver.
    Coalesced(broadcast::Receiver<V>),
}

/// Held by the leader. Dropping it without completing cancels the flight.
struct LeaderGuard<'a, K: Eq + Hash + Clone, V: Clone> {
    coalescer: &'a Coalescer<K, V>,
    key: Option<K>,
}

impl<K: Eq + Hash + Clone, V: Clone> LeaderGuard<'_, K, V> {
    /// Broadcast the result to every waiter and clear the in-flight entry.
    fn complete(mut self, value: V) {
        if let Some(key) = self.key.take() {
            if let Some((_, tx)) = self.coalescer.in_flight.remove(&key) {
                // Receivers may all be gone already
                let _ = tx.send(value);
            }
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Drop for LeaderGuard<'_, K, V> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.coalescer.in_flight.remove(&key);
            trace!("Leader dropped before completing, waiters will retry");
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Coalescer<K, V> {
    pub fn new() -> Self {
        Self {
            in_flight: DashMap::new(),
        }
    }

    /// Register interest in `key`.
    fn register(&self, key: K) -> CoalesceResult<'_, K, V> {
        // Entry API makes check-and-insert atomic
        match self.in_flight.entry(key.clone()) {
            Entry::Occupied(entry) => CoalesceResult::Coalesced(entry.get().subscribe()),
            Entry::Vacant(entry) => {
                // Exactly one value is ever sent per flight
                let (tx, _rx) = broadcast::channel(1);
                entry.insert(tx);
                CoalesceResult::NewRequest(LeaderGuard {
                    coalescer: self,
                    key: Some(key),
                })
            }
        }
    }

    /// Run `work` once per key across concurrent callers.
    ///
    /// `work` is only invoked if this caller becomes the leader.
    pub async fn run<F, Fut>(&self, key: K, work: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let guard = loop {
            match self.register(key.clone()) {
                CoalesceResult::NewRequest(guard) => break guard,
                CoalesceResult::Coalesced(mut rx) => {
                    if let Ok(value) = rx.recv().await {
                        return value;
                    }
                    // Leader cancelled; try to take over
                }
            }
        };

        let value = work().await;
        guard.complete(value.clone());
        value
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Default for Coalescer<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
