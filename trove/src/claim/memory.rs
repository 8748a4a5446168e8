//! In-process remote store.
//!
//! [`InMemoryRemoteStore`] implements [`RemoteStore`] with the same uniqueness
//! and push semantics a hosted backend provides. It backs the CLI simulator
//! and the test suites, and supports fault injection:
//!
//! - [`InMemoryRemoteStore::fail_next`] queues errors for upcoming inserts
//! - [`InMemoryRemoteStore::set_latency`] delays every insert
//! - [`InMemoryRemoteStore::record_external`] simulates a claim from another device

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::remote::{
    BoxFuture, DiscoveryFilter, RemoteStore, RemoteSubscription, SubscriptionId,
};
use super::types::{ClaimKey, DiscoveryChange, DiscoveryRecord, InsertOutcome, RemoteError};
use crate::geo::GeoBounds;
use crate::treasure::Treasure;

struct Subscriber {
    filter: DiscoveryFilter,
    tx: mpsc::UnboundedSender<DiscoveryChange>,
}

/// Remote store kept entirely in memory.
#[derive(Default)]
pub struct InMemoryRemoteStore {
    records: DashMap<ClaimKey, DiscoveryRecord>,
    treasures: RwLock<Vec<Treasure>>,
    subscribers: Mutex<HashMap<SubscriptionId, Subscriber>>,
    next_subscription: AtomicU64,
    insert_attempts: AtomicU64,
    faults: Mutex<VecDeque<RemoteError>>,
    latency: Mutex<Option<Duration>>,
}

impl std::fmt::Debug for InMemoryRemoteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryRemoteStore")
            .field("records", &self.records.len())
            .field("treasures", &self.treasures.read().len())
            .field("subscribers", &self.subscribers.lock().len())
            .field("insert_attempts", &self.insert_attempts())
            .finish_non_exhaustive()
    }
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store serving the given catalog from `query_nearby`.
    pub fn with_treasures(treasures: impl IntoIterator<Item = Treasure>) -> Self {
        let store = Self::new();
        store.treasures.write().extend(treasures);
        store
    }

    /// Fail the next insert with `error`. Calls accumulate in FIFO order.
    pub fn fail_next(&self, error: RemoteError) {
        self.faults.lock().push_back(error);
    }

    /// Delay every insert by `latency` (`None` to disable).
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Store a record created elsewhere and push it to subscribers.
    ///
    /// Returns false if a record for the key already existed.
    pub fn record_external(&self, record: DiscoveryRecord) -> bool {
        match self.records.entry(record.key()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                self.publish(DiscoveryChange::Recorded(record));
                true
            }
        }
    }

    /// Remove a record and push the retraction to subscribers.
    pub fn retract(&self, key: &ClaimKey) -> bool {
        let removed = self.records.remove(key).is_some();
        if removed {
            self.publish(DiscoveryChange::Retracted(key.clone()));
        }
        removed
    }

    /// Number of `insert_if_absent` calls received, including failed ones.
    pub fn insert_attempts(&self) -> u64 {
        self.insert_attempts.load(Ordering::SeqCst)
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn contains(&self, key: &ClaimKey) -> bool {
        self.records.contains_key(key)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    fn publish(&self, change: DiscoveryChange) {
        let mut subscribers = self.subscribers.lock();
        // Drop subscribers whose receiver is gone.
        subscribers.retain(|id, sub| {
            if !sub.filter.matches(&change) {
                return true;
            }
            let alive = sub.tx.send(change.clone()).is_ok();
            if !alive {
                trace!(subscription = id.0, "Dropping closed subscription");
            }
            alive
        });
    }
}

impl RemoteStore for InMemoryRemoteStore {
    fn insert_if_absent(
        &self,
        record: DiscoveryRecord,
    ) -> BoxFuture<'_, Result<InsertOutcome, RemoteError>> {
        Box::pin(async move {
            self.insert_attempts.fetch_add(1, Ordering::SeqCst);

            let latency = *self.latency.lock();
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }

            if let Some(error) = self.faults.lock().pop_front() {
                debug!(key = %record.key(), error = %error, "Injected remote failure");
                return Err(error);
            }

            match self.records.entry(record.key()) {
                Entry::Occupied(_) => Ok(InsertOutcome::AlreadyExists),
                Entry::Vacant(slot) => {
                    slot.insert(record.clone());
                    self.publish(DiscoveryChange::Recorded(record));
                    Ok(InsertOutcome::Inserted)
                }
            }
        })
    }

    fn query_nearby(&self, bounds: GeoBounds) -> BoxFuture<'_, Result<Vec<Treasure>, RemoteError>> {
        Box::pin(async move {
            let treasures = self.treasures.read();
            Ok(treasures
                .iter()
                .filter(|t| bounds.contains(&t.coordinate()))
                .cloned()
                .collect())
        })
    }

    fn subscribe(&self, filter: DiscoveryFilter) -> Result<RemoteSubscription, RemoteError> {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::SeqCst));
        let (tx, changes) = mpsc::unbounded_channel();
        self.subscribers.lock().insert(id, Subscriber { filter, tx });
        debug!(subscription = id.0, "Discovery subscription opened");
        Ok(RemoteSubscription { id, changes })
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if self.subscribers.lock().remove(&id).is_some() {
            debug!(subscription = id.0, "Discovery subscription closed");
        }
    }
}
