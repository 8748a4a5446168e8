//! Idempotent claim store.
//!
//! [`ClaimStore`] records discoveries with a command/reconciliation model:
//!
//! ```text
//!  claim(t, u) ──► local record (InFlight) ──► RemoteStore::insert_if_absent
//!                        │                          │
//!                        │         Inserted / AlreadyExists ──► Confirmed
//!                        │         Rejected ──────────────────► rolled back
//!                        │         Unavailable / timeout ─────► Queued or rolled back
//!                        │
//!  discovery feed ──► reconcile() ──► Applied / AlreadyKnown / Reverted / Ignored
//! ```
//!
//! A local record for a key means "claimed" to every later caller: the second
//! `claim` for the same key returns [`ClaimOutcome::AlreadyClaimed`] without a
//! remote call. Rollbacks are published as [`DiscoveryChange::Retracted`] on a
//! local change feed, merged into every [`DiscoveryFeed`], so consumers that
//! already saw the optimistic claim can revert it.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use super::remote::{DiscoveryFilter, RemoteStore, RemoteSubscription};
use super::types::{
    ClaimError, ClaimKey, ClaimOutcome, DiscoveryChange, DiscoveryRecord, InsertOutcome,
    RemoteError,
};

/// Default time to wait for a remote insert before treating it as a network failure.
pub const DEFAULT_CLAIM_TIMEOUT: Duration = Duration::from_secs(15);

/// Default interval between retry queue flushes.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(30);

/// Capacity of the local change feed.
const LOCAL_FEED_CAPACITY: usize = 256;

/// Resubmission policy for claims that failed with a network error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of resubmissions allowed after the first failure.
    ///
    /// Zero disables the retry queue: network failures roll back immediately.
    pub max_attempts: u32,
    /// How often queued claims are flushed by the discovery session.
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

impl RetryPolicy {
    pub fn is_enabled(&self) -> bool {
        self.max_attempts > 0
    }
}

/// Claim store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimStoreConfig {
    pub claim_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ClaimStoreConfig {
    fn default() -> Self {
        Self {
            claim_timeout: DEFAULT_CLAIM_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

/// How a feed change was applied to local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// The record was new locally and is now confirmed.
    Applied,
    /// A local record already existed; nothing changed beyond confirmation.
    AlreadyKnown,
    /// A local record was removed.
    Reverted,
    /// Retraction for a key with no local record.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordStatus {
    /// Submitted, waiting for the remote answer.
    InFlight,
    /// Failed with a network error, waiting for resubmission.
    Queued,
    /// Acknowledged by the remote store or received from the feed.
    Confirmed,
}

#[derive(Debug, Clone)]
struct LocalRecord {
    record: DiscoveryRecord,
    status: RecordStatus,
    failures: u32,
}

/// Idempotent, optimistic discovery record store.
pub struct ClaimStore {
    remote: Arc<dyn RemoteStore>,
    config: ClaimStoreConfig,
    records: DashMap<ClaimKey, LocalRecord>,
    changes: broadcast::Sender<DiscoveryChange>,
}

impl std::fmt::Debug for ClaimStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimStore")
            .field("config", &self.config)
            .field("records", &self.records.len())
            .field("pending_retries", &self.pending_retries())
            .finish_non_exhaustive()
    }
}

impl ClaimStore {
    pub fn new(remote: Arc<dyn RemoteStore>, config: ClaimStoreConfig) -> Self {
        let (changes, _) = broadcast::channel(LOCAL_FEED_CAPACITY);
        Self {
            remote,
            config,
            records: DashMap::new(),
            changes,
        }
    }

    pub fn with_defaults(remote: Arc<dyn RemoteStore>) -> Self {
        Self::new(remote, ClaimStoreConfig::default())
    }

    pub fn config(&self) -> &ClaimStoreConfig {
        &self.config
    }

    /// Record that `user_id` discovered `treasure_id`, at most once.
    ///
    /// The record is applied locally before the remote insert. An existing
    /// local record (confirmed or still in flight) short-circuits to
    /// [`ClaimOutcome::AlreadyClaimed`]. A record waiting in the retry queue is
    /// resubmitted by this call.
    pub async fn claim(
        &self,
        treasure_id: &str,
        user_id: &str,
    ) -> Result<ClaimOutcome, ClaimError> {
        let key = ClaimKey::new(treasure_id, user_id);

        let record = match self.records.entry(key.clone()) {
            Entry::Occupied(mut slot) => match slot.get().status {
                RecordStatus::Confirmed | RecordStatus::InFlight => {
                    debug!(key = %key, "Local record exists, skipping remote insert");
                    return Ok(ClaimOutcome::AlreadyClaimed);
                }
                RecordStatus::Queued => {
                    debug!(key = %key, "Resubmitting queued claim");
                    slot.get_mut().status = RecordStatus::InFlight;
                    slot.get().record.clone()
                }
            },
            Entry::Vacant(slot) => {
                let record = DiscoveryRecord::new(treasure_id, user_id);
                slot.insert(LocalRecord {
                    record: record.clone(),
                    status: RecordStatus::InFlight,
                    failures: 0,
                });
                record
            }
        };

        self.submit(key, record).await
    }

    /// Resubmit every queued claim.
    ///
    /// Returns one result per resubmitted key so the caller can resolve any
    /// state that was waiting on it.
    pub async fn flush_retries(&self) -> Vec<(ClaimKey, Result<ClaimOutcome, ClaimError>)> {
        let mut due = Vec::new();
        for mut entry in self.records.iter_mut() {
            if entry.status == RecordStatus::Queued {
                entry.status = RecordStatus::InFlight;
                due.push((entry.key().clone(), entry.record.clone()));
            }
        }

        if !due.is_empty() {
            debug!(count = due.len(), "Flushing claim retry queue");
        }

        let mut results = Vec::with_capacity(due.len());
        for (key, record) in due {
            let result = self.submit(key.clone(), record).await;
            results.push((key, result));
        }
        results
    }

    /// Number of claims waiting in the retry queue.
    pub fn pending_retries(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.status == RecordStatus::Queued)
            .count()
    }

    /// Whether a local record (in any state) exists for the key.
    pub fn has_record(&self, key: &ClaimKey) -> bool {
        self.records.contains_key(key)
    }

    /// Whether the key has a confirmed local record.
    pub fn is_confirmed(&self, key: &ClaimKey) -> bool {
        self.records
            .get(key)
            .map(|r| r.status == RecordStatus::Confirmed)
            .unwrap_or(false)
    }

    /// Open the discovery feed for `user_id`.
    ///
    /// The feed merges the remote push subscription with this store's local
    /// rollbacks.
    pub fn subscribe_to_discoveries(&self, user_id: &str) -> Result<DiscoveryFeed, ClaimError> {
        let subscription = self
            .remote
            .subscribe(DiscoveryFilter::for_user(user_id))
            .map_err(|e| ClaimError::Subscription(e.to_string()))?;

        info!(user_id, subscription = subscription.id.0, "Subscribed to discoveries");

        Ok(DiscoveryFeed {
            remote: Arc::clone(&self.remote),
            subscription: Some(subscription),
            local: self.changes.subscribe(),
            user_id: user_id.to_string(),
        })
    }

    /// Apply a feed change to the local records.
    ///
    /// A remote record for a key that already has a local record is a no-op
    /// apart from marking it confirmed.
    pub fn reconcile(&self, change: &DiscoveryChange) -> Reconciliation {
        match change {
            DiscoveryChange::Recorded(record) => match self.records.entry(record.key()) {
                Entry::Occupied(mut slot) => {
                    slot.get_mut().status = RecordStatus::Confirmed;
                    Reconciliation::AlreadyKnown
                }
                Entry::Vacant(slot) => {
                    slot.insert(LocalRecord {
                        record: record.clone(),
                        status: RecordStatus::Confirmed,
                        failures: 0,
                    });
                    Reconciliation::Applied
                }
            },
            DiscoveryChange::Retracted(key) => {
                if self.records.remove(key).is_some() {
                    Reconciliation::Reverted
                } else {
                    Reconciliation::Ignored
                }
            }
        }
    }

    async fn submit(
        &self,
        key: ClaimKey,
        record: DiscoveryRecord,
    ) -> Result<ClaimOutcome, ClaimError> {
        let timeout = self.config.claim_timeout;
        let result =
            tokio::time::timeout(timeout, self.remote.insert_if_absent(record.clone())).await;

        let failed = !matches!(result, Ok(Ok(_)));
        if failed && self.is_confirmed(&key) {
            info!(key = %key, "Insert failed after the discovery feed confirmed the claim");
            return Ok(ClaimOutcome::AlreadyClaimed);
        }

        match result {
            Ok(Ok(InsertOutcome::Inserted)) => {
                self.confirm(record);
                info!(key = %key, "Claim recorded");
                Ok(ClaimOutcome::Claimed)
            }
            Ok(Ok(InsertOutcome::AlreadyExists)) => {
                self.confirm(record);
                info!(key = %key, "Claim already recorded remotely");
                Ok(ClaimOutcome::AlreadyClaimed)
            }
            Ok(Err(RemoteError::Rejected(reason))) => {
                warn!(key = %key, reason = %reason, "Claim rejected, rolling back");
                self.rollback(&key);
                Err(ClaimError::Rejected(reason))
            }
            Ok(Err(RemoteError::Unavailable(reason))) => Err(self.network_failure(&key, reason)),
            Err(_) => Err(self.network_failure(
                &key,
                format!("no response within {}s", timeout.as_secs_f64()),
            )),
        }
    }

    fn confirm(&self, record: DiscoveryRecord) {
        self.records
            .entry(record.key())
            .and_modify(|r| r.status = RecordStatus::Confirmed)
            .or_insert(LocalRecord {
                record,
                status: RecordStatus::Confirmed,
                failures: 0,
            });
    }

    fn network_failure(&self, key: &ClaimKey, reason: String) -> ClaimError {
        let queued = match self.records.get_mut(key) {
            // Reconciliation may have confirmed the record while the insert was pending.
            Some(r) if r.status == RecordStatus::Confirmed => false,
            Some(mut r) => {
                r.failures += 1;
                if r.failures <= self.config.retry.max_attempts {
                    r.status = RecordStatus::Queued;
                    true
                } else {
                    false
                }
            }
            None => false,
        };

        if queued {
            warn!(key = %key, reason = %reason, "Claim failed, queued for retry");
        } else if !self.is_confirmed(key) {
            warn!(key = %key, reason = %reason, "Claim failed, rolling back");
            self.rollback(key);
        }

        ClaimError::Network { reason, queued }
    }

    fn rollback(&self, key: &ClaimKey) {
        if self.records.remove(key).is_some() {
            // No receivers is fine: nobody has seen the optimistic record.
            let _ = self.changes.send(DiscoveryChange::Retracted(key.clone()));
        }
    }
}

/// Merged stream of discovery changes for one user.
///
/// Closing (or dropping) the feed unsubscribes from the remote store.
pub struct DiscoveryFeed {
    remote: Arc<dyn RemoteStore>,
    subscription: Option<RemoteSubscription>,
    local: broadcast::Receiver<DiscoveryChange>,
    user_id: String,
}

impl std::fmt::Debug for DiscoveryFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryFeed")
            .field("user_id", &self.user_id)
            .field("open", &self.subscription.is_some())
            .finish_non_exhaustive()
    }
}

impl DiscoveryFeed {
    /// Next change for this user, or `None` once the feed is closed.
    pub async fn recv(&mut self) -> Option<DiscoveryChange> {
        let Self {
            subscription,
            local,
            user_id,
            ..
        } = self;
        let sub = subscription.as_mut()?;

        loop {
            tokio::select! {
                change = sub.changes.recv() => return change,
                local_change = local.recv() => match local_change {
                    Ok(change) if change.user_id() == user_id.as_str() => return Some(change),
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Discovery feed lagged behind local changes");
                        continue;
                    }
                    Err(RecvError::Closed) => return None,
                },
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.subscription.is_some()
    }

    /// Unsubscribe from the remote store. Idempotent.
    pub fn close(&mut self) {
        if let Some(sub) = self.subscription.take() {
            self.remote.unsubscribe(sub.id);
            debug!(user_id = %self.user_id, "Discovery feed closed");
        }
    }
}

impl Drop for DiscoveryFeed {
    fn drop(&mut self) {
        self.close();
    }
}
