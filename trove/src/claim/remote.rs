//! Remote store abstraction.
//!
//! The remote store is the durable backend holding discovery records and the
//! treasure catalog. It is consumed through the [`RemoteStore`] trait so the
//! claim store never depends on a concrete backend.
//!
//! # Dyn Compatibility
//!
//! Async methods return [`BoxFuture`] so implementations can be shared as
//! `Arc<dyn RemoteStore>`.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use super::types::{DiscoveryChange, DiscoveryRecord, InsertOutcome, RemoteError};
use crate::geo::GeoBounds;
use crate::treasure::Treasure;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Identifier of a push subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Which discovery changes a subscription receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryFilter {
    pub user_id: String,
}

impl DiscoveryFilter {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    pub fn matches(&self, change: &DiscoveryChange) -> bool {
        change.user_id() == self.user_id
    }
}

/// An open push subscription.
///
/// The receiver closes when the remote side drops the subscription.
#[derive(Debug)]
pub struct RemoteSubscription {
    pub id: SubscriptionId,
    pub changes: mpsc::UnboundedReceiver<DiscoveryChange>,
}

/// Durable backend for discovery records.
pub trait RemoteStore: Send + Sync {
    /// Insert the record unless one already exists for its key.
    ///
    /// A uniqueness conflict is reported as [`InsertOutcome::AlreadyExists`],
    /// never as an error.
    fn insert_if_absent(
        &self,
        record: DiscoveryRecord,
    ) -> BoxFuture<'_, Result<InsertOutcome, RemoteError>>;

    /// Treasures whose coordinate lies inside `bounds`.
    fn query_nearby(&self, bounds: GeoBounds) -> BoxFuture<'_, Result<Vec<Treasure>, RemoteError>>;

    /// Open a push subscription for discovery changes matching `filter`.
    fn subscribe(&self, filter: DiscoveryFilter) -> Result<RemoteSubscription, RemoteError>;

    /// Close a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}
