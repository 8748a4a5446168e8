//! Claim recording and reconciliation
//!
//! This module records that a player discovered a treasure, exactly once per
//! `(treasure, user)` pair, against a remote backend that may be slow, offline,
//! or updated by other devices.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────┐  claim()   ┌────────────┐  insert_if_absent  ┌──────────────┐
//! │  Coordinator  │ ─────────► │ ClaimStore │ ─────────────────► │ RemoteStore  │
//! │               │ ◄───────── │  (local    │ ◄───────────────── │  (trait)     │
//! │               │  outcome   │  records)  │   push changes     │              │
//! └───────────────┘            └────────────┘                    └──────────────┘
//!         ▲                          │
//!         └──── DiscoveryFeed ◄──────┘  (remote changes + local rollbacks)
//! ```
//!
//! - [`ClaimStore`] owns the optimistic local records and the retry queue
//! - [`RemoteStore`] abstracts the durable backend
//! - [`InMemoryRemoteStore`] is the in-process backend used by the simulator and tests

mod memory;
mod remote;
mod store;
mod types;

pub use memory::InMemoryRemoteStore;
pub use remote::{BoxFuture, DiscoveryFilter, RemoteStore, RemoteSubscription, SubscriptionId};
pub use store::{
    ClaimStore, ClaimStoreConfig, DiscoveryFeed, Reconciliation, RetryPolicy,
    DEFAULT_CLAIM_TIMEOUT, DEFAULT_RETRY_INTERVAL,
};
pub use types::{
    ClaimError, ClaimKey, ClaimOutcome, DiscoveryChange, DiscoveryRecord, InsertOutcome,
    RemoteError,
};
