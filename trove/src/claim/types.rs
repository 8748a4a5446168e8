//! Discovery record and claim result types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identity of a discovery: one record per (treasure, user).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClaimKey {
    pub treasure_id: String,
    pub user_id: String,
}

impl ClaimKey {
    pub fn new(treasure_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            treasure_id: treasure_id.into(),
            user_id: user_id.into(),
        }
    }
}

impl fmt::Display for ClaimKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.treasure_id, self.user_id)
    }
}

/// Durable record that a user discovered a treasure.
///
/// Unique on `(treasure_id, user_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryRecord {
    pub treasure_id: String,
    pub user_id: String,
    pub discovered_at: DateTime<Utc>,
}

impl DiscoveryRecord {
    /// Create a record stamped with the current time.
    pub fn new(treasure_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            treasure_id: treasure_id.into(),
            user_id: user_id.into(),
            discovered_at: Utc::now(),
        }
    }

    pub fn key(&self) -> ClaimKey {
        ClaimKey::new(self.treasure_id.clone(), self.user_id.clone())
    }
}

/// Successful claim outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimOutcome {
    /// This call created the record.
    Claimed,
    /// A record already existed, locally or remotely.
    AlreadyClaimed,
}

/// Claim failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClaimError {
    /// The remote store could not be reached or did not answer in time.
    ///
    /// `queued` is true when the optimistic record was kept for resubmission.
    #[error("Network error (queued for retry: {queued}): {reason}")]
    Network { reason: String, queued: bool },

    /// The remote store refused the record (unknown treasure, permission denied).
    #[error("Claim rejected: {0}")]
    Rejected(String),

    /// The discovery subscription could not be established.
    #[error("Subscription failed: {0}")]
    Subscription(String),
}

impl ClaimError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClaimError::Network { .. })
    }
}

/// Result of a remote insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The uniqueness constraint already holds a record for the key.
    AlreadyExists,
}

/// Remote store failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),

    #[error("Remote store rejected request: {0}")]
    Rejected(String),
}

/// A change pushed on the discovery feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryChange {
    /// A record now exists (created here, on another device, or by a server process).
    Recorded(DiscoveryRecord),
    /// A record did not persist and must be forgotten.
    Retracted(ClaimKey),
}

impl DiscoveryChange {
    pub fn key(&self) -> ClaimKey {
        match self {
            DiscoveryChange::Recorded(record) => record.key(),
            DiscoveryChange::Retracted(key) => key.clone(),
        }
    }

    pub fn treasure_id(&self) -> &str {
        match self {
            DiscoveryChange::Recorded(record) => &record.treasure_id,
            DiscoveryChange::Retracted(key) => &key.treasure_id,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            DiscoveryChange::Recorded(record) => &record.user_id,
            DiscoveryChange::Retracted(key) => &key.user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_key() {
        let record = DiscoveryRecord::new("fountain", "alice");
        assert_eq!(record.key(), ClaimKey::new("fountain", "alice"));
        assert_eq!(record.key().to_string(), "fountain@alice");
    }

    #[test]
    fn test_record_json_shape() {
        let record = DiscoveryRecord::new("fountain", "alice");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["treasure_id"], "fountain");
        assert_eq!(json["user_id"], "alice");
        assert!(json["discovered_at"].is_string());
    }

    #[test]
    fn test_claim_error_retryable() {
        let network = ClaimError::Network {
            reason: "timeout".to_string(),
            queued: false,
        };
        assert!(network.is_retryable());
        assert!(!ClaimError::Rejected("gone".to_string()).is_retryable());
        assert!(network.to_string().contains("timeout"));
    }

    #[test]
    fn test_change_accessors() {
        let recorded = DiscoveryChange::Recorded(DiscoveryRecord::new("t1", "bob"));
        let retracted = DiscoveryChange::Retracted(ClaimKey::new("t2", "bob"));
        assert_eq!(recorded.treasure_id(), "t1");
        assert_eq!(retracted.treasure_id(), "t2");
        assert_eq!(retracted.user_id(), "bob");
        assert_eq!(recorded.key(), ClaimKey::new("t1", "bob"));
    }
}
