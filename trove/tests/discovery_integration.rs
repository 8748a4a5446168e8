//! Integration tests for the discovery session.
//!
//! These tests drive a complete session end to end:
//! - location fixes → coordinator → claim store → remote store
//! - discovery feed changes → reconciliation → index
//! - marker corroboration through `report_marker`
//!
//! Run with: `cargo test --test discovery_integration`

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use trove::claim::{
    ClaimError, ClaimKey, ClaimOutcome, ClaimStore, ClaimStoreConfig, DiscoveryRecord,
    InMemoryRemoteStore, RemoteError, RetryPolicy,
};
use trove::discovery::{DiscoveryEvent, DiscoverySession, MarkerEvent, SessionConfig};
use trove::geo::Coordinate;
use trove::index::TreasureIndex;
use trove::location::{ManualLocationProvider, RawFix};
use trove::proximity::Tier;
use trove::treasure::Treasure;

// ============================================================================
// Helper Functions
// ============================================================================

const USER: &str = "alice";

/// Nairobi city centre, used as the player's starting position.
const CENTRE: (f64, f64) = (-1.2921, 36.8219);

struct Harness {
    session: DiscoverySession,
    provider: Arc<ManualLocationProvider>,
    remote: Arc<InMemoryRemoteStore>,
    events: broadcast::Receiver<DiscoveryEvent>,
}

impl Harness {
    fn start(treasures: Vec<Treasure>) -> Self {
        Self::start_with(treasures, ClaimStoreConfig::default())
    }

    fn start_with(treasures: Vec<Treasure>, claims: ClaimStoreConfig) -> Self {
        let index = Arc::new(TreasureIndex::with_treasures(treasures));
        let remote = Arc::new(InMemoryRemoteStore::new());
        let claims = Arc::new(ClaimStore::new(remote.clone(), claims));
        let provider = Arc::new(ManualLocationProvider::new());

        let mut session = DiscoverySession::new(
            USER,
            index,
            claims,
            provider.clone(),
            SessionConfig::default(),
        );
        let events = session.subscribe();
        session.start().expect("session starts");

        Self {
            session,
            provider,
            remote,
            events,
        }
    }

    fn fix(&self, lat: f64, lon: f64) {
        self.provider.push(RawFix::at(lat, lon));
    }

    async fn next_event(&mut self) -> DiscoveryEvent {
        tokio::time::timeout(Duration::from_secs(5), self.events.recv())
            .await
            .expect("event within timeout")
            .expect("event bus open")
    }

    /// Wait until the session has processed `count` fixes in total.
    async fn wait_for_fixes(&self, count: u64) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.session.metrics().fixes_accepted < count {
            assert!(
                tokio::time::Instant::now() < deadline,
                "session did not process {} fixes",
                count
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn assert_no_events(&mut self) {
        assert!(
            self.events.try_recv().is_err(),
            "expected no pending events"
        );
    }
}

fn coord(lat: f64, lon: f64) -> Coordinate {
    Coordinate::new(lat, lon).unwrap()
}

fn fountain() -> Treasure {
    Treasure::new("fountain", coord(CENTRE.0, CENTRE.1), 50.0, 100.0).unwrap()
}

fn gate() -> Treasure {
    Treasure::new("gate", coord(-1.2950, 36.8240), 50.0, 100.0).unwrap()
}

// ============================================================================
// Integration Tests
// ============================================================================

/// Player standing on a treasure: proximity event, then a successful claim.
#[tokio::test]
async fn test_player_on_treasure_claims_it() {
    let mut h = Harness::start(vec![fountain()]);

    h.fix(CENTRE.0, CENTRE.1);

    match h.next_event().await {
        DiscoveryEvent::Proximity(event) => {
            assert_eq!(event.treasure_id, "fountain");
            assert_eq!(event.tier, Tier::VeryNear);
            assert_eq!(event.distance_m, 0.0);
        }
        other => panic!("expected proximity event, got {:?}", other),
    }
    match h.next_event().await {
        DiscoveryEvent::Claim(result) => {
            assert_eq!(result.treasure_id, "fountain");
            assert_eq!(result.outcome, Ok(ClaimOutcome::Claimed));
        }
        other => panic!("expected claim result, got {:?}", other),
    }

    assert!(h.session.index().is_claimed("fountain"));
    assert!(h.remote.contains(&ClaimKey::new("fountain", USER)));

    h.session.stop().await;
}

/// Treasure ~398 m away with a 100 m notify radius: nothing happens.
#[tokio::test]
async fn test_far_treasure_is_silent() {
    let mut h = Harness::start(vec![gate()]);

    h.fix(CENTRE.0, CENTRE.1);
    h.wait_for_fixes(1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    h.assert_no_events();
    assert_eq!(h.remote.insert_attempts(), 0);

    h.session.stop().await;
}

/// Already-claimed treasure: no event, no claim.
#[tokio::test]
async fn test_claimed_treasure_is_ignored() {
    let mut h = Harness::start(vec![fountain()]);
    h.session.index().mark_claimed("fountain");

    h.fix(CENTRE.0, CENTRE.1);
    h.wait_for_fixes(1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    h.assert_no_events();
    assert_eq!(h.remote.insert_attempts(), 0);

    h.session.stop().await;
}

/// Network failure leaves the treasure notified; the next fix retries.
#[tokio::test]
async fn test_network_failure_retries_on_next_fix() {
    let mut h = Harness::start(vec![fountain()]);
    h.remote
        .fail_next(RemoteError::Unavailable("offline".to_string()));

    h.fix(CENTRE.0, CENTRE.1);
    assert!(matches!(h.next_event().await, DiscoveryEvent::Proximity(_)));
    match h.next_event().await {
        DiscoveryEvent::Claim(result) => assert!(matches!(
            result.outcome,
            Err(ClaimError::Network { queued: false, .. })
        )),
        other => panic!("expected failed claim, got {:?}", other),
    }
    assert!(!h.session.index().is_claimed("fountain"));

    // ~2 m further: still very near, passes the movement filter
    h.fix(CENTRE.0 - 0.00002, CENTRE.1);
    match h.next_event().await {
        DiscoveryEvent::Claim(result) => assert_eq!(result.outcome, Ok(ClaimOutcome::Claimed)),
        other => panic!("expected successful claim, got {:?}", other),
    }

    assert_eq!(h.remote.insert_attempts(), 2);
    assert_eq!(h.remote.record_count(), 1);

    let metrics = h.session.metrics();
    assert_eq!(metrics.claims_attempted, 2);
    assert_eq!(metrics.claims_failed, 1);
    assert_eq!(metrics.claims_succeeded, 1);

    h.session.stop().await;
}

/// A record created on another device is applied without a local attempt.
#[tokio::test]
async fn test_remote_record_is_reconciled() {
    let mut h = Harness::start(vec![fountain()]);

    h.remote
        .record_external(DiscoveryRecord::new("fountain", USER));

    match h.next_event().await {
        DiscoveryEvent::Reconciled { treasure_id } => assert_eq!(treasure_id, "fountain"),
        other => panic!("expected reconciliation, got {:?}", other),
    }
    assert!(h.session.index().is_claimed("fountain"));
    assert!(h
        .session
        .claims()
        .is_confirmed(&ClaimKey::new("fountain", USER)));

    // Excluded from later queries
    h.fix(CENTRE.0, CENTRE.1);
    h.wait_for_fixes(1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.assert_no_events();
    assert_eq!(h.remote.insert_attempts(), 0);

    h.session.stop().await;
}

/// Records for other users never touch this player's index.
#[tokio::test]
async fn test_other_users_records_are_ignored() {
    let mut h = Harness::start(vec![fountain()]);

    h.remote.record_external(DiscoveryRecord::new("fountain", "bob"));
    tokio::time::sleep(Duration::from_millis(50)).await;

    h.assert_no_events();
    assert!(!h.session.index().is_claimed("fountain"));

    h.session.stop().await;
}

/// Two qualifying fixes while the first claim is in flight: one remote insert.
#[tokio::test]
async fn test_closely_spaced_fixes_insert_once() {
    let mut h = Harness::start(vec![fountain()]);
    h.remote.set_latency(Some(Duration::from_millis(200)));

    h.fix(CENTRE.0, CENTRE.1);
    h.fix(CENTRE.0 - 0.00002, CENTRE.1);
    h.wait_for_fixes(2).await;

    assert!(matches!(h.next_event().await, DiscoveryEvent::Proximity(_)));
    assert!(matches!(h.next_event().await, DiscoveryEvent::Claim(_)));

    assert_eq!(h.remote.insert_attempts(), 1);
    assert_eq!(h.session.metrics().claims_attempted, 1);

    h.session.stop().await;
}

/// A remote retraction reverts the claim and the treasure is claimed again.
#[tokio::test]
async fn test_retracted_claim_is_reverted() {
    let mut h = Harness::start(vec![fountain()]);

    h.fix(CENTRE.0, CENTRE.1);
    assert!(matches!(h.next_event().await, DiscoveryEvent::Proximity(_)));
    assert!(matches!(h.next_event().await, DiscoveryEvent::Claim(_)));

    h.remote.retract(&ClaimKey::new("fountain", USER));

    match h.next_event().await {
        DiscoveryEvent::Reverted { treasure_id } => assert_eq!(treasure_id, "fountain"),
        other => panic!("expected revert, got {:?}", other),
    }

    // Still standing on it: re-evaluated and claimed again
    assert!(matches!(h.next_event().await, DiscoveryEvent::Proximity(_)));
    match h.next_event().await {
        DiscoveryEvent::Claim(result) => assert_eq!(result.outcome, Ok(ClaimOutcome::Claimed)),
        other => panic!("expected claim, got {:?}", other),
    }
    assert_eq!(h.remote.insert_attempts(), 2);

    h.session.stop().await;
}

/// Marker treasures wait for a visual detection near the GPS fix.
#[tokio::test]
async fn test_marker_treasure_claims_after_detection() {
    let statue = Treasure::new("statue", coord(CENTRE.0, CENTRE.1), 50.0, 100.0)
        .unwrap()
        .with_marker("statue-plaque");
    let mut h = Harness::start(vec![statue]);

    h.fix(CENTRE.0, CENTRE.1);
    assert!(matches!(h.next_event().await, DiscoveryEvent::Proximity(_)));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.remote.insert_attempts(), 0, "GPS alone must not claim");

    h.session
        .report_marker(MarkerEvent::found("statue-plaque"))
        .unwrap();

    match h.next_event().await {
        DiscoveryEvent::Claim(result) => {
            assert_eq!(result.treasure_id, "statue");
            assert_eq!(result.outcome, Ok(ClaimOutcome::Claimed));
        }
        other => panic!("expected claim, got {:?}", other),
    }

    h.session.stop().await;
}

/// Rejected claims are terminal for the treasure.
#[tokio::test]
async fn test_rejected_claim_is_terminal() {
    let mut h = Harness::start(vec![fountain()]);
    h.remote
        .fail_next(RemoteError::Rejected("treasure retired".to_string()));

    h.fix(CENTRE.0, CENTRE.1);
    assert!(matches!(h.next_event().await, DiscoveryEvent::Proximity(_)));
    match h.next_event().await {
        DiscoveryEvent::Claim(result) => {
            assert!(matches!(result.outcome, Err(ClaimError::Rejected(_))))
        }
        other => panic!("expected rejection, got {:?}", other),
    }
    assert!(h.session.index().is_ineligible("fountain"));

    h.fix(CENTRE.0 - 0.00002, CENTRE.1);
    h.wait_for_fixes(2).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.assert_no_events();
    assert_eq!(h.remote.insert_attempts(), 1);

    h.session.stop().await;
}

/// Queued claims are resubmitted by the retry tick.
#[tokio::test]
async fn test_queued_claim_is_flushed() {
    let claims = ClaimStoreConfig {
        retry: RetryPolicy {
            max_attempts: 2,
            interval: Duration::from_millis(50),
        },
        ..Default::default()
    };
    let mut h = Harness::start_with(vec![fountain()], claims);
    h.remote
        .fail_next(RemoteError::Unavailable("offline".to_string()));

    h.fix(CENTRE.0, CENTRE.1);
    assert!(matches!(h.next_event().await, DiscoveryEvent::Proximity(_)));
    match h.next_event().await {
        DiscoveryEvent::Claim(result) => assert!(matches!(
            result.outcome,
            Err(ClaimError::Network { queued: true, .. })
        )),
        other => panic!("expected queued failure, got {:?}", other),
    }

    // The flush succeeds and the remote echo reconciles the claim
    match h.next_event().await {
        DiscoveryEvent::Reconciled { treasure_id } => assert_eq!(treasure_id, "fountain"),
        other => panic!("expected reconciliation, got {:?}", other),
    }
    assert!(h.session.index().is_claimed("fountain"));
    assert_eq!(h.remote.record_count(), 1);

    h.session.stop().await;
}

/// The index can be populated from the remote catalog around a position.
#[tokio::test]
async fn test_index_refresh_from_remote() {
    let remote = InMemoryRemoteStore::with_treasures([fountain(), gate()]);
    let index = TreasureIndex::new();

    let loaded = index
        .refresh_from_remote(&remote, coord(CENTRE.0, CENTRE.1), 200.0)
        .await
        .unwrap();

    assert_eq!(loaded, 1);
    assert!(index.get("fountain").is_some());
    assert!(index.get("gate").is_none());
}
