//! Discovery state machine.
//!
//! [`DiscoveryCoordinator`] turns location fixes, marker detections, claim
//! resolutions and feed changes into per-treasure phase transitions and
//! [`DiscoveryEvent`]s. It performs no I/O: claims are returned as
//! [`ClaimRequest`]s for the session to submit, and time-dependent methods take the
//! current instant so transitions are deterministic under test.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::events::{ClaimResult, DiscoveryEvent, EventBus, ProximityEvent};
use super::marker::{within, MarkerCorrelator, MarkerEvent, MarkerKind};
use super::state::{Phase, TreasureState};
use crate::claim::{ClaimError, ClaimOutcome, DiscoveryChange};
use crate::geo::{bearing_degrees, CardinalDirection, Coordinate};
use crate::index::TreasureIndex;
use crate::location::Fix;
use crate::proximity::{classify, Tier};
use crate::telemetry::SessionMetrics;
use crate::treasure::Treasure;

/// Default minimum interval between notifications for the same treasure.
pub const DEFAULT_NOTIFY_COOLDOWN: Duration = Duration::from_secs(10);

/// Default radius of the per-fix treasure query (meters).
pub const DEFAULT_MAX_QUERY_RADIUS_M: f64 = 500.0;

/// Default window within which GPS and marker detection must coincide.
pub const DEFAULT_MARKER_WINDOW: Duration = Duration::from_secs(5);

/// Coordinator configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryConfig {
    pub notify_cooldown: Duration,
    /// Treasures further than this are never classified, whatever their notify radius.
    pub max_query_radius_m: f64,
    pub marker_window: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            notify_cooldown: DEFAULT_NOTIFY_COOLDOWN,
            max_query_radius_m: DEFAULT_MAX_QUERY_RADIUS_M,
            marker_window: DEFAULT_MARKER_WINDOW,
        }
    }
}

/// A claim the session should submit to the claim store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRequest {
    pub treasure_id: String,
    pub user_id: String,
}

/// Event bus plus the counters that track what went through it.
#[derive(Debug)]
struct Outbox {
    bus: EventBus,
    metrics: Option<Arc<SessionMetrics>>,
}

impl Outbox {
    fn emit(&self, event: DiscoveryEvent) {
        if let Some(metrics) = &self.metrics {
            match &event {
                DiscoveryEvent::Proximity(_) => metrics.proximity_event(),
                DiscoveryEvent::Lost { .. } => metrics.lost_event(),
                DiscoveryEvent::Claim(result) if result.is_success() => metrics.claim_succeeded(),
                DiscoveryEvent::Claim(_) => metrics.claim_failed(),
                DiscoveryEvent::Reconciled { .. } | DiscoveryEvent::Reverted { .. } => {
                    metrics.reconciliation()
                }
            }
        }
        self.bus.publish(event);
    }
}

/// Per-player discovery state machine.
#[derive(Debug)]
pub struct DiscoveryCoordinator {
    user_id: String,
    config: DiscoveryConfig,
    index: Arc<TreasureIndex>,
    events: Outbox,
    states: HashMap<String, TreasureState>,
    /// Last notification per treasure, kept across `Lost` so boundary jitter
    /// stays inside the cooldown.
    notify_history: HashMap<String, Instant>,
    markers: MarkerCorrelator,
    last_fix: Option<Fix>,
}

impl DiscoveryCoordinator {
    pub fn new(
        user_id: impl Into<String>,
        index: Arc<TreasureIndex>,
        config: DiscoveryConfig,
        events: EventBus,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            config,
            index,
            events: Outbox { bus: events, metrics: None },
            states: HashMap::new(),
            notify_history: HashMap::new(),
            markers: MarkerCorrelator::new(),
            last_fix: None,
        }
    }

    /// Count emitted events in `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<SessionMetrics>) -> Self {
        self.events.metrics = Some(metrics);
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events.bus
    }

    /// Current phase of a treasure (`Undetected` if never seen).
    pub fn phase(&self, treasure_id: &str) -> Phase {
        self.states
            .get(treasure_id)
            .map(|s| s.phase)
            .unwrap_or_default()
    }

    pub fn state(&self, treasure_id: &str) -> Option<&TreasureState> {
        self.states.get(treasure_id)
    }

    /// Evaluate every nearby unclaimed treasure against a new fix.
    pub fn on_fix(&mut self, fix: &Fix, now: Instant) -> Vec<ClaimRequest> {
        self.last_fix = Some(*fix);
        self.evaluate(fix.coordinate, now)
    }

    /// Apply a marker detection. A `Found` may complete a pending GPS condition.
    pub fn on_marker(&mut self, event: &MarkerEvent) -> Vec<ClaimRequest> {
        self.markers.record(event);

        if event.kind != MarkerKind::Found {
            return Vec::new();
        }

        let Some(treasure) = self.index.find_by_marker(&event.marker_id) else {
            debug!(marker_id = %event.marker_id, "Marker not bound to any treasure");
            return Vec::new();
        };
        if self.index.is_claimed(treasure.id()) || self.index.is_ineligible(treasure.id()) {
            return Vec::new();
        }

        let window = self.config.marker_window;
        let Some(state) = self.states.get_mut(treasure.id()) else {
            return Vec::new();
        };
        let gps_ok = state
            .last_very_near_at
            .map(|gps_at| within(gps_at, event.at, window))
            .unwrap_or(false);

        if !gps_ok || state.claim_in_flight || state.phase.is_terminal() {
            return Vec::new();
        }

        debug!(treasure_id = treasure.id(), "Marker corroborated GPS proximity");
        vec![Self::begin_claim(&self.user_id, treasure.id(), state)]
    }

    /// Apply the resolution of a claim requested earlier.
    ///
    /// Resolutions for treasures without a claim in flight (for example after
    /// [`reset`](Self::reset)) are dropped.
    pub fn on_claim_resolved(
        &mut self,
        treasure_id: &str,
        result: Result<ClaimOutcome, ClaimError>,
    ) {
        let Some(state) = self.states.get_mut(treasure_id) else {
            debug!(treasure_id, "Dropping claim resolution for unknown treasure");
            return;
        };
        if !state.claim_in_flight {
            debug!(treasure_id, "Dropping late claim resolution");
            return;
        }
        state.claim_in_flight = false;

        // Only a feed record can mark the index while our claim is in flight.
        if result.is_err() && self.index.is_claimed(treasure_id) {
            state.phase = Phase::Claimed;
            info!(treasure_id, "Claim confirmed by discovery feed despite failed insert");
            self.events.emit(DiscoveryEvent::Reconciled {
                treasure_id: treasure_id.to_string(),
            });
            return;
        }

        match &result {
            Ok(outcome) => {
                state.phase = Phase::Claimed;
                self.index.mark_claimed(treasure_id);
                info!(treasure_id, outcome = ?outcome, "Treasure claimed");
            }
            Err(ClaimError::Rejected(reason)) => {
                state.phase = Phase::Rejected;
                self.index.mark_ineligible(treasure_id);
                warn!(treasure_id, reason = %reason, "Claim rejected");
            }
            Err(e) => {
                state.phase = Phase::Notified;
                warn!(treasure_id, error = %e, "Claim failed, will retry on next fix");
            }
        }

        self.events.emit(DiscoveryEvent::Claim(ClaimResult {
            treasure_id: treasure_id.to_string(),
            outcome: result,
        }));
    }

    /// Apply a change from the discovery feed.
    ///
    /// A reverted claim is re-evaluated immediately from the last known fix.
    pub fn on_discovery_change(
        &mut self,
        change: &DiscoveryChange,
        now: Instant,
    ) -> Vec<ClaimRequest> {
        if change.user_id() != self.user_id {
            return Vec::new();
        }
        let treasure_id = change.treasure_id();

        match change {
            DiscoveryChange::Recorded(_) => {
                let newly_claimed = self.index.mark_claimed(treasure_id);
                let state = self.states.entry(treasure_id.to_string()).or_default();
                if state.claim_in_flight {
                    // The pending resolution finishes the transition.
                    return Vec::new();
                }
                state.phase = Phase::Claimed;
                if newly_claimed {
                    info!(treasure_id, "Claim reconciled from discovery feed");
                    self.events.emit(DiscoveryEvent::Reconciled {
                        treasure_id: treasure_id.to_string(),
                    });
                }
                Vec::new()
            }
            DiscoveryChange::Retracted(_) => {
                if !self.index.reset_claim(treasure_id) {
                    return Vec::new();
                }
                self.states.remove(treasure_id);
                self.notify_history.remove(treasure_id);
                info!(treasure_id, "Claim reverted, treasure discoverable again");
                self.events.emit(DiscoveryEvent::Reverted {
                    treasure_id: treasure_id.to_string(),
                });

                match self.last_fix {
                    Some(fix) => self.evaluate(fix.coordinate, now),
                    None => Vec::new(),
                }
            }
        }
    }

    /// Discard all per-treasure state.
    pub fn reset(&mut self) {
        self.states.clear();
        self.notify_history.clear();
        self.markers.clear();
        self.last_fix = None;
    }

    fn evaluate(&mut self, position: Coordinate, now: Instant) -> Vec<ClaimRequest> {
        let nearby = match self
            .index
            .nearby_unclaimed(&position, self.config.max_query_radius_m)
        {
            Ok(nearby) => nearby,
            Err(e) => {
                warn!(error = %e, "Skipping fix with invalid position");
                return Vec::new();
            }
        };

        let mut in_range = HashSet::new();
        let mut requests = Vec::new();

        for hit in nearby {
            let treasure = &hit.treasure;
            let tier = classify(hit.distance_m, treasure.thresholds());
            if !tier.is_in_range() {
                continue;
            }
            in_range.insert(treasure.id().to_string());

            let state = self.states.entry(treasure.id().to_string()).or_default();
            if state.phase.is_terminal() {
                continue;
            }
            if state.phase == Phase::Undetected {
                state.phase = Phase::InRange;
            }

            if state.phase == Phase::InRange {
                let cooled_down = self
                    .notify_history
                    .get(treasure.id())
                    .map(|last| {
                        now.saturating_duration_since(*last) >= self.config.notify_cooldown
                    })
                    .unwrap_or(true);

                if cooled_down {
                    state.phase = Phase::Notified;
                    state.last_notified_at = Some(now);
                    self.notify_history.insert(treasure.id().to_string(), now);

                    debug!(
                        treasure_id = treasure.id(),
                        tier = %tier,
                        distance_m = hit.distance_m,
                        "Proximity notification"
                    );
                    self.events.emit(DiscoveryEvent::Proximity(ProximityEvent {
                        treasure_id: treasure.id().to_string(),
                        tier,
                        distance_m: hit.distance_m,
                        direction: direction_to(&position, treasure),
                    }));
                }
            }

            if tier == Tier::VeryNear {
                state.last_very_near_at = Some(now);
                if !state.claim_in_flight
                    && marker_gate(&self.markers, treasure, now, self.config.marker_window)
                {
                    requests.push(Self::begin_claim(&self.user_id, treasure.id(), state));
                }
            }
        }

        for (treasure_id, state) in self.states.iter_mut() {
            if state.phase.is_in_range() && !in_range.contains(treasure_id) {
                state.phase = Phase::Undetected;
                state.last_notified_at = None;
                debug!(treasure_id = %treasure_id, "Left treasure range");
                self.events.emit(DiscoveryEvent::Lost {
                    treasure_id: treasure_id.clone(),
                });
            }
        }

        requests
    }

    fn begin_claim(user_id: &str, treasure_id: &str, state: &mut TreasureState) -> ClaimRequest {
        state.claim_in_flight = true;
        state.phase = Phase::ClaimPending;
        info!(treasure_id, "Claim requested");
        ClaimRequest {
            treasure_id: treasure_id.to_string(),
            user_id: user_id.to_string(),
        }
    }
}

/// GPS treasures always pass; marker treasures need a detection near `gps_at`.
fn marker_gate(
    markers: &MarkerCorrelator,
    treasure: &Treasure,
    gps_at: Instant,
    window: Duration,
) -> bool {
    match treasure.marker_id() {
        None => true,
        Some(marker_id) => markers.corroborates(marker_id, gps_at, window),
    }
}

fn direction_to(from: &Coordinate, treasure: &Treasure) -> CardinalDirection {
    bearing_degrees(from, &treasure.coordinate())
        .map(CardinalDirection::from_bearing)
        .unwrap_or(CardinalDirection::North)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::{ClaimKey, DiscoveryRecord};
    use chrono::Utc;
    use tokio::sync::broadcast;

    const USER: &str = "alice";

    fn coord(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).unwrap()
    }

    fn fix(lat: f64, lon: f64) -> Fix {
        Fix {
            coordinate: coord(lat, lon),
            accuracy_m: None,
            timestamp: Utc::now(),
        }
    }

    fn setup(
        treasures: Vec<Treasure>,
    ) -> (DiscoveryCoordinator, broadcast::Receiver<DiscoveryEvent>) {
        let index = Arc::new(TreasureIndex::with_treasures(treasures));
        let bus = EventBus::default();
        let rx = bus.subscribe();
        let coordinator = DiscoveryCoordinator::new(USER, index, DiscoveryConfig::default(), bus);
        (coordinator, rx)
    }

    fn fountain() -> Treasure {
        Treasure::new("fountain", coord(-1.2921, 36.8219), 50.0, 100.0).unwrap()
    }

    fn drain(rx: &mut broadcast::Receiver<DiscoveryEvent>) -> Vec<DiscoveryEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_on_top_of_treasure_notifies_and_claims() {
        let (mut coordinator, mut rx) = setup(vec![fountain()]);
        let now = Instant::now();

        let requests = coordinator.on_fix(&fix(-1.2921, 36.8219), now);
        assert_eq!(
            requests,
            vec![ClaimRequest {
                treasure_id: "fountain".to_string(),
                user_id: USER.to_string()
            }]
        );
        assert_eq!(coordinator.phase("fountain"), Phase::ClaimPending);

        let events = drain(&mut rx);
        assert!(matches!(
            &events[..],
            [DiscoveryEvent::Proximity(e)] if e.tier == Tier::VeryNear && e.distance_m == 0.0
        ));

        coordinator.on_claim_resolved("fountain", Ok(ClaimOutcome::Claimed));
        assert_eq!(coordinator.phase("fountain"), Phase::Claimed);
        assert!(coordinator.index.is_claimed("fountain"));
    }

    #[test]
    fn test_far_treasure_produces_nothing() {
        let gate = Treasure::new("gate", coord(-1.2950, 36.8240), 50.0, 100.0).unwrap();
        let (mut coordinator, mut rx) = setup(vec![gate]);

        let requests = coordinator.on_fix(&fix(-1.2921, 36.8219), Instant::now());
        assert!(requests.is_empty());
        assert!(drain(&mut rx).is_empty());
        assert_eq!(coordinator.phase("gate"), Phase::Undetected);
    }

    #[test]
    fn test_claimed_treasure_is_ignored() {
        let (mut coordinator, mut rx) = setup(vec![fountain()]);
        coordinator.index.mark_claimed("fountain");

        assert!(coordinator
            .on_fix(&fix(-1.2921, 36.8219), Instant::now())
            .is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_near_tier_notifies_without_claim() {
        let (mut coordinator, mut rx) = setup(vec![fountain()]);

        // ~78 m north of the fountain
        let requests = coordinator.on_fix(&fix(-1.2914, 36.8219), Instant::now());
        assert!(requests.is_empty());
        assert_eq!(coordinator.phase("fountain"), Phase::Notified);
        assert!(matches!(
            &drain(&mut rx)[..],
            [DiscoveryEvent::Proximity(e)] if e.tier == Tier::Near
        ));
    }

    #[test]
    fn test_in_flight_claim_blocks_duplicate_requests() {
        let (mut coordinator, _rx) = setup(vec![fountain()]);
        let now = Instant::now();

        assert_eq!(coordinator.on_fix(&fix(-1.2921, 36.8219), now).len(), 1);
        assert!(coordinator
            .on_fix(&fix(-1.29211, 36.8219), now + Duration::from_millis(100))
            .is_empty());
    }

    #[test]
    fn test_network_failure_retries_on_next_fix() {
        let (mut coordinator, mut rx) = setup(vec![fountain()]);
        let now = Instant::now();

        coordinator.on_fix(&fix(-1.2921, 36.8219), now);
        coordinator.on_claim_resolved(
            "fountain",
            Err(ClaimError::Network {
                reason: "offline".to_string(),
                queued: false,
            }),
        );

        let state = coordinator.state("fountain").unwrap();
        assert_eq!(state.phase, Phase::Notified);
        assert!(!state.claim_in_flight);
        assert!(!coordinator.index.is_claimed("fountain"));

        let events = drain(&mut rx);
        assert!(matches!(events.last(), Some(DiscoveryEvent::Claim(r)) if !r.is_success()));

        let requests = coordinator.on_fix(&fix(-1.29212, 36.8219), now + Duration::from_secs(1));
        assert_eq!(requests.len(), 1);
    }

    #[test]
    fn test_rejection_is_terminal() {
        let (mut coordinator, _rx) = setup(vec![fountain()]);
        let now = Instant::now();

        coordinator.on_fix(&fix(-1.2921, 36.8219), now);
        coordinator.on_claim_resolved("fountain", Err(ClaimError::Rejected("retired".to_string())));

        assert_eq!(coordinator.phase("fountain"), Phase::Rejected);
        assert!(coordinator.index.is_ineligible("fountain"));
        assert!(coordinator
            .on_fix(&fix(-1.29212, 36.8219), now + Duration::from_secs(30))
            .is_empty());
    }

    #[test]
    fn test_leaving_range_emits_single_lost() {
        let (mut coordinator, mut rx) = setup(vec![fountain()]);
        let now = Instant::now();

        coordinator.on_fix(&fix(-1.2914, 36.8219), now);
        coordinator.on_fix(&fix(-1.2900, 36.8219), now + Duration::from_secs(1));
        coordinator.on_fix(&fix(-1.2890, 36.8219), now + Duration::from_secs(2));

        let events = drain(&mut rx);
        let lost = events
            .iter()
            .filter(|e| matches!(e, DiscoveryEvent::Lost { .. }))
            .count();
        assert_eq!(lost, 1);
        assert_eq!(coordinator.phase("fountain"), Phase::Undetected);
        assert!(coordinator.state("fountain").unwrap().last_notified_at.is_none());
    }

    #[test]
    fn test_cooldown_suppresses_boundary_jitter() {
        let (mut coordinator, mut rx) = setup(vec![fountain()]);
        let now = Instant::now();

        coordinator.on_fix(&fix(-1.2914, 36.8219), now);
        coordinator.on_fix(&fix(-1.2900, 36.8219), now + Duration::from_secs(1));
        coordinator.on_fix(&fix(-1.2914, 36.8219), now + Duration::from_secs(2));

        let proximity = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, DiscoveryEvent::Proximity(_)))
            .count();
        assert_eq!(proximity, 1);
        assert_eq!(coordinator.phase("fountain"), Phase::InRange);

        // Cooldown elapsed: the held-back notification goes out
        coordinator.on_fix(&fix(-1.2915, 36.8219), now + Duration::from_secs(12));
        assert!(matches!(&drain(&mut rx)[..], [DiscoveryEvent::Proximity(_)]));
        assert_eq!(coordinator.phase("fountain"), Phase::Notified);
    }

    #[test]
    fn test_marker_treasure_requires_corroboration() {
        let statue = Treasure::new("statue", coord(0.0, 0.0), 50.0, 100.0)
            .unwrap()
            .with_marker("plaque");
        let (mut coordinator, _rx) = setup(vec![statue]);
        let now = Instant::now();

        assert!(coordinator.on_fix(&fix(0.0, 0.0), now).is_empty());
        assert_eq!(coordinator.phase("statue"), Phase::Notified);

        let requests = coordinator.on_marker(&MarkerEvent::new(
            "plaque",
            MarkerKind::Found,
            now + Duration::from_secs(2),
        ));
        assert_eq!(requests.len(), 1);
        assert_eq!(coordinator.phase("statue"), Phase::ClaimPending);
    }

    #[test]
    fn test_marker_outside_window_does_not_claim() {
        let statue = Treasure::new("statue", coord(0.0, 0.0), 50.0, 100.0)
            .unwrap()
            .with_marker("plaque");
        let (mut coordinator, _rx) = setup(vec![statue]);
        let now = Instant::now();

        coordinator.on_fix(&fix(0.0, 0.0), now);
        let late = now + Duration::from_secs(6);
        assert!(coordinator
            .on_marker(&MarkerEvent::new("plaque", MarkerKind::Found, late))
            .is_empty());

        // A fresh GPS fix inside the window of that detection completes it
        let requests = coordinator.on_fix(&fix(0.00001, 0.0), late + Duration::from_secs(1));
        assert_eq!(requests.len(), 1);
    }

    #[test]
    fn test_marker_before_gps_claims_on_fix() {
        let statue = Treasure::new("statue", coord(0.0, 0.0), 50.0, 100.0)
            .unwrap()
            .with_marker("plaque");
        let (mut coordinator, _rx) = setup(vec![statue]);
        let now = Instant::now();

        assert!(coordinator
            .on_marker(&MarkerEvent::new("plaque", MarkerKind::Found, now))
            .is_empty());
        let requests = coordinator.on_fix(&fix(0.0, 0.0), now + Duration::from_secs(3));
        assert_eq!(requests.len(), 1);
    }

    #[test]
    fn test_feed_record_without_local_attempt() {
        let (mut coordinator, mut rx) = setup(vec![fountain()]);
        let change = DiscoveryChange::Recorded(DiscoveryRecord::new("fountain", USER));

        coordinator.on_discovery_change(&change, Instant::now());
        assert!(coordinator.index.is_claimed("fountain"));
        assert_eq!(coordinator.phase("fountain"), Phase::Claimed);
        assert!(matches!(&drain(&mut rx)[..], [DiscoveryEvent::Reconciled { .. }]));

        // Duplicate delivery is a no-op
        coordinator.on_discovery_change(&change, Instant::now());
        assert!(drain(&mut rx).is_empty());

        assert!(coordinator
            .on_fix(&fix(-1.2921, 36.8219), Instant::now())
            .is_empty());
    }

    #[test]
    fn test_feed_changes_for_other_users_are_ignored() {
        let (mut coordinator, _rx) = setup(vec![fountain()]);
        let change = DiscoveryChange::Recorded(DiscoveryRecord::new("fountain", "bob"));

        coordinator.on_discovery_change(&change, Instant::now());
        assert!(!coordinator.index.is_claimed("fountain"));
    }

    #[test]
    fn test_record_during_own_claim_defers_to_resolution() {
        let (mut coordinator, mut rx) = setup(vec![fountain()]);
        let now = Instant::now();

        coordinator.on_fix(&fix(-1.2921, 36.8219), now);
        drain(&mut rx);

        let echo = DiscoveryChange::Recorded(DiscoveryRecord::new("fountain", USER));
        coordinator.on_discovery_change(&echo, now);
        assert_eq!(coordinator.phase("fountain"), Phase::ClaimPending);
        assert!(drain(&mut rx).is_empty());

        coordinator.on_claim_resolved("fountain", Ok(ClaimOutcome::Claimed));
        assert_eq!(coordinator.phase("fountain"), Phase::Claimed);
        assert!(matches!(&drain(&mut rx)[..], [DiscoveryEvent::Claim(r)] if r.is_success()));
    }

    #[test]
    fn test_feed_record_wins_over_failed_insert() {
        let failures = [
            ClaimError::Network {
                reason: "timeout".to_string(),
                queued: false,
            },
            ClaimError::Rejected("duplicate".to_string()),
        ];

        for error in failures {
            let (mut coordinator, mut rx) = setup(vec![fountain()]);
            let now = Instant::now();

            coordinator.on_fix(&fix(-1.2921, 36.8219), now);
            let echo = DiscoveryChange::Recorded(DiscoveryRecord::new("fountain", USER));
            coordinator.on_discovery_change(&echo, now);
            drain(&mut rx);

            coordinator.on_claim_resolved("fountain", Err(error.clone()));
            assert_eq!(coordinator.phase("fountain"), Phase::Claimed, "{error}");
            assert!(!coordinator.index.is_ineligible("fountain"));
            assert!(matches!(
                &drain(&mut rx)[..],
                [DiscoveryEvent::Reconciled { treasure_id }] if treasure_id == "fountain"
            ));

            // Next fix: claimed treasures are excluded, but must not be reported lost.
            let later = now + Duration::from_secs(1);
            let requests = coordinator.on_fix(&fix(-1.29211, 36.8219), later);
            assert!(requests.is_empty());
            assert_eq!(coordinator.phase("fountain"), Phase::Claimed);
            assert!(drain(&mut rx).is_empty());
        }
    }

    #[test]
    fn test_retraction_reverts_and_reevaluates() {
        let (mut coordinator, mut rx) = setup(vec![fountain()]);
        let now = Instant::now();

        coordinator.on_fix(&fix(-1.2921, 36.8219), now);
        coordinator.on_claim_resolved("fountain", Ok(ClaimOutcome::Claimed));
        drain(&mut rx);

        let retract = DiscoveryChange::Retracted(ClaimKey::new("fountain", USER));
        let requests = coordinator.on_discovery_change(&retract, now + Duration::from_secs(1));

        assert!(!coordinator.index.is_claimed("fountain"));
        assert_eq!(requests.len(), 1, "still on top of the treasure");
        let events = drain(&mut rx);
        assert!(matches!(events.first(), Some(DiscoveryEvent::Reverted { .. })));
    }

    #[test]
    fn test_late_resolution_after_reset_is_dropped() {
        let (mut coordinator, mut rx) = setup(vec![fountain()]);

        coordinator.on_fix(&fix(-1.2921, 36.8219), Instant::now());
        coordinator.reset();
        drain(&mut rx);

        coordinator.on_claim_resolved("fountain", Ok(ClaimOutcome::Claimed));
        assert!(!coordinator.index.is_claimed("fountain"));
        assert!(drain(&mut rx).is_empty());
    }
}
