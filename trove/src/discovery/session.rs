//! Discovery session: the owned event loop for one player.
//!
//! ```text
//!  LocationStream ──Fix/Error──┐
//!  report_marker ──Marker──────┤
//!                              ▼
//!                     ┌─────────────────┐   ClaimRequest   ┌──────────────┐
//!  DiscoveryFeed ───► │   session loop  │ ───────────────► │ claim task   │
//!                     │  (coordinator)  │ ◄─────────────── │ (ClaimStore) │
//!  retry tick ──────► └─────────────────┘    completion    └──────────────┘
//!                              │
//!                              ▼
//!                          EventBus
//! ```
//!
//! All inputs are handled one at a time by a single task, so coordinator
//! transitions never interleave. Remote calls run in spawned tasks and report
//! back through a completion channel.
//!
//! Stopping cancels the loop, stops the location watch, closes the discovery
//! feed and discards unresolved claim state. Claim tasks already running are
//! left to finish so the claim store settles its own records; their results
//! are dropped.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::coordinator::{ClaimRequest, DiscoveryConfig, DiscoveryCoordinator};
use super::events::{DiscoveryEvent, EventBus};
use super::marker::MarkerEvent;
use crate::claim::{
    ClaimError, ClaimOutcome, ClaimStore, DiscoveryChange, DiscoveryFeed, RetryPolicy,
};
use crate::geo::Coordinate;
use crate::index::TreasureIndex;
use crate::location::{
    Fix, LocationError, LocationProvider, LocationStream, LocationSubscription, WatchOptions,
};
use crate::telemetry::{SessionMetrics, TelemetrySnapshot};
use crate::treasure::Player;

/// Session configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionConfig {
    pub discovery: DiscoveryConfig,
    pub watch: WatchOptions,
}

/// Session lifecycle failures.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Discovery session is already running")]
    AlreadyRunning,

    #[error("Discovery session is not running")]
    NotRunning,

    #[error("Failed to start location updates: {0}")]
    Location(#[from] LocationError),

    #[error("Failed to subscribe to discoveries: {0}")]
    Claim(#[from] ClaimError),
}

#[derive(Debug)]
enum SessionInput {
    Fix(Fix),
    LocationError(LocationError),
    Marker(MarkerEvent),
}

type Completion = (String, Result<ClaimOutcome, ClaimError>);

struct Running {
    input: mpsc::UnboundedSender<SessionInput>,
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Discovery for one player: location in, events out.
///
/// # Example
///
/// ```ignore
/// let mut session = DiscoverySession::new("alice", index, claims, provider, SessionConfig::default());
/// let mut events = session.subscribe();
/// session.start()?;
///
/// while let Ok(event) = events.recv().await {
///     println!("{:?}", event);
/// }
///
/// session.stop().await;
/// ```
pub struct DiscoverySession {
    user_id: String,
    index: Arc<TreasureIndex>,
    claims: Arc<ClaimStore>,
    provider: Arc<dyn LocationProvider>,
    config: SessionConfig,
    events: EventBus,
    metrics: Arc<SessionMetrics>,
    last_position: Arc<Mutex<Option<Coordinate>>>,
    running: Option<Running>,
}

impl std::fmt::Debug for DiscoverySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoverySession")
            .field("user_id", &self.user_id)
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl DiscoverySession {
    /// Create a stopped session.
    pub fn new(
        user_id: impl Into<String>,
        index: Arc<TreasureIndex>,
        claims: Arc<ClaimStore>,
        provider: Arc<dyn LocationProvider>,
        config: SessionConfig,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            index,
            claims,
            provider,
            config,
            events: EventBus::default(),
            metrics: Arc::new(SessionMetrics::new()),
            last_position: Arc::new(Mutex::new(None)),
            running: None,
        }
    }

    /// Subscribe to discovery events. Subscribe before [`start`](Self::start)
    /// to observe the first fix.
    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.events.subscribe()
    }

    /// Subscribe to the discovery feed, start location updates and spawn the
    /// event loop. Must be called from within a Tokio runtime.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.running.is_some() {
            return Err(SessionError::AlreadyRunning);
        }

        let feed = self.claims.subscribe_to_discoveries(&self.user_id)?;

        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let fix_tx = input_tx.clone();
        let error_tx = input_tx.clone();
        let location = LocationStream::start(
            Arc::clone(&self.provider),
            self.config.watch.clone(),
            move |fix| {
                let _ = fix_tx.send(SessionInput::Fix(fix));
            },
            move |error| {
                let _ = error_tx.send(SessionInput::LocationError(error));
            },
        )?;

        let token = CancellationToken::new();
        let coordinator = DiscoveryCoordinator::new(
            self.user_id.clone(),
            Arc::clone(&self.index),
            self.config.discovery.clone(),
            self.events.clone(),
        )
        .with_metrics(Arc::clone(&self.metrics));

        let worker = SessionLoop {
            coordinator,
            claims: Arc::clone(&self.claims),
            metrics: Arc::clone(&self.metrics),
            last_position: Arc::clone(&self.last_position),
            retry: self.claims.config().retry.clone(),
            feed,
            location,
            input: input_rx,
            token: token.clone(),
        };
        let task = tokio::spawn(worker.run());

        info!(user_id = %self.user_id, "Discovery session started");
        self.running = Some(Running {
            input: input_tx,
            token,
            task,
        });
        Ok(())
    }

    /// Stop the event loop and wait for it to exit. Idempotent.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.token.cancel();
        if let Err(e) = running.task.await {
            warn!(error = %e, "Discovery session task ended abnormally");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .map(|r| !r.task.is_finished())
            .unwrap_or(false)
    }

    /// Deliver a visual marker detection to the running session.
    pub fn report_marker(&self, event: MarkerEvent) -> Result<(), SessionError> {
        let running = self.running.as_ref().ok_or(SessionError::NotRunning)?;
        running
            .input
            .send(SessionInput::Marker(event))
            .map_err(|_| SessionError::NotRunning)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn index(&self) -> &Arc<TreasureIndex> {
        &self.index
    }

    pub fn claims(&self) -> &Arc<ClaimStore> {
        &self.claims
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn metrics(&self) -> TelemetrySnapshot {
        self.metrics.snapshot()
    }

    /// Snapshot of the player: last accepted position and claimed treasures.
    pub fn player(&self) -> Player {
        Player {
            id: self.user_id.clone(),
            last_known_position: *self.last_position.lock(),
            claimed_treasure_ids: self.index.claimed_ids(),
        }
    }
}

impl Drop for DiscoverySession {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.token.cancel();
        }
    }
}

/// State owned by the session task.
struct SessionLoop {
    coordinator: DiscoveryCoordinator,
    claims: Arc<ClaimStore>,
    metrics: Arc<SessionMetrics>,
    last_position: Arc<Mutex<Option<Coordinate>>>,
    retry: RetryPolicy,
    feed: DiscoveryFeed,
    location: LocationSubscription,
    input: mpsc::UnboundedReceiver<SessionInput>,
    token: CancellationToken,
}

impl SessionLoop {
    async fn run(mut self) {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();

        let retry_enabled = self.retry.is_enabled();
        let mut retry_tick = tokio::time::interval_at(
            tokio::time::Instant::now() + self.retry.interval,
            self.retry.interval.max(Duration::from_millis(1)),
        );
        retry_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut feed_open = true;

        loop {
            tokio::select! {
                biased;

                _ = self.token.cancelled() => break,

                Some((treasure_id, result)) = done_rx.recv() => {
                    self.coordinator.on_claim_resolved(&treasure_id, result);
                }

                change = self.feed.recv(), if feed_open => match change {
                    Some(change) => self.handle_change(change, &done_tx),
                    None => {
                        warn!("Discovery feed closed, reconciliation suspended");
                        feed_open = false;
                    }
                },

                input = self.input.recv() => match input {
                    Some(input) => self.handle_input(input, &done_tx),
                    None => break,
                },

                _ = retry_tick.tick(), if retry_enabled => self.flush_retries(),
            }
        }

        self.location.stop();
        self.feed.close();
        self.coordinator.reset();
        info!(user_id = self.coordinator.user_id(), "Discovery session stopped");
    }

    fn handle_input(&mut self, input: SessionInput, done: &mpsc::UnboundedSender<Completion>) {
        let now = tokio::time::Instant::now().into_std();

        let requests = match input {
            SessionInput::Fix(fix) => {
                self.metrics.fix_accepted();
                *self.last_position.lock() = Some(fix.coordinate);
                self.coordinator.on_fix(&fix, now)
            }
            SessionInput::LocationError(LocationError::InvalidFix(_)) => {
                self.metrics.fix_rejected();
                Vec::new()
            }
            SessionInput::LocationError(_) => {
                self.metrics.location_error();
                Vec::new()
            }
            SessionInput::Marker(event) => {
                debug!(marker_id = %event.marker_id, kind = ?event.kind, "Marker event");
                self.coordinator.on_marker(&event)
            }
        };

        self.submit(requests, done);
    }

    fn handle_change(&mut self, change: DiscoveryChange, done: &mpsc::UnboundedSender<Completion>) {
        let reconciliation = self.claims.reconcile(&change);
        debug!(key = %change.key(), ?reconciliation, "Discovery feed change");

        let now = tokio::time::Instant::now().into_std();
        let requests = self.coordinator.on_discovery_change(&change, now);
        self.submit(requests, done);
    }

    fn submit(&self, requests: Vec<ClaimRequest>, done: &mpsc::UnboundedSender<Completion>) {
        for request in requests {
            self.metrics.claim_attempted();
            let claims = Arc::clone(&self.claims);
            let done = done.clone();

            tokio::spawn(async move {
                let result = claims.claim(&request.treasure_id, &request.user_id).await;
                // Receiver is gone once the session stopped.
                let _ = done.send((request.treasure_id, result));
            });
        }
    }

    /// Resubmit queued claims in the background. Outcomes reach the
    /// coordinator through the discovery feed.
    fn flush_retries(&self) {
        if self.claims.pending_retries() == 0 {
            return;
        }
        let claims = Arc::clone(&self.claims);
        tokio::spawn(async move {
            for (key, result) in claims.flush_retries().await {
                match result {
                    Ok(outcome) => info!(key = %key, ?outcome, "Queued claim recorded"),
                    Err(e) => warn!(key = %key, error = %e, "Queued claim failed"),
                }
            }
        });
    }
}
