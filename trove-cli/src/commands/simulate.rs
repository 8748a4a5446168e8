//! `trove simulate`: replay a recorded track against a treasure catalog.
//!
//! ```text
//! catalog.json ──► TreasureIndex ─┐
//!                                 ├──► DiscoverySession ──► events ──► stdout
//! track.json ──► ReplayProvider ──┘            │
//!                                     ClaimStore ◄──► InMemoryRemoteStore
//! ```
//!
//! Treasures listed with `--marker` get their marker "scanned" as soon as the
//! player is within claim range, which stands in for a camera pipeline.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use trove::claim::{ClaimOutcome, ClaimStore, InMemoryRemoteStore};
use trove::config::ConfigFile;
use trove::discovery::{DiscoveryEvent, DiscoverySession, MarkerEvent};
use trove::index::TreasureIndex;
use trove::location::{parse_track, ReplayLocationProvider};
use trove::proximity::Tier;
use trove::treasure::parse_catalog;

use super::distance::format_distance;
use crate::error::CliError;

/// Arguments for `trove simulate`.
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Treasure catalog (JSON array of treasures)
    #[arg(long)]
    pub catalog: PathBuf,

    /// Location track (JSON array of {latitude, longitude, accuracy_m})
    #[arg(long)]
    pub track: PathBuf,

    /// Player id claims are recorded under
    #[arg(long, default_value = "player")]
    pub user: String,

    /// Treasure ids whose marker is scanned on arrival (repeatable)
    #[arg(long = "marker")]
    pub markers: Vec<String>,

    /// Milliseconds between replayed track points
    #[arg(long, default_value_t = 1000)]
    pub interval_ms: u64,

    /// Milliseconds to keep listening after the last track point
    #[arg(long, default_value_t = 1000)]
    pub settle_ms: u64,
}

/// Run the simulation to completion or Ctrl-C.
pub fn run(args: SimulateArgs, config: &ConfigFile) -> Result<(), CliError> {
    let index = Arc::new(TreasureIndex::new());
    let entries = parse_catalog(&read(&args.catalog)?)?;
    let report = index.load(entries, &config.radius_defaults());
    if report.skipped > 0 {
        println!("Skipped {} invalid catalog entries", report.skipped);
    }
    if index.is_empty() {
        return Err(CliError::Config(format!(
            "Catalog {} contains no valid treasures",
            args.catalog.display()
        )));
    }

    let track = parse_track(&read(&args.track)?).map_err(|source| CliError::Track {
        path: args.track.clone(),
        source,
    })?;

    println!(
        "Replaying {} points against {} treasures as '{}'",
        track.len(),
        index.len(),
        args.user
    );
    println!();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    ctrlc::set_handler(move || on_signal.cancel())?;

    runtime.block_on(simulate(args, config, index, track, shutdown))
}

async fn simulate(
    args: SimulateArgs,
    config: &ConfigFile,
    index: Arc<TreasureIndex>,
    track: Vec<trove::location::TrackPoint>,
    shutdown: CancellationToken,
) -> Result<(), CliError> {
    let provider = Arc::new(ReplayLocationProvider::new(
        track,
        Duration::from_millis(args.interval_ms),
    ));
    let remote = Arc::new(InMemoryRemoteStore::new());
    let claims = Arc::new(ClaimStore::new(remote, config.claim_store_config()));

    let mut session = DiscoverySession::new(
        args.user.clone(),
        Arc::clone(&index),
        claims,
        provider.clone(),
        config.session_config(),
    );
    let mut events = session.subscribe();
    session.start()?;

    let markers: HashSet<String> = args.markers.iter().cloned().collect();
    let mut scanned = HashSet::new();

    let completion = provider.completion();
    let settle = Duration::from_millis(args.settle_ms);
    let finished = async move {
        completion.cancelled().await;
        tokio::time::sleep(settle).await;
    };
    tokio::pin!(finished);

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!("Interrupted, stopping session");
                println!("Interrupted");
                break;
            }

            _ = &mut finished => break,

            event = events.recv() => match event {
                Ok(event) => {
                    println!("{}", describe(&event, &index));

                    if let DiscoveryEvent::Proximity(proximity) = &event {
                        if proximity.tier == Tier::VeryNear
                            && markers.contains(&proximity.treasure_id)
                            && scanned.insert(proximity.treasure_id.clone())
                        {
                            scan_marker(&session, &index, &proximity.treasure_id)?;
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event stream lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    session.stop().await;

    println!();
    println!("Session Summary");
    println!("===============");
    println!("{}", session.metrics());

    let mut claimed: Vec<String> = index.claimed_ids().into_iter().collect();
    claimed.sort();
    if claimed.is_empty() {
        println!("Claimed:           (none)");
    } else {
        println!("Claimed:           {}", claimed.join(", "));
    }

    Ok(())
}

fn scan_marker(
    session: &DiscoverySession,
    index: &TreasureIndex,
    treasure_id: &str,
) -> Result<(), CliError> {
    let Some(marker_id) = index
        .get(treasure_id)
        .and_then(|t| t.marker_id().map(str::to_string))
    else {
        warn!(treasure_id, "--marker given for a GPS-only treasure");
        return Ok(());
    };

    println!("  scanned marker {}", marker_id);
    session.report_marker(MarkerEvent::found(marker_id))?;
    Ok(())
}

/// One-line, human-readable rendering of an event.
fn describe(event: &DiscoveryEvent, index: &TreasureIndex) -> String {
    match event {
        DiscoveryEvent::Proximity(p) => format!(
            "[{}] {} {} to the {}",
            p.treasure_id,
            p.tier,
            format_distance(p.distance_m),
            p.direction
        ),
        DiscoveryEvent::Lost { treasure_id } => format!("[{}] out of range", treasure_id),
        DiscoveryEvent::Claim(result) => match &result.outcome {
            Ok(ClaimOutcome::Claimed) => {
                let reward = index
                    .get(&result.treasure_id)
                    .map(|t| {
                        let reward = t.reward();
                        if reward.label.is_empty() {
                            format!("{} points", reward.points)
                        } else {
                            format!("{} ({} points)", reward.label, reward.points)
                        }
                    })
                    .unwrap_or_default();
                format!("[{}] claimed! {}", result.treasure_id, reward)
            }
            Ok(ClaimOutcome::AlreadyClaimed) => {
                format!("[{}] already claimed", result.treasure_id)
            }
            Err(e) => format!("[{}] claim failed: {}", result.treasure_id, e),
        },
        DiscoveryEvent::Reconciled { treasure_id } => {
            format!("[{}] claim confirmed by the server", treasure_id)
        }
        DiscoveryEvent::Reverted { treasure_id } => {
            format!("[{}] claim reverted by the server", treasure_id)
        }
    }
}

fn read(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}
