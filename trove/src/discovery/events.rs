//! Discovery events and the typed event bus.

use tokio::sync::broadcast;
use tracing::trace;

use crate::claim::{ClaimError, ClaimOutcome};
use crate::geo::CardinalDirection;
use crate::proximity::Tier;

/// Default number of events buffered per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// The player entered a treasure's notify radius.
#[derive(Debug, Clone, PartialEq)]
pub struct ProximityEvent {
    pub treasure_id: String,
    pub tier: Tier,
    pub distance_m: f64,
    /// Direction from the player to the treasure, for hint display.
    pub direction: CardinalDirection,
}

/// Resolution of a claim attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimResult {
    pub treasure_id: String,
    pub outcome: Result<ClaimOutcome, ClaimError>,
}

impl ClaimResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Everything the discovery session reports to its observers.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryEvent {
    Proximity(ProximityEvent),
    /// The player left the notify radius of a notified treasure.
    Lost { treasure_id: String },
    Claim(ClaimResult),
    /// A claim made elsewhere (another device, a server process) was applied.
    Reconciled { treasure_id: String },
    /// A claim did not persist; the treasure is discoverable again.
    Reverted { treasure_id: String },
}

impl DiscoveryEvent {
    pub fn treasure_id(&self) -> &str {
        match self {
            DiscoveryEvent::Proximity(event) => &event.treasure_id,
            DiscoveryEvent::Claim(result) => &result.treasure_id,
            DiscoveryEvent::Lost { treasure_id }
            | DiscoveryEvent::Reconciled { treasure_id }
            | DiscoveryEvent::Reverted { treasure_id } => treasure_id,
        }
    }
}

/// Publish/subscribe bus for [`DiscoveryEvent`]s.
///
/// Cloning shares the underlying channel. Publishing with no subscribers is
/// not an error; slow subscribers observe `Lagged` and skip ahead.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DiscoveryEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event, returning the number of subscribers that received it.
    pub fn publish(&self, event: DiscoveryEvent) -> usize {
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                trace!(treasure_id = event.treasure_id(), "No event subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bus_delivers_to_all_subscribers() {
        let bus = EventBus::default();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        let sent = bus.publish(DiscoveryEvent::Lost {
            treasure_id: "t1".to_string(),
        });
        assert_eq!(sent, 2);

        assert_eq!(a.recv().await.unwrap().treasure_id(), "t1");
        assert_eq!(b.recv().await.unwrap().treasure_id(), "t1");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        assert_eq!(
            bus.publish(DiscoveryEvent::Reverted {
                treasure_id: "t1".to_string()
            }),
            0
        );
    }
}
