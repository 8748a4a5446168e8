//! Per-treasure discovery state.

use std::time::Instant;

/// Discovery phase of one treasure for the session player.
///
/// ```text
/// Undetected ──► InRange ──► Notified ──► ClaimPending ──► Claimed
///      ▲            │            │              │
///      └── Lost ────┴────────────┘              ├──► Notified (network error)
///                                               └──► Rejected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Phase {
    #[default]
    Undetected,
    /// Inside the notify radius, notification held back by the cooldown.
    InRange,
    Notified,
    ClaimPending,
    Claimed,
    /// The remote store refused the claim.
    Rejected,
}

impl Phase {
    /// No further transitions except through reconciliation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Claimed | Phase::Rejected)
    }

    /// Phases that fall back to `Undetected` when the player leaves range.
    pub fn is_in_range(&self) -> bool {
        matches!(self, Phase::InRange | Phase::Notified)
    }
}

/// Discovery state of one treasure.
#[derive(Debug, Clone, Default)]
pub struct TreasureState {
    pub phase: Phase,
    /// Last proximity notification since entering range; reset on `Lost`.
    pub last_notified_at: Option<Instant>,
    pub claim_in_flight: bool,
    /// Last time GPS placed the player inside the claim radius.
    pub last_very_near_at: Option<Instant>,
}
