//! Trigger map
//!
//! Static table from event kind to the ordered capabilities that run for it.
//! The table is deliberately build-time only: no capability can be wired to a
//! new trigger by a runtime request.

use serde::{Deserialize, Serialize};

/// Closed set of ingested event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Tracked token moved past a price threshold
    PriceMove,
    /// Inbound transfer landed on a delegated account
    DepositDetected,
    /// A delegated session was activated on-chain
    SessionStarted,
    /// Scheduler tick routed through the event path
    ScheduledTick,
    /// Allowlisted protocol published a parameter change
    GovernanceUpdate,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventKind::PriceMove => "price_move",
            EventKind::DepositDetected => "deposit_detected",
            EventKind::SessionStarted => "session_started",
            EventKind::ScheduledTick => "scheduled_tick",
            EventKind::GovernanceUpdate => "governance_update",
        };
        write!(f, "{}", s)
    }
}

/// Closed set of capability handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityId {
    /// Evaluates portfolio drift and proposes a rebalance
    Rebalancer,
    /// Scans for better allocation targets; proposal-only
    YieldScout,
    /// Watches limits and proposes defensive exits
    RiskSentinel,
}

impl CapabilityId {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityId::Rebalancer => "rebalancer",
            CapabilityId::YieldScout => "yield_scout",
            CapabilityId::RiskSentinel => "risk_sentinel",
        }
    }
}

impl std::fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CapabilityId {
    type Err = crate::error::StewardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rebalancer" => Ok(CapabilityId::Rebalancer),
            "yield_scout" => Ok(CapabilityId::YieldScout),
            "risk_sentinel" => Ok(CapabilityId::RiskSentinel),
            other => Err(crate::error::StewardError::UnknownCapability(
                other.to_string(),
            )),
        }
    }
}

/// Ordered capabilities triggered by an event kind. Empty if unmapped.
pub fn triggered_capabilities(kind: EventKind) -> &'static [CapabilityId] {
    match kind {
        EventKind::PriceMove => &[CapabilityId::Rebalancer, CapabilityId::RiskSentinel],
        EventKind::DepositDetected => &[CapabilityId::Rebalancer],
        EventKind::ScheduledTick => &[CapabilityId::Rebalancer, CapabilityId::YieldScout],
        EventKind::GovernanceUpdate => &[CapabilityId::RiskSentinel],
        // Session activation is informational; nothing runs on it
        EventKind::SessionStarted => &[],
    }
}

/// Whether any capability is wired to this event kind
pub fn has_trigger(kind: EventKind) -> bool {
    !triggered_capabilities(kind).is_empty()
}
