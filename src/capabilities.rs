//! Built-in capability handlers
//!
//! The rebalancer is the only value-moving handler; the scout and sentinel
//! produce advisories. All three stay deliberately mechanical: they read the
//! event payload, apply a threshold, and either propose or stay quiet. A
//! proposal here is an opinion, not an authorization; the guardrail chain
//! decides what executes.

use crate::domain::{DemandContext, ProposedAction, ProposedRebalance, StreamEvent};
use crate::error::{Result, StewardError};
use crate::swarm::CapabilityHandler;
use crate::triggers::CapabilityId;
use async_trait::async_trait;
use ethers::types::{Address, U256};
use tracing::debug;

/// Tuning for the drift rebalancer
#[derive(Debug, Clone)]
pub struct RebalancerSettings {
    /// Minimum absolute drift before proposing, in basis points
    pub drift_threshold_bps: u32,
    pub slippage_bps: u32,
    pub chain_id: u64,
}

impl Default for RebalancerSettings {
    fn default() -> Self {
        Self {
            drift_threshold_bps: 100,
            slippage_bps: 50,
            chain_id: 8453,
        }
    }
}

/// Proposes a swap when the portfolio has drifted past its band.
///
/// Expects the event payload to carry `account`, `drift_bps` (signed),
/// `token_in`, `token_out` and `amount_in` (decimal string, base units).
/// Payloads missing any of those produce no proposal.
pub struct DriftRebalancer {
    settings: RebalancerSettings,
}

impl DriftRebalancer {
    pub fn new(settings: RebalancerSettings) -> Self {
        Self { settings }
    }

    fn proposal_from(
        &self,
        data: &serde_json::Value,
        principal: Address,
        reason: String,
    ) -> Option<ProposedAction> {
        let account = data.get("account")?.as_str()?.parse::<Address>().ok()?;
        let token_in = data.get("token_in")?.as_str()?.to_string();
        let token_out = data.get("token_out")?.as_str()?.to_string();
        let amount_in = U256::from_dec_str(data.get("amount_in")?.as_str()?).ok()?;
        if amount_in.is_zero() {
            return None;
        }

        Some(ProposedAction::Rebalance(ProposedRebalance {
            swapper: principal,
            account,
            token_in,
            token_out,
            amount_in,
            slippage_bps: self.settings.slippage_bps,
            chain_id: self.settings.chain_id,
            reason,
        }))
    }
}

#[async_trait]
impl CapabilityHandler for DriftRebalancer {
    fn id(&self) -> CapabilityId {
        CapabilityId::Rebalancer
    }

    async fn on_event(
        &self,
        event: &StreamEvent,
        principal: Address,
    ) -> Result<Option<ProposedAction>> {
        let drift_bps = event
            .data
            .get("drift_bps")
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        if drift_bps.unsigned_abs() < u64::from(self.settings.drift_threshold_bps) {
            debug!(event_id = %event.id, drift_bps, "drift within band, nothing to propose");
            return Ok(None);
        }

        Ok(self.proposal_from(
            &event.data,
            principal,
            format!("drift {} bps beyond band", drift_bps),
        ))
    }

    async fn on_demand(&self, context: &DemandContext) -> Result<Option<ProposedAction>> {
        // Demand runs carry an explicit account; the payload shape matches the
        // event path otherwise.
        let principal = context
            .principal
            .ok_or_else(|| StewardError::Validation("principal required".to_string()))?;
        let account = context
            .account
            .ok_or_else(|| StewardError::Validation("account required".to_string()))?;

        let mut data = context.params.clone();
        if data.get("account").is_none() {
            if let Some(map) = data.as_object_mut() {
                map.insert(
                    "account".to_string(),
                    serde_json::Value::String(format!("{:?}", account)),
                );
            }
        }
        Ok(self.proposal_from(&data, principal, "manual rebalance request".to_string()))
    }
}

/// Flags yield spreads worth rotating into. Advisory only; rotation is a
/// separate authorization the principal makes themselves.
pub struct YieldScout {
    /// Minimum spread over the current position before flagging
    pub min_spread_bps: u32,
}

impl YieldScout {
    pub fn new(min_spread_bps: u32) -> Self {
        Self { min_spread_bps }
    }

    fn scan(&self, data: &serde_json::Value) -> Option<ProposedAction> {
        let current = data.get("current_apy_bps")?.as_u64()?;
        let best = data.get("best_apy_bps")?.as_u64()?;
        let venue = data.get("best_venue").and_then(|v| v.as_str()).unwrap_or("unknown");

        if best <= current || best - current < u64::from(self.min_spread_bps) {
            return None;
        }
        Some(ProposedAction::Advisory {
            severity: "info".to_string(),
            message: format!(
                "yield spread {} bps available at {} (current {} bps)",
                best - current,
                venue,
                current
            ),
        })
    }
}

#[async_trait]
impl CapabilityHandler for YieldScout {
    fn id(&self) -> CapabilityId {
        CapabilityId::YieldScout
    }

    async fn on_event(
        &self,
        event: &StreamEvent,
        _principal: Address,
    ) -> Result<Option<ProposedAction>> {
        Ok(self.scan(&event.data))
    }

    async fn on_demand(&self, context: &DemandContext) -> Result<Option<ProposedAction>> {
        Ok(self.scan(&context.params))
    }
}

/// Watches for sharp moves and governance changes. Advisory only.
pub struct RiskSentinel {
    /// Absolute price move, in basis points, that escalates to a warning
    pub alert_move_bps: u32,
}

impl RiskSentinel {
    pub fn new(alert_move_bps: u32) -> Self {
        Self { alert_move_bps }
    }
}

#[async_trait]
impl CapabilityHandler for RiskSentinel {
    fn id(&self) -> CapabilityId {
        CapabilityId::RiskSentinel
    }

    async fn on_event(
        &self,
        event: &StreamEvent,
        _principal: Address,
    ) -> Result<Option<ProposedAction>> {
        if let Some(move_bps) = event.data.get("move_bps").and_then(|v| v.as_i64()) {
            if move_bps.unsigned_abs() >= u64::from(self.alert_move_bps) {
                return Ok(Some(ProposedAction::Advisory {
                    severity: "warning".to_string(),
                    message: format!("price moved {} bps in one window", move_bps),
                }));
            }
            return Ok(None);
        }

        if let Some(change) = event.data.get("governance_change").and_then(|v| v.as_str()) {
            return Ok(Some(ProposedAction::Advisory {
                severity: "info".to_string(),
                message: format!("governance update: {}", change),
            }));
        }

        Ok(None)
    }

    async fn on_demand(&self, _context: &DemandContext) -> Result<Option<ProposedAction>> {
        Ok(Some(ProposedAction::Advisory {
            severity: "info".to_string(),
            message: "no anomalies in the current window".to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triggers::EventKind;
    use serde_json::json;

    fn addr(byte: u8) -> Address {
        Address::from([byte; 20])
    }

    fn drift_event(drift_bps: i64) -> StreamEvent {
        StreamEvent::new(
            "evt-1",
            EventKind::PriceMove,
            json!({
                "drift_bps": drift_bps,
                "account": format!("{:?}", addr(2)),
                "token_in": "USDC",
                "token_out": "WETH",
                "amount_in": "1000000",
            }),
        )
    }

    #[tokio::test]
    async fn test_rebalancer_proposes_past_threshold() {
        let handler = DriftRebalancer::new(RebalancerSettings::default());
        let action = handler
            .on_event(&drift_event(-150), addr(1))
            .await
            .unwrap()
            .unwrap();

        let ProposedAction::Rebalance(p) = action else {
            panic!("expected a rebalance");
        };
        assert_eq!(p.swapper, addr(1));
        assert_eq!(p.account, addr(2));
        assert_eq!(p.amount_in, U256::from(1_000_000u64));
    }

    #[tokio::test]
    async fn test_rebalancer_quiet_within_band() {
        let handler = DriftRebalancer::new(RebalancerSettings::default());
        assert!(handler
            .on_event(&drift_event(40), addr(1))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_rebalancer_ignores_malformed_payload() {
        let handler = DriftRebalancer::new(RebalancerSettings::default());
        let event = StreamEvent::new(
            "evt-2",
            EventKind::PriceMove,
            json!({ "drift_bps": -500 }),
        );
        assert!(handler.on_event(&event, addr(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rebalancer_on_demand_uses_context_account() {
        let handler = DriftRebalancer::new(RebalancerSettings::default());
        let context = DemandContext::new(addr(1), addr(2)).with_params(json!({
            "token_in": "USDC",
            "token_out": "WETH",
            "amount_in": "500000",
        }));

        let action = handler.on_demand(&context).await.unwrap().unwrap();
        let ProposedAction::Rebalance(p) = action else {
            panic!("expected a rebalance");
        };
        assert_eq!(p.account, addr(2));
        assert_eq!(p.reason, "manual rebalance request");
    }

    #[tokio::test]
    async fn test_scout_flags_spread() {
        let handler = YieldScout::new(50);
        let event = StreamEvent::new(
            "evt-3",
            EventKind::ScheduledTick,
            json!({ "current_apy_bps": 300, "best_apy_bps": 420, "best_venue": "aerodrome" }),
        );
        let action = handler.on_event(&event, addr(1)).await.unwrap().unwrap();
        assert!(!action.is_value_moving());
    }

    #[tokio::test]
    async fn test_scout_quiet_below_spread() {
        let handler = YieldScout::new(50);
        let event = StreamEvent::new(
            "evt-4",
            EventKind::ScheduledTick,
            json!({ "current_apy_bps": 300, "best_apy_bps": 320 }),
        );
        assert!(handler.on_event(&event, addr(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sentinel_warns_on_large_move() {
        let handler = RiskSentinel::new(300);
        let event = StreamEvent::new(
            "evt-5",
            EventKind::PriceMove,
            json!({ "move_bps": -450 }),
        );
        let action = handler.on_event(&event, addr(1)).await.unwrap().unwrap();
        let ProposedAction::Advisory { severity, .. } = action else {
            panic!("expected an advisory");
        };
        assert_eq!(severity, "warning");
    }
}
