//! Ordered guardrail stages
//!
//! Every stage either advances or terminates with its specific rejection; no
//! partial execution. Only after all nine stages pass is an `ActionIntent`
//! constructed — the only shape allowed to reach the signer.

use crate::clients::{SwapQuote, SwapTx};
use crate::config::GuardrailConfig;
use crate::domain::ProposedRebalance;
use crate::guardrails::allowlist::Allowlist;
use crate::session::DelegatedSession;
use chrono::Utc;
use ethers::types::{Address, Bytes, U256};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

/// Fixed marker appended to every approved payload, exactly once. Lets
/// downstream indexers attribute flow without trusting off-chain records.
pub const ATTRIBUTION_SUFFIX: &[u8] = &[0x73, 0x74, 0x77, 0x64, 0x00, 0x01];

/// Why a proposal was terminated, by stage
#[derive(Debug, Clone, Serialize)]
pub enum RejectReason {
    /// Stage 1: global kill switch is off
    ExecutionDisabled,
    /// Stage 2: no live session for the principal
    NoActiveSession { principal: Address },
    /// Stage 2: proposal targets a different account than the session binds
    AccountMismatch { expected: Address, got: Address },
    /// Stage 3: token failed allowlist resolution
    TokenNotAllowed { input: String },
    /// Stage 4: capped amount came out zero
    ZeroEffectiveAmount,
    /// Stage 5: requested slippage above the session limit
    SlippageTooHigh { requested_bps: u32, limit_bps: u32 },
    /// Stage 6: no quote available for this proposal
    QuoteMissing,
    /// Stage 6: quoted price impact above the session limit
    PriceImpactTooHigh { impact_bps: u32, limit_bps: u32 },
    /// Stage 7: payload targets a router outside the allowlist
    RouterNotAllowed { router: Address },
    /// Stage 7: payload selector is not a known swap entry
    UnknownSelector { selector: String },
    /// Stage 8: quote-derived deadline already passed or implausibly far out
    StaleQuote { deadline: u64, now: u64 },
    /// Stage 9: proposal declares a different chain than the session
    ChainMismatch { session: u64, proposal: u64 },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::ExecutionDisabled => write!(f, "execution disabled"),
            RejectReason::NoActiveSession { principal } => {
                write!(f, "no active session for {:?}", principal)
            }
            RejectReason::AccountMismatch { expected, got } => {
                write!(f, "account {:?} does not match session account {:?}", got, expected)
            }
            RejectReason::TokenNotAllowed { input } => write!(f, "token not allowed: {}", input),
            RejectReason::ZeroEffectiveAmount => write!(f, "effective amount is zero"),
            RejectReason::SlippageTooHigh { requested_bps, limit_bps } => {
                write!(f, "slippage {} bps exceeds limit {} bps", requested_bps, limit_bps)
            }
            RejectReason::QuoteMissing => write!(f, "no quote available"),
            RejectReason::PriceImpactTooHigh { impact_bps, limit_bps } => {
                write!(f, "price impact {} bps exceeds limit {} bps", impact_bps, limit_bps)
            }
            RejectReason::RouterNotAllowed { router } => {
                write!(f, "router not allowed: {:?}", router)
            }
            RejectReason::UnknownSelector { selector } => {
                write!(f, "unknown selector: {}", selector)
            }
            RejectReason::StaleQuote { deadline, now } => {
                write!(f, "stale quote: deadline {} at {}", deadline, now)
            }
            RejectReason::ChainMismatch { session, proposal } => {
                write!(f, "chain {} does not match session chain {}", proposal, session)
            }
        }
    }
}

/// Closed set of actions the signer will accept; never arbitrary calldata
#[derive(Debug, Clone, Serialize)]
pub enum RebalanceAction {
    Swap {
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        min_amount_out: U256,
    },
}

/// Typed intent metadata. `extra` is for forward-compatible logging only,
/// never control flow.
#[derive(Debug, Clone, Serialize)]
pub struct IntentMeta {
    /// Smart account the operation executes from
    pub account: Address,
    pub token_in: String,
    pub token_out: String,
    pub requested_amount: U256,
    pub effective_amount: U256,
    pub slippage_bps: u32,
    pub price_impact_bps: u32,
    pub extra: serde_json::Value,
}

/// The validated, guardrail-approved instruction
#[derive(Debug, Clone, Serialize)]
pub struct ActionIntent {
    pub intent_id: Uuid,
    pub run_id: String,
    pub action: RebalanceAction,
    pub chain_id: u64,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub meta: IntentMeta,
}

/// The ordered check sequence. Pure and synchronous; callers complete the
/// balance and quote lookups before evaluation.
pub struct GuardrailChain {
    allowlist: Allowlist,
    execution_enabled: bool,
    chain_id: u64,
    quote_max_age_secs: u64,
}

impl GuardrailChain {
    pub fn new(
        allowlist: Allowlist,
        execution_enabled: bool,
        chain_id: u64,
        config: &GuardrailConfig,
    ) -> Self {
        Self {
            allowlist,
            execution_enabled,
            chain_id,
            quote_max_age_secs: config.quote_max_age_secs,
        }
    }

    /// Run all nine stages against a proposal. Returns the approved intent or
    /// the first stage's rejection.
    #[allow(clippy::result_large_err)]
    pub fn evaluate(
        &self,
        proposal: &ProposedRebalance,
        session: &DelegatedSession,
        quote: Option<&SwapQuote>,
        swap_tx: &SwapTx,
        balance: U256,
        run_id: &str,
    ) -> Result<ActionIntent, RejectReason> {
        // Stage 1: kill switch
        if !self.execution_enabled {
            return Err(RejectReason::ExecutionDisabled);
        }

        // Stage 2: session liveness and account binding
        if session.is_expired() {
            return Err(RejectReason::NoActiveSession {
                principal: proposal.swapper,
            });
        }
        if proposal.account != session.smart_account {
            return Err(RejectReason::AccountMismatch {
                expected: session.smart_account,
                got: proposal.account,
            });
        }

        // Stage 3: token resolution
        let token_in = self
            .allowlist
            .resolve_token(&proposal.token_in)
            .map_err(|_| RejectReason::TokenNotAllowed {
                input: proposal.token_in.clone(),
            })?;
        let token_out = self
            .allowlist
            .resolve_token(&proposal.token_out)
            .map_err(|_| RejectReason::TokenNotAllowed {
                input: proposal.token_out.clone(),
            })?;

        // Stage 4: amount cap. Never propose more than the session allows or
        // the account holds; capping is a pass, not a rejection.
        let effective_amount = proposal
            .amount_in
            .min(session.limits.max_amount_in)
            .min(balance);
        if effective_amount.is_zero() {
            return Err(RejectReason::ZeroEffectiveAmount);
        }
        if effective_amount < proposal.amount_in {
            debug!(
                requested = %proposal.amount_in,
                effective = %effective_amount,
                "guardrails capped proposal amount"
            );
        }

        // Stage 5: slippage (boundary equality is accepted)
        if proposal.slippage_bps > session.limits.max_slippage_bps {
            return Err(RejectReason::SlippageTooHigh {
                requested_bps: proposal.slippage_bps,
                limit_bps: session.limits.max_slippage_bps,
            });
        }

        // Stage 6: price impact; a missing quote is itself a rejection
        let quote = quote.ok_or(RejectReason::QuoteMissing)?;
        if quote.price_impact_bps > session.limits.max_price_impact_bps {
            return Err(RejectReason::PriceImpactTooHigh {
                impact_bps: quote.price_impact_bps,
                limit_bps: session.limits.max_price_impact_bps,
            });
        }

        // Stage 7: router and selector on the payload to be wrapped
        if !self.allowlist.router_allowed(swap_tx.to) {
            return Err(RejectReason::RouterNotAllowed { router: swap_tx.to });
        }
        if !self.allowlist.selector_known(&swap_tx.data) {
            let selector = swap_tx
                .data
                .get(..4)
                .map(hex::encode)
                .unwrap_or_else(|| "<empty>".to_string());
            return Err(RejectReason::UnknownSelector { selector });
        }

        // Stage 8: deadline sanity for the quote-derived payload
        let now = Utc::now().timestamp() as u64;
        let deadline = swap_tx.deadline;
        if deadline <= now || deadline > now + self.quote_max_age_secs {
            return Err(RejectReason::StaleQuote { deadline, now });
        }

        // Stage 9: chain consistency
        if proposal.chain_id != session.chain_id || session.chain_id != self.chain_id {
            return Err(RejectReason::ChainMismatch {
                session: session.chain_id,
                proposal: proposal.chain_id,
            });
        }

        let min_amount_out = apply_slippage(quote.amount_out, proposal.slippage_bps);

        let mut data = swap_tx.data.to_vec();
        append_attribution(&mut data);

        let intent = ActionIntent {
            intent_id: Uuid::new_v4(),
            run_id: run_id.to_string(),
            action: RebalanceAction::Swap {
                token_in: token_in.address,
                token_out: token_out.address,
                amount_in: effective_amount,
                min_amount_out,
            },
            chain_id: self.chain_id,
            to: swap_tx.to,
            value: swap_tx.value,
            data: Bytes::from(data),
            meta: IntentMeta {
                account: session.smart_account,
                token_in: proposal.token_in.clone(),
                token_out: proposal.token_out.clone(),
                requested_amount: proposal.amount_in,
                effective_amount,
                slippage_bps: proposal.slippage_bps,
                price_impact_bps: quote.price_impact_bps,
                extra: serde_json::Value::Null,
            },
        };

        info!(
            intent_id = %intent.intent_id,
            amount = %effective_amount,
            "guardrail chain passed, intent constructed"
        );

        Ok(intent)
    }
}

/// Worst acceptable output after slippage
fn apply_slippage(amount_out: U256, slippage_bps: u32) -> U256 {
    amount_out * U256::from(10_000 - slippage_bps.min(10_000)) / U256::from(10_000)
}

/// Append the attribution suffix unless the payload already carries it. The
/// trailing-marker guard keeps a double evaluation from double-appending.
pub fn append_attribution(data: &mut Vec<u8>) {
    if data.ends_with(ATTRIBUTION_SUFFIX) {
        return;
    }
    data.extend_from_slice(ATTRIBUTION_SUFFIX);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionLimits, SessionSigner};
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn addr(byte: u8) -> Address {
        Address::from([byte; 20])
    }

    fn session() -> DelegatedSession {
        DelegatedSession {
            swapper: addr(1),
            smart_account: addr(2),
            signer: SessionSigner::generate(8453),
            limits: SessionLimits {
                max_amount_in: U256::from(2_000_000u64),
                max_slippage_bps: 100,
                max_price_impact_bps: 300,
            },
            previous_signer: None,
            chain_id: 8453,
            created_at: Utc::now(),
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    fn proposal(amount: u64) -> ProposedRebalance {
        ProposedRebalance {
            swapper: addr(1),
            account: addr(2),
            token_in: "USDC".to_string(),
            token_out: "WETH".to_string(),
            amount_in: U256::from(amount),
            slippage_bps: 50,
            chain_id: 8453,
            reason: "drift above band".to_string(),
        }
    }

    fn quote() -> SwapQuote {
        SwapQuote {
            amount_out: U256::from(1_000_000_000_000u64),
            price: dec!(0.0004),
            price_impact_bps: 40,
            deadline: Utc::now().timestamp() as u64 + 60,
        }
    }

    fn swap_tx() -> SwapTx {
        let mut data = vec![0x41, 0x4b, 0xf3, 0x89];
        data.extend([0u8; 64]);
        SwapTx {
            to: "0x2626664c2603336E57B271c5C0b26F421741e481".parse().unwrap(),
            value: U256::zero(),
            data: Bytes::from(data),
            deadline: Utc::now().timestamp() as u64 + 60,
        }
    }

    fn chain() -> GuardrailChain {
        GuardrailChain::new(
            Allowlist::new(false),
            true,
            8453,
            &crate::config::GuardrailConfig {
                quote_max_age_secs: 120,
            },
        )
    }

    #[test]
    fn test_happy_path_constructs_intent() {
        let q = quote();
        let intent = chain()
            .evaluate(
                &proposal(1_000_000),
                &session(),
                Some(&q),
                &swap_tx(),
                U256::from(5_000_000u64),
                "run-1",
            )
            .unwrap();

        let RebalanceAction::Swap { amount_in, .. } = intent.action;
        assert_eq!(amount_in, U256::from(1_000_000u64));
        assert!(intent.data.ends_with(ATTRIBUTION_SUFFIX));
    }

    #[test]
    fn test_amount_capped_to_session_limit() {
        // Session cap 2 USDC, balance 5 USDC, request 3 USDC -> capped to 2
        let q = quote();
        let intent = chain()
            .evaluate(
                &proposal(3_000_000),
                &session(),
                Some(&q),
                &swap_tx(),
                U256::from(5_000_000u64),
                "run-1",
            )
            .unwrap();

        assert_eq!(intent.meta.effective_amount, U256::from(2_000_000u64));
        assert_eq!(intent.meta.requested_amount, U256::from(3_000_000u64));
    }

    #[test]
    fn test_amount_capped_to_balance() {
        let q = quote();
        let intent = chain()
            .evaluate(
                &proposal(1_500_000),
                &session(),
                Some(&q),
                &swap_tx(),
                U256::from(900_000u64),
                "run-1",
            )
            .unwrap();

        assert_eq!(intent.meta.effective_amount, U256::from(900_000u64));
    }

    #[test]
    fn test_zero_balance_rejected() {
        let q = quote();
        let err = chain()
            .evaluate(
                &proposal(1_000_000),
                &session(),
                Some(&q),
                &swap_tx(),
                U256::zero(),
                "run-1",
            )
            .unwrap_err();
        assert!(matches!(err, RejectReason::ZeroEffectiveAmount));
    }

    #[test]
    fn test_kill_switch_rejects_first() {
        let disabled = GuardrailChain::new(
            Allowlist::new(false),
            false,
            8453,
            &crate::config::GuardrailConfig {
                quote_max_age_secs: 120,
            },
        );
        let q = quote();
        let err = disabled
            .evaluate(
                &proposal(1_000_000),
                &session(),
                Some(&q),
                &swap_tx(),
                U256::from(5_000_000u64),
                "run-1",
            )
            .unwrap_err();
        assert!(matches!(err, RejectReason::ExecutionDisabled));
    }

    #[test]
    fn test_expired_session_rejected() {
        let mut s = session();
        s.expires_at = Utc::now() - Duration::seconds(1);
        let q = quote();
        let err = chain()
            .evaluate(
                &proposal(1_000_000),
                &s,
                Some(&q),
                &swap_tx(),
                U256::from(5_000_000u64),
                "run-1",
            )
            .unwrap_err();
        assert!(matches!(err, RejectReason::NoActiveSession { .. }));
    }

    #[test]
    fn test_account_mismatch_rejected() {
        let mut p = proposal(1_000_000);
        p.account = addr(7);
        let q = quote();
        let err = chain()
            .evaluate(&p, &session(), Some(&q), &swap_tx(), U256::from(5_000_000u64), "run-1")
            .unwrap_err();
        assert!(matches!(err, RejectReason::AccountMismatch { .. }));
    }

    #[test]
    fn test_unknown_token_rejected() {
        let mut p = proposal(1_000_000);
        p.token_out = "SHIB".to_string();
        let q = quote();
        let err = chain()
            .evaluate(&p, &session(), Some(&q), &swap_tx(), U256::from(5_000_000u64), "run-1")
            .unwrap_err();
        assert!(matches!(err, RejectReason::TokenNotAllowed { .. }));
    }

    #[test]
    fn test_slippage_boundary_accepted_above_rejected() {
        let q = quote();
        // At the limit: accepted
        let mut p = proposal(1_000_000);
        p.slippage_bps = 100;
        assert!(chain()
            .evaluate(&p, &session(), Some(&q), &swap_tx(), U256::from(5_000_000u64), "run-1")
            .is_ok());

        // One over: rejected
        p.slippage_bps = 101;
        let err = chain()
            .evaluate(&p, &session(), Some(&q), &swap_tx(), U256::from(5_000_000u64), "run-1")
            .unwrap_err();
        assert!(matches!(err, RejectReason::SlippageTooHigh { .. }));
    }

    #[test]
    fn test_missing_quote_rejected() {
        let err = chain()
            .evaluate(
                &proposal(1_000_000),
                &session(),
                None,
                &swap_tx(),
                U256::from(5_000_000u64),
                "run-1",
            )
            .unwrap_err();
        assert!(matches!(err, RejectReason::QuoteMissing));
    }

    #[test]
    fn test_price_impact_rejected() {
        let mut q = quote();
        q.price_impact_bps = 301;
        let err = chain()
            .evaluate(
                &proposal(1_000_000),
                &session(),
                Some(&q),
                &swap_tx(),
                U256::from(5_000_000u64),
                "run-1",
            )
            .unwrap_err();
        assert!(matches!(err, RejectReason::PriceImpactTooHigh { .. }));
    }

    #[test]
    fn test_router_and_selector_checks() {
        let q = quote();
        let mut tx = swap_tx();
        tx.to = addr(9);
        let err = chain()
            .evaluate(
                &proposal(1_000_000),
                &session(),
                Some(&q),
                &tx,
                U256::from(5_000_000u64),
                "run-1",
            )
            .unwrap_err();
        assert!(matches!(err, RejectReason::RouterNotAllowed { .. }));

        let mut tx = swap_tx();
        tx.data = Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]);
        let err = chain()
            .evaluate(
                &proposal(1_000_000),
                &session(),
                Some(&q),
                &tx,
                U256::from(5_000_000u64),
                "run-1",
            )
            .unwrap_err();
        assert!(matches!(err, RejectReason::UnknownSelector { .. }));
    }

    #[test]
    fn test_stale_deadline_rejected() {
        let q = quote();
        let mut tx = swap_tx();
        tx.deadline = Utc::now().timestamp() as u64 - 10;
        let err = chain()
            .evaluate(
                &proposal(1_000_000),
                &session(),
                Some(&q),
                &tx,
                U256::from(5_000_000u64),
                "run-1",
            )
            .unwrap_err();
        assert!(matches!(err, RejectReason::StaleQuote { .. }));
    }

    #[test]
    fn test_chain_mismatch_rejected() {
        let q = quote();
        let mut p = proposal(1_000_000);
        p.chain_id = 1;
        let err = chain()
            .evaluate(&p, &session(), Some(&q), &swap_tx(), U256::from(5_000_000u64), "run-1")
            .unwrap_err();
        assert!(matches!(err, RejectReason::ChainMismatch { .. }));
    }

    #[test]
    fn test_attribution_appended_exactly_once() {
        let mut data = vec![0x01, 0x02];
        append_attribution(&mut data);
        let after_first = data.clone();
        append_attribution(&mut data);
        assert_eq!(data, after_first);
        assert!(data.ends_with(ATTRIBUTION_SUFFIX));
    }

    #[test]
    fn test_apply_slippage() {
        let out = apply_slippage(U256::from(10_000u64), 50);
        assert_eq!(out, U256::from(9_950u64));
    }
}
