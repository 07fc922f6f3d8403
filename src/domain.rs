//! Core domain types shared across the dispatch and execution path

use crate::triggers::EventKind;
use chrono::{DateTime, Utc};
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

/// An ingested trigger. Immutable once constructed; the dispatch path only
/// ever reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Source-assigned event id; dedupe keys derive from this
    pub id: String,
    pub kind: EventKind,
    /// Opaque source payload; handlers interpret what they recognize
    pub data: serde_json::Value,
    pub block_number: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

impl StreamEvent {
    pub fn new(id: &str, kind: EventKind, data: serde_json::Value) -> Self {
        Self {
            id: id.to_string(),
            kind,
            data,
            block_number: None,
            timestamp: Utc::now(),
        }
    }

    pub fn at_block(mut self, block_number: u64) -> Self {
        self.block_number = Some(block_number);
        self
    }
}

/// A capability handler's output. Value fields are unvalidated until the
/// guardrail chain has passed them; a proposal is never persisted or signed
/// as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProposedAction {
    /// Swap one allowlisted token for another within session limits
    Rebalance(ProposedRebalance),
    /// Informational finding; never reaches the signer
    Advisory { severity: String, message: String },
}

impl ProposedAction {
    pub fn is_value_moving(&self) -> bool {
        matches!(self, ProposedAction::Rebalance(_))
    }
}

/// The single class of value-moving proposal this core executes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedRebalance {
    /// Principal on whose behalf the session acts
    pub swapper: Address,
    /// Delegate-controlled smart account the swap executes from
    pub account: Address,
    /// Input token, symbol or 0x-address; resolved against the allowlist
    pub token_in: String,
    /// Output token, symbol or 0x-address
    pub token_out: String,
    /// Requested input amount in base units; may be capped by guardrails
    pub amount_in: U256,
    /// Requested slippage tolerance
    pub slippage_bps: u32,
    /// Chain the proposal declares itself for
    pub chain_id: u64,
    /// Handler's stated reason, carried into the journal
    pub reason: String,
}

/// Context bag for on-demand single-capability runs. On-demand calls are
/// assumed authenticated and intentional, so missing fields are hard errors
/// rather than silent skips.
#[derive(Debug, Clone, Default)]
pub struct DemandContext {
    pub principal: Option<Address>,
    pub account: Option<Address>,
    pub params: serde_json::Value,
}

impl DemandContext {
    pub fn new(principal: Address, account: Address) -> Self {
        Self {
            principal: Some(principal),
            account: Some(account),
            params: serde_json::Value::Null,
        }
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }
}
