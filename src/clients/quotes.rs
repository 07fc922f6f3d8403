//! Swap quote seam (interface only)
//!
//! The production quote client is an external collaborator. The guardrail
//! chain consumes its output: price impact feeds stage checks, and the
//! unsigned transaction is the payload the chain validates and wraps.

use crate::error::Result;
use async_trait::async_trait;
use ethers::types::{Address, Bytes, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Pricing for a prospective swap
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapQuote {
    /// Expected output amount in base units
    pub amount_out: U256,
    /// Mid price, output per input
    pub price: Decimal,
    /// Estimated price impact of this size
    pub price_impact_bps: u32,
    /// Unix deadline the quote is valid until
    pub deadline: u64,
}

/// Unsigned swap transaction returned by the quote service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapTx {
    /// Router the calldata targets
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    /// Unix deadline embedded in the calldata
    pub deadline: u64,
}

/// Upstream quote service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteService: Send + Sync {
    /// Price a swap of `amount_in` of `token_in` into `token_out`
    async fn get_swap_quote(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
    ) -> Result<SwapQuote>;

    /// Build the unsigned swap transaction for a previously quoted swap
    async fn get_swap_tx(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        slippage_bps: u32,
        recipient: Address,
    ) -> Result<SwapTx>;
}
