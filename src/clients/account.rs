//! Account-state RPC reads
//!
//! Balance, authorized-signer and replay-nonce lookups feed the guardrail
//! chain and the operation submitter. Every call carries an explicit timeout;
//! a read that hangs must fail the cycle rather than block the scheduler.

use crate::error::{Result, StewardError};
use async_trait::async_trait;
use ethers::abi::Token;
use ethers::types::{Address, U256};
use ethers::utils::id;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Read-side view of on-chain account state
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountRpc: Send + Sync {
    /// The signer a delegated account currently authorizes, if any.
    /// `None` covers both "unset" and "account not yet deployed".
    async fn authorized_signer(&self, account: Address) -> Result<Option<Address>>;

    /// ERC-20 balance of `account` for `token`, in base units
    async fn token_balance(&self, account: Address, token: Address) -> Result<U256>;

    /// Replay-protection counter for `account` at the entry point
    async fn get_op_nonce(&self, account: Address) -> Result<U256>;
}

/// JSON-RPC implementation over a standard Ethereum node
pub struct EthereumRpc {
    client: reqwest::Client,
    url: String,
    entry_point: Address,
    timeout: Duration,
}

impl EthereumRpc {
    pub fn new(url: &str, entry_point: Address, timeout_ms: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
            entry_point,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    /// One `eth_call` with timeout, returning the raw 0x-hex result
    async fn eth_call(&self, to: Address, calldata: Vec<u8>, context: &str) -> Result<String> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [
                { "to": format!("{:?}", to), "data": format!("0x{}", hex::encode(calldata)) },
                "latest"
            ]
        });

        let request = self.client.post(&self.url).json(&body).send();
        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| StewardError::RpcTimeout {
                context: context.to_string(),
                elapsed_ms: self.timeout.as_millis() as u64,
            })??;

        let payload: Value = response.json().await?;
        if let Some(err) = payload.get("error") {
            return Err(StewardError::Rpc {
                code: err.get("code").and_then(Value::as_i64).unwrap_or(-1),
                message: err
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
            });
        }

        payload
            .get("result")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| StewardError::Rpc {
                code: -1,
                message: format!("{}: malformed eth_call response", context),
            })
    }
}

fn decode_u256(hex_result: &str, context: &str) -> Result<U256> {
    let trimmed = hex_result.trim_start_matches("0x");
    if trimmed.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_str_radix(trimmed, 16).map_err(|e| StewardError::Rpc {
        code: -1,
        message: format!("{}: bad uint result: {}", context, e),
    })
}

fn decode_address(hex_result: &str) -> Option<Address> {
    let trimmed = hex_result.trim_start_matches("0x");
    if trimmed.len() < 40 {
        return None;
    }
    let tail = &trimmed[trimmed.len() - 40..];
    let bytes = hex::decode(tail).ok()?;
    let addr = Address::from_slice(&bytes);
    if addr.is_zero() {
        None
    } else {
        Some(addr)
    }
}

#[async_trait]
impl AccountRpc for EthereumRpc {
    async fn authorized_signer(&self, account: Address) -> Result<Option<Address>> {
        let calldata = id("signer()").to_vec();
        match self.eth_call(account, calldata, "authorized_signer").await {
            Ok(result) => Ok(decode_address(&result)),
            // A revert here usually means the account is not deployed yet;
            // the session path treats that as "no previous signer"
            Err(StewardError::Rpc { code, message }) => {
                debug!(%account, code, message, "signer read reverted, treating as unset");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn token_balance(&self, account: Address, token: Address) -> Result<U256> {
        let mut calldata = id("balanceOf(address)").to_vec();
        calldata.extend(ethers::abi::encode(&[Token::Address(account)]));
        let result = self.eth_call(token, calldata, "token_balance").await?;
        decode_u256(&result, "token_balance")
    }

    async fn get_op_nonce(&self, account: Address) -> Result<U256> {
        let mut calldata = id("getNonce(address,uint192)").to_vec();
        calldata.extend(ethers::abi::encode(&[
            Token::Address(account),
            Token::Uint(U256::zero()),
        ]));
        let result = self.eth_call(self.entry_point, calldata, "get_op_nonce").await?;
        decode_u256(&result, "get_op_nonce")
    }
}
