//! Relay/bundler JSON-RPC client
//!
//! The bundler accepts a fully signed, hex-serialized user operation and
//! either returns the operation hash or a structured error. One submission
//! per call; retries belong to callers.

use crate::error::{Result, StewardError};
use async_trait::async_trait;
use ethers::types::Address;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Relay endpoint accepting signed user operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BundlerClient: Send + Sync {
    /// Submit one operation. Ok carries the bundler-assigned operation hash;
    /// Err carries the structured rejection.
    async fn send_user_operation(&self, op: Value, entry_point: Address) -> Result<String>;
}

/// JSON-RPC implementation over HTTP
pub struct HttpBundler {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpBundler {
    pub fn new(url: &str, timeout_ms: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
            timeout: Duration::from_millis(timeout_ms),
        }
    }
}

#[async_trait]
impl BundlerClient for HttpBundler {
    async fn send_user_operation(&self, op: Value, entry_point: Address) -> Result<String> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_sendUserOperation",
            "params": [op, format!("{:?}", entry_point)]
        });

        let request = self.client.post(&self.url).json(&body).send();
        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| StewardError::RpcTimeout {
                context: "eth_sendUserOperation".to_string(),
                elapsed_ms: self.timeout.as_millis() as u64,
            })??;

        let payload: Value = response.json().await?;
        if let Some(err) = payload.get("error") {
            return Err(StewardError::BundlerRejected {
                code: err.get("code").and_then(Value::as_i64).unwrap_or(-1),
                message: err
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
            });
        }

        let op_hash = payload
            .get("result")
            .and_then(Value::as_str)
            .ok_or_else(|| StewardError::Submission("bundler returned no hash".to_string()))?;

        debug!(op_hash, "user operation accepted by bundler");
        Ok(op_hash.to_string())
    }
}
