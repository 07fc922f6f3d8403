//! Operation submitter
//!
//! Takes a guardrail-approved `ActionIntent` and produces exactly one relay
//! submission: fetch the replay nonce, assemble the user operation with fixed
//! conservative gas (the bundler simulates; we do not), hash, sign with the
//! session key only, serialize to wire hex, submit once with a timeout. The
//! principal's primary key is never loaded by this process. Retries, if any,
//! belong to the caller.

use crate::clients::{AccountRpc, BundlerClient};
use crate::error::StewardError;
use crate::guardrails::ActionIntent;
use crate::journal::{Journal, JournalEvent};
use crate::session::SessionSigner;
use ethers::abi::Token;
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::{id, keccak256};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Conservative fixed gas estimates; the relay simulates before inclusion
const CALL_GAS_LIMIT: u64 = 250_000;
const VERIFICATION_GAS_LIMIT: u64 = 150_000;
const PRE_VERIFICATION_GAS: u64 = 60_000;
const MAX_FEE_PER_GAS_WEI: u64 = 1_500_000_000;
const MAX_PRIORITY_FEE_PER_GAS_WEI: u64 = 1_000_000_000;

/// An ERC-4337-style user operation, pre-signature
#[derive(Debug, Clone)]
pub struct UserOperation {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster_and_data: Bytes,
}

impl UserOperation {
    /// Canonical hash the session key signs: keccak over the packed operation
    /// fields, bound to the entry point and chain id.
    pub fn op_hash(&self, entry_point: Address, chain_id: u64) -> H256 {
        let packed = ethers::abi::encode(&[
            Token::Address(self.sender),
            Token::Uint(self.nonce),
            Token::FixedBytes(keccak256(&self.init_code).to_vec()),
            Token::FixedBytes(keccak256(&self.call_data).to_vec()),
            Token::Uint(self.call_gas_limit),
            Token::Uint(self.verification_gas_limit),
            Token::Uint(self.pre_verification_gas),
            Token::Uint(self.max_fee_per_gas),
            Token::Uint(self.max_priority_fee_per_gas),
            Token::FixedBytes(keccak256(&self.paymaster_and_data).to_vec()),
        ]);

        let outer = ethers::abi::encode(&[
            Token::FixedBytes(keccak256(packed).to_vec()),
            Token::Address(entry_point),
            Token::Uint(U256::from(chain_id)),
        ]);

        H256::from(keccak256(outer))
    }

    /// Wire form: every numeric field as 0x-prefixed fixed-width hex
    pub fn to_wire(&self, signature: &str) -> serde_json::Value {
        json!({
            "sender": format!("{:?}", self.sender),
            "nonce": hex_word(self.nonce),
            "initCode": format!("0x{}", hex::encode(&self.init_code)),
            "callData": format!("0x{}", hex::encode(&self.call_data)),
            "callGasLimit": hex_word(self.call_gas_limit),
            "verificationGasLimit": hex_word(self.verification_gas_limit),
            "preVerificationGas": hex_word(self.pre_verification_gas),
            "maxFeePerGas": hex_word(self.max_fee_per_gas),
            "maxPriorityFeePerGas": hex_word(self.max_priority_fee_per_gas),
            "paymasterAndData": format!("0x{}", hex::encode(&self.paymaster_and_data)),
            "signature": signature,
        })
    }
}

/// Fixed-width (32-byte) hex encoding for wire numerics
fn hex_word(value: U256) -> String {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    format!("0x{}", hex::encode(buf))
}

/// Classified result of one submission attempt. Always a structured value;
/// callers decide whether a retryable failure is worth a later cycle.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    Submitted {
        intent_id: Uuid,
        op_hash: String,
    },
    Failed {
        intent_id: Uuid,
        code: Option<i64>,
        message: String,
        retryable: bool,
    },
}

impl SubmitOutcome {
    pub fn is_submitted(&self) -> bool {
        matches!(self, SubmitOutcome::Submitted { .. })
    }
}

/// Builds, signs and submits operations for validated intents
pub struct OperationSubmitter {
    bundler: Arc<dyn BundlerClient>,
    account_rpc: Arc<dyn AccountRpc>,
    journal: Arc<dyn Journal>,
    entry_point: Address,
    chain_id: u64,
}

impl OperationSubmitter {
    pub fn new(
        bundler: Arc<dyn BundlerClient>,
        account_rpc: Arc<dyn AccountRpc>,
        journal: Arc<dyn Journal>,
        entry_point: Address,
        chain_id: u64,
    ) -> Self {
        Self {
            bundler,
            account_rpc,
            journal,
            entry_point,
            chain_id,
        }
    }

    /// Submit one validated intent. Exactly one network submission per call;
    /// every outcome is journaled under the intent's run id.
    pub async fn submit(&self, intent: &ActionIntent, signer: &SessionSigner) -> SubmitOutcome {
        let sender = intent.meta.account;

        // Replay-protection counter from the entry point
        let nonce = match self.account_rpc.get_op_nonce(sender).await {
            Ok(nonce) => nonce,
            Err(e) => {
                let retryable = e.is_retryable();
                return self.failed(intent, None, format!("nonce fetch: {}", e), retryable);
            }
        };

        let op = UserOperation {
            sender,
            nonce,
            init_code: Bytes::new(),
            call_data: execute_call_data(intent),
            call_gas_limit: U256::from(CALL_GAS_LIMIT),
            verification_gas_limit: U256::from(VERIFICATION_GAS_LIMIT),
            pre_verification_gas: U256::from(PRE_VERIFICATION_GAS),
            max_fee_per_gas: U256::from(MAX_FEE_PER_GAS_WEI),
            max_priority_fee_per_gas: U256::from(MAX_PRIORITY_FEE_PER_GAS_WEI),
            paymaster_and_data: Bytes::new(),
        };

        let hash = op.op_hash(self.entry_point, self.chain_id);
        let signature = match signer.sign_hash(hash) {
            Ok(sig) => format!("0x{}", hex::encode(sig.to_vec())),
            Err(e) => return self.failed(intent, None, e.to_string(), false),
        };

        match self
            .bundler
            .send_user_operation(op.to_wire(&signature), self.entry_point)
            .await
        {
            Ok(op_hash) => {
                info!(intent_id = %intent.intent_id, op_hash, "operation submitted");
                self.journal.append(
                    JournalEvent::new(
                        "operation_submitted",
                        json!({
                            "intent_id": intent.intent_id,
                            "op_hash": op_hash,
                            "sender": format!("{:?}", sender),
                            "nonce": nonce.to_string(),
                        }),
                    )
                    .with_run(&intent.run_id),
                );
                SubmitOutcome::Submitted {
                    intent_id: intent.intent_id,
                    op_hash,
                }
            }
            Err(e) => {
                let (code, retryable) = match &e {
                    StewardError::BundlerRejected { code, .. } => (Some(*code), e.is_retryable()),
                    other => (None, other.is_retryable()),
                };
                self.failed(intent, code, e.to_string(), retryable)
            }
        }
    }

    fn failed(
        &self,
        intent: &ActionIntent,
        code: Option<i64>,
        message: String,
        retryable: bool,
    ) -> SubmitOutcome {
        warn!(intent_id = %intent.intent_id, %message, retryable, "submission failed");
        self.journal.append(
            JournalEvent::new(
                "operation_failed",
                json!({
                    "intent_id": intent.intent_id,
                    "code": code,
                    "message": message,
                    "retryable": retryable,
                }),
            )
            .with_run(&intent.run_id),
        );
        SubmitOutcome::Failed {
            intent_id: intent.intent_id,
            code,
            message,
            retryable,
        }
    }
}

/// Wrap the intent payload in the account's `execute(address,uint256,bytes)`
fn execute_call_data(intent: &ActionIntent) -> Bytes {
    let mut call_data = id("execute(address,uint256,bytes)").to_vec();
    call_data.extend(ethers::abi::encode(&[
        Token::Address(intent.to),
        Token::Uint(intent.value),
        Token::Bytes(intent.data.to_vec()),
    ]));
    Bytes::from(call_data)
}
