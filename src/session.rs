//! Delegated session lifecycle
//!
//! A session delegates a narrowly-scoped signing capability: a fresh
//! ephemeral keypair, a spend/slippage/impact limit set, and an expiry. The
//! private half lives only in this process's memory. Starting a session
//! returns an unsigned authorization payload the principal must counter-sign
//! on-chain, so the in-memory record can lead the on-chain state; the
//! guardrail and submission path never assume the two agree.
//!
//! Lifecycle: NONE -> ACTIVE -> (EXPIRED | STOPPED). Expiry is evaluated
//! lazily at lookup time; there is no background sweep.

use crate::clients::AccountRpc;
use crate::config::SessionConfig;
use crate::error::{Result, StewardError};
use chrono::{DateTime, Duration, Utc};
use ethers::abi::Token;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, Signature, H256, U256};
use ethers::utils::id;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use zeroize::Zeroize;

/// Per-session execution limits
#[derive(Debug, Clone, Serialize)]
pub struct SessionLimits {
    /// Spend cap per operation, input-token base units
    pub max_amount_in: U256,
    pub max_slippage_bps: u32,
    pub max_price_impact_bps: u32,
}

impl SessionLimits {
    /// Defaults resolved from configuration
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            max_amount_in: U256::from_dec_str(&config.default_max_amount_in)
                .unwrap_or_else(|_| U256::zero()),
            max_slippage_bps: config.default_max_slippage_bps,
            max_price_impact_bps: config.default_max_price_impact_bps,
        }
    }
}

/// Ephemeral signing key held only in process memory
///
/// The private material is never serialized, never logged, and never returned
/// by any accessor; the public address is the only thing that leaves.
#[derive(Clone)]
pub struct SessionSigner {
    inner: LocalWallet,
}

impl SessionSigner {
    /// Generate a fresh keypair
    pub fn generate(chain_id: u64) -> Self {
        let wallet = LocalWallet::new(&mut rand::thread_rng()).with_chain_id(chain_id);
        Self { inner: wallet }
    }

    /// Restore from a private key hex string. The input is zeroized after
    /// parsing; it is never stored.
    pub fn from_private_key(private_key: &str, chain_id: u64) -> Result<Self> {
        let mut secure_key = private_key.trim_start_matches("0x").to_string();
        let parsed = secure_key
            .parse::<LocalWallet>()
            .map_err(|e| StewardError::Signer(format!("Invalid private key: {}", e)));
        secure_key.zeroize();
        Ok(Self {
            inner: parsed?.with_chain_id(chain_id),
        })
    }

    pub fn address(&self) -> Address {
        self.inner.address()
    }

    /// Sign a 32-byte hash with the session key
    pub fn sign_hash(&self, hash: H256) -> Result<Signature> {
        self.inner
            .sign_hash(hash)
            .map_err(|e| StewardError::Signature(format!("Failed to sign hash: {}", e)))
    }
}

impl std::fmt::Debug for SessionSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSigner")
            .field("address", &self.address())
            .finish()
    }
}

/// One delegated session, keyed by principal. Exactly one per principal.
#[derive(Debug, Clone)]
pub struct DelegatedSession {
    /// Principal owner the session acts for
    pub swapper: Address,
    /// Delegate-controlled smart account
    pub smart_account: Address,
    pub signer: SessionSigner,
    pub limits: SessionLimits,
    /// Signer to restore when the session ends
    pub previous_signer: Option<Address>,
    pub chain_id: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl DelegatedSession {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Unsigned payload the principal must submit on-chain themselves
#[derive(Debug, Clone, Serialize)]
pub struct UnsignedAuthorization {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub chain_id: u64,
    pub description: String,
}

/// Result of starting a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStartOutcome {
    /// Public address of the new session key
    pub session_address: Address,
    pub expires_at: DateTime<Utc>,
    /// Authorization the principal counter-signs to activate the key
    pub authorization: UnsignedAuthorization,
}

/// Result of stopping a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStopOutcome {
    /// Signer being restored (zero address if none was recorded)
    pub restored_signer: Address,
    pub authorization: UnsignedAuthorization,
}

/// Redacted session summary; never includes key material
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_address: Address,
    pub smart_account: Address,
    pub limits: SessionLimits,
    pub expires_at: DateTime<Utc>,
}

/// Redacted status for a principal
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub active: bool,
    pub summary: Option<SessionSummary>,
}

/// Owns the per-principal session store
pub struct SessionManager {
    config: SessionConfig,
    chain_id: u64,
    session_keys_enabled: bool,
    rpc: Arc<dyn AccountRpc>,
    sessions: RwLock<HashMap<Address, DelegatedSession>>,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        chain_id: u64,
        session_keys_enabled: bool,
        rpc: Arc<dyn AccountRpc>,
    ) -> Self {
        Self {
            config,
            chain_id,
            session_keys_enabled,
            rpc,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Start a session for a principal, replacing any existing one.
    pub async fn start(
        &self,
        principal: Address,
        account: Address,
        duration_secs: u64,
        limits: SessionLimits,
    ) -> Result<SessionStartOutcome> {
        if !self.session_keys_enabled {
            return Err(StewardError::FeatureDisabled("session_keys".to_string()));
        }
        if principal.is_zero() || account.is_zero() {
            return Err(StewardError::Validation(
                "principal and account must be non-zero addresses".to_string(),
            ));
        }

        let duration_secs = duration_secs.min(self.config.max_duration_secs);

        // Best-effort read of the current signer so stop() can restore it.
        // An unreadable signer is "no previous signer", not a failure.
        let previous_signer = match self.rpc.authorized_signer(account).await {
            Ok(signer) => signer,
            Err(e) => {
                warn!(%account, error = %e, "could not read current signer; treating as unset");
                None
            }
        };

        let signer = SessionSigner::generate(self.chain_id);
        let session_address = signer.address();
        let now = Utc::now();
        let expires_at = now + Duration::seconds(duration_secs as i64);

        let session = DelegatedSession {
            swapper: principal,
            smart_account: account,
            signer,
            limits,
            previous_signer,
            chain_id: self.chain_id,
            created_at: now,
            expires_at,
        };

        self.sessions.write().await.insert(principal, session);

        info!(
            %principal, %account, %session_address, %expires_at,
            "delegated session created; awaiting on-chain activation"
        );

        Ok(SessionStartOutcome {
            session_address,
            expires_at,
            authorization: set_signer_payload(
                account,
                session_address,
                self.chain_id,
                "authorize session key",
            ),
        })
    }

    /// Stop a principal's session. The in-memory record is removed whether or
    /// not it was still live; the returned payload restores the previous (or
    /// zero) signer.
    pub async fn stop(&self, principal: Address, account: Address) -> Result<SessionStopOutcome> {
        // Possibly-expired sessions still carry the restoration value
        let removed = self.sessions.write().await.remove(&principal);

        let restored_signer = removed
            .as_ref()
            .and_then(|s| s.previous_signer)
            .unwrap_or_else(Address::zero);

        if removed.is_none() {
            warn!(%principal, "stop requested with no session on record");
        }

        info!(%principal, %account, %restored_signer, "delegated session stopped");

        Ok(SessionStopOutcome {
            restored_signer,
            authorization: set_signer_payload(
                account,
                restored_signer,
                self.chain_id,
                "restore previous signer",
            ),
        })
    }

    /// Redacted status for a principal
    pub async fn status(&self, principal: Address) -> SessionStatus {
        let sessions = self.sessions.read().await;
        match sessions.get(&principal) {
            Some(session) if !session.is_expired() => SessionStatus {
                active: true,
                summary: Some(SessionSummary {
                    session_address: session.signer.address(),
                    smart_account: session.smart_account,
                    limits: session.limits.clone(),
                    expires_at: session.expires_at,
                }),
            },
            _ => SessionStatus {
                active: false,
                summary: None,
            },
        }
    }

    /// The live session for a principal, evicting it lazily if expired.
    pub async fn active_session(&self, principal: Address) -> Option<DelegatedSession> {
        {
            let sessions = self.sessions.read().await;
            match sessions.get(&principal) {
                Some(session) if !session.is_expired() => return Some(session.clone()),
                None => return None,
                Some(_) => {}
            }
        }
        // Expired: upgrade to a write lock and evict
        self.sessions.write().await.remove(&principal);
        None
    }
}

/// Build the unsigned `setSigner(address)` call for a delegated account
fn set_signer_payload(
    account: Address,
    new_signer: Address,
    chain_id: u64,
    description: &str,
) -> UnsignedAuthorization {
    let mut calldata = id("setSigner(address)").to_vec();
    calldata.extend(ethers::abi::encode(&[Token::Address(new_signer)]));

    UnsignedAuthorization {
        to: account,
        value: U256::zero(),
        data: Bytes::from(calldata),
        chain_id,
        description: description.to_string(),
    }
}
