//! Guardrail chain
//!
//! The single choke point between a capability proposal and the signer. Every
//! value-moving payload passes the ordered stage sequence in `chain`; token,
//! router and selector resolution comes from the hardcoded tables in
//! `allowlist`. Evaluation is pure and synchronous; the balance and quote
//! lookups that feed it complete before any stage runs.

pub mod allowlist;
pub mod chain;

pub use allowlist::{Allowlist, ResolvedToken};
pub use chain::{
    ActionIntent, GuardrailChain, IntentMeta, RebalanceAction, RejectReason, ATTRIBUTION_SUFFIX,
};
