use crate::domain::{DemandContext, ProposedAction, StreamEvent};
use crate::error::Result;
use crate::triggers::CapabilityId;
use async_trait::async_trait;
use ethers::types::Address;

/// A capability handler: evaluates a trigger and may propose an action.
///
/// `Ok(None)` means "nothing to propose" and is a valid terminal outcome, not
/// a failure. Any value fields in a returned proposal are unvalidated until
/// the guardrail chain has passed them.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    fn id(&self) -> CapabilityId;

    /// Event-driven entry, gated by the trigger map and dedupe store
    async fn on_event(
        &self,
        event: &StreamEvent,
        principal: Address,
    ) -> Result<Option<ProposedAction>>;

    /// On-demand entry for manual/API-triggered runs; bypasses triggers and
    /// dedupe. Context has already been validated by the runner.
    async fn on_demand(&self, context: &DemandContext) -> Result<Option<ProposedAction>>;
}
