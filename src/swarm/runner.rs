use crate::dedupe::{dedupe_key, DedupeStore};
use crate::domain::{DemandContext, ProposedAction, StreamEvent};
use crate::error::{Result, StewardError};
use crate::journal::{Journal, JournalEvent};
use crate::swarm::traits::CapabilityHandler;
use crate::triggers::{triggered_capabilities, CapabilityId};
use chrono::{DateTime, Utc};
use ethers::types::Address;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One handler failure captured during an event run
#[derive(Debug, Clone)]
pub struct CapabilityError {
    pub capability: CapabilityId,
    pub message: String,
}

/// Aggregate result of one event-driven dispatch
#[derive(Debug, Clone)]
pub struct EventRunOutcome {
    pub run_id: String,
    /// Capabilities that actually ran, in trigger order
    pub invoked: Vec<CapabilityId>,
    pub proposals: Vec<ProposedAction>,
    /// Capabilities skipped because their dedupe claim was already held
    pub skipped_dedupe: Vec<CapabilityId>,
    pub errors: Vec<CapabilityError>,
    pub timestamp: DateTime<Utc>,
}

/// Dispatch counters
#[derive(Debug, Default, Clone)]
pub struct RunnerStats {
    pub events_received: u64,
    pub handlers_invoked: u64,
    pub proposals: u64,
    pub dedupe_skips: u64,
    pub handler_errors: u64,
}

/// Invokes capability handlers per event or on demand
pub struct SwarmRunner {
    handlers: HashMap<CapabilityId, Box<dyn CapabilityHandler>>,
    dedupe: Arc<DedupeStore>,
    journal: Arc<dyn Journal>,
    stats: RwLock<RunnerStats>,
}

impl SwarmRunner {
    pub fn new(dedupe: Arc<DedupeStore>, journal: Arc<dyn Journal>) -> Self {
        Self {
            handlers: HashMap::new(),
            dedupe,
            journal,
            stats: RwLock::new(RunnerStats::default()),
        }
    }

    /// Register a handler. Handlers are wired at startup; there is no runtime
    /// registration API past construction.
    pub fn register(mut self, handler: Box<dyn CapabilityHandler>) -> Self {
        let id = handler.id();
        if self.handlers.insert(id, handler).is_some() {
            warn!(%id, "capability handler replaced");
        }
        self
    }

    pub fn registered(&self) -> Vec<CapabilityId> {
        self.handlers.keys().copied().collect()
    }

    /// Event-driven dispatch: trigger map lookup, dedupe claim per handler,
    /// isolated invocation, aggregate outcome.
    pub async fn run_on_event(
        &self,
        event: &StreamEvent,
        principal: Address,
    ) -> EventRunOutcome {
        let run_id = Uuid::new_v4().to_string();
        let mut outcome = EventRunOutcome {
            run_id: run_id.clone(),
            invoked: Vec::new(),
            proposals: Vec::new(),
            skipped_dedupe: Vec::new(),
            errors: Vec::new(),
            timestamp: Utc::now(),
        };

        self.stats.write().await.events_received += 1;

        let capabilities = triggered_capabilities(event.kind);
        debug!(
            event_id = %event.id, kind = %event.kind, count = capabilities.len(),
            "dispatching event"
        );

        for capability in capabilities {
            let key = dedupe_key(&event.id, capability.as_str(), None);
            if !self.dedupe.acquire_once(&key) {
                debug!(%capability, event_id = %event.id, "dedupe skip");
                outcome.skipped_dedupe.push(*capability);
                self.stats.write().await.dedupe_skips += 1;
                continue;
            }

            let Some(handler) = self.handlers.get(capability) else {
                outcome.errors.push(CapabilityError {
                    capability: *capability,
                    message: "no handler registered".to_string(),
                });
                continue;
            };

            // Fault isolation: a handler error is captured per-capability and
            // must not abort siblings.
            match handler.on_event(event, principal).await {
                Ok(Some(proposal)) => {
                    outcome.invoked.push(*capability);
                    outcome.proposals.push(proposal);
                    let mut stats = self.stats.write().await;
                    stats.handlers_invoked += 1;
                    stats.proposals += 1;
                }
                Ok(None) => {
                    outcome.invoked.push(*capability);
                    self.stats.write().await.handlers_invoked += 1;
                }
                Err(e) => {
                    warn!(%capability, error = %e, "capability handler failed");
                    outcome.errors.push(CapabilityError {
                        capability: *capability,
                        message: e.to_string(),
                    });
                    let mut stats = self.stats.write().await;
                    stats.handlers_invoked += 1;
                    stats.handler_errors += 1;
                }
            }
        }

        self.journal.append(
            JournalEvent::new(
                "event_run",
                json!({
                    "event_id": event.id,
                    "kind": event.kind,
                    "invoked": outcome.invoked,
                    "skipped_dedupe": outcome.skipped_dedupe,
                    "proposals": outcome.proposals.len(),
                    "errors": outcome.errors.len(),
                }),
            )
            .with_run(&run_id),
        );

        info!(
            run_id = %run_id,
            invoked = outcome.invoked.len(),
            skipped = outcome.skipped_dedupe.len(),
            errors = outcome.errors.len(),
            "event run complete"
        );

        outcome
    }

    /// On-demand single-capability run. Bypasses the trigger map and dedupe;
    /// missing context fields are hard errors because on-demand calls are
    /// assumed authenticated and intentional.
    pub async fn run_on_demand(
        &self,
        capability: CapabilityId,
        context: &DemandContext,
    ) -> Result<Option<ProposedAction>> {
        if context.principal.is_none() {
            return Err(StewardError::Validation(
                "on-demand run requires a principal".to_string(),
            ));
        }
        if context.account.is_none() {
            return Err(StewardError::Validation(
                "on-demand run requires an account".to_string(),
            ));
        }

        let handler = self
            .handlers
            .get(&capability)
            .ok_or_else(|| StewardError::UnknownCapability(capability.to_string()))?;

        let run_id = Uuid::new_v4().to_string();
        let result = handler.on_demand(context).await;

        self.journal.append(
            JournalEvent::new(
                "demand_run",
                json!({
                    "capability": capability,
                    "proposed": matches!(result, Ok(Some(_))),
                    "error": result.as_ref().err().map(|e| e.to_string()),
                }),
            )
            .with_run(&run_id),
        );

        self.stats.write().await.handlers_invoked += 1;
        result
    }

    pub async fn stats(&self) -> RunnerStats {
        self.stats.read().await.clone()
    }
}
