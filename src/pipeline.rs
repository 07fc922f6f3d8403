//! Production cycle body
//!
//! One autonomy tick: confirm the principal still has a live session, pull
//! pending events plus the tick itself, dispatch through the swarm runner,
//! and push every value-moving proposal through the execution pipeline.

use crate::autonomy::{CycleBody, CycleOutcome};
use crate::domain::{ProposedAction, StreamEvent};
use crate::error::Result;
use crate::executor::RebalanceExecutor;
use crate::session::SessionManager;
use crate::swarm::SwarmRunner;
use crate::triggers::EventKind;
use async_trait::async_trait;
use ethers::types::Address;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Upstream feed of pending trigger events and realized yield
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Drain events accumulated since the last cycle
    async fn poll_events(&self) -> Result<Vec<StreamEvent>>;

    /// Yield realized since the last time this was read, in base units
    async fn realized_yield(&self) -> Result<Option<String>>;
}

/// The full dispatch-and-execute pass run each tick
pub struct ExecutionCycle {
    source: Arc<dyn EventSource>,
    runner: Arc<SwarmRunner>,
    executor: Arc<RebalanceExecutor>,
    sessions: Arc<SessionManager>,
    principal: Address,
    account: Address,
}

impl ExecutionCycle {
    pub fn new(
        source: Arc<dyn EventSource>,
        runner: Arc<SwarmRunner>,
        executor: Arc<RebalanceExecutor>,
        sessions: Arc<SessionManager>,
        principal: Address,
        account: Address,
    ) -> Self {
        Self {
            source,
            runner,
            executor,
            sessions,
            principal,
            account,
        }
    }
}

#[async_trait]
impl CycleBody for ExecutionCycle {
    async fn run_cycle(&self, cycle_id: &str) -> Result<CycleOutcome> {
        // A dead session means nothing value-moving can execute; skip the
        // whole pass rather than dispatch proposals that will all reject.
        if self.sessions.active_session(self.principal).await.is_none() {
            info!(cycle_id, principal = ?self.principal, "no live session, idle cycle");
            return Ok(CycleOutcome::default());
        }

        let mut events = self.source.poll_events().await?;
        events.push(StreamEvent::new(
            &format!("tick-{}", cycle_id),
            EventKind::ScheduledTick,
            json!({ "account": format!("{:?}", self.account) }),
        ));

        let mut executed = 0usize;
        let events_processed = events.len();

        for event in &events {
            let outcome = self.runner.run_on_event(event, self.principal).await;
            for proposal in &outcome.proposals {
                let ProposedAction::Rebalance(rebalance) = proposal else {
                    continue;
                };
                match self.executor.execute(rebalance, &outcome.run_id).await {
                    Ok(report) if report.executed => executed += 1,
                    Ok(report) => {
                        info!(run_id = %outcome.run_id, reason = %report.reason, "proposal not executed");
                    }
                    Err(e) => {
                        // Infrastructure failure on one proposal does not end
                        // the cycle; the rest still get their shot.
                        warn!(run_id = %outcome.run_id, error = %e, "execution errored");
                    }
                }
            }
        }

        let realized_yield = self.source.realized_yield().await.unwrap_or_else(|e| {
            warn!(cycle_id, error = %e, "yield read failed, skipping fee accounting");
            None
        });

        Ok(CycleOutcome {
            events_processed,
            executed,
            realized_yield,
        })
    }
}
