//! End-to-end rebalance execution
//!
//! Wires one proposal through the full path: live session lookup, quote and
//! balance fetch, the guardrail chain, then operation submission. Every exit
//! produces a report; a rejected proposal is a normal outcome, not an error.

use crate::clients::{AccountRpc, QuoteService};
use crate::domain::ProposedRebalance;
use crate::error::Result;
use crate::guardrails::{Allowlist, GuardrailChain};
use crate::journal::{Journal, JournalEvent};
use crate::session::SessionManager;
use crate::submitter::{OperationSubmitter, SubmitOutcome};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Terminal result of one proposal, rejected or submitted
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub run_id: String,
    pub executed: bool,
    pub reason: String,
    pub op_hash: Option<String>,
}

impl ExecutionReport {
    fn rejected(run_id: &str, reason: impl std::fmt::Display) -> Self {
        Self {
            run_id: run_id.to_string(),
            executed: false,
            reason: reason.to_string(),
            op_hash: None,
        }
    }
}

/// Drives a proposal from session lookup through submission
pub struct RebalanceExecutor {
    sessions: Arc<SessionManager>,
    quotes: Arc<dyn QuoteService>,
    account_rpc: Arc<dyn AccountRpc>,
    allowlist: Allowlist,
    guardrails: GuardrailChain,
    submitter: OperationSubmitter,
    journal: Arc<dyn Journal>,
}

impl RebalanceExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sessions: Arc<SessionManager>,
        quotes: Arc<dyn QuoteService>,
        account_rpc: Arc<dyn AccountRpc>,
        allowlist: Allowlist,
        guardrails: GuardrailChain,
        submitter: OperationSubmitter,
        journal: Arc<dyn Journal>,
    ) -> Self {
        Self {
            sessions,
            quotes,
            account_rpc,
            allowlist,
            guardrails,
            submitter,
            journal,
        }
    }

    /// Execute one proposal. Infrastructure failures (RPC, quote service)
    /// surface as errors; guardrail terminations come back as reports.
    pub async fn execute(
        &self,
        proposal: &ProposedRebalance,
        run_id: &str,
    ) -> Result<ExecutionReport> {
        let Some(session) = self.sessions.active_session(proposal.swapper).await else {
            info!(run_id, principal = ?proposal.swapper, "no active session, skipping");
            return Ok(self.reject(run_id, proposal, "no active session"));
        };

        // Tokens must resolve before we can talk to the quote service; the
        // chain re-checks this as its own stage.
        let token_in = match self.allowlist.resolve_token(&proposal.token_in) {
            Ok(token) => token,
            Err(_) => {
                return Ok(self.reject(run_id, proposal, format!("token not allowed: {}", proposal.token_in)));
            }
        };
        let token_out = match self.allowlist.resolve_token(&proposal.token_out) {
            Ok(token) => token,
            Err(_) => {
                return Ok(self.reject(run_id, proposal, format!("token not allowed: {}", proposal.token_out)));
            }
        };

        let balance = self
            .account_rpc
            .token_balance(session.smart_account, token_in.address)
            .await?;

        // Quote at the amount the chain will actually approve so the payload
        // and the intent agree on size.
        let effective_amount = proposal
            .amount_in
            .min(session.limits.max_amount_in)
            .min(balance);
        if effective_amount.is_zero() {
            return Ok(self.reject(run_id, proposal, "effective amount is zero"));
        }

        let quote = self
            .quotes
            .get_swap_quote(token_in.address, token_out.address, effective_amount)
            .await?;
        let swap_tx = self
            .quotes
            .get_swap_tx(
                token_in.address,
                token_out.address,
                effective_amount,
                proposal.slippage_bps,
                session.smart_account,
            )
            .await?;

        let intent = match self
            .guardrails
            .evaluate(proposal, &session, Some(&quote), &swap_tx, balance, run_id)
        {
            Ok(intent) => intent,
            Err(reason) => {
                warn!(run_id, %reason, "guardrail chain terminated proposal");
                return Ok(self.reject(run_id, proposal, reason));
            }
        };

        match self.submitter.submit(&intent, &session.signer).await {
            SubmitOutcome::Submitted { op_hash, .. } => {
                info!(run_id, op_hash, "rebalance submitted");
                Ok(ExecutionReport {
                    run_id: run_id.to_string(),
                    executed: true,
                    reason: "submitted".to_string(),
                    op_hash: Some(op_hash),
                })
            }
            SubmitOutcome::Failed { message, .. } => Ok(self.reject(run_id, proposal, message)),
        }
    }

    fn reject(
        &self,
        run_id: &str,
        proposal: &ProposedRebalance,
        reason: impl std::fmt::Display,
    ) -> ExecutionReport {
        let report = ExecutionReport::rejected(run_id, reason);
        self.journal.append(
            JournalEvent::new(
                "rebalance_rejected",
                json!({
                    "principal": format!("{:?}", proposal.swapper),
                    "token_in": proposal.token_in,
                    "token_out": proposal.token_out,
                    "requested_amount": proposal.amount_in.to_string(),
                    "reason": report.reason,
                }),
            )
            .with_run(run_id),
        );
        report
    }

}
