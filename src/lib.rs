pub mod autonomy;
pub mod capabilities;
pub mod clients;
pub mod config;
pub mod dedupe;
pub mod domain;
pub mod error;
pub mod executor;
pub mod fees;
pub mod guardrails;
pub mod journal;
pub mod pipeline;
pub mod session;
pub mod submitter;
pub mod swarm;
pub mod telemetry;
pub mod triggers;

pub use autonomy::{AutonomyEvent, AutonomyLoop, CycleBody, CycleOutcome};
pub use capabilities::{DriftRebalancer, RebalancerSettings, RiskSentinel, YieldScout};
pub use clients::{
    AccountRpc, BundlerClient, EthereumRpc, HttpBundler, QuoteService, SwapQuote, SwapTx,
};
pub use config::AppConfig;
pub use dedupe::{dedupe_key, DedupeStore};
pub use domain::{DemandContext, ProposedAction, ProposedRebalance, StreamEvent};
pub use error::{Result, StewardError};
pub use executor::{ExecutionReport, RebalanceExecutor};
pub use fees::{FeeAccountant, FeeAccounting, SweepInstruction};
pub use guardrails::{ActionIntent, Allowlist, GuardrailChain, RejectReason};
pub use journal::{Journal, JournalEvent, MemoryJournal};
pub use pipeline::{EventSource, ExecutionCycle};
pub use session::{
    DelegatedSession, SessionLimits, SessionManager, SessionSigner, SessionStartOutcome,
    SessionStatus, SessionStopOutcome, SessionSummary,
};
pub use submitter::{OperationSubmitter, SubmitOutcome, UserOperation};
pub use swarm::{CapabilityHandler, EventRunOutcome, SwarmRunner};
pub use triggers::{triggered_capabilities, CapabilityId, EventKind};
