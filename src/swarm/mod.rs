//! Capability dispatch
//!
//! Turns an ingested event into capability handler invocations, with a dedupe
//! claim per `(event, handler)` pair and per-handler fault isolation: one
//! failing handler never aborts its siblings.

pub mod runner;
pub mod traits;

pub use runner::{CapabilityError, EventRunOutcome, RunnerStats, SwarmRunner};
pub use traits::CapabilityHandler;
