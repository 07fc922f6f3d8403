//! Performance fee accounting
//!
//! Computed once per cycle from realized yield. Revenue is journaled at most
//! once per cycle id, gated by a seen-set that holds across retries within
//! the process. A sweep instruction is always constructed for audit
//! visibility but is only executable under explicit approval outside dry-run
//! with well-formed addresses.

use crate::config::FeeConfig;
use crate::journal::{Journal, JournalEvent};
use ethers::types::{Address, U256};
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Why an accounting run did or did not apply a fee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeReason {
    Applies,
    NonNumericYield,
    NonPositiveYield,
    FeeRoundsToZero,
}

/// Instruction to move an accrued fee to the recipient
#[derive(Debug, Clone, Serialize)]
pub struct SweepInstruction {
    pub cycle_id: String,
    pub chain_id: u64,
    pub token: Option<Address>,
    pub recipient: Option<Address>,
    pub amount_wei: U256,
    /// True only when not dry-run, sweep approved, and both addresses parse
    pub executable: bool,
    /// Deterministic key so downstream execution can be deduplicated
    pub dedupe_key: String,
}

/// Result of one accounting run
#[derive(Debug, Clone, Serialize)]
pub struct FeeAccounting {
    pub cycle_id: String,
    pub realized_yield_wei: U256,
    pub fee_bps: u32,
    pub amount_wei: U256,
    pub applies: bool,
    pub reason: FeeReason,
    /// False when this cycle's revenue was already journaled
    pub revenue_logged: bool,
    pub sweep: Option<SweepInstruction>,
}

impl FeeAccounting {
    fn skipped(cycle_id: &str, fee_bps: u32, reason: FeeReason) -> Self {
        Self {
            cycle_id: cycle_id.to_string(),
            realized_yield_wei: U256::zero(),
            fee_bps,
            amount_wei: U256::zero(),
            applies: false,
            reason,
            revenue_logged: false,
            sweep: None,
        }
    }
}

/// Once-per-cycle fee accountant
pub struct FeeAccountant {
    config: FeeConfig,
    chain_id: u64,
    journal: Arc<dyn Journal>,
    logged_cycles: Mutex<HashSet<String>>,
}

impl FeeAccountant {
    pub fn new(config: FeeConfig, chain_id: u64, journal: Arc<dyn Journal>) -> Self {
        Self {
            config,
            chain_id,
            journal,
            logged_cycles: Mutex::new(HashSet::new()),
        }
    }

    /// Build the accounting for one cycle's realized yield.
    ///
    /// Malformed or non-positive yield short-circuits with no logging; a bad
    /// fee setting falls back to the default rather than failing the cycle.
    pub fn build_accounting(&self, cycle_id: &str, realized_yield: &str) -> FeeAccounting {
        let fee_bps = self.config.effective_fee_bps();

        let trimmed = realized_yield.trim();
        if trimmed.starts_with('-') {
            debug!(cycle_id, realized_yield, "non-positive yield, no fee");
            return FeeAccounting::skipped(cycle_id, fee_bps, FeeReason::NonPositiveYield);
        }
        let yield_wei = match U256::from_dec_str(trimmed) {
            Ok(value) => value,
            Err(_) => {
                debug!(cycle_id, realized_yield, "non-numeric yield, no fee");
                return FeeAccounting::skipped(cycle_id, fee_bps, FeeReason::NonNumericYield);
            }
        };
        if yield_wei.is_zero() {
            return FeeAccounting::skipped(cycle_id, fee_bps, FeeReason::NonPositiveYield);
        }

        // checked_mul: a yield near U256::MAX would otherwise panic here
        let amount_wei = match yield_wei.checked_mul(U256::from(fee_bps)) {
            Some(scaled) => scaled / U256::from(10_000u64),
            None => {
                debug!(cycle_id, "yield too large to scale, no fee");
                return FeeAccounting::skipped(cycle_id, fee_bps, FeeReason::NonNumericYield);
            }
        };
        if amount_wei.is_zero() {
            return FeeAccounting::skipped(cycle_id, fee_bps, FeeReason::FeeRoundsToZero);
        }

        let recipient = self.config.recipient.parse::<Address>().ok();
        let token = self.config.fee_token.parse::<Address>().ok();
        let executable = !self.config.dry_run
            && self.config.sweep_approved
            && recipient.is_some()
            && token.is_some();

        let sweep = SweepInstruction {
            cycle_id: cycle_id.to_string(),
            chain_id: self.chain_id,
            token,
            recipient,
            amount_wei,
            executable,
            dedupe_key: sweep_dedupe_key(
                cycle_id,
                self.chain_id,
                &self.config.fee_token,
                &self.config.recipient,
                amount_wei,
            ),
        };

        // At most one revenue entry per cycle, even across retries
        let revenue_logged = self
            .logged_cycles
            .lock()
            .expect("fee seen-set lock poisoned")
            .insert(cycle_id.to_string());

        if revenue_logged {
            info!(cycle_id, fee_bps, amount = %amount_wei, "revenue logged");
            self.journal.append(
                JournalEvent::new(
                    "revenue_logged",
                    json!({
                        "realized_yield_wei": yield_wei.to_string(),
                        "fee_bps": fee_bps,
                        "amount_wei": amount_wei.to_string(),
                        "sweep_executable": executable,
                        "sweep_dedupe_key": sweep.dedupe_key,
                    }),
                )
                .with_cycle(cycle_id),
            );
        } else {
            debug!(cycle_id, "revenue already logged for cycle");
        }

        FeeAccounting {
            cycle_id: cycle_id.to_string(),
            realized_yield_wei: yield_wei,
            fee_bps,
            amount_wei,
            applies: true,
            reason: FeeReason::Applies,
            revenue_logged,
            sweep: Some(sweep),
        }
    }
}

/// Plain concatenation, no hashing: keeps the key reproducible from the audit
/// trail alone.
fn sweep_dedupe_key(
    cycle_id: &str,
    chain_id: u64,
    token: &str,
    recipient: &str,
    amount_wei: U256,
) -> String {
    format!(
        "{}:{}:{}:{}:{}",
        cycle_id,
        chain_id,
        token.to_lowercase(),
        recipient.to_lowercase(),
        amount_wei
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::MemoryJournal;

    fn make_accountant(fee_bps: &str, dry_run: bool, approved: bool) -> (FeeAccountant, Arc<MemoryJournal>) {
        let journal = Arc::new(MemoryJournal::new());
        let accountant = FeeAccountant::new(
            FeeConfig {
                fee_bps: fee_bps.to_string(),
                dry_run,
                sweep_approved: approved,
                recipient: "0x70997970C51812dc3A010C7d01b50e0d17dc79C8".to_string(),
                fee_token: "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913".to_string(),
            },
            8453,
            journal.clone(),
        );
        (accountant, journal)
    }

    #[test]
    fn test_fee_computed_floor() {
        let (accountant, _) = make_accountant("1000", true, false);
        let result = accountant.build_accounting("c-1", "1000000");
        assert!(result.applies);
        assert_eq!(result.fee_bps, 1000);
        // 1_000_000 * 1000 / 10_000 = 100_000
        assert_eq!(result.amount_wei, U256::from(100_000u64));
    }

    #[test]
    fn test_out_of_range_bps_uses_default() {
        // "50" is below the minimum and must fall back to the default
        let (accountant, _) = make_accountant("50", true, false);
        let result = accountant.build_accounting("c-1", "1000000");
        assert_eq!(result.fee_bps, crate::config::DEFAULT_FEE_BPS);
    }

    #[test]
    fn test_non_numeric_yield_short_circuits() {
        let (accountant, journal) = make_accountant("1000", true, false);
        let result = accountant.build_accounting("c-1", "not-a-number");
        assert!(!result.applies);
        assert_eq!(result.reason, FeeReason::NonNumericYield);
        assert!(result.sweep.is_none());
        assert!(journal.records_of_kind("revenue_logged").is_empty());
    }

    #[test]
    fn test_negative_and_zero_yield_short_circuit() {
        let (accountant, _) = make_accountant("1000", true, false);
        assert_eq!(
            accountant.build_accounting("c-1", "-5").reason,
            FeeReason::NonPositiveYield
        );
        assert_eq!(
            accountant.build_accounting("c-2", "0").reason,
            FeeReason::NonPositiveYield
        );
    }

    #[test]
    fn test_near_max_yield_does_not_panic() {
        let (accountant, journal) = make_accountant("1000", true, false);
        let result = accountant.build_accounting("c-1", &U256::MAX.to_string());
        assert!(!result.applies);
        assert!(result.sweep.is_none());
        assert!(journal.records_of_kind("revenue_logged").is_empty());
    }

    #[test]
    fn test_fee_rounding_to_zero_short_circuits() {
        let (accountant, journal) = make_accountant("1000", true, false);
        // 5 * 1000 / 10_000 = 0
        let result = accountant.build_accounting("c-1", "5");
        assert!(!result.applies);
        assert_eq!(result.reason, FeeReason::FeeRoundsToZero);
        assert!(journal.records_of_kind("revenue_logged").is_empty());
    }

    #[test]
    fn test_revenue_logged_once_per_cycle() {
        let (accountant, journal) = make_accountant("1000", true, false);

        let first = accountant.build_accounting("c-1", "1000000");
        assert!(first.revenue_logged);

        let second = accountant.build_accounting("c-1", "1000000");
        assert!(!second.revenue_logged);
        // Still applies and reports the fee; only the logging is gated
        assert!(second.applies);

        assert_eq!(journal.records_of_kind("revenue_logged").len(), 1);

        // A different cycle logs again
        let third = accountant.build_accounting("c-2", "1000000");
        assert!(third.revenue_logged);
        assert_eq!(journal.records_of_kind("revenue_logged").len(), 2);
    }

    #[test]
    fn test_sweep_executable_gating() {
        // Dry-run: never executable
        let (accountant, _) = make_accountant("1000", true, true);
        let sweep = accountant.build_accounting("c-1", "1000000").sweep.unwrap();
        assert!(!sweep.executable);

        // Live but unapproved
        let (accountant, _) = make_accountant("1000", false, false);
        let sweep = accountant.build_accounting("c-1", "1000000").sweep.unwrap();
        assert!(!sweep.executable);

        // Live and approved with valid addresses
        let (accountant, _) = make_accountant("1000", false, true);
        let sweep = accountant.build_accounting("c-1", "1000000").sweep.unwrap();
        assert!(sweep.executable);
    }

    #[test]
    fn test_sweep_not_executable_with_bad_recipient() {
        let journal = Arc::new(MemoryJournal::new());
        let accountant = FeeAccountant::new(
            FeeConfig {
                fee_bps: "1000".to_string(),
                dry_run: false,
                sweep_approved: true,
                recipient: "treasury".to_string(),
                fee_token: "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913".to_string(),
            },
            8453,
            journal,
        );
        let sweep = accountant.build_accounting("c-1", "1000000").sweep.unwrap();
        assert!(!sweep.executable);
        assert!(sweep.recipient.is_none());
    }

    #[test]
    fn test_dedupe_key_is_deterministic_concat() {
        let (accountant, _) = make_accountant("1000", true, false);
        let a = accountant.build_accounting("c-1", "1000000").sweep.unwrap();
        let b = accountant.build_accounting("c-1", "1000000").sweep.unwrap();
        assert_eq!(a.dedupe_key, b.dedupe_key);
        assert!(a.dedupe_key.starts_with("c-1:8453:"));
        assert!(a.dedupe_key.ends_with(":100000"));
    }
}
