//! Scheduler single-flight semantics and fee accounting idempotency, driven
//! through the public surface with a stub cycle body.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use steward::config::{FeeConfig, DEFAULT_FEE_BPS};
use steward::{AutonomyLoop, CycleBody, CycleOutcome, FeeAccountant, MemoryJournal};

struct SlowBody {
    runs: AtomicUsize,
    delay_ms: u64,
}

#[async_trait]
impl CycleBody for SlowBody {
    async fn run_cycle(&self, _cycle_id: &str) -> steward::Result<CycleOutcome> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        Ok(CycleOutcome {
            events_processed: 0,
            executed: 0,
            realized_yield: Some("1000000".to_string()),
        })
    }
}

fn fee_config(fee_bps: &str) -> FeeConfig {
    FeeConfig {
        fee_bps: fee_bps.to_string(),
        dry_run: true,
        sweep_approved: false,
        recipient: "0x70997970C51812dc3A010C7d01b50e0d17dc79C8".to_string(),
        fee_token: "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913".to_string(),
    }
}

fn build(delay_ms: u64) -> (Arc<AutonomyLoop>, Arc<SlowBody>, Arc<MemoryJournal>) {
    let journal = Arc::new(MemoryJournal::new());
    let body = Arc::new(SlowBody {
        runs: AtomicUsize::new(0),
        delay_ms,
    });
    let fees = Arc::new(FeeAccountant::new(fee_config("1000"), 8453, journal.clone()));
    let autonomy = Arc::new(AutonomyLoop::new(
        60,
        true,
        body.clone(),
        fees,
        journal.clone(),
    ));
    (autonomy, body, journal)
}

#[tokio::test]
async fn concurrent_ticks_run_one_cycle() {
    let (autonomy, body, journal) = build(200);

    let slow = {
        let autonomy = autonomy.clone();
        tokio::spawn(async move { autonomy.run_once().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Second tick while the first is mid-cycle: skipped, not queued
    assert!(!autonomy.run_once().await);
    assert!(slow.await.unwrap());

    assert_eq!(body.runs.load(Ordering::SeqCst), 1);
    assert_eq!(journal.records_of_kind("cycle_skipped").len(), 1);
    assert_eq!(journal.records_of_kind("cycle_finished").len(), 1);
}

#[tokio::test]
async fn cycle_completion_accounts_fees_once() {
    let (autonomy, _, journal) = build(0);

    autonomy.run_once().await;
    autonomy.run_once().await;

    // Two distinct cycles, two revenue entries; within a cycle it is once
    assert_eq!(journal.records_of_kind("revenue_logged").len(), 2);
}

#[test]
fn fee_accounting_is_idempotent_per_cycle() {
    let journal = Arc::new(MemoryJournal::new());
    let accountant = FeeAccountant::new(fee_config("1000"), 8453, journal.clone());

    let first = accountant.build_accounting("cycle-7", "1000000");
    let second = accountant.build_accounting("cycle-7", "1000000");

    assert!(first.revenue_logged);
    assert!(!second.revenue_logged);
    assert_eq!(first.amount_wei, second.amount_wei);
    assert_eq!(journal.records_of_kind("revenue_logged").len(), 1);
}

#[test]
fn out_of_range_fee_bps_falls_back_to_default() {
    let journal = Arc::new(MemoryJournal::new());

    // Below minimum, above maximum, and unparseable all fall back
    for bad in ["50", "5000", "ten percent"] {
        let accountant = FeeAccountant::new(fee_config(bad), 8453, journal.clone());
        let accounting = accountant.build_accounting("cycle-1", "1000000");
        assert_eq!(accounting.fee_bps, DEFAULT_FEE_BPS, "fee_bps = {:?}", bad);
    }
}

#[test]
fn malformed_yield_never_logs_revenue() {
    let journal = Arc::new(MemoryJournal::new());
    let accountant = FeeAccountant::new(fee_config("1000"), 8453, journal.clone());

    for bad in ["abc", "-100", "0", ""] {
        let accounting = accountant.build_accounting("cycle-1", bad);
        assert!(!accounting.applies, "yield = {:?}", bad);
    }
    assert!(journal.records_of_kind("revenue_logged").is_empty());
}
