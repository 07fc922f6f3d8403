//! Autonomous cycle scheduler
//!
//! One cycle at a time: a compare-and-swap flag makes an overdue tick skip
//! rather than overlap, and the flag is released on every exit path. The
//! loop body is a trait so the full pipeline and tests plug in the same way.

use crate::config::MIN_CYCLE_INTERVAL_SECS;
use crate::error::Result;
use crate::fees::FeeAccountant;
use crate::journal::{Journal, JournalEvent};
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

/// What one cycle accomplished
#[derive(Debug, Clone, Default)]
pub struct CycleOutcome {
    /// Events pulled and dispatched this cycle
    pub events_processed: usize,
    /// Proposals that made it through submission
    pub executed: usize,
    /// Realized yield in base units, when the cycle closed any position
    pub realized_yield: Option<String>,
}

/// The work performed each tick
#[async_trait]
pub trait CycleBody: Send + Sync {
    async fn run_cycle(&self, cycle_id: &str) -> Result<CycleOutcome>;
}

/// Lifecycle notifications for observers
#[derive(Debug, Clone)]
pub enum AutonomyEvent {
    /// Scheduler configured off; no timer was started
    Disabled,
    CycleStarted { cycle_id: String },
    /// A tick fired while the previous cycle was still running
    CycleSkipped { cycle_id: String },
    CycleFinished { cycle_id: String, executed: usize },
    CycleFailed { cycle_id: String, error: String },
    /// Emitted after every non-skipped cycle, success or failure
    CycleEnded { cycle_id: String, duration_ms: u64 },
    Stopped,
}

struct LoopInner {
    body: Arc<dyn CycleBody>,
    fees: Arc<FeeAccountant>,
    journal: Arc<dyn Journal>,
    events: broadcast::Sender<AutonomyEvent>,
    in_flight: AtomicBool,
}

impl LoopInner {
    fn emit(&self, event: AutonomyEvent) {
        // No subscribers is fine; the journal is the durable record
        let _ = self.events.send(event);
    }

    /// Run one guarded cycle. Returns false when the previous cycle still
    /// holds the flag.
    async fn run_once(&self) -> bool {
        let cycle_id = Uuid::new_v4().to_string();

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!(cycle_id, "previous cycle still running, skipping tick");
            self.emit(AutonomyEvent::CycleSkipped {
                cycle_id: cycle_id.clone(),
            });
            self.journal.append(
                JournalEvent::new("cycle_skipped", json!({})).with_cycle(&cycle_id),
            );
            return false;
        }

        let started = std::time::Instant::now();
        info!(cycle_id, "cycle started");
        self.emit(AutonomyEvent::CycleStarted {
            cycle_id: cycle_id.clone(),
        });
        self.journal
            .append(JournalEvent::new("cycle_started", json!({})).with_cycle(&cycle_id));

        match self.body.run_cycle(&cycle_id).await {
            Ok(outcome) => {
                if let Some(realized_yield) = &outcome.realized_yield {
                    let accounting = self.fees.build_accounting(&cycle_id, realized_yield);
                    info!(
                        cycle_id,
                        applies = accounting.applies,
                        fee = %accounting.amount_wei,
                        "cycle fee accounting complete"
                    );
                }
                info!(
                    cycle_id,
                    events = outcome.events_processed,
                    executed = outcome.executed,
                    "cycle finished"
                );
                self.journal.append(
                    JournalEvent::new(
                        "cycle_finished",
                        json!({
                            "events_processed": outcome.events_processed,
                            "executed": outcome.executed,
                        }),
                    )
                    .with_cycle(&cycle_id),
                );
                self.emit(AutonomyEvent::CycleFinished {
                    cycle_id: cycle_id.clone(),
                    executed: outcome.executed,
                });
            }
            Err(e) => {
                error!(cycle_id, error = %e, "cycle failed");
                self.journal.append(
                    JournalEvent::new("cycle_failed", json!({ "error": e.to_string() }))
                        .with_cycle(&cycle_id),
                );
                self.emit(AutonomyEvent::CycleFailed {
                    cycle_id: cycle_id.clone(),
                    error: e.to_string(),
                });
            }
        }

        // Release before the teardown event so observers see a quiescent loop
        self.in_flight.store(false, Ordering::SeqCst);
        self.emit(AutonomyEvent::CycleEnded {
            cycle_id,
            duration_ms: started.elapsed().as_millis() as u64,
        });
        true
    }
}

/// Fixed-interval driver around the cycle body
pub struct AutonomyLoop {
    inner: Arc<LoopInner>,
    interval: Duration,
    enabled: bool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AutonomyLoop {
    pub fn new(
        interval_secs: u64,
        enabled: bool,
        body: Arc<dyn CycleBody>,
        fees: Arc<FeeAccountant>,
        journal: Arc<dyn Journal>,
    ) -> Self {
        // Sub-floor intervals would hammer the RPC and a zero interval is
        // rejected by the tokio timer, so clamp here rather than trust config.
        let interval_secs = interval_secs.max(MIN_CYCLE_INTERVAL_SECS);
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(LoopInner {
                body,
                fees,
                journal,
                events,
                in_flight: AtomicBool::new(false),
            }),
            interval: Duration::from_secs(interval_secs),
            enabled,
            handle: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AutonomyEvent> {
        self.inner.events.subscribe()
    }

    /// Run one cycle immediately, outside the timer. Used by the loop for
    /// its first pass and directly by demand-driven callers.
    pub async fn run_once(&self) -> bool {
        self.inner.run_once().await
    }

    /// Start the timer task. When disabled, emits `Disabled` and starts
    /// nothing; calling start twice replaces nothing and logs instead.
    pub fn start(&self) {
        if !self.enabled {
            info!("autonomy loop disabled, not starting");
            self.inner.emit(AutonomyEvent::Disabled);
            return;
        }

        let mut slot = self.handle.lock().expect("autonomy handle lock poisoned");
        if slot.is_some() {
            warn!("autonomy loop already running, ignoring start");
            return;
        }

        let inner = self.inner.clone();
        let interval = self.interval;
        *slot = Some(tokio::spawn(async move {
            // First cycle fires immediately, then on the interval
            inner.run_once().await;
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                inner.run_once().await;
            }
        }));
        info!(interval_secs = interval.as_secs(), "autonomy loop started");
    }

    /// Stop the timer. Advisory: a cycle already executing is not awaited.
    pub fn stop(&self) {
        let mut slot = self.handle.lock().expect("autonomy handle lock poisoned");
        if let Some(handle) = slot.take() {
            handle.abort();
            self.inner.emit(AutonomyEvent::Stopped);
            self.inner
                .journal
                .append(JournalEvent::new("autonomy_stopped", json!({})));
            info!("autonomy loop stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .expect("autonomy handle lock poisoned")
            .is_some()
    }
}

impl Drop for AutonomyLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeeConfig;
    use crate::journal::MemoryJournal;
    use std::sync::atomic::AtomicUsize;

    struct CountingBody {
        runs: AtomicUsize,
        delay: Duration,
        realized_yield: Option<String>,
    }

    #[async_trait]
    impl CycleBody for CountingBody {
        async fn run_cycle(&self, _cycle_id: &str) -> Result<CycleOutcome> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(CycleOutcome {
                events_processed: 1,
                executed: 0,
                realized_yield: self.realized_yield.clone(),
            })
        }
    }

    fn build_loop(
        body: Arc<CountingBody>,
        enabled: bool,
        interval_secs: u64,
    ) -> (AutonomyLoop, Arc<MemoryJournal>) {
        let journal = Arc::new(MemoryJournal::new());
        let fees = Arc::new(FeeAccountant::new(
            FeeConfig {
                fee_bps: "1000".to_string(),
                dry_run: true,
                sweep_approved: false,
                recipient: String::new(),
                fee_token: String::new(),
            },
            8453,
            journal.clone(),
        ));
        let autonomy = AutonomyLoop::new(interval_secs, enabled, body, fees, journal.clone());
        (autonomy, journal)
    }

    #[tokio::test]
    async fn test_run_once_journals_lifecycle() {
        let body = Arc::new(CountingBody {
            runs: AtomicUsize::new(0),
            delay: Duration::ZERO,
            realized_yield: None,
        });
        let (autonomy, journal) = build_loop(body.clone(), true, 60);

        assert!(autonomy.run_once().await);
        assert_eq!(body.runs.load(Ordering::SeqCst), 1);
        assert_eq!(journal.records_of_kind("cycle_started").len(), 1);
        assert_eq!(journal.records_of_kind("cycle_finished").len(), 1);
    }

    #[tokio::test]
    async fn test_overlapping_cycle_is_skipped() {
        let body = Arc::new(CountingBody {
            runs: AtomicUsize::new(0),
            delay: Duration::from_millis(200),
            realized_yield: None,
        });
        let (autonomy, journal) = build_loop(body.clone(), true, 60);
        let autonomy = Arc::new(autonomy);

        let slow = {
            let autonomy = autonomy.clone();
            tokio::spawn(async move { autonomy.run_once().await })
        };
        // Let the first cycle take the flag, then race a second tick
        tokio::time::sleep(Duration::from_millis(50)).await;
        let skipped = !autonomy.run_once().await;

        assert!(skipped);
        assert!(slow.await.unwrap());
        assert_eq!(body.runs.load(Ordering::SeqCst), 1);
        assert_eq!(journal.records_of_kind("cycle_skipped").len(), 1);

        // The flag was released; a later cycle runs normally
        assert!(autonomy.run_once().await);
        assert_eq!(body.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_disabled_loop_starts_nothing() {
        let body = Arc::new(CountingBody {
            runs: AtomicUsize::new(0),
            delay: Duration::ZERO,
            realized_yield: None,
        });
        let (autonomy, _) = build_loop(body.clone(), false, 60);
        let mut events = autonomy.subscribe();

        autonomy.start();
        assert!(!autonomy.is_running());
        assert!(matches!(events.try_recv(), Ok(AutonomyEvent::Disabled)));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(body.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_start_runs_immediately_and_stop_aborts() {
        let body = Arc::new(CountingBody {
            runs: AtomicUsize::new(0),
            delay: Duration::ZERO,
            realized_yield: None,
        });
        let (autonomy, _) = build_loop(body.clone(), true, 3_600);

        autonomy.start();
        assert!(autonomy.is_running());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(body.runs.load(Ordering::SeqCst), 1);

        autonomy.stop();
        assert!(!autonomy.is_running());
    }

    #[tokio::test]
    async fn test_sub_floor_interval_is_clamped() {
        let body = Arc::new(CountingBody {
            runs: AtomicUsize::new(0),
            delay: Duration::ZERO,
            realized_yield: None,
        });
        let (autonomy, _) = build_loop(body.clone(), true, 0);
        assert_eq!(
            autonomy.interval,
            Duration::from_secs(MIN_CYCLE_INTERVAL_SECS)
        );

        // A zero interval would panic the timer task after the first cycle;
        // with the clamp the loop runs the immediate cycle and keeps ticking.
        autonomy.start();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(body.runs.load(Ordering::SeqCst), 1);
        assert!(autonomy.is_running());
        autonomy.stop();
    }

    #[tokio::test]
    async fn test_cycle_yield_feeds_fee_accounting() {
        let body = Arc::new(CountingBody {
            runs: AtomicUsize::new(0),
            delay: Duration::ZERO,
            realized_yield: Some("1000000".to_string()),
        });
        let (autonomy, journal) = build_loop(body, true, 60);

        autonomy.run_once().await;
        assert_eq!(journal.records_of_kind("revenue_logged").len(), 1);
    }
}
