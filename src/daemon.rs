//! Background engine driving the scheduler on a fixed tick.
//!
//! Only one tick loop may run per [`Engine`]. Stopping cancels the loop,
//! lets the current tick finish within the drain timeout and abandons it
//! after that.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app::{RelayError, Result};
use crate::scheduler::UpdateScheduler;

pub struct Engine {
    scheduler: UpdateScheduler,
    running: Arc<AtomicBool>,
}

/// Returned by [`Engine::start`]; dropping it without `stop` leaves the
/// loop running until the runtime shuts down.
#[derive(Debug)]
pub struct EngineHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    drain_timeout: Duration,
}

/// Clears the running flag when the loop ends, including on abort.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Engine {
    pub fn new(scheduler: UpdateScheduler) -> Self {
        Self {
            scheduler,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn the tick loop. The first tick runs immediately.
    pub fn start(&self) -> Result<EngineHandle> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(RelayError::Other("engine is already running".into()));
        }

        let guard = RunningGuard(self.running.clone());
        let cancel = CancellationToken::new();
        let scheduler = self.scheduler.clone();
        let period = scheduler.config().tick_period();
        let drain_timeout = scheduler.config().drain_timeout();

        info!(
            "Engine started (tick every {}s, {} workers)",
            period.as_secs(),
            scheduler.config().workers
        );

        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = timer.tick() => {
                        scheduler.tick().await;
                    }
                }
            }
        });

        Ok(EngineHandle {
            cancel,
            task,
            drain_timeout,
        })
    }
}

impl EngineHandle {
    /// Signal shutdown and wait for the running tick to drain.
    pub async fn stop(self) {
        self.cancel.cancel();
        let mut task = self.task;
        match tokio::time::timeout(self.drain_timeout, &mut task).await {
            Ok(_) => info!("Engine stopped"),
            Err(_) => {
                warn!(
                    "Engine did not drain within {}s, abandoning in-flight work",
                    self.drain_timeout.as_secs()
                );
                task.abort();
                let _ = task.await;
            }
        }
    }
}
