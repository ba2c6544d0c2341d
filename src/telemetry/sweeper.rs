//! Periodic request log sweep.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{RequestLogger, SweepReport};

/// Default sweep interval (5 minutes).
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Run one `process` call on the blocking pool.
///
/// A panic inside the sweep is logged and reported as `None`.
pub async fn sweep_once(logger: &Arc<dyn RequestLogger>) -> Option<SweepReport> {
    let logger = Arc::clone(logger);
    match tokio::task::spawn_blocking(move || logger.process()).await {
        Ok(report) => Some(report),
        Err(e) => {
            log::error!("Request log sweep failed: {}", e);
            None
        }
    }
}

/// RetentionSweeper periodically flushes and prunes a [`RequestLogger`].
///
/// Each tick awaits the previous sweep, so sweeps never overlap. Cancelling
/// stops future ticks; records still queued stay queued.
pub struct RetentionSweeper {
    logger: Arc<dyn RequestLogger>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl RetentionSweeper {
    /// Start sweeping every `period` on the current tokio runtime.
    ///
    /// The first sweep runs one full period after start.
    pub fn spawn(logger: Arc<dyn RequestLogger>, period: Duration) -> Self {
        let shutdown = CancellationToken::new();
        let task_logger = Arc::clone(&logger);
        let task_shutdown = shutdown.clone();

        let task = tokio::spawn(async move {
            let mut ticker = interval(period.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = task_shutdown.cancelled() => {
                        log::debug!("Request log sweeper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Some(report) = sweep_once(&task_logger).await {
                            if report.drained > 0 || report.pruned > 0 {
                                log::info!(
                                    "Swept request logs: {} persisted, {} failed, {} expired",
                                    report.inserted,
                                    report.failed,
                                    report.pruned
                                );
                            }
                        }
                    }
                }
            }
        });

        log::info!("Request log sweeper started (every {:?})", period);
        Self {
            logger,
            shutdown,
            task: Some(task),
        }
    }

    /// Token that stops the sweeper when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop future ticks without draining.
    pub fn cancel(&self) {
        self.shutdown.cancel();
    }

    /// Whether the background task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map(|t| t.is_finished()).unwrap_or(true)
    }

    /// Stop the sweeper, wait for an in-flight sweep, then drain once more.
    pub async fn shutdown(mut self) -> Option<SweepReport> {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::error!("Request log sweeper task failed: {}", e);
            }
        }
        let report = sweep_once(&self.logger).await;
        log::info!("Request log sweeper stopped");
        report
    }
}

impl Drop for RetentionSweeper {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
