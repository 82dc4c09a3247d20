//! Per-worker graceful stop with escalation to a forced kill.

use std::sync::Arc;
use std::time::Duration;

use crate::errors::SupervisorError;
use crate::reporter::SupervisorReporter;
use crate::worker::Worker;

/// Interval between liveness checks while a worker uses its grace period.
pub const GRACE_POLL_INTERVAL: Duration = Duration::from_secs(1);

const REAP_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Asks `worker` to stop and waits up to `grace` for it to comply, killing it
/// once the budget is spent.
///
/// Only suspends at its sleeps, so many of these can share one thread.
pub(crate) async fn stop_gracefully(
    worker: Arc<Worker>,
    grace: Duration,
    reporter: Arc<dyn SupervisorReporter>,
) -> Result<(), SupervisorError> {
    if !worker.is_alive() {
        return Ok(());
    }

    reporter.terminating(worker.name(), worker.pid(), grace);
    worker.terminate()?;

    let mut remaining = grace;
    loop {
        if let Some(state) = worker.reaped() {
            reporter.exited(worker.name(), worker.pid(), state);
            return Ok(());
        }
        if remaining.is_zero() {
            break;
        }
        let step = remaining.min(GRACE_POLL_INTERVAL);
        tokio::time::sleep(step).await;
        remaining = remaining.saturating_sub(step);
    }

    reporter.grace_expired(worker.name(), worker.pid());
    kill_and_reap(&worker, reporter.as_ref()).await
}

async fn kill_and_reap(
    worker: &Worker,
    reporter: &dyn SupervisorReporter,
) -> Result<(), SupervisorError> {
    worker.kill()?;
    reporter.killed(worker.name(), worker.pid());
    loop {
        if let Some(state) = worker.reaped() {
            reporter.exited(worker.name(), worker.pid(), state);
            return Ok(());
        }
        tokio::time::sleep(REAP_POLL_INTERVAL).await;
    }
}
