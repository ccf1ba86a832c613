//! Liveness reporting of command controllers to their supervisor.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use astra_core::HealthReporter;
use astra_model::{ComponentId, TimeoutMs};

/// Beat period for a supervisor that declares a component lost after `heartbeat_ms` of silence.
pub(crate) fn beat_period(heartbeat_ms: TimeoutMs) -> Duration {
    Duration::from_millis((heartbeat_ms / 3).max(1))
}

/// Beat on `health` every `period` until `stop` fires.
///
/// With `worker` set, a worker that exits while `stop` is still clear is reported as a
/// failure instead of beating on.
pub(crate) fn spawn_heartbeat(
    id: ComponentId,
    health: HealthReporter,
    period: Duration,
    stop: CancellationToken,
    worker: Option<Arc<AtomicBool>>,
) {
    tokio::spawn(async move {
        let mut ticks = interval(period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = ticks.tick() => {}
            }
            if worker.as_ref().is_some_and(|alive| !alive.load(Ordering::SeqCst)) {
                if !stop.is_cancelled() {
                    warn!(component = %id, "command worker exited");
                    health.fail("command worker exited");
                }
                break;
            }
            if !health.is_attached() {
                break;
            }
            health.heartbeat();
        }
        debug!(component = %id, "heartbeat stopped");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beats_three_times_per_window() {
        assert_eq!(beat_period(900), Duration::from_millis(300));
        assert_eq!(beat_period(1), Duration::from_millis(1));
    }
}
