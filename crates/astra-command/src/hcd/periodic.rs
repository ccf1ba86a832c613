use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use astra_model::{Command, CommandStatus, ComponentId, ObsId, RunId};

use crate::{CommandController, CommandError, HcdController, StatusStream};

/// An HCD that also publishes its current state on a fixed period.
///
/// Publication only reads the current-state snapshot; it never touches command execution.
pub struct PeriodicHcdController {
    inner: Arc<HcdController>,
    period: Duration,
    ticker: CancellationToken,
}

impl PeriodicHcdController {
    /// Start publishing; the first publication happens immediately.
    pub fn start(inner: HcdController, period: Duration) -> Self {
        let period = period.max(Duration::from_millis(1));
        let inner = Arc::new(inner);
        let ticker = CancellationToken::new();

        let state = inner.current_state().clone();
        let id = inner.id().clone();
        let stop = ticker.clone();
        tokio::spawn(async move {
            let mut ticks = interval(period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticks.tick() => {
                        if let Err(e) = state.publish().await {
                            warn!(component = %id, reason = %e, "periodic publication failed");
                        }
                    }
                }
            }
            debug!(component = %id, "periodic publication stopped");
        });

        Self {
            inner,
            period,
            ticker,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn controller(&self) -> &HcdController {
        &self.inner
    }

    /// Stop publication and the command worker.
    pub fn stop(&self) {
        self.ticker.cancel();
        self.inner.stop();
    }
}

impl Drop for PeriodicHcdController {
    fn drop(&mut self) {
        self.ticker.cancel();
    }
}

#[async_trait]
impl CommandController for PeriodicHcdController {
    fn id(&self) -> &ComponentId {
        self.inner.id()
    }

    async fn submit(&self, command: Command, obs_id: Option<ObsId>) -> Result<RunId, CommandError> {
        self.inner.submit(command, obs_id).await
    }

    fn status_of(&self, run_id: &RunId) -> Result<StatusStream, CommandError> {
        self.inner.status_of(run_id)
    }

    fn current(&self, run_id: &RunId) -> Option<CommandStatus> {
        self.inner.current(run_id)
    }

    async fn cancel(&self, run_id: &RunId) -> Result<bool, CommandError> {
        self.inner.cancel(run_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astra_core::{InMemoryStateStore, StateStore};
    use astra_model::{ConfigData, ConfigKey, Units};
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    use crate::{CommandContext, CommandSet, Completion, CurrentState, DriverError, HardwareDriver};

    struct Idle;

    #[async_trait]
    impl HardwareDriver for Idle {
        fn initial_state(&self) -> ConfigData {
            ConfigData::new(ConfigKey::new("tcs.enclosure").unwrap()).with("open", false, Units::NoUnits)
        }

        async fn execute(
            &self,
            _: &Command,
            _: &CurrentState,
            _: CancellationToken,
        ) -> Result<Completion, DriverError> {
            Ok(Completion::Done)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_every_period() {
        let store = Arc::new(InMemoryStateStore::new());
        let ctx = CommandContext::new(store.clone());
        let mut updates = store
            .subscribe(&[ConfigKey::new("tcs.enclosure").unwrap()])
            .await
            .unwrap();

        let t0 = Instant::now();
        let hcd = HcdController::start(
            ComponentId::new("tcs", "enclosure"),
            Arc::new(Idle),
            CommandSet::permissive(),
            &ctx,
        );
        let periodic = PeriodicHcdController::start(hcd, Duration::from_millis(100));

        let horizon = t0 + Duration::from_millis(1_050);
        let mut seen = 0;
        while let Ok(Some(update)) = tokio::time::timeout_at(horizon, updates.recv()).await {
            let update = update.unwrap();
            assert_eq!(update.data.value("open").and_then(|v| v.as_bool()), Some(false));
            seen += 1;
        }
        // floor(1050 / 100) = 10, plus the immediate first tick
        assert!(seen >= 10, "only {seen} publications");

        periodic.stop();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let after_stop = Instant::now();
        let silent = tokio::time::timeout_at(after_stop + Duration::from_millis(500), updates.recv()).await;
        assert!(silent.is_err());
    }
}
