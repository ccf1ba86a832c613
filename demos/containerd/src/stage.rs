use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use astra_command::{Completion, CurrentState, DemandMatcher, DriverError, HardwareDriver};
use astra_model::{Command, ConfigData, ConfigKey, Units};

const STEP_MM: f64 = 5.0;
const STEP_PERIOD: Duration = Duration::from_millis(100);

/// Simulated trombone stage moving in fixed steps.
///
/// `*.move {target}` drives the stage and reports done on arrival. `*.datum` starts the
/// move to zero in the background and leaves completion to the published position.
pub struct TromboneStage {
    state_key: ConfigKey,
}

impl TromboneStage {
    pub fn new(state_key: ConfigKey) -> Self {
        Self { state_key }
    }

    fn position(state: &CurrentState) -> f64 {
        state
            .snapshot()
            .value("position")
            .and_then(|v| v.as_f64())
            .unwrap_or_default()
    }
}

async fn drive(state: CurrentState, target: f64, cancel: CancellationToken) -> Result<(), DriverError> {
    loop {
        let position = TromboneStage::position(&state);
        if (position - target).abs() < f64::EPSILON {
            return Ok(());
        }
        tokio::select! {
            _ = cancel.cancelled() => return Err(DriverError::new("motion stopped")),
            _ = tokio::time::sleep(STEP_PERIOD) => {}
        }
        let next = if target > position {
            (position + STEP_MM).min(target)
        } else {
            (position - STEP_MM).max(target)
        };
        debug!(position = next, target, "stage step");
        state
            .update(|s| s.clone().with("position", next, Units::Millimeter))
            .await
            .map_err(|e| DriverError::new(e.to_string()))?;
    }
}

#[async_trait]
impl HardwareDriver for TromboneStage {
    fn initial_state(&self) -> ConfigData {
        ConfigData::new(self.state_key.clone()).with("position", 0.0, Units::Millimeter)
    }

    async fn execute(
        &self,
        command: &Command,
        state: &CurrentState,
        cancel: CancellationToken,
    ) -> Result<Completion, DriverError> {
        let action = command
            .prefix()
            .as_str()
            .rsplit('.')
            .next()
            .unwrap_or_default();
        match action {
            "move" => {
                let target = command
                    .config
                    .value("target")
                    .and_then(|v| v.as_f64())
                    .ok_or_else(|| DriverError::new("move needs a numeric target"))?;
                drive(state.clone(), target, cancel).await?;
                Ok(Completion::Done)
            }
            "datum" => {
                tokio::spawn(drive(state.clone(), 0.0, cancel));
                Ok(Completion::Await {
                    demands: vec![DemandMatcher::with_units(
                        ConfigData::new(self.state_key.clone()).with(
                            "position",
                            0.0,
                            Units::Millimeter,
                        ),
                    )],
                    timeout: Some(Duration::from_secs(30)),
                })
            }
            other => Err(DriverError::new(format!("unsupported action '{other}'"))),
        }
    }
}
