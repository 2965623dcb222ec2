//! Ways of switching the configured base stations

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use lighthouse_ble_controller::{ControlError, Controller, Radio, RetryPolicy};
use lighthouse_proto::{BaseStationAddress, PowerState};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{failed} of {total} base stations did not switch to {state}")]
    Stations {
        state: PowerState,
        failed: usize,
        total: usize,
    },
    #[error(transparent)]
    Control(#[from] ControlError),
    #[error("failed to launch {path}: {source}")]
    Launch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} exited with {status}")]
    Exit {
        path: PathBuf,
        status: std::process::ExitStatus,
    },
}

#[async_trait]
pub trait PowerCommander: Send + Sync + 'static {
    /// Switch every station in `addresses` to `state`. Dropping the future
    /// abandons the command.
    async fn set_power_state(
        &self,
        addresses: &[BaseStationAddress],
        state: PowerState,
    ) -> Result<(), CommandError>;
}

/// Drives a [`Controller`] owned by this process
pub struct InProcessCommander<R: Radio> {
    controller: Arc<Controller<R>>,
}

impl<R: Radio> InProcessCommander<R> {
    pub fn new(controller: Arc<Controller<R>>) -> Self {
        Self { controller }
    }
}

#[async_trait]
impl<R: Radio> PowerCommander for InProcessCommander<R> {
    async fn set_power_state(
        &self,
        addresses: &[BaseStationAddress],
        state: PowerState,
    ) -> Result<(), CommandError> {
        let report = self.controller.change_power_state_of(addresses, state).await;
        let failed = report.failed().count();
        if failed > 0 {
            return Err(CommandError::Stations {
                state,
                failed,
                total: report.outcomes.len(),
            });
        }
        Ok(())
    }
}

/// Runs the `lighthouse-ble` executable for every command
pub struct ExternalCommander {
    manager_path: PathBuf,
    policy: RetryPolicy,
}

impl ExternalCommander {
    pub fn new(manager_path: PathBuf, policy: RetryPolicy) -> Self {
        Self { manager_path, policy }
    }

    fn args(&self, addresses: &[BaseStationAddress], state: PowerState) -> Vec<String> {
        let mode = match state {
            PowerState::Wake => "--wake",
            PowerState::Sleep => "--sleep",
            PowerState::Standby => "--standby",
        };
        let addresses: Vec<String> = addresses.iter().map(ToString::to_string).collect();

        vec![
            mode.to_string(),
            "-a".to_string(),
            addresses.join(","),
            "--retries".to_string(),
            self.policy.max_attempts.to_string(),
            "--retry-delay-ms".to_string(),
            self.policy.delay.as_millis().to_string(),
        ]
    }
}

#[async_trait]
impl PowerCommander for ExternalCommander {
    async fn set_power_state(
        &self,
        addresses: &[BaseStationAddress],
        state: PowerState,
    ) -> Result<(), CommandError> {
        let args = self.args(addresses, state);
        debug!(manager = %self.manager_path.display(), ?args, "launching");

        // The child dies with the future when a pending command is aborted
        let status = tokio::process::Command::new(&self.manager_path)
            .args(&args)
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|source| CommandError::Launch {
                path: self.manager_path.clone(),
                source,
            })?;

        if !status.success() {
            return Err(CommandError::Exit {
                path: self.manager_path.clone(),
                status,
            });
        }
        Ok(())
    }
}
