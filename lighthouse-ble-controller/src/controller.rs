//! Entry points used by the CLI and the watcher service

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::mpsc;
use tracing::debug;

use lighthouse_proto::{BaseStationAddress, PowerState, parse_all};

use crate::radio::Radio;
use crate::scanner::{AdvertisementScanner, Discovery};
use crate::session::{DeviceSession, Transition};
use crate::shutdown::{self, Shutdown, ShutdownHandle};
use crate::{ControlError, RetryPolicy};

/// Final result for one station of a batch
#[derive(Debug, Clone)]
pub struct StationOutcome {
    pub address: BaseStationAddress,
    pub result: Result<Transition, ControlError>,
}

/// Per-station results of a batch command, in request order
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub outcomes: Vec<StationOutcome>,
}

impl BatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    /// Stations that still failed after retries
    pub fn failed(&self) -> impl Iterator<Item = (&BaseStationAddress, &ControlError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (&o.address, e)))
    }
}

/// Power control and discovery over one radio
pub struct Controller<R: Radio> {
    radio: Arc<R>,
    policy: RetryPolicy,
    scanner: AdvertisementScanner<R>,
    shutdown: ShutdownHandle,
}

impl<R: Radio> Controller<R> {
    pub fn new(radio: R) -> Self {
        Self::with_policy(radio, RetryPolicy::default())
    }

    pub fn with_policy(radio: R, policy: RetryPolicy) -> Self {
        let radio = Arc::new(radio);
        let (shutdown, _) = shutdown::channel();
        Self {
            scanner: AdvertisementScanner::new(radio.clone()),
            radio,
            policy,
            shutdown,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Handle that cancels in-flight commands, e.g. from a Ctrl-C handler
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Set every station in `addresses` to `state`
    ///
    /// All addresses are validated first; a single malformed address rejects
    /// the whole batch before any radio traffic.
    pub async fn change_power_state<S: AsRef<str>>(
        &self,
        addresses: &[S],
        state: PowerState,
    ) -> Result<BatchReport, ControlError> {
        let addresses = parse_all(addresses)?;
        Ok(self.change_power_state_of(&addresses, state).await)
    }

    /// Like [`Controller::change_power_state`] for already parsed addresses.
    /// Stations are handled concurrently, each on its own connection.
    pub async fn change_power_state_of(
        &self,
        addresses: &[BaseStationAddress],
        state: PowerState,
    ) -> BatchReport {
        let mut unique: Vec<BaseStationAddress> = Vec::with_capacity(addresses.len());
        for address in addresses {
            if !unique.contains(address) {
                unique.push(*address);
            }
        }

        let commands = unique.into_iter().map(|address| async move {
            StationOutcome { address, result: self.change_one(address, state).await }
        });

        BatchReport { outcomes: join_all(commands).await }
    }

    /// Make one station blink
    pub async fn identify(&self, address: &str) -> Result<(), ControlError> {
        let address: BaseStationAddress = address.trim().parse()?;
        let shutdown = self.shutdown.subscribe();

        self.policy
            .execute(&address.to_string(), &shutdown, |attempt| {
                let shutdown = shutdown.clone();
                async move {
                    debug!(%address, attempt, "identify");
                    DeviceSession::new(&*self.radio, address, shutdown).identify().await
                }
            })
            .await
    }

    /// Start the discovery listener, see [`AdvertisementScanner::start`]
    pub async fn start_discovery(&self) -> Result<mpsc::Receiver<Discovery>, ControlError> {
        self.scanner.start().await
    }

    pub async fn stop_discovery(&self) -> Result<(), ControlError> {
        self.scanner.stop().await
    }

    /// Addresses discovered by the running scan
    pub fn discovered(&self) -> Vec<BaseStationAddress> {
        self.scanner.discovered()
    }

    /// Stop discovery and make in-flight commands give up
    pub async fn shutdown(&self) {
        self.shutdown.trigger();
        if let Err(error) = self.scanner.stop().await {
            debug!(%error, "stopping discovery during shutdown");
        }
    }

    async fn change_one(
        &self,
        address: BaseStationAddress,
        state: PowerState,
    ) -> Result<Transition, ControlError> {
        let shutdown: Shutdown = self.shutdown.subscribe();

        self.policy
            .execute(&address.to_string(), &shutdown, |attempt| {
                let shutdown = shutdown.clone();
                async move {
                    debug!(%address, %state, attempt, "changing power state");
                    DeviceSession::new(&*self.radio, address, shutdown)
                        .change_power_state(state)
                        .await
                }
            })
            .await
    }
}
