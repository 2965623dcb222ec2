//! One connection to one base station for the duration of one command

use tracing::{debug, info};

use lighthouse_proto::{
    BaseStationAddress, Characteristic, IDENTIFY, IDENTIFY_VALUE, POWER, PowerState, ReadValue,
    decode_read, encode_write,
};

use crate::radio::{Link, Radio};
use crate::{ControlError, Shutdown};

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Disconnected,
    Connecting,
    Connected,
    Discovering,
    Ready,
    Reading,
    Deciding,
    Writing,
    Disposed,
}

/// Successful outcome of a power state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The station already reported the desired state, nothing was written
    AlreadyInState(PowerState),
    /// The desired state was written and acknowledged
    Changed { from: ReadValue, to: PowerState },
}

/// Exclusively owned connection to a single station
///
/// Every command opens a fresh connection and releases it before returning,
/// whichever way the command ends.
pub struct DeviceSession<'r, R: Radio> {
    radio: &'r R,
    address: BaseStationAddress,
    shutdown: Shutdown,
    phase: Phase,
}

impl<'r, R: Radio> DeviceSession<'r, R> {
    pub fn new(radio: &'r R, address: BaseStationAddress, shutdown: Shutdown) -> Self {
        Self {
            radio,
            address,
            shutdown,
            phase: Phase::Disconnected,
        }
    }

    pub fn address(&self) -> BaseStationAddress {
        self.address
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Read the power state and write `desired` only if it differs
    pub async fn change_power_state(
        &mut self,
        desired: PowerState,
    ) -> Result<Transition, ControlError> {
        let mut link = self.open().await?;

        let mut shutdown = self.shutdown.clone();
        let outcome = tokio::select! {
            outcome = self.transition(&mut link, desired) => outcome,
            _ = shutdown.triggered() => Err(ControlError::Cancelled),
        };

        self.dispose(link).await;
        outcome
    }

    /// Make the station blink. No read, identify has no persistent state.
    pub async fn identify(&mut self) -> Result<(), ControlError> {
        let mut link = self.open().await?;

        let mut shutdown = self.shutdown.clone();
        let outcome = tokio::select! {
            outcome = self.blink(&mut link) => outcome,
            _ = shutdown.triggered() => Err(ControlError::Cancelled),
        };

        self.dispose(link).await;
        outcome
    }

    fn enter(&mut self, phase: Phase) {
        debug!(address = %self.address, from = ?self.phase, to = ?phase, "session phase");
        self.phase = phase;
    }

    async fn open(&mut self) -> Result<R::Link, ControlError> {
        self.enter(Phase::Connecting);

        let mut shutdown = self.shutdown.clone();
        let connected = tokio::select! {
            link = self.radio.connect(self.address) => link,
            _ = shutdown.triggered() => Err(ControlError::Cancelled),
        };

        match connected {
            Ok(link) => {
                self.enter(Phase::Connected);
                Ok(link)
            }
            Err(error) => {
                self.enter(Phase::Disposed);
                Err(error)
            }
        }
    }

    async fn dispose(&mut self, mut link: R::Link) {
        if let Err(error) = link.disconnect().await {
            debug!(address = %self.address, %error, "disconnect failed");
        }
        self.enter(Phase::Disposed);
    }

    async fn transition(
        &mut self,
        link: &mut R::Link,
        desired: PowerState,
    ) -> Result<Transition, ControlError> {
        self.resolve(link, &POWER).await?;

        self.enter(Phase::Reading);
        let value = link.read(POWER.service, POWER.uuid).await?;
        let byte = *value.first().ok_or_else(|| {
            ControlError::CommunicationFailed("power characteristic returned no data".into())
        })?;
        let current = decode_read(byte);

        self.enter(Phase::Deciding);
        if current.is(desired) {
            info!(address = %self.address, state = %desired, "already in state");
            return Ok(Transition::AlreadyInState(desired));
        }

        self.enter(Phase::Writing);
        link.write(POWER.service, POWER.uuid, &[encode_write(desired)]).await?;
        info!(address = %self.address, from = %current, to = %desired, "power state changed");

        Ok(Transition::Changed { from: current, to: desired })
    }

    async fn blink(&mut self, link: &mut R::Link) -> Result<(), ControlError> {
        self.resolve(link, &IDENTIFY).await?;

        self.enter(Phase::Writing);
        link.write(IDENTIFY.service, IDENTIFY.uuid, &[IDENTIFY_VALUE]).await?;
        info!(address = %self.address, "identify sent");
        Ok(())
    }

    /// Exactly one matching service holding exactly one matching
    /// characteristic, anything else is an unexpected device profile.
    async fn resolve(
        &mut self,
        link: &mut R::Link,
        characteristic: &Characteristic,
    ) -> Result<(), ControlError> {
        self.enter(Phase::Discovering);
        let services = link.services().await?;

        let mut matching = services.iter().filter(|s| s.uuid == characteristic.service);
        let service = match (matching.next(), matching.next()) {
            (Some(service), None) => service,
            (None, _) => {
                return Err(ControlError::CommunicationFailed(format!(
                    "service {} not found",
                    characteristic.service
                )));
            }
            (Some(_), Some(_)) => {
                return Err(ControlError::CommunicationFailed(format!(
                    "service {} advertised more than once",
                    characteristic.service
                )));
            }
        };

        let found = service
            .characteristics
            .iter()
            .filter(|&&uuid| uuid == characteristic.uuid)
            .count();
        if found != 1 {
            return Err(ControlError::CommunicationFailed(format!(
                "expected one {} characteristic {}, found {found}",
                characteristic.name, characteristic.uuid
            )));
        }

        self.enter(Phase::Ready);
        Ok(())
    }
}
