//! Seam between the power-control logic and the platform BLE stack
//!
//! [`BtleplugRadio`](crate::BtleplugRadio) is the real implementation; tests
//! use an in-memory fake.

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use lighthouse_proto::BaseStationAddress;

use crate::ControlError;

/// A GATT service as reported by service discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    pub uuid: Uuid,
    pub characteristics: Vec<Uuid>,
}

/// One received advertisement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub address: BaseStationAddress,
    pub local_name: Option<String>,
}

/// Entry point to the local BLE adapter
#[async_trait]
pub trait Radio: Send + Sync + 'static {
    type Link: Link;

    /// Open a connection to the station at `address`
    async fn connect(&self, address: BaseStationAddress) -> Result<Self::Link, ControlError>;

    /// Start listening for advertisements. Events are delivered in arrival
    /// order until the receiver is dropped or [`Radio::stop_advertisements`]
    /// is called.
    async fn advertisements(&self) -> Result<mpsc::Receiver<Advertisement>, ControlError>;

    async fn stop_advertisements(&self) -> Result<(), ControlError>;
}

/// An open connection to one station
#[async_trait]
pub trait Link: Send + 'static {
    /// Discover and list the primary services of the device
    async fn services(&mut self) -> Result<Vec<GattService>, ControlError>;

    async fn read(&mut self, service: Uuid, characteristic: Uuid) -> Result<Vec<u8>, ControlError>;

    /// Write with response; an error means the device did not acknowledge
    async fn write(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
        value: &[u8],
    ) -> Result<(), ControlError>;

    async fn disconnect(&mut self) -> Result<(), ControlError>;
}
