//! [`Radio`] backed by the platform BLE stack through `btleplug`

use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    BDAddr, Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::debug;
use uuid::Uuid;

use lighthouse_proto::BaseStationAddress;

use crate::ControlError;
use crate::radio::{Advertisement, GattService, Link, Radio};

const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(250);

impl From<btleplug::Error> for ControlError {
    fn from(error: btleplug::Error) -> Self {
        match error {
            btleplug::Error::DeviceNotFound => ControlError::ConnectionFailed(error.to_string()),
            btleplug::Error::TimedOut(_) => ControlError::ConnectionFailed(error.to_string()),
            btleplug::Error::NotConnected => ControlError::InvalidState(error.to_string()),
            btleplug::Error::PermissionDenied => ControlError::RadioUnavailable(error.to_string()),
            other => ControlError::CommunicationFailed(other.to_string()),
        }
    }
}

/// The first Bluetooth adapter of this machine
pub struct BtleplugRadio {
    adapter: Adapter,
    connect_timeout: Duration,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl BtleplugRadio {
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Open the default adapter. `connect_timeout` bounds how long
    /// [`Radio::connect`] scans for an address before giving up.
    pub async fn new(connect_timeout: Duration) -> Result<Self, ControlError> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;
        let adapter = adapters
            .into_iter()
            .next()
            .ok_or_else(|| ControlError::RadioUnavailable("no Bluetooth adapter found".into()))?;

        Ok(Self {
            adapter,
            connect_timeout,
            pump: Mutex::new(None),
        })
    }

    async fn known_peripheral(&self, target: BDAddr) -> Result<Option<Peripheral>, ControlError> {
        let peripherals = self.adapter.peripherals().await?;
        Ok(peripherals.into_iter().find(|p| p.address() == target))
    }

    /// Scan until a peripheral with `address` shows up
    async fn find(&self, address: BaseStationAddress) -> Result<Peripheral, ControlError> {
        let target = BDAddr::from(address.to_bytes());
        if let Some(peripheral) = self.known_peripheral(target).await? {
            return Ok(peripheral);
        }

        // The scan keeps running for concurrent lookups, it is stopped with
        // the discovery listener or when the adapter goes away.
        self.adapter.start_scan(ScanFilter::default()).await?;
        let deadline = Instant::now() + self.connect_timeout;

        loop {
            if let Some(peripheral) = self.known_peripheral(target).await? {
                return Ok(peripheral);
            }
            if Instant::now() >= deadline {
                return Err(ControlError::ConnectionFailed(format!(
                    "{address} not seen within {:?}",
                    self.connect_timeout
                )));
            }
            sleep(SCAN_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl Radio for BtleplugRadio {
    type Link = BtleplugLink;

    async fn connect(&self, address: BaseStationAddress) -> Result<BtleplugLink, ControlError> {
        let peripheral = self.find(address).await?;

        if !peripheral.is_connected().await? {
            debug!(%address, "connecting");
            peripheral.connect().await?;
        }

        Ok(BtleplugLink {
            peripheral,
            address,
            connected: true,
        })
    }

    async fn advertisements(&self) -> Result<mpsc::Receiver<Advertisement>, ControlError> {
        let mut events = self.adapter.events().await?;
        self.adapter.start_scan(ScanFilter::default()).await?;

        let (tx, rx) = mpsc::channel(64);
        let adapter = self.adapter.clone();
        let pump = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let id = match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                    _ => continue,
                };
                let Ok(peripheral) = adapter.peripheral(&id).await else {
                    continue;
                };
                let local_name = match peripheral.properties().await {
                    Ok(Some(properties)) => properties.local_name,
                    _ => None,
                };

                let advertisement = Advertisement {
                    address: BaseStationAddress::from(peripheral.address().into_inner()),
                    local_name,
                };
                if tx.send(advertisement).await.is_err() {
                    break;
                }
            }
        });

        if let Some(previous) = self.pump.lock().replace(pump) {
            previous.abort();
        }
        Ok(rx)
    }

    async fn stop_advertisements(&self) -> Result<(), ControlError> {
        let pump = self.pump.lock().take();
        if let Some(pump) = pump {
            pump.abort();
        }
        self.adapter.stop_scan().await?;
        Ok(())
    }
}

/// Connection to one peripheral
///
/// Dropping a link that was not disconnected (e.g. its task was aborted)
/// schedules the disconnect on the current runtime.
pub struct BtleplugLink {
    peripheral: Peripheral,
    address: BaseStationAddress,
    connected: bool,
}

impl BtleplugLink {
    fn characteristic(&self, service: Uuid, uuid: Uuid) -> Result<Characteristic, ControlError> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.service_uuid == service && c.uuid == uuid)
            .ok_or_else(|| {
                ControlError::CommunicationFailed(format!("characteristic {uuid} not discovered"))
            })
    }
}

#[async_trait]
impl Link for BtleplugLink {
    async fn services(&mut self) -> Result<Vec<GattService>, ControlError> {
        self.peripheral.discover_services().await?;

        Ok(self
            .peripheral
            .services()
            .into_iter()
            .map(|service| GattService {
                uuid: service.uuid,
                characteristics: service.characteristics.iter().map(|c| c.uuid).collect(),
            })
            .collect())
    }

    async fn read(&mut self, service: Uuid, characteristic: Uuid) -> Result<Vec<u8>, ControlError> {
        let characteristic = self.characteristic(service, characteristic)?;
        Ok(self.peripheral.read(&characteristic).await?)
    }

    async fn write(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
        value: &[u8],
    ) -> Result<(), ControlError> {
        let characteristic = self.characteristic(service, characteristic)?;
        self.peripheral
            .write(&characteristic, value, WriteType::WithResponse)
            .await?;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ControlError> {
        self.connected = false;
        self.peripheral.disconnect().await?;
        debug!(address = %self.address, "disconnected");
        Ok(())
    }
}

impl Drop for BtleplugLink {
    fn drop(&mut self) {
        if !self.connected {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let peripheral = self.peripheral.clone();
        let address = self.address;
        runtime.spawn(async move {
            if let Err(error) = peripheral.disconnect().await {
                debug!(%address, %error, "disconnect after abort failed");
            }
        });
    }
}
