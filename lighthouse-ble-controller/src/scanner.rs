//! Discovery of nearby base stations from their advertisements

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use lighthouse_proto::{BaseStationAddress, is_base_station_name};

use crate::ControlError;
use crate::radio::Radio;

/// A base station seen for the first time during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub address: BaseStationAddress,
    pub name: String,
}

/// Addresses seen during a scan, in discovery order, without duplicates
#[derive(Debug, Clone, Default)]
pub struct DiscoveredAddressSet {
    addresses: Vec<BaseStationAddress>,
}

impl DiscoveredAddressSet {
    /// Append `address` unless already present. Returns whether it was new.
    pub fn insert(&mut self, address: BaseStationAddress) -> bool {
        if self.addresses.contains(&address) {
            return false;
        }
        self.addresses.push(address);
        true
    }

    pub fn contains(&self, address: &BaseStationAddress) -> bool {
        self.addresses.contains(address)
    }

    pub fn as_slice(&self) -> &[BaseStationAddress] {
        &self.addresses
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn clear(&mut self) {
        self.addresses.clear();
    }
}

/// Long-lived advertisement listener
///
/// A single listener task drains the radio's advertisement channel, so
/// appends to the discovered set happen in arrival order. Starting again
/// while running replaces the previous listener.
pub struct AdvertisementScanner<R: Radio> {
    radio: Arc<R>,
    discovered: Arc<Mutex<DiscoveredAddressSet>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl<R: Radio> AdvertisementScanner<R> {
    pub fn new(radio: Arc<R>) -> Self {
        Self {
            radio,
            discovered: Arc::default(),
            listener: Mutex::new(None),
        }
    }

    /// Start listening. Each newly discovered station is sent on the
    /// returned channel, which closes when the scan stops.
    pub async fn start(&self) -> Result<mpsc::Receiver<Discovery>, ControlError> {
        let mut advertisements = self.radio.advertisements().await?;
        let (tx, rx) = mpsc::channel(32);
        let discovered = self.discovered.clone();

        let listener = tokio::spawn(async move {
            while let Some(advertisement) = advertisements.recv().await {
                let Some(name) = advertisement.local_name.filter(|n| is_base_station_name(n))
                else {
                    continue;
                };
                let fresh = discovered.lock().insert(advertisement.address);
                if !fresh {
                    continue;
                }

                info!(address = %advertisement.address, %name, "potential base station found");
                let discovery = Discovery { address: advertisement.address, name };
                if tx.send(discovery).await.is_err() {
                    debug!("discovery receiver dropped, stopping listener");
                    break;
                }
            }
        });

        if let Some(previous) = self.listener.lock().replace(listener) {
            debug!("replacing running advertisement listener");
            previous.abort();
        }
        Ok(rx)
    }

    /// Stop listening and forget every discovered address
    pub async fn stop(&self) -> Result<(), ControlError> {
        let listener = self.listener.lock().take();
        if let Some(listener) = listener {
            listener.abort();
        }
        self.discovered.lock().clear();
        self.radio.stop_advertisements().await
    }

    pub fn is_running(&self) -> bool {
        self.listener.lock().as_ref().is_some_and(|l| !l.is_finished())
    }

    /// Snapshot of the addresses discovered so far
    pub fn discovered(&self) -> Vec<BaseStationAddress> {
        self.discovered.lock().as_slice().to_vec()
    }
}
