//! In-memory radio used by unit tests

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use lighthouse_proto::{BaseStationAddress, IDENTIFY, POWER, ble};

use crate::radio::{Advertisement, GattService, Link, Radio};
use crate::ControlError;

/// Simulated base station
#[derive(Debug, Clone)]
pub(crate) struct Station {
    /// Current raw value of the power characteristic
    pub power: u8,
    pub services: Vec<GattService>,
    /// Every write received, in order
    pub writes: Vec<(Uuid, Vec<u8>)>,
    pub reads: u32,
    /// Number of upcoming connects that fail
    pub connect_failures: u32,
    /// Number of upcoming writes that are not acknowledged
    pub write_failures: u32,
    pub read_delay: Option<Duration>,
    pub connects: u32,
    pub disconnects: u32,
}

impl Station {
    pub fn new(power: u8) -> Self {
        Self {
            power,
            services: vec![GattService {
                uuid: POWER.service,
                characteristics: vec![POWER.uuid, IDENTIFY.uuid],
            }],
            writes: Vec::new(),
            reads: 0,
            connect_failures: 0,
            write_failures: 0,
            read_delay: None,
            connects: 0,
            disconnects: 0,
        }
    }

    pub fn power_writes(&self) -> Vec<u8> {
        self.writes
            .iter()
            .filter(|(uuid, _)| *uuid == POWER.uuid)
            .flat_map(|(_, value)| value.clone())
            .collect()
    }

    /// Value the real hardware reports after accepting `written`
    fn apply(&mut self, written: u8) {
        self.power = match written {
            ble::write::WAKE if self.power == ble::read::STANDBY => ble::read::AWAKE_FROM_STANDBY,
            ble::write::WAKE => ble::read::AWAKE_FROM_SLEEP,
            ble::write::STANDBY => ble::read::STANDBY,
            _ => ble::read::SLEEPING,
        };
    }
}

type Stations = Arc<Mutex<HashMap<BaseStationAddress, Station>>>;

#[derive(Default)]
pub(crate) struct FakeRadio {
    stations: Stations,
    adverts: Mutex<Option<mpsc::Sender<Advertisement>>>,
    pub advert_stops: Mutex<u32>,
}

pub(crate) fn address(s: &str) -> BaseStationAddress {
    s.parse().unwrap()
}

impl FakeRadio {
    pub fn with_station(self, address: BaseStationAddress, station: Station) -> Self {
        self.stations.lock().insert(address, station);
        self
    }

    pub fn station(&self, address: BaseStationAddress) -> Station {
        self.stations.lock()[&address].clone()
    }

    /// Deliver an advertisement to the current listener
    pub async fn advertise(&self, address: BaseStationAddress, name: &str) {
        let sender = self.adverts.lock().clone().expect("no advertisement listener");
        sender
            .send(Advertisement { address, local_name: Some(name.to_string()) })
            .await
            .unwrap();
    }

    /// End the advertisement stream, as if the adapter went away
    pub fn close_advertisements(&self) {
        self.adverts.lock().take();
    }
}

#[async_trait]
impl Radio for FakeRadio {
    type Link = FakeLink;

    async fn connect(&self, address: BaseStationAddress) -> Result<FakeLink, ControlError> {
        let mut stations = self.stations.lock();
        let station = stations
            .get_mut(&address)
            .ok_or_else(|| ControlError::ConnectionFailed(format!("{address} not found")))?;
        if station.connect_failures > 0 {
            station.connect_failures -= 1;
            return Err(ControlError::ConnectionFailed(format!("{address} did not respond")));
        }
        station.connects += 1;
        Ok(FakeLink { address, stations: self.stations.clone() })
    }

    async fn advertisements(&self) -> Result<mpsc::Receiver<Advertisement>, ControlError> {
        let (tx, rx) = mpsc::channel(16);
        *self.adverts.lock() = Some(tx);
        Ok(rx)
    }

    async fn stop_advertisements(&self) -> Result<(), ControlError> {
        self.adverts.lock().take();
        *self.advert_stops.lock() += 1;
        Ok(())
    }
}

pub(crate) struct FakeLink {
    address: BaseStationAddress,
    stations: Stations,
}

impl FakeLink {
    fn with<T>(&self, f: impl FnOnce(&mut Station) -> T) -> T {
        let mut stations = self.stations.lock();
        f(stations.get_mut(&self.address).expect("station removed"))
    }
}

#[async_trait]
impl Link for FakeLink {
    async fn services(&mut self) -> Result<Vec<GattService>, ControlError> {
        Ok(self.with(|s| s.services.clone()))
    }

    async fn read(&mut self, _service: Uuid, characteristic: Uuid) -> Result<Vec<u8>, ControlError> {
        assert_eq!(characteristic, POWER.uuid, "only the power characteristic is readable");
        if let Some(delay) = self.with(|s| s.read_delay) {
            tokio::time::sleep(delay).await;
        }
        Ok(self.with(|s| {
            s.reads += 1;
            vec![s.power]
        }))
    }

    async fn write(
        &mut self,
        _service: Uuid,
        characteristic: Uuid,
        value: &[u8],
    ) -> Result<(), ControlError> {
        self.with(|s| {
            if s.write_failures > 0 {
                s.write_failures -= 1;
                return Err(ControlError::CommunicationFailed("unreachable".into()));
            }
            s.writes.push((characteristic, value.to_vec()));
            if characteristic == POWER.uuid {
                s.apply(value[0]);
            }
            Ok(())
        })
    }

    async fn disconnect(&mut self) -> Result<(), ControlError> {
        self.with(|s| s.disconnects += 1);
        Ok(())
    }
}
