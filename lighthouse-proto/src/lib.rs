//! Lighthouse protocol - base station addresses and characteristic encoding
//!
//! Pure data, no radio access: everything here can be tested without
//! hardware. The controller crate decides when to read and write, this crate
//! decides what the bytes mean.

pub mod address;
pub mod ble;

use std::fmt;

use uuid::Uuid;

pub use address::{AddressError, BaseStationAddress, parse_all};

/// Power state of a base station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    /// Motor and lasers off, only the radio listens
    Sleep,
    /// Motor spinning, lasers off
    Standby,
    /// Fully on
    Wake,
}

impl PowerState {
    /// Byte written to the power characteristic to request this state
    pub fn write_value(self) -> u8 {
        match self {
            PowerState::Sleep => ble::write::SLEEP,
            PowerState::Standby => ble::write::STANDBY,
            PowerState::Wake => ble::write::WAKE,
        }
    }

    /// Bytes read back from a station that is already in this state
    pub fn read_values(self) -> &'static [u8] {
        match self {
            PowerState::Sleep => &[ble::read::SLEEPING],
            PowerState::Standby => &[ble::read::STANDBY],
            PowerState::Wake => &[ble::read::AWAKE_FROM_SLEEP, ble::read::AWAKE_FROM_STANDBY],
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PowerState::Sleep => "sleep",
            PowerState::Standby => "standby",
            PowerState::Wake => "wake",
        };
        f.write_str(name)
    }
}

/// Decoded value of the power characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadValue {
    Known(PowerState),
    /// Transitional or undocumented byte (e.g. a station still booting)
    Unknown(u8),
}

impl ReadValue {
    pub fn is(self, state: PowerState) -> bool {
        self == ReadValue::Known(state)
    }
}

impl fmt::Display for ReadValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadValue::Known(state) => write!(f, "{state}"),
            ReadValue::Unknown(byte) => write!(f, "unknown (0x{byte:02x})"),
        }
    }
}

/// Byte to write for `state`
pub fn encode_write(state: PowerState) -> u8 {
    state.write_value()
}

/// Interpret a byte read from the power characteristic
pub fn decode_read(byte: u8) -> ReadValue {
    [PowerState::Sleep, PowerState::Standby, PowerState::Wake]
        .into_iter()
        .find(|state| state.read_values().contains(&byte))
        .map_or(ReadValue::Unknown(byte), ReadValue::Known)
}

/// What can be done with a characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadWrite,
    WriteOnly,
}

/// Static description of a GATT characteristic used by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Characteristic {
    pub name: &'static str,
    pub service: Uuid,
    pub uuid: Uuid,
    pub access: Access,
}

/// Power state characteristic, read before every write
pub const POWER: Characteristic = Characteristic {
    name: "power",
    service: ble::POWER_SERVICE_UUID,
    uuid: ble::POWER_CHARACTERISTIC_UUID,
    access: Access::ReadWrite,
};

/// Identify characteristic, a momentary blink with no persistent state
pub const IDENTIFY: Characteristic = Characteristic {
    name: "identify",
    service: ble::POWER_SERVICE_UUID,
    uuid: ble::IDENTIFY_CHARACTERISTIC_UUID,
    access: Access::WriteOnly,
};

/// Fixed value written to [`IDENTIFY`]
pub const IDENTIFY_VALUE: u8 = ble::write::IDENTIFY;

/// Whether an advertised local name belongs to a base station
pub fn is_base_station_name(name: &str) -> bool {
    name.starts_with(ble::NAME_PREFIX)
}
