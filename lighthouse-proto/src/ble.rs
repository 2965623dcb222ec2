//! BLE GATT constants for SteamVR 2.0 base stations
//!
//! This module defines the service and characteristic UUIDs plus the raw
//! byte values written to and read from the power characteristic.

use uuid::Uuid;

/// Power service UUID: 00001523-1212-efde-1523-785feabcd124
pub const POWER_SERVICE_UUID: Uuid = Uuid::from_u128(0x00001523_1212_efde_1523_785feabcd124);

/// Power state characteristic UUID (read/write)
pub const POWER_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x00001525_1212_efde_1523_785feabcd124);

/// Identify characteristic UUID (write)
pub const IDENTIFY_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x00008421_1212_efde_1523_785feabcd124);

/// Advertised names of base stations start with this prefix, e.g. `LHB-1A2B3C4D`
pub const NAME_PREFIX: &str = "LHB-";

/// Bytes written to the power characteristic
pub mod write {
    pub const SLEEP: u8 = 0x00;
    pub const WAKE: u8 = 0x01;
    pub const STANDBY: u8 = 0x02;

    /// Written to the identify characteristic, makes the station blink
    pub const IDENTIFY: u8 = 0x01;
}

/// Bytes read back from the power characteristic
pub mod read {
    pub const SLEEPING: u8 = 0x00;
    pub const STANDBY: u8 = 0x02;
    /// Awake, previous state was sleeping
    pub const AWAKE_FROM_SLEEP: u8 = 0x09;
    /// Awake, previous state was standby
    pub const AWAKE_FROM_STANDBY: u8 = 0x0b;
}
