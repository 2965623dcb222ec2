//! Hardware addresses of base stations
//!
//! Addresses are accepted as 12 hex digits, either bare (`001122AABBCC`) or
//! grouped in pairs by `:` or `-`. They always display as uppercase,
//! colon-grouped and zero-padded.

use std::fmt;
use std::str::FromStr;

const MAX_ADDRESS: u64 = 0xffff_ffff_ffff;

/// 48-bit BLE hardware address of a base station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BaseStationAddress(u64);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid base station address {input:?}: expected 12 hex digits, optionally grouped by ':' or '-'")]
pub struct AddressError {
    input: String,
}

impl AddressError {
    fn new(input: &str) -> Self {
        Self { input: input.to_string() }
    }

    /// The text that failed to parse
    pub fn input(&self) -> &str {
        &self.input
    }
}

impl BaseStationAddress {
    /// Build an address from its integer form, rejecting values wider than 48 bits
    pub fn from_u64(value: u64) -> Option<Self> {
        (value <= MAX_ADDRESS).then_some(Self(value))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Big-endian bytes, most significant octet first (as displayed)
    pub fn to_bytes(&self) -> [u8; 6] {
        let b = self.0.to_be_bytes();
        [b[2], b[3], b[4], b[5], b[6], b[7]]
    }
}

impl From<[u8; 6]> for BaseStationAddress {
    fn from(bytes: [u8; 6]) -> Self {
        let mut buf = [0u8; 8];
        buf[2..].copy_from_slice(&bytes);
        Self(u64::from_be_bytes(buf))
    }
}

impl FromStr for BaseStationAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = match s.len() {
            12 => s.to_string(),
            17 => strip_delimiters(s).ok_or_else(|| AddressError::new(s))?,
            _ => return Err(AddressError::new(s)),
        };

        if digits.len() != 12 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AddressError::new(s));
        }

        u64::from_str_radix(&digits, 16)
            .map(Self)
            .map_err(|_| AddressError::new(s))
    }
}

/// `AA:BB:CC:DD:EE:FF` or `AA-BB-CC-DD-EE-FF` into `AABBCCDDEEFF`.
/// The delimiter must be the same at all five positions.
fn strip_delimiters(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let delimiter = bytes[2];
    if delimiter != b':' && delimiter != b'-' {
        return None;
    }

    let mut digits = String::with_capacity(12);
    for (i, &b) in bytes.iter().enumerate() {
        if i % 3 == 2 {
            if b != delimiter {
                return None;
            }
        } else {
            digits.push(b as char);
        }
    }
    Some(digits)
}

impl fmt::Display for BaseStationAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.to_bytes();
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl TryFrom<String> for BaseStationAddress {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BaseStationAddress> for String {
    fn from(address: BaseStationAddress) -> Self {
        address.to_string()
    }
}

/// Parse every address in `inputs`, failing on the first invalid one
pub fn parse_all<S: AsRef<str>>(inputs: &[S]) -> Result<Vec<BaseStationAddress>, AddressError> {
    inputs.iter().map(|s| s.as_ref().trim().parse()).collect()
}
