//! Lighthouse BLE Controller
//!
//! Power control and discovery for SteamVR 2.0 base stations over BLE.
//!
//! # Example
//!
//! ```ignore
//! use lighthouse_ble_controller::{BtleplugRadio, Controller, PowerState};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let radio = BtleplugRadio::new(BtleplugRadio::DEFAULT_CONNECT_TIMEOUT).await?;
//!     let controller = Controller::new(radio);
//!
//!     // Wake two stations, each is retried on its own
//!     let report = controller
//!         .change_power_state(&["00:11:22:33:FF:EE", "00:11:22:33:FF:EF"], PowerState::Wake)
//!         .await?;
//!     for (address, error) in report.failed() {
//!         println!("{address}: {error}");
//!     }
//!
//!     // Blink one of them
//!     controller.identify("00:11:22:33:FF:EE").await?;
//!
//!     Ok(())
//! }
//! ```

mod btleplug_radio;
mod controller;
mod error;
pub mod radio;
mod retry;
pub mod scanner;
pub mod session;
pub mod shutdown;

#[cfg(test)]
mod testing;

pub use btleplug_radio::{BtleplugLink, BtleplugRadio};
pub use controller::{BatchReport, Controller, StationOutcome};
pub use error::ControlError;
pub use radio::{Advertisement, GattService, Link, Radio};
pub use retry::RetryPolicy;
pub use scanner::{AdvertisementScanner, DiscoveredAddressSet, Discovery};
pub use session::{DeviceSession, Phase, Transition};
pub use shutdown::{Shutdown, ShutdownHandle};

pub use lighthouse_proto::{AddressError, BaseStationAddress, PowerState, ReadValue};
