//! Keeps base stations awake only while SteamVR runs

pub mod commander;
pub mod config;
pub mod probe;
mod watcher;

pub use commander::{CommandError, ExternalCommander, InProcessCommander, PowerCommander};
pub use config::{ConfigError, WatcherConfig, lighthouse_home};
pub use probe::{ProcessProbe, SysinfoProbe};
pub use watcher::{ProcessWatcher, WatcherState};
