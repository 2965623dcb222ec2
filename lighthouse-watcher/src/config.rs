use std::path::{Path, PathBuf};
use std::time::Duration;

use lighthouse_ble_controller::RetryPolicy;
use lighthouse_proto::BaseStationAddress;

pub const CONFIG_FILE: &str = "watcher.json";
pub const MIN_INTERVAL_MS: u64 = 1000;

/// Watcher settings, read from `watcher.json`
///
/// ```json
/// {
///     "interval_ms": 5000,
///     "addresses": ["00:11:22:33:FF:EE", "00:11:22:33:FF:EF"],
///     "manager_path": "/usr/local/bin/lighthouse-ble"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatcherConfig {
    /// Polling interval for the companion process
    pub interval_ms: u64,
    #[serde(default = "default_process_name")]
    pub process_name: String,
    pub addresses: Vec<BaseStationAddress>,
    /// `lighthouse-ble` executable; commands run in-process when unset
    #[serde(default)]
    pub manager_path: Option<PathBuf>,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_process_name() -> String {
    "vrserver".to_string()
}

fn default_retries() -> u32 {
    RetryPolicy::DEFAULT_MAX_ATTEMPTS
}

fn default_retry_delay_ms() -> u64 {
    RetryPolicy::DEFAULT_DELAY.as_millis() as u64
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("interval of {0} ms is lower than the allowed {MIN_INTERVAL_MS} ms")]
    IntervalTooShort(u64),
    #[error("no base station addresses configured")]
    NoAddresses,
    #[error("retries must be at least 1")]
    NoAttempts,
    #[error("manager executable not found: {0}")]
    ManagerNotFound(PathBuf),
    #[error("could not determine home directory, set LIGHTHOUSE_HOME")]
    NoHome,
}

/// `$LIGHTHOUSE_HOME`, or `~/.lighthouse`
pub fn lighthouse_home() -> Result<PathBuf, ConfigError> {
    if let Some(home) = std::env::var_os("LIGHTHOUSE_HOME") {
        return Ok(PathBuf::from(home));
    }
    dirs::home_dir()
        .map(|home| home.join(".lighthouse"))
        .ok_or(ConfigError::NoHome)
}

impl WatcherConfig {
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(lighthouse_home()?.join(CONFIG_FILE))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        let config: WatcherConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_ms < MIN_INTERVAL_MS {
            return Err(ConfigError::IntervalTooShort(self.interval_ms));
        }
        if self.addresses.is_empty() {
            return Err(ConfigError::NoAddresses);
        }
        if self.retries == 0 {
            return Err(ConfigError::NoAttempts);
        }
        if let Some(manager) = &self.manager_path
            && !manager.is_file()
        {
            return Err(ConfigError::ManagerNotFound(manager.clone()));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retries, Duration::from_millis(self.retry_delay_ms))
    }
}
