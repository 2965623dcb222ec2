use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use lighthouse_ble_controller::{BtleplugRadio, Controller, ShutdownHandle, shutdown};
use lighthouse_watcher::{
    ConfigError, ExternalCommander, InProcessCommander, PowerCommander, ProcessWatcher,
    SysinfoProbe, WatcherConfig,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(clap::Parser)]
#[command(name = "lighthouse-watcher")]
#[command(about = "Wakes base stations while SteamVR runs")]
struct Cli {
    /// Config file, defaults to $LIGHTHOUSE_HOME/watcher.json
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("lighthouse_watcher=info,lighthouse_ble_controller=info")
        }))
        .init();

    let cli: Cli = clap::Parser::parse();
    let path = match cli.config.map(Ok).unwrap_or_else(WatcherConfig::default_path) {
        Ok(path) => path,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(2);
        }
    };

    let config = match WatcherConfig::load(&path) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %path.display(), "{e}");
            return ExitCode::from(2);
        }
    };
    info!(path = %path.display(), addresses = config.addresses.len(), "configuration loaded");

    match config.manager_path.clone() {
        Some(manager) => {
            info!(manager = %manager.display(), "commands run out of process");
            let commander = ExternalCommander::new(manager, config.retry_policy());
            if let Err(e) = serve(&config, commander, None).await {
                error!("{e}");
                return ExitCode::from(2);
            }
        }
        None => {
            let radio = match BtleplugRadio::new(BtleplugRadio::DEFAULT_CONNECT_TIMEOUT).await {
                Ok(radio) => radio,
                Err(e) => {
                    error!("{e}");
                    return ExitCode::from(1);
                }
            };
            let controller = Arc::new(Controller::with_policy(radio, config.retry_policy()));
            let controller_shutdown = controller.shutdown_handle();
            let commander = InProcessCommander::new(controller);
            if let Err(e) = serve(&config, commander, Some(controller_shutdown)).await {
                error!("{e}");
                return ExitCode::from(2);
            }
        }
    }

    ExitCode::SUCCESS
}

async fn serve<C: PowerCommander>(
    config: &WatcherConfig,
    commander: C,
    controller_shutdown: Option<ShutdownHandle>,
) -> Result<(), ConfigError> {
    let (handle, shutdown) = shutdown::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("stopping");
            handle.trigger();
            if let Some(controller) = controller_shutdown {
                controller.trigger();
            }
        }
    });

    let watcher = ProcessWatcher::new(
        &config.process_name,
        config.addresses.clone(),
        Arc::new(SysinfoProbe::new()),
        Arc::new(commander),
    );
    watcher.run(config.interval(), shutdown).await
}
