//! Power control tool for SteamVR base stations
//!
//! Discovers base stations and switches them between sleep, standby and
//! wake over BLE.

use std::process::ExitCode;
use std::time::Duration;

use clap::{ArgGroup, Parser};
use lighthouse_ble_controller::{BtleplugRadio, ControlError, Controller, RetryPolicy};
use lighthouse_proto::{PowerState, parse_all};
use tracing::error;
use tracing_subscriber::EnvFilter;

const EXIT_FAILED: u8 = 1;
const EXIT_INVALID_INPUT: u8 = 2;

#[derive(Parser)]
#[command(name = "lighthouse-ble")]
#[command(about = "Power control for SteamVR base stations")]
#[command(group(
    ArgGroup::new("mode")
        .required(true)
        .args(["discover", "wake", "sleep", "standby", "identify"])
))]
struct Cli {
    /// Print base stations as they are found, until Ctrl-C
    #[arg(short, long)]
    discover: bool,

    /// Wake the given stations
    #[arg(short, long, requires = "addresses")]
    wake: bool,

    /// Put the given stations to sleep
    #[arg(short, long, requires = "addresses")]
    sleep: bool,

    /// Put the given stations in standby
    #[arg(long, requires = "addresses")]
    standby: bool,

    /// Make a single station blink
    #[arg(short, long, requires = "addresses")]
    identify: bool,

    /// Station addresses, comma separated (AA:BB:CC:DD:EE:FF)
    #[arg(short, long, value_delimiter = ',')]
    addresses: Vec<String>,

    /// Attempts per station before giving up
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
    retries: u32,

    /// Delay between attempts in milliseconds
    #[arg(long, default_value_t = 500)]
    retry_delay_ms: u64,

    /// How long to look for a station before a connect attempt fails
    #[arg(long, default_value_t = 10)]
    connect_timeout_secs: u64,
}

impl Cli {
    /// `None` in discover and identify mode
    fn power_state(&self) -> Option<PowerState> {
        if self.wake {
            Some(PowerState::Wake)
        } else if self.sleep {
            Some(PowerState::Sleep)
        } else if self.standby {
            Some(PowerState::Standby)
        } else {
            None
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("lighthouse_ble=info,lighthouse_ble_controller=info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(error) = validate(&cli) {
        error!("{error}");
        return ExitCode::from(EXIT_INVALID_INPUT);
    }

    match run(cli).await {
        Ok(code) => code,
        Err(error) => {
            error!(%error, "command failed");
            ExitCode::from(EXIT_FAILED)
        }
    }
}

/// Reject bad input before the radio is touched
fn validate(cli: &Cli) -> Result<(), String> {
    parse_all(cli.addresses.as_slice()).map_err(|e| e.to_string())?;
    if cli.identify && cli.addresses.len() != 1 {
        return Err(format!(
            "identify takes exactly one address, got {}",
            cli.addresses.len()
        ));
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<ExitCode, ControlError> {
    let radio = BtleplugRadio::new(Duration::from_secs(cli.connect_timeout_secs)).await?;
    let policy = RetryPolicy::new(cli.retries, Duration::from_millis(cli.retry_delay_ms));
    let controller = Controller::with_policy(radio, policy);

    let handle = controller.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.trigger();
        }
    });

    if cli.discover {
        discover(&controller).await?;
        return Ok(ExitCode::SUCCESS);
    }

    if cli.identify {
        controller.identify(&cli.addresses[0]).await?;
        return Ok(ExitCode::SUCCESS);
    }

    let Some(state) = cli.power_state() else {
        return Ok(ExitCode::from(EXIT_INVALID_INPUT));
    };
    let report = controller.change_power_state(cli.addresses.as_slice(), state).await?;
    for (address, error) in report.failed() {
        error!(%address, %error, "station not switched to {state}");
    }

    if report.all_succeeded() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_FAILED))
    }
}

async fn discover(controller: &Controller<BtleplugRadio>) -> Result<(), ControlError> {
    println!("Scanning for base stations, press Ctrl-C to stop...");
    let mut discoveries = controller.start_discovery().await?;
    let mut shutdown = controller.shutdown_handle().subscribe();

    loop {
        tokio::select! {
            discovery = discoveries.recv() => match discovery {
                Some(discovery) => println!(
                    "Potential base station found. Name: {}, Address: {}",
                    discovery.name, discovery.address
                ),
                None => break,
            },
            _ = shutdown.triggered() => break,
        }
    }

    controller.shutdown().await;
    Ok(())
}
