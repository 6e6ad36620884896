mod cli;
mod tables;

use anyhow::{Context, Result};
use clap::{Parser, crate_version};
use iotawatt::Iotawatt;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::{cli::Args, tables::build_sensors_table};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .without_time()
        .compact()
        .init();
    info!(version = crate_version!(), "starting…");

    let args = Args::parse();
    let polling_interval = args.polling_interval();
    let mut iotawatt = Iotawatt::try_new(args.device.into_config())?;

    let mut interval = interval(polling_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut n_polls = 0;

    while args.n_polls.is_none_or(|max_polls| n_polls < max_polls) {
        interval.tick().await;
        n_polls += 1;

        match iotawatt.update_with(args.time_span, None).await {
            Ok(()) => {
                info!(
                    name = iotawatt.name(),
                    mac_address = iotawatt.mac_address(),
                    n_sensors = iotawatt.sensors().len(),
                    "polled",
                );
                println!("{}", build_sensors_table(iotawatt.sensors()));
            }
            Err(error @ iotawatt::Error::AuthenticationRequired) => {
                return Err(error).context("check the username and password");
            }
            Err(error) => {
                // Transient, the next poll retries the same window.
                error!(%error, "failed to poll the device");
            }
        }
    }

    info!("done!");
    Ok(())
}
