use std::time::Duration;

use clap::Parser;
use iotawatt::{Config, TimeAnchor};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    #[clap(flatten)]
    pub device: DeviceArgs,

    /// Averaging window of the current values and width of the first since-last-poll window, in seconds.
    #[clap(long, env = "IOTAWATT_TIME_SPAN", default_value = "30")]
    pub time_span: u32,

    #[clap(long, env = "IOTAWATT_POLLING_INTERVAL", default_value = "30s")]
    polling_interval: humantime::Duration,

    /// Number of polls before exiting, runs forever when omitted.
    #[clap(long, env = "IOTAWATT_POLLS")]
    pub n_polls: Option<usize>,
}

impl Args {
    pub fn polling_interval(&self) -> Duration {
        self.polling_interval.into()
    }
}

#[derive(Parser)]
pub struct DeviceArgs {
    /// Device host name or address, optionally with a port.
    #[clap(long, env = "IOTAWATT_HOST")]
    pub host: String,

    #[clap(long, env = "IOTAWATT_NAME", default_value = "iotawatt")]
    pub name: String,

    #[clap(long, env = "IOTAWATT_USERNAME")]
    pub username: Option<String>,

    #[clap(long, env = "IOTAWATT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Start of the since-start energy integration: `y`, `M`, `w`, `d`, or a timestamp.
    #[clap(long, env = "IOTAWATT_INTEGRATED_INTERVAL", default_value = "y")]
    pub integrated_interval: TimeAnchor,

    #[clap(long, env = "IOTAWATT_TIMEOUT", default_value = "10s")]
    timeout: humantime::Duration,
}

impl DeviceArgs {
    pub fn into_config(self) -> Config {
        Config::builder()
            .host(self.host)
            .name(self.name)
            .maybe_username(self.username)
            .maybe_password(self.password)
            .integrated_interval(self.integrated_interval)
            .timeout(self.timeout.into())
            .build()
    }
}
