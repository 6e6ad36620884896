use serde::Deserialize;
use serde_with::serde_as;

use crate::sensor::Unit;

/// `GET /status?wifi=yes`.
#[must_use]
#[derive(Deserialize)]
pub struct WifiStatus {
    pub wifi: Wifi,
}

#[derive(Deserialize)]
pub struct Wifi {
    /// Colon-delimited MAC address.
    pub mac: String,
}

impl WifiStatus {
    /// MAC address without the colons.
    #[must_use]
    pub fn mac_address(&self) -> String {
        self.wifi.mac.replace(':', "")
    }
}

/// `GET /status?inputs=yes&outputs=yes`.
#[must_use]
#[derive(Deserialize)]
pub struct IoStatus {
    pub inputs: Vec<InputStatus>,
    pub outputs: Vec<OutputStatus>,
}

#[derive(Deserialize)]
pub struct InputStatus {
    pub channel: u32,
}

#[serde_as]
#[derive(Deserialize)]
pub struct OutputStatus {
    pub name: String,

    #[serde_as(as = "serde_with::DisplayFromStr")]
    #[serde(rename = "units")]
    pub unit: Unit,

    #[serde_as(as = "serde_with::DefaultOnError")]
    #[serde(default)]
    pub value: Option<f64>,
}

/// `GET /query?show=series`.
#[must_use]
#[derive(Deserialize)]
pub struct SeriesCatalog {
    pub series: Vec<Series>,
}

#[serde_as]
#[derive(Deserialize)]
pub struct Series {
    pub name: String,

    #[serde_as(as = "serde_with::DisplayFromStr")]
    pub unit: Unit,
}
