use std::{
    convert::Infallible,
    fmt::{Display, Formatter},
    str::FromStr,
};

use bon::bon;
use chrono::NaiveDateTime;

/// Suffix of the series derived by integrating a power series over time.
pub const ENERGY_SUFFIX: &str = ".wh";

/// Distinguishes the «since last poll» energy sensor from the «since period start» one.
const LAST_MARKER: &str = "_last";

#[derive(Copy, Clone, Debug, PartialEq, Eq, derive_more::Display)]
pub enum Channel {
    #[display("{_0}")]
    Number(u32),

    /// Outputs are computed by the device and are not bound to a physical input.
    #[display("N/A")]
    NotApplicable,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, derive_more::Display)]
pub enum IoType {
    Input,
    Output,
}

/// Unit as reported by the device.
///
/// The device is free to report units this client knows nothing about, those are kept verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Unit {
    Watts,
    WattHours,
    Volts,
    Amps,
    VoltAmperes,
    Hertz,
    PowerFactor,
    Other(String),
}

impl Unit {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Watts => "Watts",
            Self::WattHours => "WattHours",
            Self::Volts => "Volts",
            Self::Amps => "Amps",
            Self::VoltAmperes => "VA",
            Self::Hertz => "Hz",
            Self::PowerFactor => "PF",
            Self::Other(unit) => unit,
        }
    }

    /// Series qualifier the query API expects for current values, for example `Main.watts`.
    #[must_use]
    pub fn query_suffix(&self) -> String {
        self.as_str().to_lowercase()
    }
}

impl FromStr for Unit {
    type Err = Infallible;

    fn from_str(unit: &str) -> Result<Self, Self::Err> {
        Ok(match unit {
            "Watts" => Self::Watts,
            "WattHours" => Self::WattHours,
            "Volts" => Self::Volts,
            "Amps" => Self::Amps,
            "VA" => Self::VoltAmperes,
            "Hz" => Self::Hertz,
            "PF" => Self::PowerFactor,
            _ => Self::Other(unit.to_owned()),
        })
    }
}

impl Display for Unit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One measurement channel of the device along with its latest reading.
///
/// Fields which the identifier is derived from are only reachable through setters,
/// so that the identifier always follows them.
#[must_use]
#[derive(Clone, Debug, PartialEq)]
pub struct Sensor {
    pub channel: Channel,
    pub unit: Unit,

    /// Latest reading, `None` until the first successful query or when the device has no data.
    pub value: Option<f64>,

    /// Beginning of the accumulation window of the latest reading, as reported by the device.
    pub period_start: Option<NaiveDateTime>,

    base_name: String,
    suffix: Option<String>,
    io_type: IoType,
    from_period_start: bool,
    mac_address: String,
    identifier: String,
}

#[bon]
impl Sensor {
    #[builder]
    pub fn new(
        channel: Channel,
        #[builder(into)] base_name: String,
        #[builder(into)] suffix: Option<String>,
        io_type: IoType,
        unit: Unit,
        #[builder(into)] mac_address: String,
        #[builder(default)] from_period_start: bool,
    ) -> Self {
        let mut this = Self {
            channel,
            unit,
            value: None,
            period_start: None,
            base_name,
            suffix,
            io_type,
            from_period_start,
            mac_address,
            identifier: String::new(),
        };
        this.recompute_identifier();
        this
    }
}

impl Sensor {
    /// Series name as known to the device.
    #[must_use]
    pub fn source_name(&self) -> String {
        format!("{}{}", self.base_name, self.suffix.as_deref().unwrap_or_default())
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> String {
        let mut name = self.source_name();
        if self.suffix.as_deref() == Some(ENERGY_SUFFIX) && !self.from_period_start {
            name.push_str(LAST_MARKER);
        }
        name
    }

    /// Globally unique identifier: device MAC address, I/O type and display name.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    #[must_use]
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    #[must_use]
    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }

    #[must_use]
    pub const fn io_type(&self) -> IoType {
        self.io_type
    }

    #[must_use]
    pub const fn from_period_start(&self) -> bool {
        self.from_period_start
    }

    #[must_use]
    pub fn mac_address(&self) -> &str {
        &self.mac_address
    }

    #[must_use]
    pub fn is_energy(&self) -> bool {
        self.unit == Unit::WattHours
    }

    pub fn set_base_name(&mut self, base_name: impl Into<String>) {
        self.base_name = base_name.into();
        self.recompute_identifier();
    }

    pub fn set_suffix(&mut self, suffix: Option<String>) {
        self.suffix = suffix;
        self.recompute_identifier();
    }

    pub fn set_io_type(&mut self, io_type: IoType) {
        self.io_type = io_type;
        self.recompute_identifier();
    }

    pub fn set_from_period_start(&mut self, from_period_start: bool) {
        self.from_period_start = from_period_start;
        self.recompute_identifier();
    }

    pub fn set_mac_address(&mut self, mac_address: impl Into<String>) {
        self.mac_address = mac_address.into();
        self.recompute_identifier();
    }

    fn recompute_identifier(&mut self) {
        self.identifier = format!("{}_{}_{}", self.mac_address, self.io_type, self.name());
    }
}
