//! Query API paths and the positional results they return.
//!
//! API docs: <https://docs.iotawatt.com/en/02_06_03/query.html>.

use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use chrono::{DateTime, NaiveDateTime, TimeDelta, Timelike, Utc};
use itertools::Itertools;
use serde_json::Value;

use crate::{prelude::*, sensor::Sensor, sensors::Sensors};

/// The device only accepts whole 30-second boundaries.
pub const GRANULARITY_SECONDS: u32 = 30;

/// Precision qualifier of the since-last-poll energy series.
const SINCE_LAST_POLL_PRECISION: &str = ".d3";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Time parameter of the query API: either a relative token or an absolute timestamp.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum TimeAnchor {
    /// January 1 of the current year.
    #[default]
    StartOfYear,

    StartOfMonth,

    /// Weeks start on Sunday.
    StartOfWeek,

    StartOfDay,
    Now,
    At(DateTime<Utc>),
}

impl Display for TimeAnchor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StartOfYear => f.write_str("y"),
            Self::StartOfMonth => f.write_str("M"),
            Self::StartOfWeek => f.write_str("w"),
            Self::StartOfDay => f.write_str("d"),
            Self::Now => f.write_str("s"),
            Self::At(timestamp) => write!(f, "{}", timestamp.format(TIMESTAMP_FORMAT)),
        }
    }
}

impl FromStr for TimeAnchor {
    type Err = Error;

    fn from_str(anchor: &str) -> Result<Self> {
        match anchor {
            "y" => Ok(Self::StartOfYear),
            "M" => Ok(Self::StartOfMonth),
            "w" => Ok(Self::StartOfWeek),
            "d" => Ok(Self::StartOfDay),
            "s" => Ok(Self::Now),
            _ => DateTime::parse_from_rfc3339(anchor)
                .map(|timestamp| timestamp.to_utc())
                .or_else(|_| {
                    NaiveDateTime::parse_from_str(anchor, "%Y-%m-%dT%H:%M:%S")
                        .map(|timestamp| timestamp.and_utc())
                })
                .map(Self::At)
                .map_err(|_| Error::InvalidTimeAnchor(anchor.to_owned())),
        }
    }
}

/// Round down to the device granularity, dropping the sub-second part.
#[must_use]
pub fn round_down(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    let timestamp = timestamp.with_nanosecond(0).unwrap_or(timestamp);
    timestamp - TimeDelta::seconds(i64::from(timestamp.second() % GRANULARITY_SECONDS))
}

/// Window of the since-last-poll energy query.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    /// The window ends at the rounded current time and starts at the previous update,
    /// or `time_span` seconds earlier on the very first poll.
    pub fn new(now: DateTime<Utc>, last_update: Option<DateTime<Utc>>, time_span: u32) -> Self {
        let end = round_down(now);
        let start = last_update.unwrap_or_else(|| end - TimeDelta::seconds(i64::from(time_span)));
        Self { start, end }
    }

    /// Nothing to integrate: the poll came too soon.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum QueryClass {
    /// Anything but energy, averaged over the last seconds.
    Current,

    /// Energy integrated since a fixed anchor.
    EnergySinceStart,

    /// Energy integrated since the previous poll.
    EnergySinceLastPoll,
}

impl QueryClass {
    pub fn of(sensor: &Sensor) -> Self {
        match (sensor.is_energy(), sensor.from_period_start()) {
            (false, _) => Self::Current,
            (true, true) => Self::EnergySinceStart,
            (true, false) => Self::EnergySinceLastPoll,
        }
    }

    /// Series name to select for the sensor.
    fn select(self, sensor: &Sensor) -> String {
        match self {
            Self::Current => format!("{}.{}", sensor.source_name(), sensor.unit.query_suffix()),
            Self::EnergySinceStart => sensor.source_name(),
            Self::EnergySinceLastPoll => {
                format!("{}{SINCE_LAST_POLL_PRECISION}", sensor.source_name())
            }
        }
    }

    /// Integration responses lead each row with the window marker.
    const fn has_time_marker(self) -> bool {
        !matches!(self, Self::Current)
    }
}

/// Sensors of one query class along with the series selected for each of them.
///
/// The response is positional, so the same ordered list builds the request
/// and distributes the response.
#[must_use]
#[derive(Clone, Debug)]
pub struct Batch {
    class: QueryClass,
    entries: Vec<(String, String)>,
}

impl Batch {
    pub const fn new(class: QueryClass) -> Self {
        Self { class, entries: Vec::new() }
    }

    pub fn push(&mut self, key: impl Into<String>, sensor: &Sensor) {
        self.entries.push((key.into(), self.class.select(sensor)));
    }

    #[must_use]
    pub const fn class(&self) -> QueryClass {
        self.class
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    fn selection(&self) -> String {
        let mut series = self.entries.iter().map(|(_, series)| series.as_str());
        if self.class.has_time_marker() {
            std::iter::once("time.iso").chain(series).join(",")
        } else {
            series.join(",")
        }
    }

    /// Path of the current values averaged over the last `time_span` seconds.
    #[must_use]
    pub fn current_path(&self, time_span: u32) -> String {
        format!(
            "/query?select=[{}]&begin=s-{time_span}s&end=s&group={time_span}s",
            self.selection(),
        )
    }

    /// Path of the values integrated between the anchors.
    #[must_use]
    pub fn integration_path(&self, begin: TimeAnchor, end: TimeAnchor) -> String {
        format!("/query?select=[{}]&begin={begin}&end={end}&group=all", self.selection())
    }

    /// Assign the first response row to the sensors, in the order they were selected.
    pub fn distribute(&self, sensors: &mut Sensors, rows: &[Vec<Value>], url: &str) -> Result {
        let row = rows.first().ok_or_else(|| Error::malformed(url, "empty response"))?;
        let (marker, values) = if self.class.has_time_marker() {
            match row.split_first() {
                Some((marker, values)) => (Some(parse_marker(marker, url)?), values),
                None => return Err(Error::malformed(url, "missing the time marker")),
            }
        } else {
            (None, row.as_slice())
        };
        if values.len() != self.entries.len() {
            return Err(Error::malformed(
                url,
                format!("selected {} series, got {} values", self.entries.len(), values.len()),
            ));
        }

        // Validate the whole row before touching any sensor.
        let values =
            values.iter().map(|value| parse_value(value, url)).collect::<Result<Vec<_>>>()?;

        for ((key, series), value) in self.entries.iter().zip(values) {
            let Some(sensor) = sensors.get_mut(key) else {
                warn!(%key, "the sensor is gone, skipping");
                continue;
            };
            debug!(%key, %series, ?value, "updated");
            sensor.value = value;
            if marker.is_some() {
                sensor.period_start = marker;
            }
        }
        Ok(())
    }
}

/// Batches of the three query classes.
pub struct Batches {
    pub current: Batch,
    pub since_start: Batch,
    pub since_last_poll: Batch,
}

impl Batches {
    pub fn partition(sensors: &Sensors) -> Self {
        let mut this = Self {
            current: Batch::new(QueryClass::Current),
            since_start: Batch::new(QueryClass::EnergySinceStart),
            since_last_poll: Batch::new(QueryClass::EnergySinceLastPoll),
        };
        for (key, sensor) in sensors {
            match QueryClass::of(sensor) {
                QueryClass::Current => this.current.push(key, sensor),
                QueryClass::EnergySinceStart => this.since_start.push(key, sensor),
                QueryClass::EnergySinceLastPoll => this.since_last_poll.push(key, sensor),
            }
        }
        this
    }
}

fn parse_value(value: &Value, url: &str) -> Result<Option<f64>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(number) => Ok(number.as_f64()),
        _ => Err(Error::malformed(url, format!("`{value}` is not a number"))),
    }
}

/// Parse the `time.iso` column, the device may or may not append the offset.
fn parse_marker(marker: &Value, url: &str) -> Result<NaiveDateTime> {
    let marker = marker
        .as_str()
        .ok_or_else(|| Error::malformed(url, format!("`{marker}` is not a timestamp")))?;
    DateTime::parse_from_rfc3339(marker)
        .map(|timestamp| timestamp.naive_utc())
        .or_else(|_| NaiveDateTime::parse_from_str(marker, "%Y-%m-%dT%H:%M:%S"))
        .map_err(|_| Error::malformed(url, format!("`{marker}` is not a timestamp")))
}
