use std::collections::btree_map::Entry;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{
    api::{
        Transport,
        models::{IoStatus, SeriesCatalog},
    },
    device::Device,
    prelude::*,
    query::{Batch, Batches, TimeAnchor, Window},
    sensor::{Channel, ENERGY_SUFFIX, IoType, Sensor, Unit},
    sensors::{Sensors, energy_key, input_key, output_key, total_energy_key},
};

const STATUS_PATH: &str = "/status?inputs=yes&outputs=yes";
const SERIES_PATH: &str = "/query?show=series";

/// Aligns the sensor collection with the device and refreshes the readings.
pub struct Reconciler<'a, T> {
    device: &'a Device<T>,

    /// Anchor of the since-start energy integration.
    integrated_interval: TimeAnchor,
}

impl<'a, T: Transport> Reconciler<'a, T> {
    pub const fn new(device: &'a Device<T>, integrated_interval: TimeAnchor) -> Self {
        Self { device, integrated_interval }
    }

    /// Run one pass at `now`.
    ///
    /// Catalog changes are committed to `sensors` before any value is queried,
    /// a failed value query does not roll them back.
    ///
    /// Returns the end of the since-last-poll window when it has been queried,
    /// which is the next `last_update`.
    #[instrument(skip_all, fields(host = self.device.host(), time_span = time_span))]
    pub async fn reconcile(
        &self,
        sensors: &mut Sensors,
        time_span: u32,
        last_update: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        self.refresh_catalog(sensors).await?;
        self.refresh_values(sensors, time_span, last_update, now).await
    }

    #[instrument(skip_all)]
    async fn refresh_catalog(&self, sensors: &mut Sensors) -> Result {
        let status: IoStatus = self.device.get_json(STATUS_PATH).await?;
        let catalog: SeriesCatalog = self.device.get_json(SERIES_PATH).await?;
        debug!(
            n_inputs = status.inputs.len(),
            n_outputs = status.outputs.len(),
            n_series = catalog.series.len(),
            "fetched the catalog",
        );

        // Inputs lead the series catalog, in the same order.
        if status.inputs.len() > catalog.series.len() {
            return Err(Error::malformed(
                self.device.url(SERIES_PATH),
                format!(
                    "{} inputs but only {} series",
                    status.inputs.len(),
                    catalog.series.len()
                ),
            ));
        }

        // Matching by base name turns a renamed series into a removal and a creation.
        let removed = sensors.retain_reporting_removed(|sensor| {
            catalog.series.iter().any(|series| series.name == sensor.base_name())
        });
        for key in removed {
            info!(%key, "removed");
        }

        let mac_address = self.device.mac_address();
        for (input, series) in status.inputs.iter().zip(&catalog.series) {
            upsert_set(
                sensors,
                &input_key(input.channel),
                &Descriptor {
                    channel: Channel::Number(input.channel),
                    base_name: &series.name,
                    io_type: IoType::Input,
                    unit: &series.unit,
                    mac_address,
                },
            );
        }
        for output in &status.outputs {
            debug!(name = %output.name, unit = %output.unit, value = ?output.value, "output");
            upsert_set(
                sensors,
                &output_key(&output.name),
                &Descriptor {
                    channel: Channel::NotApplicable,
                    base_name: &output.name,
                    io_type: IoType::Output,
                    unit: &output.unit,
                    mac_address,
                },
            );
        }
        Ok(())
    }

    #[instrument(skip_all)]
    async fn refresh_values(
        &self,
        sensors: &mut Sensors,
        time_span: u32,
        last_update: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        let batches = Batches::partition(sensors);

        if !batches.current.is_empty() {
            let path = batches.current.current_path(time_span);
            self.query(&batches.current, &path, sensors).await?;
        }

        if !batches.since_start.is_empty() {
            let path =
                batches.since_start.integration_path(self.integrated_interval, TimeAnchor::Now);
            self.query(&batches.since_start, &path, sensors).await?;
        }

        let window = Window::new(now, last_update, time_span);
        if window.is_empty() {
            warn!(
                start = %window.start,
                end = %window.end,
                "nothing to query, the update came too soon",
            );
            return Ok(None);
        }
        if !batches.since_last_poll.is_empty() {
            let path = batches
                .since_last_poll
                .integration_path(TimeAnchor::At(window.start), TimeAnchor::At(window.end));
            self.query(&batches.since_last_poll, &path, sensors).await?;
        }
        Ok(Some(window.end))
    }

    #[instrument(skip_all, fields(class = ?batch.class(), n_series = batch.len()))]
    async fn query(&self, batch: &Batch, path: &str, sensors: &mut Sensors) -> Result {
        let response = self.device.get(path).await?.error_for_status()?;
        let rows: Vec<Vec<Value>> = response.json()?;
        batch.distribute(sensors, &rows, &response.url)
    }
}

/// What the device reports about a channel.
struct Descriptor<'a> {
    channel: Channel,
    base_name: &'a str,
    io_type: IoType,
    unit: &'a Unit,
    mac_address: &'a str,
}

/// Upsert the sensor along with its energy sensors when it measures power.
fn upsert_set(sensors: &mut Sensors, key: &str, descriptor: &Descriptor<'_>) {
    upsert(sensors, key.to_owned(), descriptor, descriptor.unit.clone(), None, false);

    let total_energy_key = total_energy_key(key);
    let energy_key = energy_key(key);
    if *descriptor.unit == Unit::Watts {
        upsert(sensors, total_energy_key, descriptor, Unit::WattHours, Some(ENERGY_SUFFIX), true);
        upsert(sensors, energy_key, descriptor, Unit::WattHours, Some(ENERGY_SUFFIX), false);
    } else {
        // The channel no longer measures power.
        for key in [total_energy_key, energy_key] {
            if sensors.remove(&key).is_some() {
                info!(%key, "removed");
            }
        }
    }
}

fn upsert(
    sensors: &mut Sensors,
    key: String,
    descriptor: &Descriptor<'_>,
    unit: Unit,
    suffix: Option<&str>,
    from_period_start: bool,
) {
    match sensors.entry(key) {
        Entry::Vacant(entry) => {
            info!(key = %entry.key(), io_type = %descriptor.io_type, %unit, "creating");
            entry.insert(
                Sensor::builder()
                    .channel(descriptor.channel)
                    .base_name(descriptor.base_name)
                    .maybe_suffix(suffix)
                    .io_type(descriptor.io_type)
                    .unit(unit)
                    .mac_address(descriptor.mac_address)
                    .from_period_start(from_period_start)
                    .build(),
            );
        }
        Entry::Occupied(mut entry) => {
            let sensor = entry.get_mut();
            sensor.channel = descriptor.channel;
            sensor.unit = unit;
            sensor.set_base_name(descriptor.base_name);
            sensor.set_suffix(suffix.map(str::to_owned));
            sensor.set_io_type(descriptor.io_type);
            sensor.set_mac_address(descriptor.mac_address);
            sensor.set_from_period_start(from_period_start);
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{DateTime, TimeZone, Utc};

    use crate::api::transport::testing::ScriptedTransport;

    pub const WIFI_STATUS: &str = r#"{"wifi": {"SSID": "home", "mac": "A0:20:A6:16:8D:AD"}}"#;

    // language=json
    pub const IO_STATUS: &str = r#"{
        "inputs": [{"channel": 0, "Vrms": 120.5}, {"channel": 1, "Watts": "345"}],
        "outputs": [{"name": "Total", "units": "Watts", "value": 400.0}]
    }"#;

    // language=json
    pub const SERIES: &str = r#"{
        "series": [
            {"name": "Voltage", "unit": "Volts"},
            {"name": "Main", "unit": "Watts"},
            {"name": "Total", "unit": "Watts"}
        ]
    }"#;

    pub const CURRENT_PATH: &str =
        "/query?select=[Voltage.volts,Main.watts,Total.watts]&begin=s-30s&end=s&group=30s";
    pub const SINCE_START_PATH: &str =
        "/query?select=[time.iso,Main.wh,Total.wh]&begin=y&end=s&group=all";
    pub const SINCE_LAST_POLL_PATH: &str = "/query?select=[time.iso,Main.wh.d3,Total.wh.d3]\
        &begin=2021-05-26T12:34:00Z&end=2021-05-26T12:34:30Z&group=all";

    pub fn at(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 5, 26, hour, minute, second).unwrap()
    }

    /// Time of the first poll, the since-last-poll window ends at 12:34:30.
    pub fn now() -> DateTime<Utc> {
        at(12, 34, 47)
    }

    /// Device with one voltage input, one power input and one power output.
    pub fn transport() -> ScriptedTransport {
        let transport = ScriptedTransport::default();
        transport
            .ok("/status?wifi=yes", WIFI_STATUS)
            .ok(super::STATUS_PATH, IO_STATUS)
            .ok(super::SERIES_PATH, SERIES)
            .ok(CURRENT_PATH, "[[120.5, 345.6, 400.0]]")
            .ok(SINCE_START_PATH, r#"[["2021-01-01T00:00:00", 1000.5, 2000.25]]"#)
            .ok(SINCE_LAST_POLL_PATH, r#"[["2021-05-26T12:34:00Z", 2.875, 3.25]]"#);
        transport
    }
}
