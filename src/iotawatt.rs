use std::time::Duration;

use bon::Builder;
use chrono::{DateTime, Utc};

use crate::{
    api::{Credentials, HttpTransport, Transport},
    device::{Authentication, Device},
    prelude::*,
    query::TimeAnchor,
    reconciler::Reconciler,
    sensors::Sensors,
};

/// Default width of the current-value averaging window and of the first since-last-poll window, in seconds.
pub const DEFAULT_TIME_SPAN: u32 = 30;

#[derive(Clone, Debug, Builder)]
pub struct Config {
    /// Host name or address, optionally with a port.
    #[builder(into)]
    pub host: String,

    #[builder(into, default = "iotawatt".to_owned())]
    pub name: String,

    #[builder(into)]
    pub username: Option<String>,

    #[builder(into)]
    pub password: Option<String>,

    /// Start of the since-start energy integration.
    #[builder(default)]
    pub integrated_interval: TimeAnchor,

    #[builder(default = Duration::from_secs(10))]
    pub timeout: Duration,
}

impl Config {
    /// Credentials are only sent when a username is configured.
    #[must_use]
    pub fn credentials(&self) -> Option<Credentials> {
        self.username.as_ref().map(|username| Credentials {
            username: username.clone(),
            password: self.password.clone().unwrap_or_default(),
        })
    }
}

/// Polling client of a single `IoTaWatt` device.
pub struct Iotawatt<T = HttpTransport> {
    name: String,
    device: Device<T>,
    integrated_interval: TimeAnchor,
    sensors: Sensors,
    last_update_time: Option<DateTime<Utc>>,
    is_connected: bool,
}

impl Iotawatt {
    pub fn try_new(config: Config) -> Result<Self> {
        let transport = HttpTransport::try_new(config.timeout)?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: Transport> Iotawatt<T> {
    pub fn with_transport(config: Config, transport: T) -> Self {
        let credentials = config.credentials();
        Self {
            name: config.name,
            device: Device::new(config.host, credentials, transport),
            integrated_interval: config.integrated_interval,
            sensors: Sensors::default(),
            last_update_time: None,
            is_connected: false,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn host(&self) -> &str {
        self.device.host()
    }

    /// Empty until connected.
    #[must_use]
    pub fn mac_address(&self) -> &str {
        self.device.mac_address()
    }

    #[must_use]
    pub const fn sensors(&self) -> &Sensors {
        &self.sensors
    }

    /// End of the last successfully queried since-last-poll window.
    #[must_use]
    pub const fn last_update_time(&self) -> Option<DateTime<Utc>> {
        self.last_update_time
    }

    /// Test the connection and discover the MAC address.
    ///
    /// Called implicitly by the first update.
    pub async fn connect(&mut self) -> Result<Authentication> {
        let authentication = self.device.connect().await?;
        self.is_connected = authentication == Authentication::Granted;
        Ok(authentication)
    }

    /// Poll the device with the default time span.
    pub async fn update(&mut self) -> Result {
        self.update_with(DEFAULT_TIME_SPAN, None).await
    }

    /// Poll the device.
    ///
    /// `last_update` overrides the stored last update time as the since-last-poll window start.
    pub async fn update_with(
        &mut self,
        time_span: u32,
        last_update: Option<DateTime<Utc>>,
    ) -> Result {
        self.update_at(Utc::now(), time_span, last_update).await
    }

    #[instrument(skip_all, fields(name = %self.name, time_span = time_span))]
    pub async fn update_at(
        &mut self,
        now: DateTime<Utc>,
        time_span: u32,
        last_update: Option<DateTime<Utc>>,
    ) -> Result {
        if !self.is_connected && self.connect().await? == Authentication::Required {
            return Err(Error::AuthenticationRequired);
        }

        let since = last_update.or(self.last_update_time);
        let result = Reconciler::new(&self.device, self.integrated_interval)
            .reconcile(&mut self.sensors, time_span, since, now)
            .await;
        match result {
            Ok(Some(end)) => {
                self.last_update_time = Some(end);
                debug!(n_sensors = self.sensors.len(), last_update_time = %end, "updated");
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(Error::AuthenticationRequired) => {
                // Credentials changed on the device, reconnect on the next update.
                self.is_connected = false;
                Err(Error::AuthenticationRequired)
            }
            Err(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use approx::assert_abs_diff_eq;
    use http::StatusCode;

    use super::*;
    use crate::{
        api::transport::testing::ScriptedTransport,
        reconciler::fixtures::{self, CURRENT_PATH, SINCE_LAST_POLL_PATH, SINCE_START_PATH, at},
    };

    type Scripted = Arc<ScriptedTransport>;

    fn iotawatt(transport: &Scripted) -> Iotawatt<Scripted> {
        let config = Config::builder().host("iotawatt").build();
        Iotawatt::with_transport(config, Arc::clone(transport))
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::builder().host("192.168.1.10").build();
        assert_eq!(config.name, "iotawatt");
        assert_eq!(config.integrated_interval, TimeAnchor::StartOfYear);
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert!(config.credentials().is_none());
    }

    #[test]
    fn test_config_credentials() {
        let config = Config::builder().host("iotawatt").username("admin").build();
        let credentials = config.credentials().unwrap();
        assert_eq!(credentials.username, "admin");
        assert_eq!(credentials.password, "");
    }

    #[tokio::test]
    async fn test_first_and_renamed_polls() -> Result {
        let transport = Arc::new(fixtures::transport());
        let mut iotawatt = iotawatt(&transport);

        iotawatt.update_at(fixtures::now(), DEFAULT_TIME_SPAN, None).await?;

        assert_eq!(iotawatt.mac_address(), "A020A6168DAD");
        assert_eq!(iotawatt.last_update_time(), Some(at(12, 34, 30)));
        assert_eq!(iotawatt.sensors().len(), 7);
        assert_eq!(iotawatt.sensors().get("input_1").unwrap().name(), "Main");

        transport
            .ok("/query?show=series", fixtures::SERIES.replace(r#""Main""#, r#""Grid""#))
            .ok(
                "/query?select=[Voltage.volts,Grid.watts,Total.watts]&begin=s-30s&end=s&group=30s",
                "[[120.0, 10.0, 20.0]]",
            )
            .ok(
                "/query?select=[time.iso,Grid.wh,Total.wh]&begin=y&end=s&group=all",
                r#"[["2021-01-01T00:00:00", 1.0, 2.0]]"#,
            )
            .ok(
                "/query?select=[time.iso,Grid.wh.d3,Total.wh.d3]\
                 &begin=2021-05-26T12:34:30Z&end=2021-05-26T12:35:00Z&group=all",
                r#"[["2021-05-26T12:34:30Z", 0.5, 0.75]]"#,
            );
        transport.clear_requests();

        iotawatt.update_at(at(12, 35, 1), DEFAULT_TIME_SPAN, None).await?;

        assert!(!transport.requests().iter().any(|path| path == "/status?wifi=yes"));
        assert_eq!(iotawatt.last_update_time(), Some(at(12, 35, 0)));
        let sensors = iotawatt.sensors();
        assert_eq!(sensors.len(), 7);
        assert_eq!(sensors.get("input_1").unwrap().name(), "Grid");
        assert_eq!(sensors.get("input_1_total_energy").unwrap().name(), "Grid.wh");
        assert_abs_diff_eq!(sensors.get("input_1_energy").unwrap().value.unwrap(), 0.5);
        Ok(())
    }

    #[tokio::test]
    async fn test_authentication_required() -> Result {
        let transport = Arc::new(fixtures::transport());
        transport.respond("/status?wifi=yes", StatusCode::UNAUTHORIZED, "");
        let mut iotawatt = iotawatt(&transport);

        let result = iotawatt.update_at(fixtures::now(), DEFAULT_TIME_SPAN, None).await;
        assert!(matches!(result, Err(Error::AuthenticationRequired)));
        assert!(iotawatt.sensors().is_empty());
        assert_eq!(transport.requests(), ["/status?wifi=yes"]);

        // The next update reconnects.
        transport.ok("/status?wifi=yes", fixtures::WIFI_STATUS);
        iotawatt.update_at(fixtures::now(), DEFAULT_TIME_SPAN, None).await?;
        assert_eq!(iotawatt.sensors().len(), 7);
        Ok(())
    }

    #[tokio::test]
    async fn test_authentication_revoked() -> Result {
        let transport = Arc::new(fixtures::transport());
        let mut iotawatt = iotawatt(&transport);
        iotawatt.update_at(fixtures::now(), DEFAULT_TIME_SPAN, None).await?;

        transport.respond(CURRENT_PATH, StatusCode::UNAUTHORIZED, "");
        let result = iotawatt.update_at(at(12, 35, 1), DEFAULT_TIME_SPAN, None).await;
        assert!(matches!(result, Err(Error::AuthenticationRequired)));

        transport.clear_requests();
        let _ = iotawatt.update_at(at(12, 35, 1), DEFAULT_TIME_SPAN, None).await;
        assert_eq!(transport.requests().first().map(String::as_str), Some("/status?wifi=yes"));
        Ok(())
    }

    #[tokio::test]
    async fn test_failure_keeps_last_update_time() -> Result {
        let transport = Arc::new(fixtures::transport());
        transport.respond(SINCE_LAST_POLL_PATH, StatusCode::SERVICE_UNAVAILABLE, "");
        let mut iotawatt = iotawatt(&transport);

        let result = iotawatt.update_at(fixtures::now(), DEFAULT_TIME_SPAN, None).await;
        assert!(matches!(result, Err(Error::Status { .. })));
        assert_eq!(iotawatt.last_update_time(), None);

        // The retry asks for the very same window.
        transport.ok(SINCE_LAST_POLL_PATH, r#"[["2021-05-26T12:34:00Z", 2.875, 3.25]]"#);
        transport.clear_requests();
        iotawatt.update_at(fixtures::now(), DEFAULT_TIME_SPAN, None).await?;
        assert_eq!(transport.requests().last().map(String::as_str), Some(SINCE_LAST_POLL_PATH));
        assert_eq!(iotawatt.last_update_time(), Some(at(12, 34, 30)));
        Ok(())
    }

    #[tokio::test]
    async fn test_update_too_soon() -> Result {
        let transport = Arc::new(fixtures::transport());
        let mut iotawatt = iotawatt(&transport);
        iotawatt.update_at(fixtures::now(), DEFAULT_TIME_SPAN, None).await?;
        transport.clear_requests();

        iotawatt.update_at(at(12, 34, 59), DEFAULT_TIME_SPAN, None).await?;

        assert_eq!(iotawatt.last_update_time(), Some(at(12, 34, 30)));
        assert_eq!(transport.requests().last().map(String::as_str), Some(SINCE_START_PATH));
        Ok(())
    }

    #[tokio::test]
    async fn test_explicit_last_update() -> Result {
        let transport = Arc::new(fixtures::transport());
        transport.ok(
            "/query?select=[time.iso,Main.wh.d3,Total.wh.d3]\
             &begin=2021-05-26T12:30:00Z&end=2021-05-26T12:34:30Z&group=all",
            r#"[["2021-05-26T12:30:00Z", 40.0, 50.0]]"#,
        );
        let mut iotawatt = iotawatt(&transport);

        iotawatt.update_at(fixtures::now(), DEFAULT_TIME_SPAN, Some(at(12, 30, 0))).await?;

        let sensors = iotawatt.sensors();
        assert_abs_diff_eq!(sensors.get("input_1_energy").unwrap().value.unwrap(), 40.0);
        assert_eq!(
            sensors.get("output_Total_energy").unwrap().period_start,
            Some(at(12, 30, 0).naive_utc())
        );
        assert_eq!(iotawatt.last_update_time(), Some(at(12, 34, 30)));
        Ok(())
    }
}
