use http::StatusCode;
use serde::de::DeserializeOwned;

use crate::{
    api::{Credentials, Response, Transport, models::WifiStatus},
    prelude::*,
};

#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Authentication {
    Granted,

    /// The device asks for credentials, none or wrong ones were sent.
    Required,
}

/// Connection state of a single device.
pub struct Device<T> {
    host: String,
    credentials: Option<Credentials>,

    /// Discovered on [`Device::connect`], empty until then.
    mac_address: String,

    transport: T,
}

impl<T: Transport> Device<T> {
    pub fn new(host: impl Into<String>, credentials: Option<Credentials>, transport: T) -> Self {
        Self { host: host.into(), credentials, mac_address: String::new(), transport }
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn mac_address(&self) -> &str {
        &self.mac_address
    }

    /// Test the connection and discover the device MAC address.
    #[instrument(skip_all, fields(host = %self.host))]
    pub async fn connect(&mut self) -> Result<Authentication> {
        let response = self.get("/status?wifi=yes").await?;
        match response.status {
            StatusCode::OK => {
                self.mac_address = response.json::<WifiStatus>()?.mac_address();
                info!(mac_address = %self.mac_address, "connected");
                Ok(Authentication::Granted)
            }
            StatusCode::UNAUTHORIZED => {
                warn!("the device requires authentication");
                Ok(Authentication::Required)
            }
            status => Err(Error::Status { url: response.url, status }),
        }
    }

    #[must_use]
    pub fn url(&self, path_and_query: &str) -> String {
        format!("http://{}{path_and_query}", self.host)
    }

    /// Request the path, authenticating with the stored credentials.
    pub async fn get(&self, path_and_query: &str) -> Result<Response> {
        let url = self.url(path_and_query);
        debug!(%url, "GET");
        self.transport.get(&url, self.credentials.as_ref()).await
    }

    /// Request the path and parse the successful response.
    pub async fn get_json<R: DeserializeOwned>(&self, path_and_query: &str) -> Result<R> {
        self.get(path_and_query).await?.error_for_status()?.json()
    }
}
