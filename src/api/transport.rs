use async_trait::async_trait;
use http::StatusCode;
use serde::de::DeserializeOwned;

use crate::prelude::*;

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials").field("username", &self.username).finish_non_exhaustive()
    }
}

/// Raw device response.
#[must_use]
#[derive(Clone, Debug)]
pub struct Response {
    pub url: String,
    pub status: StatusCode,
    pub body: String,
}

impl Response {
    pub fn error_for_status(self) -> Result<Self> {
        match self.status {
            StatusCode::OK => Ok(self),
            StatusCode::UNAUTHORIZED => Err(Error::AuthenticationRequired),
            status => Err(Error::Status { url: self.url, status }),
        }
    }

    /// Parse the body regardless of the content type: the device says `text/json`.
    pub fn json<R: DeserializeOwned>(&self) -> Result<R> {
        serde_json::from_str(&self.body)
            .map_err(|error| Error::malformed(&self.url, error.to_string()))
    }
}

/// Performs HTTP GET requests on behalf of the device session.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform the request, authenticating when the credentials are given.
    ///
    /// Only the failure to get any response at all is an error here,
    /// statuses are left to the caller.
    async fn get(&self, url: &str, credentials: Option<&Credentials>) -> Result<Response>;
}

#[async_trait]
impl<T: Transport> Transport for std::sync::Arc<T> {
    async fn get(&self, url: &str, credentials: Option<&Credentials>) -> Result<Response> {
        T::get(self, url, credentials).await
    }
}
