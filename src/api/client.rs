use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use http::{
    StatusCode,
    header::{AUTHORIZATION, WWW_AUTHENTICATE},
};
use reqwest::{Client, Url};

use crate::{
    api::{
        digest::Challenge,
        transport::{Credentials, Response, Transport},
    },
    prelude::*,
};

/// Transport over [`reqwest`], answering Digest challenges when credentials are given.
pub struct HttpTransport(Client);

impl HttpTransport {
    pub fn try_new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("iotawatt/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(Error::Client)?;
        Ok(Self(client))
    }

    async fn send(&self, url: &Url, authorization: Option<String>) -> Result<reqwest::Response> {
        let mut request = self.0.get(url.clone());
        if let Some(authorization) = authorization {
            request = request.header(AUTHORIZATION, authorization);
        }
        request.send().await.map_err(|source| Error::Request { url: url.to_string(), source })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip_all, level = Level::DEBUG, fields(url = url))]
    async fn get(&self, url: &str, credentials: Option<&Credentials>) -> Result<Response> {
        debug!("requesting…");
        let parsed_url =
            Url::parse(url).map_err(|error| Error::malformed(url, format!("invalid URL: {error}")))?;

        let mut response = self.send(&parsed_url, None).await?;
        if let Some(credentials) = credentials
            && response.status() == StatusCode::UNAUTHORIZED
        {
            let challenge = response
                .headers()
                .get(WWW_AUTHENTICATE)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| Error::Digest("no `WWW-Authenticate` header".into()))
                .and_then(Challenge::from_str)?;
            let uri = match parsed_url.query() {
                Some(query) => format!("{}?{query}", parsed_url.path()),
                None => parsed_url.path().to_owned(),
            };
            let authorization = challenge.authorize(credentials, "GET", &uri, &client_nonce(), 1);
            debug!(realm = %challenge.realm, "answering the digest challenge…");
            response = self.send(&parsed_url, Some(authorization)).await?;
        }

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| Error::Request { url: url.to_owned(), source })?;
        debug!(%status, n_bytes = body.len(), "received");
        Ok(Response { url: url.to_owned(), status, body })
    }
}

fn client_nonce() -> String {
    let timestamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let mut nonce = format!("{:x}", md5::compute(timestamp.to_le_bytes()));
    nonce.truncate(16);
    nonce
}
