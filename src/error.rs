use http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The device requires credentials, or rejected the configured ones.
    #[error("the device requires authentication")]
    AuthenticationRequired,

    #[error("failed to build the HTTP client")]
    Client(#[source] reqwest::Error),

    #[error("failed to request `{url}`")]
    Request {
        url: String,

        #[source]
        source: reqwest::Error,
    },

    #[error("`{url}` responded with {status}")]
    Status { url: String, status: StatusCode },

    #[error("malformed response from `{url}`: {reason}")]
    MalformedResponse { url: String, reason: String },

    #[error("unusable digest challenge: {0}")]
    Digest(String),

    #[error("invalid time anchor `{0}`")]
    InvalidTimeAnchor(String),
}

impl Error {
    pub fn malformed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedResponse { url: url.into(), reason: reason.into() }
    }

    /// Whether the device answered, but with something the client cannot make sense of.
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedResponse { .. })
    }
}
