//! Error types for the REST client.
//!
//! # Design
//! Builder validation failures are reported by the call that introduced the
//! bad input, so every `with_*` method returns `Result<Self>`. Deserialization
//! failures keep the status code, the raw body and the target type so a caller
//! can diagnose them without fetching the resource again. A missing response
//! or an unregistered status code is never an error.

use http::StatusCode;
use thiserror::Error;

/// Maximum number of characters of the raw response quoted in
/// [`ContentAccessError`] messages.
const CONTENT_PREVIEW_LIMIT: usize = 500;

/// Errors returned by the request/response builders and the client layer.
#[derive(Debug, Error)]
pub enum RestClientError {
    /// A required builder input was empty, whitespace or otherwise unusable.
    #[error("'{name}' {reason}")]
    InvalidArgument { name: &'static str, reason: &'static str },

    /// A request body or query value could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Response content could not be deserialized into the registered type.
    #[error(transparent)]
    Deserialization(#[from] DeserializationError),

    /// Typed content was of a different runtime type than requested.
    #[error(transparent)]
    ContentAccess(#[from] ContentAccessError),

    /// Reading a request or response body failed.
    #[error("body I/O failed: {0}")]
    Body(#[from] std::io::Error),

    /// The underlying HTTP transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The credential provider could not produce a token.
    #[error("credential error: {0}")]
    Credential(String),

    /// A header name or value is not valid HTTP.
    #[error("invalid header '{0}'")]
    InvalidHeader(String),

    /// The request URI could not be resolved against the base address.
    #[error("invalid request uri '{uri}': {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: url::ParseError,
    },
}

impl RestClientError {
    pub(crate) fn blank(name: &'static str) -> Self {
        RestClientError::InvalidArgument {
            name,
            reason: "cannot be null or whitespace",
        }
    }
}

/// Response content did not parse as the type registered for its status code.
#[derive(Debug, Error)]
#[error(
    "failed to deserialize response content to {target_type}: status {} ({}): {source}",
    status.as_u16(),
    status.canonical_reason().unwrap_or("Unknown")
)]
pub struct DeserializationError {
    pub status: StatusCode,
    pub raw_content: String,
    pub target_type: &'static str,
    #[source]
    pub source: serde_json::Error,
}

/// Typed content was requested as a type it does not hold.
#[derive(Debug, Error)]
#[error("{}", self.render())]
pub struct ContentAccessError {
    pub property: String,
    pub expected_status: Option<StatusCode>,
    pub expected_type: &'static str,
    pub actual_status: StatusCode,
    pub actual_type: &'static str,
    /// Raw response text, truncated.
    pub content: String,
}

impl ContentAccessError {
    pub(crate) fn new(
        property: impl Into<String>,
        expected_status: Option<StatusCode>,
        expected_type: &'static str,
        actual_status: StatusCode,
        actual_type: &'static str,
        content: &str,
    ) -> Self {
        Self {
            property: property.into(),
            expected_status,
            expected_type,
            actual_status,
            actual_type,
            content: preview(content),
        }
    }

    fn render(&self) -> String {
        let expected = match self.expected_status {
            Some(status) => format!("status {} with {} content", describe(status), self.expected_type),
            None => format!("{} content", self.expected_type),
        };
        format!(
            "Cannot access {}. Expected {expected}, but got {} with {} content. Response: {}",
            self.property,
            describe(self.actual_status),
            self.actual_type,
            self.content
        )
    }
}

fn describe(status: StatusCode) -> String {
    format!("{} ({})", status.as_u16(), status.canonical_reason().unwrap_or("Unknown"))
}

fn preview(content: &str) -> String {
    match content.char_indices().nth(CONTENT_PREVIEW_LIMIT) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

/// Result type alias using [`RestClientError`].
pub type Result<T> = std::result::Result<T, RestClientError>;
