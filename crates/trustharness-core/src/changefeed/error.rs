//! Change-feed error types.

use thiserror::Error;

/// Errors from the token exchange and change-feed queries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ChangeFeedError {
    /// The request never produced an HTTP response.
    #[error("request to {url} failed: {message}")]
    Transport {
        /// Requested URL (without credentials).
        url: String,
        /// Transport error message.
        message: String,
    },

    /// The server answered with a non-success status.
    #[error("{url} returned HTTP {status}: {body}")]
    HttpStatus {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnosis.
        body: String,
    },

    /// A required response field was absent.
    #[error("response is missing the `{field}` field")]
    MissingField {
        /// Field name.
        field: &'static str,
    },

    /// The response body could not be decoded.
    #[error("failed to decode response: {message}")]
    Decode {
        /// Decoder message.
        message: String,
    },

    /// A request parameter was rejected before sending.
    #[error("invalid input for field {field}: {reason}")]
    InvalidInput {
        /// The field name.
        field: String,
        /// The reason it is invalid.
        reason: String,
    },

    /// The feed did not reach the expected record count in time.
    #[error("change feed still has {observed} records after {waited_secs}s, expected {expected}")]
    SettleTimeout {
        /// Count that was waited for.
        expected: usize,
        /// Last observed count.
        observed: usize,
        /// How long the probe waited.
        waited_secs: u64,
    },
}

impl ChangeFeedError {
    /// Returns `true` for failures to reach the server at all.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}
