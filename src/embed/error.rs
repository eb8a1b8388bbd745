//! Error types for the embed layer

use thiserror::Error;

/// Errors raised while intercepting links or populating embeds
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum EmbedError {
    /// Plot data was not valid JSON
    #[error("malformed plot payload from {url}: {source}")]
    MalformedPayload {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// The chart renderer refused the node or its data
    #[error("chart rendering failed: {0}")]
    Chart(String),

    /// A marker pattern in the configuration does not compile
    #[error("invalid marker pattern {pattern:?}: {source}")]
    InvalidMarker {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The link interceptor was installed twice on one renderer
    #[error("link interceptor is already installed")]
    AlreadyInstalled,
}
