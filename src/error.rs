//! Unified error handling for activity-maps.
//!
//! Rate limiting during a fetch loop is not an error: it surfaces as
//! [`crate::http::ApiResponse::RateLimited`] and is handled by the merge
//! engine. The variants here are the failures that end a run.

use thiserror::Error;

/// Unified error type for sync, persistence and rendering.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// Provider rate limit hit somewhere it cannot be waited out (token exchange)
    #[error("Rate limit exceeded: {context}")]
    RateLimited { context: String },

    /// Transport failure that survived the retry budget
    #[error("{}", format_status("Network error", message, *status_code))]
    Network {
        message: String,
        status_code: Option<u16>,
    },

    /// Provider answered with an error payload (bad credentials, unknown id, ...)
    #[error("{}", format_status("API error", message, *status_code))]
    Api {
        message: String,
        status_code: Option<u16>,
    },

    /// Response or stored row is missing expected fields
    #[error("Malformed response ({context}): {message}")]
    MalformedResponse { context: String, message: String },

    /// Dataset file could not be read or written
    #[error("Persistence error at '{path}': {message}")]
    Persistence { path: String, message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Map output could not be produced
    #[error("Render error: {message}")]
    Render { message: String },
}

fn format_status(prefix: &str, message: &str, status_code: Option<u16>) -> String {
    match status_code {
        Some(code) => format!("{} ({}): {}", prefix, code, message),
        None => format!("{}: {}", prefix, message),
    }
}

impl SyncError {
    /// Shorthand for a malformed response error.
    pub fn malformed(context: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::MalformedResponse {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        SyncError::Config {
            message: message.into(),
        }
    }
}

/// Result type alias for activity-maps operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Extension trait for converting Option to SyncError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a missing-field error.
    fn ok_or_malformed(self, context: &str, field: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_malformed(self, context: &str, field: &str) -> Result<T> {
        self.ok_or_else(|| SyncError::MalformedResponse {
            context: context.to_string(),
            message: format!("missing or invalid field '{}'", field),
        })
    }
}
