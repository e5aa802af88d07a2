//! Unified error handling for the location core.
//!
//! Every failure mode here degrades to "try again on the next trigger":
//! callers log the error locally and no error crosses the event-handler
//! boundary back to the platform.

use thiserror::Error;

/// Unified error type for location tracking operations.
#[derive(Debug, Clone, Error)]
pub enum TrackingError {
    /// A required permission is missing. The operation is skipped, not retried.
    #[error("required permission missing for sensor '{0}'")]
    PermissionDenied(&'static str),

    /// Hub unreachable or returned an error response. Implicitly retried on
    /// the next natural trigger.
    #[error("hub request failed: {0}")]
    Network(String),

    /// The platform silently stopped delivering updates; detected via
    /// timestamp comparison and resolved by re-registration.
    #[error("platform stopped delivering updates for '{0}'")]
    StaleRegistration(&'static str),

    /// Malformed or errored callback from the geofencing/location facility.
    #[error("invalid platform event: {0}")]
    InvalidPlatformEvent(String),

    /// Bad or inconsistent configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type alias for location tracking operations.
pub type Result<T> = std::result::Result<T, TrackingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TrackingError::PermissionDenied("location_background");
        assert!(err.to_string().contains("location_background"));

        let err = TrackingError::Network("connection refused".to_string());
        assert!(err.to_string().contains("connection refused"));
    }
}
