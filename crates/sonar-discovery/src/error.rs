//! Error types for the discovery engine.
//!
//! Probe failures never show up here: an unreachable or unrecognizable port is
//! a normal [`crate::ProbeOutcome::NotFound`]. These errors cover setup and the
//! scan machinery itself. Configuration problems are reported earlier, as
//! [`crate::ConfigError`], before a service exists.

use sonar_core::RegistryError;
use thiserror::Error;

/// Result type for discovery operations
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// Errors that can occur while setting up or running discovery
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// A record was rejected by the registry
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// The HTTP client could not be built
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// A probe target could not be interpreted
    #[error("Invalid target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    /// A background or blocking task failed to complete
    #[error("Task failed: {message}")]
    TaskFailed { message: String },
}

impl DiscoveryError {
    /// Create an invalid target error
    pub fn invalid_target(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTarget {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Create a task failed error
    pub fn task_failed(message: impl Into<String>) -> Self {
        Self::TaskFailed {
            message: message.into(),
        }
    }
}

impl From<tokio::task::JoinError> for DiscoveryError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::task_failed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DiscoveryError::invalid_target("localhost:abc", "invalid port");
        assert_eq!(
            err.to_string(),
            "Invalid target 'localhost:abc': invalid port"
        );

        let err: DiscoveryError = RegistryError::agent_not_found("localhost:1").into();
        assert!(err.to_string().contains("localhost:1"));
    }
}
