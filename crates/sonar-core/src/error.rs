//! Registry error types.

use thiserror::Error;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors that can occur when mutating the registry
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No record is stored under this id
    #[error("Agent not found: {agent_id}")]
    AgentNotFound { agent_id: String },

    /// The record's id does not match its host and port
    #[error("Invalid agent record {agent_id}: {reason}")]
    InvalidRecord { agent_id: String, reason: String },
}

impl RegistryError {
    /// Create an agent not found error
    pub fn agent_not_found(agent_id: impl Into<String>) -> Self {
        Self::AgentNotFound {
            agent_id: agent_id.into(),
        }
    }

    /// Create an invalid record error
    pub fn invalid_record(agent_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            agent_id: agent_id.into(),
            reason: reason.into(),
        }
    }

    /// Get the error code suitable for logging or reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            RegistryError::AgentNotFound { .. } => "AGENT_NOT_FOUND",
            RegistryError::InvalidRecord { .. } => "INVALID_RECORD",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = RegistryError::agent_not_found("localhost:4321");
        assert!(matches!(err, RegistryError::AgentNotFound { .. }));
        assert_eq!(err.to_string(), "Agent not found: localhost:4321");
        assert_eq!(err.error_code(), "AGENT_NOT_FOUND");
    }
}
