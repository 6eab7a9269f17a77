//! Error types for the network description layer

use thiserror::Error;

/// Result type for description-layer operations
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors raised while describing or validating a network
#[derive(Error, Debug)]
pub enum ModelError {
    /// Invalid parameter value
    #[error("Invalid parameter {parameter}: {value} (expected {constraint})")]
    InvalidParameter {
        /// Parameter name
        parameter: String,
        /// Invalid value
        value: String,
        /// Constraint description
        constraint: String,
    },

    /// Group not found
    #[error("Group {group_id} not found")]
    GroupNotFound {
        /// Group ID that was not found
        group_id: u16,
    },

    /// Invalid group configuration
    #[error("Invalid group configuration for '{group}': {reason}")]
    InvalidGroup {
        /// Group name
        group: String,
        /// Reason the configuration is invalid
        reason: String,
    },

    /// Invalid connection between groups
    #[error("Invalid connection {pre_group} -> {post_group}: {reason}")]
    InvalidConnection {
        /// Pre-synaptic group id
        pre_group: u16,
        /// Post-synaptic group id
        post_group: u16,
        /// Reason the connection is invalid
        reason: String,
    },
}

impl ModelError {
    /// Create an invalid parameter error
    pub fn invalid_parameter(
        parameter: impl Into<String>,
        value: impl Into<String>,
        constraint: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            value: value.into(),
            constraint: constraint.into(),
        }
    }

    /// Create an invalid group error
    pub fn invalid_group(group: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidGroup {
            group: group.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid connection error
    pub fn invalid_connection(
        pre_group: u16,
        post_group: u16,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidConnection {
            pre_group,
            post_group,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = ModelError::invalid_parameter("a", "0.0", "> 0.0");
        assert!(matches!(err, ModelError::InvalidParameter { .. }));

        let err = ModelError::invalid_group("exc", "empty group");
        assert!(matches!(err, ModelError::InvalidGroup { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = ModelError::GroupNotFound { group_id: 7 };
        assert!(format!("{}", err).contains("Group 7 not found"));

        let err = ModelError::invalid_connection(0, 1, "delay out of range");
        let msg = format!("{}", err);
        assert!(msg.contains("0 -> 1") && msg.contains("delay out of range"));
    }
}
