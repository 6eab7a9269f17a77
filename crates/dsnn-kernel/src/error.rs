//! Error types for the simulation kernel

use thiserror::Error;

/// Result type for kernel operations
pub type Result<T> = std::result::Result<T, KernelError>;

/// Errors that can occur in the simulation kernel
#[derive(Error, Debug)]
pub enum KernelError {
    /// Description-layer error surfaced during setup
    #[error("Model error: {source}")]
    Model {
        #[from]
        /// Source description error
        source: dsnn_model::ModelError,
    },

    /// Invalid kernel configuration
    #[error("Invalid kernel configuration: {reason}")]
    InvalidConfiguration {
        /// Reason for invalid configuration
        reason: String,
    },

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

    /// Rate source does not match the group it drives
    #[error("Rate source for group {group_id} has {rates} rates but the group has {neurons} neurons")]
    RateMismatch {
        /// Group the source was attached to
        group_id: u16,
        /// Number of rates provided
        rates: usize,
        /// Number of neurons in the group
        neurons: usize,
    },

    /// Operation not valid in the kernel's current state
    #[error("Invalid kernel state: {reason}")]
    InvalidState {
        /// Reason the operation is invalid now
        reason: String,
    },

    /// Non-finite voltage detected during integration
    #[error("Numerical error: non-finite voltage for neuron {neuron} at t={time_ms}ms")]
    Numerical {
        /// Neuron whose state diverged
        neuron: u32,
        /// Simulation time in ms
        time_ms: u32,
    },
}

impl KernelError {
    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

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

    /// Create an invalid state error
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }

    /// Create a numerical error
    pub fn numerical(neuron: u32, time_ms: u32) -> Self {
        Self::Numerical { neuron, time_ms }
    }
}
