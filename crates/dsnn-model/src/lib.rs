//! Network description layer for the dSNN simulation kernel
//!
//! This crate holds everything the kernel needs to know about a network
//! before time starts: neuron groups and their Izhikevich parameters,
//! receptor targets, plasticity and homeostasis configuration, and the
//! synapse-level connection lists the kernel lowers into its dense runtime
//! arrays at setup.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod conductance;
pub mod error;
pub mod group;
pub mod ids;
pub mod network;
pub mod plasticity;

pub use conductance::{ConductanceConfig, SynapseModel};
pub use error::{ModelError, Result};
pub use group::{GroupDesc, GroupType, IzhikevichParams, NeuromodConfig, SpikeCounterConfig};
pub use ids::{ConnId, GroupId, NeuronId};
pub use network::{ConnectionDesc, NetworkBuilder, NetworkDesc, SynapseDesc};
pub use plasticity::{
    EstdpConfig, EstdpCurve, HomeostasisConfig, IstdpConfig, IstdpCurve, StdpType, StpConfig,
};

/// Model crate version for compatibility checking
pub const MODEL_VERSION: u32 = 1;

/// Largest axonal delay supported by the kernel, in milliseconds
pub const MAX_DELAY_MS: u8 = 20;

/// Length of the scheduling window handed to spike sources, in milliseconds
pub const MAX_TIME_SLICE_MS: u32 = 1000;
