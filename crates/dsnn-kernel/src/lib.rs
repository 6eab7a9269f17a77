//! Per-timestep Izhikevich SNN simulation kernel
//!
//! This crate advances large spiking networks in 1 ms steps: membrane
//! integration (current- or conductance-based), threshold detection,
//! delayed spike delivery through a CSR connectivity graph with short-term
//! plasticity, STDP derivative accumulation with optional dopamine gating
//! and homeostatic scaling, and a bounded weight-update phase on a
//! separate cadence.
//!
//! Networks are described declaratively with [`dsnn_model`] and lowered
//! into dense runtime arrays at [`Kernel::setup`]. The driver calls
//! [`Kernel::step`] exactly 1000 times per simulated second, then
//! [`Kernel::shift_spike_tables`], and [`Kernel::update_weights`] on its
//! chosen weight cadence.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod error;
pub mod generator;
pub mod kernel;
pub mod plasticity;
pub mod spikebuf;
pub mod tables;

pub use context::{DelayInfo, GroupRuntime, RuntimeContext, SynInfo};
pub use error::{KernelError, Result};
pub use generator::{PoissonRateSource, ReplaySource, SpikeGenerator};
pub use kernel::{Kernel, KernelConfig};
pub use spikebuf::PropagatedSpikeBuffer;
pub use tables::FiringTables;

// Re-export the description layer for downstream convenience
pub use dsnn_model as model;

/// Kernel crate version for compatibility checking
pub const KERNEL_VERSION: u32 = 1;

/// Sentinel for "has never spiked / never been delivered"
pub const MAX_SIMULATION_TIME: u32 = u32::MAX;
