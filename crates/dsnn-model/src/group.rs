//! Neuron group descriptions
//!
//! A group is a contiguous range of neurons sharing a type mask and
//! parameters. The type mask combines the group's class (regular vs.
//! Poisson source, excitatory vs. inhibitory) with the receptor channels
//! its outgoing synapses target on post-synaptic neurons.

use core::ops::BitOr;

use crate::error::{ModelError, Result};
use crate::plasticity::{EstdpConfig, HomeostasisConfig, IstdpConfig, StpConfig};
use crate::MAX_TIME_SLICE_MS;

/// Bitmask describing a group's class and the receptors its spikes target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GroupType(pub u32);

impl GroupType {
    /// Spike-source group driven by a rate or generator, never integrated
    pub const POISSON: Self = Self(1 << 0);
    /// Excitatory group
    pub const EXCITATORY: Self = Self(1 << 1);
    /// Inhibitory group
    pub const INHIBITORY: Self = Self(1 << 2);
    /// Outgoing spikes drive AMPA conductances
    pub const TARGET_AMPA: Self = Self(1 << 3);
    /// Outgoing spikes drive NMDA conductances
    pub const TARGET_NMDA: Self = Self(1 << 4);
    /// Outgoing spikes drive GABAa conductances
    pub const TARGET_GABAA: Self = Self(1 << 5);
    /// Outgoing spikes drive GABAb conductances
    pub const TARGET_GABAB: Self = Self(1 << 6);
    /// Outgoing spikes release dopamine into the post-synaptic group
    pub const TARGET_DA: Self = Self(1 << 7);

    /// Standard excitatory neuron: AMPA + NMDA targets
    pub const fn excitatory() -> Self {
        Self(Self::EXCITATORY.0 | Self::TARGET_AMPA.0 | Self::TARGET_NMDA.0)
    }

    /// Standard inhibitory neuron: GABAa + GABAb targets
    pub const fn inhibitory() -> Self {
        Self(Self::INHIBITORY.0 | Self::TARGET_GABAA.0 | Self::TARGET_GABAB.0)
    }

    /// Excitatory Poisson spike source
    pub const fn poisson_excitatory() -> Self {
        Self(Self::POISSON.0 | Self::excitatory().0)
    }

    /// Dopaminergic group: excitatory targets plus dopamine release
    pub const fn dopaminergic() -> Self {
        Self(Self::excitatory().0 | Self::TARGET_DA.0)
    }

    /// Check whether all bits of `other` are set
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether this is a spike-source group
    pub const fn is_poisson(&self) -> bool {
        self.contains(Self::POISSON)
    }

    /// Whether the group is excitatory
    pub const fn is_excitatory(&self) -> bool {
        self.contains(Self::EXCITATORY)
    }

    /// Whether the group is inhibitory
    pub const fn is_inhibitory(&self) -> bool {
        self.contains(Self::INHIBITORY)
    }

    /// Whether outgoing spikes target AMPA receptors
    pub const fn targets_ampa(&self) -> bool {
        self.contains(Self::TARGET_AMPA)
    }

    /// Whether outgoing spikes target NMDA receptors
    pub const fn targets_nmda(&self) -> bool {
        self.contains(Self::TARGET_NMDA)
    }

    /// Whether outgoing spikes target GABAa receptors
    pub const fn targets_gabaa(&self) -> bool {
        self.contains(Self::TARGET_GABAA)
    }

    /// Whether outgoing spikes target GABAb receptors
    pub const fn targets_gabab(&self) -> bool {
        self.contains(Self::TARGET_GABAB)
    }

    /// Whether outgoing spikes release dopamine
    pub const fn is_dopaminergic(&self) -> bool {
        self.contains(Self::TARGET_DA)
    }

    /// Whether any inhibitory receptor is targeted
    pub const fn targets_inhibitory(&self) -> bool {
        self.0 & (Self::TARGET_GABAA.0 | Self::TARGET_GABAB.0) != 0
    }

    /// Whether any excitatory receptor is targeted
    pub const fn targets_excitatory(&self) -> bool {
        self.0 & (Self::TARGET_AMPA.0 | Self::TARGET_NMDA.0) != 0
    }

    /// Validate that the mask is internally consistent
    pub fn validate(&self) -> Result<()> {
        if self.is_excitatory() && self.is_inhibitory() {
            return Err(ModelError::invalid_parameter(
                "group_type",
                format!("{:#x}", self.0),
                "not both EXCITATORY and INHIBITORY",
            ));
        }
        if self.targets_excitatory() && self.targets_inhibitory() {
            return Err(ModelError::invalid_parameter(
                "group_type",
                format!("{:#x}", self.0),
                "excitatory and inhibitory receptor targets are exclusive",
            ));
        }
        if !self.targets_excitatory() && !self.targets_inhibitory() && !self.is_dopaminergic() {
            return Err(ModelError::invalid_parameter(
                "group_type",
                format!("{:#x}", self.0),
                "at least one receptor target",
            ));
        }
        Ok(())
    }
}

impl BitOr for GroupType {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Izhikevich two-variable neuron parameters
///
/// `v' = 0.04 v^2 + 5 v + 140 - u + I`, `u' = a (b v - u)`, with reset
/// `v <- c`, `u <- u + d` on a spike. Optional standard deviations add
/// per-neuron jitter at setup time.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IzhikevichParams {
    /// Recovery time scale
    pub a: f32,
    /// Recovery sensitivity to sub-threshold voltage
    pub b: f32,
    /// Post-spike voltage reset (mV)
    pub c: f32,
    /// Post-spike recovery increment
    pub d: f32,
    /// Standard deviation of `a` across the group
    pub a_sd: f32,
    /// Standard deviation of `b` across the group
    pub b_sd: f32,
    /// Standard deviation of `c` across the group
    pub c_sd: f32,
    /// Standard deviation of `d` across the group
    pub d_sd: f32,
}

impl IzhikevichParams {
    /// Create parameters without jitter, with validation
    pub fn new(a: f32, b: f32, c: f32, d: f32) -> Result<Self> {
        if a <= 0.0 {
            return Err(ModelError::invalid_parameter("a", a.to_string(), "> 0.0"));
        }
        if c >= 30.0 {
            return Err(ModelError::invalid_parameter(
                "c",
                c.to_string(),
                "< 30.0 (spike cutoff)",
            ));
        }
        Ok(Self {
            a,
            b,
            c,
            d,
            a_sd: 0.0,
            b_sd: 0.0,
            c_sd: 0.0,
            d_sd: 0.0,
        })
    }

    /// Add per-neuron standard deviations
    pub fn with_jitter(mut self, a_sd: f32, b_sd: f32, c_sd: f32, d_sd: f32) -> Result<Self> {
        for (name, sd) in [("a_sd", a_sd), ("b_sd", b_sd), ("c_sd", c_sd), ("d_sd", d_sd)] {
            if sd < 0.0 {
                return Err(ModelError::invalid_parameter(name, sd.to_string(), ">= 0.0"));
            }
        }
        self.a_sd = a_sd;
        self.b_sd = b_sd;
        self.c_sd = c_sd;
        self.d_sd = d_sd;
        Ok(self)
    }

    /// Cortical regular-spiking cell (Izhikevich 2003)
    pub const fn regular_spiking() -> Self {
        Self {
            a: 0.02,
            b: 0.2,
            c: -65.0,
            d: 8.0,
            a_sd: 0.0,
            b_sd: 0.0,
            c_sd: 0.0,
            d_sd: 0.0,
        }
    }

    /// Fast-spiking interneuron (Izhikevich 2003)
    pub const fn fast_spiking() -> Self {
        Self {
            a: 0.1,
            b: 0.2,
            c: -65.0,
            d: 2.0,
            a_sd: 0.0,
            b_sd: 0.0,
            c_sd: 0.0,
            d_sd: 0.0,
        }
    }

    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        Self::new(self.a, self.b, self.c, self.d)?
            .with_jitter(self.a_sd, self.b_sd, self.c_sd, self.d_sd)?;
        Ok(())
    }
}

impl Default for IzhikevichParams {
    fn default() -> Self {
        Self::regular_spiking()
    }
}

/// Dopamine baseline and decay for a group
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NeuromodConfig {
    /// Baseline dopamine concentration the level decays toward
    pub base_dp: f32,
    /// Per-ms multiplicative decay applied while above baseline
    pub decay_dp: f32,
}

impl NeuromodConfig {
    /// Create a new neuromodulation config with validation
    pub fn new(base_dp: f32, decay_dp: f32) -> Result<Self> {
        if base_dp < 0.0 {
            return Err(ModelError::invalid_parameter(
                "base_dp",
                base_dp.to_string(),
                ">= 0.0",
            ));
        }
        if !(0.0..1.0).contains(&decay_dp) {
            return Err(ModelError::invalid_parameter(
                "decay_dp",
                decay_dp.to_string(),
                "in [0.0, 1.0)",
            ));
        }
        Ok(Self { base_dp, decay_dp })
    }
}

impl Default for NeuromodConfig {
    fn default() -> Self {
        Self {
            base_dp: 1.0,
            decay_dp: 0.99,
        }
    }
}

/// Per-neuron spike counting over a fixed recording window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpikeCounterConfig {
    /// Window length in ms after which counts reset; `None` counts forever
    pub record_dur_ms: Option<u32>,
}

impl SpikeCounterConfig {
    /// Counter that resets every `record_dur_ms` milliseconds
    pub fn with_record_dur(record_dur_ms: u32) -> Result<Self> {
        if record_dur_ms == 0 {
            return Err(ModelError::invalid_parameter(
                "record_dur_ms",
                "0",
                "> 0",
            ));
        }
        Ok(Self {
            record_dur_ms: Some(record_dur_ms),
        })
    }

    /// Counter that accumulates for the whole run
    pub fn unbounded() -> Self {
        Self { record_dur_ms: None }
    }
}

/// Description of one neuron group
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GroupDesc {
    /// Human-readable name used in diagnostics
    pub name: String,
    /// Number of neurons in the group
    pub size: u32,
    /// Class and receptor-target mask
    pub group_type: GroupType,
    /// Izhikevich parameters (ignored for Poisson groups)
    pub izhikevich: IzhikevichParams,
    /// Short-term plasticity on outgoing synapses, if enabled
    pub stp: Option<StpConfig>,
    /// STDP on excitatory incoming synapses, if enabled
    pub estdp: Option<EstdpConfig>,
    /// STDP on inhibitory incoming synapses, if enabled
    pub istdp: Option<IstdpConfig>,
    /// Homeostatic synaptic scaling, if enabled
    pub homeostasis: Option<HomeostasisConfig>,
    /// Dopamine baseline/decay
    pub neuromod: NeuromodConfig,
    /// Per-neuron spike counter, if attached
    pub spike_counter: Option<SpikeCounterConfig>,
    /// Scheduling window for spike-source groups (ms)
    pub time_slice_ms: u32,
    /// Minimum inter-spike interval for rate-driven sources (ms)
    pub refractory_ms: u32,
}

impl GroupDesc {
    /// Create a group description with defaults for the optional machinery
    pub fn new(name: impl Into<String>, size: u32, group_type: GroupType) -> Self {
        Self {
            name: name.into(),
            size,
            group_type,
            izhikevich: IzhikevichParams::default(),
            stp: None,
            estdp: None,
            istdp: None,
            homeostasis: None,
            neuromod: NeuromodConfig::default(),
            spike_counter: None,
            time_slice_ms: MAX_TIME_SLICE_MS,
            refractory_ms: 1,
        }
    }

    /// Set Izhikevich parameters
    pub fn with_izhikevich(mut self, params: IzhikevichParams) -> Self {
        self.izhikevich = params;
        self
    }

    /// Enable short-term plasticity on outgoing synapses
    pub fn with_stp(mut self, stp: StpConfig) -> Self {
        self.stp = Some(stp);
        self
    }

    /// Enable STDP on excitatory incoming synapses
    pub fn with_estdp(mut self, estdp: EstdpConfig) -> Self {
        self.estdp = Some(estdp);
        self
    }

    /// Enable STDP on inhibitory incoming synapses
    pub fn with_istdp(mut self, istdp: IstdpConfig) -> Self {
        self.istdp = Some(istdp);
        self
    }

    /// Enable homeostatic scaling
    pub fn with_homeostasis(mut self, homeostasis: HomeostasisConfig) -> Self {
        self.homeostasis = Some(homeostasis);
        self
    }

    /// Set dopamine baseline and decay
    pub fn with_neuromod(mut self, neuromod: NeuromodConfig) -> Self {
        self.neuromod = neuromod;
        self
    }

    /// Attach a per-neuron spike counter
    pub fn with_spike_counter(mut self, counter: SpikeCounterConfig) -> Self {
        self.spike_counter = Some(counter);
        self
    }

    /// Set the scheduling window for spike sources
    pub fn with_time_slice(mut self, time_slice_ms: u32) -> Self {
        self.time_slice_ms = time_slice_ms;
        self
    }

    /// Set the refractory period for rate-driven sources
    pub fn with_refractory(mut self, refractory_ms: u32) -> Self {
        self.refractory_ms = refractory_ms;
        self
    }

    /// Whether the group has any STDP configured
    pub fn with_stdp(&self) -> bool {
        self.estdp.is_some() || self.istdp.is_some()
    }

    /// Validate the description
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(ModelError::invalid_group(&self.name, "group size must be > 0"));
        }
        self.group_type.validate()?;
        if !self.group_type.is_poisson() {
            self.izhikevich.validate()?;
        }
        if let Some(stp) = &self.stp {
            stp.validate()?;
        }
        if let Some(estdp) = &self.estdp {
            estdp.validate()?;
        }
        if let Some(istdp) = &self.istdp {
            istdp.validate()?;
        }
        if let Some(homeostasis) = &self.homeostasis {
            homeostasis.validate()?;
            // source groups track their average rate without weight scaling
            if !self.with_stdp() && !self.group_type.is_poisson() {
                return Err(ModelError::invalid_group(
                    &self.name,
                    "homeostasis requires STDP on the same group",
                ));
            }
        }
        if self.group_type.is_poisson() && self.with_stdp() {
            return Err(ModelError::invalid_group(
                &self.name,
                "spike-source groups have no incoming synapses to make plastic",
            ));
        }
        if self.time_slice_ms == 0 || self.time_slice_ms > MAX_TIME_SLICE_MS {
            return Err(ModelError::invalid_parameter(
                "time_slice_ms",
                self.time_slice_ms.to_string(),
                format!("in [1, {}]", MAX_TIME_SLICE_MS),
            ));
        }
        if self.refractory_ms == 0 {
            return Err(ModelError::invalid_parameter("refractory_ms", "0", "> 0"));
        }
        Ok(())
    }
}
