//! Plasticity configuration: STDP curves, short-term plasticity, homeostasis
//!
//! Curve shapes are tagged variants carrying their own parameters, so the
//! invalid combinations of the classic formulation (timing-based on
//! inhibitory synapses, pulse on excitatory ones) cannot be constructed.

use crate::error::{ModelError, Result};

fn check_positive(name: &str, value: f32) -> Result<()> {
    if value <= 0.0 {
        return Err(ModelError::invalid_parameter(name, value.to_string(), "> 0.0"));
    }
    Ok(())
}

fn check_tau_inv(name: &str, value: f32) -> Result<()> {
    if !(value > 0.0 && value <= 1.0) {
        return Err(ModelError::invalid_parameter(
            name,
            value.to_string(),
            "in (0.0, 1.0]",
        ));
    }
    Ok(())
}

/// STDP curve for excitatory synapses
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EstdpCurve {
    /// Classic double-exponential window
    Exponential {
        /// LTP amplitude at dt = 0
        alpha_plus: f32,
        /// Inverse LTP time constant (1/ms)
        tau_plus_inv: f32,
        /// LTD amplitude at dt = 0
        alpha_minus: f32,
        /// Inverse LTD time constant (1/ms)
        tau_minus_inv: f32,
    },
    /// Timing-based window with a plateau of width `gamma`
    TimingBased {
        /// LTP amplitude at dt = 0
        alpha_plus: f32,
        /// Inverse LTP time constant (1/ms)
        tau_plus_inv: f32,
        /// LTD amplitude at dt = 0
        alpha_minus: f32,
        /// Inverse LTD time constant (1/ms)
        tau_minus_inv: f32,
        /// Plateau width (ms): pairs closer than this potentiate
        gamma: f32,
        /// Constant offset added inside the plateau
        omega: f32,
        /// Scale of the exponential term inside the plateau
        kappa: f32,
    },
}

impl EstdpCurve {
    /// Validate the curve parameters
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Exponential {
                alpha_plus,
                tau_plus_inv,
                alpha_minus,
                tau_minus_inv,
            } => {
                check_positive("alpha_plus", alpha_plus)?;
                check_positive("alpha_minus", alpha_minus)?;
                check_tau_inv("tau_plus_inv", tau_plus_inv)?;
                check_tau_inv("tau_minus_inv", tau_minus_inv)?;
            }
            Self::TimingBased {
                alpha_plus,
                tau_plus_inv,
                alpha_minus,
                tau_minus_inv,
                gamma,
                ..
            } => {
                check_positive("alpha_plus", alpha_plus)?;
                check_positive("alpha_minus", alpha_minus)?;
                check_tau_inv("tau_plus_inv", tau_plus_inv)?;
                check_tau_inv("tau_minus_inv", tau_minus_inv)?;
                check_positive("gamma", gamma)?;
            }
        }
        Ok(())
    }

    /// LTD amplitude and inverse time constant (used at delivery time)
    pub fn minus_branch(&self) -> (f32, f32) {
        match *self {
            Self::Exponential {
                alpha_minus,
                tau_minus_inv,
                ..
            }
            | Self::TimingBased {
                alpha_minus,
                tau_minus_inv,
                ..
            } => (alpha_minus, tau_minus_inv),
        }
    }
}

impl Default for EstdpCurve {
    fn default() -> Self {
        Self::Exponential {
            alpha_plus: 0.001,
            tau_plus_inv: 1.0 / 20.0,
            alpha_minus: 0.0012,
            tau_minus_inv: 1.0 / 20.0,
        }
    }
}

/// STDP curve for inhibitory synapses
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IstdpCurve {
    /// Classic double-exponential window
    Exponential {
        /// Amplitude at dt = 0 of the firing-side window
        alpha_plus: f32,
        /// Inverse time constant of the firing-side window (1/ms)
        tau_plus_inv: f32,
        /// Amplitude at dt = 0 of the delivery-side window
        alpha_minus: f32,
        /// Inverse time constant of the delivery-side window (1/ms)
        tau_minus_inv: f32,
    },
    /// Rectangular pulse window
    Pulse {
        /// LTP step inside the near window
        beta_ltp: f32,
        /// LTD step inside the far window
        beta_ltd: f32,
        /// Near-window width (ms)
        lambda: f32,
        /// Far-window end (ms); must exceed `lambda`
        delta: f32,
    },
}

impl IstdpCurve {
    /// Validate the curve parameters
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Exponential {
                alpha_plus,
                tau_plus_inv,
                alpha_minus,
                tau_minus_inv,
            } => {
                check_positive("alpha_plus", alpha_plus)?;
                check_positive("alpha_minus", alpha_minus)?;
                check_tau_inv("tau_plus_inv", tau_plus_inv)?;
                check_tau_inv("tau_minus_inv", tau_minus_inv)?;
            }
            Self::Pulse {
                beta_ltp,
                beta_ltd,
                lambda,
                delta,
            } => {
                check_positive("beta_ltp", beta_ltp)?;
                check_positive("beta_ltd", beta_ltd)?;
                check_positive("lambda", lambda)?;
                if delta <= lambda {
                    return Err(ModelError::invalid_parameter(
                        "delta",
                        format!("{} (with lambda={})", delta, lambda),
                        "> lambda",
                    ));
                }
            }
        }
        Ok(())
    }
}

impl Default for IstdpCurve {
    fn default() -> Self {
        Self::Pulse {
            beta_ltp: 0.001,
            beta_ltd: 0.0015,
            lambda: 6.0,
            delta: 100.0,
        }
    }
}

/// How accumulated weight derivatives are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StdpType {
    /// Apply derivatives directly
    #[default]
    Standard,
    /// Gate derivatives by the group's current dopamine level
    DaModulated,
}

/// Excitatory STDP configuration for a post-synaptic group
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EstdpConfig {
    /// Curve shape and parameters
    pub curve: EstdpCurve,
    /// Application mode
    pub stdp_type: StdpType,
}

impl EstdpConfig {
    /// Create a new configuration with validation
    pub fn new(curve: EstdpCurve, stdp_type: StdpType) -> Result<Self> {
        curve.validate()?;
        Ok(Self { curve, stdp_type })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.curve.validate()
    }
}

/// Inhibitory STDP configuration for a post-synaptic group
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IstdpConfig {
    /// Curve shape and parameters
    pub curve: IstdpCurve,
    /// Application mode
    pub stdp_type: StdpType,
}

impl IstdpConfig {
    /// Create a new configuration with validation
    pub fn new(curve: IstdpCurve, stdp_type: StdpType) -> Result<Self> {
        curve.validate()?;
        Ok(Self { curve, stdp_type })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.curve.validate()
    }
}

/// Tsodyks-Markram short-term plasticity on a group's outgoing synapses
///
/// `u` facilitates (jumps by `u0 * (1 - u)` on a spike, decays with
/// `tau_u`), `x` depresses (drops by `u * x` on a spike, recovers with
/// `tau_x`). A delivered weight is scaled by `a * u^+ * x^-`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StpConfig {
    /// Overall scale applied to the modulated weight
    pub a: f32,
    /// Utilization increment per spike
    pub u0: f32,
    /// Inverse facilitation time constant (1/ms)
    pub tau_u_inv: f32,
    /// Inverse recovery time constant (1/ms)
    pub tau_x_inv: f32,
}

impl StpConfig {
    /// Create a new configuration with an explicit scale
    pub fn new(a: f32, u0: f32, tau_u_inv: f32, tau_x_inv: f32) -> Result<Self> {
        check_positive("a", a)?;
        if !(u0 > 0.0 && u0 <= 1.0) {
            return Err(ModelError::invalid_parameter(
                "u0",
                u0.to_string(),
                "in (0.0, 1.0]",
            ));
        }
        check_tau_inv("tau_u_inv", tau_u_inv)?;
        check_tau_inv("tau_x_inv", tau_x_inv)?;
        Ok(Self {
            a,
            u0,
            tau_u_inv,
            tau_x_inv,
        })
    }

    /// Create a configuration with `a = 1/u0`, normalizing the first
    /// delivered spike of a rested synapse to the raw weight
    pub fn with_use_fraction(u0: f32, tau_u_inv: f32, tau_x_inv: f32) -> Result<Self> {
        if !(u0 > 0.0 && u0 <= 1.0) {
            return Err(ModelError::invalid_parameter(
                "u0",
                u0.to_string(),
                "in (0.0, 1.0]",
            ));
        }
        Self::new(1.0 / u0, u0, tau_u_inv, tau_x_inv)
    }

    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        Self::new(self.a, self.u0, self.tau_u_inv, self.tau_x_inv)?;
        Ok(())
    }
}

/// Homeostatic synaptic scaling toward a target firing rate
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HomeostasisConfig {
    /// Strength of the homeostatic term in the weight update
    pub scale: f32,
    /// Averaging window for the firing-rate estimate (seconds)
    pub avg_time_scale_s: f32,
    /// Target firing rate (Hz)
    pub base_firing_hz: f32,
    /// Per-neuron standard deviation of the target rate (Hz)
    pub base_firing_sd_hz: f32,
}

impl HomeostasisConfig {
    /// Create a new configuration with validation
    pub fn new(scale: f32, avg_time_scale_s: f32, base_firing_hz: f32) -> Result<Self> {
        check_positive("avg_time_scale_s", avg_time_scale_s)?;
        check_positive("base_firing_hz", base_firing_hz)?;
        if scale < 0.0 {
            return Err(ModelError::invalid_parameter(
                "scale",
                scale.to_string(),
                ">= 0.0",
            ));
        }
        Ok(Self {
            scale,
            avg_time_scale_s,
            base_firing_hz,
            base_firing_sd_hz: 0.0,
        })
    }

    /// Add per-neuron jitter to the target rate
    pub fn with_base_firing_sd(mut self, sd_hz: f32) -> Result<Self> {
        if sd_hz < 0.0 {
            return Err(ModelError::invalid_parameter(
                "base_firing_sd_hz",
                sd_hz.to_string(),
                ">= 0.0",
            ));
        }
        self.base_firing_sd_hz = sd_hz;
        Ok(self)
    }

    /// Per-ms multiplicative decay of the running firing-rate average
    pub fn avg_decay(&self) -> f32 {
        1.0 - 1.0 / (self.avg_time_scale_s * 1000.0)
    }

    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        Self::new(self.scale, self.avg_time_scale_s, self.base_firing_hz)?
            .with_base_firing_sd(self.base_firing_sd_hz)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estdp_curve_validation() {
        assert!(EstdpCurve::default().validate().is_ok());

        let bad = EstdpCurve::Exponential {
            alpha_plus: -0.1,
            tau_plus_inv: 0.05,
            alpha_minus: 0.1,
            tau_minus_inv: 0.05,
        };
        assert!(bad.validate().is_err());

        // tau inverse must stay within one step
        let bad = EstdpCurve::Exponential {
            alpha_plus: 0.1,
            tau_plus_inv: 1.5,
            alpha_minus: 0.1,
            tau_minus_inv: 0.05,
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_istdp_pulse_windows() {
        let ok = IstdpCurve::Pulse {
            beta_ltp: 0.001,
            beta_ltd: 0.0015,
            lambda: 6.0,
            delta: 100.0,
        };
        assert!(ok.validate().is_ok());

        let bad = IstdpCurve::Pulse {
            beta_ltp: 0.001,
            beta_ltd: 0.0015,
            lambda: 100.0,
            delta: 6.0,
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_minus_branch() {
        let curve = EstdpCurve::Exponential {
            alpha_plus: 0.1,
            tau_plus_inv: 0.05,
            alpha_minus: 0.2,
            tau_minus_inv: 0.025,
        };
        assert_eq!(curve.minus_branch(), (0.2, 0.025));
    }

    #[test]
    fn test_stp_config() {
        let stp = StpConfig::with_use_fraction(0.45, 1.0 / 50.0, 1.0 / 750.0).unwrap();
        assert!((stp.a - 1.0 / 0.45).abs() < 1e-6);
        assert!(stp.validate().is_ok());

        assert!(StpConfig::new(1.0, 0.0, 0.1, 0.1).is_err());
        assert!(StpConfig::new(1.0, 0.5, 2.0, 0.1).is_err());
    }

    #[test]
    fn test_homeostasis_decay() {
        let h = HomeostasisConfig::new(0.1, 10.0, 35.0).unwrap();
        let decay = h.avg_decay();
        assert!(decay < 1.0 && decay > 0.999);

        assert!(HomeostasisConfig::new(0.1, 0.0, 35.0).is_err());
        assert!(HomeostasisConfig::new(0.1, 10.0, 0.0).is_err());
    }
}
