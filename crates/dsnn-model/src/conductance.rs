//! Receptor channel configuration for conductance-based synapses
//!
//! Conductances decay once per ms by a factor `1 - 1/tau`. NMDA and GABAb
//! can optionally carry a rising phase, in which case the channel is the
//! difference of a decay and a rise trace, normalized so the peak of the
//! bi-exponential equals the delivered weight.

use crate::error::{ModelError, Result};

/// Whether post-synaptic input is a summed current or receptor conductances
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SynapseModel {
    /// Current-based (CUBA): delivered weights sum into a per-ms current
    CurrentBased,
    /// Conductance-based (COBA): delivered weights drive receptor channels
    ConductanceBased(ConductanceConfig),
}

impl SynapseModel {
    /// Conductance-based mode with the standard time constants
    pub fn conductance_defaults() -> Self {
        Self::ConductanceBased(ConductanceConfig::default())
    }

    /// Whether this is conductance-based mode
    pub fn is_conductance(&self) -> bool {
        matches!(self, Self::ConductanceBased(_))
    }
}

/// Derived per-ms update factors for the four receptor channels
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConductanceConfig {
    /// AMPA decay factor per ms
    pub d_ampa: f32,
    /// NMDA rise factor per ms; 1.0 disables the rising phase
    pub r_nmda: f32,
    /// NMDA decay factor per ms
    pub d_nmda: f32,
    /// GABAa decay factor per ms
    pub d_gabaa: f32,
    /// GABAb rise factor per ms; 1.0 disables the rising phase
    pub r_gabab: f32,
    /// GABAb decay factor per ms
    pub d_gabab: f32,
    /// Peak normalization for bi-exponential NMDA
    pub s_nmda: f32,
    /// Peak normalization for bi-exponential GABAb
    pub s_gabab: f32,
    /// Whether NMDA uses a rising trace
    pub nmda_rise: bool,
    /// Whether GABAb uses a rising trace
    pub gabab_rise: bool,
    /// Number of integrator sub-steps per ms
    pub integration_substeps: u32,
}

impl ConductanceConfig {
    /// Build the per-ms factors from receptor time constants in ms
    ///
    /// A rise constant of 0 selects an instantaneous rise for that channel.
    pub fn from_time_constants(
        tau_d_ampa: f32,
        tau_r_nmda: f32,
        tau_d_nmda: f32,
        tau_d_gabaa: f32,
        tau_r_gabab: f32,
        tau_d_gabab: f32,
    ) -> Result<Self> {
        for (name, tau) in [
            ("tau_d_ampa", tau_d_ampa),
            ("tau_d_nmda", tau_d_nmda),
            ("tau_d_gabaa", tau_d_gabaa),
            ("tau_d_gabab", tau_d_gabab),
        ] {
            if tau <= 1.0 {
                return Err(ModelError::invalid_parameter(
                    name,
                    tau.to_string(),
                    "> 1.0 ms",
                ));
            }
        }
        for (name, tau_r, tau_d) in [
            ("tau_r_nmda", tau_r_nmda, tau_d_nmda),
            ("tau_r_gabab", tau_r_gabab, tau_d_gabab),
        ] {
            if tau_r < 0.0 || (tau_r > 0.0 && tau_r <= 1.0) {
                return Err(ModelError::invalid_parameter(
                    name,
                    tau_r.to_string(),
                    "0 (instantaneous) or > 1.0 ms",
                ));
            }
            if tau_r >= tau_d {
                return Err(ModelError::invalid_parameter(
                    name,
                    format!("{} (with decay {})", tau_r, tau_d),
                    "< decay time constant",
                ));
            }
        }

        let nmda_rise = tau_r_nmda > 0.0;
        let gabab_rise = tau_r_gabab > 0.0;

        Ok(Self {
            d_ampa: 1.0 - 1.0 / tau_d_ampa,
            r_nmda: if nmda_rise { 1.0 - 1.0 / tau_r_nmda } else { 1.0 },
            d_nmda: 1.0 - 1.0 / tau_d_nmda,
            d_gabaa: 1.0 - 1.0 / tau_d_gabaa,
            r_gabab: if gabab_rise { 1.0 - 1.0 / tau_r_gabab } else { 1.0 },
            d_gabab: 1.0 - 1.0 / tau_d_gabab,
            s_nmda: if nmda_rise {
                peak_normalization(tau_r_nmda, tau_d_nmda)
            } else {
                1.0
            },
            s_gabab: if gabab_rise {
                peak_normalization(tau_r_gabab, tau_d_gabab)
            } else {
                1.0
            },
            nmda_rise,
            gabab_rise,
            integration_substeps: 2,
        })
    }

    /// Override the number of integrator sub-steps per ms
    pub fn with_substeps(mut self, substeps: u32) -> Result<Self> {
        if substeps == 0 {
            return Err(ModelError::invalid_parameter(
                "integration_substeps",
                "0",
                "> 0",
            ));
        }
        self.integration_substeps = substeps;
        Ok(self)
    }
}

impl Default for ConductanceConfig {
    /// Standard time constants: AMPA 5 ms, NMDA 150 ms, GABAa 6 ms,
    /// GABAb 150 ms, instantaneous rises
    fn default() -> Self {
        Self {
            d_ampa: 1.0 - 1.0 / 5.0,
            r_nmda: 1.0,
            d_nmda: 1.0 - 1.0 / 150.0,
            d_gabaa: 1.0 - 1.0 / 6.0,
            r_gabab: 1.0,
            d_gabab: 1.0 - 1.0 / 150.0,
            s_nmda: 1.0,
            s_gabab: 1.0,
            nmda_rise: false,
            gabab_rise: false,
            integration_substeps: 2,
        }
    }
}

/// Normalize a bi-exponential `exp(-t/tau_d) - exp(-t/tau_r)` so its peak
/// equals 1
fn peak_normalization(tau_r: f32, tau_d: f32) -> f32 {
    let t_max = tau_d * tau_r * (tau_d / tau_r).ln() / (tau_d - tau_r);
    1.0 / ((-t_max / tau_d).exp() - (-t_max / tau_r).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_factors() {
        let cfg = ConductanceConfig::default();
        assert!((cfg.d_ampa - 0.8).abs() < 1e-6);
        assert!((cfg.d_gabaa - (1.0 - 1.0 / 6.0)).abs() < 1e-6);
        assert!(!cfg.nmda_rise && !cfg.gabab_rise);
        assert_eq!(cfg.s_nmda, 1.0);
        assert_eq!(cfg.integration_substeps, 2);
    }

    #[test]
    fn test_rise_enabled() {
        let cfg = ConductanceConfig::from_time_constants(5.0, 10.0, 150.0, 6.0, 0.0, 150.0)
            .unwrap();
        assert!(cfg.nmda_rise);
        assert!((cfg.r_nmda - 0.9).abs() < 1e-6);
        // peak normalization is > 1 (the difference of exponentials peaks below 1)
        assert!(cfg.s_nmda > 1.0);
        assert!(cfg.s_nmda.is_finite());
    }

    #[test]
    fn test_invalid_time_constants() {
        // decay too fast for a 1 ms step
        assert!(ConductanceConfig::from_time_constants(0.5, 0.0, 150.0, 6.0, 0.0, 150.0).is_err());
        // rise must be below decay
        assert!(
            ConductanceConfig::from_time_constants(5.0, 200.0, 150.0, 6.0, 0.0, 150.0).is_err()
        );
        // sub-steps must be positive
        assert!(ConductanceConfig::default().with_substeps(0).is_err());
    }

    #[test]
    fn test_peak_normalization_shape() {
        let s = peak_normalization(10.0, 150.0);
        // evaluating the normalized bi-exponential at its peak gives 1
        let tau_r = 10.0f32;
        let tau_d = 150.0f32;
        let t_max = tau_d * tau_r * (tau_d / tau_r).ln() / (tau_d - tau_r);
        let peak = s * ((-t_max / tau_d).exp() - (-t_max / tau_r).exp());
        assert!((peak - 1.0).abs() < 1e-5);
    }

    proptest! {
        /// Any valid time constants give decay factors in (0, 1) and a
        /// finite positive normalization
        #[test]
        fn derived_factors_stay_in_range(
            tau_d_ampa in 1.5f32..50.0,
            tau_r_nmda in 1.5f32..40.0,
            tau_d_nmda in 50.0f32..400.0,
        ) {
            let cfg = ConductanceConfig::from_time_constants(
                tau_d_ampa, tau_r_nmda, tau_d_nmda, 6.0, 0.0, 150.0,
            ).unwrap();
            prop_assert!(cfg.d_ampa > 0.0 && cfg.d_ampa < 1.0);
            prop_assert!(cfg.r_nmda > 0.0 && cfg.r_nmda < 1.0);
            prop_assert!(cfg.d_nmda > 0.0 && cfg.d_nmda < 1.0);
            prop_assert!(cfg.s_nmda.is_finite() && cfg.s_nmda > 0.0);
        }
    }
}
