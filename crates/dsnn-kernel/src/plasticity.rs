//! STDP curve evaluation
//!
//! Pure functions mapping a spike-timing difference to a weight-derivative
//! increment. Amplitudes in the configuration are positive; the sign of
//! each increment is applied here. Inhibitory weights are stored negative
//! and every inhibitory branch subtracts its amplitude, so both windows
//! push the weight further from zero.
//!
//! Callers gate on the timing difference: post-firing updates require
//! `dt > 0`, delivery-time updates require `dt >= 0`.

use dsnn_model::{EstdpCurve, IstdpCurve};

/// Exponential windows are cut off once `dt / tau` reaches this bound
pub const STDP_EXP_CUTOFF: f32 = 25.0;

fn stdp_exp(alpha: f32, tau_inv: f32, dt: f32) -> f32 {
    if dt * tau_inv < STDP_EXP_CUTOFF {
        alpha * (-dt * tau_inv).exp()
    } else {
        0.0
    }
}

/// Potentiation of an excitatory synapse when the post neuron fires `dt` ms
/// after the last pre-synaptic delivery
pub fn estdp_ltp(curve: EstdpCurve, dt: f32) -> f32 {
    match curve {
        EstdpCurve::Exponential {
            alpha_plus,
            tau_plus_inv,
            ..
        } => stdp_exp(alpha_plus, tau_plus_inv, dt),
        EstdpCurve::TimingBased {
            alpha_plus,
            tau_plus_inv,
            gamma,
            omega,
            kappa,
            ..
        } => {
            if dt * tau_plus_inv >= STDP_EXP_CUTOFF {
                0.0
            } else if dt <= gamma {
                omega + kappa * alpha_plus * (-dt * tau_plus_inv).exp()
            } else {
                -alpha_plus * (-dt * tau_plus_inv).exp()
            }
        }
    }
}

/// Depression of an excitatory synapse when a pre-synaptic spike arrives
/// `dt` ms after the post neuron fired
pub fn estdp_ltd(curve: EstdpCurve, dt: f32) -> f32 {
    let (alpha_minus, tau_minus_inv) = curve.minus_branch();
    -stdp_exp(alpha_minus, tau_minus_inv, dt)
}

/// Inhibitory update when the post neuron fires `dt` ms after a delivery
pub fn istdp_ltp(curve: IstdpCurve, dt: f32) -> f32 {
    match curve {
        IstdpCurve::Exponential {
            alpha_plus,
            tau_plus_inv,
            ..
        } => -stdp_exp(alpha_plus, tau_plus_inv, dt),
        IstdpCurve::Pulse { .. } => istdp_pulse(curve, dt),
    }
}

/// Inhibitory update when a delivery arrives `dt` ms after the post neuron
/// fired
pub fn istdp_ltd(curve: IstdpCurve, dt: f32) -> f32 {
    match curve {
        IstdpCurve::Exponential {
            alpha_minus,
            tau_minus_inv,
            ..
        } => -stdp_exp(alpha_minus, tau_minus_inv, dt),
        IstdpCurve::Pulse { .. } => istdp_pulse(curve, dt),
    }
}

fn istdp_pulse(curve: IstdpCurve, dt: f32) -> f32 {
    match curve {
        IstdpCurve::Pulse {
            beta_ltp,
            beta_ltd,
            lambda,
            delta,
        } => {
            if dt <= lambda {
                -beta_ltp
            } else if dt <= delta {
                -beta_ltd
            } else {
                0.0
            }
        }
        IstdpCurve::Exponential { .. } => 0.0,
    }
}
