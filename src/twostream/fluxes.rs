//! Flux and energy reconstruction from the solved stream unknowns.
//!
//! Everything here operates on the per-layer values for a single
//! wavelength; equation numbers refer to Toon et al. 1989.

use smallvec::smallvec;
use std::f64::consts::PI;

use super::system::{DirectBeamSources, LayerCoefficients};
use super::{LayerVec, RowVec};

/// Reconstructed fluxes for one wavelength.
#[derive(Debug)]
pub(crate) struct LayerFluxes {
    /// Direct-beam flux surviving to the base of each layer (eq 50).
    pub direct: LayerVec,
    /// Net flux (upward minus downward) at the base of each layer (eq 48).
    pub net: LayerVec,
    /// Upward flux at the base of each layer (eq 31).
    pub up: LayerVec,
    /// Downward flux at the base of each layer, direct beam included (eq 32).
    pub down: LayerVec,
    /// Mean intensity at the base of each layer (eq 49).
    pub intensity: LayerVec,
    /// Upward flux at the upper boundary of the column (eq 31 at τ = 0).
    pub top_up: f64,
    /// Net flux at the upper boundary, `top_up` minus the incident flux.
    pub top_net: f64,
    /// Net flux into the substrate, the bulk transmission through the column.
    pub btm_net: f64,
    /// Total incident flux, `μ₀·π·Fs + Fd`.
    pub incident: f64,
}

/// Reconstruct all fluxes from the stream unknowns `y` and the layer-level
/// coefficients.
///
/// The net flux at the top of the column is fixed here, before any flux
/// divergence is taken, so that the energy budget closes identically.
#[allow(clippy::too_many_arguments)]
pub(crate) fn reconstruct(
    y: &RowVec,
    coefficients: &LayerCoefficients,
    sources: &DirectBeamSources,
    tau_star: &[f64],
    tau_clm: &[f64],
    fs: f64,
    fd: f64,
    mu_not: f64,
    mu_one: f64,
) -> LayerFluxes {
    let num_layers = tau_star.len();
    let LayerCoefficients {
        lam,
        big_gamma,
        e1,
        e2,
        e3,
        e4,
    } = coefficients;

    let mut fluxes = LayerFluxes {
        direct: smallvec![0.0; num_layers],
        net: smallvec![0.0; num_layers],
        up: smallvec![0.0; num_layers],
        down: smallvec![0.0; num_layers],
        intensity: smallvec![0.0; num_layers],
        top_up: 0.0,
        top_net: 0.0,
        btm_net: 0.0,
        incident: mu_not * PI * fs + fd,
    };

    for i in 0..num_layers {
        let attenuation = f64::exp(-lam[i] * tau_star[i]);

        // Direct beam at the base of the layer (eq 50)
        let direct = mu_not * PI * fs * f64::exp(-(tau_clm[i] + tau_star[i]) / mu_not);
        fluxes.direct[i] = direct;

        // Net flux at the base of the layer (eq 48)
        fluxes.net[i] = y[2 * i] * (e1[i] - e3[i]) + y[2 * i + 1] * (e2[i] - e4[i])
            + sources.pls_btm[i]
            - sources.mns_btm[i]
            - direct;

        // Mean intensity at the base of the layer (eq 49)
        fluxes.intensity[i] = ((y[2 * i] * (e1[i] + e3[i])
            + y[2 * i + 1] * (e2[i] + e4[i])
            + sources.pls_btm[i]
            + sources.mns_btm[i])
            / mu_one
            + direct / mu_not)
            / (4.0 * PI);

        // Interface fluxes at the base of the layer (eqs 31 and 32)
        fluxes.up[i] = y[2 * i] * (1.0 + big_gamma[i] * attenuation)
            + y[2 * i + 1] * (1.0 - big_gamma[i] * attenuation)
            + sources.pls_btm[i];
        fluxes.down[i] = y[2 * i] * (big_gamma[i] + attenuation)
            + y[2 * i + 1] * (big_gamma[i] - attenuation)
            + sources.mns_btm[i]
            + direct;
    }

    // Upward flux at the upper boundary (eq 31 evaluated at the top of
    // layer 0)
    let top_attenuation = f64::exp(-lam[0] * tau_star[0]);
    fluxes.top_up = y[0] * (top_attenuation + big_gamma[0])
        + y[1] * (top_attenuation - big_gamma[0])
        + sources.pls_top[0];

    fluxes.top_net = fluxes.top_up - fluxes.incident;
    fluxes.btm_net = -fluxes.net[num_layers - 1];

    fluxes
}

/// Absorbed flux per layer as the discrete divergence of net flux down the
/// column, the discretized form of energy conservation.
pub(crate) fn absorbed(net: &[f64], top_net: f64) -> LayerVec {
    let mut absorbed: LayerVec = smallvec![0.0; net.len()];
    absorbed[0] = net[0] - top_net;
    for i in 1..net.len() {
        absorbed[i] = net[i] - net[i - 1];
    }
    absorbed
}

/// Energy not accounted for at this wavelength: incident minus
/// (absorbed + transmitted + reflected). Summed over the spectrum this
/// must vanish to rounding.
pub(crate) fn energy_residual(fluxes: &LayerFluxes, absorbed: &[f64]) -> f64 {
    let total_absorbed: f64 = absorbed.iter().sum();
    fluxes.incident - (total_absorbed + fluxes.btm_net + fluxes.top_up)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use smallvec::SmallVec;

    #[test]
    fn absorbed_flux_telescopes_to_the_boundary_difference() {
        let net = [-3.0, -2.5, -2.2];
        let top_net = -4.0;
        let f_abs = absorbed(&net, top_net);

        assert_relative_eq!(f_abs[0], 1.0);
        assert_relative_eq!(f_abs[1], 0.5);
        assert_relative_eq!(f_abs[2], 0.3);
        // Telescoping sum equals net[last] - top_net
        assert_relative_eq!(f_abs.iter().sum::<f64>(), net[2] - top_net);
    }

    #[test]
    fn residual_vanishes_when_the_budget_closes() {
        let fluxes = LayerFluxes {
            direct: SmallVec::new(),
            net: SmallVec::new(),
            up: SmallVec::new(),
            down: SmallVec::new(),
            intensity: SmallVec::new(),
            top_up: 0.4,
            top_net: -0.6,
            btm_net: 0.3,
            incident: 1.0,
        };
        // absorbed + transmitted + reflected == incident
        let absorbed = [0.2, 0.1];
        assert_relative_eq!(energy_residual(&fluxes, &absorbed), 0.0);
    }
}
