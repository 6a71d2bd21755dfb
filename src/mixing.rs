//! Effective layer optical properties for an ice/impurity mixture.
//!
//! Combines per-layer ice optical properties with the optical properties
//! and mass concentrations of light-absorbing impurities into the
//! effective (τ, ω, g) arrays the solver consumes. Each component
//! contributes in proportion to its optical depth (ω) or its ω-weighted
//! optical depth (g).

use log::debug;
use ndarray::{Array1, Array2};

use crate::error::SolverError;
use crate::twostream::ColumnInputs;

/// Clamp bounds keeping ω inside the open interval (0,1).
const SSA_MIN: f64 = 1e-8;
const SSA_MAX: f64 = 0.99999999;
/// Clamp bounds keeping g inside the open interval (0,1).
const G_MIN: f64 = 1e-5;
const G_MAX: f64 = 0.99999;

/// Optical properties of the ice matrix, dimensioned
/// `[n_layers, n_wavelengths]`.
#[derive(Debug, Clone)]
pub struct IceOptics {
    /// Mass extinction coefficient in m²/kg.
    pub mac: Array2<f64>,
    /// Single-scattering albedo.
    pub ssa: Array2<f64>,
    /// Asymmetry parameter.
    pub g: Array2<f64>,
}

/// Optical properties of the impurity species, dimensioned
/// `[n_impurities, n_wavelengths]`.
#[derive(Debug, Clone)]
pub struct ImpurityOptics {
    /// Mass extinction coefficient in m²/kg.
    pub mac: Array2<f64>,
    /// Single-scattering albedo.
    pub ssa: Array2<f64>,
    /// Asymmetry parameter.
    pub g: Array2<f64>,
}

/// Mix ice and impurity optical properties into a solver-ready column.
///
/// `concentrations` holds the impurity mass mixing ratio in kg/kg per
/// `[layer, impurity]`; `density` (kg/m³) and `thickness` (m) fix the layer
/// mass. The impurity mass is deducted from the ice mass of its layer
/// (generally a tiny correction). The effective ω and g are clamped into
/// (0,1) before the column is returned, which is the caller-side clamping
/// the solver's input contract requires.
pub fn mix_layer_optics(
    ice: &IceOptics,
    impurities: &ImpurityOptics,
    concentrations: &Array2<f64>,
    density: &Array1<f64>,
    thickness: &Array1<f64>,
    substrate_reflectance: f64,
) -> Result<ColumnInputs, SolverError> {
    let (num_layers, num_wavelengths) = ice.mac.dim();
    let num_impurities = impurities.mac.nrows();

    if num_layers == 0 {
        return Err(SolverError::EmptyColumn);
    }
    let ice_dims = [ice.ssa.dim(), ice.g.dim()];
    if ice_dims.iter().any(|&d| d != (num_layers, num_wavelengths)) {
        return Err(SolverError::InconsistentInputs);
    }
    let impurity_dims = [impurities.mac.dim(), impurities.ssa.dim(), impurities.g.dim()];
    if impurity_dims
        .iter()
        .any(|&d| d != (num_impurities, num_wavelengths))
    {
        return Err(SolverError::InconsistentInputs);
    }
    if concentrations.dim() != (num_layers, num_impurities)
        || density.len() != num_layers
        || thickness.len() != num_layers
    {
        return Err(SolverError::InconsistentInputs);
    }
    if density
        .iter()
        .chain(thickness.iter())
        .any(|&v| !v.is_finite() || v <= 0.0)
    {
        return Err(SolverError::InvalidParameter);
    }

    debug!(
        "mixing {num_impurities} impurity species into a {num_layers}-layer column \
         over {num_wavelengths} wavelength bands"
    );

    let mut tau = Array2::zeros((num_layers, num_wavelengths));
    let mut ssa = Array2::zeros((num_layers, num_wavelengths));
    let mut g = Array2::zeros((num_layers, num_wavelengths));
    let mut layer_mass = Array1::zeros(num_layers);

    for i in 0..num_layers {
        let mut ice_mass = density[i] * thickness[i];

        let mut tau_sum = vec![0.0; num_wavelengths];
        let mut ssa_sum = vec![0.0; num_wavelengths];
        let mut g_sum = vec![0.0; num_wavelengths];

        for j in 0..num_impurities {
            // kg/m² of this impurity in this layer
            let impurity_load = ice_mass * concentrations[[i, j]];
            for w in 0..num_wavelengths {
                let tau_impurity = impurity_load * impurities.mac[[j, w]];
                tau_sum[w] += tau_impurity;
                ssa_sum[w] += tau_impurity * impurities.ssa[[j, w]];
                g_sum[w] += tau_impurity * impurities.ssa[[j, w]] * impurities.g[[j, w]];
            }
            ice_mass -= impurity_load;
        }

        layer_mass[i] = ice_mass;
        for w in 0..num_wavelengths {
            let tau_ice = ice_mass * ice.mac[[i, w]];
            let tau_total = tau_sum[w] + tau_ice;
            tau[[i, w]] = tau_total;
            ssa[[i, w]] = (ssa_sum[w] + ice.ssa[[i, w]] * tau_ice) / tau_total;
            g[[i, w]] = (g_sum[w] + ice.g[[i, w]] * ice.ssa[[i, w]] * tau_ice)
                / (tau_total * ssa[[i, w]]);
        }
    }

    clamp_optical_properties(&mut ssa, &mut g);

    Ok(ColumnInputs {
        tau,
        ssa,
        g,
        layer_mass,
        substrate_reflectance,
    })
}

/// Clamp ω and g into the open interval (0,1).
///
/// Values at or beyond the limits are singular for the two-stream closure
/// (λ vanishes at ω = 1, the delta transform degenerates at g = 1), so the
/// solver's input contract requires this before a solve.
pub fn clamp_optical_properties(ssa: &mut Array2<f64>, g: &mut Array2<f64>) {
    ssa.mapv_inplace(|v| v.clamp(SSA_MIN, SSA_MAX));
    g.mapv_inplace(|v| v.clamp(G_MIN, G_MAX));
}
