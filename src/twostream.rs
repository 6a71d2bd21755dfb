//! Two-stream radiative transfer for a layered snow/ice column.
//!
//! The solver implements the closed-form multi-layer analytic solution of
//! Toon et al. 1989: delta-scaling of the layer optical properties, the
//! two-stream gamma coefficients, a 2N-unknown boundary-value system
//! eliminated with a forward-backward sweep, and energy-conserving flux
//! reconstruction. Every wavelength bin is independent, so the spectral
//! axis is fanned out across a rayon thread pool; the layer axis is
//! inherently sequential.

mod fluxes;
mod gamma;
mod system;


pub use gamma::Approximation;

use log::{debug, info};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rayon::prelude::*;
use smallvec::SmallVec;
use std::f64::consts::PI;
use std::ops::Range;

use crate::error::SolverError;
use fluxes::LayerFluxes;
use gamma::Gammas;
use system::finite_or_zero;

/// Per-layer values at a single wavelength.
pub(crate) type LayerVec = SmallVec<[f64; 8]>;
/// One value per row of the boundary-value system (two rows per layer).
pub(crate) type RowVec = SmallVec<[f64; 16]>;

/// Specific heat capacity of ice in J·kg⁻¹·K⁻¹.
const SPECIFIC_HEAT_ICE: f64 = 2117.0;
/// Spectrally-summed tolerance for the energy-conservation check, in W/m².
const ENERGY_TOLERANCE: f64 = 1e-10;
/// Floor applied to incoming flux spectra so the albedo denominator stays
/// finite in bins with no modeled irradiance.
const FLUX_FLOOR: f64 = 1e-30;

/// Illumination condition for one solve.
///
/// Exactly one of `direct` and `diffuse` is zero for the usual
/// direct-or-diffuse runs; both may be nonzero for additive superposition.
#[derive(Debug, Clone)]
pub struct Illumination {
    /// Direct-beam irradiance per wavelength (Fs).
    pub direct: Array1<f64>,
    /// Diffuse irradiance per wavelength (Fd).
    pub diffuse: Array1<f64>,
    /// Cosine of the solar zenith angle, in (0, 1].
    pub mu_not: f64,
    /// Downwelling solar flux spectrum in W/m², the weighting function for
    /// broadband integration.
    pub flux_solar: Array1<f64>,
}

impl Illumination {
    /// Illumination from arbitrary direct and diffuse irradiance spectra.
    pub fn new(
        direct: Array1<f64>,
        diffuse: Array1<f64>,
        mu_not: f64,
        flux_solar: Array1<f64>,
    ) -> Self {
        Self {
            direct,
            diffuse,
            mu_not,
            flux_solar,
        }
    }

    /// Direct-beam illumination from a downwelling flux spectrum in W/m².
    ///
    /// Non-positive bins are floored at a tiny positive value so the albedo
    /// denominator never vanishes.
    pub fn from_direct_beam(flux: Array1<f64>, mu_not: f64) -> Self {
        let flux = floored(flux);
        let direct = &flux / (mu_not * PI);
        let diffuse = Array1::zeros(flux.len());
        Self {
            direct,
            diffuse,
            mu_not,
            flux_solar: flux,
        }
    }

    /// Diffuse illumination from a downwelling flux spectrum in W/m².
    pub fn from_diffuse(flux: Array1<f64>, mu_not: f64) -> Self {
        let flux = floored(flux);
        let diffuse = &flux / (mu_not * PI);
        let direct = Array1::zeros(flux.len());
        Self {
            direct,
            diffuse,
            mu_not,
            flux_solar: flux,
        }
    }
}

fn floored(flux: Array1<f64>) -> Array1<f64> {
    flux.mapv(|v| if v <= 0.0 { FLUX_FLOOR } else { v })
}

/// A multi-layer column ready for the solver.
///
/// All 2-d arrays are dimensioned `[n_layers, n_wavelengths]` with layer 0
/// at the top of the column. The single-scattering albedo and asymmetry
/// parameter must already be clamped into the open interval (0,1); the
/// [`crate::mixing`] module does this for inputs it produces.
#[derive(Debug, Clone)]
pub struct ColumnInputs {
    /// Optical depth per layer and wavelength, strictly positive.
    pub tau: Array2<f64>,
    /// Single-scattering albedo per layer and wavelength.
    pub ssa: Array2<f64>,
    /// Asymmetry parameter per layer and wavelength.
    pub g: Array2<f64>,
    /// Layer mass in kg/m², used only for heating-rate normalization.
    pub layer_mass: Array1<f64>,
    /// Lambertian reflectance of the underlying substrate, in [0, 1].
    pub substrate_reflectance: f64,
}

/// Per-run solver configuration.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Two-stream approximation, applied uniformly across all layers and
    /// wavelengths.
    pub approximation: Approximation,
    /// Apply the delta-Eddington rescaling of (τ, ω, g) before the
    /// two-stream math.
    pub delta_scaling: bool,
    /// End (exclusive) of the visible band on the wavelength axis.
    pub vis_max_idx: usize,
    /// End (exclusive) of the near-infrared band on the wavelength axis.
    pub nir_max_idx: usize,
    /// Verify the spectrally-summed energy budget after the solve and fail
    /// with [`SolverError::EnergyImbalance`] if it doesn't close.
    pub check_energy_conservation: bool,
}

impl SolverConfig {
    /// Configuration with the energy-conservation check enabled.
    pub fn new(
        approximation: Approximation,
        delta_scaling: bool,
        vis_max_idx: usize,
        nir_max_idx: usize,
    ) -> Self {
        Self {
            approximation,
            delta_scaling,
            vis_max_idx,
            nir_max_idx,
            check_energy_conservation: true,
        }
    }
}

/// Immutable results of one solve.
#[derive(Debug)]
pub struct SolverOutputs {
    /// Hemispheric albedo per wavelength.
    pub albedo: Array1<f64>,
    /// Broadband albedo, weighted by the solar flux spectrum.
    pub bba: f64,
    /// Broadband albedo over the visible band.
    pub bba_vis: f64,
    /// Broadband albedo over the near-infrared band.
    pub bba_nir: f64,
    /// Absorbed flux per layer and wavelength in W/m².
    pub absorbed_flux: Array2<f64>,
    /// Spectrally-integrated absorbed flux per layer in W/m².
    pub layer_absorption: Array1<f64>,
    /// Radiative heating rate per layer in K/hr.
    pub heating_rate: Array1<f64>,
    /// Upward flux at the base of each layer, per wavelength.
    pub flux_up: Array2<f64>,
    /// Downward flux at the base of each layer, per wavelength.
    pub flux_down: Array2<f64>,
    /// Mean intensity at the base of each layer, per wavelength.
    pub intensity: Array2<f64>,
    /// Spectrally-integrated energy absorbed by the substrate in W/m².
    pub substrate_absorption: f64,
    /// Substrate absorption over the visible band.
    pub substrate_absorption_vis: f64,
    /// Substrate absorption over the near-infrared band.
    pub substrate_absorption_nir: f64,
    /// Energy absorbed by the whole column in W/m².
    pub column_absorption: f64,
    /// Flux-weighted column absorption over the visible band.
    pub column_absorption_vis: f64,
    /// Flux-weighted column absorption over the near-infrared band.
    pub column_absorption_nir: f64,
    /// Total incident insolation in W/m².
    pub total_insolation: f64,
}

/// Everything the per-wavelength pipeline produces for one bin.
#[derive(Debug)]
struct WavelengthSolution {
    albedo: f64,
    absorbed: LayerVec,
    fluxes: LayerFluxes,
    residual: f64,
}

/// Solve the two-stream radiative transfer problem for one column.
///
/// Validates the inputs (consistent shapes, positive optical depth, physical
/// scalar ranges), runs the per-wavelength pipeline in parallel across the
/// spectral axis, and assembles the output record. The per-wavelength
/// results are bit-for-bit independent of iteration order.
pub fn solve(
    column: &ColumnInputs,
    illumination: &Illumination,
    config: &SolverConfig,
) -> Result<SolverOutputs, SolverError> {
    let (num_layers, num_wavelengths) = validate(column, illumination, config)?;
    debug!("input shapes are consistent");

    info!(
        "solving {num_layers}-layer column over {num_wavelengths} wavelength bands \
         ({:?}, delta scaling {})",
        config.approximation,
        if config.delta_scaling { "on" } else { "off" }
    );

    let mu_not = illumination.mu_not;
    let substrate_reflectance = column.substrate_reflectance;

    let solutions: Vec<WavelengthSolution> = (0..num_wavelengths)
        .into_par_iter()
        .map(|w| {
            let tau: LayerVec = column.tau.column(w).iter().copied().collect();
            let ssa: LayerVec = column.ssa.column(w).iter().copied().collect();
            let g: LayerVec = column.g.column(w).iter().copied().collect();

            solve_wavelength(
                &tau,
                &ssa,
                &g,
                illumination.direct[w],
                illumination.diffuse[w],
                mu_not,
                substrate_reflectance,
                config,
            )
        })
        .collect();

    if config.check_energy_conservation {
        let net_residual: f64 = solutions.iter().map(|s| s.residual).sum();
        if net_residual.abs() > ENERGY_TOLERANCE {
            let magnitude: f64 = solutions.iter().map(|s| s.residual.abs()).sum();
            return Err(SolverError::EnergyImbalance(magnitude));
        }
    }

    Ok(assemble_outputs(
        &solutions,
        column,
        illumination,
        config,
        num_layers,
        num_wavelengths,
    ))
}

/// Check the input contract before any computation begins.
///
/// Returns `(n_layers, n_wavelengths)` on success.
fn validate(
    column: &ColumnInputs,
    illumination: &Illumination,
    config: &SolverConfig,
) -> Result<(usize, usize), SolverError> {
    let (num_layers, num_wavelengths) = column.tau.dim();
    if num_layers == 0 {
        return Err(SolverError::EmptyColumn);
    }
    if num_wavelengths == 0 {
        return Err(SolverError::InconsistentInputs);
    }

    let two_dims = [column.ssa.dim(), column.g.dim()];
    if two_dims.iter().any(|&d| d != (num_layers, num_wavelengths)) {
        return Err(SolverError::InconsistentInputs);
    }
    if column.layer_mass.len() != num_layers {
        return Err(SolverError::InconsistentInputs);
    }

    let one_dim_wavelengths = [
        illumination.direct.len(),
        illumination.diffuse.len(),
        illumination.flux_solar.len(),
    ];
    if one_dim_wavelengths.iter().any(|&d| d != num_wavelengths) {
        return Err(SolverError::InconsistentInputs);
    }

    if column.tau.iter().any(|&t| !t.is_finite() || t <= 0.0) {
        return Err(SolverError::NonPositiveOpticalDepth);
    }

    if !(illumination.mu_not > 0.0 && illumination.mu_not <= 1.0) {
        return Err(SolverError::InvalidParameter);
    }
    if !(0.0..=1.0).contains(&column.substrate_reflectance) {
        return Err(SolverError::InvalidParameter);
    }

    if config.vis_max_idx == 0
        || config.vis_max_idx > config.nir_max_idx
        || config.nir_max_idx > num_wavelengths
    {
        return Err(SolverError::InvalidBandIndices);
    }

    Ok((num_layers, num_wavelengths))
}

/// The whole pipeline for a single wavelength bin.
#[allow(clippy::too_many_arguments)]
fn solve_wavelength(
    tau: &[f64],
    ssa: &[f64],
    g: &[f64],
    fs: f64,
    fd: f64,
    mu_not: f64,
    substrate_reflectance: f64,
    config: &SolverConfig,
) -> WavelengthSolution {
    let (g_star, ssa_star, tau_star) = delta_transform(g, ssa, tau, config.delta_scaling);
    let tau_clm = cumulative_optical_depth(&tau_star);
    let s_sfc = substrate_source(substrate_reflectance, mu_not, &tau_clm, &tau_star, fs);

    let gammas: SmallVec<[Gammas; 8]> = ssa_star
        .iter()
        .zip(&g_star)
        .map(|(&ssa, &g)| config.approximation.gammas(ssa, g, mu_not))
        .collect();

    let coefficients = system::layer_coefficients(&gammas, &tau_star);
    let sources = system::direct_beam_sources(
        &gammas,
        &coefficients,
        &ssa_star,
        &tau_star,
        &tau_clm,
        fs,
        mu_not,
    );
    let rows = system::assemble_system(&coefficients, &sources, fd, substrate_reflectance, s_sfc);
    let y = system::eliminate(&rows);

    let fluxes = fluxes::reconstruct(
        &y,
        &coefficients,
        &sources,
        &tau_star,
        &tau_clm,
        fs,
        fd,
        mu_not,
        config.approximation.mu_one(),
    );
    let absorbed = fluxes::absorbed(&fluxes.net, fluxes.top_net);
    let residual = fluxes::energy_residual(&fluxes, &absorbed);
    let albedo = fluxes.top_up / fluxes.incident;

    WavelengthSolution {
        albedo,
        absorbed,
        fluxes,
        residual,
    }
}

/// Delta-Eddington rescaling of the layer optical properties.
///
/// Replaces a strongly forward-peaked phase function with a less-peaked
/// equivalent plus a forward-scattered delta term folded into the optical
/// depth. Identity mapping when `enabled` is false; a no-op for isotropic
/// scattering (g = 0) either way.
pub(crate) fn delta_transform(
    g: &[f64],
    ssa: &[f64],
    tau: &[f64],
    enabled: bool,
) -> (LayerVec, LayerVec, LayerVec) {
    if !enabled {
        return (
            g.iter().copied().collect(),
            ssa.iter().copied().collect(),
            tau.iter().copied().collect(),
        );
    }

    let mut g_star: LayerVec = SmallVec::with_capacity(g.len());
    let mut ssa_star: LayerVec = SmallVec::with_capacity(g.len());
    let mut tau_star: LayerVec = SmallVec::with_capacity(g.len());

    for i in 0..g.len() {
        let g_squared = g[i] * g[i];
        g_star.push(g[i] / (1.0 + g[i]));
        ssa_star.push((1.0 - g_squared) * ssa[i] / (1.0 - ssa[i] * g_squared));
        tau_star.push((1.0 - ssa[i] * g_squared) * tau[i]);
    }

    (g_star, ssa_star, tau_star)
}

/// Cumulative optical depth from the top of the column to the top of each
/// layer.
///
/// Anchoring every exponential attenuation term to the single
/// top-of-column origin avoids compounding rounding error from
/// per-layer-relative accumulation.
pub(crate) fn cumulative_optical_depth(tau_star: &[f64]) -> LayerVec {
    let mut tau_clm: LayerVec = SmallVec::with_capacity(tau_star.len());
    tau_clm.push(0.0);
    for i in 1..tau_star.len() {
        tau_clm.push(tau_clm[i - 1] + tau_star[i - 1]);
    }
    tau_clm
}

/// Upward source flux at the bottom boundary: the direct beam surviving
/// transmission through the whole column, reflected by the substrate.
pub(crate) fn substrate_source(
    substrate_reflectance: f64,
    mu_not: f64,
    tau_clm: &[f64],
    tau_star: &[f64],
    fs: f64,
) -> f64 {
    let last = tau_star.len() - 1;
    substrate_reflectance
        * mu_not
        * f64::exp(-(tau_clm[last] + tau_star[last]) / mu_not)
        * PI
        * fs
}

/// Bundle the per-wavelength solutions into the output record.
fn assemble_outputs(
    solutions: &[WavelengthSolution],
    column: &ColumnInputs,
    illumination: &Illumination,
    config: &SolverConfig,
    num_layers: usize,
    num_wavelengths: usize,
) -> SolverOutputs {
    let mut albedo = Array1::zeros(num_wavelengths);
    let mut absorbed_flux = Array2::zeros((num_layers, num_wavelengths));
    let mut flux_up = Array2::zeros((num_layers, num_wavelengths));
    let mut flux_down = Array2::zeros((num_layers, num_wavelengths));
    let mut intensity = Array2::zeros((num_layers, num_wavelengths));
    let mut btm_net = Array1::zeros(num_wavelengths);
    let mut incident = Array1::zeros(num_wavelengths);

    for (w, solution) in solutions.iter().enumerate() {
        albedo[w] = solution.albedo;
        btm_net[w] = solution.fluxes.btm_net;
        incident[w] = solution.fluxes.incident;

        absorbed_flux
            .column_mut(w)
            .assign(&ArrayView1::from(&solution.absorbed[..]));
        flux_up
            .column_mut(w)
            .assign(&ArrayView1::from(&solution.fluxes.up[..]));
        flux_down
            .column_mut(w)
            .assign(&ArrayView1::from(&solution.fluxes.down[..]));
        intensity
            .column_mut(w)
            .assign(&ArrayView1::from(&solution.fluxes.intensity[..]));
    }

    let vis = 0..config.vis_max_idx;
    let nir = config.vis_max_idx..config.nir_max_idx;
    let full = 0..num_wavelengths;
    let weights = &illumination.flux_solar;

    let layer_absorption = absorbed_flux.sum_axis(Axis(1));
    let heating_rate = Array1::from_iter(
        layer_absorption
            .iter()
            .zip(&column.layer_mass)
            .map(|(&absorption, &mass)| absorption / (mass * SPECIFIC_HEAT_ICE) * 3600.0),
    );

    SolverOutputs {
        bba: band_average(weights, &albedo, full),
        bba_vis: band_average(weights, &albedo, vis.clone()),
        bba_nir: band_average(weights, &albedo, nir.clone()),
        column_absorption: absorbed_flux.sum(),
        column_absorption_vis: band_absorption(weights, &albedo, vis.clone()),
        column_absorption_nir: band_absorption(weights, &albedo, nir.clone()),
        substrate_absorption: btm_net.sum(),
        substrate_absorption_vis: btm_net.iter().take(config.vis_max_idx).sum(),
        substrate_absorption_nir: btm_net
            .iter()
            .skip(config.vis_max_idx)
            .take(config.nir_max_idx - config.vis_max_idx)
            .sum(),
        total_insolation: incident.sum(),
        albedo,
        absorbed_flux,
        layer_absorption,
        heating_rate,
        flux_up,
        flux_down,
        intensity,
    }
}

/// Weighted average of `values` over a band, zero when the band carries no
/// weight.
fn band_average(weights: &Array1<f64>, values: &Array1<f64>, band: Range<usize>) -> f64 {
    let length = band.len();
    let weight_sum: f64 = weights.iter().skip(band.start).take(length).sum();
    let weighted_sum: f64 = weights
        .iter()
        .zip(values)
        .skip(band.start)
        .take(length)
        .map(|(&w, &v)| w * v)
        .sum();
    finite_or_zero(weighted_sum / weight_sum)
}

/// Flux-weighted column absorption, `Σ flx·(1 − albedo)`, over a band.
fn band_absorption(weights: &Array1<f64>, albedo: &Array1<f64>, band: Range<usize>) -> f64 {
    weights
        .iter()
        .zip(albedo)
        .skip(band.start)
        .take(band.len())
        .map(|(&w, &a)| w * (1.0 - a))
        .sum()
}
