//! Spectral and broadband albedo of a layered snow/ice column.
//!
//! Given per-layer, per-wavelength optical properties (optical depth,
//! single-scattering albedo, asymmetry parameter) and an illumination
//! condition, the [`twostream`] module computes upward/downward radiative
//! fluxes, the energy absorbed in each layer, and spectral plus broadband
//! albedo using the closed-form multi-layer two-stream solution of Toon et
//! al. 1989. The [`mixing`] module builds the effective layer optical
//! properties from ice and impurity components.
//!
//! Each solve is a pure function of its inputs: no I/O, no state shared
//! between calls. The spectral axis is processed in parallel; results are
//! independent of iteration order.
//!
//! ```
//! use ndarray::array;
//! use snowpack_rtm::{solve, Approximation, ColumnInputs, Illumination, SolverConfig};
//!
//! # fn main() -> Result<(), snowpack_rtm::SolverError> {
//! // A dirty snow layer over clean ice, at a single wavelength bin
//! let column = ColumnInputs {
//!     tau: array![[5.0], [50.0]],
//!     ssa: array![[0.99], [0.999]],
//!     g: array![[0.85], [0.89]],
//!     layer_mass: array![10.0, 500.0],
//!     substrate_reflectance: 0.0,
//! };
//! let illumination = Illumination::from_direct_beam(array![1.0], 50_f64.to_radians().cos());
//! let config = SolverConfig::new(Approximation::Eddington, true, 1, 1);
//!
//! let outputs = solve(&column, &illumination, &config)?;
//! assert!(outputs.albedo[0] > 0.0 && outputs.albedo[0] < 1.0);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod mixing;
pub mod twostream;

pub use error::SolverError;
pub use twostream::{
    solve, Approximation, ColumnInputs, Illumination, SolverConfig, SolverOutputs,
};
