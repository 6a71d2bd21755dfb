//! Error type shared by the solver and the mixing stage.

/// Possible solver errors.
#[derive(Debug)]
pub enum SolverError {
    /// The inputs don't have the expected shape(s)
    InconsistentInputs,
    /// The column contains no layers
    EmptyColumn,
    /// An optical-depth value is non-positive or non-finite
    NonPositiveOpticalDepth,
    /// The VIS/NIR band indices don't fit on the wavelength axis
    InvalidBandIndices,
    /// A scalar parameter is outside its physical range
    InvalidParameter,
    /// The spectrally-summed energy budget doesn't close; the payload is
    /// the magnitude of the imbalance in W/m²
    EnergyImbalance(f64),
}

impl std::fmt::Display for SolverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolverError::InconsistentInputs => {
                write!(f, "inputs to the solver have the wrong shape")
            }
            SolverError::EmptyColumn => {
                write!(f, "the column has no layers")
            }
            SolverError::NonPositiveOpticalDepth => {
                write!(f, "optical depth must be positive and finite in every layer")
            }
            SolverError::InvalidBandIndices => {
                write!(f, "VIS/NIR band indices don't fit on the wavelength axis")
            }
            SolverError::InvalidParameter => {
                write!(f, "scalar parameter outside its physical range")
            }
            SolverError::EnergyImbalance(magnitude) => {
                write!(f, "conservation of energy violated by {magnitude} W/m^2")
            }
        }
    }
}

impl std::error::Error for SolverError {}
