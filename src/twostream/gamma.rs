//! Two-stream gamma coefficients (Toon et al. 1989, table 1).

/// Closed-form two-stream approximation applied to a whole run.
///
/// The choice fixes the mapping from (ω, g, μ₀) to the four gamma
/// coefficients and the stream-direction cosine μ₁. It is a configuration
/// choice, applied uniformly across all layers and wavelengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Approximation {
    /// Eddington approximation
    Eddington,
    /// Quadrature approximation
    Quadrature,
    /// Hemispheric-mean approximation. Derived by assuming the phase
    /// function is 1+g in the forward hemisphere and 1−g in the backward
    /// hemisphere; mainly useful at infrared wavelengths.
    HemisphericMean,
}

/// Gamma coefficients for one layer at one wavelength.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Gammas {
    pub gamma1: f64,
    pub gamma2: f64,
    pub gamma3: f64,
    pub gamma4: f64,
}

impl Approximation {
    /// The stream-direction cosine μ₁ for this approximation.
    pub(crate) fn mu_one(self) -> f64 {
        match self {
            Approximation::Eddington | Approximation::HemisphericMean => 0.5,
            Approximation::Quadrature => 1.0 / f64::sqrt(3.0),
        }
    }

    /// Compute the gamma coefficients for a single-scattering albedo `ssa`,
    /// asymmetry parameter `g`, and direct-beam cosine `mu_not`.
    ///
    /// The formulas are defined for all ω ∈ (0,1) and g ∈ (0,1); there are
    /// no error paths here.
    pub(crate) fn gammas(self, ssa: f64, g: f64, mu_not: f64) -> Gammas {
        let sqrt3 = f64::sqrt(3.0);

        let (gamma1, gamma2, gamma3) = match self {
            Approximation::Eddington => (
                (7.0 - ssa * (4.0 + 3.0 * g)) / 4.0,
                -(1.0 - ssa * (4.0 - 3.0 * g)) / 4.0,
                (2.0 - 3.0 * g * mu_not) / 4.0,
            ),
            Approximation::Quadrature => (
                sqrt3 * (2.0 - ssa * (1.0 + g)) / 2.0,
                ssa * sqrt3 * (1.0 - g) / 2.0,
                (1.0 - sqrt3 * g * mu_not) / 2.0,
            ),
            Approximation::HemisphericMean => (
                2.0 - ssa * (1.0 + g),
                ssa * (1.0 - g),
                (1.0 - sqrt3 * g * mu_not) / 2.0,
            ),
        };

        Gammas {
            gamma1,
            gamma2,
            gamma3,
            gamma4: 1.0 - gamma3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn eddington_coefficients() {
        let g = Approximation::Eddington.gammas(0.9, 0.6, 0.5);
        assert_relative_eq!(g.gamma1, (7.0 - 0.9 * 5.8) / 4.0);
        assert_relative_eq!(g.gamma2, -(1.0 - 0.9 * 2.2) / 4.0);
        assert_relative_eq!(g.gamma3, (2.0 - 0.9) / 4.0);
        assert_relative_eq!(Approximation::Eddington.mu_one(), 0.5);
    }

    #[test]
    fn quadrature_coefficients() {
        let sqrt3 = f64::sqrt(3.0);
        let g = Approximation::Quadrature.gammas(0.8, 0.4, 0.7);
        assert_relative_eq!(g.gamma1, sqrt3 * (2.0 - 0.8 * 1.4) / 2.0);
        assert_relative_eq!(g.gamma2, 0.8 * sqrt3 * 0.6 / 2.0);
        assert_relative_eq!(Approximation::Quadrature.mu_one(), 1.0 / sqrt3);
    }

    #[test]
    fn hemispheric_mean_coefficients() {
        let g = Approximation::HemisphericMean.gammas(0.5, 0.3, 1.0);
        assert_relative_eq!(g.gamma1, 2.0 - 0.5 * 1.3);
        assert_relative_eq!(g.gamma2, 0.5 * 0.7);
        assert_relative_eq!(Approximation::HemisphericMean.mu_one(), 0.5);
    }

    #[test]
    fn gamma3_and_gamma4_are_complementary() {
        for approximation in [
            Approximation::Eddington,
            Approximation::Quadrature,
            Approximation::HemisphericMean,
        ] {
            let g = approximation.gammas(0.95, 0.85, 0.64);
            assert_relative_eq!(g.gamma3 + g.gamma4, 1.0);
        }
    }
}
