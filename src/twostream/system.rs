//! Boundary-value system for the multi-layer two-stream solution.
//!
//! Builds the per-layer matrix coefficients (Toon et al. 1989, eqs 21–22
//! and 44), the direct-beam particular solutions (eqs 23–24), and performs
//! the near-tridiagonal elimination over the 2N stream unknowns
//! (eqs 41–47), all for a single wavelength.

use smallvec::smallvec;
use std::f64::consts::PI;

use super::gamma::Gammas;
use super::{LayerVec, RowVec};

/// Per-layer building blocks for the boundary-value system and the later
/// flux reconstruction (Toon et al. eqs 21, 22 and 44).
#[derive(Debug)]
pub(crate) struct LayerCoefficients {
    /// λ-root of the homogeneous solution, `sqrt(|γ1² − γ2²|)` per layer.
    pub lam: LayerVec,
    /// `γ2 / (γ1 + λ)` per layer.
    pub big_gamma: LayerVec,
    /// `1 + Γ·exp(−λτ*)`
    pub e1: LayerVec,
    /// `1 − Γ·exp(−λτ*)`
    pub e2: LayerVec,
    /// `Γ + exp(−λτ*)`
    pub e3: LayerVec,
    /// `Γ − exp(−λτ*)`
    pub e4: LayerVec,
}

/// Direct-beam particular solutions evaluated at the top and bottom of
/// each layer (Toon et al. eqs 23 and 24).
#[derive(Debug)]
pub(crate) struct DirectBeamSources {
    pub pls_btm: LayerVec,
    pub mns_btm: LayerVec,
    pub pls_top: LayerVec,
    pub mns_top: LayerVec,
}

/// The three nonzero diagonals and the forcing vector of the 2N-row
/// boundary-value system (Toon et al. eqs 39–43).
#[derive(Debug)]
pub(crate) struct SystemRows {
    pub a: RowVec,
    pub b: RowVec,
    pub d: RowVec,
    pub e: RowVec,
}

/// Replace a non-finite intermediate with zero.
///
/// A zero diagonal during elimination produces inf or NaN where the
/// closed-form limit of that term's contribution is zero.
pub(crate) fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Compute the per-layer matrix coefficients from the gamma coefficients
/// and the (delta-scaled) layer optical depths.
///
/// `lam` is taken from the absolute value of `γ1² − γ2²` to guard against
/// small negative roundoff near conservative scattering; this is a
/// stability requirement, not an approximation.
pub(crate) fn layer_coefficients(gammas: &[Gammas], tau_star: &[f64]) -> LayerCoefficients {
    let num_layers = gammas.len();

    let mut coefficients = LayerCoefficients {
        lam: smallvec![0.0; num_layers],
        big_gamma: smallvec![0.0; num_layers],
        e1: smallvec![0.0; num_layers],
        e2: smallvec![0.0; num_layers],
        e3: smallvec![0.0; num_layers],
        e4: smallvec![0.0; num_layers],
    };

    for (i, g) in gammas.iter().enumerate() {
        let lam = f64::sqrt(f64::abs(g.gamma1 * g.gamma1 - g.gamma2 * g.gamma2));
        let big_gamma = g.gamma2 / (g.gamma1 + lam);
        let attenuation = f64::exp(-lam * tau_star[i]);

        coefficients.lam[i] = lam;
        coefficients.big_gamma[i] = big_gamma;
        coefficients.e1[i] = 1.0 + big_gamma * attenuation;
        coefficients.e2[i] = 1.0 - big_gamma * attenuation;
        coefficients.e3[i] = big_gamma + attenuation;
        coefficients.e4[i] = big_gamma - attenuation;
    }

    coefficients
}

/// Compute the four direct-beam source terms per layer.
///
/// `fs` is the direct-beam irradiance at this wavelength. When it is zero
/// (pure diffuse illumination) every term is exactly zero; this
/// short-circuit is required, since the general formula divides by
/// `λ² − 1/μ₀²`, which is meaningless without a direct beam.
pub(crate) fn direct_beam_sources(
    gammas: &[Gammas],
    coefficients: &LayerCoefficients,
    ssa_star: &[f64],
    tau_star: &[f64],
    tau_clm: &[f64],
    fs: f64,
    mu_not: f64,
) -> DirectBeamSources {
    let num_layers = gammas.len();

    let mut sources = DirectBeamSources {
        pls_btm: smallvec![0.0; num_layers],
        mns_btm: smallvec![0.0; num_layers],
        pls_top: smallvec![0.0; num_layers],
        mns_top: smallvec![0.0; num_layers],
    };

    if fs <= 0.0 {
        return sources;
    }

    let inverse_mu = 1.0 / mu_not;
    for i in 0..num_layers {
        let g = &gammas[i];
        let denominator = coefficients.lam[i] * coefficients.lam[i] - inverse_mu * inverse_mu;
        let plus_numerator = (g.gamma1 - inverse_mu) * g.gamma3 + g.gamma4 * g.gamma2;
        let minus_numerator = (g.gamma1 + inverse_mu) * g.gamma4 + g.gamma2 * g.gamma3;

        let beam_at_top = ssa_star[i] * PI * fs * f64::exp(-tau_clm[i] * inverse_mu);
        let beam_at_btm =
            ssa_star[i] * PI * fs * f64::exp(-(tau_clm[i] + tau_star[i]) * inverse_mu);

        sources.pls_btm[i] = beam_at_btm * plus_numerator / denominator;
        sources.mns_btm[i] = beam_at_btm * minus_numerator / denominator;
        sources.pls_top[i] = beam_at_top * plus_numerator / denominator;
        sources.mns_top[i] = beam_at_top * minus_numerator / denominator;
    }

    sources
}

/// Assemble the 2N-row system (Toon et al. eqs 41–43).
///
/// Row 0 matches the incoming diffuse flux `fd` at the top boundary; the
/// last row reflects off the substrate reflectance; even interior rows tie
/// layer n to n+1 and odd interior rows carry the complementary continuity
/// condition.
pub(crate) fn assemble_system(
    coefficients: &LayerCoefficients,
    sources: &DirectBeamSources,
    fd: f64,
    substrate_reflectance: f64,
    s_sfc: f64,
) -> SystemRows {
    let num_layers = coefficients.e1.len();
    let num_rows = 2 * num_layers;
    let last = num_layers - 1;
    let sfc = substrate_reflectance;

    let LayerCoefficients { e1, e2, e3, e4, .. } = coefficients;

    let mut rows = SystemRows {
        a: smallvec![0.0; num_rows],
        b: smallvec![0.0; num_rows],
        d: smallvec![0.0; num_rows],
        e: smallvec![0.0; num_rows],
    };

    for i in 0..num_rows {
        if i == 0 {
            // Top boundary
            rows.a[i] = 0.0;
            rows.b[i] = e1[0];
            rows.d[i] = -e2[0];
            rows.e[i] = fd - sources.mns_top[0];
        } else if i == num_rows - 1 {
            // Bottom boundary
            rows.a[i] = e1[last] - sfc * e3[last];
            rows.b[i] = e2[last] - sfc * e4[last];
            rows.d[i] = 0.0;
            rows.e[i] = s_sfc - sources.pls_btm[last] + sfc * sources.mns_btm[last];
        } else if i % 2 == 0 {
            // Even interior rows: continuity between layer n and n+1
            let n = i / 2 - 1;
            rows.a[i] = e2[n] * e3[n] - e4[n] * e1[n];
            rows.b[i] = e1[n] * e1[n + 1] - e3[n] * e3[n + 1];
            rows.d[i] = e3[n] * e4[n + 1] - e1[n] * e2[n + 1];
            rows.e[i] = e3[n] * (sources.pls_top[n + 1] - sources.pls_btm[n])
                + e1[n] * (sources.mns_btm[n] - sources.mns_top[n + 1]);
        } else {
            // Odd interior rows: complementary continuity condition
            let n = i / 2;
            rows.a[i] = e2[n + 1] * e1[n] - e3[n] * e4[n + 1];
            rows.b[i] = e2[n] * e2[n + 1] - e4[n] * e4[n + 1];
            rows.d[i] = e1[n + 1] * e4[n + 1] - e2[n + 1] * e3[n + 1];
            rows.e[i] = e2[n + 1] * (sources.pls_top[n + 1] - sources.pls_btm[n])
                + e4[n + 1] * (sources.mns_top[n + 1] - sources.mns_btm[n]);
        }
    }

    rows
}

/// Solve the assembled system with the forward-backward sweep of Toon et
/// al. eqs 45–47 and return the 2N stream unknowns Y.
///
/// The backward sweep starts from the bottom row; divisions by a zero
/// diagonal are replaced with zero through [`finite_or_zero`].
pub(crate) fn eliminate(rows: &SystemRows) -> RowVec {
    let num_rows = rows.b.len();

    let mut a_s: RowVec = smallvec![0.0; num_rows];
    let mut d_s: RowVec = smallvec![0.0; num_rows];

    a_s[num_rows - 1] = finite_or_zero(rows.a[num_rows - 1] / rows.b[num_rows - 1]);
    d_s[num_rows - 1] = finite_or_zero(rows.e[num_rows - 1] / rows.b[num_rows - 1]);

    for i in (0..num_rows - 1).rev() {
        let x = 1.0 / (rows.b[i] - rows.d[i] * a_s[i + 1]);
        a_s[i] = finite_or_zero(rows.a[i] * x);
        d_s[i] = finite_or_zero((rows.e[i] - rows.d[i] * d_s[i + 1]) * x);
    }

    let mut y: RowVec = smallvec![0.0; num_rows];
    y[0] = d_s[0];
    for i in 1..num_rows {
        y[i] = d_s[i] - a_s[i] * y[i - 1];
    }

    y
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn guarded_division_replaces_non_finite() {
        assert_relative_eq!(finite_or_zero(6.0 / 3.0), 2.0);
        assert_relative_eq!(finite_or_zero(1.0 / 0.0), 0.0);
        assert_relative_eq!(finite_or_zero(0.0 / 0.0), 0.0);
        assert_relative_eq!(finite_or_zero(f64::NEG_INFINITY), 0.0);
    }

    #[test]
    fn elimination_solves_a_diagonal_system() {
        // With no off-diagonal coupling the solution is E/B row by row.
        let rows = SystemRows {
            a: smallvec![0.0, 0.0],
            b: smallvec![2.0, 4.0],
            d: smallvec![0.0, 0.0],
            e: smallvec![6.0, 8.0],
        };
        let y = eliminate(&rows);
        assert_relative_eq!(y[0], 3.0);
        assert_relative_eq!(y[1], 2.0);
    }

    #[test]
    fn elimination_survives_a_zero_diagonal() {
        let rows = SystemRows {
            a: smallvec![0.0, 1.0],
            b: smallvec![2.0, 0.0],
            d: smallvec![0.0, 0.0],
            e: smallvec![6.0, 5.0],
        };
        let y = eliminate(&rows);
        assert!(y.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn no_direct_beam_means_no_source_terms() {
        let gammas = [
            Gammas {
                gamma1: 0.5,
                gamma2: 0.3,
                gamma3: 0.4,
                gamma4: 0.6,
            },
            Gammas {
                gamma1: 0.6,
                gamma2: 0.2,
                gamma3: 0.5,
                gamma4: 0.5,
            },
        ];
        let tau_star = [0.5, 1.5];
        let tau_clm = [0.0, 0.5];
        let ssa_star = [0.9, 0.95];
        let coefficients = layer_coefficients(&gammas, &tau_star);

        let sources = direct_beam_sources(
            &gammas,
            &coefficients,
            &ssa_star,
            &tau_star,
            &tau_clm,
            0.0,
            0.5,
        );

        for i in 0..gammas.len() {
            assert_eq!(sources.pls_btm[i], 0.0);
            assert_eq!(sources.mns_btm[i], 0.0);
            assert_eq!(sources.pls_top[i], 0.0);
            assert_eq!(sources.mns_top[i], 0.0);
        }
    }

    #[test]
    fn layer_coefficients_match_closed_forms() {
        let gammas = [Gammas {
            gamma1: 0.8,
            gamma2: 0.5,
            gamma3: 0.4,
            gamma4: 0.6,
        }];
        let tau_star = [2.0];
        let c = layer_coefficients(&gammas, &tau_star);

        let lam = f64::sqrt(0.8 * 0.8 - 0.5 * 0.5);
        let big_gamma = 0.5 / (0.8 + lam);
        let attenuation = f64::exp(-lam * 2.0);
        assert_relative_eq!(c.lam[0], lam);
        assert_relative_eq!(c.big_gamma[0], big_gamma);
        assert_relative_eq!(c.e1[0], 1.0 + big_gamma * attenuation);
        assert_relative_eq!(c.e2[0], 1.0 - big_gamma * attenuation);
        assert_relative_eq!(c.e3[0], big_gamma + attenuation);
        assert_relative_eq!(c.e4[0], big_gamma - attenuation);
    }
}
