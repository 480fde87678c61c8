//! Morozov discrepancy principle for the Tikhonov parameter.
//!
//! For a fixed right-hand side the Tikhonov residual has the closed form
//!
//! ```text
//! ‖rhs − A φ_α‖² = Σ_i (α / (σ_i² + α))² c_i² + ‖P⊥ rhs‖²
//! ```
//!
//! with `c_i = u_iᵀ rhs` and `P⊥` the projector onto the complement of the
//! retained left vectors. It increases monotonically with α, so the parameter
//! matching a target residual is found by bisection on `log α`.

use ndarray::ArrayView1;

/// Bisection steps on `log α`.
const BISECTION_STEPS: usize = 100;
/// Search interval, relative to `σ_max²`.
const ALPHA_LOWER: f64 = 1e-16;
const ALPHA_UPPER: f64 = 1e8;

/// Squared Tikhonov residual at parameter `alpha`.
pub(crate) fn residual_sqr(
    sigma: ArrayView1<'_, f64>,
    coeffs: ArrayView1<'_, f64>,
    perp_sqr: f64,
    alpha: f64,
) -> f64 {
    sigma
        .iter()
        .zip(coeffs.iter())
        .map(|(&s, &c)| {
            let damp = alpha / (s * s + alpha);
            damp * damp * c * c
        })
        .sum::<f64>()
        + perp_sqr
}

/// α with `‖rhs − A φ_α‖ = target`.
///
/// Returns 0 when even the undamped solve leaves a residual above `target`,
/// and the upper end of the search interval when the residual never reaches
/// it.
pub(crate) fn discrepancy_alpha(
    sigma: ArrayView1<'_, f64>,
    coeffs: ArrayView1<'_, f64>,
    perp_sqr: f64,
    target: f64,
) -> f64 {
    let target_sqr = target * target;
    let sigma_max = sigma.iter().copied().fold(0.0, f64::max);
    if sigma_max == 0.0 || perp_sqr >= target_sqr {
        return 0.0;
    }

    let mut lo = (sigma_max * sigma_max * ALPHA_LOWER).ln();
    let mut hi = (sigma_max * sigma_max * ALPHA_UPPER).ln();
    if residual_sqr(sigma, coeffs, perp_sqr, hi.exp()) <= target_sqr {
        return hi.exp();
    }

    for _ in 0..BISECTION_STEPS {
        let mid = 0.5 * (lo + hi);
        if residual_sqr(sigma, coeffs, perp_sqr, mid.exp()) < target_sqr {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    (0.5 * (lo + hi)).exp()
}
