//! Filtered pseudo-inverse solves against a stored SVD.

use super::config::{
    RegularizationConfig, RegularizationError, RegularizationMethod, Result, TikhonovParameter,
    Truncation,
};
use super::discrepancy::discrepancy_alpha;
use crate::blas_helpers::{all_finite, vector_norm, vector_norm_sqr};
use crate::direct::SvdFactorization;
use ndarray::{Array1, ArrayBase, Data, Ix1, s};
use serde::{Deserialize, Serialize};

/// The regularization parameter a solve actually used.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegularizationParameter {
    /// Truncated SVD with this many components.
    Rank { rank: usize },
    /// Tikhonov filter with this α.
    Tikhonov { alpha: f64 },
}

/// Outcome class of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    /// A regularized solution was computed.
    Regularized,
    /// No component survived the floor or the arithmetic overflowed; the
    /// solution is zero and the residual is ‖rhs‖.
    IllConditioned,
    /// The right-hand side is identically zero.
    ZeroRhs,
}

/// Regularized pseudo-solution of `A φ ≈ rhs`.
#[derive(Debug, Clone)]
pub struct RegularizedSolution {
    pub x: Array1<f64>,
    /// ‖rhs − A x‖
    pub residual: f64,
    pub rhs_norm: f64,
    pub solution_norm: f64,
    /// Number of singular components used.
    pub retained: usize,
    /// `σ_0 / σ_{r−1}` over the retained block, infinite when nothing is retained.
    pub condition_number: f64,
    pub parameter: RegularizationParameter,
    pub status: SolveStatus,
}

impl RegularizedSolution {
    fn zero(cols: usize, rhs_norm: f64, parameter: RegularizationParameter, status: SolveStatus) -> Self {
        Self {
            x: Array1::zeros(cols),
            residual: rhs_norm,
            rhs_norm,
            solution_norm: 0.0,
            retained: 0,
            condition_number: f64::INFINITY,
            parameter,
            status,
        }
    }

    /// `‖rhs − A x‖ / ‖rhs‖`, zero for a zero right-hand side.
    pub fn relative_residual(&self) -> f64 {
        if self.rhs_norm > 0.0 {
            self.residual / self.rhs_norm
        } else {
            0.0
        }
    }
}

/// Number of leading components the configuration allows.
///
/// The retained set is always a prefix of the sorted spectrum: the rule's
/// count, cut further at the first singular value not above the floor.
pub fn retained_rank(singular_values: &Array1<f64>, config: &RegularizationConfig) -> usize {
    let above_floor = singular_values
        .iter()
        .take_while(|&&s| s > config.singular_floor)
        .count();
    let by_rule = match config.truncation {
        Truncation::Rank { k } => k,
        Truncation::RelativeThreshold { ratio } => {
            let cutoff = ratio * singular_values.get(0).copied().unwrap_or(0.0);
            singular_values.iter().take_while(|&&s| s >= cutoff).count()
        }
        Truncation::Full => singular_values.len(),
    };
    by_rule.min(above_floor)
}

/// Solve `A φ ≈ rhs` with the filtered pseudo-inverse
/// `φ = Σ_{i<r} f_i (u_iᵀ rhs / σ_i) v_i`.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or `rhs` does not have
/// one entry per operator row. Numerical breakdown is not an error: it is
/// reported through [`SolveStatus::IllConditioned`].
pub fn regularized_solve<S>(
    factorization: &SvdFactorization,
    rhs: &ArrayBase<S, Ix1>,
    config: &RegularizationConfig,
) -> Result<RegularizedSolution>
where
    S: Data<Elem = f64>,
{
    config.validate()?;
    if rhs.len() != factorization.rows() {
        return Err(RegularizationError::DimensionMismatch {
            expected: factorization.rows(),
            got: rhs.len(),
        });
    }

    let cols = factorization.cols();
    let rhs_norm_sqr = vector_norm_sqr(rhs);
    let rhs_norm = rhs_norm_sqr.sqrt();
    let retained = retained_rank(factorization.singular_values(), config);
    let fallback = match config.method {
        RegularizationMethod::TruncatedSvd => RegularizationParameter::Rank { rank: 0 },
        RegularizationMethod::Tikhonov { .. } => RegularizationParameter::Tikhonov { alpha: 0.0 },
    };

    if !rhs_norm.is_finite() {
        return Ok(RegularizedSolution::zero(cols, rhs_norm, fallback, SolveStatus::IllConditioned));
    }
    if rhs_norm == 0.0 {
        return Ok(RegularizedSolution::zero(cols, 0.0, fallback, SolveStatus::ZeroRhs));
    }
    if retained == 0 {
        return Ok(RegularizedSolution::zero(cols, rhs_norm, fallback, SolveStatus::IllConditioned));
    }

    let coeffs = factorization
        .project(rhs, retained)
        .map_err(|_| RegularizationError::DimensionMismatch {
            expected: factorization.rows(),
            got: rhs.len(),
        })?;
    if !all_finite(&coeffs) {
        return Ok(RegularizedSolution::zero(cols, rhs_norm, fallback, SolveStatus::IllConditioned));
    }
    let sigma = factorization.singular_values().slice(s![..retained]);

    let (alpha, parameter) = match config.method {
        RegularizationMethod::TruncatedSvd => {
            (0.0, RegularizationParameter::Rank { rank: retained })
        }
        RegularizationMethod::Tikhonov {
            parameter: TikhonovParameter::Fixed { alpha },
        } => (alpha, RegularizationParameter::Tikhonov { alpha }),
        RegularizationMethod::Tikhonov {
            parameter: TikhonovParameter::Discrepancy { noise_level },
        } => {
            let perp_sqr = (rhs_norm_sqr - vector_norm_sqr(&coeffs)).max(0.0);
            let alpha = discrepancy_alpha(sigma, coeffs.view(), perp_sqr, noise_level * rhs_norm);
            (alpha, RegularizationParameter::Tikhonov { alpha })
        }
    };

    // x weights: f_i c_i / σ_i, which for Tikhonov is σ_i c_i / (σ_i² + α)
    let mut solution_weights = Array1::zeros(retained);
    let mut fitted_weights = Array1::zeros(retained);
    for (i, (&s, &c)) in sigma.iter().zip(coeffs.iter()).enumerate() {
        let denom = s * s + alpha;
        solution_weights[i] = s * c / denom;
        fitted_weights[i] = s * s * c / denom;
    }

    let x = factorization.combine_right(&solution_weights);
    let fitted = factorization.combine_left(&fitted_weights);
    let residual = vector_norm(&(&fitted - rhs));
    let solution_norm = vector_norm(&x);

    if !all_finite(&x) || !residual.is_finite() || !solution_norm.is_finite() {
        return Ok(RegularizedSolution::zero(cols, rhs_norm, parameter, SolveStatus::IllConditioned));
    }

    Ok(RegularizedSolution {
        x,
        residual,
        rhs_norm,
        solution_norm,
        retained,
        condition_number: sigma[0] / sigma[retained - 1],
        parameter,
        status: SolveStatus::Regularized,
    })
}

impl SvdFactorization {
    /// Regularized solve against this factorization; see [`regularized_solve`].
    pub fn solve_regularized<S>(
        &self,
        rhs: &ArrayBase<S, Ix1>,
        config: &RegularizationConfig,
    ) -> Result<RegularizedSolution>
    where
        S: Data<Elem = f64>,
    {
        regularized_solve(self, rhs, config)
    }
}
