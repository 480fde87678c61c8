//! Per-point indicator evaluation.

use crate::config::Indicator;
use crate::error::{ImagingError, Result};
use crate::operator::SignalOperator;
use crate::types::{ImpulseResponseVolume, SearchGrid};
use serde::Serialize;
use solvers::{
    RegularizationConfig, RegularizationParameter, RegularizedSolution, SolveStatus,
    SvdFactorization,
};

/// Indicator value written for points that could not be evaluated.
pub const SENTINEL: f64 = 0.0;

/// Outcome class of one grid point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PointStatus {
    Regularized,
    /// No singular component survived; the value is the sentinel.
    IllConditioned,
    /// The windowed impulse response is identically zero.
    ZeroTestFunction,
    /// The reduction produced a non-finite value.
    Unrepresentable,
}

/// Auxiliary values recorded for one grid point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PointDiagnostics {
    pub status: PointStatus,
    pub retained_rank: usize,
    pub condition_number: f64,
    pub parameter: RegularizationParameter,
    pub residual_norm: f64,
    pub solution_norm: f64,
    pub test_function_norm: f64,
}

impl PointDiagnostics {
    fn from_solution(solution: &RegularizedSolution, status: PointStatus) -> Self {
        Self {
            status,
            retained_rank: solution.retained,
            condition_number: solution.condition_number,
            parameter: solution.parameter,
            residual_norm: solution.residual,
            solution_norm: solution.solution_norm,
            test_function_norm: solution.rhs_norm,
        }
    }

    /// True when the value is the sentinel rather than a computed indicator.
    pub fn is_caveat(&self) -> bool {
        self.status != PointStatus::Regularized
    }
}

/// Indicator value and diagnostics for one grid point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PointEvaluation {
    pub value: f64,
    pub diagnostics: PointDiagnostics,
}

/// Anything the scheduler can run over a grid.
///
/// `evaluate` must be a pure function of the index: the scheduler may call
/// it from any worker thread in any order.
pub trait PointEvaluator: Send + Sync {
    fn evaluate(&self, index: usize) -> Result<PointEvaluation>;
}

/// Reduce a regularized solution to an indicator value.
pub fn reduce(indicator: Indicator, solution: &RegularizedSolution) -> PointEvaluation {
    let caveat = |status| PointEvaluation {
        value: SENTINEL,
        diagnostics: PointDiagnostics::from_solution(solution, status),
    };
    match solution.status {
        SolveStatus::IllConditioned => return caveat(PointStatus::IllConditioned),
        SolveStatus::ZeroRhs => return caveat(PointStatus::ZeroTestFunction),
        SolveStatus::Regularized => {}
    }

    let value = match indicator {
        Indicator::RangeProjection => {
            let relative = solution.relative_residual();
            (1.0 - relative * relative).clamp(0.0, 1.0)
        }
    };
    if !value.is_finite() {
        return caveat(PointStatus::Unrepresentable);
    }
    PointEvaluation {
        value,
        diagnostics: PointDiagnostics::from_solution(solution, PointStatus::Regularized),
    }
}

/// Evaluates grid points against one operator and its factorization.
///
/// Holds shared borrows only, so one evaluator serves every worker.
#[derive(Debug, Clone, Copy)]
pub struct GridEvaluator<'a> {
    operator: &'a SignalOperator,
    factorization: &'a SvdFactorization,
    impulse: &'a ImpulseResponseVolume,
    regularization: &'a RegularizationConfig,
    indicator: Indicator,
    points: usize,
}

impl<'a> GridEvaluator<'a> {
    /// Check every shape and option up front; `evaluate` then only fails on
    /// an out-of-range index.
    pub fn new(
        operator: &'a SignalOperator,
        factorization: &'a SvdFactorization,
        impulse: &'a ImpulseResponseVolume,
        grid: &SearchGrid,
        regularization: &'a RegularizationConfig,
        indicator: Indicator,
    ) -> Result<Self> {
        regularization.validate()?;
        operator.check_impulse_volume(impulse, grid)?;
        let (rows, cols) = operator.shape();
        if factorization.rows() != rows {
            return Err(ImagingError::DimensionMismatch {
                what: "factorization rows",
                expected: rows,
                got: factorization.rows(),
            });
        }
        if factorization.cols() != cols {
            return Err(ImagingError::DimensionMismatch {
                what: "factorization columns",
                expected: cols,
                got: factorization.cols(),
            });
        }
        Ok(Self {
            operator,
            factorization,
            impulse,
            regularization,
            indicator,
            points: grid.len(),
        })
    }

    pub fn indicator(&self) -> Indicator {
        self.indicator
    }

    pub fn len(&self) -> usize {
        self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points == 0
    }
}

impl PointEvaluator for GridEvaluator<'_> {
    fn evaluate(&self, index: usize) -> Result<PointEvaluation> {
        if index >= self.points {
            return Err(ImagingError::InvalidInput(format!(
                "grid point {index} out of range ({} points)",
                self.points
            )));
        }
        let rhs = self.operator.test_function(self.impulse, index)?;
        let solution = self.factorization.solve_regularized(&rhs, self.regularization)?;
        let evaluation = reduce(self.indicator, &solution);

        match evaluation.diagnostics.status {
            PointStatus::IllConditioned => log::warn!(
                "grid point {index}: no singular value above the floor, writing sentinel"
            ),
            PointStatus::ZeroTestFunction => {
                log::debug!("grid point {index}: impulse response is zero in the window")
            }
            PointStatus::Unrepresentable => {
                log::debug!("grid point {index}: indicator undefined, writing sentinel")
            }
            PointStatus::Regularized => {}
        }
        Ok(evaluation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WindowConfig;
    use crate::types::{DataVolume, ReceiverSet, TimeAxis};
    use approx::assert_relative_eq;
    use ndarray::{Array3, array};

    struct Fixture {
        operator: SignalOperator,
        factorization: SvdFactorization,
        impulse: ImpulseResponseVolume,
        grid: SearchGrid,
    }

    /// One receiver, impulse-like data: the operator is the identity.
    fn identity_fixture() -> Fixture {
        let receivers = ReceiverSet::from_planar(&[[0.0, 0.0]]).unwrap();
        let time_axis = TimeAxis::uniform(0.0, 1.0, 4).unwrap();
        let mut data = Array3::zeros((1, 4, 1));
        data[[0, 0, 0]] = 2.0;
        let data = DataVolume::new(data).unwrap();
        let operator =
            SignalOperator::build(&receivers, &time_axis, &data, &WindowConfig::default()).unwrap();
        let factorization = operator.factorize().unwrap();

        let mut impulse = Array3::zeros((1, 4, 3));
        impulse[[0, 1, 0]] = 4.0;
        impulse[[0, 2, 1]] = 3.0;
        impulse[[0, 3, 1]] = 4.0;
        let impulse = ImpulseResponseVolume::new(impulse).unwrap();
        let grid = SearchGrid::new(array![[0.0, 1.0], [0.0, 2.0], [0.0, 3.0]]).unwrap();
        Fixture {
            operator,
            factorization,
            impulse,
            grid,
        }
    }

    #[test]
    fn test_range_projection_full_rank() {
        let f = identity_fixture();
        let cfg = RegularizationConfig::truncated(4);
        let eval = GridEvaluator::new(
            &f.operator,
            &f.factorization,
            &f.impulse,
            &f.grid,
            &cfg,
            Indicator::RangeProjection,
        )
        .unwrap();

        let point = eval.evaluate(0).unwrap();
        assert_relative_eq!(point.value, 1.0, epsilon = 1e-12);
        assert_eq!(point.diagnostics.status, PointStatus::Regularized);
        assert_eq!(point.diagnostics.retained_rank, 4);
    }

    #[test]
    fn test_partial_projection_diagnostics() {
        let f = identity_fixture();
        let cfg = RegularizationConfig::truncated(4);
        let eval = GridEvaluator::new(
            &f.operator,
            &f.factorization,
            &f.impulse,
            &f.grid,
            &cfg,
            Indicator::RangeProjection,
        )
        .unwrap();

        // A = 2 I, rhs has norm 5, so ‖φ‖ = 2.5
        let point = eval.evaluate(1).unwrap();
        assert_relative_eq!(point.value, 1.0, epsilon = 1e-12);
        assert_relative_eq!(point.diagnostics.solution_norm, 2.5, epsilon = 1e-12);
        assert_relative_eq!(point.diagnostics.test_function_norm, 5.0, epsilon = 1e-12);

        // two of four equal singular values kept: only part of the rhs is reproduced
        let cfg = RegularizationConfig::truncated(2);
        let eval = GridEvaluator::new(
            &f.operator,
            &f.factorization,
            &f.impulse,
            &f.grid,
            &cfg,
            Indicator::RangeProjection,
        )
        .unwrap();
        let point = eval.evaluate(1).unwrap();
        assert!(point.value >= 0.0 && point.value <= 1.0);
        assert_eq!(point.diagnostics.retained_rank, 2);
    }

    #[test]
    fn test_factorization_column_mismatch() {
        let f = identity_fixture();
        let receivers = ReceiverSet::from_planar(&[[0.0, 0.0]]).unwrap();
        let time_axis = TimeAxis::uniform(0.0, 1.0, 4).unwrap();
        let mut data = Array3::zeros((1, 4, 2));
        data[[0, 0, 0]] = 2.0;
        data[[0, 1, 1]] = 1.0;
        let wide = SignalOperator::build(
            &receivers,
            &time_axis,
            &DataVolume::new(data).unwrap(),
            &WindowConfig::default(),
        )
        .unwrap();
        assert_eq!(wide.shape(), (4, 8));
        let wide_factorization = wide.factorize().unwrap();

        let cfg = RegularizationConfig::default();
        let err = GridEvaluator::new(
            &f.operator,
            &wide_factorization,
            &f.impulse,
            &f.grid,
            &cfg,
            Indicator::RangeProjection,
        )
        .unwrap_err();
        match err {
            ImagingError::DimensionMismatch {
                what,
                expected,
                got,
            } => {
                assert_eq!(what, "factorization columns");
                assert_eq!(expected, 4);
                assert_eq!(got, 8);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_zero_test_function_gets_sentinel() {
        let f = identity_fixture();
        let cfg = RegularizationConfig::default();
        let eval = GridEvaluator::new(
            &f.operator,
            &f.factorization,
            &f.impulse,
            &f.grid,
            &cfg,
            Indicator::RangeProjection,
        )
        .unwrap();

        let point = eval.evaluate(2).unwrap();
        assert_eq!(point.value, SENTINEL);
        assert_eq!(point.diagnostics.status, PointStatus::ZeroTestFunction);
        assert!(point.diagnostics.is_caveat());
    }

    #[test]
    fn test_floor_above_spectrum_is_ill_conditioned() {
        let f = identity_fixture();
        let cfg = solvers::RegularizationConfigBuilder::new()
            .singular_floor(10.0)
            .build()
            .unwrap();
        let eval = GridEvaluator::new(
            &f.operator,
            &f.factorization,
            &f.impulse,
            &f.grid,
            &cfg,
            Indicator::RangeProjection,
        )
        .unwrap();

        let point = eval.evaluate(0).unwrap();
        assert_eq!(point.value, SENTINEL);
        assert_eq!(point.diagnostics.status, PointStatus::IllConditioned);
        assert!(point.diagnostics.residual_norm.is_finite());
        assert_relative_eq!(point.diagnostics.residual_norm, 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_out_of_range_index() {
        let f = identity_fixture();
        let cfg = RegularizationConfig::default();
        let eval = GridEvaluator::new(
            &f.operator,
            &f.factorization,
            &f.impulse,
            &f.grid,
            &cfg,
            Indicator::RangeProjection,
        )
        .unwrap();

        assert!(eval.evaluate(3).is_err());
    }

    #[test]
    fn test_new_rejects_mismatched_grid() {
        let f = identity_fixture();
        let cfg = RegularizationConfig::default();
        let grid = SearchGrid::new(array![[0.0, 1.0]]).unwrap();
        let err = GridEvaluator::new(
            &f.operator,
            &f.factorization,
            &f.impulse,
            &grid,
            &cfg,
            Indicator::RangeProjection,
        )
        .unwrap_err();

        assert!(err.is_dimension_error());
    }
}
