//! Merging per-point results into the output field.
//!
//! Results may arrive in any order and from any worker. The assembler keys
//! them by grid index and only hands out a field once every index has been
//! produced exactly once.

use crate::config::{Indicator, RegularizationDomain};
use crate::error::{ImagingError, Result};
use crate::evaluator::{PointDiagnostics, PointEvaluation, PointStatus};
use ndarray::Array1;
use serde::Serialize;
use solvers::RegularizationConfig;

/// One indicator value per grid point, in grid order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorField {
    values: Vec<f64>,
}

impl IndicatorField {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    /// Index of the largest value; the first one on ties.
    pub fn argmax(&self) -> Option<usize> {
        self.values
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
                Some((_, b)) if b >= v => best,
                _ => Some((i, v)),
            })
            .map(|(i, _)| i)
    }

    pub fn max(&self) -> Option<f64> {
        self.argmax().map(|i| self.values[i])
    }

    /// Values divided by the maximum, for display on a fixed color scale.
    pub fn normalized(&self) -> Vec<f64> {
        match self.max() {
            Some(m) if m > 0.0 => self.values.iter().map(|v| v / m).collect(),
            _ => self.values.clone(),
        }
    }

    pub fn to_array(&self) -> Array1<f64> {
        Array1::from_vec(self.values.clone())
    }
}

/// Per-point diagnostics, parallel-indexed with the field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    points: Vec<PointDiagnostics>,
}

impl Diagnostics {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PointDiagnostics> {
        self.points.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PointDiagnostics> {
        self.points.iter()
    }

    /// Grid indices whose solve was ill-conditioned.
    pub fn ill_conditioned_points(&self) -> Vec<usize> {
        self.indices_with(PointStatus::IllConditioned)
    }

    pub fn indices_with(&self, status: PointStatus) -> Vec<usize> {
        self.points
            .iter()
            .enumerate()
            .filter(|(_, d)| d.status == status)
            .map(|(i, _)| i)
            .collect()
    }

    /// Number of points holding the sentinel value.
    pub fn caveat_count(&self) -> usize {
        self.points.iter().filter(|d| d.is_caveat()).count()
    }

    pub fn residual_norms(&self) -> Vec<f64> {
        self.points.iter().map(|d| d.residual_norm).collect()
    }

    /// Escalate ill-conditioned points into an error for strict callers.
    pub fn require_well_conditioned(&self) -> Result<()> {
        let points = self.ill_conditioned_points();
        if points.is_empty() {
            Ok(())
        } else {
            Err(ImagingError::IllConditioned { points })
        }
    }
}

/// Run-level description stored next to the field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageMetadata {
    pub domain: RegularizationDomain,
    pub indicator: Indicator,
    pub regularization: RegularizationConfig,
    pub operator_rows: usize,
    pub operator_cols: usize,
    pub workers: usize,
    pub singular_values: Vec<f64>,
}

/// Complete output of one imaging run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImagingResult {
    pub field: IndicatorField,
    pub diagnostics: Diagnostics,
    pub metadata: ImageMetadata,
}

impl ImagingResult {
    /// JSON value for hand-off to a plotting or storage layer.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| ImagingError::InvalidInput(e.to_string()))
    }
}

/// Collects `(index, evaluation)` pairs into a frozen field.
#[derive(Debug, Clone)]
pub struct ResultAssembler {
    slots: Vec<Option<PointEvaluation>>,
    duplicated: Vec<usize>,
    unexpected: Vec<usize>,
}

impl ResultAssembler {
    pub fn new(expected: usize) -> Self {
        Self {
            slots: vec![None; expected],
            duplicated: Vec::new(),
            unexpected: Vec::new(),
        }
    }

    /// One-shot form of `new` + `insert` + `finish`.
    pub fn assemble<I>(expected: usize, partials: I) -> Result<(IndicatorField, Diagnostics)>
    where
        I: IntoIterator<Item = (usize, PointEvaluation)>,
    {
        let mut assembler = Self::new(expected);
        for (index, evaluation) in partials {
            assembler.insert(index, evaluation);
        }
        assembler.finish()
    }

    /// Record one result. Problems are collected and reported by `finish`.
    pub fn insert(&mut self, index: usize, evaluation: PointEvaluation) {
        match self.slots.get_mut(index) {
            Some(slot @ None) => *slot = Some(evaluation),
            Some(Some(_)) => self.duplicated.push(index),
            None => self.unexpected.push(index),
        }
    }

    pub fn expected(&self) -> usize {
        self.slots.len()
    }

    pub fn received(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Freeze the field.
    ///
    /// # Errors
    ///
    /// Returns `IncompleteField` unless every index was produced exactly once.
    pub fn finish(self) -> Result<(IndicatorField, Diagnostics)> {
        let missing: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_none())
            .map(|(i, _)| i)
            .collect();
        if !missing.is_empty() || !self.duplicated.is_empty() || !self.unexpected.is_empty() {
            let mut duplicated = self.duplicated;
            duplicated.sort_unstable();
            duplicated.dedup();
            let mut unexpected = self.unexpected;
            unexpected.sort_unstable();
            unexpected.dedup();
            return Err(ImagingError::IncompleteField {
                expected: self.slots.len(),
                missing,
                duplicated,
                unexpected,
            });
        }

        let (values, points) = self
            .slots
            .into_iter()
            .flatten()
            .map(|e| (e.value, e.diagnostics))
            .unzip();
        Ok((IndicatorField { values }, Diagnostics { points }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solvers::RegularizationParameter;

    fn evaluation(value: f64, status: PointStatus) -> PointEvaluation {
        PointEvaluation {
            value,
            diagnostics: PointDiagnostics {
                status,
                retained_rank: 3,
                condition_number: 10.0,
                parameter: RegularizationParameter::Rank { rank: 3 },
                residual_norm: 0.5,
                solution_norm: 2.0,
                test_function_norm: 1.0,
            },
        }
    }

    #[test]
    fn test_out_of_order_results_are_merged_in_grid_order() {
        let partials = vec![
            (2, evaluation(0.2, PointStatus::Regularized)),
            (0, evaluation(0.0, PointStatus::Regularized)),
            (1, evaluation(0.1, PointStatus::Regularized)),
        ];
        let (field, diagnostics) = ResultAssembler::assemble(3, partials).unwrap();

        assert_eq!(field.values(), &[0.0, 0.1, 0.2]);
        assert_eq!(diagnostics.len(), 3);
        assert_eq!(field.argmax(), Some(2));
    }

    #[test]
    fn test_missing_and_duplicated_indices() {
        let mut assembler = ResultAssembler::new(4);
        assembler.insert(0, evaluation(1.0, PointStatus::Regularized));
        assembler.insert(0, evaluation(1.0, PointStatus::Regularized));
        assembler.insert(3, evaluation(1.0, PointStatus::Regularized));
        assembler.insert(9, evaluation(1.0, PointStatus::Regularized));
        assert_eq!(assembler.received(), 2);

        match assembler.finish().unwrap_err() {
            ImagingError::IncompleteField {
                expected,
                missing,
                duplicated,
                unexpected,
            } => {
                assert_eq!(expected, 4);
                assert_eq!(missing, vec![1, 2]);
                assert_eq!(duplicated, vec![0]);
                assert_eq!(unexpected, vec![9]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_require_well_conditioned() {
        let partials = vec![
            (0, evaluation(0.5, PointStatus::Regularized)),
            (1, evaluation(0.0, PointStatus::IllConditioned)),
            (2, evaluation(0.0, PointStatus::ZeroTestFunction)),
        ];
        let (_, diagnostics) = ResultAssembler::assemble(3, partials).unwrap();

        assert_eq!(diagnostics.ill_conditioned_points(), vec![1]);
        assert_eq!(diagnostics.caveat_count(), 2);
        assert!(matches!(
            diagnostics.require_well_conditioned(),
            Err(ImagingError::IllConditioned { points }) if points == vec![1]
        ));
    }

    #[test]
    fn test_argmax_first_on_ties_and_normalized() {
        let field = IndicatorField {
            values: vec![1.0, 4.0, 4.0, 2.0],
        };
        assert_eq!(field.argmax(), Some(1));
        assert_eq!(field.normalized(), vec![0.25, 1.0, 1.0, 0.5]);
        assert_eq!(field.to_array().len(), 4);

        let empty = IndicatorField { values: vec![] };
        assert_eq!(empty.argmax(), None);
    }

    #[test]
    fn test_empty_grid() {
        let (field, diagnostics) = ResultAssembler::assemble(0, Vec::new()).unwrap();
        assert!(field.is_empty());
        assert!(diagnostics.is_empty());
    }
}
