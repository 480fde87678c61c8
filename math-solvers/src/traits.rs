//! Core traits for linear algebra operations
//!
//! - [`LinearOperator`]: matrix-like objects that can apply themselves and their
//!   transpose to a vector. Imaging operators implement it so residuals can be
//!   checked without going through a factorization.

use crate::blas_helpers::vector_norm;
use ndarray::{Array1, Array2};

/// A real linear map `A: R^n -> R^m`.
///
/// Implementations must be usable from several threads at once: the grid
/// evaluation phase shares one operator across the whole worker pool.
pub trait LinearOperator: Send + Sync {
    /// Number of rows in the operator
    fn num_rows(&self) -> usize;

    /// Number of columns in the operator
    fn num_cols(&self) -> usize;

    /// Apply the operator: y = A * x
    fn apply(&self, x: &Array1<f64>) -> Array1<f64>;

    /// Apply the transpose: y = A^T * x
    fn apply_transpose(&self, x: &Array1<f64>) -> Array1<f64>;

    /// Check if the operator is square
    fn is_square(&self) -> bool {
        self.num_rows() == self.num_cols()
    }

    /// Residual norm ‖b - A x‖
    fn residual_norm(&self, x: &Array1<f64>, b: &Array1<f64>) -> f64 {
        let ax = self.apply(x);
        vector_norm(&(b - &ax))
    }
}

impl LinearOperator for Array2<f64> {
    fn num_rows(&self) -> usize {
        self.nrows()
    }

    fn num_cols(&self) -> usize {
        self.ncols()
    }

    fn apply(&self, x: &Array1<f64>) -> Array1<f64> {
        self.dot(x)
    }

    fn apply_transpose(&self, x: &Array1<f64>) -> Array1<f64> {
        self.t().dot(x)
    }
}
