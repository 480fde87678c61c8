//! Thin singular value decomposition
//!
//! The factorization is computed once per operator with nalgebra's
//! bidiagonalization SVD and then re-laid into `ndarray` storage, sorted by
//! decreasing singular value. Every regularized solve afterwards only needs
//! matrix-vector products against the stored factors, so one factorization
//! can be shared read-only by any number of threads.

use crate::blas_helpers::{axpy, inner_product};
use nalgebra::DMatrix;
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, Data, Ix1};
use thiserror::Error;

/// Iteration cap handed to nalgebra's implicit-shift QR sweeps.
const SVD_MAX_ITERATIONS: usize = 100_000;

/// Errors that can occur during SVD factorization
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SvdError {
    /// The matrix has no rows or no columns
    #[error("cannot factorize an empty {rows}x{cols} matrix")]
    EmptyMatrix { rows: usize, cols: usize },

    /// The matrix holds a NaN or infinite entry
    #[error("matrix entry ({row}, {col}) is not finite")]
    NonFinite { row: usize, col: usize },

    /// The QR sweeps did not converge
    #[error("singular value decomposition did not converge")]
    NoConvergence,

    /// A vector does not match the factorized matrix
    #[error("vector length mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Thin SVD `A = U Σ Vᵀ` with singular values in decreasing order.
///
/// With `k = min(m, n)`, the left vectors are stored transposed (`k × m`) so
/// that projecting a right-hand side reads contiguous rows, and the right
/// vectors as `n × k`.
#[derive(Debug, Clone)]
pub struct SvdFactorization {
    u_t: Array2<f64>,
    singular_values: Array1<f64>,
    v: Array2<f64>,
}

impl SvdFactorization {
    /// Factorize a dense matrix.
    pub fn factorize(a: &Array2<f64>) -> Result<Self, SvdError> {
        svd_factorize(a)
    }

    /// Number of rows of the factorized matrix
    pub fn rows(&self) -> usize {
        self.u_t.ncols()
    }

    /// Number of columns of the factorized matrix
    pub fn cols(&self) -> usize {
        self.v.nrows()
    }

    /// Number of singular triplets, `min(rows, cols)`
    pub fn len(&self) -> usize {
        self.singular_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.singular_values.is_empty()
    }

    /// Singular values, largest first
    pub fn singular_values(&self) -> &Array1<f64> {
        &self.singular_values
    }

    /// Largest singular value
    pub fn largest_singular_value(&self) -> f64 {
        self.singular_values.get(0).copied().unwrap_or(0.0)
    }

    /// Left singular vector `u_i`
    pub fn left_vector(&self, i: usize) -> ArrayView1<'_, f64> {
        self.u_t.row(i)
    }

    /// Right singular vector `v_i`
    pub fn right_vector(&self, i: usize) -> ArrayView1<'_, f64> {
        self.v.column(i)
    }

    /// Ratio of the largest to the smallest non-zero singular value
    pub fn condition_number(&self) -> f64 {
        let smallest = self
            .singular_values
            .iter()
            .rev()
            .copied()
            .find(|&s| s > 0.0);
        match smallest {
            Some(s) => self.largest_singular_value() / s,
            None => f64::INFINITY,
        }
    }

    /// Coefficients `u_iᵀ rhs` for the leading `count` components.
    pub fn project<S>(&self, rhs: &ArrayBase<S, Ix1>, count: usize) -> Result<Array1<f64>, SvdError>
    where
        S: Data<Elem = f64>,
    {
        self.check_rhs(rhs.len())?;
        let count = count.min(self.len());
        Ok(Array1::from_iter(
            (0..count).map(|i| inner_product(&self.u_t.row(i), rhs)),
        ))
    }

    /// Picard coefficients `|u_iᵀ rhs|` for every component.
    ///
    /// A right-hand side satisfies the discrete Picard condition when these
    /// decay faster than the singular values.
    pub fn picard_coefficients<S>(&self, rhs: &ArrayBase<S, Ix1>) -> Result<Array1<f64>, SvdError>
    where
        S: Data<Elem = f64>,
    {
        Ok(self.project(rhs, self.len())?.mapv(f64::abs))
    }

    /// `Σ_i w_i v_i` over the leading `weights.len()` right vectors
    pub fn combine_right(&self, weights: &Array1<f64>) -> Array1<f64> {
        let mut x = Array1::zeros(self.cols());
        for (i, &w) in weights.iter().enumerate().take(self.len()) {
            if w != 0.0 {
                axpy(w, &self.v.column(i), &mut x);
            }
        }
        x
    }

    /// `Σ_i w_i u_i` over the leading `weights.len()` left vectors
    pub fn combine_left(&self, weights: &Array1<f64>) -> Array1<f64> {
        let mut y = Array1::zeros(self.rows());
        for (i, &w) in weights.iter().enumerate().take(self.len()) {
            if w != 0.0 {
                axpy(w, &self.u_t.row(i), &mut y);
            }
        }
        y
    }

    /// Rebuild `U Σ Vᵀ`
    pub fn reconstruct(&self) -> Array2<f64> {
        let mut scaled_v = self.v.clone();
        for (mut column, &s) in scaled_v.columns_mut().into_iter().zip(self.singular_values.iter()) {
            column.mapv_inplace(|x| x * s);
        }
        self.u_t.t().dot(&scaled_v.t())
    }

    fn check_rhs(&self, len: usize) -> Result<(), SvdError> {
        if len != self.rows() {
            return Err(SvdError::DimensionMismatch {
                expected: self.rows(),
                got: len,
            });
        }
        Ok(())
    }
}

/// Compute the thin SVD of `a`, sorted by decreasing singular value.
///
/// Ties keep nalgebra's original order, so the same matrix always yields the
/// same factors.
pub fn svd_factorize(a: &Array2<f64>) -> Result<SvdFactorization, SvdError> {
    let (rows, cols) = a.dim();
    if rows == 0 || cols == 0 {
        return Err(SvdError::EmptyMatrix { rows, cols });
    }
    if let Some(((row, col), _)) = a.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(SvdError::NonFinite { row, col });
    }

    let matrix = DMatrix::from_fn(rows, cols, |i, j| a[[i, j]]);
    let svd = matrix
        .try_svd(true, true, f64::EPSILON, SVD_MAX_ITERATIONS)
        .ok_or(SvdError::NoConvergence)?;
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Err(SvdError::NoConvergence);
    };
    let sigma = svd.singular_values;
    let k = sigma.len();

    let mut order: Vec<usize> = (0..k).collect();
    order.sort_by(|&i, &j| sigma[j].total_cmp(&sigma[i]).then(i.cmp(&j)));

    let singular_values = Array1::from_iter(order.iter().map(|&i| sigma[i]));
    let u_t = Array2::from_shape_fn((k, rows), |(i, r)| u[(r, order[i])]);
    let v = Array2::from_shape_fn((cols, k), |(c, i)| v_t[(order[i], c)]);

    log::debug!(
        "SVD of {}x{} matrix: sigma_max={:.3e}, sigma_min={:.3e}",
        rows,
        cols,
        singular_values[0],
        singular_values[k - 1]
    );

    Ok(SvdFactorization {
        u_t,
        singular_values,
        v,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_matrix(rows: usize, cols: usize, seed: u64) -> Array2<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        Array2::from_shape_fn((rows, cols), |_| rng.random_range(-1.0..1.0))
    }

    #[test]
    fn test_svd_diagonal_sorted() {
        let a = array![[1.0, 0.0, 0.0], [0.0, 5.0, 0.0], [0.0, 0.0, 3.0]];
        let svd = svd_factorize(&a).unwrap();

        assert_relative_eq!(svd.singular_values()[0], 5.0, epsilon = 1e-12);
        assert_relative_eq!(svd.singular_values()[1], 3.0, epsilon = 1e-12);
        assert_relative_eq!(svd.singular_values()[2], 1.0, epsilon = 1e-12);
        assert_relative_eq!(svd.condition_number(), 5.0, epsilon = 1e-12);

        // the leading right vector is ±e_1
        assert_relative_eq!(svd.right_vector(0)[1].abs(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_svd_reconstructs_tall_matrix() {
        let a = random_matrix(30, 12, 7);
        let svd = svd_factorize(&a).unwrap();

        assert_eq!(svd.rows(), 30);
        assert_eq!(svd.cols(), 12);
        assert_eq!(svd.len(), 12);

        let rebuilt = svd.reconstruct();
        for (x, y) in a.iter().zip(rebuilt.iter()) {
            assert_relative_eq!(*x, *y, epsilon = 1e-10);
        }

        for w in svd.singular_values().windows(2) {
            assert!(w[0] >= w[1]);
        }
    }

    #[test]
    fn test_svd_reconstructs_wide_matrix() {
        let a = random_matrix(6, 15, 11);
        let svd = svd_factorize(&a).unwrap();

        assert_eq!(svd.len(), 6);
        let rebuilt = svd.reconstruct();
        for (x, y) in a.iter().zip(rebuilt.iter()) {
            assert_relative_eq!(*x, *y, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_singular_vectors_orthonormal() {
        let a = random_matrix(20, 8, 3);
        let svd = svd_factorize(&a).unwrap();

        for i in 0..svd.len() {
            for j in 0..svd.len() {
                let expected = if i == j { 1.0 } else { 0.0 };
                let uu = inner_product(&svd.left_vector(i), &svd.left_vector(j));
                let vv = inner_product(&svd.right_vector(i), &svd.right_vector(j));
                assert_relative_eq!(uu, expected, epsilon = 1e-10);
                assert_relative_eq!(vv, expected, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_factorization_is_deterministic() {
        let a = random_matrix(16, 9, 21);
        let first = svd_factorize(&a).unwrap();
        let second = svd_factorize(&a).unwrap();

        assert_eq!(first.singular_values(), second.singular_values());
        assert_eq!(first.u_t, second.u_t);
        assert_eq!(first.v, second.v);
    }

    #[test]
    fn test_project_and_combine() {
        let a = array![[2.0, 0.0], [0.0, 1.0], [0.0, 0.0]];
        let svd = svd_factorize(&a).unwrap();
        let rhs = array![4.0, 3.0, 7.0];

        let picard = svd.picard_coefficients(&rhs).unwrap();
        assert_relative_eq!(picard[0], 4.0, epsilon = 1e-12);
        assert_relative_eq!(picard[1], 3.0, epsilon = 1e-12);

        // projecting onto the range and recombining drops the third entry
        let coeffs = svd.project(&rhs, 2).unwrap();
        let fitted = svd.combine_left(&coeffs);
        assert_relative_eq!(fitted[0], 4.0, epsilon = 1e-12);
        assert_relative_eq!(fitted[1], 3.0, epsilon = 1e-12);
        assert_relative_eq!(fitted[2], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rejects_empty_and_non_finite() {
        let empty = Array2::<f64>::zeros((0, 3));
        assert_eq!(
            svd_factorize(&empty).unwrap_err(),
            SvdError::EmptyMatrix { rows: 0, cols: 3 }
        );

        let mut a = Array2::<f64>::eye(3);
        a[[1, 2]] = f64::NAN;
        assert_eq!(
            svd_factorize(&a).unwrap_err(),
            SvdError::NonFinite { row: 1, col: 2 }
        );
    }

    #[test]
    fn test_rhs_length_checked() {
        let svd = svd_factorize(&Array2::<f64>::eye(3)).unwrap();
        let err = svd.project(&array![1.0, 2.0], 3).unwrap_err();

        assert_eq!(err, SvdError::DimensionMismatch { expected: 3, got: 2 });
        assert_eq!(err.to_string(), "vector length mismatch: expected 3, got 2");
    }

    #[test]
    fn test_zero_matrix_condition_number() {
        let svd = svd_factorize(&Array2::<f64>::zeros((3, 2))).unwrap();

        assert_eq!(svd.largest_singular_value(), 0.0);
        assert!(svd.condition_number().is_infinite());
    }
}
