//! Vector kernels shared by the factorization and the regularized solves
//!
//! These work on any `ndarray` 1-D storage so that callers can pass rows or
//! columns of a matrix without copying.

use ndarray::{ArrayBase, Data, DataMut, Ix1};

/// Compute inner product: x · y
#[inline]
pub fn inner_product<S1, S2>(x: &ArrayBase<S1, Ix1>, y: &ArrayBase<S2, Ix1>) -> f64
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
{
    debug_assert_eq!(x.len(), y.len());
    x.iter().zip(y.iter()).map(|(a, b)| a * b).sum()
}

/// Compute squared 2-norm: ‖x‖²
#[inline]
pub fn vector_norm_sqr<S>(x: &ArrayBase<S, Ix1>) -> f64
where
    S: Data<Elem = f64>,
{
    x.iter().map(|v| v * v).sum()
}

/// Compute 2-norm: ‖x‖
#[inline]
pub fn vector_norm<S>(x: &ArrayBase<S, Ix1>) -> f64
where
    S: Data<Elem = f64>,
{
    vector_norm_sqr(x).sqrt()
}

/// Compute y = y + α x
#[inline]
pub fn axpy<S1, S2>(alpha: f64, x: &ArrayBase<S1, Ix1>, y: &mut ArrayBase<S2, Ix1>)
where
    S1: Data<Elem = f64>,
    S2: DataMut<Elem = f64>,
{
    debug_assert_eq!(x.len(), y.len());
    for (yi, xi) in y.iter_mut().zip(x.iter()) {
        *yi += alpha * xi;
    }
}

/// True when every entry is finite
#[inline]
pub fn all_finite<S>(x: &ArrayBase<S, Ix1>) -> bool
where
    S: Data<Elem = f64>,
{
    x.iter().all(|v| v.is_finite())
}
