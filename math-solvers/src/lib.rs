//! Dense linear algebra for ill-posed imaging operators
//!
//! This crate provides the factorization and inversion layer used by the
//! sampling imager: a thin SVD computed once per operator, and regularized
//! pseudo-inverse solves that can then run concurrently against it.
//!
//! # Features
//!
//! - **Operators**: [`LinearOperator`] for anything that can apply itself and its transpose
//! - **Factorization**: thin SVD sorted by decreasing singular value
//! - **Regularization**: truncated SVD, Tikhonov, Morozov discrepancy principle
//!
//! # Example
//!
//! ```
//! use math_scatter_solvers::{RegularizationConfig, svd_factorize};
//! use ndarray::array;
//!
//! let a = array![[3.0, 0.0], [0.0, 1e-9], [0.0, 0.0]];
//! let svd = svd_factorize(&a).unwrap();
//! let sol = svd
//!     .solve_regularized(&array![3.0, 1.0, 0.0], &RegularizationConfig::truncated(1))
//!     .unwrap();
//! assert!((sol.x[0] - 1.0).abs() < 1e-12);
//! assert!(sol.x[1].abs() < 1e-12);
//! ```

pub mod blas_helpers;
pub mod direct;
pub mod regularization;
pub mod traits;

pub use traits::LinearOperator;

pub use direct::{SvdError, SvdFactorization, svd_factorize};

pub use regularization::{
    RegularizationConfig, RegularizationConfigBuilder, RegularizationError, RegularizationMethod,
    RegularizationParameter, RegularizedSolution, SolveStatus, TikhonovParameter, Truncation,
    regularized_solve, retained_rank,
};
