//! Regularized inversion of an ill-posed operator
//!
//! Given an [`SvdFactorization`](crate::direct::SvdFactorization) computed
//! once, every right-hand side is solved with a filtered pseudo-inverse:
//! - truncated SVD (filter factor 1 on the retained components)
//! - Tikhonov with a fixed α, or with α from Morozov's discrepancy principle
//!
//! The retained components are bounded by a truncation rule and an absolute
//! singular-value floor. When nothing survives, the solve reports
//! [`SolveStatus::IllConditioned`] with a zero solution instead of dividing.

mod config;
mod discrepancy;
mod solve;

pub use config::{
    RegularizationConfig, RegularizationConfigBuilder, RegularizationError, RegularizationMethod,
    Result, TikhonovParameter, Truncation,
};
pub use solve::{
    RegularizationParameter, RegularizedSolution, SolveStatus, regularized_solve, retained_rank,
};
