//! Direct factorizations
//!
//! - [`svd_factorize`]: thin SVD with singular values sorted in decreasing order

mod svd;

pub use svd::{SvdError, SvdFactorization, svd_factorize};
