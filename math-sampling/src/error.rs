//! Error types for the sampling imager.
//!
//! Shape and configuration problems are reported before any factorization or
//! parallel work starts. Per-point instability is not an error: it is carried
//! by the point diagnostics. Only the scheduler's infrastructure failures abort
//! a run once it is under way.

use solvers::{RegularizationError, SvdError};
use std::fmt;
use thiserror::Error;

/// Which side of the operator matrix an index refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorAxis {
    Row,
    Column,
}

impl fmt::Display for OperatorAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatorAxis::Row => write!(f, "row"),
            OperatorAxis::Column => write!(f, "column"),
        }
    }
}

/// Errors that can occur while building the operator or imaging a grid.
#[derive(Debug, Error)]
pub enum ImagingError {
    /// An input extent disagrees with the receiver set, time axis or grid.
    #[error("dimension mismatch for {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        /// The extent being checked
        what: &'static str,
        /// Extent implied by the other inputs
        expected: usize,
        /// Extent actually supplied
        got: usize,
    },

    /// The operator has an all-zero row or column under the chosen windowing.
    #[error("degenerate operator: {axis} {index} ({label}) is identically zero")]
    DegenerateOperator {
        /// Row or column
        axis: OperatorAxis,
        /// Matrix index
        index: usize,
        /// Decoded position, e.g. `receiver 3, sample 17`
        label: String,
    },

    /// Grid points whose solve had no usable singular component.
    #[error("{} grid points are ill-conditioned", .points.len())]
    IllConditioned {
        /// Indices of the affected grid points
        points: Vec<usize>,
    },

    /// A worker terminated abnormally; the run produced no field.
    #[error("worker {worker} failed on grid indices {first}..={last}: {reason}")]
    WorkerFailure {
        /// Worker (chunk) number
        worker: usize,
        /// First grid index assigned to the worker
        first: usize,
        /// Last grid index assigned to the worker
        last: usize,
        /// The grid point being evaluated when the worker failed
        point: Option<usize>,
        /// Error message or panic payload
        reason: String,
    },

    /// The merged results do not cover every grid index exactly once.
    #[error(
        "incomplete field: expected {expected} values, {} missing, {} duplicated, {} out of range",
        .missing.len(),
        .duplicated.len(),
        .unexpected.len()
    )]
    IncompleteField {
        /// Number of grid points
        expected: usize,
        /// Indices never produced
        missing: Vec<usize>,
        /// Indices produced more than once
        duplicated: Vec<usize>,
        /// Indices beyond the grid
        unexpected: Vec<usize>,
    },

    /// Input values that are not usable (non-finite, unordered, empty).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Inconsistent or out-of-range configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The run was cancelled by the caller.
    #[error("imaging run cancelled")]
    Cancelled,

    /// The operator could not be factorized.
    #[error("factorization failed: {0}")]
    Factorization(#[from] SvdError),

    /// The regularization setup was rejected.
    #[error("regularization error: {0}")]
    Regularization(#[from] RegularizationError),
}

/// A specialized `Result` type for imaging operations.
pub type Result<T> = std::result::Result<T, ImagingError>;

impl ImagingError {
    /// Returns `true` for errors that abort a run.
    ///
    /// `IllConditioned` is the only contained condition: it is produced on
    /// request from the diagnostics and never stops the scheduler.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ImagingError::IllConditioned { .. })
    }

    /// Returns `true` if this is a shape error.
    pub fn is_dimension_error(&self) -> bool {
        matches!(self, ImagingError::DimensionMismatch { .. })
    }

    /// Returns `true` if this is a configuration-related error.
    ///
    /// This includes `InvalidConfig` and rejected regularization options.
    pub fn is_config_error(&self) -> bool {
        match self {
            ImagingError::InvalidConfig(_) => true,
            ImagingError::Regularization(err) => {
                !matches!(err, RegularizationError::DimensionMismatch { .. })
            }
            _ => false,
        }
    }

    /// Returns `true` if this error comes from the parallel phase.
    pub fn is_scheduler_error(&self) -> bool {
        matches!(
            self,
            ImagingError::WorkerFailure { .. }
                | ImagingError::IncompleteField { .. }
                | ImagingError::Cancelled
        )
    }
}
