//! Regularization options and their validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by an invalid regularization setup or solve request.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegularizationError {
    /// Fixed truncation rank of zero.
    #[error("truncation rank must be >= 1")]
    ZeroRank,

    /// Singular-value ratio outside (0, 1].
    #[error("invalid singular-value ratio: {ratio} (must be in (0, 1])")]
    InvalidRatio {
        /// The rejected ratio
        ratio: f64,
    },

    /// Tikhonov parameter that is not a finite positive number.
    #[error("invalid Tikhonov parameter: {alpha} (must be finite and > 0)")]
    InvalidAlpha {
        /// The rejected parameter
        alpha: f64,
    },

    /// Discrepancy noise level outside (0, 1).
    #[error("invalid noise level: {level} (must be in (0, 1))")]
    InvalidNoiseLevel {
        /// The rejected relative noise level
        level: f64,
    },

    /// Singular-value floor that is negative or not finite.
    #[error("invalid singular-value floor: {floor} (must be finite and >= 0)")]
    InvalidFloor {
        /// The rejected floor
        floor: f64,
    },

    /// Right-hand side does not match the factorized operator.
    #[error("right-hand side length mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Number of operator rows
        expected: usize,
        /// Length of the supplied right-hand side
        got: usize,
    },
}

/// A specialized `Result` type for regularized solves.
pub type Result<T> = std::result::Result<T, RegularizationError>;

/// How many singular components a solve may use at most.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Truncation {
    /// Keep the `k` largest components.
    Rank { k: usize },
    /// Keep components with `σ_i ≥ ratio · σ_max`.
    RelativeThreshold { ratio: f64 },
    /// Keep every component above the floor.
    Full,
}

impl Default for Truncation {
    fn default() -> Self {
        Truncation::RelativeThreshold { ratio: 1e-2 }
    }
}

/// Where the Tikhonov parameter comes from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TikhonovParameter {
    /// The same α for every right-hand side.
    Fixed { alpha: f64 },
    /// α chosen per right-hand side so that the relative residual equals
    /// `noise_level` (Morozov's discrepancy principle).
    Discrepancy { noise_level: f64 },
}

/// Filter applied to the retained singular components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum RegularizationMethod {
    /// Filter factor 1 on every retained component.
    #[default]
    TruncatedSvd,
    /// Filter factor `σ² / (σ² + α)`.
    Tikhonov { parameter: TikhonovParameter },
}

fn default_singular_floor() -> f64 {
    1e-12
}

/// Complete regularization setup for [`super::regularized_solve`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegularizationConfig {
    #[serde(default)]
    pub method: RegularizationMethod,
    #[serde(default)]
    pub truncation: Truncation,
    /// Components with `σ_i ≤ singular_floor` are always discarded.
    #[serde(default = "default_singular_floor")]
    pub singular_floor: f64,
}

impl Default for RegularizationConfig {
    fn default() -> Self {
        Self {
            method: RegularizationMethod::TruncatedSvd,
            truncation: Truncation::default(),
            singular_floor: default_singular_floor(),
        }
    }
}

impl RegularizationConfig {
    /// Plain truncated SVD keeping the `k` largest components.
    pub fn truncated(k: usize) -> Self {
        Self {
            truncation: Truncation::Rank { k },
            ..Self::default()
        }
    }

    /// Tikhonov with a fixed parameter over every component above the floor.
    pub fn tikhonov(alpha: f64) -> Self {
        Self {
            method: RegularizationMethod::Tikhonov {
                parameter: TikhonovParameter::Fixed { alpha },
            },
            truncation: Truncation::Full,
            ..Self::default()
        }
    }

    /// Tikhonov with α chosen by the discrepancy principle.
    pub fn discrepancy(noise_level: f64) -> Self {
        Self {
            method: RegularizationMethod::Tikhonov {
                parameter: TikhonovParameter::Discrepancy { noise_level },
            },
            truncation: Truncation::Full,
            ..Self::default()
        }
    }

    /// Check every option against its admissible range.
    pub fn validate(&self) -> Result<()> {
        match self.truncation {
            Truncation::Rank { k: 0 } => return Err(RegularizationError::ZeroRank),
            Truncation::RelativeThreshold { ratio } if !(ratio > 0.0 && ratio <= 1.0) => {
                return Err(RegularizationError::InvalidRatio { ratio });
            }
            _ => {}
        }
        match self.method {
            RegularizationMethod::Tikhonov {
                parameter: TikhonovParameter::Fixed { alpha },
            } if !(alpha.is_finite() && alpha > 0.0) => {
                return Err(RegularizationError::InvalidAlpha { alpha });
            }
            RegularizationMethod::Tikhonov {
                parameter: TikhonovParameter::Discrepancy { noise_level },
            } if !(noise_level > 0.0 && noise_level < 1.0) => {
                return Err(RegularizationError::InvalidNoiseLevel { level: noise_level });
            }
            _ => {}
        }
        if !(self.singular_floor.is_finite() && self.singular_floor >= 0.0) {
            return Err(RegularizationError::InvalidFloor {
                floor: self.singular_floor,
            });
        }
        Ok(())
    }
}

/// Builder for [`RegularizationConfig`]; `build()` validates.
#[derive(Debug, Clone, Default)]
pub struct RegularizationConfigBuilder {
    cfg: RegularizationConfig,
}

impl RegularizationConfigBuilder {
    /// Creates a builder starting from the default configuration.
    pub fn new() -> Self {
        Self::default()
    }
    /// Sets the filter method.
    pub fn method(mut self, method: RegularizationMethod) -> Self {
        self.cfg.method = method;
        self
    }
    /// Sets the truncation rule.
    pub fn truncation(mut self, truncation: Truncation) -> Self {
        self.cfg.truncation = truncation;
        self
    }
    /// Keeps the `k` largest components.
    pub fn rank(mut self, k: usize) -> Self {
        self.cfg.truncation = Truncation::Rank { k };
        self
    }
    /// Keeps components above `ratio · σ_max`.
    pub fn relative_threshold(mut self, ratio: f64) -> Self {
        self.cfg.truncation = Truncation::RelativeThreshold { ratio };
        self
    }
    /// Sets the absolute singular-value floor.
    pub fn singular_floor(mut self, floor: f64) -> Self {
        self.cfg.singular_floor = floor;
        self
    }
    /// Uses Tikhonov filtering with a fixed α.
    pub fn tikhonov(mut self, alpha: f64) -> Self {
        self.cfg.method = RegularizationMethod::Tikhonov {
            parameter: TikhonovParameter::Fixed { alpha },
        };
        self
    }
    /// Uses Tikhonov filtering with α from the discrepancy principle.
    pub fn discrepancy(mut self, noise_level: f64) -> Self {
        self.cfg.method = RegularizationMethod::Tikhonov {
            parameter: TikhonovParameter::Discrepancy { noise_level },
        };
        self
    }
    /// Builds and returns the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first option that is out of range.
    pub fn build(self) -> Result<RegularizationConfig> {
        self.cfg.validate()?;
        Ok(self.cfg)
    }
}
