//! Windowing, indicator and scheduling options
//!
//! All option records are plain data with `serde` derives so an outer layer
//! can persist them; validation happens here, before any operator is built.

use crate::error::{ImagingError, Result};
use crate::types::TimeAxis;
use serde::{Deserialize, Serialize};
use solvers::RegularizationConfig;
use std::ops::Range;

/// Domain in which the operator is formed and regularized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RegularizationDomain {
    /// Circular convolution over the windowed samples.
    #[default]
    Time,
    /// Block-diagonal form over the real DFT bins.
    Frequency,
}

/// Inclusive time window `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: f64,
    pub end: f64,
}

/// Inclusive frequency band `[min, max]`, in inverse time units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub min: f64,
    pub max: f64,
}

impl FrequencyBand {
    pub fn contains(&self, frequency: f64) -> bool {
        frequency >= self.min && frequency <= self.max
    }
}

/// How recorded data are turned into an operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WindowConfig {
    /// Samples outside the window are dropped; `None` keeps the full axis.
    #[serde(default)]
    pub time_window: Option<TimeWindow>,
    /// Recorded samples with `|d| < noise_floor` are set to zero.
    #[serde(default)]
    pub noise_floor: f64,
    #[serde(default)]
    pub domain: RegularizationDomain,
    /// Frequency-domain only.
    #[serde(default)]
    pub frequency_band: Option<FrequencyBand>,
}

impl WindowConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(window) = self.time_window {
            if !(window.start.is_finite() && window.end.is_finite()) || window.start >= window.end {
                return Err(ImagingError::InvalidConfig(format!(
                    "time window [{}, {}] must be finite with start < end",
                    window.start, window.end
                )));
            }
        }
        if !(self.noise_floor.is_finite() && self.noise_floor >= 0.0) {
            return Err(ImagingError::InvalidConfig(format!(
                "noise floor {} must be finite and >= 0",
                self.noise_floor
            )));
        }
        if let Some(band) = self.frequency_band {
            if self.domain != RegularizationDomain::Frequency {
                return Err(ImagingError::InvalidConfig(
                    "a frequency band requires the frequency domain".to_string(),
                ));
            }
            if !(band.min.is_finite() && band.max.is_finite()) || band.min < 0.0 || band.min > band.max {
                return Err(ImagingError::InvalidConfig(format!(
                    "frequency band [{}, {}] must satisfy 0 <= min <= max",
                    band.min, band.max
                )));
            }
        }
        Ok(())
    }

    /// Sample indices kept by the window on `time_axis`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if fewer than two samples are selected.
    pub fn sample_range(&self, time_axis: &TimeAxis) -> Result<Range<usize>> {
        let range = match self.time_window {
            Some(window) => time_axis.window_indices(window.start, window.end),
            None => 0..time_axis.len(),
        };
        if range.len() < 2 {
            return Err(ImagingError::InvalidConfig(format!(
                "time window selects {} samples, at least 2 are required",
                range.len()
            )));
        }
        Ok(range)
    }
}

/// Builder for [`WindowConfig`]; `build()` validates.
#[derive(Debug, Clone, Default)]
pub struct WindowConfigBuilder {
    cfg: WindowConfig,
}

impl WindowConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }
    /// Keeps samples with `start ≤ t ≤ end`.
    pub fn time_window(mut self, start: f64, end: f64) -> Self {
        self.cfg.time_window = Some(TimeWindow { start, end });
        self
    }
    pub fn noise_floor(mut self, floor: f64) -> Self {
        self.cfg.noise_floor = floor;
        self
    }
    pub fn domain(mut self, domain: RegularizationDomain) -> Self {
        self.cfg.domain = domain;
        self
    }
    /// Restricts the frequency-domain operator to `[min, max]`.
    pub fn frequency_band(mut self, min: f64, max: f64) -> Self {
        self.cfg.frequency_band = Some(FrequencyBand { min, max });
        self
    }
    pub fn build(self) -> Result<WindowConfig> {
        self.cfg.validate()?;
        Ok(self.cfg)
    }
}

/// Reduction of a regularized solution to one indicator value.
///
/// Larger values always mean "more likely inside or near the scatterer".
/// A new reduction must keep that orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    /// `1 − (‖rhs − Aφ‖ / ‖rhs‖)²`, in `[0, 1]`.
    #[default]
    RangeProjection,
}

impl Indicator {
    /// Every offered reduction.
    pub const ALL: [Indicator; 1] = [Indicator::RangeProjection];
}

/// How grid indices are split between workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStrategy {
    /// Worker `w` gets one contiguous block of indices.
    #[default]
    Contiguous,
    /// Worker `w` gets indices `w, w + W, w + 2W, ...`.
    RoundRobin,
}

/// Worker pool configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SchedulerConfig {
    /// Number of worker threads (None = available cores)
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub chunking: ChunkStrategy,
}

impl SchedulerConfig {
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers: Some(workers),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == Some(0) {
            return Err(ImagingError::InvalidConfig(
                "worker count must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The effective worker count.
    pub fn resolved_workers(&self) -> usize {
        self.workers.unwrap_or_else(rayon::current_num_threads).max(1)
    }
}

/// Everything one imaging run needs besides the arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ImagingConfig {
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub regularization: RegularizationConfig,
    #[serde(default)]
    pub indicator: Indicator,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl ImagingConfig {
    pub fn validate(&self) -> Result<()> {
        self.window.validate()?;
        self.regularization.validate()?;
        self.scheduler.validate()?;
        Ok(())
    }
}
