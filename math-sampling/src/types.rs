//! Input data model: receivers, time axis, recorded data, impulse responses
//! and the search grid.
//!
//! Every constructor validates its invariants, so the rest of the crate can
//! index freely once a value exists.

use crate::error::{ImagingError, Result};
use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, Axis};
use std::ops::Range;

/// Relative tolerance used to decide whether a time axis is uniform.
const UNIFORM_STEP_TOLERANCE: f64 = 1e-6;

fn validate_points(what: &str, points: &Array2<f64>) -> Result<()> {
    let (count, dim) = points.dim();
    if count == 0 {
        return Err(ImagingError::InvalidInput(format!("{what}: no points")));
    }
    if dim != 2 && dim != 3 {
        return Err(ImagingError::InvalidInput(format!(
            "{what}: points must be 2-D or 3-D, got dimension {dim}"
        )));
    }
    if let Some(((i, _), _)) = points.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(ImagingError::InvalidInput(format!(
            "{what}: point {i} has a non-finite coordinate"
        )));
    }
    Ok(())
}

fn distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Ordered receiver coordinates, one row per receiver.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiverSet {
    coordinates: Array2<f64>,
}

impl ReceiverSet {
    pub fn new(coordinates: Array2<f64>) -> Result<Self> {
        validate_points("receivers", &coordinates)?;
        Ok(Self { coordinates })
    }

    /// Receivers in the plane.
    pub fn from_planar(points: &[[f64; 2]]) -> Result<Self> {
        let flat: Vec<f64> = points.iter().flatten().copied().collect();
        let coordinates = Array2::from_shape_vec((points.len(), 2), flat)
            .map_err(|e| ImagingError::InvalidInput(e.to_string()))?;
        Self::new(coordinates)
    }

    pub fn len(&self) -> usize {
        self.coordinates.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.nrows() == 0
    }

    /// Spatial dimension, 2 or 3
    pub fn dimension(&self) -> usize {
        self.coordinates.ncols()
    }

    pub fn position(&self, receiver: usize) -> ArrayView1<'_, f64> {
        self.coordinates.row(receiver)
    }

    pub fn coordinates(&self) -> &Array2<f64> {
        &self.coordinates
    }
}

/// Strictly increasing sample times shared by data and impulse responses.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeAxis {
    samples: Array1<f64>,
}

impl TimeAxis {
    pub fn new(samples: Array1<f64>) -> Result<Self> {
        if samples.len() < 2 {
            return Err(ImagingError::InvalidInput(format!(
                "time axis needs at least 2 samples, got {}",
                samples.len()
            )));
        }
        if let Some(i) = samples.iter().position(|t| !t.is_finite()) {
            return Err(ImagingError::InvalidInput(format!(
                "time sample {i} is not finite"
            )));
        }
        if let Some(i) = (1..samples.len()).find(|&i| samples[i] <= samples[i - 1]) {
            return Err(ImagingError::InvalidInput(format!(
                "time samples must be strictly increasing (sample {i})"
            )));
        }
        Ok(Self { samples })
    }

    /// `count` samples `start, start + step, ...`
    pub fn uniform(start: f64, step: f64, count: usize) -> Result<Self> {
        Self::new(Array1::from_iter(
            (0..count).map(|k| start + step * k as f64),
        ))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &Array1<f64> {
        &self.samples
    }

    pub fn start(&self) -> f64 {
        self.samples[0]
    }

    pub fn end(&self) -> f64 {
        self.samples[self.samples.len() - 1]
    }

    /// The sampling step if every spacing agrees with the mean spacing.
    pub fn uniform_step(&self) -> Option<f64> {
        let n = self.samples.len();
        let step = (self.end() - self.start()) / (n - 1) as f64;
        let uniform = self
            .samples
            .windows(2)
            .into_iter()
            .all(|w| ((w[1] - w[0]) - step).abs() <= UNIFORM_STEP_TOLERANCE * step);
        uniform.then_some(step)
    }

    /// Indices of the samples with `start ≤ t ≤ end`.
    pub fn window_indices(&self, start: f64, end: f64) -> Range<usize> {
        let first = self.samples.iter().position(|&t| t >= start);
        let last = self.samples.iter().rposition(|&t| t <= end);
        match (first, last) {
            (Some(first), Some(last)) if first <= last => first..last + 1,
            _ => 0..0,
        }
    }
}

/// Recorded scattered field, indexed `(receiver, time, source)`.
#[derive(Debug, Clone, PartialEq)]
pub struct DataVolume {
    values: Array3<f64>,
}

impl DataVolume {
    pub fn new(values: Array3<f64>) -> Result<Self> {
        let (receivers, samples, sources) = values.dim();
        if receivers == 0 || samples == 0 || sources == 0 {
            return Err(ImagingError::InvalidInput(format!(
                "data volume has an empty extent: {receivers}x{samples}x{sources}"
            )));
        }
        if let Some(((r, t, s), _)) = values.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(ImagingError::InvalidInput(format!(
                "data sample (receiver {r}, time {t}, source {s}) is not finite"
            )));
        }
        Ok(Self { values })
    }

    pub fn receivers(&self) -> usize {
        self.values.len_of(Axis(0))
    }

    pub fn samples(&self) -> usize {
        self.values.len_of(Axis(1))
    }

    pub fn sources(&self) -> usize {
        self.values.len_of(Axis(2))
    }

    pub fn values(&self) -> &Array3<f64> {
        &self.values
    }

    /// Trace recorded at `receiver` for `source`.
    pub fn trace(&self, receiver: usize, source: usize) -> ArrayView1<'_, f64> {
        self.values.slice(ndarray::s![receiver, .., source])
    }

    /// Check the receiver and time extents against the acquisition geometry.
    pub fn check_against(&self, receivers: &ReceiverSet, time_axis: &TimeAxis) -> Result<()> {
        if self.receivers() != receivers.len() {
            return Err(ImagingError::DimensionMismatch {
                what: "data receivers",
                expected: receivers.len(),
                got: self.receivers(),
            });
        }
        if self.samples() != time_axis.len() {
            return Err(ImagingError::DimensionMismatch {
                what: "data time samples",
                expected: time_axis.len(),
                got: self.samples(),
            });
        }
        Ok(())
    }
}

/// Simulated impulse responses, indexed `(receiver, time, grid point)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImpulseResponseVolume {
    values: Array3<f64>,
}

impl ImpulseResponseVolume {
    pub fn new(values: Array3<f64>) -> Result<Self> {
        let (receivers, samples, points) = values.dim();
        if receivers == 0 || samples == 0 || points == 0 {
            return Err(ImagingError::InvalidInput(format!(
                "impulse-response volume has an empty extent: {receivers}x{samples}x{points}"
            )));
        }
        if let Some(((r, t, p), _)) = values.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(ImagingError::InvalidInput(format!(
                "impulse response (receiver {r}, time {t}, point {p}) is not finite"
            )));
        }
        Ok(Self { values })
    }

    pub fn receivers(&self) -> usize {
        self.values.len_of(Axis(0))
    }

    pub fn samples(&self) -> usize {
        self.values.len_of(Axis(1))
    }

    pub fn points(&self) -> usize {
        self.values.len_of(Axis(2))
    }

    pub fn values(&self) -> &Array3<f64> {
        &self.values
    }

    /// Check the extents against the acquisition geometry and the grid.
    pub fn check_against(
        &self,
        receivers: &ReceiverSet,
        time_axis: &TimeAxis,
        grid: &SearchGrid,
    ) -> Result<()> {
        if self.receivers() != receivers.len() {
            return Err(ImagingError::DimensionMismatch {
                what: "impulse-response receivers",
                expected: receivers.len(),
                got: self.receivers(),
            });
        }
        if self.samples() != time_axis.len() {
            return Err(ImagingError::DimensionMismatch {
                what: "impulse-response time samples",
                expected: time_axis.len(),
                got: self.samples(),
            });
        }
        if self.points() != grid.len() {
            return Err(ImagingError::DimensionMismatch {
                what: "impulse-response grid points",
                expected: grid.len(),
                got: self.points(),
            });
        }
        if grid.dimension() != receivers.dimension() {
            return Err(ImagingError::DimensionMismatch {
                what: "grid dimension",
                expected: receivers.dimension(),
                got: grid.dimension(),
            });
        }
        Ok(())
    }

    /// All receiver traces for one grid point, `(receiver, time)`.
    pub fn column(&self, point: usize) -> ArrayView2<'_, f64> {
        self.values.index_axis(Axis(2), point)
    }
}

/// Ordered candidate points; output fields follow this order.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchGrid {
    points: Array2<f64>,
}

impl SearchGrid {
    pub fn new(points: Array2<f64>) -> Result<Self> {
        validate_points("search grid", &points)?;
        Ok(Self { points })
    }

    pub fn len(&self) -> usize {
        self.points.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.points.nrows() == 0
    }

    pub fn dimension(&self) -> usize {
        self.points.ncols()
    }

    pub fn point(&self, index: usize) -> ArrayView1<'_, f64> {
        self.points.row(index)
    }

    pub fn points(&self) -> &Array2<f64> {
        &self.points
    }

    /// Euclidean distance between two grid points.
    pub fn distance(&self, a: usize, b: usize) -> f64 {
        distance(self.point(a), self.point(b))
    }

    /// Distance from grid point `index` to a receiver.
    pub fn distance_to(&self, index: usize, position: ArrayView1<'_, f64>) -> f64 {
        distance(self.point(index), position)
    }
}
