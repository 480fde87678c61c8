//! Synthetic acquisitions for tests, benches and the demo binary.
//!
//! A single point scatterer in a homogeneous medium, observed by receivers on
//! a circle. Impulse responses are delayed tone bursts; the "recorded" data
//! is the impulse response of one chosen grid point, so the scatterer sits
//! exactly on the grid.

use crate::error::{ImagingError, Result};
use crate::types::{DataVolume, ImpulseResponseVolume, ReceiverSet, SearchGrid, TimeAxis};
use ndarray::{Array2, Array3, s};
use std::f64::consts::PI;

/// Parameters of a synthetic point-scatterer acquisition.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioParams {
    pub receivers: usize,
    pub radius: f64,
    pub samples: usize,
    pub time_step: f64,
    pub wave_speed: f64,
    pub center_frequency: f64,
    /// Gaussian envelope width of the burst, in seconds
    pub envelope_width: f64,
    /// Time at which the source fires
    pub onset: f64,
    pub grid_x: (f64, f64, usize),
    pub grid_y: (f64, f64, usize),
    /// Grid index the data is generated from
    pub scatterer: usize,
}

impl Default for ScenarioParams {
    fn default() -> Self {
        Self {
            receivers: 8,
            radius: 10.0,
            samples: 200,
            time_step: 0.05,
            wave_speed: 2.5,
            center_frequency: 1.0,
            envelope_width: 0.8,
            onset: 2.0,
            grid_x: (-4.0, 4.0, 10),
            grid_y: (-2.0, 2.0, 5),
            scatterer: 12,
        }
    }
}

/// Gaussian-windowed sine burst centred on `tau = 0`.
pub fn tone_burst(tau: f64, frequency: f64, width: f64) -> f64 {
    (2.0 * PI * frequency * tau).sin() * (-(tau / width).powi(2)).exp()
}

/// `count` receivers evenly spaced on a circle around the origin.
pub fn circular_receivers(count: usize, radius: f64) -> Result<ReceiverSet> {
    let coordinates = Array2::from_shape_fn((count, 2), |(i, axis)| {
        let angle = 2.0 * PI * i as f64 / count as f64;
        if axis == 0 {
            radius * angle.cos()
        } else {
            radius * angle.sin()
        }
    });
    ReceiverSet::new(coordinates)
}

/// Regular planar lattice, row-major: index `iy * nx + ix`.
pub fn lattice_grid(x: (f64, f64, usize), y: (f64, f64, usize)) -> Result<SearchGrid> {
    let (x0, x1, nx) = x;
    let (y0, y1, ny) = y;
    if nx < 2 || ny < 2 {
        return Err(ImagingError::InvalidInput(format!(
            "lattice needs at least 2 points per axis, got {nx}x{ny}"
        )));
    }
    let dx = (x1 - x0) / (nx - 1) as f64;
    let dy = (y1 - y0) / (ny - 1) as f64;
    let points = Array2::from_shape_fn((nx * ny, 2), |(index, axis)| {
        if axis == 0 {
            x0 + dx * (index % nx) as f64
        } else {
            y0 + dy * (index / nx) as f64
        }
    });
    SearchGrid::new(points)
}

/// Burst emitted at every grid point and received after the direct travel time.
pub fn impulse_responses(
    params: &ScenarioParams,
    receivers: &ReceiverSet,
    grid: &SearchGrid,
) -> Result<ImpulseResponseVolume> {
    let values = Array3::from_shape_fn(
        (receivers.len(), params.samples, grid.len()),
        |(r, k, p)| {
            let delay = grid.distance_to(p, receivers.position(r)) / params.wave_speed;
            let tau = k as f64 * params.time_step - params.onset - delay;
            tone_burst(tau, params.center_frequency, params.envelope_width)
        },
    );
    ImpulseResponseVolume::new(values)
}

/// Single-source data: the impulse response of grid point `scatterer`.
pub fn point_scatterer_data(impulse: &ImpulseResponseVolume, scatterer: usize) -> Result<DataVolume> {
    if scatterer >= impulse.points() {
        return Err(ImagingError::InvalidInput(format!(
            "scatterer index {scatterer} outside a grid of {} points",
            impulse.points()
        )));
    }
    let column = impulse.values().slice(s![.., .., scatterer..scatterer + 1]);
    DataVolume::new(column.to_owned())
}

/// A complete acquisition with a known answer.
#[derive(Debug, Clone)]
pub struct SyntheticScenario {
    pub params: ScenarioParams,
    pub receivers: ReceiverSet,
    pub time_axis: TimeAxis,
    pub grid: SearchGrid,
    pub impulse: ImpulseResponseVolume,
    pub data: DataVolume,
}

impl SyntheticScenario {
    pub fn generate(params: ScenarioParams) -> Result<Self> {
        let receivers = circular_receivers(params.receivers, params.radius)?;
        let time_axis = TimeAxis::uniform(0.0, params.time_step, params.samples)?;
        let grid = lattice_grid(params.grid_x, params.grid_y)?;
        let impulse = impulse_responses(&params, &receivers, &grid)?;
        let data = point_scatterer_data(&impulse, params.scatterer)?;
        Ok(Self {
            params,
            receivers,
            time_axis,
            grid,
            impulse,
            data,
        })
    }

    /// Eight receivers, 200 samples, a 10x5 grid with the scatterer at index 12.
    pub fn standard() -> Result<Self> {
        Self::generate(ScenarioParams::default())
    }

    pub fn scatterer(&self) -> usize {
        self.params.scatterer
    }

    /// Grid indices at least `distance` away from the scatterer.
    pub fn far_points(&self, distance: f64) -> Vec<usize> {
        (0..self.grid.len())
            .filter(|&i| self.grid.distance(i, self.params.scatterer) >= distance)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_lattice_ordering() {
        let grid = lattice_grid((-4.0, 4.0, 10), (-2.0, 2.0, 5)).unwrap();
        assert_eq!(grid.len(), 50);
        assert_relative_eq!(grid.point(0)[0], -4.0);
        assert_relative_eq!(grid.point(0)[1], -2.0);
        assert_relative_eq!(grid.point(12)[0], -4.0 + 16.0 / 9.0, epsilon = 1e-12);
        assert_relative_eq!(grid.point(12)[1], -1.0, epsilon = 1e-12);
        assert_relative_eq!(grid.point(49)[0], 4.0, epsilon = 1e-12);
        assert_relative_eq!(grid.point(49)[1], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_receivers_on_circle() {
        let receivers = circular_receivers(8, 10.0).unwrap();
        assert_eq!(receivers.len(), 8);
        for r in 0..8 {
            let p = receivers.position(r);
            assert_relative_eq!(p[0].hypot(p[1]), 10.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_standard_scenario_shapes() {
        let scenario = SyntheticScenario::standard().unwrap();
        assert_eq!(scenario.data.values().dim(), (8, 200, 1));
        assert_eq!(scenario.impulse.values().dim(), (8, 200, 50));
        assert_eq!(
            scenario.data.trace(3, 0),
            scenario.impulse.column(12).row(3)
        );
        assert!(!scenario.far_points(3.0).contains(&12));
    }

    #[test]
    fn test_impulse_delay_follows_distance() {
        let params = ScenarioParams::default();
        let receivers = circular_receivers(params.receivers, params.radius).unwrap();
        let grid = lattice_grid(params.grid_x, params.grid_y).unwrap();
        let impulse = impulse_responses(&params, &receivers, &grid).unwrap();

        // receiver 2 sits at (0, 10); grid point 49 at (4, 2)
        let distance = (4.0_f64).hypot(8.0);
        assert_relative_eq!(grid.distance_to(49, receivers.position(2)), distance, epsilon = 1e-9);
        for k in [60, 90, 120] {
            let tau = k as f64 * params.time_step - params.onset - distance / params.wave_speed;
            let expected = tone_burst(tau, params.center_frequency, params.envelope_width);
            assert_relative_eq!(impulse.values()[[2, k, 49]], expected, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_burst_decays() {
        assert_eq!(tone_burst(0.0, 1.0, 0.8), 0.0);
        assert!(tone_burst(10.0, 1.0, 0.8).abs() < 1e-40);
        assert!(tone_burst(0.25, 1.0, 0.8) > 0.8);
    }

    #[test]
    fn test_scatterer_out_of_range() {
        let scenario = SyntheticScenario::standard().unwrap();
        assert!(point_scatterer_data(&scenario.impulse, 50).is_err());
    }
}
