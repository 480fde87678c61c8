//! Data-derived imaging operator.
//!
//! The recorded traces define a multi-channel circular convolution
//!
//! ```text
//! (A φ)(r, t) = Σ_s Σ_τ d(r, (t − τ) mod Tw, s) φ(s, τ)
//! ```
//!
//! over the `Tw` windowed samples. In the time domain this is stored as a
//! dense `(R·Tw) × (S·Tw)` matrix. In the frequency domain the DFT
//! block-diagonalizes it, and the retained bins are stored as realified
//! blocks, which is the same operator up to orthogonal changes of basis.
//!
//! A grid point's right-hand side is its windowed impulse response, mapped
//! into the same row ordering by [`SignalOperator::test_function`].

use crate::config::{RegularizationDomain, WindowConfig};
use crate::error::{ImagingError, OperatorAxis, Result};
use crate::spectrum::{FrequencyBin, SpectrumPlan};
use crate::types::{DataVolume, ImpulseResponseVolume, ReceiverSet, SearchGrid, TimeAxis};
use ndarray::{Array1, Array2, Array3, s};
use solvers::{LinearOperator, SvdFactorization};
use std::ops::Range;
use std::time::Instant;

/// Meaning of every row and column of the operator matrix.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorLayout {
    /// Row `r·Tw + t`, column `s·Tw + τ`.
    Time {
        receivers: usize,
        sources: usize,
        samples: usize,
        first_sample: usize,
    },
    /// Bin-major blocks; inside a block, row `r·p + part`, column
    /// `s·p + part` with `p` = 1 (self-conjugate) or 2 (real, imaginary).
    Frequency {
        receivers: usize,
        sources: usize,
        bins: Vec<FrequencyBin>,
        row_offsets: Vec<usize>,
        col_offsets: Vec<usize>,
    },
}

fn part_name(bin: &FrequencyBin, part: usize) -> &'static str {
    match (bin.self_conjugate, part) {
        (true, _) => "real",
        (false, 0) => "re",
        (false, _) => "im",
    }
}

impl OperatorLayout {
    pub fn rows(&self) -> usize {
        match self {
            OperatorLayout::Time {
                receivers, samples, ..
            } => receivers * samples,
            OperatorLayout::Frequency {
                receivers, bins, ..
            } => bins.iter().map(|b| receivers * b.parts()).sum(),
        }
    }

    pub fn cols(&self) -> usize {
        match self {
            OperatorLayout::Time {
                sources, samples, ..
            } => sources * samples,
            OperatorLayout::Frequency { sources, bins, .. } => {
                bins.iter().map(|b| sources * b.parts()).sum()
            }
        }
    }

    pub fn domain(&self) -> RegularizationDomain {
        match self {
            OperatorLayout::Time { .. } => RegularizationDomain::Time,
            OperatorLayout::Frequency { .. } => RegularizationDomain::Frequency,
        }
    }

    /// Human-readable position of a row, e.g. `receiver 3, sample 40`.
    pub fn describe_row(&self, row: usize) -> String {
        match self {
            OperatorLayout::Time {
                samples,
                first_sample,
                ..
            } => format!(
                "receiver {}, sample {}",
                row / samples,
                first_sample + row % samples
            ),
            OperatorLayout::Frequency {
                bins, row_offsets, ..
            } => {
                let (bin, local) = locate(bins, row_offsets, row);
                let parts = bin.parts();
                format!(
                    "receiver {}, bin {} ({})",
                    local / parts,
                    bin.index,
                    part_name(bin, local % parts)
                )
            }
        }
    }

    /// Human-readable position of a column, e.g. `source 0, shift 12`.
    pub fn describe_column(&self, col: usize) -> String {
        match self {
            OperatorLayout::Time { samples, .. } => {
                format!("source {}, shift {}", col / samples, col % samples)
            }
            OperatorLayout::Frequency {
                bins, col_offsets, ..
            } => {
                let (bin, local) = locate(bins, col_offsets, col);
                let parts = bin.parts();
                format!(
                    "source {}, bin {} ({})",
                    local / parts,
                    bin.index,
                    part_name(bin, local % parts)
                )
            }
        }
    }
}

fn locate<'a>(bins: &'a [FrequencyBin], offsets: &[usize], index: usize) -> (&'a FrequencyBin, usize) {
    let b = offsets.partition_point(|&o| o <= index).saturating_sub(1);
    (&bins[b], index - offsets[b])
}

/// The imaging operator built from one data volume and one windowing setup.
#[derive(Debug, Clone)]
pub struct SignalOperator {
    matrix: Array2<f64>,
    layout: OperatorLayout,
    window: WindowConfig,
    samples: Range<usize>,
    time_len: usize,
    spectrum: Option<SpectrumPlan>,
}

impl SignalOperator {
    /// Build the operator matrix.
    ///
    /// # Errors
    ///
    /// - `DimensionMismatch` if the data extents disagree with the receivers
    ///   or the time axis
    /// - `InvalidConfig` for an inconsistent window, a window shorter than two
    ///   samples, a non-uniform axis in the frequency domain or an empty band
    /// - `DegenerateOperator` if a row or column is identically zero
    pub fn build(
        receivers: &ReceiverSet,
        time_axis: &TimeAxis,
        data: &DataVolume,
        window: &WindowConfig,
    ) -> Result<Self> {
        window.validate()?;
        data.check_against(receivers, time_axis)?;
        let samples = window.sample_range(time_axis)?;
        let start = Instant::now();

        let floor = window.noise_floor;
        let traces: Array3<f64> = data
            .values()
            .slice(s![.., samples.clone(), ..])
            .mapv(|v| if v.abs() < floor { 0.0 } else { v });

        let (matrix, layout, spectrum) = match window.domain {
            RegularizationDomain::Time => {
                let (matrix, layout) = time_domain_matrix(&traces, samples.start);
                (matrix, layout, None)
            }
            RegularizationDomain::Frequency => {
                let step = time_axis.uniform_step().ok_or_else(|| {
                    ImagingError::InvalidConfig(
                        "the frequency domain requires a uniform time axis".to_string(),
                    )
                })?;
                let plan = SpectrumPlan::new(samples.len(), step, window.frequency_band);
                if plan.bins().is_empty() {
                    return Err(ImagingError::InvalidConfig(
                        "the frequency band selects no DFT bin".to_string(),
                    ));
                }
                let (matrix, layout) = frequency_domain_matrix(&traces, &plan);
                (matrix, layout, Some(plan))
            }
        };

        check_degenerate(&matrix, &layout)?;

        log::info!(
            "Built {:?}-domain operator {}x{} ({} receivers, {} sources, {} samples) in {:.2?}",
            window.domain,
            matrix.nrows(),
            matrix.ncols(),
            data.receivers(),
            data.sources(),
            samples.len(),
            start.elapsed()
        );

        Ok(Self {
            matrix,
            layout,
            window: window.clone(),
            samples,
            time_len: time_axis.len(),
            spectrum,
        })
    }

    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    pub fn layout(&self) -> &OperatorLayout {
        &self.layout
    }

    pub fn window(&self) -> &WindowConfig {
        &self.window
    }

    pub fn domain(&self) -> RegularizationDomain {
        self.layout.domain()
    }

    /// Indices of the time samples kept by the window.
    pub fn sample_range(&self) -> Range<usize> {
        self.samples.clone()
    }

    /// Retained DFT bins, frequency domain only.
    pub fn bins(&self) -> Option<&[FrequencyBin]> {
        self.spectrum.as_ref().map(SpectrumPlan::bins)
    }

    pub fn shape(&self) -> (usize, usize) {
        self.matrix.dim()
    }

    /// Thin SVD of the operator matrix.
    pub fn factorize(&self) -> Result<SvdFactorization> {
        let start = Instant::now();
        let factorization = SvdFactorization::factorize(&self.matrix)?;
        log::info!(
            "Factorized {}x{} operator in {:.2?} (sigma_max={:.3e}, cond={:.3e})",
            self.matrix.nrows(),
            self.matrix.ncols(),
            start.elapsed(),
            factorization.largest_singular_value(),
            factorization.condition_number()
        );
        Ok(factorization)
    }

    /// Check an impulse-response volume against this operator and the grid.
    pub fn check_impulse_volume(
        &self,
        impulse: &ImpulseResponseVolume,
        grid: &SearchGrid,
    ) -> Result<()> {
        let receivers = match &self.layout {
            OperatorLayout::Time { receivers, .. } | OperatorLayout::Frequency { receivers, .. } => {
                *receivers
            }
        };
        if impulse.receivers() != receivers {
            return Err(ImagingError::DimensionMismatch {
                what: "impulse-response receivers",
                expected: receivers,
                got: impulse.receivers(),
            });
        }
        if impulse.samples() != self.time_len {
            return Err(ImagingError::DimensionMismatch {
                what: "impulse-response time samples",
                expected: self.time_len,
                got: impulse.samples(),
            });
        }
        if impulse.points() != grid.len() {
            return Err(ImagingError::DimensionMismatch {
                what: "impulse-response grid points",
                expected: grid.len(),
                got: impulse.points(),
            });
        }
        Ok(())
    }

    /// Right-hand side for grid point `point`, in the operator's row order.
    pub fn test_function(&self, impulse: &ImpulseResponseVolume, point: usize) -> Result<Array1<f64>> {
        if point >= impulse.points() {
            return Err(ImagingError::InvalidInput(format!(
                "grid point {point} out of range ({} points)",
                impulse.points()
            )));
        }
        let column = impulse.column(point);
        let (receivers, time_len) = column.dim();
        if time_len != self.time_len {
            return Err(ImagingError::DimensionMismatch {
                what: "impulse-response time samples",
                expected: self.time_len,
                got: time_len,
            });
        }
        let windowed = column.slice(s![.., self.samples.clone()]);

        match (&self.layout, &self.spectrum) {
            (OperatorLayout::Frequency { row_offsets, bins, .. }, Some(plan)) => {
                let mut rhs = Array1::zeros(self.matrix.nrows());
                for r in 0..receivers {
                    let parts = plan.realify(windowed.row(r).iter().copied());
                    let mut cursor = 0;
                    for (bin, &offset) in bins.iter().zip(row_offsets.iter()) {
                        let p = bin.parts();
                        for part in 0..p {
                            rhs[offset + r * p + part] = parts[cursor];
                            cursor += 1;
                        }
                    }
                }
                Ok(rhs)
            }
            _ => Ok(Array1::from_iter(windowed.iter().copied())),
        }
    }
}

impl LinearOperator for SignalOperator {
    fn num_rows(&self) -> usize {
        self.matrix.nrows()
    }

    fn num_cols(&self) -> usize {
        self.matrix.ncols()
    }

    fn apply(&self, x: &Array1<f64>) -> Array1<f64> {
        self.matrix.dot(x)
    }

    fn apply_transpose(&self, x: &Array1<f64>) -> Array1<f64> {
        self.matrix.t().dot(x)
    }
}

fn time_domain_matrix(traces: &Array3<f64>, first_sample: usize) -> (Array2<f64>, OperatorLayout) {
    let (receivers, tw, sources) = traces.dim();
    let mut matrix = Array2::zeros((receivers * tw, sources * tw));
    for r in 0..receivers {
        for src in 0..sources {
            for t in 0..tw {
                for tau in 0..tw {
                    matrix[[r * tw + t, src * tw + tau]] = traces[[r, (t + tw - tau) % tw, src]];
                }
            }
        }
    }
    let layout = OperatorLayout::Time {
        receivers,
        sources,
        samples: tw,
        first_sample,
    };
    (matrix, layout)
}

fn frequency_domain_matrix(traces: &Array3<f64>, plan: &SpectrumPlan) -> (Array2<f64>, OperatorLayout) {
    let (receivers, _, sources) = traces.dim();
    let bins = plan.bins();
    let row_offsets = block_offsets(receivers, bins);
    let col_offsets = block_offsets(sources, bins);
    let layout = OperatorLayout::Frequency {
        receivers,
        sources,
        bins: bins.to_vec(),
        row_offsets: row_offsets.clone(),
        col_offsets: col_offsets.clone(),
    };
    let mut matrix = Array2::zeros((layout.rows(), layout.cols()));

    for r in 0..receivers {
        for src in 0..sources {
            let spectrum = plan.transform(traces.slice(s![r, .., src]).iter().copied());
            for (b, bin) in bins.iter().enumerate() {
                let x = spectrum[bin.index];
                let (ro, co) = (row_offsets[b], col_offsets[b]);
                if bin.self_conjugate {
                    matrix[[ro + r, co + src]] = x.re;
                } else {
                    matrix[[ro + 2 * r, co + 2 * src]] = x.re;
                    matrix[[ro + 2 * r, co + 2 * src + 1]] = -x.im;
                    matrix[[ro + 2 * r + 1, co + 2 * src]] = x.im;
                    matrix[[ro + 2 * r + 1, co + 2 * src + 1]] = x.re;
                }
            }
        }
    }
    (matrix, layout)
}

/// Start of each bin's block when every channel contributes `parts` entries.
fn block_offsets(channels: usize, bins: &[FrequencyBin]) -> Vec<usize> {
    bins.iter()
        .scan(0, |next, bin| {
            let offset = *next;
            *next += channels * bin.parts();
            Some(offset)
        })
        .collect()
}

fn check_degenerate(matrix: &Array2<f64>, layout: &OperatorLayout) -> Result<()> {
    let is_zero = |v: ndarray::ArrayView1<'_, f64>| v.iter().all(|&x| x == 0.0);
    if let Some(index) = matrix.rows().into_iter().position(is_zero) {
        return Err(ImagingError::DegenerateOperator {
            axis: OperatorAxis::Row,
            index,
            label: layout.describe_row(index),
        });
    }
    if let Some(index) = matrix.columns().into_iter().position(is_zero) {
        return Err(ImagingError::DegenerateOperator {
            axis: OperatorAxis::Column,
            index,
            label: layout.describe_column(index),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WindowConfigBuilder;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn small_inputs() -> (ReceiverSet, TimeAxis, DataVolume) {
        let receivers = ReceiverSet::from_planar(&[[0.0, 0.0], [1.0, 0.0]]).unwrap();
        let time_axis = TimeAxis::uniform(0.0, 1.0, 4).unwrap();
        let mut values = Array3::zeros((2, 4, 1));
        for (t, v) in [1.0, 2.0, 3.0, 4.0].into_iter().enumerate() {
            values[[0, t, 0]] = v;
            values[[1, t, 0]] = -v;
        }
        (receivers, time_axis, DataVolume::new(values).unwrap())
    }

    #[test]
    fn test_time_domain_is_circulant() {
        let (receivers, time_axis, data) = small_inputs();
        let op = SignalOperator::build(&receivers, &time_axis, &data, &WindowConfig::default())
            .unwrap();

        assert_eq!(op.shape(), (8, 4));
        let m = op.matrix();
        // first receiver block is the circulant of [1, 2, 3, 4]
        assert_eq!(m.row(0).to_vec(), vec![1.0, 4.0, 3.0, 2.0]);
        assert_eq!(m.row(1).to_vec(), vec![2.0, 1.0, 4.0, 3.0]);
        assert_eq!(m.row(4).to_vec(), vec![-1.0, -4.0, -3.0, -2.0]);

        // applying to a unit impulse at shift 0 reproduces the traces
        let y = op.apply(&array![1.0, 0.0, 0.0, 0.0]);
        assert_eq!(y.to_vec(), vec![1.0, 2.0, 3.0, 4.0, -1.0, -2.0, -3.0, -4.0]);
    }

    #[test]
    fn test_build_is_deterministic() {
        let (receivers, time_axis, data) = small_inputs();
        let cfg = WindowConfigBuilder::new()
            .domain(RegularizationDomain::Frequency)
            .build()
            .unwrap();
        let a = SignalOperator::build(&receivers, &time_axis, &data, &cfg).unwrap();
        let b = SignalOperator::build(&receivers, &time_axis, &data, &cfg).unwrap();

        assert_eq!(a.matrix(), b.matrix());
    }

    #[test]
    fn test_window_selects_samples() {
        let (receivers, time_axis, data) = small_inputs();
        let cfg = WindowConfigBuilder::new().time_window(1.0, 3.0).build().unwrap();
        let op = SignalOperator::build(&receivers, &time_axis, &data, &cfg).unwrap();

        assert_eq!(op.sample_range(), 1..4);
        assert_eq!(op.shape(), (6, 3));
        assert_eq!(op.matrix().row(0).to_vec(), vec![2.0, 4.0, 3.0]);
        assert_eq!(op.layout().describe_row(4), "receiver 1, sample 2");
    }

    #[test]
    fn test_receiver_mismatch() {
        let (_, time_axis, data) = small_inputs();
        let receivers = ReceiverSet::from_planar(&[[0.0, 0.0]]).unwrap();
        let err = SignalOperator::build(&receivers, &time_axis, &data, &WindowConfig::default())
            .unwrap_err();

        assert!(matches!(
            err,
            ImagingError::DimensionMismatch {
                what: "data receivers",
                expected: 1,
                got: 2
            }
        ));
    }

    #[test]
    fn test_noise_floor_degenerates_receiver() {
        let (receivers, time_axis, mut data) = small_inputs();
        let mut values = data.values().clone();
        for t in 0..4 {
            values[[1, t, 0]] = 1e-4;
        }
        data = DataVolume::new(values).unwrap();

        let cfg = WindowConfigBuilder::new().noise_floor(1e-3).build().unwrap();
        let err = SignalOperator::build(&receivers, &time_axis, &data, &cfg).unwrap_err();
        match err {
            ImagingError::DegenerateOperator { axis, index, label } => {
                assert_eq!(axis, OperatorAxis::Row);
                assert_eq!(index, 4);
                assert_eq!(label, "receiver 1, sample 0");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_frequency_layout_labels() {
        let (receivers, time_axis, data) = small_inputs();
        let cfg = WindowConfigBuilder::new()
            .domain(RegularizationDomain::Frequency)
            .build()
            .unwrap();
        let op = SignalOperator::build(&receivers, &time_axis, &data, &cfg).unwrap();

        // Tw = 4: bins 0 (real), 1 (pair), 2 (real) -> 4 rows per receiver
        assert_eq!(op.shape(), (8, 4));
        assert_eq!(op.layout().describe_row(0), "receiver 0, bin 0 (real)");
        assert_eq!(op.layout().describe_row(1), "receiver 1, bin 0 (real)");
        assert_eq!(op.layout().describe_row(3), "receiver 0, bin 1 (im)");
        assert_eq!(op.layout().describe_row(6), "receiver 0, bin 2 (real)");
        assert_eq!(op.layout().describe_column(2), "source 0, bin 1 (im)");

        // DC of [1, 2, 3, 4] is 10
        assert_relative_eq!(op.matrix()[[0, 0]], 10.0, epsilon = 1e-12);
        assert_relative_eq!(op.matrix()[[1, 0]], -10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_frequency_domain_same_singular_values() {
        let (receivers, time_axis, data) = small_inputs();
        let time_op =
            SignalOperator::build(&receivers, &time_axis, &data, &WindowConfig::default()).unwrap();
        let cfg = WindowConfigBuilder::new()
            .domain(RegularizationDomain::Frequency)
            .build()
            .unwrap();
        let freq_op = SignalOperator::build(&receivers, &time_axis, &data, &cfg).unwrap();

        let a = time_op.factorize().unwrap();
        let b = freq_op.factorize().unwrap();
        for (x, y) in a.singular_values().iter().zip(b.singular_values().iter()) {
            assert_relative_eq!(*x, *y, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_frequency_requires_uniform_axis() {
        let (receivers, _, data) = small_inputs();
        let time_axis = TimeAxis::new(array![0.0, 1.0, 3.0, 4.0]).unwrap();
        let cfg = WindowConfigBuilder::new()
            .domain(RegularizationDomain::Frequency)
            .build()
            .unwrap();

        let err = SignalOperator::build(&receivers, &time_axis, &data, &cfg).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_empty_band_rejected() {
        let (receivers, time_axis, data) = small_inputs();
        let cfg = WindowConfigBuilder::new()
            .domain(RegularizationDomain::Frequency)
            .frequency_band(0.3, 0.4)
            .build()
            .unwrap();

        let err = SignalOperator::build(&receivers, &time_axis, &data, &cfg).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_time_test_function_ordering() {
        let (receivers, time_axis, data) = small_inputs();
        let cfg = WindowConfigBuilder::new().time_window(1.0, 3.0).build().unwrap();
        let op = SignalOperator::build(&receivers, &time_axis, &data, &cfg).unwrap();

        let mut values = Array3::zeros((2, 4, 2));
        for r in 0..2 {
            for t in 0..4 {
                values[[r, t, 1]] = (10 * r + t) as f64;
            }
        }
        let impulse = ImpulseResponseVolume::new(values).unwrap();
        let rhs = op.test_function(&impulse, 1).unwrap();

        assert_eq!(rhs.to_vec(), vec![1.0, 2.0, 3.0, 11.0, 12.0, 13.0]);
        assert!(op.test_function(&impulse, 2).is_err());
    }

    #[test]
    fn test_frequency_test_function_preserves_norm() {
        let (receivers, time_axis, data) = small_inputs();
        let cfg = WindowConfigBuilder::new()
            .domain(RegularizationDomain::Frequency)
            .build()
            .unwrap();
        let op = SignalOperator::build(&receivers, &time_axis, &data, &cfg).unwrap();

        let impulse = ImpulseResponseVolume::new(
            Array3::from_shape_fn((2, 4, 1), |(r, t, _)| (r as f64 + 1.0) * (t as f64 - 1.5)),
        )
        .unwrap();
        let rhs = op.test_function(&impulse, 0).unwrap();
        let energy: f64 = impulse.values().iter().map(|v| v * v).sum();

        assert_eq!(rhs.len(), 8);
        assert_relative_eq!(rhs.dot(&rhs), energy, max_relative = 1e-12);
    }

    #[test]
    fn test_check_impulse_volume() {
        let (receivers, time_axis, data) = small_inputs();
        let op = SignalOperator::build(&receivers, &time_axis, &data, &WindowConfig::default())
            .unwrap();
        let grid = SearchGrid::new(array![[0.0, 1.0], [1.0, 1.0]]).unwrap();

        let ok = ImpulseResponseVolume::new(Array3::ones((2, 4, 2))).unwrap();
        assert!(op.check_impulse_volume(&ok, &grid).is_ok());

        let wrong_points = ImpulseResponseVolume::new(Array3::ones((2, 4, 3))).unwrap();
        assert!(
            op.check_impulse_volume(&wrong_points, &grid)
                .unwrap_err()
                .is_dimension_error()
        );

        let wrong_receivers = ImpulseResponseVolume::new(Array3::ones((3, 4, 2))).unwrap();
        assert!(
            op.check_impulse_volume(&wrong_receivers, &grid)
                .unwrap_err()
                .is_dimension_error()
        );
    }
}
