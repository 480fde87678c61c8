//! Caller-owned cache of the operator and its factorization.
//!
//! Building and factorizing the operator dominates the cost of a run, and
//! both depend only on the recorded data and the windowing. A session keeps
//! them between runs over different grids or regularization settings and
//! drops them as soon as either input changes.

use crate::assembler::{ImageMetadata, ImagingResult};
use crate::config::{ImagingConfig, WindowConfig};
use crate::error::Result;
use crate::evaluator::GridEvaluator;
use crate::operator::SignalOperator;
use crate::scheduler::{CancelToken, ParallelScheduler};
use crate::types::{DataVolume, ImpulseResponseVolume, ReceiverSet, SearchGrid, TimeAxis};
use solvers::SvdFactorization;
use std::sync::Arc;

/// An operator together with its SVD.
#[derive(Debug)]
pub struct PreparedOperator {
    operator: SignalOperator,
    factorization: SvdFactorization,
}

impl PreparedOperator {
    /// Build and factorize in one step.
    pub fn prepare(
        receivers: &ReceiverSet,
        time_axis: &TimeAxis,
        data: &DataVolume,
        window: &WindowConfig,
    ) -> Result<Self> {
        let operator = SignalOperator::build(receivers, time_axis, data, window)?;
        let factorization = operator.factorize()?;
        Ok(Self {
            operator,
            factorization,
        })
    }

    pub fn operator(&self) -> &SignalOperator {
        &self.operator
    }

    pub fn factorization(&self) -> &SvdFactorization {
        &self.factorization
    }

    /// Image `grid` with an already running scheduler.
    pub fn image(
        &self,
        grid: &SearchGrid,
        impulse: &ImpulseResponseVolume,
        config: &ImagingConfig,
        scheduler: &ParallelScheduler,
        cancel: &CancelToken,
    ) -> Result<ImagingResult> {
        let evaluator = GridEvaluator::new(
            &self.operator,
            &self.factorization,
            impulse,
            grid,
            &config.regularization,
            config.indicator,
        )?;
        let (field, diagnostics) = scheduler.run_cancellable(grid, &evaluator, cancel)?;
        let ill_conditioned = diagnostics.ill_conditioned_points().len();
        if ill_conditioned > 0 {
            log::warn!(
                "{ill_conditioned} of {} grid points are ill-conditioned",
                grid.len()
            );
        }
        let (rows, cols) = self.operator.shape();
        Ok(ImagingResult {
            field,
            diagnostics,
            metadata: ImageMetadata {
                domain: self.operator.domain(),
                indicator: config.indicator,
                regularization: config.regularization,
                operator_rows: rows,
                operator_cols: cols,
                workers: scheduler.workers(),
                singular_values: self.factorization.singular_values().to_vec(),
            },
        })
    }
}

/// Inputs of one acquisition plus the cached operator built from them.
#[derive(Debug)]
pub struct ImagingSession {
    receivers: ReceiverSet,
    time_axis: TimeAxis,
    data: DataVolume,
    window: WindowConfig,
    prepared: Option<Arc<PreparedOperator>>,
    factorizations: usize,
}

impl ImagingSession {
    /// Validate the inputs; nothing is built until the first run.
    pub fn new(
        receivers: ReceiverSet,
        time_axis: TimeAxis,
        data: DataVolume,
        window: WindowConfig,
    ) -> Result<Self> {
        window.validate()?;
        data.check_against(&receivers, &time_axis)?;
        window.sample_range(&time_axis)?;
        Ok(Self {
            receivers,
            time_axis,
            data,
            window,
            prepared: None,
            factorizations: 0,
        })
    }

    pub fn receivers(&self) -> &ReceiverSet {
        &self.receivers
    }

    pub fn time_axis(&self) -> &TimeAxis {
        &self.time_axis
    }

    pub fn data(&self) -> &DataVolume {
        &self.data
    }

    pub fn window(&self) -> &WindowConfig {
        &self.window
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared.is_some()
    }

    /// How many times the operator has been factorized by this session.
    pub fn factorization_count(&self) -> usize {
        self.factorizations
    }

    /// Drop the cached operator and factorization.
    pub fn invalidate(&mut self) {
        if self.prepared.take().is_some() {
            log::debug!("Imaging session cache invalidated");
        }
    }

    /// Change the windowing; the cache is dropped if it differs.
    pub fn set_window(&mut self, window: WindowConfig) -> Result<()> {
        window.validate()?;
        window.sample_range(&self.time_axis)?;
        if window != self.window {
            self.window = window;
            self.invalidate();
        }
        Ok(())
    }

    /// Swap in a new recording with the same geometry.
    pub fn replace_data(&mut self, data: DataVolume) -> Result<()> {
        data.check_against(&self.receivers, &self.time_axis)?;
        self.data = data;
        self.invalidate();
        Ok(())
    }

    /// The cached operator, built and factorized on first use.
    pub fn prepare(&mut self) -> Result<Arc<PreparedOperator>> {
        if let Some(prepared) = &self.prepared {
            return Ok(Arc::clone(prepared));
        }
        let prepared = Arc::new(PreparedOperator::prepare(
            &self.receivers,
            &self.time_axis,
            &self.data,
            &self.window,
        )?);
        self.factorizations += 1;
        self.prepared = Some(Arc::clone(&prepared));
        Ok(prepared)
    }

    /// Image a grid, reusing the cached factorization when possible.
    ///
    /// `config.window` replaces the session window first (and invalidates
    /// the cache if it differs).
    pub fn image(
        &mut self,
        grid: &SearchGrid,
        impulse: &ImpulseResponseVolume,
        config: &ImagingConfig,
    ) -> Result<ImagingResult> {
        config.validate()?;
        let scheduler = ParallelScheduler::new(&config.scheduler)?;
        self.image_with(grid, impulse, config, &scheduler, &CancelToken::new())
    }

    /// Like [`image`](Self::image) with a caller-provided pool and token.
    pub fn image_with(
        &mut self,
        grid: &SearchGrid,
        impulse: &ImpulseResponseVolume,
        config: &ImagingConfig,
        scheduler: &ParallelScheduler,
        cancel: &CancelToken,
    ) -> Result<ImagingResult> {
        config.validate()?;
        self.set_window(config.window.clone())?;
        impulse.check_against(&self.receivers, &self.time_axis, grid)?;
        let prepared = self.prepare()?;
        prepared.operator().check_impulse_volume(impulse, grid)?;
        prepared.image(grid, impulse, config, scheduler, cancel)
    }
}
