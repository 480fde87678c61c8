//! Sampling-method imaging of hidden scatterers from time-domain data
//!
//! Given traces recorded by a set of receivers and simulated impulse
//! responses for every point of a search grid, this crate builds the
//! circulant signal operator of the recording, factorizes it once, and then
//! solves one regularized system per grid point. Each solution is reduced to
//! an indicator value; large values mark points that are likely to lie on a
//! scatterer.
//!
//! The per-point solves are independent and run on a fixed pool of workers.
//! The output is identical for every worker count and chunking strategy.
//!
//! # Example
//! ```
//! use math_scatter_sampling::{ImagingConfig, SchedulerConfig, image};
//! use math_scatter_sampling::testdata::{ScenarioParams, SyntheticScenario};
//!
//! let scenario = SyntheticScenario::generate(ScenarioParams {
//!     samples: 100,
//!     time_step: 0.1,
//!     grid_x: (-2.0, 2.0, 3),
//!     grid_y: (-1.0, 1.0, 2),
//!     scatterer: 1,
//!     ..ScenarioParams::default()
//! })
//! .unwrap();
//!
//! let config = ImagingConfig {
//!     scheduler: SchedulerConfig::with_workers(2),
//!     ..ImagingConfig::default()
//! };
//! let result = image(
//!     &scenario.receivers,
//!     &scenario.time_axis,
//!     &scenario.data,
//!     &scenario.impulse,
//!     &scenario.grid,
//!     &config,
//! )
//! .unwrap();
//! assert_eq!(result.field.len(), 6);
//! ```

pub mod assembler;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod operator;
pub mod scheduler;
pub mod session;
pub mod spectrum;
pub mod types;

// Make testdata publicly available for tests, benches and the demo binary
pub mod testdata;

pub use assembler::{Diagnostics, ImageMetadata, ImagingResult, IndicatorField, ResultAssembler};
pub use config::{
    ChunkStrategy, FrequencyBand, ImagingConfig, Indicator, RegularizationDomain,
    SchedulerConfig, TimeWindow, WindowConfig, WindowConfigBuilder,
};
pub use error::{ImagingError, OperatorAxis, Result};
pub use evaluator::{
    GridEvaluator, PointDiagnostics, PointEvaluation, PointEvaluator, PointStatus, SENTINEL,
};
pub use operator::{OperatorLayout, SignalOperator};
pub use scheduler::{CancelToken, Chunk, ParallelScheduler, partition};
pub use session::{ImagingSession, PreparedOperator};
pub use spectrum::{FrequencyBin, SpectrumPlan};
pub use types::{DataVolume, ImpulseResponseVolume, ReceiverSet, SearchGrid, TimeAxis};

pub use solvers::{
    RegularizationConfig, RegularizationConfigBuilder, RegularizationMethod,
    RegularizationParameter, TikhonovParameter, Truncation,
};

/// Image one grid from scratch.
///
/// Builds a throwaway [`ImagingSession`]; keep a session instead when the
/// same recording is imaged more than once.
pub fn image(
    receivers: &ReceiverSet,
    time_axis: &TimeAxis,
    data: &DataVolume,
    impulse: &ImpulseResponseVolume,
    grid: &SearchGrid,
    config: &ImagingConfig,
) -> Result<ImagingResult> {
    config.validate()?;
    let mut session = ImagingSession::new(
        receivers.clone(),
        time_axis.clone(),
        data.clone(),
        config.window.clone(),
    )?;
    session.image(grid, impulse, config)
}

/// Library version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
