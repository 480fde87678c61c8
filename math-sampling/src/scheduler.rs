//! Parallel dispatch of grid-point evaluations.
//!
//! The grid is split into one chunk per worker. Each chunk runs as a scoped
//! task on a dedicated rayon pool and reports back over a channel; results
//! are keyed by grid index, so the merged field does not depend on which
//! worker finished first. A failing chunk (evaluator error or panic) raises
//! a shared abort flag that the other chunks check between points.

use crate::assembler::{Diagnostics, IndicatorField, ResultAssembler};
use crate::config::{ChunkStrategy, SchedulerConfig};
use crate::error::{ImagingError, Result};
use crate::evaluator::{PointEvaluation, PointEvaluator};
use crate::types::SearchGrid;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::Instant;

/// Cooperative cancellation flag shared between the caller and a run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; workers stop before their next point.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Grid indices assigned to one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub worker: usize,
    pub indices: Vec<usize>,
}

impl Chunk {
    pub fn first(&self) -> usize {
        self.indices.first().copied().unwrap_or(0)
    }

    pub fn last(&self) -> usize {
        self.indices.last().copied().unwrap_or(0)
    }
}

/// Split `0..len` into at most `workers` non-empty chunks.
pub fn partition(len: usize, workers: usize, strategy: ChunkStrategy) -> Vec<Chunk> {
    let workers = workers.clamp(1, len.max(1));
    let chunks: Vec<Chunk> = match strategy {
        ChunkStrategy::Contiguous => {
            let base = len / workers;
            let extra = len % workers;
            let mut start = 0;
            (0..workers)
                .map(|worker| {
                    let size = base + usize::from(worker < extra);
                    let indices = (start..start + size).collect();
                    start += size;
                    Chunk { worker, indices }
                })
                .collect()
        }
        ChunkStrategy::RoundRobin => (0..workers)
            .map(|worker| Chunk {
                worker,
                indices: (worker..len).step_by(workers).collect(),
            })
            .collect(),
    };
    chunks.into_iter().filter(|c| !c.indices.is_empty()).collect()
}

enum ChunkOutcome {
    Completed {
        worker: usize,
        results: Vec<(usize, PointEvaluation)>,
    },
    Failed {
        worker: usize,
        first: usize,
        last: usize,
        point: usize,
        reason: String,
    },
    Abandoned,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn run_chunk<E>(chunk: &Chunk, evaluator: &E, abort: &AtomicBool, cancel: &CancelToken) -> ChunkOutcome
where
    E: PointEvaluator + ?Sized,
{
    let mut results = Vec::with_capacity(chunk.indices.len());
    for &index in &chunk.indices {
        if abort.load(Ordering::Relaxed) || cancel.is_cancelled() {
            return ChunkOutcome::Abandoned;
        }
        let reason = match panic::catch_unwind(AssertUnwindSafe(|| evaluator.evaluate(index))) {
            Ok(Ok(evaluation)) => {
                results.push((index, evaluation));
                continue;
            }
            Ok(Err(err)) => err.to_string(),
            Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
        };
        abort.store(true, Ordering::Relaxed);
        return ChunkOutcome::Failed {
            worker: chunk.worker,
            first: chunk.first(),
            last: chunk.last(),
            point: index,
            reason,
        };
    }
    ChunkOutcome::Completed {
        worker: chunk.worker,
        results,
    }
}

/// Fixed-size worker pool running a [`PointEvaluator`] over a grid.
#[derive(Debug)]
pub struct ParallelScheduler {
    pool: rayon::ThreadPool,
    workers: usize,
    chunking: ChunkStrategy,
}

impl ParallelScheduler {
    pub fn new(config: &SchedulerConfig) -> Result<Self> {
        config.validate()?;
        let workers = config.resolved_workers();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("sampling-worker-{i}"))
            .build()
            .map_err(|e| ImagingError::InvalidConfig(format!("cannot start worker pool: {e}")))?;
        log::debug!("Started worker pool with {workers} threads");
        Ok(Self {
            pool,
            workers,
            chunking: config.chunking,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn chunking(&self) -> ChunkStrategy {
        self.chunking
    }

    /// Evaluate every grid point and merge the results in grid order.
    pub fn run<E>(&self, grid: &SearchGrid, evaluator: &E) -> Result<(IndicatorField, Diagnostics)>
    where
        E: PointEvaluator + ?Sized,
    {
        self.run_cancellable(grid, evaluator, &CancelToken::new())
    }

    /// Like [`run`](Self::run), stopping early once `cancel` is triggered.
    ///
    /// # Errors
    ///
    /// - `WorkerFailure` for the lowest-numbered failing worker, if any
    /// - `Cancelled` if the token was triggered before the run completed
    /// - `IncompleteField` if the merged results do not cover the grid
    pub fn run_cancellable<E>(
        &self,
        grid: &SearchGrid,
        evaluator: &E,
        cancel: &CancelToken,
    ) -> Result<(IndicatorField, Diagnostics)>
    where
        E: PointEvaluator + ?Sized,
    {
        let start = Instant::now();
        let chunks = partition(grid.len(), self.workers, self.chunking);
        let abort = AtomicBool::new(false);
        let (tx, rx) = mpsc::channel();

        self.pool.scope(|scope| {
            for chunk in &chunks {
                let tx = tx.clone();
                let abort = &abort;
                scope.spawn(move |_| {
                    let outcome = run_chunk(chunk, evaluator, abort, cancel);
                    // the receiver outlives the scope
                    let _ = tx.send(outcome);
                });
            }
        });
        drop(tx);

        let mut assembler = ResultAssembler::new(grid.len());
        let mut failure: Option<ImagingError> = None;
        let mut failed_worker = usize::MAX;
        for outcome in rx {
            match outcome {
                ChunkOutcome::Completed { worker, results } => {
                    log::debug!("worker {worker} finished {} points", results.len());
                    for (index, evaluation) in results {
                        assembler.insert(index, evaluation);
                    }
                }
                ChunkOutcome::Failed {
                    worker,
                    first,
                    last,
                    point,
                    reason,
                } => {
                    if worker < failed_worker {
                        failed_worker = worker;
                        failure = Some(ImagingError::WorkerFailure {
                            worker,
                            first,
                            last,
                            point: Some(point),
                            reason,
                        });
                    }
                }
                ChunkOutcome::Abandoned => {}
            }
        }

        if let Some(err) = failure {
            log::error!("Imaging run aborted: {err}");
            return Err(err);
        }
        if cancel.is_cancelled() {
            log::info!("Imaging run cancelled after {:.2?}", start.elapsed());
            return Err(ImagingError::Cancelled);
        }

        let merged = assembler.finish()?;
        log::info!(
            "Evaluated {} grid points on {} workers in {:.2?}",
            grid.len(),
            chunks.len(),
            start.elapsed()
        );
        Ok(merged)
    }
}
