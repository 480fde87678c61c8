//! Synthetic scan
//!
//! Images a single point scatterer seen by eight receivers on a circle and
//! prints the indicator field as a character map.
//!
//! Usage:
//!     RUST_LOG=info cargo run --bin synthetic_scan --release

use math_scatter_sampling::testdata::SyntheticScenario;
use math_scatter_sampling::{ImagingConfig, ImagingSession, RegularizationConfig, SchedulerConfig};

const SHADES: &[char] = &[' ', '.', ':', '-', '=', '+', '*', '#', '%', '@'];

fn shade(value: f64) -> char {
    let level = (value.clamp(0.0, 1.0) * (SHADES.len() - 1) as f64).round() as usize;
    SHADES[level.min(SHADES.len() - 1)]
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let scenario = SyntheticScenario::standard()?;
    let (nx, ny) = (scenario.params.grid_x.2, scenario.params.grid_y.2);
    println!(
        "Synthetic scan: {} receivers, {} samples, {}x{} grid, scatterer at index {}",
        scenario.receivers.len(),
        scenario.time_axis.len(),
        nx,
        ny,
        scenario.scatterer()
    );

    let mut session = ImagingSession::new(
        scenario.receivers.clone(),
        scenario.time_axis.clone(),
        scenario.data.clone(),
        Default::default(),
    )?;

    for rank in [3, 5, 10] {
        let config = ImagingConfig {
            regularization: RegularizationConfig::truncated(rank),
            scheduler: SchedulerConfig::with_workers(4),
            ..ImagingConfig::default()
        };
        let result = session.image(&scenario.grid, &scenario.impulse, &config)?;
        let normalized = result.field.normalized();

        println!();
        println!(
            "rank {rank}: peak at index {:?} (value {:.4}), {} caveats",
            result.field.argmax(),
            result.field.max().unwrap_or(0.0),
            result.diagnostics.caveat_count()
        );
        // top row first
        for iy in (0..ny).rev() {
            let row: String = (0..nx)
                .map(|ix| shade(normalized[iy * nx + ix]))
                .flat_map(|c| [c, ' '])
                .collect();
            println!("  |{}|", row.trim_end());
        }
    }

    println!();
    println!(
        "Factorizations computed: {} (shared by every rank)",
        session.factorization_count()
    );
    Ok(())
}
