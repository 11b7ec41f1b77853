//! Parallel parameter sweeps
//!
//! Runs are independent: each worker clones the trace and owns its own
//! cluster, queue and RNG. Only the job list and the configurations are
//! shared, read-only.

use crate::models::job::Job;
use crate::orchestrator::{run_simulation, SimulationError, SimulationResult, SimulatorConfig};
use rayon::prelude::*;

/// Run every configuration against `jobs` in parallel
///
/// Results come back in configuration order; one failing run does not
/// stop the others.
///
/// # Example
/// ```
/// use burst_simulator_core_rs::sweep::run_sweep;
/// use burst_simulator_core_rs::{Job, Resources, SimulatorConfig};
///
/// let jobs = vec![Job::new(0, 0.0, 1.0, Resources::gpus(2))];
/// let configs = vec![
///     SimulatorConfig { cluster_size: 1, warmup_jobs: 0, ..Default::default() },
///     SimulatorConfig { cluster_size: 1, warmup_jobs: 0, backfill: true, loop_mode: true, ..Default::default() },
/// ];
///
/// let results = run_sweep(&jobs, &configs);
/// assert!(results[0].is_ok());
/// assert!(results[1].is_err()); // backfill and loop are exclusive
/// ```
pub fn run_sweep(jobs: &[Job], configs: &[SimulatorConfig]) -> Vec<Result<SimulationResult, SimulationError>> {
    tracing::info!(runs = configs.len(), jobs = jobs.len(), "starting sweep");
    configs
        .par_iter()
        .enumerate()
        .map(|(run, config)| {
            let outcome = run_simulation(jobs.to_vec(), config.clone());
            if let Err(e) = &outcome {
                tracing::warn!(run, error = %e, "sweep run failed");
            }
            outcome
        })
        .collect()
}
