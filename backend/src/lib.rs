//! Burst Simulator Core - Rust Engine
//!
//! Discrete-event simulator for hybrid on-prem/cloud GPU job scheduling.
//! A workload trace is replayed against a fixed cluster; jobs that wait
//! too long spill over to a cloud with unlimited capacity and a price.
//!
//! # Architecture
//!
//! - **core**: Simulation clock
//! - **models**: Domain types (Job, Node)
//! - **cluster**: Resource allocator (bin-packing, EASY backfill)
//! - **policy**: Queue ordering and cloud waiting policies
//! - **orchestrator**: Configuration, main simulation loop, report
//! - **metrics**: Steady-state statistics
//! - **sweep**: Parallel independent runs
//! - **rng**: Deterministic random number generation
//!
//! # Critical Invariants
//!
//! 1. Cluster counters always match slot ownership; violations abort the run
//! 2. Simulation time never goes backward
//! 3. All randomness is deterministic (seeded RNG)
//! 4. Every input job ends in exactly one terminal state

// Module declarations
pub mod cluster;
pub mod core;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod policy;
pub mod rng;
pub mod sweep;

// Re-exports for convenience
pub use cluster::{AllocationError, BinpackStrategy, BlockCause, Cluster};
pub use crate::core::time::{SimClock, TimeError};
pub use metrics::{compute_stats, Stats};
pub use models::{Job, JobId, JobSpec, JobState, Node, Resources, INFINITE_DEADLINE};
pub use orchestrator::{
    run_simulation, ConfigError, Diagnostics, QueueSnapshot, SimulationError, SimulationResult,
    Simulator, SimulatorConfig, TickResult,
};
pub use policy::{Deadline, QueuePolicy, WaitingPolicy};
pub use rng::RngManager;
pub use sweep::run_sweep;

// FFI module (when feature enabled)
#[cfg(feature = "pyo3")]
pub mod ffi;

// PyO3 exports (when feature enabled)
#[cfg(feature = "pyo3")]
use pyo3::prelude::*;

#[cfg(feature = "pyo3")]
#[pymodule]
fn burst_simulator_core_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<ffi::simulator::PySimulator>()?;
    m.add_function(wrap_pyfunction!(ffi::simulator::run_simulation, m)?)?;
    Ok(())
}
