//! Orchestrator - configuration, main simulation loop and report
//!
//! See `engine.rs` for the tick loop.

pub mod config;
pub mod engine;
pub mod result;

// Re-export main types for convenience
pub use config::{ConfigError, PredictMode, PreemptBack, ResolvedConfig, SimulatorConfig};
pub use engine::{run_simulation, SimulationError, Simulator, TickResult};
pub use result::{compute_config_hash, Diagnostics, QueueSnapshot, SimulationResult};
