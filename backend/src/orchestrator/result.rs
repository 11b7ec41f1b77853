//! Simulation output
//!
//! Per-job columns (sorted by idx), the echoed configuration with its
//! digest, aggregate stats, run diagnostics and optional queue snapshots.

use super::config::SimulatorConfig;
use super::engine::SimulationError;
use crate::metrics::Stats;
use crate::models::job::{Job, JobId, JobState};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Run-scoped counters describing what the engine did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub ticks: usize,
    pub placements: usize,
    /// Placement attempts that found no node with enough GPUs
    pub fit_failures_gpu: usize,
    /// Placement attempts blocked on CPUs only
    pub fit_failures_cpu: usize,
    pub reservations: usize,
    pub reservations_declined: usize,
    /// Placements that borrowed slots held for a future reservation
    pub backfill_window_placements: usize,
    pub promotions: usize,
    /// Queued jobs that timed out and finished in the cloud
    pub timeouts: usize,
    /// Jobs sent to the cloud on arrival (zero wait, CPU filter, never fits)
    pub immediate_cloud: usize,
    /// Jobs sent to the cloud on arrival because they would time out anyway
    pub predicted_cloud: usize,
    pub evictions: usize,
    pub preempt_backs: usize,
    pub peak_queue_len: usize,
}

/// Queue contents at the end of one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub time: f64,
    /// Queued job ids in policy order
    pub queued: Vec<JobId>,
    pub free_gpus: u32,
    pub active_jobs: usize,
}

/// Final report of one simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub idx: Vec<JobId>,
    pub arrival: Vec<f64>,
    pub start: Vec<f64>,
    pub runtime: Vec<f64>,
    pub deadline: Vec<f64>,
    pub num_gpus: Vec<u32>,
    pub state: Vec<JobState>,
    pub allocated_gpus: Vec<BTreeMap<usize, Vec<usize>>>,
    pub simulator_spec: SimulatorConfig,
    pub config_hash: String,
    pub stats: Stats,
    pub diagnostics: Diagnostics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshots: Option<Vec<QueueSnapshot>>,
    /// Finished jobs, sorted by idx
    #[serde(skip)]
    jobs: Vec<Job>,
}

impl SimulationResult {
    /// Assemble the report from finished jobs
    pub fn new(
        mut jobs: Vec<Job>,
        config: SimulatorConfig,
        stats: Stats,
        diagnostics: Diagnostics,
        snapshots: Option<Vec<QueueSnapshot>>,
    ) -> Result<Self, SimulationError> {
        jobs.sort_by_key(Job::idx);

        let mut start = Vec::with_capacity(jobs.len());
        let mut state = Vec::with_capacity(jobs.len());
        for job in &jobs {
            match (job.start(), job.state()) {
                (Some(s), Some(st)) => {
                    start.push(s);
                    state.push(st);
                }
                _ => return Err(SimulationError::Unfinished(job.idx())),
            }
        }

        Ok(Self {
            idx: jobs.iter().map(Job::idx).collect(),
            arrival: jobs.iter().map(Job::arrival).collect(),
            start,
            runtime: jobs.iter().map(Job::runtime).collect(),
            deadline: jobs.iter().map(Job::deadline).collect(),
            num_gpus: jobs.iter().map(Job::num_gpus).collect(),
            state,
            allocated_gpus: jobs.iter().map(|j| j.allocated_gpus().clone()).collect(),
            config_hash: compute_config_hash(&config)?,
            simulator_spec: config,
            stats,
            diagnostics,
            snapshots,
            jobs,
        })
    }

    /// Finished jobs sorted by idx (empty after deserialization)
    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.idx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idx.is_empty()
    }

    /// Row of the report for job `idx`
    pub fn position(&self, idx: JobId) -> Option<usize> {
        self.idx.binary_search(&idx).ok()
    }
}

/// SHA-256 over the canonical (key-sorted) JSON form of `config`
pub fn compute_config_hash<T: Serialize>(config: &T) -> Result<String, SimulationError> {
    use serde_json::Value;

    fn canonicalize(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> =
                    map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize).collect()),
            other => other,
        }
    }

    let value = serde_json::to_value(config)
        .map_err(|e| SimulationError::Serialization(format!("Config serialization failed: {}", e)))?;
    let json = serde_json::to_string(&canonicalize(value))
        .map_err(|e| SimulationError::Serialization(format!("Config serialization failed: {}", e)))?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}
