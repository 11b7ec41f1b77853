//! Job model
//!
//! A job is an immutable demand description (arrival, runtime, resources,
//! cost) plus the scheduling outcome the engine writes into it:
//! - deadline (set once when the job joins the queue)
//! - state, start and allocated GPU slots (set when it leaves the queue)
//! - reservation link (backfill only)
//! - cloud portion (preempt-back only)
//!
//! Once a job reaches a terminal state and is handed to the finished list
//! it is never mutated again.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identity of a job, assigned by the workload generator
///
/// Defines tie-break order in every policy and the row order of the final
/// report.
pub type JobId = usize;

/// Deadline used when a job may wait forever
///
/// Large but finite so that `deadline - runtime` stays a usable instant.
pub const INFINITE_DEADLINE: f64 = 1e12;

/// Terminal state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    /// Ran on the on-prem cluster
    #[serde(rename = "LOCAL")]
    Local,

    /// Left the queue for the cloud (timeout, zero-wait, eviction)
    #[serde(rename = "TIMEOUT-CLOUD")]
    TimeoutCloud,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Local => "LOCAL",
            JobState::TimeoutCloud => "TIMEOUT-CLOUD",
        }
    }
}

/// Resource demand of a job
///
/// Multi-node jobs (`nodes > 1`) split their GPU demand evenly across
/// `nodes` machines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub gpus: u32,
    #[serde(default)]
    pub cpus: u32,
    #[serde(default = "default_nodes")]
    pub nodes: u32,
}

fn default_nodes() -> u32 {
    1
}

impl Default for Resources {
    fn default() -> Self {
        Self {
            gpus: 0,
            cpus: 0,
            nodes: 1,
        }
    }
}

impl Resources {
    /// GPU-only demand on a single node
    pub fn gpus(gpus: u32) -> Self {
        Self {
            gpus,
            ..Self::default()
        }
    }

    pub fn with_cpus(mut self, cpus: u32) -> Self {
        self.cpus = cpus;
        self
    }

    pub fn with_nodes(mut self, nodes: u32) -> Self {
        self.nodes = nodes.max(1);
        self
    }
}

/// One record of a workload trace, as read from disk
///
/// `cost` defaults to GPUs × runtime when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub idx: JobId,
    pub arrival: f64,
    pub runtime: f64,
    #[serde(flatten)]
    pub resources: Resources,
    #[serde(default)]
    pub cost: Option<f64>,
}

impl From<JobSpec> for Job {
    fn from(spec: JobSpec) -> Self {
        let job = Job::new(spec.idx, spec.arrival, spec.runtime, spec.resources);
        match spec.cost {
            Some(cost) => job.with_cost(cost),
            None => job,
        }
    }
}

/// A job flowing through the simulator
///
/// # Example
/// ```
/// use burst_simulator_core_rs::{Job, Resources};
///
/// let job = Job::new(0, 1.5, 2.0, Resources::gpus(4));
/// assert_eq!(job.num_gpus(), 4);
/// assert_eq!(job.cost(), 8.0); // GPUs × runtime
/// assert!(job.start().is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub(crate) idx: JobId,
    pub(crate) arrival: f64,
    pub(crate) runtime: f64,
    pub(crate) resources: Resources,
    pub(crate) cost: f64,

    /// Instant by which the job must have left the queue, plus its runtime
    pub(crate) deadline: f64,
    pub(crate) state: Option<JobState>,
    /// On-prem start (LOCAL) or charged cloud start (TIMEOUT-CLOUD)
    pub(crate) start: Option<f64>,
    /// node index → GPU slot indices
    pub(crate) allocated_gpus: BTreeMap<usize, Vec<usize>>,
    /// Active job whose completion turns this job's reservation into an allocation
    pub(crate) block_job_idx: Option<JobId>,

    /// When the cloud portion of a preempted-back job began
    pub(crate) cloud_start: Option<f64>,
    /// Runtime already served in the cloud before coming back on-prem
    pub(crate) cloud_runtime: f64,
    /// Synthetic re-arrival time after a preempt-back
    pub(crate) resubmit_at: Option<f64>,
}

impl Job {
    /// Create a job with default cost (GPUs × runtime)
    pub fn new(idx: JobId, arrival: f64, runtime: f64, resources: Resources) -> Self {
        let resources = Resources {
            nodes: resources.nodes.max(1),
            ..resources
        };
        Self {
            idx,
            arrival,
            runtime,
            resources,
            cost: resources.gpus as f64 * runtime,
            deadline: 0.0,
            state: None,
            start: None,
            allocated_gpus: BTreeMap::new(),
            block_job_idx: None,
            cloud_start: None,
            cloud_runtime: 0.0,
            resubmit_at: None,
        }
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_nodes(mut self, nodes: u32) -> Self {
        self.resources.nodes = nodes.max(1);
        self
    }

    // ========================================================================
    // Getters
    // ========================================================================

    pub fn idx(&self) -> JobId {
        self.idx
    }

    pub fn arrival(&self) -> f64 {
        self.arrival
    }

    pub fn runtime(&self) -> f64 {
        self.runtime
    }

    pub fn resources(&self) -> Resources {
        self.resources
    }

    pub fn num_gpus(&self) -> u32 {
        self.resources.gpus
    }

    pub fn num_cpus(&self) -> u32 {
        self.resources.cpus
    }

    pub fn cost(&self) -> f64 {
        self.cost
    }

    pub fn deadline(&self) -> f64 {
        self.deadline
    }

    pub fn state(&self) -> Option<JobState> {
        self.state
    }

    pub fn start(&self) -> Option<f64> {
        self.start
    }

    pub fn allocated_gpus(&self) -> &BTreeMap<usize, Vec<usize>> {
        &self.allocated_gpus
    }

    pub fn block_job_idx(&self) -> Option<JobId> {
        self.block_job_idx
    }

    pub fn cloud_start(&self) -> Option<f64> {
        self.cloud_start
    }

    pub fn cloud_runtime(&self) -> f64 {
        self.cloud_runtime
    }

    // ========================================================================
    // Derived quantities
    // ========================================================================

    /// Runtime still to be served on-prem
    pub fn remaining_runtime(&self) -> f64 {
        self.runtime - self.cloud_runtime
    }

    /// Instant the job leaves the queue for the cloud if still unplaced
    pub fn timeout_at(&self) -> f64 {
        self.deadline - self.runtime
    }

    /// Slack between the deadline and the runtime (`swf`/`lwf` key)
    pub fn slack(&self) -> f64 {
        self.deadline - self.runtime
    }

    /// Time at which the job becomes visible to the engine
    pub fn eligible_at(&self) -> f64 {
        self.resubmit_at.unwrap_or(self.arrival)
    }

    /// Projected end of the on-prem run, once started
    pub fn end_time(&self) -> Option<f64> {
        self.start.map(|s| s + self.remaining_runtime())
    }

    /// Time the job finished, wherever it ran
    pub fn completion_time(&self) -> Option<f64> {
        match self.state? {
            JobState::Local => self.end_time(),
            JobState::TimeoutCloud => self.start.map(|s| s + self.runtime),
        }
    }

    /// Whether the job came back on-prem after a capped cloud dwell
    pub fn was_preempted_back(&self) -> bool {
        self.cloud_runtime > 0.0
    }

    /// Share of the job's cost billed by the cloud
    pub fn cloud_cost(&self) -> f64 {
        match self.state {
            Some(JobState::TimeoutCloud) => self.cost,
            Some(JobState::Local) if self.was_preempted_back() && self.runtime > 0.0 => {
                self.cost * self.cloud_runtime / self.runtime
            }
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cost_is_gpu_hours() {
        let job = Job::new(3, 0.0, 2.5, Resources::gpus(4));
        assert_eq!(job.cost(), 10.0);
        assert_eq!(job.clone().with_cost(1.0).cost(), 1.0);
    }

    #[test]
    fn test_zero_nodes_normalized() {
        let job = Job::new(0, 0.0, 1.0, Resources::gpus(2).with_nodes(0));
        assert_eq!(job.resources().nodes, 1);
    }

    #[test]
    fn test_completion_uses_remaining_runtime_on_prem() {
        let mut job = Job::new(0, 0.0, 10.0, Resources::gpus(1));
        job.cloud_runtime = 4.0;
        job.start = Some(20.0);
        job.state = Some(JobState::Local);

        assert_eq!(job.end_time(), Some(26.0));
        assert_eq!(job.completion_time(), Some(26.0));
        assert!(job.was_preempted_back());
        assert!((job.cloud_cost() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_spec_deserializes_with_defaults() {
        let spec: JobSpec =
            serde_json::from_str(r#"{"idx": 7, "arrival": 1.0, "runtime": 2.0, "gpus": 3}"#).unwrap();
        let job = Job::from(spec);
        assert_eq!(job.idx(), 7);
        assert_eq!(job.num_gpus(), 3);
        assert_eq!(job.num_cpus(), 0);
        assert_eq!(job.resources().nodes, 1);
        assert_eq!(job.cost(), 6.0);
    }

    #[test]
    fn test_state_serializes_to_report_names() {
        assert_eq!(serde_json::to_string(&JobState::Local).unwrap(), "\"LOCAL\"");
        assert_eq!(
            serde_json::to_string(&JobState::TimeoutCloud).unwrap(),
            "\"TIMEOUT-CLOUD\""
        );
    }
}
