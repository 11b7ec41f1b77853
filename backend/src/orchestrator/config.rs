//! Simulator configuration
//!
//! `SimulatorConfig` is the user-facing, serde-friendly description of a
//! run (field names follow the workload tooling's keys). It is validated
//! exactly once by [`SimulatorConfig::resolve`], which parses every policy
//! name into its enum so the engine never sees a string.

use crate::cluster::BinpackStrategy;
use crate::policy::{QueuePolicy, RuntimeEstimator, WaitingPolicy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors, raised before a run starts
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Unknown queue policy: {0}")]
    UnknownQueuePolicy(String),

    #[error("Unknown waiting policy: {0}")]
    UnknownWaitingPolicy(String),

    #[error("Unknown binpacking strategy: {0}")]
    UnknownBinpack(String),

    #[error("Invalid waiting factor in {0}: must be a finite, non-negative number")]
    InvalidWaitingFactor(String),

    #[error("clip_time must be non-negative, got {0}")]
    InvalidClipTime(f64),

    #[error("backfill and loop are mutually exclusive")]
    BackfillAndLoop,

    #[error("preempt_cloud_ratio {0} requires long_job_thres > 0")]
    PreemptWithoutThreshold(f64),

    #[error("predict_wait must be 0, 1 or 2, got {0}")]
    InvalidPredictMode(u8),

    #[error("Cluster must have at least one node")]
    EmptyCluster,

    #[error("time_estimator_error_pct must be finite and non-negative, got {0}")]
    InvalidEstimatorError(f64),

    #[error("data_gravity_delay must be finite and non-negative, got {0}")]
    InvalidDataGravityDelay(f64),
}

/// How a cloud-bound job's start instant is charged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PredictMode {
    /// Charged from the moment it times out (`predict_wait = 0`)
    AtTimeout,
    /// Perfect foresight: charged from its arrival (`predict_wait = 1`)
    Oracle,
    /// Decided at admission from the cluster's earliest start (`predict_wait = 2`)
    AtAdmission,
}

impl TryFrom<u8> for PredictMode {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PredictMode::AtTimeout),
            1 => Ok(PredictMode::Oracle),
            2 => Ok(PredictMode::AtAdmission),
            other => Err(ConfigError::InvalidPredictMode(other)),
        }
    }
}

/// Simulation configuration
///
/// Every field has a default, so a partial JSON object is a valid config.
///
/// # Fields
///
/// * `cluster_size` - Number of homogeneous nodes
/// * `gpus_per_node`, `cpus_per_node` - Node capacity
/// * `sched_alg` - Queue policy name (`fifo`, `edf`, `sjf_gpu`, ...)
/// * `binpack_alg` - `first-fit`, `best-fit` or `worst-fit`
/// * `waiting_policy` - Waiting policy name, optionally `name-factor`
/// * `waiting_factor` - Factor used when the name carries none
/// * `clip_time` - Upper bound on any computed wait
/// * `backfill` / `loop` - EASY backfill or skip-over placement (exclusive)
/// * `predict_wait` - Cloud start accounting, see [`PredictMode`]
/// * `max_queue_length` - Evict the queue tail beyond this length
/// * `time_estimator_error_pct` - Std-dev of the runtime estimate, in percent
/// * `long_job_thres` / `preempt_cloud_ratio` - Cap cloud dwell of long jobs
/// * `data_gravity_delay` - Added to every cloud start
/// * `warmup_jobs` - Jobs trimmed from each end before computing stats
/// * `snapshot` - Record the queue at every tick
/// * `seed` - RNG seed for the runtime estimator
///
/// # Example
/// ```
/// use burst_simulator_core_rs::SimulatorConfig;
///
/// let config: SimulatorConfig =
///     serde_json::from_str(r#"{"cluster_size": 4, "loop": true, "max_queue_length": -1}"#).unwrap();
/// let resolved = config.resolve().unwrap();
/// assert!(resolved.loop_mode);
/// assert_eq!(resolved.max_queue_length, None);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub cluster_size: usize,
    pub gpus_per_node: u32,
    pub cpus_per_node: u32,
    pub sched_alg: String,
    pub binpack_alg: String,
    pub waiting_policy: String,
    pub waiting_factor: f64,
    pub clip_time: f64,
    pub backfill: bool,
    #[serde(rename = "loop")]
    pub loop_mode: bool,
    pub predict_wait: u8,
    pub max_queue_length: Option<i64>,
    pub time_estimator_error_pct: f64,
    pub long_job_thres: Option<f64>,
    pub preempt_cloud_ratio: Option<f64>,
    pub data_gravity_delay: f64,
    pub warmup_jobs: usize,
    pub snapshot: bool,
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            cluster_size: 64,
            gpus_per_node: 8,
            cpus_per_node: 96,
            sched_alg: "fifo".to_string(),
            binpack_alg: "first-fit".to_string(),
            waiting_policy: "linear_runtime".to_string(),
            waiting_factor: 1.25,
            clip_time: 1e9,
            backfill: false,
            loop_mode: false,
            predict_wait: 0,
            max_queue_length: None,
            time_estimator_error_pct: 0.0,
            long_job_thres: None,
            preempt_cloud_ratio: None,
            data_gravity_delay: 0.0,
            warmup_jobs: 5000,
            snapshot: false,
            seed: 0,
        }
    }
}

/// Cloud dwell cap for long jobs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PreemptBack {
    /// Jobs strictly longer than this are eligible
    pub long_job_thres: f64,
    /// Fraction of the runtime served in the cloud before coming back
    pub cloud_ratio: f64,
}

/// Validated configuration consumed by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub cluster_size: usize,
    pub gpus_per_node: u32,
    pub cpus_per_node: u32,
    pub queue_policy: QueuePolicy,
    pub waiting_policy: WaitingPolicy,
    pub binpack: BinpackStrategy,
    pub backfill: bool,
    pub loop_mode: bool,
    pub predict: PredictMode,
    pub max_queue_length: Option<usize>,
    pub estimator: RuntimeEstimator,
    pub preempt_back: Option<PreemptBack>,
    pub data_gravity_delay: f64,
    pub warmup_jobs: usize,
    pub snapshot: bool,
    pub seed: u64,
}

impl SimulatorConfig {
    /// Validate and parse into a [`ResolvedConfig`]
    pub fn resolve(&self) -> Result<ResolvedConfig, ConfigError> {
        if self.cluster_size == 0 {
            return Err(ConfigError::EmptyCluster);
        }
        if self.backfill && self.loop_mode {
            return Err(ConfigError::BackfillAndLoop);
        }
        if !self.time_estimator_error_pct.is_finite() || self.time_estimator_error_pct < 0.0 {
            return Err(ConfigError::InvalidEstimatorError(self.time_estimator_error_pct));
        }
        if !self.data_gravity_delay.is_finite() || self.data_gravity_delay < 0.0 {
            return Err(ConfigError::InvalidDataGravityDelay(self.data_gravity_delay));
        }

        let queue_policy: QueuePolicy = self.sched_alg.parse()?;
        let binpack: BinpackStrategy = self.binpack_alg.parse()?;
        let waiting_policy = WaitingPolicy::parse(&self.waiting_policy, self.waiting_factor, self.clip_time)?;
        let predict = PredictMode::try_from(self.predict_wait)?;

        let ratio = self.preempt_cloud_ratio.filter(|r| *r > 0.0);
        let thres = self.long_job_thres.filter(|t| *t > 0.0);
        let preempt_back = match (ratio, thres) {
            (Some(cloud_ratio), Some(long_job_thres)) => Some(PreemptBack {
                long_job_thres,
                cloud_ratio,
            }),
            (Some(cloud_ratio), None) => return Err(ConfigError::PreemptWithoutThreshold(cloud_ratio)),
            (None, _) => None,
        };

        let max_queue_length = self
            .max_queue_length
            .filter(|len| *len >= 0)
            .map(|len| len as usize);

        Ok(ResolvedConfig {
            cluster_size: self.cluster_size,
            gpus_per_node: self.gpus_per_node,
            cpus_per_node: self.cpus_per_node,
            queue_policy,
            waiting_policy,
            binpack,
            backfill: self.backfill,
            loop_mode: self.loop_mode,
            predict,
            max_queue_length,
            estimator: RuntimeEstimator::new(self.time_estimator_error_pct),
            preempt_back,
            data_gravity_delay: self.data_gravity_delay,
            warmup_jobs: self.warmup_jobs,
            snapshot: self.snapshot,
            seed: self.seed,
        })
    }
}
