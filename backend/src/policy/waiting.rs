//! Cloud waiting policies
//!
//! A waiting policy decides, once per job at admission, how long the job
//! may wait on-prem before it is sent to the cloud. The result is an
//! absolute deadline `arrival + wait + runtime`, so `deadline - runtime`
//! is the queue timeout instant.
//!
//! Names may carry a factor (`linear_cost-0.076`), which overrides the
//! configured `waiting_factor`, and a `_filter_cpu` suffix that sends
//! CPU-only jobs straight to the cloud.

use crate::models::job::{Job, INFINITE_DEADLINE};
use crate::orchestrator::config::ConfigError;
use crate::rng::RngManager;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum wait of the runtime-proportional policies (5 minutes)
const MIN_RUNTIME_WAIT: f64 = 1.0 / 12.0;

/// Maximum wait of `linear_runtime_cap` (48 hours)
const MAX_CAPPED_WAIT: f64 = 48.0;

/// Outcome of a waiting policy for one job
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Deadline {
    /// Never queue: go to the cloud on arrival
    Immediate,
    /// Leave the queue by `deadline - runtime`
    At(f64),
}

/// Waiting-time formula
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitingKind {
    Zero,
    Infinite,
    Constant,
    LinearRuntime,
    LinearRuntimeCap,
    LinearCapacity,
    QuadCapacity,
    LogCapacity,
    LinearCost,
    LinearArea,
}

impl WaitingKind {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "zero" => WaitingKind::Zero,
            "infinite" => WaitingKind::Infinite,
            "constant" => WaitingKind::Constant,
            "linear_runtime" => WaitingKind::LinearRuntime,
            "linear_runtime_cap" => WaitingKind::LinearRuntimeCap,
            "linear_capacity" => WaitingKind::LinearCapacity,
            "quad_capacity" => WaitingKind::QuadCapacity,
            "log_capacity" => WaitingKind::LogCapacity,
            "linear_cost" => WaitingKind::LinearCost,
            "linear_area" => WaitingKind::LinearArea,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WaitingKind::Zero => "zero",
            WaitingKind::Infinite => "infinite",
            WaitingKind::Constant => "constant",
            WaitingKind::LinearRuntime => "linear_runtime",
            WaitingKind::LinearRuntimeCap => "linear_runtime_cap",
            WaitingKind::LinearCapacity => "linear_capacity",
            WaitingKind::QuadCapacity => "quad_capacity",
            WaitingKind::LogCapacity => "log_capacity",
            WaitingKind::LinearCost => "linear_cost",
            WaitingKind::LinearArea => "linear_area",
        }
    }
}

/// Parsed waiting policy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaitingPolicy {
    pub kind: WaitingKind,
    pub factor: f64,
    pub clip_time: f64,
    /// Send jobs without GPUs straight to the cloud
    pub filter_cpu: bool,
}

impl WaitingPolicy {
    /// Parse `name`, `name-factor`, `name_filter_cpu` or `name_filter_cpu-factor`
    pub fn parse(text: &str, default_factor: f64, clip_time: f64) -> Result<Self, ConfigError> {
        let (name, factor) = match text.split_once('-') {
            Some((name, raw)) => {
                let factor = raw
                    .parse::<f64>()
                    .map_err(|_| ConfigError::InvalidWaitingFactor(text.to_string()))?;
                (name, factor)
            }
            None => (text, default_factor),
        };
        if !factor.is_finite() || factor < 0.0 {
            return Err(ConfigError::InvalidWaitingFactor(text.to_string()));
        }
        if clip_time.is_nan() || clip_time < 0.0 {
            return Err(ConfigError::InvalidClipTime(clip_time));
        }

        let (base, filter_cpu) = match name.strip_suffix("_filter_cpu") {
            Some(base) => (base, true),
            None => (name, false),
        };
        let kind =
            WaitingKind::from_name(base).ok_or_else(|| ConfigError::UnknownWaitingPolicy(text.to_string()))?;

        Ok(Self {
            kind,
            factor,
            clip_time,
            filter_cpu,
        })
    }

    /// Unclipped wait for `job`, given an estimate of its runtime
    ///
    /// `None` means the job never waits.
    pub fn wait(&self, job: &Job, estimate: f64) -> Option<f64> {
        if self.filter_cpu && job.num_gpus() == 0 {
            return None;
        }
        let gpus = job.num_gpus() as f64;
        let wait = match self.kind {
            WaitingKind::Zero => return None,
            WaitingKind::Infinite => f64::INFINITY,
            WaitingKind::Constant => self.factor,
            WaitingKind::LinearRuntime => ((self.factor - 1.0) * estimate).max(MIN_RUNTIME_WAIT),
            WaitingKind::LinearRuntimeCap => ((self.factor - 1.0) * estimate)
                .max(MIN_RUNTIME_WAIT)
                .min(MAX_CAPPED_WAIT),
            WaitingKind::LinearCapacity => self.factor * gpus,
            WaitingKind::QuadCapacity => self.factor * gpus * gpus,
            WaitingKind::LogCapacity if job.num_gpus() == 0 => 0.0,
            WaitingKind::LogCapacity => self.factor * (1.0 + gpus.log2()),
            WaitingKind::LinearCost => {
                let estimated_cost = if job.runtime() > 0.0 {
                    job.cost() * estimate / job.runtime()
                } else {
                    job.cost()
                };
                self.factor * estimated_cost
            }
            WaitingKind::LinearArea => self.factor * gpus * estimate,
        };
        Some(wait)
    }

    /// Absolute deadline assigned at admission
    pub fn deadline(&self, job: &Job, estimate: f64) -> Deadline {
        match self.wait(job, estimate) {
            None => Deadline::Immediate,
            Some(w) if w.is_infinite() => Deadline::At(INFINITE_DEADLINE),
            Some(w) => Deadline::At(job.arrival() + w.clamp(0.0, self.clip_time) + job.runtime()),
        }
    }

    pub fn name(&self) -> String {
        let filter = if self.filter_cpu { "_filter_cpu" } else { "" };
        format!("{}{}-{}", self.kind.as_str(), filter, self.factor)
    }
}

impl fmt::Display for WaitingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Noisy runtime estimator used only to compute waits
///
/// `estimate = runtime × (1 + N(0,1) × error_pct / 100)`, floored at 0.
/// With no error configured it draws nothing from the RNG.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RuntimeEstimator {
    pub error_pct: f64,
}

impl RuntimeEstimator {
    pub fn new(error_pct: f64) -> Self {
        Self { error_pct }
    }

    pub fn estimate(&self, runtime: f64, rng: &mut RngManager) -> f64 {
        if self.error_pct == 0.0 {
            return runtime;
        }
        let noise = rng.next_gaussian() * self.error_pct / 100.0;
        (runtime * (1.0 + noise)).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::Resources;

    fn job(arrival: f64, runtime: f64, gpus: u32) -> Job {
        Job::new(0, arrival, runtime, Resources::gpus(gpus))
    }

    fn policy(name: &str) -> WaitingPolicy {
        WaitingPolicy::parse(name, 1.0, 1e9).unwrap()
    }

    #[test]
    fn test_zero_and_infinite() {
        let j = job(3.0, 2.0, 1);
        assert_eq!(policy("zero").deadline(&j, 2.0), Deadline::Immediate);
        assert_eq!(policy("infinite").deadline(&j, 2.0), Deadline::At(INFINITE_DEADLINE));
    }

    #[test]
    fn test_linear_runtime_floor_and_cap() {
        let tiny = job(0.0, 0.1, 1);
        let p = WaitingPolicy::parse("linear_runtime", 1.25, 1e9).unwrap();
        assert_eq!(p.deadline(&tiny, 0.1), Deadline::At(MIN_RUNTIME_WAIT + 0.1));

        let huge = job(0.0, 1000.0, 1);
        let capped = WaitingPolicy::parse("linear_runtime_cap", 1.25, 1e9).unwrap();
        assert_eq!(capped.deadline(&huge, 1000.0), Deadline::At(48.0 + 1000.0));
    }

    #[test]
    fn test_capacity_families() {
        let j = job(0.0, 1.0, 4);
        assert_eq!(policy("linear_capacity-0.5").deadline(&j, 1.0), Deadline::At(3.0));
        assert_eq!(policy("quad_capacity-0.5").deadline(&j, 1.0), Deadline::At(9.0));
        assert_eq!(policy("log_capacity-2").deadline(&j, 1.0), Deadline::At(7.0));
        assert_eq!(policy("log_capacity").deadline(&job(0.0, 1.0, 0), 1.0), Deadline::At(1.0));
    }

    #[test]
    fn test_cost_uses_estimated_runtime() {
        let j = job(0.0, 2.0, 1).with_cost(10.0);
        assert_eq!(policy("linear_cost-0.1").deadline(&j, 2.0), Deadline::At(3.0));
        // Estimator says half the runtime → half the cost → half the wait
        assert_eq!(policy("linear_cost-0.1").deadline(&j, 1.0), Deadline::At(2.5));
    }

    #[test]
    fn test_clip_bounds_wait() {
        let j = job(1.0, 1.0, 8);
        let p = WaitingPolicy::parse("quad_capacity", 1.0, 10.0).unwrap();
        assert_eq!(p.deadline(&j, 1.0), Deadline::At(12.0));
    }

    #[test]
    fn test_filter_cpu_sends_cpu_jobs_away() {
        let p = policy("linear_runtime_filter_cpu-1.5");
        assert!(p.filter_cpu);
        assert_eq!(p.factor, 1.5);
        assert_eq!(p.deadline(&job(0.0, 4.0, 0), 4.0), Deadline::Immediate);
        assert_eq!(p.deadline(&job(0.0, 4.0, 1), 4.0), Deadline::At(6.0));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            WaitingPolicy::parse("forever", 1.0, 1e9),
            Err(ConfigError::UnknownWaitingPolicy(_))
        ));
        assert!(matches!(
            WaitingPolicy::parse("constant-abc", 1.0, 1e9),
            Err(ConfigError::InvalidWaitingFactor(_))
        ));
        assert!(WaitingPolicy::parse("constant", f64::NAN, 1e9).is_err());
    }

    #[test]
    fn test_estimator_without_error_draws_nothing() {
        let mut rng = RngManager::new(7);
        let before = rng.get_state();
        assert_eq!(RuntimeEstimator::new(0.0).estimate(3.0, &mut rng), 3.0);
        assert_eq!(rng.get_state(), before);

        let noisy = RuntimeEstimator::new(50.0).estimate(3.0, &mut rng);
        assert!(noisy >= 0.0);
        assert_ne!(rng.get_state(), before);
    }
}
