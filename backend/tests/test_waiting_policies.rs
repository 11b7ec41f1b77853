//! Waiting and Queue Policy Tests
//!
//! Deadlines assigned at admission, as observed in finished runs, plus
//! policy name parsing.

use burst_simulator_core_rs::policy::{Direction, SortKey, WaitingKind};
use burst_simulator_core_rs::{
    run_simulation, ConfigError, Deadline, Job, JobSpec, QueuePolicy, Resources, SimulatorConfig,
    WaitingPolicy, INFINITE_DEADLINE,
};

fn config(waiting_policy: &str) -> SimulatorConfig {
    SimulatorConfig {
        cluster_size: 4,
        waiting_policy: waiting_policy.to_string(),
        warmup_jobs: 0,
        ..Default::default()
    }
}

fn deadlines(jobs: Vec<Job>, cfg: SimulatorConfig) -> Vec<f64> {
    run_simulation(jobs, cfg).unwrap().deadline
}

fn assert_close(actual: f64, expected: f64) {
    assert!((actual - expected).abs() < 1e-9, "expected {expected}, got {actual}");
}

// ============================================================================
// Deadlines in finished runs
// ============================================================================

#[test]
fn test_default_linear_runtime_waits_a_quarter_of_runtime() {
    let jobs = vec![Job::new(0, 2.0, 4.0, Resources::gpus(1))];
    assert_close(deadlines(jobs, config("linear_runtime"))[0], 2.0 + 1.0 + 4.0);
}

#[test]
fn test_linear_runtime_floor_for_tiny_jobs() {
    let jobs = vec![Job::new(0, 0.0, 0.1, Resources::gpus(1))];
    assert_close(deadlines(jobs, config("linear_runtime"))[0], 1.0 / 12.0 + 0.1);
}

#[test]
fn test_linear_runtime_cap_bounds_long_jobs() {
    let jobs = vec![Job::new(0, 0.0, 100.0, Resources::gpus(1))];
    assert_close(deadlines(jobs, config("linear_runtime_cap-2"))[0], 48.0 + 100.0);
}

#[test]
fn test_clip_time_bounds_every_wait() {
    let cfg = SimulatorConfig {
        clip_time: 0.5,
        ..config("constant-2")
    };
    let jobs = vec![Job::new(0, 1.0, 3.0, Resources::gpus(1))];
    assert_close(deadlines(jobs, cfg)[0], 1.0 + 0.5 + 3.0);
}

#[test]
fn test_capacity_policies_scale_with_gpus() {
    let jobs = || vec![Job::new(0, 0.0, 1.0, Resources::gpus(8))];
    assert_close(deadlines(jobs(), config("linear_capacity-0.25"))[0], 2.0 + 1.0);
    assert_close(deadlines(jobs(), config("quad_capacity-0.25"))[0], 16.0 + 1.0);
    assert_close(deadlines(jobs(), config("log_capacity-1"))[0], 4.0 + 1.0);
    assert_close(deadlines(jobs(), config("linear_area-0.5"))[0], 4.0 + 1.0);
}

#[test]
fn test_linear_cost_uses_trace_cost() {
    let spec: JobSpec =
        serde_json::from_str(r#"{"idx": 0, "arrival": 0.0, "runtime": 2.0, "gpus": 1, "cost": 30.0}"#).unwrap();
    let jobs = vec![Job::from(spec)];
    assert_close(deadlines(jobs, config("linear_cost-0.1"))[0], 3.0 + 2.0);
}

#[test]
fn test_waiting_factor_applies_when_name_has_none() {
    let cfg = SimulatorConfig {
        waiting_factor: 3.0,
        ..config("constant")
    };
    let jobs = vec![Job::new(0, 0.0, 1.0, Resources::gpus(1))];
    assert_close(deadlines(jobs, cfg)[0], 3.0 + 1.0);
}

#[test]
fn test_infinite_policy_uses_sentinel_deadline() {
    let jobs = vec![Job::new(0, 0.0, 1.0, Resources::gpus(1))];
    assert_eq!(deadlines(jobs, config("infinite"))[0], INFINITE_DEADLINE);
}

// ============================================================================
// Runtime estimator
// ============================================================================

fn trace() -> Vec<Job> {
    (0..20)
        .map(|i| Job::new(i, i as f64, 1.0 + (i % 5) as f64, Resources::gpus(1)))
        .collect()
}

fn noisy(seed: u64, error_pct: f64) -> SimulatorConfig {
    SimulatorConfig {
        seed,
        time_estimator_error_pct: error_pct,
        ..config("linear_runtime-2")
    }
}

#[test]
fn test_estimator_is_deterministic_per_seed() {
    assert_eq!(deadlines(trace(), noisy(11, 30.0)), deadlines(trace(), noisy(11, 30.0)));
}

#[test]
fn test_estimator_noise_depends_on_seed() {
    assert_ne!(deadlines(trace(), noisy(11, 30.0)), deadlines(trace(), noisy(12, 30.0)));
}

#[test]
fn test_exact_estimator_ignores_seed() {
    let exact = deadlines(trace(), noisy(11, 0.0));
    assert_eq!(exact, deadlines(trace(), noisy(99, 0.0)));
    for (job, deadline) in trace().iter().zip(&exact) {
        assert_close(*deadline, job.arrival() + 2.0 * job.runtime());
    }
}

// ============================================================================
// Parsing
// ============================================================================

#[test]
fn test_waiting_policy_names() {
    let p = WaitingPolicy::parse("linear_cost_filter_cpu-0.076", 1.0, 1e9).unwrap();
    assert_eq!(p.kind, WaitingKind::LinearCost);
    assert!(p.filter_cpu);
    assert_eq!(p.factor, 0.076);
    assert_eq!(p.name(), "linear_cost_filter_cpu-0.076");

    let zero = WaitingPolicy::parse("zero", 1.0, 1e9).unwrap();
    let job = Job::new(0, 0.0, 1.0, Resources::gpus(1));
    assert_eq!(zero.deadline(&job, 1.0), Deadline::Immediate);
}

#[test]
fn test_waiting_policy_rejects_bad_names() {
    assert_eq!(
        WaitingPolicy::parse("patient", 1.0, 1e9),
        Err(ConfigError::UnknownWaitingPolicy("patient".to_string()))
    );
    assert!(matches!(
        WaitingPolicy::parse("constant--1", 1.0, 1e9),
        Err(ConfigError::InvalidWaitingFactor(_))
    ));
    assert_eq!(
        WaitingPolicy::parse("constant", 1.0, -1.0),
        Err(ConfigError::InvalidClipTime(-1.0))
    );
}

#[test]
fn test_queue_policy_names_round_trip() {
    for name in ["fifo", "lifo", "edf", "ldf", "sjf", "ljf", "svjf", "lvjf", "swf", "lwf", "sjf_gpu"] {
        let policy: QueuePolicy = name.parse().unwrap();
        assert_eq!(policy.name(), name);
    }
}

#[test]
fn test_queue_policy_aliases() {
    let evdf: QueuePolicy = "evdf".parse().unwrap();
    assert_eq!(evdf.key, SortKey::Deadline);
    assert!(evdf.gpu_weighted);

    let svwf: QueuePolicy = "svwf".parse().unwrap();
    assert_eq!(svwf.key, SortKey::Slack);
    assert_eq!(svwf.direction, Direction::Ascending);
    assert!(svwf.gpu_weighted);

    assert!("round_robin".parse::<QueuePolicy>().is_err());
}

#[test]
fn test_gpu_weighted_key() {
    let policy: QueuePolicy = "ljf_gpu".parse().unwrap();
    let job = Job::new(0, 0.0, 3.0, Resources::gpus(4));
    assert_eq!(policy.sort_key(&job), -12.0);
}
