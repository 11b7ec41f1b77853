//! Metrics Tests
//!
//! Statistics computed from complete runs: waits, JCT, cloud cost,
//! utilization and warm-up trimming.

use burst_simulator_core_rs::metrics::percentile;
use burst_simulator_core_rs::{compute_stats, run_simulation, Job, Resources, SimulatorConfig, Stats};

fn config(waiting_policy: &str, warmup_jobs: usize) -> SimulatorConfig {
    SimulatorConfig {
        cluster_size: 1,
        gpus_per_node: 8,
        waiting_policy: waiting_policy.to_string(),
        warmup_jobs,
        ..Default::default()
    }
}

fn assert_close(actual: f64, expected: f64) {
    assert!((actual - expected).abs() < 1e-9, "expected {expected}, got {actual}");
}

#[test]
fn test_back_to_back_jobs_saturate_the_cluster() {
    let jobs = (0..4).map(|i| Job::new(i, i as f64, 1.0, Resources::gpus(8))).collect();
    let result = run_simulation(jobs, config("infinite", 0)).unwrap();
    let stats = &result.stats;

    // Window spans the first to the last arrival, [0, 3]
    assert_close(stats.cluster_utilization, 1.0);
    assert_close(stats.system_utilization, 1.0);
    assert_eq!(stats.avg_waiting, 0.0);
    assert_eq!(stats.avg_jct, 1.0);
    assert_eq!(stats.num_local, 4);
}

#[test]
fn test_cloud_only_run() {
    let jobs = (0..3).map(|i| Job::new(i, i as f64, 2.0, Resources::gpus(4))).collect();
    let result = run_simulation(jobs, config("zero", 0)).unwrap();
    let stats = &result.stats;

    assert_eq!(stats.num_cloud, 3);
    assert_eq!(stats.total_cloud_cost, 24.0);
    // Window [0, 2]
    assert_close(stats.avg_cloud_cost, 12.0);
    assert_eq!(stats.cluster_utilization, 0.0);
    assert_close(stats.system_utilization, 12.0 / 16.0);
    assert_eq!(stats.avg_jct, 2.0);
    assert_eq!(stats.avg_waiting, 0.0);
}

#[test]
fn test_timeout_wait_counts_toward_jct() {
    let jobs = vec![
        Job::new(0, 0.0, 10.0, Resources::gpus(8)),
        Job::new(1, 0.5, 1.0, Resources::gpus(8)),
    ];
    let result = run_simulation(jobs, config("constant-1", 0)).unwrap();
    let stats = &result.stats;

    // Job 1 waits until its timeout at 1.5, then runs 1h in the cloud
    assert_close(stats.avg_waiting, 0.5);
    assert_close(stats.p90_waiting, 0.9);
    assert_close(stats.avg_jct, (10.0 + 2.0) / 2.0);
}

#[test]
fn test_warmup_trims_both_ends() {
    let jobs: Vec<Job> = (0..10).map(|i| Job::new(i, i as f64, 0.5, Resources::gpus(1))).collect();

    let trimmed = run_simulation(jobs.clone(), config("infinite", 2)).unwrap();
    assert_eq!(trimmed.stats.num_jobs, 6);
    assert_eq!(trimmed.len(), 10);

    let everything = run_simulation(jobs, config("infinite", 5)).unwrap();
    assert_eq!(everything.stats, Stats::default());
}

#[test]
fn test_stats_recompute_identically() {
    let jobs: Vec<Job> = (0..30)
        .map(|i| Job::new(i, i as f64 * 0.3, 1.0 + (i % 4) as f64, Resources::gpus(1 + (i % 8) as u32)))
        .collect();
    let result = run_simulation(jobs, config("constant-1", 3)).unwrap();

    let again = compute_stats(result.jobs(), 8, 3);
    assert_eq!(again, result.stats);
    assert_eq!(compute_stats(result.jobs(), 8, 3), again);
}

#[test]
fn test_utilization_bounded() {
    let jobs: Vec<Job> = (0..40)
        .map(|i| Job::new(i, i as f64 * 0.25, 0.5 + (i % 3) as f64, Resources::gpus(1 + (i % 6) as u32)))
        .collect();
    let result = run_simulation(jobs, config("linear_runtime", 4)).unwrap();
    let stats = &result.stats;

    assert!(stats.cluster_utilization >= 0.0);
    assert!(stats.cluster_utilization <= 1.0 + 1e-9);
    assert!(stats.system_utilization >= stats.cluster_utilization);
    assert!(stats.p99_jct >= stats.p90_jct);
    assert_eq!(stats.num_local + stats.num_cloud, stats.num_jobs);
}

#[test]
fn test_percentile_linear_interpolation() {
    let values = [10.0, 20.0, 30.0, 40.0, 50.0];
    assert_eq!(percentile(&values, 50.0), 30.0);
    assert_close(percentile(&values, 90.0), 46.0);
    assert_eq!(percentile(&[7.0], 99.0), 7.0);
}
