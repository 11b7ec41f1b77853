//! End-of-run metrics
//!
//! Pure functions over the finished-job list. The first and last
//! `warmup_jobs` jobs (by idx) are trimmed so the statistics describe the
//! steady state; utilization still counts every job's GPU time that falls
//! inside the observation window.

use crate::models::job::{Job, JobState};
use serde::{Deserialize, Serialize};

/// Aggregate statistics of one run
///
/// Every field is zero when no job survives the warm-up trimming.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub total_cloud_cost: f64,
    /// Cloud cost per unit of observation-window time
    pub avg_cloud_cost: f64,
    pub avg_waiting: f64,
    pub p90_waiting: f64,
    pub p99_waiting: f64,
    pub avg_jct: f64,
    pub p90_jct: f64,
    pub p99_jct: f64,
    pub cluster_utilization: f64,
    pub system_utilization: f64,
    pub num_jobs: usize,
    pub num_local: usize,
    pub num_cloud: usize,
    pub num_preempted_back: usize,
}

/// Compute [`Stats`] for a finished run
///
/// `jobs` may be in any order; it is ranked by idx internally.
/// `total_gpus` is the cluster's GPU capacity.
///
/// # Example
/// ```
/// use burst_simulator_core_rs::metrics::compute_stats;
///
/// let stats = compute_stats(&[], 8, 0);
/// assert_eq!(stats.num_jobs, 0);
/// assert_eq!(stats.avg_jct, 0.0);
/// ```
pub fn compute_stats(jobs: &[Job], total_gpus: u64, warmup_jobs: usize) -> Stats {
    let mut ranked: Vec<&Job> = jobs.iter().collect();
    ranked.sort_by_key(|j| j.idx());

    let n = ranked.len();
    if n <= 2 * warmup_jobs {
        return Stats::default();
    }
    let retained = &ranked[warmup_jobs..n - warmup_jobs];

    let window_start = ranked[warmup_jobs].arrival();
    let window_end = ranked[(n - warmup_jobs).min(n - 1)].arrival();
    let window = window_end - window_start;

    let mut jcts = Vec::with_capacity(retained.len());
    let mut waits = Vec::with_capacity(retained.len());
    let mut stats = Stats {
        num_jobs: retained.len(),
        ..Stats::default()
    };

    for job in retained {
        if let Some(done) = job.completion_time() {
            let jct = done - job.arrival();
            jcts.push(jct);
            waits.push(jct - job.runtime());
        }
        stats.total_cloud_cost += job.cloud_cost();
        match job.state() {
            Some(JobState::Local) => stats.num_local += 1,
            Some(JobState::TimeoutCloud) => stats.num_cloud += 1,
            None => {}
        }
        if job.was_preempted_back() {
            stats.num_preempted_back += 1;
        }
    }

    stats.avg_waiting = mean(&waits);
    stats.p90_waiting = percentile(&waits, 90.0);
    stats.p99_waiting = percentile(&waits, 99.0);
    stats.avg_jct = mean(&jcts);
    stats.p90_jct = percentile(&jcts, 90.0);
    stats.p99_jct = percentile(&jcts, 99.0);

    let (local_space, cloud_space) = space_time(&ranked, window_start, window_end);
    let capacity = total_gpus as f64 * window;
    if window > 0.0 {
        stats.avg_cloud_cost = stats.total_cloud_cost / window;
    }
    if capacity > 0.0 {
        stats.cluster_utilization = local_space / capacity;
        stats.system_utilization = (local_space + cloud_space) / capacity;
    }
    stats
}

/// GPU-time on-prem and in the cloud, clipped to `[lo, hi]`
fn space_time(jobs: &[&Job], lo: f64, hi: f64) -> (f64, f64) {
    let overlap = |start: f64, len: f64| (hi.min(start + len) - lo.max(start)).max(0.0);

    let mut local = 0.0;
    let mut cloud = 0.0;
    for job in jobs {
        let gpus = job.num_gpus() as f64;
        let Some(start) = job.start() else { continue };
        match job.state() {
            Some(JobState::Local) => {
                local += gpus * overlap(start, job.remaining_runtime());
                if let Some(cloud_start) = job.cloud_start() {
                    cloud += gpus * overlap(cloud_start, job.cloud_runtime());
                }
            }
            Some(JobState::TimeoutCloud) => cloud += gpus * overlap(start, job.runtime()),
            None => {}
        }
    }
    (local, cloud)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// `p`-th percentile with linear interpolation between closest ranks
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}
