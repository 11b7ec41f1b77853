//! Simulator Engine
//!
//! Event-driven loop replaying a job trace against the cluster allocator,
//! the queue policy and the waiting policy.
//!
//! # Architecture
//!
//! ```text
//! For each tick at time t:
//! 1. Drain completions (release finished jobs, promote reservations)
//! 2. Expire timeouts (queued jobs past deadline - runtime go to the cloud,
//!    long jobs may be preempted back on-prem later)
//! 3. Admit arrivals (waiting policy → queue or cloud)
//! 4. Sort the queue (queue policy, ties by idx)
//! 5. Place (stop at the first blocked job unless loop mode)
//! 6. Backfill (reserve the head, then place around it)
//! 7. Enforce the queue cap (evict the tail to the cloud)
//! 8. Snapshot the queue if requested
//! 9. Advance time to the next completion, arrival or timeout
//! ```
//!
//! The run ends when the arrival stream, the queue and the cluster are
//! all empty.
//!
//! # Example
//!
//! ```rust
//! use burst_simulator_core_rs::{Job, JobState, Resources, Simulator, SimulatorConfig};
//!
//! let config = SimulatorConfig {
//!     cluster_size: 1,
//!     waiting_policy: "constant-2".to_string(),
//!     warmup_jobs: 0,
//!     ..Default::default()
//! };
//! let jobs = (0..3).map(|i| Job::new(i, 0.0, 1.0, Resources::gpus(4))).collect();
//!
//! let result = Simulator::new(jobs, config).unwrap().run().unwrap();
//! assert_eq!(result.state, vec![JobState::Local; 3]);
//! assert_eq!(result.start, vec![0.0, 0.0, 1.0]);
//! ```

use super::config::{ConfigError, PredictMode, ResolvedConfig, SimulatorConfig};
use super::result::{Diagnostics, QueueSnapshot, SimulationResult};
use crate::cluster::{AllocationError, BlockCause, Cluster};
use crate::core::time::{SimClock, TimeError};
use crate::metrics::compute_stats;
use crate::models::job::{Job, JobId, JobState, INFINITE_DEADLINE};
use crate::policy::Deadline;
use crate::rng::RngManager;
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;
use tracing::{debug, info, trace};

// ============================================================================
// Errors and tick results
// ============================================================================

/// Simulation error types
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimulationError {
    #[error("Invalid config: {0}")]
    Config(#[from] ConfigError),

    #[error("Allocator invariant violated: {0}")]
    Allocation(#[from] AllocationError),

    #[error(transparent)]
    Time(#[from] TimeError),

    #[error("Job {job} timed out at {now}, past its deadline {deadline}")]
    TimeoutPastDeadline { job: JobId, now: f64, deadline: f64 },

    #[error("Job {job} became eligible at {eligible_at}, but the clock is already at {now}")]
    ArrivalMissed { job: JobId, eligible_at: f64, now: f64 },

    #[error("Simulation stopped with {pending} pending, {queued} queued and {on_cluster} jobs on the cluster")]
    Undrained {
        pending: usize,
        queued: usize,
        on_cluster: usize,
    },

    #[error("Invalid job trace: {0}")]
    InvalidJobs(String),

    #[error("Job {0} finished without a start time or state")]
    Unfinished(JobId),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result of a single tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickResult {
    /// Simulation time the tick ran at
    pub time: f64,

    /// Jobs that finished on the cluster
    pub completed: usize,

    /// Jobs placed on the cluster (reservation promotions excluded)
    pub placed: usize,

    /// Jobs that left for the cloud (timeouts, admissions, evictions)
    pub sent_to_cloud: usize,

    /// Queue length after the tick
    pub queue_len: usize,

    /// Time the next tick will run at, `None` once the run is over
    pub next_time: Option<f64>,
}

/// Why a job is leaving for the cloud
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloudRoute {
    /// Never queued (zero wait, CPU filter, never fits, predicted timeout)
    Admission,
    Timeout,
    Eviction,
}

// ============================================================================
// Simulator
// ============================================================================

/// Discrete-event hybrid cluster/cloud simulator
///
/// Owns every job in a dense arena; the queue, the arrival stream and the
/// finished list hold arena positions, and the cluster refers to jobs by
/// `JobId`.
pub struct Simulator {
    config: SimulatorConfig,
    resolved: ResolvedConfig,

    /// Job arena
    jobs: Vec<Job>,
    /// JobId → arena position
    slots: HashMap<JobId, usize>,

    /// Not yet eligible, ordered by `eligible_at`
    pending: VecDeque<usize>,
    /// Waiting queue, in policy order after each sort
    queue: Vec<usize>,
    finished: Vec<usize>,

    cluster: Cluster,
    clock: SimClock,
    rng: RngManager,
    diagnostics: Diagnostics,
    snapshots: Vec<QueueSnapshot>,
    done: bool,
}

impl Simulator {
    /// Create a simulator for `jobs` under `config`
    ///
    /// # Arguments
    ///
    /// * `jobs` - Trace sorted by non-decreasing arrival, unique `idx`
    /// * `config` - Run configuration, validated here
    ///
    /// # Returns
    ///
    /// * `Ok(Simulator)` - Ready to `tick` or `run`
    /// * `Err(SimulationError)` - Bad configuration or malformed trace
    pub fn new(jobs: Vec<Job>, config: SimulatorConfig) -> Result<Self, SimulationError> {
        let resolved = config.resolve()?;
        Self::validate_jobs(&jobs)?;

        let slots = jobs.iter().enumerate().map(|(pos, job)| (job.idx(), pos)).collect();
        let cluster = Cluster::new(
            resolved.cluster_size,
            resolved.gpus_per_node,
            resolved.cpus_per_node,
            resolved.binpack,
        );

        info!(
            jobs = jobs.len(),
            nodes = resolved.cluster_size,
            gpus_per_node = resolved.gpus_per_node,
            queue_policy = %resolved.queue_policy,
            waiting_policy = %resolved.waiting_policy,
            binpack = %resolved.binpack,
            backfill = resolved.backfill,
            loop_mode = resolved.loop_mode,
            "simulation configured"
        );

        Ok(Self {
            rng: RngManager::new(resolved.seed),
            pending: (0..jobs.len()).collect(),
            queue: Vec::new(),
            finished: Vec::with_capacity(jobs.len()),
            jobs,
            slots,
            cluster,
            clock: SimClock::new(),
            diagnostics: Diagnostics::default(),
            snapshots: Vec::new(),
            done: false,
            config,
            resolved,
        })
    }

    fn validate_jobs(jobs: &[Job]) -> Result<(), SimulationError> {
        let mut seen = HashSet::with_capacity(jobs.len());
        let mut last_arrival = 0.0;
        for job in jobs {
            if !seen.insert(job.idx()) {
                return Err(SimulationError::InvalidJobs(format!("duplicate job idx {}", job.idx())));
            }
            if !job.arrival().is_finite() || job.arrival() < 0.0 {
                return Err(SimulationError::InvalidJobs(format!(
                    "job {} has invalid arrival {}",
                    job.idx(),
                    job.arrival()
                )));
            }
            if job.arrival() < last_arrival {
                return Err(SimulationError::InvalidJobs(format!(
                    "job {} arrives at {} before its predecessor ({})",
                    job.idx(),
                    job.arrival(),
                    last_arrival
                )));
            }
            if !job.runtime().is_finite() || job.runtime() < 0.0 {
                return Err(SimulationError::InvalidJobs(format!(
                    "job {} has invalid runtime {}",
                    job.idx(),
                    job.runtime()
                )));
            }
            last_arrival = job.arrival();
        }
        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Current simulation time
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn is_finished(&self) -> bool {
        self.done
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Queued job ids, in the order of the last placement pass
    pub fn queued_ids(&self) -> Vec<JobId> {
        self.queue.iter().map(|&s| self.jobs[s].idx()).collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn finished_len(&self) -> usize {
        self.finished.len()
    }

    /// Look up a job by idx, wherever it currently is
    pub fn job(&self, idx: JobId) -> Option<&Job> {
        self.slots.get(&idx).map(|&s| &self.jobs[s])
    }

    // ========================================================================
    // Main loop
    // ========================================================================

    /// Run to completion and build the report
    pub fn run(mut self) -> Result<SimulationResult, SimulationError> {
        while !self.done {
            self.tick()?;
        }
        self.into_result()
    }

    /// Execute one simulation tick
    ///
    /// # Returns
    ///
    /// * `Ok(TickResult)` - Tick executed; `next_time` is `None` once the
    ///   run is over (further calls are no-ops)
    /// * `Err(SimulationError)` - An invariant broke; the run is unusable
    pub fn tick(&mut self) -> Result<TickResult, SimulationError> {
        let t = self.clock.now();
        if self.done {
            return Ok(TickResult {
                time: t,
                completed: 0,
                placed: 0,
                sent_to_cloud: 0,
                queue_len: 0,
                next_time: None,
            });
        }
        self.diagnostics.ticks += 1;
        let finished_before = self.finished.len();

        // 1. Drain completions
        let cleared = self.cluster.try_clear(t)?;
        for &id in &cleared.completed {
            let s = self.slot(id)?;
            self.jobs[s].state = Some(JobState::Local);
            self.finished.push(s);
        }
        for &id in &cleared.promoted {
            trace!(job = id, time = t, "reservation promoted");
        }
        self.diagnostics.promotions += cleared.promoted.len();

        // 2. Expire timeouts
        self.expire_timeouts(t)?;

        // 3. Admit arrivals
        self.admit_arrivals(t)?;

        // 4. Sort the queue
        let policy = self.resolved.queue_policy;
        let jobs = &self.jobs;
        self.queue.sort_by(|&a, &b| policy.compare(&jobs[a], &jobs[b]));
        self.diagnostics.peak_queue_len = self.diagnostics.peak_queue_len.max(self.queue.len());

        // 5. Place
        let mut placed = self.place(t, self.resolved.loop_mode)?;

        // 6. Backfill
        if self.resolved.backfill && !self.queue.is_empty() {
            let head = self.queue[0];
            if self.cluster.try_reserve(t, &mut self.jobs[head])? {
                self.queue.remove(0);
                self.diagnostics.reservations += 1;
                trace!(
                    job = self.jobs[head].idx(),
                    start = ?self.jobs[head].start(),
                    blocker = ?self.jobs[head].block_job_idx(),
                    "reservation made"
                );
            } else {
                self.diagnostics.reservations_declined += 1;
            }
            placed += self.place(t, true)?;
        }

        // 7. Enforce the queue cap
        if let Some(max) = self.resolved.max_queue_length {
            if self.queue.len() > max {
                let evicted = self.queue.split_off(max);
                for s in evicted {
                    self.send_to_cloud(s, t, CloudRoute::Eviction);
                }
            }
        }

        if cfg!(debug_assertions) {
            self.cluster.verify()?;
        }

        // 8. Snapshot
        if self.resolved.snapshot {
            self.snapshots.push(QueueSnapshot {
                time: t,
                queued: self.queued_ids(),
                free_gpus: self.cluster.free_gpus(),
                active_jobs: self.cluster.active_len(),
            });
        }

        // 9. Advance time
        let next_time = self.next_time();
        match next_time {
            Some(next) => self.clock.advance_to(next)?,
            None => {
                if !self.queue.is_empty() || !self.pending.is_empty() || !self.cluster.is_drained() {
                    return Err(SimulationError::Undrained {
                        pending: self.pending.len(),
                        queued: self.queue.len(),
                        on_cluster: self.cluster.active_len() + self.cluster.reserved_len(),
                    });
                }
                self.done = true;
            }
        }

        let new_finished = self.finished.len() - finished_before;
        let completed = cleared.completed.len();
        debug!(
            time = t,
            queued = self.queue.len(),
            active = self.cluster.active_len(),
            reserved = self.cluster.reserved_len(),
            completed,
            placed,
            "tick"
        );

        Ok(TickResult {
            time: t,
            completed,
            placed,
            sent_to_cloud: new_finished - completed,
            queue_len: self.queue.len(),
            next_time,
        })
    }

    fn next_time(&self) -> Option<f64> {
        let now = self.clock.now();
        let next_completion = self.cluster.next_completion();
        let next_arrival = self.pending.front().map(|&s| self.jobs[s].eligible_at());
        // (arrival + wait + runtime) - runtime can round just below arrival
        let next_timeout = self
            .queue
            .iter()
            .map(|&s| self.jobs[s].timeout_at().max(now))
            .min_by(f64::total_cmp);

        [next_completion, next_arrival, next_timeout]
            .into_iter()
            .flatten()
            .min_by(f64::total_cmp)
    }

    // ========================================================================
    // Tick phases
    // ========================================================================

    fn expire_timeouts(&mut self, t: f64) -> Result<(), SimulationError> {
        let queue = std::mem::take(&mut self.queue);
        let mut kept = Vec::with_capacity(queue.len());

        for s in queue {
            let job = &self.jobs[s];
            if t < job.timeout_at() {
                kept.push(s);
                continue;
            }
            if t > job.deadline() {
                return Err(SimulationError::TimeoutPastDeadline {
                    job: job.idx(),
                    now: t,
                    deadline: job.deadline(),
                });
            }
            if !self.try_preempt_back(s, t)? {
                self.diagnostics.timeouts += 1;
                self.send_to_cloud(s, t, CloudRoute::Timeout);
            }
        }

        self.queue = kept;
        Ok(())
    }

    /// Serve part of a long job in the cloud, then bring it back on-prem
    ///
    /// Returns whether the job was sent back to the arrival stream.
    fn try_preempt_back(&mut self, s: usize, t: f64) -> Result<bool, SimulationError> {
        let Some(rule) = self.resolved.preempt_back else {
            return Ok(false);
        };
        let job = &self.jobs[s];
        if job.runtime() <= rule.long_job_thres || job.was_preempted_back() {
            return Ok(false);
        }
        let dwell = rule.cloud_ratio * job.runtime();
        if dwell >= job.runtime() {
            return Ok(false);
        }

        let cloud_start = self.cloud_start(s, t, CloudRoute::Timeout);
        let job = &mut self.jobs[s];
        job.cloud_start = Some(cloud_start);
        job.cloud_runtime = dwell;
        job.resubmit_at = Some((cloud_start + dwell).max(t));
        job.deadline = INFINITE_DEADLINE;
        let eligible_at = job.eligible_at();
        let idx = job.idx();

        let jobs = &self.jobs;
        let pos = self
            .pending
            .partition_point(|&p| jobs[p].eligible_at() <= eligible_at);
        self.pending.insert(pos, s);
        self.diagnostics.preempt_backs += 1;
        debug!(job = idx, dwell, resubmit_at = eligible_at, "preempted back from cloud");
        Ok(true)
    }

    fn admit_arrivals(&mut self, t: f64) -> Result<(), SimulationError> {
        while let Some(&s) = self.pending.front() {
            let eligible_at = self.jobs[s].eligible_at();
            if eligible_at > t {
                break;
            }
            if eligible_at < t {
                return Err(SimulationError::ArrivalMissed {
                    job: self.jobs[s].idx(),
                    eligible_at,
                    now: t,
                });
            }
            self.pending.pop_front();

            // Preempted-back jobs already carry their forced-local deadline
            if self.jobs[s].resubmit_at.is_some() {
                self.queue.push(s);
            } else {
                self.admit(s, t);
            }
        }
        Ok(())
    }

    fn admit(&mut self, s: usize, t: f64) {
        let estimate = self
            .resolved
            .estimator
            .estimate(self.jobs[s].runtime(), &mut self.rng);
        let deadline = self.resolved.waiting_policy.deadline(&self.jobs[s], estimate);

        let job = &mut self.jobs[s];
        let Deadline::At(deadline) = deadline else {
            job.deadline = job.arrival() + job.runtime();
            self.diagnostics.immediate_cloud += 1;
            self.send_to_cloud(s, t, CloudRoute::Admission);
            return;
        };
        job.deadline = deadline;

        if !self.cluster.can_ever_fit(&self.jobs[s]) {
            let job = &mut self.jobs[s];
            job.deadline = job.arrival() + job.runtime();
            self.diagnostics.immediate_cloud += 1;
            debug!(job = job.idx(), gpus = job.num_gpus(), "job can never fit the cluster");
            self.send_to_cloud(s, t, CloudRoute::Admission);
            return;
        }

        if self.resolved.predict == PredictMode::AtAdmission {
            let job = &self.jobs[s];
            let in_time = self
                .cluster
                .earliest_start(t, job)
                .is_some_and(|start| start <= job.timeout_at());
            if !in_time {
                self.diagnostics.predicted_cloud += 1;
                self.send_to_cloud(s, t, CloudRoute::Admission);
                return;
            }
        }

        self.queue.push(s);
    }

    /// One placement pass over the queue
    ///
    /// With `skip_blocked` the pass continues past jobs that do not fit;
    /// otherwise the first blocked job stops it.
    fn place(&mut self, t: f64, skip_blocked: bool) -> Result<usize, SimulationError> {
        let queue = std::mem::take(&mut self.queue);
        let mut kept = Vec::with_capacity(queue.len());
        let mut placed = 0;
        let mut blocked = false;

        for s in queue {
            if blocked {
                kept.push(s);
                continue;
            }
            match self.cluster.plan_fit(t, &self.jobs[s]) {
                Ok(plan) => {
                    if plan.uses_reserved() {
                        self.diagnostics.backfill_window_placements += 1;
                    }
                    self.cluster.commit_fit(t, &mut self.jobs[s], plan)?;
                    self.diagnostics.placements += 1;
                    placed += 1;
                    trace!(job = self.jobs[s].idx(), time = t, "placed");
                }
                Err(cause) => {
                    match cause {
                        BlockCause::Gpus => self.diagnostics.fit_failures_gpu += 1,
                        BlockCause::Cpus => self.diagnostics.fit_failures_cpu += 1,
                    }
                    kept.push(s);
                    blocked = !skip_blocked;
                }
            }
        }

        self.queue = kept;
        Ok(placed)
    }

    // ========================================================================
    // Cloud offload
    // ========================================================================

    /// Instant the cloud run of job `s` is charged from
    fn cloud_start(&self, s: usize, t: f64, route: CloudRoute) -> f64 {
        let job = &self.jobs[s];
        let base = match (route, self.resolved.predict) {
            (CloudRoute::Admission, _) => job.arrival(),
            (_, PredictMode::Oracle) => job.arrival(),
            (CloudRoute::Timeout, _) => job.timeout_at(),
            (CloudRoute::Eviction, _) => t,
        };
        base + self.resolved.data_gravity_delay
    }

    fn send_to_cloud(&mut self, s: usize, t: f64, route: CloudRoute) {
        let start = self.cloud_start(s, t, route);
        let job = &mut self.jobs[s];
        job.state = Some(JobState::TimeoutCloud);
        job.start = Some(start);
        if route == CloudRoute::Eviction {
            self.diagnostics.evictions += 1;
        }
        trace!(job = job.idx(), start, route = ?route, "sent to cloud");
        self.finished.push(s);
    }

    fn slot(&self, id: JobId) -> Result<usize, SimulationError> {
        self.slots
            .get(&id)
            .copied()
            .ok_or(SimulationError::Allocation(AllocationError::UnknownJob(id)))
    }

    // ========================================================================
    // Report
    // ========================================================================

    fn into_result(self) -> Result<SimulationResult, SimulationError> {
        if !self.done {
            return Err(SimulationError::Undrained {
                pending: self.pending.len(),
                queued: self.queue.len(),
                on_cluster: self.cluster.active_len() + self.cluster.reserved_len(),
            });
        }

        let total_gpus = self.resolved.cluster_size as u64 * self.resolved.gpus_per_node as u64;
        let stats = compute_stats(&self.jobs, total_gpus, self.resolved.warmup_jobs);
        info!(
            time = self.clock.now(),
            ticks = self.diagnostics.ticks,
            jobs = self.jobs.len(),
            local = stats.num_local,
            cloud = stats.num_cloud,
            total_cloud_cost = stats.total_cloud_cost,
            avg_jct = stats.avg_jct,
            cluster_utilization = stats.cluster_utilization,
            "simulation finished"
        );

        let snapshots = self.resolved.snapshot.then_some(self.snapshots);
        SimulationResult::new(self.jobs, self.config, stats, self.diagnostics, snapshots)
    }
}

/// Run one simulation end to end
pub fn run_simulation(jobs: Vec<Job>, config: SimulatorConfig) -> Result<SimulationResult, SimulationError> {
    Simulator::new(jobs, config)?.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::Resources;

    fn config(waiting_policy: &str) -> SimulatorConfig {
        SimulatorConfig {
            cluster_size: 1,
            waiting_policy: waiting_policy.to_string(),
            warmup_jobs: 0,
            ..Default::default()
        }
    }

    fn three_jobs() -> Vec<Job> {
        (0..3).map(|i| Job::new(i, 0.0, 1.0, Resources::gpus(4))).collect()
    }

    #[test]
    fn test_rejects_unsorted_trace() {
        let jobs = vec![
            Job::new(0, 2.0, 1.0, Resources::gpus(1)),
            Job::new(1, 1.0, 1.0, Resources::gpus(1)),
        ];
        assert!(matches!(
            Simulator::new(jobs, config("infinite")),
            Err(SimulationError::InvalidJobs(_))
        ));
    }

    #[test]
    fn test_rejects_duplicate_idx() {
        let jobs = vec![
            Job::new(0, 0.0, 1.0, Resources::gpus(1)),
            Job::new(0, 1.0, 1.0, Resources::gpus(1)),
        ];
        assert!(matches!(
            Simulator::new(jobs, config("infinite")),
            Err(SimulationError::InvalidJobs(_))
        ));
    }

    #[test]
    fn test_tick_by_tick_progress() {
        let mut sim = Simulator::new(three_jobs(), config("constant-2")).unwrap();

        let first = sim.tick().unwrap();
        assert_eq!(first.time, 0.0);
        assert_eq!(first.placed, 2);
        assert_eq!(first.queue_len, 1);
        assert_eq!(first.next_time, Some(1.0));
        assert_eq!(sim.diagnostics().placements, 2);
        let queued = sim.job(2).unwrap();
        assert_eq!(queued.deadline(), 3.0);
        assert!(queued.start().is_none());
        assert_eq!(sim.job(0).unwrap().start(), Some(0.0));
        assert!(sim.job(99).is_none());

        let second = sim.tick().unwrap();
        assert_eq!(second.completed, 2);
        assert_eq!(second.placed, 1);
        assert_eq!(second.next_time, Some(2.0));

        let last = sim.tick().unwrap();
        assert_eq!(last.completed, 1);
        assert_eq!(last.next_time, None);
        assert!(sim.is_finished());
    }

    #[test]
    fn test_zero_wait_constant_times_out_at_arrival() {
        let result = run_simulation(three_jobs(), config("constant-0")).unwrap();
        assert_eq!(result.state[0], JobState::Local);
        assert_eq!(result.state[1], JobState::Local);
        assert_eq!(result.state[2], JobState::TimeoutCloud);
        assert_eq!(result.start[2], 0.0);
    }

    #[test]
    fn test_timeout_past_deadline_is_fatal() {
        let mut sim = Simulator::new(three_jobs(), config("constant-2")).unwrap();
        sim.tick().unwrap();
        assert_eq!(sim.queued_ids(), vec![2]);

        // Deadline already behind the clock when the timeout is processed
        let s = sim.slots[&2];
        sim.jobs[s].deadline = 0.5;
        let err = sim.expire_timeouts(1.0).unwrap_err();
        assert!(matches!(
            err,
            SimulationError::TimeoutPastDeadline { job: 2, now, deadline } if now == 1.0 && deadline == 0.5
        ));
    }

    #[test]
    fn test_empty_trace_terminates() {
        let result = run_simulation(Vec::new(), config("infinite")).unwrap();
        assert!(result.is_empty());
        assert_eq!(result.diagnostics.ticks, 1);
    }
}
