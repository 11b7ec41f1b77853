//! Cluster resource allocator
//!
//! Owns the occupancy state of the on-prem cluster and is its sole
//! mutator. Jobs themselves live in the engine's arena; the allocator keys
//! everything by `JobId` and keeps its own copy of where each job sits.
//!
//! Three operations drive the engine:
//! - `try_fit`: all-or-nothing immediate placement (bin-packing)
//! - `try_reserve`: EASY-backfill reservation of future slots
//! - `try_clear`: release completed jobs and promote unblocked reservations
//!
//! # Critical Invariants
//!
//! 1. Per node, `free_gpus + Σ(held slots) == num_gpus` (same for CPUs)
//! 2. `active_jobs` and `reserved_jobs` are disjoint
//! 3. A failed placement leaves occupancy untouched
//! 4. Any counter underflow or slot conflict aborts the run

pub mod binpack;
pub mod demand;

pub use binpack::BinpackStrategy;

use crate::models::job::{Job, JobId};
use crate::models::node::Node;
use demand::{decompose, fits_empty, Chunk};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// Allocator invariant violations
///
/// None of these are recoverable: they mean the planner and the occupancy
/// state disagree, and every metric computed afterwards would be wrong.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AllocationError {
    #[error("GPU {slot} on node {node} already held by job {holder}, cannot assign to job {claimant}")]
    DoubleAssignment {
        node: usize,
        slot: usize,
        holder: JobId,
        claimant: JobId,
    },

    #[error("GPU {slot} on node {node} already reserved by job {holder}, cannot reserve for job {claimant}")]
    DoubleReservation {
        node: usize,
        slot: usize,
        holder: JobId,
        claimant: JobId,
    },

    #[error("Job {job} does not hold GPU {slot} on node {node} (holder: {holder:?})")]
    ForeignRelease {
        node: usize,
        slot: usize,
        job: JobId,
        holder: Option<JobId>,
    },

    #[error("Free {resource} counter on node {node} would go negative")]
    CapacityUnderflow { node: usize, resource: &'static str },

    #[error("Node {node} counters disagree with its slot tables")]
    CapacityMismatch { node: usize },

    #[error("Node {node} has no GPU slot {slot}")]
    NoSuchSlot { node: usize, slot: usize },

    #[error("Job {0} is not known to the cluster")]
    UnknownJob(JobId),

    #[error("Job {0} is already active or reserved")]
    AlreadyPlaced(JobId),

    #[error("Reservation of job {job} promoted at {now}, after its start {start}")]
    LatePromotion { job: JobId, start: f64, now: f64 },

    #[error("Job {0} cannot be reserved even after every active job completes")]
    UnplaceableReservation(JobId),
}

// ============================================================================
// Placement types
// ============================================================================

/// Why an immediate placement attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockCause {
    /// No node left with enough usable GPUs for some chunk
    Gpus,
    /// A node had the GPUs but not the CPUs
    Cpus,
}

/// One demand chunk bound to a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub node: usize,
    pub slots: Vec<usize>,
    pub cpus: u32,
}

/// Result of a successful `plan_fit`, consumed by `commit_fit`
#[derive(Debug, Clone, PartialEq)]
pub struct FitPlan {
    placements: Vec<Placement>,
    uses_reserved: bool,
}

impl FitPlan {
    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }

    /// Whether the plan borrows slots held by a future reservation
    pub fn uses_reserved(&self) -> bool {
        self.uses_reserved
    }
}

/// Jobs released and reservations promoted by one `try_clear`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClearOutcome {
    pub completed: Vec<JobId>,
    pub promoted: Vec<JobId>,
}

#[derive(Debug, Clone, PartialEq)]
struct ActiveEntry {
    end: f64,
    placements: Vec<Placement>,
}

#[derive(Debug, Clone, PartialEq)]
struct Reservation {
    start: f64,
    end: f64,
    blocker: JobId,
    placements: Vec<Placement>,
}

enum Search {
    Found(Reservation),
    PastCutoff,
    Exhausted,
}

// ============================================================================
// Cluster
// ============================================================================

/// Homogeneous cluster of GPU nodes
///
/// # Example
/// ```
/// use burst_simulator_core_rs::{BinpackStrategy, Cluster, Job, Resources};
///
/// let mut cluster = Cluster::new(1, 8, 96, BinpackStrategy::FirstFit);
/// let mut job = Job::new(0, 0.0, 1.0, Resources::gpus(4));
///
/// assert!(cluster.try_fit(0.0, &mut job).unwrap());
/// assert_eq!(cluster.free_gpus(), 4);
///
/// let cleared = cluster.try_clear(1.0).unwrap();
/// assert_eq!(cleared.completed, vec![0]);
/// assert_eq!(cluster.free_gpus(), 8);
/// ```
#[derive(Debug, Clone)]
pub struct Cluster {
    nodes: Vec<Node>,
    gpus_per_node: u32,
    cpus_per_node: u32,
    binpack: BinpackStrategy,
    active_jobs: BTreeMap<JobId, ActiveEntry>,
    reserved_jobs: BTreeMap<JobId, Reservation>,
}

impl Cluster {
    pub fn new(num_nodes: usize, gpus_per_node: u32, cpus_per_node: u32, binpack: BinpackStrategy) -> Self {
        Self {
            nodes: (0..num_nodes)
                .map(|i| Node::new(i, gpus_per_node, cpus_per_node))
                .collect(),
            gpus_per_node,
            cpus_per_node,
            binpack,
            active_jobs: BTreeMap::new(),
            reserved_jobs: BTreeMap::new(),
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Total idle GPUs, reserved or not
    pub fn free_gpus(&self) -> u32 {
        self.nodes.iter().map(Node::free_gpus).sum()
    }

    pub fn active_ids(&self) -> impl Iterator<Item = JobId> + '_ {
        self.active_jobs.keys().copied()
    }

    pub fn reserved_ids(&self) -> impl Iterator<Item = JobId> + '_ {
        self.reserved_jobs.keys().copied()
    }

    pub fn active_len(&self) -> usize {
        self.active_jobs.len()
    }

    pub fn reserved_len(&self) -> usize {
        self.reserved_jobs.len()
    }

    /// No job running and none waiting on a reservation
    pub fn is_drained(&self) -> bool {
        self.active_jobs.is_empty() && self.reserved_jobs.is_empty()
    }

    /// Earliest completion among active jobs
    pub fn next_completion(&self) -> Option<f64> {
        self.active_jobs
            .values()
            .map(|e| e.end)
            .min_by(f64::total_cmp)
    }

    /// Whether the job could run on this cluster if it were empty
    pub fn can_ever_fit(&self, job: &Job) -> bool {
        let chunks = decompose(job.resources(), self.gpus_per_node);
        fits_empty(&chunks, self.nodes.len(), self.gpus_per_node, self.cpus_per_node)
    }

    // ========================================================================
    // Immediate placement
    // ========================================================================

    /// Plan an immediate placement without touching occupancy
    ///
    /// Per node the usable slots are the idle ones: slots reserved for a
    /// future job come first (only when this job would be gone before that
    /// reservation starts), then unreserved slots. CPUs held back for
    /// reservations are not usable.
    pub fn plan_fit(&self, t: f64, job: &Job) -> Result<FitPlan, BlockCause> {
        let chunks = decompose(job.resources(), self.gpus_per_node);
        let finish = t + job.remaining_runtime();

        let usable: Vec<Vec<usize>> = self
            .nodes
            .iter()
            .map(|node| {
                node.usable_slots(|owner| {
                    self.reserved_jobs
                        .get(&owner)
                        .is_some_and(|r| r.start >= finish)
                })
            })
            .collect();

        let total_usable: usize = usable.iter().map(Vec::len).sum();
        if job.num_gpus() as usize > total_usable {
            return Err(BlockCause::Gpus);
        }

        let counts: Vec<usize> = usable.iter().map(Vec::len).collect();
        let ranking = self.binpack.rank(&counts);

        let mut taken = BTreeSet::new();
        let mut placements = Vec::with_capacity(chunks.len());
        let mut uses_reserved = false;

        for chunk in &chunks {
            let mut cpu_starved = false;
            let chosen = ranking.iter().copied().find(|&n| {
                if taken.contains(&n) || counts[n] < chunk.gpus as usize {
                    return false;
                }
                if self.nodes[n].cpu_slack() < chunk.cpus {
                    cpu_starved = true;
                    return false;
                }
                true
            });

            let Some(n) = chosen else {
                return Err(if cpu_starved { BlockCause::Cpus } else { BlockCause::Gpus });
            };

            let slots = usable[n][..chunk.gpus as usize].to_vec();
            let reserved = self.nodes[n].reserved_gpus();
            uses_reserved |= slots.iter().any(|&s| reserved[s].is_some());
            taken.insert(n);
            placements.push(Placement {
                node: n,
                slots,
                cpus: chunk.cpus,
            });
        }

        Ok(FitPlan {
            placements,
            uses_reserved,
        })
    }

    /// Execute a plan produced by `plan_fit` at the same instant
    pub fn commit_fit(&mut self, t: f64, job: &mut Job, plan: FitPlan) -> Result<(), AllocationError> {
        if self.active_jobs.contains_key(&job.idx) || self.reserved_jobs.contains_key(&job.idx) {
            return Err(AllocationError::AlreadyPlaced(job.idx));
        }
        for p in &plan.placements {
            self.nodes[p.node].assign(&p.slots, job.idx, p.cpus)?;
        }

        job.start = Some(t);
        job.allocated_gpus = plan
            .placements
            .iter()
            .map(|p| (p.node, p.slots.clone()))
            .collect();
        self.active_jobs.insert(
            job.idx,
            ActiveEntry {
                end: t + job.remaining_runtime(),
                placements: plan.placements,
            },
        );
        Ok(())
    }

    /// Place `job` now if it fits; returns whether it was placed
    pub fn try_fit(&mut self, t: f64, job: &mut Job) -> Result<bool, AllocationError> {
        match self.plan_fit(t, job) {
            Ok(plan) => {
                self.commit_fit(t, job, plan)?;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    // ========================================================================
    // Backfill reservations
    // ========================================================================

    /// Reserve future slots for a blocked job (EASY backfill)
    ///
    /// Walks active jobs by completion time, adding the slots and CPUs each
    /// one frees to what is idle now, until the job's chunks fit. Gives up
    /// once the next completion falls after the job's timeout instant.
    ///
    /// Returns `Ok(false)` when no useful reservation exists. Walking every
    /// active job without success is fatal when no other reservation holds
    /// slots, because an admitted job always fits the empty cluster.
    pub fn try_reserve(&mut self, _t: f64, job: &mut Job) -> Result<bool, AllocationError> {
        if self.active_jobs.contains_key(&job.idx) || self.reserved_jobs.contains_key(&job.idx) {
            return Err(AllocationError::AlreadyPlaced(job.idx));
        }
        if self.active_jobs.is_empty() {
            return Ok(false);
        }

        let reservation = match self.find_reservation(job, job.timeout_at()) {
            Search::Found(r) => r,
            Search::PastCutoff => return Ok(false),
            Search::Exhausted if self.reserved_jobs.is_empty() => {
                return Err(AllocationError::UnplaceableReservation(job.idx));
            }
            Search::Exhausted => return Ok(false),
        };

        for p in &reservation.placements {
            self.nodes[p.node].reserve(&p.slots, job.idx, p.cpus)?;
        }

        job.start = Some(reservation.start);
        job.block_job_idx = Some(reservation.blocker);
        job.allocated_gpus = reservation
            .placements
            .iter()
            .map(|p| (p.node, p.slots.clone()))
            .collect();
        self.reserved_jobs.insert(job.idx, reservation);
        Ok(true)
    }

    /// Earliest instant `job` could start given what is running now
    ///
    /// `None` if it cannot start even after every active job completes.
    pub fn earliest_start(&self, t: f64, job: &Job) -> Option<f64> {
        if self.plan_fit(t, job).is_ok() {
            return Some(t);
        }
        match self.find_reservation(job, f64::INFINITY) {
            Search::Found(r) => Some(r.start),
            Search::PastCutoff | Search::Exhausted => None,
        }
    }

    fn find_reservation(&self, job: &Job, cutoff: f64) -> Search {
        let chunks = decompose(job.resources(), self.gpus_per_node);

        let mut free: Vec<Vec<usize>> = self.nodes.iter().map(Node::unreserved_idle_slots).collect();
        // Signed: reservations may already claim CPUs that are still busy
        let mut cpus: Vec<i64> = self
            .nodes
            .iter()
            .map(|n| i64::from(n.free_cpus()) - i64::from(n.reserved_cpus()))
            .collect();

        let mut order: Vec<(f64, JobId)> = self.active_jobs.iter().map(|(&id, e)| (e.end, id)).collect();
        order.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        for (end, blocker) in order {
            if end > cutoff {
                return Search::PastCutoff;
            }
            for p in &self.active_jobs[&blocker].placements {
                let reserved = self.nodes[p.node].reserved_gpus();
                free[p.node].extend(p.slots.iter().copied().filter(|&s| reserved[s].is_none()));
                cpus[p.node] += i64::from(p.cpus);
            }

            if let Some(nodes) = match_chunks(&chunks, &free, &cpus) {
                let placements = chunks
                    .iter()
                    .zip(nodes)
                    .map(|(chunk, n)| {
                        let list = &free[n];
                        Placement {
                            node: n,
                            slots: list[list.len() - chunk.gpus as usize..].to_vec(),
                            cpus: chunk.cpus,
                        }
                    })
                    .collect();
                return Search::Found(Reservation {
                    start: end,
                    end: end + job.remaining_runtime(),
                    blocker,
                    placements,
                });
            }
        }
        Search::Exhausted
    }

    // ========================================================================
    // Completion
    // ========================================================================

    /// Release every active job finished by `t`, then promote reservations
    /// whose blocking job was among them
    pub fn try_clear(&mut self, t: f64) -> Result<ClearOutcome, AllocationError> {
        let completed: Vec<JobId> = self
            .active_jobs
            .iter()
            .filter(|(_, e)| e.end <= t)
            .map(|(&id, _)| id)
            .collect();

        for &id in &completed {
            let entry = self
                .active_jobs
                .remove(&id)
                .ok_or(AllocationError::UnknownJob(id))?;
            for p in &entry.placements {
                self.nodes[p.node].release(&p.slots, id, p.cpus)?;
            }
        }

        let promoted: Vec<JobId> = self
            .reserved_jobs
            .iter()
            .filter(|(_, r)| completed.contains(&r.blocker))
            .map(|(&id, _)| id)
            .collect();

        for &id in &promoted {
            let reservation = self
                .reserved_jobs
                .remove(&id)
                .ok_or(AllocationError::UnknownJob(id))?;
            if t > reservation.start {
                return Err(AllocationError::LatePromotion {
                    job: id,
                    start: reservation.start,
                    now: t,
                });
            }
            for p in &reservation.placements {
                self.nodes[p.node].promote(&p.slots, id, p.cpus)?;
            }
            self.active_jobs.insert(
                id,
                ActiveEntry {
                    end: reservation.end,
                    placements: reservation.placements,
                },
            );
        }

        Ok(ClearOutcome { completed, promoted })
    }

    // ========================================================================
    // Consistency check
    // ========================================================================

    /// Cross-check node counters against the allocator's own records
    pub fn verify(&self) -> Result<(), AllocationError> {
        if let Some(&id) = self
            .active_jobs
            .keys()
            .find(|id| self.reserved_jobs.contains_key(id))
        {
            return Err(AllocationError::AlreadyPlaced(id));
        }

        let mut held_cpus = vec![0u32; self.nodes.len()];
        let mut held_gpus = vec![0usize; self.nodes.len()];
        for (&id, entry) in &self.active_jobs {
            for p in &entry.placements {
                for &slot in &p.slots {
                    let holder = self.nodes[p.node].gpu_dict().get(slot).copied().flatten();
                    if holder != Some(id) {
                        return Err(AllocationError::ForeignRelease {
                            node: p.node,
                            slot,
                            job: id,
                            holder,
                        });
                    }
                }
                held_gpus[p.node] += p.slots.len();
                held_cpus[p.node] += p.cpus;
            }
        }

        let mut reserved_cpus = vec![0u32; self.nodes.len()];
        for r in self.reserved_jobs.values() {
            for p in &r.placements {
                reserved_cpus[p.node] += p.cpus;
            }
        }

        for (n, node) in self.nodes.iter().enumerate() {
            let occupied = node.gpu_dict().iter().filter(|s| s.is_some()).count();
            let consistent = occupied == held_gpus[n]
                && node.free_gpus() as usize + occupied == node.num_gpus() as usize
                && node.free_cpus() + held_cpus[n] == node.num_cpus()
                && node.reserved_cpus() == reserved_cpus[n];
            if !consistent {
                return Err(AllocationError::CapacityMismatch { node: n });
            }
        }
        Ok(())
    }
}

/// Greedily bind chunks to distinct nodes in index order
fn match_chunks(chunks: &[Chunk], free: &[Vec<usize>], cpus: &[i64]) -> Option<Vec<usize>> {
    let mut taken = vec![false; free.len()];
    let mut nodes = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let n = (0..free.len())
            .find(|&n| !taken[n] && free[n].len() >= chunk.gpus as usize && cpus[n] >= i64::from(chunk.cpus))?;
        taken[n] = true;
        nodes.push(n);
    }
    Some(nodes)
}
