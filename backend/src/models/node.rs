//! Node model
//!
//! One homogeneous machine of the on-prem cluster. A node tracks, per GPU
//! slot, which job currently holds it (`gpu_dict`) and which job has a
//! future claim on it through a backfill reservation (`reserved_gpus`).
//! CPUs are fungible and tracked as counters only.
//!
//! # Critical Invariants
//!
//! 1. `free_gpus == number of empty gpu_dict slots`
//! 2. `free_cpus + Σ(cpus held by jobs on this node) == num_cpus`
//! 3. Counters never underflow: every mutation checks before it writes

use crate::cluster::AllocationError;
use crate::models::job::JobId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    index: usize,
    num_gpus: u32,
    num_cpus: u32,
    /// GPU slot → job currently running on it
    gpu_dict: Vec<Option<JobId>>,
    /// GPU slot → job holding a future reservation on it
    reserved_gpus: Vec<Option<JobId>>,
    free_gpus: u32,
    free_cpus: u32,
    /// CPUs promised to reservations that have not started yet
    reserved_cpus: u32,
}

impl Node {
    pub fn new(index: usize, num_gpus: u32, num_cpus: u32) -> Self {
        Self {
            index,
            num_gpus,
            num_cpus,
            gpu_dict: vec![None; num_gpus as usize],
            reserved_gpus: vec![None; num_gpus as usize],
            free_gpus: num_gpus,
            free_cpus: num_cpus,
            reserved_cpus: 0,
        }
    }

    pub fn num_gpus(&self) -> u32 {
        self.num_gpus
    }

    pub fn num_cpus(&self) -> u32 {
        self.num_cpus
    }

    pub fn free_gpus(&self) -> u32 {
        self.free_gpus
    }

    pub fn free_cpus(&self) -> u32 {
        self.free_cpus
    }

    pub fn reserved_cpus(&self) -> u32 {
        self.reserved_cpus
    }

    pub fn gpu_dict(&self) -> &[Option<JobId>] {
        &self.gpu_dict
    }

    pub fn reserved_gpus(&self) -> &[Option<JobId>] {
        &self.reserved_gpus
    }

    /// CPUs a new placement may take without eating into reservations
    pub fn cpu_slack(&self) -> u32 {
        self.free_cpus.saturating_sub(self.reserved_cpus)
    }

    /// Slots a new job may occupy right now
    ///
    /// Reserved-but-idle slots come first, and only when `window_ok` says
    /// the job finishes before that reservation starts; plain idle slots
    /// follow.
    pub fn usable_slots(&self, window_ok: impl Fn(JobId) -> bool) -> Vec<usize> {
        let mut reserved = Vec::new();
        let mut unreserved = Vec::new();
        for (slot, holder) in self.gpu_dict.iter().enumerate() {
            if holder.is_some() {
                continue;
            }
            match self.reserved_gpus[slot] {
                Some(owner) if window_ok(owner) => reserved.push(slot),
                Some(_) => {}
                None => unreserved.push(slot),
            }
        }
        reserved.extend(unreserved);
        reserved
    }

    /// Idle slots with no reservation on them
    pub fn unreserved_idle_slots(&self) -> Vec<usize> {
        (0..self.gpu_dict.len())
            .filter(|&slot| self.gpu_dict[slot].is_none() && self.reserved_gpus[slot].is_none())
            .collect()
    }

    // ========================================================================
    // Mutations (all-or-nothing: validate first, then write)
    // ========================================================================

    /// Hand `slots` and `cpus` to `job`
    pub fn assign(&mut self, slots: &[usize], job: JobId, cpus: u32) -> Result<(), AllocationError> {
        for &slot in slots {
            if let Some(holder) = self.slot(&self.gpu_dict, slot)? {
                return Err(AllocationError::DoubleAssignment {
                    node: self.index,
                    slot,
                    holder,
                    claimant: job,
                });
            }
        }
        let free_gpus = self
            .free_gpus
            .checked_sub(slots.len() as u32)
            .ok_or(AllocationError::CapacityUnderflow {
                node: self.index,
                resource: "gpus",
            })?;
        let free_cpus = self
            .free_cpus
            .checked_sub(cpus)
            .ok_or(AllocationError::CapacityUnderflow {
                node: self.index,
                resource: "cpus",
            })?;

        for &slot in slots {
            self.gpu_dict[slot] = Some(job);
        }
        self.free_gpus = free_gpus;
        self.free_cpus = free_cpus;
        Ok(())
    }

    /// Give back what `job` held
    pub fn release(&mut self, slots: &[usize], job: JobId, cpus: u32) -> Result<(), AllocationError> {
        for &slot in slots {
            let holder = self.slot(&self.gpu_dict, slot)?;
            if holder != Some(job) {
                return Err(AllocationError::ForeignRelease {
                    node: self.index,
                    slot,
                    job,
                    holder,
                });
            }
        }
        let free_gpus = self.free_gpus + slots.len() as u32;
        let free_cpus = self.free_cpus + cpus;
        if free_gpus > self.num_gpus || free_cpus > self.num_cpus {
            return Err(AllocationError::CapacityMismatch { node: self.index });
        }

        for &slot in slots {
            self.gpu_dict[slot] = None;
        }
        self.free_gpus = free_gpus;
        self.free_cpus = free_cpus;
        Ok(())
    }

    /// Record a future claim of `job` on `slots`
    pub fn reserve(&mut self, slots: &[usize], job: JobId, cpus: u32) -> Result<(), AllocationError> {
        for &slot in slots {
            if let Some(holder) = self.slot(&self.reserved_gpus, slot)? {
                return Err(AllocationError::DoubleReservation {
                    node: self.index,
                    slot,
                    holder,
                    claimant: job,
                });
            }
        }
        for &slot in slots {
            self.reserved_gpus[slot] = Some(job);
        }
        self.reserved_cpus += cpus;
        Ok(())
    }

    /// Turn the reservation of `job` on `slots` into a real allocation
    pub fn promote(&mut self, slots: &[usize], job: JobId, cpus: u32) -> Result<(), AllocationError> {
        for &slot in slots {
            let owner = self.slot(&self.reserved_gpus, slot)?;
            if owner != Some(job) {
                return Err(AllocationError::ForeignRelease {
                    node: self.index,
                    slot,
                    job,
                    holder: owner,
                });
            }
        }
        let reserved_cpus = self
            .reserved_cpus
            .checked_sub(cpus)
            .ok_or(AllocationError::CapacityUnderflow {
                node: self.index,
                resource: "reserved cpus",
            })?;

        self.assign(slots, job, cpus)?;
        for &slot in slots {
            self.reserved_gpus[slot] = None;
        }
        self.reserved_cpus = reserved_cpus;
        Ok(())
    }

    fn slot(&self, table: &[Option<JobId>], slot: usize) -> Result<Option<JobId>, AllocationError> {
        table
            .get(slot)
            .copied()
            .ok_or(AllocationError::NoSuchSlot {
                node: self.index,
                slot,
            })
    }
}
