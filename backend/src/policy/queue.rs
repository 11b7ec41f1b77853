//! Queue ordering policies
//!
//! A queue policy maps each job to a scalar key; the engine sorts the
//! waiting queue by `(key, idx)` every tick.
//!
//! | name   | key                     |
//! |--------|-------------------------|
//! | `fifo` / `lifo` | arrival asc / desc |
//! | `edf` / `ldf`   | deadline asc / desc |
//! | `sjf` / `ljf`   | runtime asc / desc |
//! | `svjf` / `lvjf` | cost asc / desc |
//! | `swf` / `lwf`   | slack (deadline − runtime) asc / desc |
//!
//! Any name takes a `_gpu` suffix, multiplying the key by the job's GPU
//! count. `evdf` and `svwf` are kept as aliases of `edf_gpu` and `swf_gpu`.

use crate::models::job::Job;
use crate::orchestrator::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Job attribute a queue policy sorts on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortKey {
    Arrival,
    Deadline,
    Runtime,
    Cost,
    Slack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueuePolicy {
    pub key: SortKey,
    pub direction: Direction,
    pub gpu_weighted: bool,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            key: SortKey::Arrival,
            direction: Direction::Ascending,
            gpu_weighted: false,
        }
    }
}

impl QueuePolicy {
    /// Scalar the queue is sorted by (smaller runs first)
    pub fn sort_key(&self, job: &Job) -> f64 {
        let base = match self.key {
            SortKey::Arrival => job.arrival(),
            SortKey::Deadline => job.deadline(),
            SortKey::Runtime => job.runtime(),
            SortKey::Cost => job.cost(),
            SortKey::Slack => job.slack(),
        };
        let weighted = if self.gpu_weighted {
            base * job.num_gpus() as f64
        } else {
            base
        };
        match self.direction {
            Direction::Ascending => weighted,
            Direction::Descending => -weighted,
        }
    }

    /// Total order on jobs: key first, then `idx`
    pub fn compare(&self, a: &Job, b: &Job) -> Ordering {
        self.sort_key(a)
            .total_cmp(&self.sort_key(b))
            .then(a.idx().cmp(&b.idx()))
    }

    pub fn name(&self) -> String {
        let base = match (self.key, self.direction) {
            (SortKey::Arrival, Direction::Ascending) => "fifo",
            (SortKey::Arrival, Direction::Descending) => "lifo",
            (SortKey::Deadline, Direction::Ascending) => "edf",
            (SortKey::Deadline, Direction::Descending) => "ldf",
            (SortKey::Runtime, Direction::Ascending) => "sjf",
            (SortKey::Runtime, Direction::Descending) => "ljf",
            (SortKey::Cost, Direction::Ascending) => "svjf",
            (SortKey::Cost, Direction::Descending) => "lvjf",
            (SortKey::Slack, Direction::Ascending) => "swf",
            (SortKey::Slack, Direction::Descending) => "lwf",
        };
        if self.gpu_weighted {
            format!("{base}_gpu")
        } else {
            base.to_string()
        }
    }
}

impl FromStr for QueuePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, gpu_weighted) = match s {
            "evdf" => ("edf", true),
            "svwf" => ("swf", true),
            other => match other.strip_suffix("_gpu") {
                Some(base) => (base, true),
                None => (other, false),
            },
        };

        use Direction::*;
        let (key, direction) = match base {
            "fifo" => (SortKey::Arrival, Ascending),
            "lifo" => (SortKey::Arrival, Descending),
            "edf" => (SortKey::Deadline, Ascending),
            "ldf" => (SortKey::Deadline, Descending),
            "sjf" => (SortKey::Runtime, Ascending),
            "ljf" => (SortKey::Runtime, Descending),
            "svjf" => (SortKey::Cost, Ascending),
            "lvjf" => (SortKey::Cost, Descending),
            "swf" => (SortKey::Slack, Ascending),
            "lwf" => (SortKey::Slack, Descending),
            _ => return Err(ConfigError::UnknownQueuePolicy(s.to_string())),
        };

        Ok(Self {
            key,
            direction,
            gpu_weighted,
        })
    }
}

impl fmt::Display for QueuePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
