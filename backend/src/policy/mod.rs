//! Scheduling Policy Module
//!
//! Two independent policy families steer the engine:
//!
//! 1. **Queue policies** (`queue`): total order of the waiting queue,
//!    re-applied every tick before the placement pass.
//! 2. **Waiting policies** (`waiting`): how long a job may sit in the queue
//!    before it is shunted to the cloud, evaluated once at admission.
//!
//! Both are parsed from their names once, when the configuration is
//! resolved. Unknown names are rejected there, never mid-run.
//!
//! # Example
//!
//! ```rust
//! use burst_simulator_core_rs::policy::{Deadline, QueuePolicy, WaitingPolicy};
//! use burst_simulator_core_rs::{Job, Resources};
//!
//! let queue: QueuePolicy = "sjf".parse().unwrap();
//! let waiting = WaitingPolicy::parse("constant-2", 1.0, 1e9).unwrap();
//!
//! let job = Job::new(0, 10.0, 3.0, Resources::gpus(1));
//! assert_eq!(queue.sort_key(&job), 3.0);
//! assert_eq!(waiting.deadline(&job, job.runtime()), Deadline::At(15.0));
//! ```

pub mod queue;
pub mod waiting;

pub use queue::{Direction, QueuePolicy, SortKey};
pub use waiting::{Deadline, RuntimeEstimator, WaitingKind, WaitingPolicy};
