//! Domain models for the burst simulator

pub mod job;
pub mod node;

// Re-exports
pub use job::{Job, JobId, JobSpec, JobState, Resources, INFINITE_DEADLINE};
pub use node::Node;
