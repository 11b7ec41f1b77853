//! Deterministic random number generation
//!
//! Seeded xorshift64* stream shared by everything stochastic in a run
//! (currently the runtime estimator behind the waiting policies).
//! Nothing else in the engine may draw randomness.

mod xorshift;

pub use xorshift::RngManager;
