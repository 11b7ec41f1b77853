//! xorshift64* random number generator
//!
//! Fast, deterministic PRNG used for every stochastic decision in a run.
//! Today that is only the runtime estimator, which perturbs the runtime a
//! waiting policy sees when it computes a job's deadline.
//!
//! # Determinism
//!
//! Same seed → same sequence of random numbers. A sweep that re-runs a
//! configuration must reproduce its deadlines bit for bit.

use serde::{Deserialize, Serialize};

/// Deterministic random number generator using xorshift64*
///
/// # Example
/// ```
/// use burst_simulator_core_rs::RngManager;
///
/// let mut rng = RngManager::new(12345);
/// let value = rng.next();
/// let noise = rng.next_gaussian();
/// assert!(noise.is_finite());
/// # let _ = value;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RngManager {
    /// Internal state (64-bit)
    state: u64,
}

impl RngManager {
    /// Create a new RNG with given seed
    ///
    /// A zero seed is remapped to 1 (xorshift cannot leave the all-zero state).
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 { 1 } else { seed };
        Self { state }
    }

    /// Generate next random u64 value
    pub fn next(&mut self) -> u64 {
        // xorshift64* algorithm
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Get current RNG state (for replaying a run from the same point)
    pub fn get_state(&self) -> u64 {
        self.state
    }

    /// Generate random f64 in range [0.0, 1.0)
    pub fn next_f64(&mut self) -> f64 {
        let value = self.next();
        // Top 53 bits → [0.0, 1.0)
        (value >> 11) as f64 * (1.0 / ((1u64 << 53) as f64))
    }

    /// Sample from the standard normal distribution N(0, 1)
    ///
    /// Box–Muller transform over two uniform draws. Consumes exactly two
    /// values from the stream so callers can reason about how far a run
    /// advanced the generator.
    ///
    /// # Example
    /// ```
    /// use burst_simulator_core_rs::RngManager;
    ///
    /// let mut a = RngManager::new(7);
    /// let mut b = RngManager::new(7);
    /// assert_eq!(a.next_gaussian(), b.next_gaussian());
    /// ```
    pub fn next_gaussian(&mut self) -> f64 {
        // u1 in (0, 1] so ln(u1) is finite
        let u1 = 1.0 - self.next_f64();
        let u2 = self.next_f64();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }
}
