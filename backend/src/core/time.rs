//! Time management for the simulation
//!
//! Simulation time is continuous (hours, as produced by the workload
//! generator). The engine does not step at a fixed rate: it jumps straight
//! to the next instant where something can change. This module owns that
//! clock and enforces that it never runs backward.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the simulation clock
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TimeError {
    #[error("Simulator cannot go back in time: {from} -> {to}")]
    Reversal { from: f64, to: f64 },

    #[error("Simulation time must be finite, got {0}")]
    NonFinite(f64),
}

/// Monotonic event-driven clock
///
/// # Example
/// ```
/// use burst_simulator_core_rs::SimClock;
///
/// let mut clock = SimClock::new();
/// assert_eq!(clock.now(), 0.0);
///
/// clock.advance_to(2.5).unwrap();
/// assert_eq!(clock.now(), 2.5);
/// assert_eq!(clock.ticks(), 1);
///
/// // Standing still is allowed, going back is not
/// clock.advance_to(2.5).unwrap();
/// assert!(clock.advance_to(1.0).is_err());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimClock {
    /// Current simulation time
    now: f64,
    /// Number of times the clock has been advanced
    ticks: usize,
}

impl SimClock {
    /// Create a clock at t = 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Jump to `next`
    ///
    /// `next == now` is legal (several events may share an instant);
    /// anything earlier is a planning bug upstream.
    pub fn advance_to(&mut self, next: f64) -> Result<(), TimeError> {
        if !next.is_finite() {
            return Err(TimeError::NonFinite(next));
        }
        if next < self.now {
            return Err(TimeError::Reversal {
                from: self.now,
                to: next,
            });
        }
        self.now = next;
        self.ticks += 1;
        Ok(())
    }

    /// Current simulation time
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Number of advances performed so far
    pub fn ticks(&self) -> usize {
        self.ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reversal_is_rejected_and_time_unchanged() {
        let mut clock = SimClock::new();
        clock.advance_to(4.0).unwrap();

        let err = clock.advance_to(3.0).unwrap_err();
        assert_eq!(err, TimeError::Reversal { from: 4.0, to: 3.0 });
        assert_eq!(clock.now(), 4.0);
        assert_eq!(clock.ticks(), 1);
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut clock = SimClock::new();
        assert!(matches!(
            clock.advance_to(f64::NAN),
            Err(TimeError::NonFinite(_))
        ));
        assert!(clock.advance_to(f64::INFINITY).is_err());
    }
}
