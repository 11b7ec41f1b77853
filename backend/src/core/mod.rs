//! Simulation clock

pub mod time;
