//! Python bindings
//!
//! Jobs and configuration cross the boundary as JSON strings, results come
//! back as JSON, so the Python side needs nothing beyond `json`.

pub mod simulator;
