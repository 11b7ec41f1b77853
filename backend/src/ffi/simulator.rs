//! PyO3 wrapper for the simulator

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::models::job::{Job, JobSpec};
use crate::orchestrator::{SimulationResult, Simulator as RustSimulator, SimulatorConfig};

fn parse_jobs(jobs_json: &str) -> PyResult<Vec<Job>> {
    let specs: Vec<JobSpec> = serde_json::from_str(jobs_json)
        .map_err(|e| PyValueError::new_err(format!("Invalid jobs JSON: {}", e)))?;
    Ok(specs.into_iter().map(Job::from).collect())
}

fn parse_config(config_json: &str) -> PyResult<SimulatorConfig> {
    serde_json::from_str(config_json).map_err(|e| PyValueError::new_err(format!("Invalid config JSON: {}", e)))
}

fn result_to_json(result: &SimulationResult) -> PyResult<String> {
    serde_json::to_string(result).map_err(|e| PyRuntimeError::new_err(format!("Result serialization failed: {}", e)))
}

/// Run one simulation and return its report as JSON
///
/// # Example (from Python)
///
/// ```python
/// import json
/// from burst_simulator_core_rs import run_simulation
///
/// jobs = [{"idx": 0, "arrival": 0.0, "runtime": 1.0, "gpus": 4}]
/// report = json.loads(run_simulation(json.dumps(jobs), json.dumps({"cluster_size": 1})))
/// print(report["stats"]["avg_jct"])
/// ```
#[pyfunction]
pub fn run_simulation(jobs_json: &str, config_json: &str) -> PyResult<String> {
    let jobs = parse_jobs(jobs_json)?;
    let config = parse_config(config_json)?;
    let result = crate::orchestrator::run_simulation(jobs, config)
        .map_err(|e| PyRuntimeError::new_err(format!("Simulation failed: {}", e)))?;
    result_to_json(&result)
}

/// Step-by-step simulator handle for Python
#[pyclass(name = "Simulator")]
pub struct PySimulator {
    inner: Option<RustSimulator>,
}

impl PySimulator {
    fn inner_mut(&mut self) -> PyResult<&mut RustSimulator> {
        self.inner
            .as_mut()
            .ok_or_else(|| PyRuntimeError::new_err("Simulator already consumed by run()"))
    }
}

#[pymethods]
impl PySimulator {
    /// Create a simulator from a JSON job list and a JSON config object
    ///
    /// # Errors
    ///
    /// Raises ValueError if either JSON document is malformed, the config
    /// names an unknown policy, or the trace is not sorted by arrival.
    #[new]
    fn new(jobs_json: &str, config_json: &str) -> PyResult<Self> {
        let jobs = parse_jobs(jobs_json)?;
        let config = parse_config(config_json)?;
        let inner = RustSimulator::new(jobs, config)
            .map_err(|e| PyValueError::new_err(format!("Failed to create simulator: {}", e)))?;
        Ok(Self { inner: Some(inner) })
    }

    /// Execute one tick
    ///
    /// # Returns
    ///
    /// Dictionary with `time`, `completed`, `placed`, `sent_to_cloud`,
    /// `queue_len` and `next_time` (None once the run is over).
    fn tick(&mut self, py: Python<'_>) -> PyResult<Py<PyDict>> {
        let result = self
            .inner_mut()?
            .tick()
            .map_err(|e| PyRuntimeError::new_err(format!("Tick execution failed: {}", e)))?;

        let dict = PyDict::new(py);
        dict.set_item("time", result.time)?;
        dict.set_item("completed", result.completed)?;
        dict.set_item("placed", result.placed)?;
        dict.set_item("sent_to_cloud", result.sent_to_cloud)?;
        dict.set_item("queue_len", result.queue_len)?;
        dict.set_item("next_time", result.next_time)?;
        Ok(dict.unbind())
    }

    /// Current simulation time
    fn now(&self) -> PyResult<f64> {
        self.inner
            .as_ref()
            .map(RustSimulator::now)
            .ok_or_else(|| PyRuntimeError::new_err("Simulator already consumed by run()"))
    }

    /// Run the remaining ticks and return the report as JSON
    fn run(&mut self) -> PyResult<String> {
        let inner = self
            .inner
            .take()
            .ok_or_else(|| PyRuntimeError::new_err("Simulator already consumed by run()"))?;
        let result = inner
            .run()
            .map_err(|e| PyRuntimeError::new_err(format!("Simulation failed: {}", e)))?;
        result_to_json(&result)
    }
}
