//! Burst Simulator CLI
//!
//! Replays a job trace against one or more simulator configurations and
//! prints a summary table.

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use burst_simulator_core_rs::{run_sweep, Job, JobSpec, SimulationResult, SimulatorConfig};

#[derive(Parser, Debug)]
#[command(name = "burst-sim")]
#[command(about = "Simulate hybrid on-prem/cloud job scheduling policies", long_about = None)]
struct Args {
    /// Job trace: JSON array of {idx, arrival, runtime, gpus, cpus, nodes, cost}
    #[arg(short, long)]
    jobs: PathBuf,

    /// Config files (JSON object or array of objects); defaults apply when omitted
    #[arg(short, long = "config")]
    configs: Vec<PathBuf>,

    /// Write all results as a JSON array to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Worker threads for the sweep (default: one per core)
    #[arg(long)]
    threads: Option<usize>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ConfigFile {
    Many(Vec<SimulatorConfig>),
    One(SimulatorConfig),
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

fn load_jobs(path: &Path) -> Result<Vec<Job>> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading job trace {}", path.display()))?;
    let specs: Vec<JobSpec> =
        serde_json::from_str(&raw).with_context(|| format!("parsing job trace {}", path.display()))?;
    Ok(specs.into_iter().map(Job::from).collect())
}

fn load_configs(paths: &[PathBuf]) -> Result<Vec<SimulatorConfig>> {
    if paths.is_empty() {
        return Ok(vec![SimulatorConfig::default()]);
    }
    let mut configs = Vec::new();
    for path in paths {
        let raw = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        let parsed: ConfigFile =
            serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
        match parsed {
            ConfigFile::Many(many) => configs.extend(many),
            ConfigFile::One(one) => configs.push(one),
        }
    }
    Ok(configs)
}

fn print_summary(results: &[(usize, &SimulationResult)]) {
    println!(
        "{:>4}  {:<10} {:<22} {:>6} {:>14} {:>12} {:>10} {:>10} {:>8} {:>8}",
        "run", "sched", "waiting", "nodes", "total cost", "avg cost", "avg wait", "avg jct", "clus %", "sys %"
    );
    for (run, result) in results {
        let spec = &result.simulator_spec;
        let stats = &result.stats;
        println!(
            "{:>4}  {:<10} {:<22} {:>6} {:>14.2} {:>12.4} {:>10.4} {:>10.4} {:>8.2} {:>8.2}",
            run,
            spec.sched_alg,
            spec.waiting_policy,
            spec.cluster_size,
            stats.total_cloud_cost,
            stats.avg_cloud_cost,
            stats.avg_waiting,
            stats.avg_jct,
            stats.cluster_utilization * 100.0,
            stats.system_utilization * 100.0,
        );
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("configuring sweep thread pool")?;
    }

    let jobs = load_jobs(&args.jobs)?;
    let configs = load_configs(&args.configs)?;
    info!(jobs = jobs.len(), runs = configs.len(), "inputs loaded");

    let outcomes = run_sweep(&jobs, &configs);

    let mut succeeded = Vec::new();
    let mut failures = 0;
    for (run, outcome) in outcomes.iter().enumerate() {
        match outcome {
            Ok(result) => succeeded.push((run, result)),
            Err(e) => {
                eprintln!("run {run} failed: {e}");
                failures += 1;
            }
        }
    }
    print_summary(&succeeded);

    if let Some(path) = &args.output {
        let results: Vec<&SimulationResult> = succeeded.iter().map(|(_, r)| *r).collect();
        let json = serde_json::to_string_pretty(&results).context("serializing results")?;
        fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), runs = results.len(), "results written");
    }

    if failures > 0 {
        bail!("{failures} of {} runs failed", outcomes.len());
    }
    Ok(())
}
