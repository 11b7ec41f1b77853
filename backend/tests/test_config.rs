//! Configuration Tests
//!
//! JSON decoding with defaults, validation errors, and the config hash
//! carried in every report.

use burst_simulator_core_rs::orchestrator::{compute_config_hash, PredictMode};
use burst_simulator_core_rs::{BinpackStrategy, ConfigError, SimulatorConfig};

fn resolve_err(config: SimulatorConfig) -> ConfigError {
    config.resolve().unwrap_err()
}

#[test]
fn test_partial_json_takes_defaults() {
    let config: SimulatorConfig = serde_json::from_str(r#"{"cluster_size": 2, "sched_alg": "edf"}"#).unwrap();
    assert_eq!(config.cluster_size, 2);
    assert_eq!(config.sched_alg, "edf");
    assert_eq!(config.gpus_per_node, 8);
    assert_eq!(config.waiting_policy, "linear_runtime");
    assert_eq!(config.warmup_jobs, 5000);
}

#[test]
fn test_loop_key_maps_to_loop_mode() {
    let config: SimulatorConfig = serde_json::from_str(r#"{"loop": true}"#).unwrap();
    assert!(config.loop_mode);

    let json = serde_json::to_value(&config).unwrap();
    assert_eq!(json["loop"], true);
    assert!(json.get("loop_mode").is_none());
}

#[test]
fn test_resolve_parses_every_name() {
    let config = SimulatorConfig {
        sched_alg: "lwf_gpu".to_string(),
        binpack_alg: "worst-fit".to_string(),
        waiting_policy: "linear_capacity-0.5".to_string(),
        predict_wait: 1,
        long_job_thres: Some(10.0),
        preempt_cloud_ratio: Some(0.25),
        max_queue_length: Some(100),
        ..Default::default()
    };
    let resolved = config.resolve().unwrap();

    assert_eq!(resolved.queue_policy.name(), "lwf_gpu");
    assert_eq!(resolved.binpack, BinpackStrategy::WorstFit);
    assert_eq!(resolved.waiting_policy.factor, 0.5);
    assert_eq!(resolved.predict, PredictMode::Oracle);
    assert_eq!(resolved.max_queue_length, Some(100));
    let preempt = resolved.preempt_back.unwrap();
    assert_eq!(preempt.long_job_thres, 10.0);
    assert_eq!(preempt.cloud_ratio, 0.25);
}

#[test]
fn test_zero_ratio_disables_preempt_back() {
    let config = SimulatorConfig {
        preempt_cloud_ratio: Some(0.0),
        ..Default::default()
    };
    assert!(config.resolve().unwrap().preempt_back.is_none());
}

#[test]
fn test_validation_errors() {
    assert_eq!(
        resolve_err(SimulatorConfig {
            backfill: true,
            loop_mode: true,
            ..Default::default()
        }),
        ConfigError::BackfillAndLoop
    );
    assert_eq!(
        resolve_err(SimulatorConfig {
            cluster_size: 0,
            ..Default::default()
        }),
        ConfigError::EmptyCluster
    );
    assert_eq!(
        resolve_err(SimulatorConfig {
            predict_wait: 3,
            ..Default::default()
        }),
        ConfigError::InvalidPredictMode(3)
    );
    assert_eq!(
        resolve_err(SimulatorConfig {
            preempt_cloud_ratio: Some(0.5),
            ..Default::default()
        }),
        ConfigError::PreemptWithoutThreshold(0.5)
    );
    assert_eq!(
        resolve_err(SimulatorConfig {
            sched_alg: "random".to_string(),
            ..Default::default()
        }),
        ConfigError::UnknownQueuePolicy("random".to_string())
    );
    assert_eq!(
        resolve_err(SimulatorConfig {
            binpack_alg: "tetris".to_string(),
            ..Default::default()
        }),
        ConfigError::UnknownBinpack("tetris".to_string())
    );
    assert_eq!(
        resolve_err(SimulatorConfig {
            time_estimator_error_pct: -5.0,
            ..Default::default()
        }),
        ConfigError::InvalidEstimatorError(-5.0)
    );
    assert_eq!(
        resolve_err(SimulatorConfig {
            data_gravity_delay: f64::INFINITY,
            ..Default::default()
        }),
        ConfigError::InvalidDataGravityDelay(f64::INFINITY)
    );
}

#[test]
fn test_config_hash_is_stable_and_sensitive() {
    let a = SimulatorConfig::default();
    let b = SimulatorConfig::default();
    let c = SimulatorConfig {
        backfill: true,
        ..Default::default()
    };

    let hash_a = compute_config_hash(&a).unwrap();
    assert_eq!(hash_a, compute_config_hash(&b).unwrap());
    assert_ne!(hash_a, compute_config_hash(&c).unwrap());
    assert_eq!(hash_a.len(), 64);
}
