//! Sentinel configuration. Loaded from JSON when present; defaults otherwise.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Threshold used when neither the caller nor the config store supplies one.
pub const DEFAULT_THRESHOLD: f64 = 0.12;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    /// Data directory (encrypted store)
    pub data_dir: PathBuf,
    /// Environment variable holding the store secret
    pub store_secret_env: String,
    /// Detection thresholds and model choice
    pub ml_detection: MlDetectionConfig,
    pub training: TrainingConfig,
    pub feedback: FeedbackConfig,
    /// Network identity heuristics
    pub network: NetworkConfig,
    pub timeline: TimelineConfig,
    /// Logging
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlDetectionConfig {
    /// External score cutoff applied after the model's own labeling
    pub threshold: f64,
    /// Expected anomaly share assumed at training time
    pub contamination: f64,
    pub model_preference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Training refuses smaller batches
    pub min_samples: usize,
    /// Window of logs used by `train_api`
    pub hours_back: i64,
    /// Cap on stored reference points for neighbor and kernel estimators
    pub max_reference_samples: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Extra copies of a false positive added to the retraining corpus
    pub replication_factor: usize,
    /// Window used when a retrain falls back to the live log store
    pub retrain_hours_back: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub lookback_hours: i64,
    pub recent_window_hours: i64,
    /// Client IPs needed inside a private block before it counts as known
    pub private_range_min_ips: usize,
    /// Public IPs sharing a first octet before a /8 pseudo-range is inferred
    pub public_octet_min_ips: usize,
    pub max_known_ranges: usize,
    pub max_recent_ranges: usize,
    pub max_provider_buckets: usize,
    pub rotation_threshold: f64,
    pub suspicious_ranges: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    pub interval_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .map(|d| d.join("api-sentinel"))
            .unwrap_or_else(|| PathBuf::from(".api-sentinel"));
        Self {
            data_dir,
            store_secret_env: "SENTINEL_STORE_SECRET".to_string(),
            ml_detection: MlDetectionConfig::default(),
            training: TrainingConfig::default(),
            feedback: FeedbackConfig::default(),
            network: NetworkConfig::default(),
            timeline: TimelineConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for MlDetectionConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            contamination: 0.1,
            model_preference: "iforest".to_string(),
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            min_samples: 10,
            hours_back: 24,
            max_reference_samples: 2048,
            seed: 42,
        }
    }
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            replication_factor: 5,
            retrain_hours_back: 168,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            lookback_hours: 24,
            recent_window_hours: 2,
            private_range_min_ips: 2,
            public_octet_min_ips: 2,
            max_known_ranges: 3,
            max_recent_ranges: 2,
            max_provider_buckets: 2,
            rotation_threshold: 0.5,
            // Public DNS resolvers
            suspicious_ranges: vec![
                "1.1.1.0/24".to_string(),
                "8.8.8.0/24".to_string(),
                "208.67.222.0/24".to_string(),
                "185.228.168.0/24".to_string(),
                "176.103.130.0/24".to_string(),
            ],
        }
    }
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self { interval_minutes: 30 }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

impl SentinelConfig {
    /// Load from JSON file if present; otherwise return default
    pub fn load(path: &std::path::Path) -> Self {
        if path.exists() {
            if let Ok(data) = std::fs::read_to_string(path) {
                if let Ok(c) = serde_json::from_str::<SentinelConfig>(&data) {
                    return c;
                }
            }
        }
        Self::default()
    }
}

/// Source of the `ml_detection` section. Detection only consults it when the
/// caller passes no explicit threshold.
pub trait ConfigStore: Send + Sync {
    fn ml_detection(&self) -> crate::Result<MlDetectionConfig>;
}

impl ConfigStore for SentinelConfig {
    fn ml_detection(&self) -> crate::Result<MlDetectionConfig> {
        Ok(self.ml_detection.clone())
    }
}
