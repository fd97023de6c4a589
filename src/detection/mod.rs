//! Detection: score records with a saved model, apply the two-stage
//! threshold, and summarize the outcome.

mod engine;
mod stats;
pub mod timeline;

pub use engine::{ComparisonEntry, DetectionEngine, ModelComparison};
pub use stats::ScoreStatistics;
pub use timeline::{AnomalyBrief, Timeline, TimelineBucket, TimelineSummary};

use crate::features::FeatureRow;
use crate::model::ModelKind;
use crate::network::NetworkFinding;
use crate::records::RequestRecord;
use serde::{Deserialize, Serialize};

/// One scored record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredLog {
    /// Position in the analyzed batch
    pub index: usize,
    #[serde(flatten)]
    pub record: RequestRecord,
    pub anomaly_score: f64,
    pub is_anomaly: bool,
    pub features: FeatureRow,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomaly_description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub network_findings: Vec<NetworkFinding>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub model_used: ModelKind,
    pub logs_analyzed: usize,
    pub anomalies_detected: usize,
    /// Percent, rounded to two decimals
    pub anomaly_rate: f64,
    pub score_statistics: ScoreStatistics,
    pub anomalies: Vec<ScoredLog>,
    /// Every record not reported as an anomaly
    pub normal_logs: Vec<ScoredLog>,
    pub threshold_used: f64,
    /// Model-intrinsic boundary applied before `threshold_used`
    pub model_threshold: f64,
}

/// Detection over a stored window, after dropping processed false positives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiDetection {
    #[serde(flatten)]
    pub result: DetectionResult,
    pub total_logs: usize,
    pub processed_false_positives: usize,
    pub logs_available: usize,
}
