//! Human feedback on detected anomalies and the retraining it drives.

mod engine;

pub use engine::{FeedbackLoop, RetrainResult};

use crate::error::SentinelError;
use crate::features::FeatureRow;
use crate::records::RequestRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    FalsePositive,
    TruePositive,
}

impl FeedbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackKind::FalsePositive => "false_positive",
            FeedbackKind::TruePositive => "true_positive",
        }
    }
}

impl FromStr for FeedbackKind {
    type Err = SentinelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "false_positive" | "fp" => Ok(FeedbackKind::FalsePositive),
            "true_positive" | "tp" => Ok(FeedbackKind::TruePositive),
            other => Err(SentinelError::InvalidArgument(format!("unknown feedback kind '{}'", other))),
        }
    }
}

/// A human judgment on one log. `processed` flips to true only for false
/// positives, and only when a retrain consumed them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub id: String,
    pub log_id: String,
    pub api_id: String,
    pub kind: FeedbackKind,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub features: Option<FeatureRow>,
    /// Snapshot of the judged log at feedback time
    pub original_log: RequestRecord,
    pub timestamp: DateTime<Utc>,
    pub processed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackStats {
    pub false_positives: usize,
    pub true_positives: usize,
    pub unprocessed: usize,
    pub total: usize,
}

impl FeedbackStats {
    pub fn from_records(records: &[FeedbackRecord]) -> Self {
        let false_positives = records.iter().filter(|f| f.kind == FeedbackKind::FalsePositive).count();
        let true_positives = records.len() - false_positives;
        Self {
            false_positives,
            true_positives,
            unprocessed: records.iter().filter(|f| !f.processed).count(),
            total: records.len(),
        }
    }
}
