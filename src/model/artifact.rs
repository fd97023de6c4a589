//! A trained estimator bundled with the exact preprocessing it was fitted on.

use super::{FittedModel, ModelKind};
use crate::error::{Result, SentinelError};
use crate::features::{CategoricalEncoders, FeatureExtractor, FeatureMatrix, FeatureStats, StandardScaler, FEATURE_COUNT};
use crate::records::RequestRecord;
use chrono::{DateTime, Utc};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub trained_at: DateTime<Utc>,
    /// Stamped by the model store on save
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
    pub feature_names: Vec<String>,
    pub feature_stats: FeatureStats,
    pub samples_count: usize,
    pub features_count: usize,
    pub contamination: f64,
    /// Outcome of every kind in the training call that produced this artifact
    #[serde(default)]
    pub models_trained: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub model: FittedModel,
    pub scaler: StandardScaler,
    pub encoders: CategoricalEncoders,
    pub metadata: ArtifactMetadata,
}

/// Per-record output of [`ModelArtifact::score_records`]
#[derive(Debug, Clone)]
pub struct ScoredBatch {
    pub features: FeatureMatrix,
    pub scores: Array1<f64>,
    /// Model-intrinsic labels (`score > threshold`)
    pub labels: Vec<bool>,
}

impl ModelArtifact {
    pub fn kind(&self) -> ModelKind {
        self.model.kind()
    }

    pub fn threshold(&self) -> f64 {
        self.model.as_estimator().threshold()
    }

    /// Extract with the frozen encoders, scale with the fitted scaler, then
    /// score and label every record.
    pub fn score_records(&self, records: &[RequestRecord]) -> Result<ScoredBatch> {
        if self.scaler.n_features() != FEATURE_COUNT {
            return Err(SentinelError::Persistence(format!(
                "artifact '{}' expects {} features, extractor produces {}",
                self.kind(),
                self.scaler.n_features(),
                FEATURE_COUNT
            )));
        }
        let (features, _) = FeatureExtractor::extract(records, Some(self.encoders.clone()))?;
        let scaled = self.scaler.transform(&features.to_array());
        let estimator = self.model.as_estimator();
        let scores = estimator.score(&scaled);
        let threshold = estimator.threshold();
        let labels = scores.iter().map(|s| *s > threshold).collect();
        Ok(ScoredBatch {
            features,
            scores,
            labels,
        })
    }
}
