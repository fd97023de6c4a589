//! Fits every supported kind on one shared, standardized feature matrix.

use super::{ArtifactMetadata, FitParams, FittedModel, ModelArtifact, ModelKind};
use crate::config::TrainingConfig;
use crate::error::{Result, SentinelError};
use crate::features::{FeatureExtractor, StandardScaler, FEATURE_NAMES};
use crate::records::RequestRecord;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Result of fitting a single kind
#[derive(Debug, Clone)]
pub enum KindOutcome {
    Trained(Box<ModelArtifact>),
    Failed(String),
}

impl KindOutcome {
    pub fn is_trained(&self) -> bool {
        matches!(self, KindOutcome::Trained(_))
    }
}

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub samples: usize,
    pub features: usize,
    pub trained_at: DateTime<Utc>,
    /// In [`ModelKind::ALL`] order
    pub outcomes: Vec<(ModelKind, KindOutcome)>,
}

impl TrainingOutcome {
    pub fn trained_count(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_trained()).count()
    }
}

/// Per-kind line of a [`TrainingReport`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindReport {
    pub trained: bool,
    pub saved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What a train call did, kind by kind. Returned instead of an error when
/// only some kinds fail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_id: Option<String>,
    pub logs_used: usize,
    pub features_count: usize,
    pub trained_at: DateTime<Utc>,
    pub models: BTreeMap<String, KindReport>,
}

impl TrainingReport {
    pub fn saved_count(&self) -> usize {
        self.models.values().filter(|m| m.saved).count()
    }
}

#[derive(Debug, Clone)]
pub struct Trainer {
    params: FitParams,
    min_samples: usize,
}

impl Trainer {
    pub fn new(params: FitParams, min_samples: usize) -> Self {
        Self { params, min_samples }
    }

    pub fn from_config(cfg: &TrainingConfig) -> Self {
        Self::new(
            FitParams {
                seed: cfg.seed,
                max_reference_samples: cfg.max_reference_samples,
                ..FitParams::default()
            },
            cfg.min_samples,
        )
    }

    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    /// Fit one estimator per kind. Fails only when the batch is too small or
    /// yields no feature columns; a kind that cannot be fitted is reported
    /// as [`KindOutcome::Failed`].
    pub fn train(&self, records: &[RequestRecord], contamination: f64) -> Result<TrainingOutcome> {
        if records.len() < self.min_samples {
            return Err(SentinelError::InsufficientData(format!(
                "need at least {} samples, got {}",
                self.min_samples,
                records.len()
            )));
        }
        let (matrix, encoders) = FeatureExtractor::extract(records, None)?;
        if matrix.column_count() == 0 {
            return Err(SentinelError::InsufficientData("no feature columns".to_string()));
        }
        let raw = matrix.to_array();
        let scaler = StandardScaler::fit(&raw);
        let scaled = scaler.transform(&raw);
        let stats = matrix.column_stats();
        let trained_at = Utc::now();
        let params = FitParams {
            contamination,
            ..self.params.clone()
        };

        let mut fitted = Vec::with_capacity(ModelKind::ALL.len());
        for kind in ModelKind::ALL {
            // Each kind gets its own stream so results do not depend on sibling order.
            let mut rng = StdRng::seed_from_u64(params.seed);
            let mut model = FittedModel::new(kind);
            match model.as_estimator_mut().fit(&scaled, &params, &mut rng) {
                Ok(()) => fitted.push((kind, Ok(model))),
                Err(e) => {
                    warn!(kind = %kind, error = %e, "training failed for kind");
                    fitted.push((kind, Err(e.to_string())));
                }
            }
        }

        let models_trained: BTreeMap<String, String> = fitted
            .iter()
            .map(|(kind, r)| {
                let status = match r {
                    Ok(_) => "trained".to_string(),
                    Err(e) => format!("failed: {}", e),
                };
                (kind.to_string(), status)
            })
            .collect();

        let outcomes = fitted
            .into_iter()
            .map(|(kind, r)| {
                let outcome = match r {
                    Ok(model) => KindOutcome::Trained(Box::new(ModelArtifact {
                        model,
                        scaler: scaler.clone(),
                        encoders: encoders.clone(),
                        metadata: ArtifactMetadata {
                            trained_at,
                            saved_at: None,
                            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
                            feature_stats: stats.clone(),
                            samples_count: matrix.len(),
                            features_count: matrix.column_count(),
                            contamination,
                            models_trained: models_trained.clone(),
                        },
                    })),
                    Err(reason) => KindOutcome::Failed(reason),
                };
                (kind, outcome)
            })
            .collect();

        let outcome = TrainingOutcome {
            samples: matrix.len(),
            features: matrix.column_count(),
            trained_at,
            outcomes,
        };
        info!(
            samples = outcome.samples,
            trained = outcome.trained_count(),
            "training finished"
        );
        Ok(outcome)
    }
}
