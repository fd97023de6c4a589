//! Scores a record batch with a saved artifact and applies the two-stage
//! threshold: the model's own boundary first, then the external cutoff.

use super::{DetectionResult, ScoreStatistics, ScoredLog};
use crate::config::{ConfigStore, DEFAULT_THRESHOLD};
use crate::describe::{default_description, DescriptionGenerator};
use crate::error::Result;
use crate::model::{ModelKind, ModelStore};
use crate::network::NetworkAnalyzer;
use crate::records::RequestRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-kind line of a model comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ComparisonEntry {
    Completed {
        anomalies_detected: usize,
        anomaly_rate: f64,
        score_statistics: ScoreStatistics,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelComparison {
    pub total_logs: usize,
    /// Removed from the window before scoring
    pub processed_false_positives: usize,
    /// Records every kind was run on
    pub logs_available: usize,
    pub models: BTreeMap<String, ComparisonEntry>,
}

fn rate_percent(anomalies: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (anomalies as f64 / total as f64 * 10_000.0).round() / 100.0
}

pub struct DetectionEngine {
    models: Arc<ModelStore>,
    config: Arc<dyn ConfigStore>,
    describer: Arc<dyn DescriptionGenerator>,
    network: Arc<NetworkAnalyzer>,
}

impl DetectionEngine {
    pub fn new(
        models: Arc<ModelStore>,
        config: Arc<dyn ConfigStore>,
        describer: Arc<dyn DescriptionGenerator>,
        network: Arc<NetworkAnalyzer>,
    ) -> Self {
        Self {
            models,
            config,
            describer,
            network,
        }
    }

    pub fn models(&self) -> &ModelStore {
        &self.models
    }

    /// Explicit value, else the config store's, else [`DEFAULT_THRESHOLD`].
    pub fn resolve_threshold(&self, threshold: Option<f64>) -> f64 {
        if let Some(t) = threshold {
            return t;
        }
        match self.config.ml_detection() {
            Ok(c) => c.threshold,
            Err(e) => {
                warn!(error = %e, "config store unavailable, using default threshold");
                DEFAULT_THRESHOLD
            }
        }
    }

    /// Fails with `ModelNotTrained` when no artifact is saved for `kind`;
    /// never trains.
    pub fn detect(&self, records: &[RequestRecord], kind: ModelKind, threshold: Option<f64>) -> Result<DetectionResult> {
        let artifact = self.models.load(kind)?;
        let threshold_used = self.resolve_threshold(threshold);
        let batch = artifact.score_records(records)?;
        let scores: Vec<f64> = batch.scores.to_vec();
        let lookback = self.network.config().lookback_hours;

        let mut anomalies = Vec::new();
        let mut normal_logs = Vec::new();
        for (i, record) in records.iter().enumerate() {
            let score = scores[i];
            let features = batch.features.rows[i];
            // Model labels first; the external cutoff only narrows that set.
            let is_anomaly = batch.labels[i] && score >= threshold_used;
            let mut entry = ScoredLog {
                index: i,
                record: record.clone(),
                anomaly_score: score,
                is_anomaly,
                features,
                anomaly_description: None,
                network_findings: Vec::new(),
            };
            if is_anomaly {
                let findings = self.network.analyze_record(record, records, lookback);
                let description = match self.describer.describe(record, score, &features, records, &findings) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(request_id = %record.request_id, error = %e, "description failed, using default");
                        default_description(kind, score)
                    }
                };
                entry.anomaly_description = Some(description);
                entry.network_findings = findings;
                anomalies.push(entry);
            } else {
                if batch.labels[i] {
                    debug!(request_id = %record.request_id, score, threshold = threshold_used, "below external threshold");
                }
                normal_logs.push(entry);
            }
        }

        let result = DetectionResult {
            model_used: kind,
            logs_analyzed: records.len(),
            anomalies_detected: anomalies.len(),
            anomaly_rate: rate_percent(anomalies.len(), records.len()),
            score_statistics: ScoreStatistics::from_scores(&scores),
            anomalies,
            normal_logs,
            threshold_used,
            model_threshold: artifact.threshold(),
        };
        info!(
            kind = %kind,
            logs = result.logs_analyzed,
            anomalies = result.anomalies_detected,
            threshold = threshold_used,
            "detection complete"
        );
        Ok(result)
    }

    /// Runs detection once per saved kind. A failing kind is reported with
    /// its error text and does not stop the others.
    pub fn compare(&self, records: &[RequestRecord], threshold: Option<f64>) -> Result<ModelComparison> {
        let mut models = BTreeMap::new();
        for kind in self.models.saved_kinds()? {
            let entry = match self.detect(records, kind, threshold) {
                Ok(r) => ComparisonEntry::Completed {
                    anomalies_detected: r.anomalies_detected,
                    anomaly_rate: r.anomaly_rate,
                    score_statistics: r.score_statistics,
                },
                Err(e) => {
                    warn!(kind = %kind, error = %e, "comparison run failed");
                    ComparisonEntry::Failed { error: e.to_string() }
                }
            };
            models.insert(kind.as_str().to_string(), entry);
        }
        Ok(ModelComparison {
            total_logs: records.len(),
            processed_false_positives: 0,
            logs_available: records.len(),
            models,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MlDetectionConfig, NetworkConfig, SentinelConfig, TrainingConfig};
    use crate::describe::TemplateDescriber;
    use crate::error::SentinelError;
    use crate::features::FeatureRow;
    use crate::model::{MemoryArtifacts, Trainer};
    use crate::network::NetworkFinding;
    use crate::records::fixtures::record;
    use chrono::{Duration, TimeZone, Utc};

    /// Ten identical requests plus one off-hours admin request from a stranger
    fn outlier_batch() -> Vec<RequestRecord> {
        let mut logs: Vec<RequestRecord> = (0..10)
            .map(|i| record(&format!("n{}", i), "alice", "10.0.0.1", 0))
            .collect();
        let mut stranger = record("admin-scan", "mallory", "203.0.113.9", 0);
        stranger.path = "/admin/config".to_string();
        stranger.status = 403;
        stranger.timestamp = Utc.with_ymd_and_hms(2024, 3, 5, 3, 0, 0).unwrap();
        logs.push(stranger);
        logs
    }

    fn engine_with(config: Arc<dyn ConfigStore>, describer: Arc<dyn DescriptionGenerator>) -> DetectionEngine {
        let models = Arc::new(ModelStore::new(
            Arc::new(MemoryArtifacts::default()),
            Trainer::from_config(&TrainingConfig::default()),
        ));
        DetectionEngine::new(
            models,
            config,
            describer,
            Arc::new(NetworkAnalyzer::new(NetworkConfig::default())),
        )
    }

    fn engine() -> DetectionEngine {
        engine_with(Arc::new(SentinelConfig::default()), Arc::new(TemplateDescriber))
    }

    struct BrokenConfig;

    impl ConfigStore for BrokenConfig {
        fn ml_detection(&self) -> Result<MlDetectionConfig> {
            Err(SentinelError::Persistence("config offline".to_string()))
        }
    }

    struct FailingDescriber;

    impl DescriptionGenerator for FailingDescriber {
        fn describe(
            &self,
            _: &RequestRecord,
            _: f64,
            _: &FeatureRow,
            _: &[RequestRecord],
            _: &[NetworkFinding],
        ) -> Result<String> {
            Err(SentinelError::InvalidArgument("no wording".to_string()))
        }
    }

    #[test]
    fn detection_never_trains_implicitly() {
        let err = engine().detect(&outlier_batch(), ModelKind::Iforest, None).unwrap_err();
        assert!(matches!(err, SentinelError::ModelNotTrained(_)));
    }

    #[test]
    fn flags_exactly_the_outlier() {
        let e = engine();
        let logs = outlier_batch();
        e.models().train(&logs, 0.1).unwrap();
        let r = e.detect(&logs, ModelKind::Iforest, None).unwrap();
        assert_eq!(r.logs_analyzed, 11);
        assert_eq!(r.anomalies_detected, 1);
        assert_eq!(r.anomalies[0].record.request_id, "admin-scan");
        assert_eq!(r.anomalies[0].index, 10);
        assert!(r.anomalies[0].anomaly_description.is_some());
        assert_eq!(r.normal_logs.len(), 10);
        assert_eq!(r.threshold_used, DEFAULT_THRESHOLD);
        assert_eq!(r.anomaly_rate, 9.09);
    }

    #[test]
    fn raising_threshold_moves_anomalies_to_normal() {
        let e = engine();
        let logs = outlier_batch();
        e.models().train(&logs, 0.1).unwrap();
        let mut last = usize::MAX;
        for t in [-1.0, 0.0, 0.12, 0.3, 0.9] {
            let r = e.detect(&logs, ModelKind::Iforest, Some(t)).unwrap();
            assert!(r.anomalies_detected <= last);
            assert_eq!(r.anomalies.len() + r.normal_logs.len(), logs.len());
            last = r.anomalies_detected;
        }
        assert_eq!(last, 0);
    }

    #[test]
    fn scoring_is_repeatable() {
        let e = engine();
        let logs = outlier_batch();
        e.models().train(&logs, 0.1).unwrap();
        let a = e.detect(&logs, ModelKind::Iforest, None).unwrap();
        let b = e.detect(&logs, ModelKind::Iforest, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn config_failure_and_describer_failure_are_absorbed() {
        let e = engine_with(Arc::new(BrokenConfig), Arc::new(FailingDescriber));
        let logs = outlier_batch();
        e.models().train(&logs, 0.1).unwrap();
        let r = e.detect(&logs, ModelKind::Iforest, None).unwrap();
        assert_eq!(r.threshold_used, DEFAULT_THRESHOLD);
        let text = r.anomalies[0].anomaly_description.clone().unwrap();
        assert!(text.starts_with("Anomaly detected by model iforest"), "{}", text);
    }

    #[test]
    fn comparison_covers_every_saved_kind() {
        let e = engine();
        let mut logs = outlier_batch();
        for (i, r) in logs.iter_mut().enumerate().take(10) {
            r.timestamp = r.timestamp + Duration::minutes(i as i64);
        }
        let report = e.models().train(&logs, 0.1).unwrap();
        let cmp = e.compare(&logs, None).unwrap();
        assert_eq!(cmp.total_logs, 11);
        assert_eq!(cmp.logs_available, 11);
        assert_eq!(cmp.processed_false_positives, 0);
        assert_eq!(cmp.models.len(), report.saved_count());
        assert!(cmp
            .models
            .values()
            .all(|m| matches!(m, ComparisonEntry::Completed { .. })));
    }
}
