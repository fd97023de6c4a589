//! Records feedback and rebuilds the training corpus from it.

use super::{FeedbackKind, FeedbackRecord, FeedbackStats};
use crate::config::FeedbackConfig;
use crate::error::{Result, SentinelError};
use crate::features::FeatureRow;
use crate::model::{ModelStore, TrainingReport};
use crate::records::within_hours;
use crate::storage::{CorpusStore, FeedbackStore, LogStore};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrainResult {
    pub api_id: String,
    pub retrained: bool,
    pub message: String,
    pub false_positives_processed: usize,
    /// Unprocessed true positives seen; they stay unprocessed
    pub true_positives_seen: usize,
    pub total_logs_used: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<TrainingReport>,
}

impl RetrainResult {
    fn skipped(api_id: &str, message: impl Into<String>) -> Self {
        Self {
            api_id: api_id.to_string(),
            retrained: false,
            message: message.into(),
            false_positives_processed: 0,
            true_positives_seen: 0,
            total_logs_used: 0,
            report: None,
        }
    }
}

pub struct FeedbackLoop {
    logs: Arc<dyn LogStore>,
    feedback: Arc<dyn FeedbackStore>,
    corpus: Arc<dyn CorpusStore>,
    models: Arc<ModelStore>,
    config: FeedbackConfig,
    contamination: f64,
}

impl FeedbackLoop {
    pub fn new(
        logs: Arc<dyn LogStore>,
        feedback: Arc<dyn FeedbackStore>,
        corpus: Arc<dyn CorpusStore>,
        models: Arc<ModelStore>,
        config: FeedbackConfig,
        contamination: f64,
    ) -> Self {
        Self {
            logs,
            feedback,
            corpus,
            models,
            config,
            contamination,
        }
    }

    /// Store a judgment on `log_id`. The log must exist and belong to `api_id`.
    pub fn record(
        &self,
        log_id: &str,
        api_id: &str,
        kind: FeedbackKind,
        comment: Option<String>,
        score: Option<f64>,
        features: Option<FeatureRow>,
    ) -> Result<FeedbackRecord> {
        let original_log = self
            .logs
            .find(log_id)?
            .ok_or_else(|| SentinelError::LogNotFound(log_id.to_string()))?;
        if original_log.api_id != api_id {
            return Err(SentinelError::InvalidArgument(format!(
                "log {} belongs to api {}, not {}",
                log_id, original_log.api_id, api_id
            )));
        }
        let fb = FeedbackRecord {
            id: uuid::Uuid::new_v4().to_string(),
            log_id: log_id.to_string(),
            api_id: api_id.to_string(),
            kind,
            comment,
            score,
            features,
            original_log,
            timestamp: Utc::now(),
            processed: false,
        };
        self.feedback.insert_feedback(&fb)?;
        info!(log_id, api_id, kind = kind.as_str(), "feedback recorded");
        Ok(fb)
    }

    /// Retrain every kind for `api_id` on its logs plus replicated false
    /// positives. Consumed false positives are marked processed only after
    /// at least one kind was saved.
    pub fn retrain(&self, api_id: &str) -> Result<RetrainResult> {
        let pending: Vec<FeedbackRecord> = self
            .feedback
            .feedback(Some(api_id))?
            .into_iter()
            .filter(|f| !f.processed)
            .collect();
        if pending.is_empty() {
            return Ok(RetrainResult::skipped(api_id, "no unprocessed feedback"));
        }
        let false_positives: Vec<&FeedbackRecord> =
            pending.iter().filter(|f| f.kind == FeedbackKind::FalsePositive).collect();
        let true_positives_seen = pending.len() - false_positives.len();

        let logs = self.logs.get(Some(api_id), None, None)?;
        let Some(newest) = logs.last().map(|r| r.timestamp) else {
            return Err(SentinelError::NoLogsAvailable(api_id.to_string()));
        };
        let mut corpus = within_hours(logs, newest, self.config.retrain_hours_back);
        for fb in &false_positives {
            for _ in 0..self.config.replication_factor {
                corpus.push(fb.original_log.clone());
            }
        }
        self.corpus.replace_training_corpus(api_id, &corpus)?;
        let corpus = self.corpus.training_corpus(api_id)?;

        let mut report = match self.models.train(&corpus, self.contamination) {
            Ok(r) => r,
            Err(SentinelError::InsufficientData(reason)) => {
                warn!(api_id, %reason, "retrain skipped");
                let mut result = RetrainResult::skipped(api_id, reason);
                result.true_positives_seen = true_positives_seen;
                result.total_logs_used = corpus.len();
                return Ok(result);
            }
            Err(e) => return Err(e),
        };
        report.api_id = Some(api_id.to_string());

        let mut processed = 0;
        if report.saved_count() > 0 {
            let ids: Vec<String> = false_positives.iter().map(|f| f.id.clone()).collect();
            processed = self.feedback.mark_processed(&ids)?;
        }
        info!(
            api_id,
            false_positives = processed,
            logs_used = corpus.len(),
            "retrained with feedback"
        );
        Ok(RetrainResult {
            api_id: api_id.to_string(),
            retrained: report.saved_count() > 0,
            message: format!("model retrained with {} false positives", processed),
            false_positives_processed: processed,
            true_positives_seen,
            total_logs_used: corpus.len(),
            report: Some(report),
        })
    }

    pub fn stats(&self, api_id: Option<&str>) -> Result<FeedbackStats> {
        Ok(FeedbackStats::from_records(&self.feedback.feedback(api_id)?))
    }

    /// Newest first
    pub fn history(&self, api_id: Option<&str>, limit: usize) -> Result<Vec<FeedbackRecord>> {
        let mut all = self.feedback.feedback(api_id)?;
        all.reverse();
        all.truncate(limit);
        Ok(all)
    }

    pub fn logs_with_feedback(&self, api_id: Option<&str>) -> Result<BTreeSet<String>> {
        Ok(self.feedback.feedback(api_id)?.into_iter().map(|f| f.log_id).collect())
    }

    /// Log ids judged normal and already folded into a retrain. These never
    /// reach feature extraction again.
    pub fn processed_false_positives(&self, api_id: Option<&str>) -> Result<BTreeSet<String>> {
        Ok(self
            .feedback
            .feedback(api_id)?
            .into_iter()
            .filter(|f| f.kind == FeedbackKind::FalsePositive && f.processed)
            .map(|f| f.log_id)
            .collect())
    }

    pub fn true_positives(&self, api_id: Option<&str>) -> Result<BTreeSet<String>> {
        Ok(self
            .feedback
            .feedback(api_id)?
            .into_iter()
            .filter(|f| f.kind == FeedbackKind::TruePositive)
            .map(|f| f.log_id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrainingConfig;
    use crate::model::Trainer;
    use crate::records::fixtures::record;
    use crate::records::RequestRecord;
    use crate::storage::SecureStore;

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Arc<SecureStore>,
        fl: FeedbackLoop,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SecureStore::open(&dir.path().join("store.db"), b"s").unwrap());
        let models = Arc::new(ModelStore::new(store.clone(), Trainer::from_config(&TrainingConfig::default())));
        let fl = FeedbackLoop::new(
            store.clone(),
            store.clone(),
            store.clone(),
            models,
            FeedbackConfig::default(),
            0.1,
        );
        Fixture { _dir: dir, store, fl }
    }

    fn seed_logs(store: &SecureStore, n: usize) {
        let logs: Vec<RequestRecord> = (0..n)
            .map(|i| record(&format!("r{}", i), "alice", &format!("10.0.0.{}", i % 3 + 1), i as i64))
            .collect();
        store.insert_logs(&logs).unwrap();
    }

    #[test]
    fn unknown_log_is_rejected() {
        let f = fixture();
        let err = f
            .fl
            .record("nope", "api-1", FeedbackKind::FalsePositive, None, None, None)
            .unwrap_err();
        assert!(matches!(err, SentinelError::LogNotFound(_)));
    }

    #[test]
    fn judgment_under_another_api_is_rejected() {
        let f = fixture();
        seed_logs(&f.store, 2);
        let err = f
            .fl
            .record("r0", "api-2", FeedbackKind::FalsePositive, None, None, None)
            .unwrap_err();
        assert!(matches!(err, SentinelError::InvalidArgument(_)));
        assert_eq!(f.fl.stats(None).unwrap().total, 0);
    }

    #[test]
    fn retrain_without_feedback_is_noop() {
        let f = fixture();
        seed_logs(&f.store, 12);
        let r = f.fl.retrain("api-1").unwrap();
        assert!(!r.retrained);
        assert!(r.report.is_none());
    }

    #[test]
    fn retrain_without_logs_fails() {
        let f = fixture();
        seed_logs(&f.store, 1);
        f.fl.record("r0", "api-1", FeedbackKind::FalsePositive, None, None, None).unwrap();
        f.store.clear_logs(Some("api-1")).unwrap();
        let err = f.fl.retrain("api-1").unwrap_err();
        assert!(matches!(err, SentinelError::NoLogsAvailable(_)));
        assert_eq!(f.fl.stats(Some("api-1")).unwrap().unprocessed, 1);
    }

    #[test]
    fn retrain_replicates_false_positives_and_keeps_true_positives() {
        let f = fixture();
        seed_logs(&f.store, 12);
        f.fl
            .record("r3", "api-1", FeedbackKind::FalsePositive, Some("expected".into()), Some(0.3), None)
            .unwrap();
        f.fl.record("r4", "api-1", FeedbackKind::TruePositive, None, None, None).unwrap();

        let r = f.fl.retrain("api-1").unwrap();
        assert!(r.retrained);
        assert_eq!(r.false_positives_processed, 1);
        assert_eq!(r.true_positives_seen, 1);
        assert_eq!(r.total_logs_used, 12 + 5);
        assert_eq!(f.store.training_corpus("api-1").unwrap().len(), 17);

        let stats = f.fl.stats(Some("api-1")).unwrap();
        assert_eq!(
            stats,
            FeedbackStats {
                false_positives: 1,
                true_positives: 1,
                unprocessed: 1,
                total: 2
            }
        );
        assert!(f.fl.processed_false_positives(Some("api-1")).unwrap().contains("r3"));
        assert!(f.fl.true_positives(None).unwrap().contains("r4"));
        assert_eq!(f.fl.logs_with_feedback(Some("api-1")).unwrap().len(), 2);
        assert_eq!(f.fl.history(None, 1).unwrap()[0].log_id, "r4");
    }
}
