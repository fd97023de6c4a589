//! Process-wide context: one store, one model store and the engines built on
//! them, constructed once and passed to every operation.

use crate::config::{ConfigStore, SentinelConfig};
use crate::describe::{DescriptionGenerator, TemplateDescriber};
use crate::detection::{ApiDetection, DetectionEngine, ModelComparison, ScoredLog, Timeline};
use crate::error::{Result, SentinelError};
use crate::feedback::{FeedbackKind, FeedbackLoop, FeedbackRecord, RetrainResult};
use crate::model::{ModelKind, ModelStore, Trainer, TrainingReport};
use crate::network::NetworkAnalyzer;
use crate::records::RequestRecord;
use crate::storage::{LogStore, SecureStore};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

pub struct Sentinel {
    config: SentinelConfig,
    store: Arc<SecureStore>,
    models: Arc<ModelStore>,
    engine: DetectionEngine,
    feedback: FeedbackLoop,
    /// Fixed "now" for window queries; wall clock when unset
    reference_time: Option<DateTime<Utc>>,
}

impl Sentinel {
    /// Open `store.db` under the configured data directory.
    pub fn open(config: SentinelConfig, secret: &[u8]) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let store = Arc::new(SecureStore::open(&config.data_dir.join("store.db"), secret)?);
        Ok(Self::with_store(config, store, Arc::new(TemplateDescriber)))
    }

    pub fn with_store(
        config: SentinelConfig,
        store: Arc<SecureStore>,
        describer: Arc<dyn DescriptionGenerator>,
    ) -> Self {
        let models = Arc::new(ModelStore::new(store.clone(), Trainer::from_config(&config.training)));
        let config_store: Arc<dyn ConfigStore> = Arc::new(config.clone());
        let engine = DetectionEngine::new(
            models.clone(),
            config_store,
            describer,
            Arc::new(NetworkAnalyzer::new(config.network.clone())),
        );
        let feedback = FeedbackLoop::new(
            store.clone(),
            store.clone(),
            store.clone(),
            models.clone(),
            config.feedback.clone(),
            config.ml_detection.contamination,
        );
        Self {
            config,
            store,
            models,
            engine,
            feedback,
            reference_time: None,
        }
    }

    /// Pin the time that `hours_back` windows are measured from.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.reference_time = Some(now);
        self
    }

    pub fn config(&self) -> &SentinelConfig {
        &self.config
    }

    pub fn store(&self) -> &SecureStore {
        &self.store
    }

    pub fn models(&self) -> &ModelStore {
        &self.models
    }

    pub fn engine(&self) -> &DetectionEngine {
        &self.engine
    }

    pub fn feedback(&self) -> &FeedbackLoop {
        &self.feedback
    }

    /// Configured preferred kind, falling back to `iforest`
    pub fn preferred_kind(&self) -> ModelKind {
        match self.config.ml_detection.model_preference.parse() {
            Ok(k) => k,
            Err(e) => {
                warn!(error = %e, "invalid model preference, using iforest");
                ModelKind::Iforest
            }
        }
    }

    pub fn ingest(&self, records: &[RequestRecord]) -> Result<usize> {
        self.store.insert_logs(records)
    }

    fn window(&self, api_id: Option<&str>, hours_back: Option<i64>) -> Result<Vec<RequestRecord>> {
        let hours = hours_back.unwrap_or(self.config.training.hours_back);
        let now = self.reference_time.unwrap_or_else(Utc::now);
        self.store.get(api_id, Some(now - Duration::hours(hours)), None)
    }

    /// Train and save every kind on the logs from the last `hours_back`
    /// hours (configured window when `None`).
    pub fn train_api(&self, api_id: Option<&str>, hours_back: Option<i64>) -> Result<TrainingReport> {
        let logs = self.window(api_id, hours_back)?;
        let mut report = self.models.train(&logs, self.config.ml_detection.contamination)?;
        report.api_id = api_id.map(str::to_string);
        info!(api_id = ?api_id, logs = logs.len(), saved = report.saved_count(), "api models trained");
        Ok(report)
    }

    /// The window minus processed false positives, with the window size and
    /// the number removed. `NoLogsAvailable` when nothing is left to score.
    fn candidates(&self, api_id: Option<&str>, hours_back: Option<i64>) -> Result<(Vec<RequestRecord>, usize, usize)> {
        let logs = self.window(api_id, hours_back)?;
        let scope = api_id.unwrap_or("all").to_string();
        if logs.is_empty() {
            return Err(SentinelError::NoLogsAvailable(scope));
        }
        let resolved = self.feedback.processed_false_positives(api_id)?;
        let total_logs = logs.len();
        let candidates: Vec<RequestRecord> =
            logs.into_iter().filter(|r| !resolved.contains(&r.request_id)).collect();
        let excluded = total_logs - candidates.len();
        if candidates.is_empty() {
            warn!(api_id = %scope, total_logs, "every log in the window is a processed false positive");
            return Err(SentinelError::NoLogsAvailable(scope));
        }
        Ok((candidates, total_logs, excluded))
    }

    /// Detection over the window with processed false positives removed
    /// before scoring.
    pub fn detect_api(
        &self,
        api_id: Option<&str>,
        kind: ModelKind,
        hours_back: Option<i64>,
        threshold: Option<f64>,
    ) -> Result<ApiDetection> {
        let (candidates, total_logs, excluded) = self.candidates(api_id, hours_back)?;
        let result = self.engine.detect(&candidates, kind, threshold)?;
        Ok(ApiDetection {
            result,
            total_logs,
            processed_false_positives: excluded,
            logs_available: candidates.len(),
        })
    }

    /// Every saved kind over the same candidate set as [`Sentinel::detect_api`].
    pub fn compare_models(
        &self,
        api_id: Option<&str>,
        hours_back: Option<i64>,
        threshold: Option<f64>,
    ) -> Result<ModelComparison> {
        let (candidates, total_logs, excluded) = self.candidates(api_id, hours_back)?;
        let mut comparison = self.engine.compare(&candidates, threshold)?;
        comparison.total_logs = total_logs;
        comparison.processed_false_positives = excluded;
        Ok(comparison)
    }

    /// Anomalies of an API-scoped detection grouped by time slot
    pub fn timeline(
        &self,
        api_id: Option<&str>,
        kind: ModelKind,
        hours_back: Option<i64>,
        interval_minutes: Option<u32>,
    ) -> Result<Timeline> {
        let detection = self.detect_api(api_id, kind, hours_back, None)?;
        Timeline::build(
            &detection.result,
            interval_minutes.unwrap_or(self.config.timeline.interval_minutes),
        )
    }

    /// Record a judgment on a detection entry, keeping its score and features.
    pub fn judge(&self, entry: &ScoredLog, kind: FeedbackKind, comment: Option<String>) -> Result<FeedbackRecord> {
        self.feedback.record(
            &entry.record.request_id,
            &entry.record.api_id,
            kind,
            comment,
            Some(entry.anomaly_score),
            Some(entry.features),
        )
    }

    pub fn retrain(&self, api_id: &str) -> Result<RetrainResult> {
        self.feedback.retrain(api_id)
    }
}
