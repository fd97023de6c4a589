//! Per-kind artifact lifecycle: train-and-save, load, list, delete, export, import.

use super::{KindOutcome, KindReport, ModelArtifact, ModelKind, Trainer, TrainingReport};
use crate::error::{Result, SentinelError};
use crate::records::RequestRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Durable byte storage keyed by model kind. `put` replaces the whole
/// payload for a kind in one step.
pub trait ArtifactPersistence: Send + Sync {
    fn put(&self, kind: ModelKind, saved_at: DateTime<Utc>, payload: &[u8]) -> Result<()>;
    fn fetch(&self, kind: ModelKind) -> Result<Option<Vec<u8>>>;
    fn remove(&self, kind: ModelKind) -> Result<bool>;
    fn kinds(&self) -> Result<Vec<ModelKind>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub kind: ModelKind,
    pub trained_at: DateTime<Utc>,
    pub saved_at: Option<DateTime<Utc>>,
    pub samples_count: usize,
    pub features_count: usize,
    pub contamination: f64,
    pub threshold: f64,
}

/// On-disk export format. `artifact` is the serialized artifact text and
/// `sha256` its hex digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportPackage {
    pub kind: ModelKind,
    pub exported_at: DateTime<Utc>,
    pub sha256: String,
    pub artifact: String,
}

fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

pub struct ModelStore {
    backend: Arc<dyn ArtifactPersistence>,
    trainer: Trainer,
}

impl ModelStore {
    pub fn new(backend: Arc<dyn ArtifactPersistence>, trainer: Trainer) -> Self {
        Self { backend, trainer }
    }

    pub fn trainer(&self) -> &Trainer {
        &self.trainer
    }

    /// Train every kind on `records` and save each one that fitted. Kinds that
    /// fail to fit or to save are reported, never raised.
    pub fn train(&self, records: &[RequestRecord], contamination: f64) -> Result<TrainingReport> {
        let outcome = self.trainer.train(records, contamination)?;
        let mut models = BTreeMap::new();
        for (kind, result) in outcome.outcomes {
            let report = match result {
                KindOutcome::Trained(artifact) => match self.save(kind, &artifact) {
                    Ok(_) => KindReport {
                        trained: true,
                        saved: true,
                        error: None,
                    },
                    Err(e) => {
                        warn!(kind = %kind, error = %e, "saving artifact failed");
                        KindReport {
                            trained: true,
                            saved: false,
                            error: Some(e.to_string()),
                        }
                    }
                },
                KindOutcome::Failed(reason) => KindReport {
                    trained: false,
                    saved: false,
                    error: Some(reason),
                },
            };
            models.insert(kind.to_string(), report);
        }
        let report = TrainingReport {
            api_id: None,
            logs_used: outcome.samples,
            features_count: outcome.features,
            trained_at: outcome.trained_at,
            models,
        };
        info!(logs_used = report.logs_used, saved = report.saved_count(), "models trained");
        Ok(report)
    }

    /// Persist `artifact` under `kind`, stamping `saved_at`.
    pub fn save(&self, kind: ModelKind, artifact: &ModelArtifact) -> Result<DateTime<Utc>> {
        if artifact.kind() != kind {
            return Err(SentinelError::Persistence(format!(
                "artifact of kind '{}' cannot be saved as '{}'",
                artifact.kind(),
                kind
            )));
        }
        let saved_at = Utc::now();
        let mut stamped = artifact.clone();
        stamped.metadata.saved_at = Some(saved_at);
        let payload = serde_json::to_vec(&stamped)?;
        self.backend.put(kind, saved_at, &payload)?;
        Ok(saved_at)
    }

    pub fn load(&self, kind: ModelKind) -> Result<ModelArtifact> {
        let payload = self
            .backend
            .fetch(kind)?
            .ok_or_else(|| SentinelError::ModelNotTrained(kind.to_string()))?;
        serde_json::from_slice(&payload)
            .map_err(|e| SentinelError::Persistence(format!("corrupt artifact for '{}': {}", kind, e)))
    }

    /// Summaries of every loadable artifact; unreadable ones are skipped.
    pub fn list(&self) -> Result<Vec<ModelSummary>> {
        let mut out = Vec::new();
        for kind in self.backend.kinds()? {
            match self.load(kind) {
                Ok(a) => out.push(ModelSummary {
                    kind,
                    trained_at: a.metadata.trained_at,
                    saved_at: a.metadata.saved_at,
                    samples_count: a.metadata.samples_count,
                    features_count: a.metadata.features_count,
                    contamination: a.metadata.contamination,
                    threshold: a.threshold(),
                }),
                Err(e) => warn!(kind = %kind, error = %e, "skipping unreadable artifact"),
            }
        }
        Ok(out)
    }

    /// Kinds with a stored payload, readable or not
    pub fn saved_kinds(&self) -> Result<Vec<ModelKind>> {
        self.backend.kinds()
    }

    pub fn delete(&self, kind: ModelKind) -> Result<bool> {
        self.backend.remove(kind)
    }

    /// Write the artifact for `kind` to `path` as one checksummed file. The
    /// file appears complete or not at all.
    pub fn export(&self, kind: ModelKind, path: &Path) -> Result<()> {
        let artifact = self.load(kind)?;
        let text = serde_json::to_string(&artifact)?;
        let package = ExportPackage {
            kind,
            exported_at: Utc::now(),
            sha256: sha256_hex(text.as_bytes()),
            artifact: text,
        };
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| SentinelError::Persistence(format!("invalid export path {}", path.display())))?;
        let tmp = path.with_file_name(format!(".{}.tmp", file_name));
        std::fs::write(&tmp, serde_json::to_vec(&package)?)?;
        std::fs::rename(&tmp, path)?;
        info!(kind = %kind, path = %path.display(), "artifact exported");
        Ok(())
    }

    /// Verify and store an exported artifact, replacing any artifact of the
    /// same kind. Returns the imported kind.
    pub fn import(&self, path: &Path) -> Result<ModelKind> {
        let data = std::fs::read(path)?;
        let package: ExportPackage = serde_json::from_slice(&data)
            .map_err(|e| SentinelError::Persistence(format!("unreadable export {}: {}", path.display(), e)))?;
        let digest = sha256_hex(package.artifact.as_bytes());
        if digest != package.sha256 {
            return Err(SentinelError::Integrity(format!(
                "checksum mismatch for '{}': expected {}, got {}",
                package.kind, package.sha256, digest
            )));
        }
        let artifact: ModelArtifact = serde_json::from_str(&package.artifact)?;
        if artifact.kind() != package.kind {
            return Err(SentinelError::Integrity(format!(
                "package declares '{}' but holds '{}'",
                package.kind,
                artifact.kind()
            )));
        }
        self.save(package.kind, &artifact)?;
        info!(kind = %package.kind, "artifact imported");
        Ok(package.kind)
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use std::sync::Mutex;

    /// In-process persistence for unit tests
    #[derive(Default)]
    pub struct MemoryArtifacts {
        items: Mutex<BTreeMap<ModelKind, Vec<u8>>>,
    }

    impl ArtifactPersistence for MemoryArtifacts {
        fn put(&self, kind: ModelKind, _saved_at: DateTime<Utc>, payload: &[u8]) -> Result<()> {
            self.items.lock().unwrap().insert(kind, payload.to_vec());
            Ok(())
        }

        fn fetch(&self, kind: ModelKind) -> Result<Option<Vec<u8>>> {
            Ok(self.items.lock().unwrap().get(&kind).cloned())
        }

        fn remove(&self, kind: ModelKind) -> Result<bool> {
            Ok(self.items.lock().unwrap().remove(&kind).is_some())
        }

        fn kinds(&self) -> Result<Vec<ModelKind>> {
            Ok(self.items.lock().unwrap().keys().copied().collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryArtifacts;
    use super::*;
    use crate::config::TrainingConfig;
    use crate::records::fixtures::record;

    fn store() -> ModelStore {
        ModelStore::new(
            Arc::new(MemoryArtifacts::default()),
            Trainer::from_config(&TrainingConfig::default()),
        )
    }

    fn batch() -> Vec<RequestRecord> {
        (0..16)
            .map(|i| record(&format!("r{}", i), "alice", &format!("10.0.0.{}", i % 3 + 1), i as i64 * 3))
            .collect()
    }

    #[test]
    fn load_of_untrained_kind_fails() {
        let err = store().load(ModelKind::Knn).unwrap_err();
        assert!(matches!(err, SentinelError::ModelNotTrained(k) if k == "knn"));
    }

    #[test]
    fn saved_artifact_reproduces_training_scores() {
        let s = store();
        let records = batch();
        let outcome = s.trainer().train(&records, 0.1).unwrap();
        for (kind, o) in outcome.outcomes {
            let KindOutcome::Trained(artifact) = o else { continue };
            let before = artifact.score_records(&records).unwrap();
            s.save(kind, &artifact).unwrap();
            let loaded = s.load(kind).unwrap();
            assert!(loaded.metadata.saved_at.is_some());
            assert_eq!(loaded.model, artifact.model);
            let after = loaded.score_records(&records).unwrap();
            assert_eq!(before.scores, after.scores);
            assert_eq!(before.labels, after.labels);
        }
    }

    #[test]
    fn save_rejects_mismatched_kind() {
        let s = store();
        let outcome = s.trainer().train(&batch(), 0.1).unwrap();
        let artifact = outcome
            .outcomes
            .into_iter()
            .find_map(|(k, o)| match o {
                KindOutcome::Trained(a) if k == ModelKind::Iforest => Some(a),
                _ => None,
            })
            .unwrap();
        assert!(s.save(ModelKind::Lof, &artifact).is_err());
    }

    #[test]
    fn train_list_and_delete() {
        let s = store();
        let report = s.train(&batch(), 0.1).unwrap();
        assert_eq!(report.logs_used, 16);
        assert!(report.models["iforest"].saved);
        let listed = s.list().unwrap();
        assert_eq!(listed.len(), report.saved_count());
        assert!(s.delete(ModelKind::Iforest).unwrap());
        assert!(!s.delete(ModelKind::Iforest).unwrap());
        assert!(s.load(ModelKind::Iforest).is_err());
    }

    #[test]
    fn tampered_export_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iforest.json");
        let s = store();
        s.train(&batch(), 0.1).unwrap();
        s.export(ModelKind::Iforest, &path).unwrap();

        let mut package: ExportPackage = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        package.sha256 = sha256_hex(b"something else");
        std::fs::write(&path, serde_json::to_vec(&package).unwrap()).unwrap();

        let err = store().import(&path).unwrap_err();
        assert!(matches!(err, SentinelError::Integrity(_)));
    }

    #[test]
    fn export_then_import_into_fresh_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knn.json");
        let s = store();
        s.train(&batch(), 0.1).unwrap();
        s.export(ModelKind::Knn, &path).unwrap();

        let other = store();
        assert_eq!(other.import(&path).unwrap(), ModelKind::Knn);
        assert_eq!(other.load(ModelKind::Knn).unwrap().model, s.load(ModelKind::Knn).unwrap().model);
    }

    #[test]
    fn import_replaces_existing_kind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iforest.json");
        let source = store();
        source.train(&batch(), 0.1).unwrap();
        source.export(ModelKind::Iforest, &path).unwrap();

        let db = Arc::new(crate::storage::SecureStore::open(&dir.path().join("store.db"), b"dest").unwrap());
        let dest = ModelStore::new(db, Trainer::from_config(&TrainingConfig::default()));
        let other: Vec<RequestRecord> = (0..20)
            .map(|i| record(&format!("b{}", i), "bob", &format!("10.1.0.{}", i % 4 + 1), i as i64 * 7))
            .collect();
        dest.train(&other, 0.1).unwrap();
        let expected = source.load(ModelKind::Iforest).unwrap();
        assert_ne!(dest.load(ModelKind::Iforest).unwrap().encoders, expected.encoders);

        assert_eq!(dest.import(&path).unwrap(), ModelKind::Iforest);
        let replaced = dest.load(ModelKind::Iforest).unwrap();
        assert_eq!(replaced.model, expected.model);
        assert_eq!(replaced.scaler, expected.scaler);
        assert_eq!(replaced.encoders, expected.encoders);
        let listed = dest.list().unwrap();
        assert_eq!(listed.iter().filter(|m| m.kind == ModelKind::Iforest).count(), 1);
        assert_eq!(listed.iter().find(|m| m.kind == ModelKind::Iforest).unwrap().samples_count, 16);
    }
}
