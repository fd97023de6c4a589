//! Trainable outlier models. Every kind implements [`Estimator`]; the set of
//! kinds is closed and looked up by name through [`ModelKind`].

mod artifact;
mod cblof;
mod iforest;
mod knn;
mod lof;
mod ocsvm;
mod store;
mod trainer;

pub use artifact::{ArtifactMetadata, ModelArtifact, ScoredBatch};
pub use cblof::Cblof;
pub use iforest::IsolationForest;
pub use knn::KnnDetector;
pub use lof::LocalOutlierFactor;
pub use ocsvm::OneClassSvm;
pub use store::{ArtifactPersistence, ExportPackage, ModelStore, ModelSummary};
#[cfg(test)]
pub(crate) use store::memory::MemoryArtifacts;
pub use trainer::{KindOutcome, KindReport, Trainer, TrainingOutcome, TrainingReport};

use crate::error::{SentinelError, TrainError};
use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Iforest,
    Lof,
    Knn,
    Ocsvm,
    Cblof,
}

impl ModelKind {
    pub const ALL: [ModelKind; 5] = [
        ModelKind::Iforest,
        ModelKind::Lof,
        ModelKind::Knn,
        ModelKind::Ocsvm,
        ModelKind::Cblof,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Iforest => "iforest",
            ModelKind::Lof => "lof",
            ModelKind::Knn => "knn",
            ModelKind::Ocsvm => "ocsvm",
            ModelKind::Cblof => "cblof",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = SentinelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SentinelError::UnknownModelKind(s.to_string()))
    }
}

/// Knobs shared by every kind in one training call
#[derive(Debug, Clone)]
pub struct FitParams {
    /// Expected anomaly share; sets the intrinsic decision boundary
    pub contamination: f64,
    pub seed: u64,
    pub max_reference_samples: usize,
}

impl Default for FitParams {
    fn default() -> Self {
        Self {
            contamination: 0.1,
            seed: 42,
            max_reference_samples: 2048,
        }
    }
}

/// A trainable model that scores rows for abnormality (higher = more anomalous).
pub trait Estimator {
    fn kind(&self) -> ModelKind;

    /// Fit on scaled rows and set the intrinsic threshold from the training scores.
    fn fit(&mut self, x: &Array2<f64>, params: &FitParams, rng: &mut StdRng) -> Result<(), TrainError>;

    fn score(&self, x: &Array2<f64>) -> Array1<f64>;

    /// Boundary derived from `contamination` at fit time
    fn threshold(&self) -> f64;

    fn label(&self, x: &Array2<f64>) -> Vec<bool> {
        let t = self.threshold();
        self.score(x).iter().map(|s| *s > t).collect()
    }
}

/// Persistable estimator of any kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FittedModel {
    Iforest(IsolationForest),
    Lof(LocalOutlierFactor),
    Knn(KnnDetector),
    Ocsvm(OneClassSvm),
    Cblof(Cblof),
}

impl FittedModel {
    /// Unfitted estimator with default parameters for `kind`
    pub fn new(kind: ModelKind) -> Self {
        match kind {
            ModelKind::Iforest => FittedModel::Iforest(IsolationForest::default()),
            ModelKind::Lof => FittedModel::Lof(LocalOutlierFactor::default()),
            ModelKind::Knn => FittedModel::Knn(KnnDetector::default()),
            ModelKind::Ocsvm => FittedModel::Ocsvm(OneClassSvm::default()),
            ModelKind::Cblof => FittedModel::Cblof(Cblof::default()),
        }
    }

    pub fn as_estimator(&self) -> &dyn Estimator {
        match self {
            FittedModel::Iforest(m) => m,
            FittedModel::Lof(m) => m,
            FittedModel::Knn(m) => m,
            FittedModel::Ocsvm(m) => m,
            FittedModel::Cblof(m) => m,
        }
    }

    pub fn as_estimator_mut(&mut self) -> &mut dyn Estimator {
        match self {
            FittedModel::Iforest(m) => m,
            FittedModel::Lof(m) => m,
            FittedModel::Knn(m) => m,
            FittedModel::Ocsvm(m) => m,
            FittedModel::Cblof(m) => m,
        }
    }

    pub fn kind(&self) -> ModelKind {
        self.as_estimator().kind()
    }
}

/// Linear-interpolated quantile, `q` in [0, 1].
pub(crate) fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Training-score quantile at `1 - contamination`
pub(crate) fn intrinsic_threshold(train_scores: &[f64], contamination: f64) -> f64 {
    quantile(train_scores, 1.0 - contamination)
}

pub(crate) fn sq_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

pub(crate) fn distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    sq_distance(a, b).sqrt()
}

/// `k` nearest reference rows to `point` as `(index, distance)`, nearest
/// first, ties broken by index. `exclude` skips one reference row.
pub(crate) fn nearest(
    reference: &Array2<f64>,
    point: ArrayView1<f64>,
    k: usize,
    exclude: Option<usize>,
) -> Vec<(usize, f64)> {
    let mut d: Vec<(usize, f64)> = reference
        .outer_iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != exclude)
        .map(|(i, r)| (i, distance(r, point)))
        .collect();
    d.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    d.truncate(k);
    d
}

/// Seeded subsample of at most `max` rows, original order preserved.
pub(crate) fn reference_sample(x: &Array2<f64>, max: usize, rng: &mut StdRng) -> Array2<f64> {
    if max == 0 || x.nrows() <= max {
        return x.clone();
    }
    let mut idx = rand::seq::index::sample(rng, x.nrows(), max).into_vec();
    idx.sort_unstable();
    x.select(ndarray::Axis(0), &idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn kind_names_round_trip() {
        for kind in ModelKind::ALL {
            assert_eq!(kind.as_str().parse::<ModelKind>().unwrap(), kind);
            assert_eq!(FittedModel::new(kind).kind(), kind);
        }
        assert!(matches!(
            "autoencoder".parse::<ModelKind>(),
            Err(SentinelError::UnknownModelKind(_))
        ));
    }

    #[test]
    fn quantile_interpolates() {
        assert_eq!(quantile(&[1.0, 2.0, 3.0, 4.0, 5.0], 0.5), 3.0);
        assert_eq!(quantile(&[0.0, 10.0], 0.9), 9.0);
        assert_eq!(quantile(&[], 0.5), 0.0);
    }

    #[test]
    fn nearest_skips_excluded_row() {
        let r = array![[0.0, 0.0], [1.0, 0.0], [5.0, 0.0]];
        let n = nearest(&r, r.row(0), 2, Some(0));
        assert_eq!(n.iter().map(|p| p.0).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(n[0].1, 1.0);
    }
}
