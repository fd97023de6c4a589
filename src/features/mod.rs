//! Feature extraction from request records: fixed-schema rows, categorical
//! encoders and the standard scaler shared by every estimator kind.

mod encoder;
mod pipeline;
mod row;
mod scaler;

pub use encoder::{CategoricalEncoders, LabelTable, FIELD_CLIENT_ID, FIELD_METHOD, KNOWN_METHODS, UNKNOWN_LABEL};
pub use pipeline::FeatureExtractor;
pub use row::{FeatureRow, FEATURE_COUNT, FEATURE_NAMES};
pub use scaler::StandardScaler;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Extracted rows in input order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    pub rows: Vec<FeatureRow>,
}

impl FeatureMatrix {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_count(&self) -> usize {
        if self.rows.is_empty() {
            0
        } else {
            FEATURE_COUNT
        }
    }

    /// Dense `[n_rows, FEATURE_COUNT]` matrix in `FEATURE_NAMES` order
    pub fn to_array(&self) -> Array2<f64> {
        let mut out = Array2::<f64>::zeros((self.rows.len(), FEATURE_COUNT));
        for (i, row) in self.rows.iter().enumerate() {
            for (j, v) in row.to_vector().iter().enumerate() {
                out[[i, j]] = *v;
            }
        }
        out
    }

    /// Per-column mean, sample std, min and max keyed by feature name
    pub fn column_stats(&self) -> FeatureStats {
        let mut stats = FeatureStats::default();
        let n = self.rows.len();
        if n == 0 {
            return stats;
        }
        let data = self.to_array();
        for (j, name) in FEATURE_NAMES.iter().enumerate() {
            let col = data.column(j);
            let mean = col.sum() / n as f64;
            let std = if n > 1 {
                (col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
            } else {
                0.0
            };
            let min = col.iter().copied().fold(f64::INFINITY, f64::min);
            let max = col.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            stats.mean.insert(name.to_string(), mean);
            stats.std.insert(name.to_string(), std);
            stats.min.insert(name.to_string(), min);
            stats.max.insert(name.to_string(), max);
        }
        stats
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    pub mean: BTreeMap<String, f64>,
    pub std: BTreeMap<String, f64>,
    pub min: BTreeMap<String, f64>,
    pub max: BTreeMap<String, f64>,
}
