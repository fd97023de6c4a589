//! k-nearest-neighbor distance detector (distance to the k-th neighbor).

use super::{intrinsic_threshold, nearest, reference_sample, Estimator, FitParams, ModelKind};
use crate::error::TrainError;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnnDetector {
    pub n_neighbors: usize,
    k: usize,
    reference: Array2<f64>,
    threshold: f64,
}

impl Default for KnnDetector {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            k: 0,
            reference: Array2::zeros((0, 0)),
            threshold: 0.0,
        }
    }
}

impl Estimator for KnnDetector {
    fn kind(&self) -> ModelKind {
        ModelKind::Knn
    }

    fn fit(&mut self, x: &Array2<f64>, params: &FitParams, rng: &mut StdRng) -> Result<(), TrainError> {
        if x.nrows() < 2 {
            return Err(TrainError::NotEnoughDistinctSamples { needed: 2, got: x.nrows() });
        }
        self.reference = reference_sample(x, params.max_reference_samples, rng);
        self.k = self.n_neighbors.min(self.reference.nrows() - 1).max(1);

        // Leave-one-out on the reference rows
        let train: Vec<f64> = self
            .reference
            .outer_iter()
            .enumerate()
            .map(|(i, row)| nearest(&self.reference, row, self.k, Some(i)).last().map(|p| p.1).unwrap_or(0.0))
            .collect();
        self.threshold = intrinsic_threshold(&train, params.contamination);
        Ok(())
    }

    fn score(&self, x: &Array2<f64>) -> Array1<f64> {
        x.outer_iter()
            .map(|row| nearest(&self.reference, row, self.k, None).last().map(|p| p.1).unwrap_or(0.0))
            .collect()
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;

    #[test]
    fn far_point_has_largest_distance() {
        let x = array![[0.0], [0.1], [0.2], [0.3], [0.4], [0.5], [0.6], [9.0]];
        let mut m = KnnDetector {
            n_neighbors: 2,
            ..Default::default()
        };
        m.fit(&x, &FitParams::default(), &mut StdRng::seed_from_u64(1)).unwrap();
        let s = m.score(&array![[0.25], [20.0]]);
        assert!(s[1] > s[0]);
        assert!(m.label(&array![[20.0]])[0]);
    }
}
