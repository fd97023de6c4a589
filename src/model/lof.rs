//! Local outlier factor: density of a point relative to its neighbors' density.

use super::{intrinsic_threshold, nearest, reference_sample, Estimator, FitParams, ModelKind};
use crate::error::TrainError;
use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Keeps reachability densities finite on duplicated points
const DENSITY_EPS: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalOutlierFactor {
    pub n_neighbors: usize,
    k: usize,
    reference: Array2<f64>,
    k_distance: Vec<f64>,
    lrd: Vec<f64>,
    threshold: f64,
}

impl Default for LocalOutlierFactor {
    fn default() -> Self {
        Self {
            n_neighbors: 20,
            k: 0,
            reference: Array2::zeros((0, 0)),
            k_distance: Vec::new(),
            lrd: Vec::new(),
            threshold: 0.0,
        }
    }
}

impl LocalOutlierFactor {
    fn local_density(&self, neighbors: &[(usize, f64)]) -> f64 {
        if neighbors.is_empty() {
            return 0.0;
        }
        let reach: f64 = neighbors.iter().map(|(o, d)| d.max(self.k_distance[*o])).sum::<f64>() / neighbors.len() as f64;
        1.0 / (reach + DENSITY_EPS)
    }

    fn factor(&self, neighbors: &[(usize, f64)], own_density: f64) -> f64 {
        if neighbors.is_empty() || own_density <= 0.0 {
            return 0.0;
        }
        let mean_neighbor_density = neighbors.iter().map(|(o, _)| self.lrd[*o]).sum::<f64>() / neighbors.len() as f64;
        mean_neighbor_density / own_density
    }

    fn score_point(&self, point: ArrayView1<f64>) -> f64 {
        let nn = nearest(&self.reference, point, self.k, None);
        let density = self.local_density(&nn);
        self.factor(&nn, density)
    }
}

impl Estimator for LocalOutlierFactor {
    fn kind(&self) -> ModelKind {
        ModelKind::Lof
    }

    fn fit(&mut self, x: &Array2<f64>, params: &FitParams, rng: &mut StdRng) -> Result<(), TrainError> {
        if x.nrows() < 2 {
            return Err(TrainError::NotEnoughDistinctSamples { needed: 2, got: x.nrows() });
        }
        self.reference = reference_sample(x, params.max_reference_samples, rng);
        self.k = self.n_neighbors.min(self.reference.nrows() - 1).max(1);

        let neighborhoods: Vec<Vec<(usize, f64)>> = self
            .reference
            .outer_iter()
            .enumerate()
            .map(|(i, row)| nearest(&self.reference, row, self.k, Some(i)))
            .collect();
        self.k_distance = neighborhoods.iter().map(|n| n.last().map(|p| p.1).unwrap_or(0.0)).collect();
        self.lrd = neighborhoods.iter().map(|n| self.local_density(n)).collect();

        let train: Vec<f64> = neighborhoods
            .iter()
            .zip(self.lrd.iter())
            .map(|(n, d)| self.factor(n, *d))
            .collect();
        if train.iter().any(|v| !v.is_finite()) {
            return Err(TrainError::Degenerate("non-finite outlier factor".to_string()));
        }
        self.threshold = intrinsic_threshold(&train, params.contamination);
        Ok(())
    }

    fn score(&self, x: &Array2<f64>) -> Array1<f64> {
        x.outer_iter().map(|row| self.score_point(row)).collect()
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }
}
