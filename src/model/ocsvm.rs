//! One-class SVM with an RBF kernel, solved on the dual with pairwise (SMO) updates.

use super::{intrinsic_threshold, reference_sample, sq_distance, Estimator, FitParams, ModelKind};
use crate::error::TrainError;
use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

const TOLERANCE: f64 = 1e-3;
const TAU: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneClassSvm {
    /// Upper bound on the outlier share, lower bound on the support-vector share
    pub nu: f64,
    gamma: f64,
    support: Array2<f64>,
    /// Dual coefficients normalized to sum to 1
    alpha: Vec<f64>,
    rho: f64,
    threshold: f64,
}

impl Default for OneClassSvm {
    fn default() -> Self {
        Self {
            nu: 0.5,
            gamma: 0.0,
            support: Array2::zeros((0, 0)),
            alpha: Vec::new(),
            rho: 0.0,
            threshold: 0.0,
        }
    }
}

fn rbf(gamma: f64, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    (-gamma * sq_distance(a, b)).exp()
}

impl OneClassSvm {
    /// Solve `min ½αᵀKα` s.t. `0 ≤ αᵢ ≤ 1`, `Σα = νn`. Returns (α, gradient).
    fn solve(&self, k: &Array2<f64>) -> Result<(Vec<f64>, Vec<f64>), TrainError> {
        let n = k.nrows();
        let total = self.nu * n as f64;
        let full = total.floor() as usize;
        let mut alpha = vec![0.0; n];
        for a in alpha.iter_mut().take(full.min(n)) {
            *a = 1.0;
        }
        if full < n {
            alpha[full] = total - full as f64;
        }
        let mut grad: Vec<f64> = (0..n).map(|i| (0..n).map(|j| k[[i, j]] * alpha[j]).sum()).collect();

        let max_iter = (100 * n).max(10_000);
        for _ in 0..max_iter {
            // i can grow, j can shrink
            let mut i = usize::MAX;
            let mut j = usize::MAX;
            for t in 0..n {
                if alpha[t] < 1.0 && (i == usize::MAX || grad[t] < grad[i]) {
                    i = t;
                }
                if alpha[t] > 0.0 && (j == usize::MAX || grad[t] > grad[j]) {
                    j = t;
                }
            }
            if i == usize::MAX || j == usize::MAX || grad[j] - grad[i] < TOLERANCE {
                return Ok((alpha, grad));
            }
            let eta = (k[[i, i]] + k[[j, j]] - 2.0 * k[[i, j]]).max(TAU);
            let room_i = 1.0 - alpha[i];
            let room_j = alpha[j];
            let delta = ((grad[j] - grad[i]) / eta).min(room_i).min(room_j);
            // Land exactly on the bounds so clipped coefficients leave the working set.
            alpha[i] = if delta == room_i { 1.0 } else { alpha[i] + delta };
            alpha[j] = if delta == room_j { 0.0 } else { alpha[j] - delta };
            for (t, g) in grad.iter_mut().enumerate() {
                *g += delta * (k[[t, i]] - k[[t, j]]);
            }
        }
        Err(TrainError::NotConverged(max_iter))
    }

    fn offset(alpha: &[f64], grad: &[f64]) -> f64 {
        let free: Vec<f64> = alpha
            .iter()
            .zip(grad)
            .filter(|(a, _)| **a > 0.0 && **a < 1.0)
            .map(|(_, g)| *g)
            .collect();
        if !free.is_empty() {
            return free.iter().sum::<f64>() / free.len() as f64;
        }
        let lower = alpha
            .iter()
            .zip(grad)
            .filter(|(a, _)| **a >= 1.0)
            .map(|(_, g)| *g)
            .fold(f64::NEG_INFINITY, f64::max);
        let upper = alpha
            .iter()
            .zip(grad)
            .filter(|(a, _)| **a <= 0.0)
            .map(|(_, g)| *g)
            .fold(f64::INFINITY, f64::min);
        match (lower.is_finite(), upper.is_finite()) {
            (true, true) => (lower + upper) / 2.0,
            (true, false) => lower,
            (false, true) => upper,
            (false, false) => 0.0,
        }
    }

    fn score_point(&self, point: ArrayView1<f64>) -> f64 {
        let kernel_sum: f64 = self
            .support
            .outer_iter()
            .zip(&self.alpha)
            .map(|(sv, a)| a * rbf(self.gamma, sv, point))
            .sum();
        self.rho - kernel_sum
    }
}

impl Estimator for OneClassSvm {
    fn kind(&self) -> ModelKind {
        ModelKind::Ocsvm
    }

    fn fit(&mut self, x: &Array2<f64>, params: &FitParams, rng: &mut StdRng) -> Result<(), TrainError> {
        if x.nrows() < 2 || x.ncols() == 0 {
            return Err(TrainError::NotEnoughDistinctSamples { needed: 2, got: x.nrows() });
        }
        let reference = reference_sample(x, params.max_reference_samples, rng);
        let n = reference.nrows();
        self.gamma = 1.0 / x.ncols() as f64;

        let mut k = Array2::<f64>::zeros((n, n));
        for i in 0..n {
            for j in i..n {
                let v = rbf(self.gamma, reference.row(i), reference.row(j));
                k[[i, j]] = v;
                k[[j, i]] = v;
            }
        }
        let (alpha, grad) = self.solve(&k)?;
        let total: f64 = alpha.iter().sum();
        if total <= 0.0 {
            return Err(TrainError::Degenerate("all dual coefficients vanished".to_string()));
        }
        let rho = Self::offset(&alpha, &grad);

        let support_idx: Vec<usize> = (0..n).filter(|i| alpha[*i] > 0.0).collect();
        self.support = reference.select(ndarray::Axis(0), &support_idx);
        self.alpha = support_idx.iter().map(|i| alpha[*i] / total).collect();
        self.rho = rho / total;

        let train: Vec<f64> = grad.iter().map(|g| (rho - g) / total).collect();
        self.threshold = intrinsic_threshold(&train, params.contamination);
        Ok(())
    }

    /// `ρ - Σ αᵢ K(svᵢ, x)`: positive means outside the learned region
    fn score(&self, x: &Array2<f64>) -> Array1<f64> {
        x.outer_iter().map(|row| self.score_point(row)).collect()
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
    fn points_far_from_support_score_higher() {
        let x = array![
            [0.0, 0.0],
            [0.1, 0.0],
            [0.0, 0.1],
            [0.1, 0.1],
            [-0.1, 0.0],
            [0.0, -0.1],
            [0.05, 0.05],
            [-0.05, -0.05]
        ];
        let mut m = OneClassSvm::default();
        m.fit(&x, &FitParams::default(), &mut StdRng::seed_from_u64(5)).unwrap();
        let s = m.score(&array![[0.0, 0.0], [4.0, 4.0]]);
        assert!(s[1] > s[0]);
        assert!(m.label(&array![[4.0, 4.0]])[0]);
        let total: f64 = m.alpha.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }
}
