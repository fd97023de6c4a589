//! Cluster-based local outlier factor: k-means, then distance to the nearest
//! large cluster.

use super::{distance, intrinsic_threshold, sq_distance, Estimator, FitParams, ModelKind};
use crate::error::TrainError;
use ndarray::{Array1, Array2, ArrayView1};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const MAX_KMEANS_ITER: usize = 300;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cblof {
    pub n_clusters: usize,
    /// Share of samples the large clusters must cover
    pub alpha: f64,
    /// Size ratio separating large from small clusters
    pub beta: f64,
    centroids: Array2<f64>,
    large: Vec<bool>,
    threshold: f64,
}

impl Default for Cblof {
    fn default() -> Self {
        Self {
            n_clusters: 8,
            alpha: 0.9,
            beta: 5.0,
            centroids: Array2::zeros((0, 0)),
            large: Vec::new(),
            threshold: 0.0,
        }
    }
}

fn distinct_rows(x: &Array2<f64>) -> usize {
    x.outer_iter()
        .map(|r| r.iter().map(|v| v.to_bits()).collect::<Vec<u64>>())
        .collect::<BTreeSet<_>>()
        .len()
}

fn closest(centroids: &Array2<f64>, point: ArrayView1<f64>) -> usize {
    centroids
        .outer_iter()
        .enumerate()
        .map(|(c, row)| (c, sq_distance(row, point)))
        .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
        .0
}

/// k-means++ seeding followed by Lloyd iterations.
fn kmeans(x: &Array2<f64>, k: usize, rng: &mut StdRng) -> (Array2<f64>, Vec<usize>) {
    let n = x.nrows();
    let mut centroids = Array2::<f64>::zeros((k, x.ncols()));
    centroids.row_mut(0).assign(&x.row(rng.gen_range(0..n)));
    for c in 1..k {
        let weights: Vec<f64> = x
            .outer_iter()
            .map(|p| {
                (0..c)
                    .map(|j| sq_distance(centroids.row(j), p))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        let pick = match WeightedIndex::<f64>::new(&weights) {
            Ok(dist) => dist.sample(rng),
            Err(_) => rng.gen_range(0..n),
        };
        centroids.row_mut(c).assign(&x.row(pick));
    }

    let mut labels: Vec<usize> = x.outer_iter().map(|p| closest(&centroids, p)).collect();
    for _ in 0..MAX_KMEANS_ITER {
        let mut sums = Array2::<f64>::zeros((k, x.ncols()));
        let mut counts = vec![0usize; k];
        for (p, &l) in x.outer_iter().zip(&labels) {
            let mut s = sums.row_mut(l);
            s += &p;
            counts[l] += 1;
        }
        for c in 0..k {
            // Empty clusters keep their previous centroid
            if counts[c] > 0 {
                let mean = &sums.row(c) / counts[c] as f64;
                centroids.row_mut(c).assign(&mean);
            }
        }
        let next: Vec<usize> = x.outer_iter().map(|p| closest(&centroids, p)).collect();
        if next == labels {
            break;
        }
        labels = next;
    }
    (centroids, labels)
}

impl Cblof {
    /// Index into the size-sorted cluster list where small clusters begin
    fn large_boundary(&self, sizes_sorted: &[usize], n: usize) -> Option<usize> {
        let mut alpha_hits = Vec::new();
        let mut beta_hits = Vec::new();
        for i in 1..sizes_sorted.len() {
            let covered: usize = sizes_sorted[..i].iter().sum();
            if covered as f64 >= n as f64 * self.alpha {
                alpha_hits.push(i);
            }
            let ratio = sizes_sorted[i - 1] as f64 / sizes_sorted[i] as f64;
            if ratio >= self.beta {
                beta_hits.push(i);
            }
        }
        alpha_hits
            .iter()
            .find(|i| beta_hits.contains(i))
            .or_else(|| alpha_hits.first())
            .or_else(|| beta_hits.first())
            .copied()
    }

    fn score_point(&self, point: ArrayView1<f64>) -> f64 {
        let own = closest(&self.centroids, point);
        if self.large.get(own).copied().unwrap_or(false) {
            return distance(self.centroids.row(own), point);
        }
        self.centroids
            .outer_iter()
            .zip(&self.large)
            .filter(|(_, l)| **l)
            .map(|(c, _)| distance(c, point))
            .fold(f64::INFINITY, f64::min)
    }
}

impl Estimator for Cblof {
    fn kind(&self) -> ModelKind {
        ModelKind::Cblof
    }

    fn fit(&mut self, x: &Array2<f64>, params: &FitParams, rng: &mut StdRng) -> Result<(), TrainError> {
        let distinct = distinct_rows(x);
        if distinct < 2 {
            return Err(TrainError::NotEnoughDistinctSamples { needed: 2, got: distinct });
        }
        let k = self.n_clusters.min(distinct);
        let (centroids, labels) = kmeans(x, k, rng);

        let mut sizes = vec![0usize; k];
        for l in &labels {
            sizes[*l] += 1;
        }
        let mut order: Vec<usize> = (0..k).collect();
        order.sort_by(|a, b| sizes[*b].cmp(&sizes[*a]).then(a.cmp(b)));
        let sorted_sizes: Vec<usize> = order.iter().map(|c| sizes[*c]).collect();
        let boundary = self
            .large_boundary(&sorted_sizes, x.nrows())
            .ok_or_else(|| TrainError::Degenerate("could not separate small and large clusters".to_string()))?;

        let mut large = vec![false; k];
        for c in &order[..boundary] {
            large[*c] = true;
        }
        self.centroids = centroids;
        self.large = large;

        let train = self.score(x);
        self.threshold = intrinsic_threshold(train.as_slice().unwrap_or(&[]), params.contamination);
        Ok(())
    }

    fn score(&self, x: &Array2<f64>) -> Array1<f64> {
        x.outer_iter().map(|row| self.score_point(row)).collect()
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }
}
