//! Isolation forest: random axis-aligned splits; short average paths mean outliers.

use super::{intrinsic_threshold, Estimator, FitParams, ModelKind};
use crate::error::TrainError;
use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Split {
        feature: usize,
        value: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        size: usize,
    },
}

/// Arena-allocated tree, root at index 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn build(x: &Array2<f64>, rows: Vec<usize>, height_limit: usize, rng: &mut StdRng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(x, rows, 0, height_limit, rng);
        tree
    }

    fn grow(&mut self, x: &Array2<f64>, rows: Vec<usize>, depth: usize, height_limit: usize, rng: &mut StdRng) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { size: rows.len() });
        if rows.len() <= 1 || depth >= height_limit {
            return id;
        }

        // Only features that still vary inside this node can isolate anything.
        let splittable: Vec<(usize, f64, f64)> = (0..x.ncols())
            .filter_map(|f| {
                let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                    let v = x[[r, f]];
                    (lo.min(v), hi.max(v))
                });
                (hi > lo).then_some((f, lo, hi))
            })
            .collect();
        if splittable.is_empty() {
            return id;
        }

        let (feature, lo, hi) = splittable[rng.gen_range(0..splittable.len())];
        let value = rng.gen_range(lo..hi);
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows.into_iter().partition(|&r| x[[r, feature]] <= value);

        let left = self.grow(x, left_rows, depth + 1, height_limit, rng);
        let right = self.grow(x, right_rows, depth + 1, height_limit, rng);
        self.nodes[id] = Node::Split {
            feature,
            value,
            left,
            right,
        };
        id
    }

    fn path_length(&self, point: ArrayView1<f64>) -> f64 {
        let mut id = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split {
                    feature,
                    value,
                    left,
                    right,
                } => {
                    id = if point[*feature] <= *value { *left } else { *right };
                    depth += 1.0;
                }
            }
        }
    }
}

/// Average unsuccessful-search path length in a BST of `n` nodes
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    pub n_trees: usize,
    pub max_samples: usize,
    sample_size: usize,
    trees: Vec<IsolationTree>,
    threshold: f64,
}

impl Default for IsolationForest {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_samples: 256,
            sample_size: 0,
            trees: Vec::new(),
            threshold: 0.0,
        }
    }
}

impl Estimator for IsolationForest {
    fn kind(&self) -> ModelKind {
        ModelKind::Iforest
    }

    fn fit(&mut self, x: &Array2<f64>, params: &FitParams, rng: &mut StdRng) -> Result<(), TrainError> {
        let n = x.nrows();
        if n < 2 {
            return Err(TrainError::NotEnoughDistinctSamples { needed: 2, got: n });
        }
        self.sample_size = self.max_samples.min(n);
        let height_limit = (self.sample_size as f64).log2().ceil() as usize;
        self.trees = (0..self.n_trees)
            .map(|_| {
                let rows = rand::seq::index::sample(rng, n, self.sample_size).into_vec();
                IsolationTree::build(x, rows, height_limit, rng)
            })
            .collect();
        let train = self.score(x);
        self.threshold = intrinsic_threshold(train.as_slice().unwrap_or(&[]), params.contamination);
        Ok(())
    }

    /// `2^(-E[h] / c(psi)) - 0.5`: positive leans anomalous
    fn score(&self, x: &Array2<f64>) -> Array1<f64> {
        let c = average_path_length(self.sample_size);
        if self.trees.is_empty() || c <= 0.0 {
            return Array1::zeros(x.nrows());
        }
        x.outer_iter()
            .map(|row| {
                let mean = self.trees.iter().map(|t| t.path_length(row)).sum::<f64>() / self.trees.len() as f64;
                2f64.powf(-mean / c) - 0.5
            })
            .collect()
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn cluster_with_outlier() -> Array2<f64> {
        let mut x = Array2::<f64>::zeros((11, 3));
        x[[10, 0]] = 8.0;
        x[[10, 2]] = -6.0;
        x
    }

    #[test]
    fn isolated_point_scores_highest_and_alone_above_threshold() {
        let x = cluster_with_outlier();
        let mut m = IsolationForest::default();
        m.fit(&x, &FitParams::default(), &mut StdRng::seed_from_u64(42)).unwrap();
        let s = m.score(&x);
        let labels = m.label(&x);
        assert!(s[10] > 0.12);
        assert!(s.iter().take(10).all(|v| *v < s[10]));
        assert_eq!(labels.iter().filter(|l| **l).count(), 1);
        assert!(labels[10]);
    }

    #[test]
    fn same_seed_same_forest() {
        let x = cluster_with_outlier();
        let mut a = IsolationForest::default();
        let mut b = IsolationForest::default();
        a.fit(&x, &FitParams::default(), &mut StdRng::seed_from_u64(7)).unwrap();
        b.fit(&x, &FitParams::default(), &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn path_length_constants() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        assert!((average_path_length(256) - 10.2448).abs() < 1e-3);
    }
}
