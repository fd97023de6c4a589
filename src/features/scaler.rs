//! Zero-mean / unit-variance scaling fitted once per training call.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Array1<f64>,
    /// Population std per column; zero-variance columns use 1.0
    pub scale: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(x: &Array2<f64>) -> Self {
        let n_cols = x.ncols();
        if x.nrows() == 0 {
            return Self {
                mean: Array1::zeros(n_cols),
                scale: Array1::ones(n_cols),
            };
        }
        let mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(n_cols));
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s.is_finite() && s > f64::EPSILON { s } else { 1.0 });
        Self { mean, scale }
    }

    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        (x - &self.mean) / &self.scale
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn centers_and_scales_columns() {
        let x = array![[1.0, 5.0], [3.0, 5.0]];
        let s = StandardScaler::fit(&x);
        let t = s.transform(&x);
        assert_eq!(t, array![[-1.0, 0.0], [1.0, 0.0]]);
        assert_eq!(s.scale[1], 1.0);
    }
}
