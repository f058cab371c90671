//! Batch normalization with running statistics.
//!
//! Running mean/variance are calibration state owned by each layer. They are
//! updated only by [`Mode::Train`] forward passes and read, never written, in
//! [`Mode::Eval`].

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::config::{BN_EPS, BN_MOMENTUM};
use crate::error::{Result, SampnnError};

/// Forward-pass mode, threaded explicitly through every stateful call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Normalize with batch statistics and update the running estimates.
    Train,
    /// Normalize with the frozen running estimates.
    #[default]
    Eval,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Train => write!(f, "train"),
            Mode::Eval => write!(f, "eval"),
        }
    }
}

/// Per-feature batch normalization over rows.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchNorm1d {
    /// Affine scale γ.
    pub gamma: Array1<f32>,

    /// Affine shift β.
    pub beta: Array1<f32>,

    /// Running mean estimate.
    pub running_mean: Array1<f32>,

    /// Running (unbiased) variance estimate.
    pub running_var: Array1<f32>,

    pub momentum: f32,

    pub eps: f32,

    /// Number of training batches folded into the running estimates.
    pub num_batches_tracked: u64,
}

impl BatchNorm1d {
    pub fn new(num_features: usize) -> Self {
        Self {
            gamma: Array1::ones(num_features),
            beta: Array1::zeros(num_features),
            running_mean: Array1::zeros(num_features),
            running_var: Array1::ones(num_features),
            momentum: BN_MOMENTUM,
            eps: BN_EPS,
            num_batches_tracked: 0,
        }
    }

    pub fn num_features(&self) -> usize {
        self.gamma.len()
    }

    pub fn forward(&mut self, x: &Array2<f32>, mode: Mode) -> Result<Array2<f32>> {
        if x.ncols() != self.num_features() {
            return Err(SampnnError::ShapeMismatch {
                context: "batch norm input",
                expected: (x.nrows(), self.num_features()),
                got: x.dim(),
            });
        }

        match mode {
            Mode::Eval => Ok(self.normalize(x, &self.running_mean, &self.running_var)),
            Mode::Train => {
                let n = x.nrows();
                if n < 2 {
                    return Err(SampnnError::InsufficientBatch { rows: n });
                }
                let mean = x
                    .mean_axis(Axis(0))
                    .ok_or(SampnnError::InsufficientBatch { rows: n })?;
                let var = x.var_axis(Axis(0), 0.0);

                let out = self.normalize(x, &mean, &var);

                let m = self.momentum;
                let unbiased = &var * (n as f32 / (n - 1) as f32);
                self.running_mean = &self.running_mean * (1.0 - m) + &mean * m;
                self.running_var = &self.running_var * (1.0 - m) + &unbiased * m;
                self.num_batches_tracked += 1;

                Ok(out)
            }
        }
    }

    fn normalize(&self, x: &Array2<f32>, mean: &Array1<f32>, var: &Array1<f32>) -> Array2<f32> {
        let eps = self.eps;
        let scale = var.mapv(|v| 1.0 / (v + eps).sqrt()) * &self.gamma;
        (x - mean) * &scale + &self.beta
    }

    pub fn param_count(&self) -> usize {
        self.gamma.len() + self.beta.len()
    }
}
