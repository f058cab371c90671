//! Dense layers and the feed-forward networks used as gates and output heads.

use ndarray::{Array1, Array2};
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

use crate::config::LEAKY_RELU_SLOPE;
use crate::error::{Result, SampnnError};
use crate::nn::activation::leaky_relu;

/// A row-wise map from `in_dim`-wide rows to `out_dim`-wide rows.
///
/// Gate networks (`out_dim == 1`) and optional output heads are both passed
/// around as `Box<dyn FeedForward>`.
pub trait FeedForward: Send + Sync {
    /// Apply to every row of `x` ([rows, in_dim] → [rows, out_dim]).
    fn forward(&self, x: &Array2<f32>) -> Result<Array2<f32>>;

    fn in_dim(&self) -> usize;

    fn out_dim(&self) -> usize;

    fn param_count(&self) -> usize;
}

/// Affine layer: `y = x · Wᵀ + b`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Linear {
    /// Weight matrix: W ∈ R^{out × in}
    pub weight: Array2<f32>,

    /// Bias: b ∈ R^{out}
    pub bias: Array1<f32>,
}

impl Linear {
    pub fn zeros(in_dim: usize, out_dim: usize) -> Self {
        Self {
            weight: Array2::zeros((out_dim, in_dim)),
            bias: Array1::zeros(out_dim),
        }
    }

    /// Weights and bias drawn from U(-1/√in, 1/√in).
    pub fn init<R: Rng + ?Sized>(in_dim: usize, out_dim: usize, rng: &mut R) -> Self {
        let bound = 1.0 / (in_dim.max(1) as f32).sqrt();
        let dist = Uniform::new_inclusive(-bound, bound);
        let weight = Array2::from_shape_fn((out_dim, in_dim), |_| dist.sample(&mut *rng));
        let bias = Array1::from_shape_fn(out_dim, |_| dist.sample(&mut *rng));
        Self { weight, bias }
    }
}

impl FeedForward for Linear {
    fn forward(&self, x: &Array2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.in_dim() {
            return Err(SampnnError::ShapeMismatch {
                context: "linear input",
                expected: (x.nrows(), self.in_dim()),
                got: x.dim(),
            });
        }
        Ok(x.dot(&self.weight.t()) + &self.bias)
    }

    fn in_dim(&self) -> usize {
        self.weight.ncols()
    }

    fn out_dim(&self) -> usize {
        self.weight.nrows()
    }

    fn param_count(&self) -> usize {
        self.weight.len() + self.bias.len()
    }
}

/// Fully connected network: hidden `Linear` + LeakyReLU blocks, then a final `Linear`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Mlp {
    pub hidden: Vec<Linear>,
    pub output: Linear,
    pub negative_slope: f32,
}

impl Mlp {
    pub fn new<R: Rng + ?Sized>(
        in_dim: usize,
        hidden_dims: &[usize],
        out_dim: usize,
        rng: &mut R,
    ) -> Self {
        let mut hidden = Vec::with_capacity(hidden_dims.len());
        let mut width = in_dim;
        for &h in hidden_dims {
            hidden.push(Linear::init(width, h, rng));
            width = h;
        }
        Self {
            hidden,
            output: Linear::init(width, out_dim, rng),
            negative_slope: LEAKY_RELU_SLOPE,
        }
    }

    /// A scalar-logit gate: `in_dim → hidden… → 1`.
    pub fn gate<R: Rng + ?Sized>(in_dim: usize, hidden_dims: &[usize], rng: &mut R) -> Self {
        Self::new(in_dim, hidden_dims, 1, rng)
    }
}

impl FeedForward for Mlp {
    fn forward(&self, x: &Array2<f32>) -> Result<Array2<f32>> {
        let slope = self.negative_slope;
        let mut h = x.to_owned();
        for layer in &self.hidden {
            h = layer.forward(&h)?.mapv(|v| leaky_relu(v, slope));
        }
        self.output.forward(&h)
    }

    fn in_dim(&self) -> usize {
        self.hidden
            .first()
            .map(|l| l.in_dim())
            .unwrap_or_else(|| self.output.in_dim())
    }

    fn out_dim(&self) -> usize {
        self.output.out_dim()
    }

    fn param_count(&self) -> usize {
        self.hidden.iter().map(|l| l.param_count()).sum::<usize>() + self.output.param_count()
    }
}
