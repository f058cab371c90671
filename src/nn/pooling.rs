//! Weighted softmax attention pooling.
//!
//! Reduces the rows of each segment to a single row:
//!
//! ```text
//! a_r   = gate(x_r) − max_{r' ∈ seg(r)} gate(x_r')
//! u_r   = w_r · exp(a_r)
//! c_r   = u_r / (Σ_{r' ∈ seg(r)} u_r' + ε)
//! out_s = Σ_{r ∈ s} c_r · x_r
//! ```
//!
//! The per-segment max subtraction keeps `exp` finite for large logits and is
//! exact because the softmax is shift invariant within a segment. With a
//! constant gate the pool reduces to a weighted mean.

use ndarray::{Array1, Array2, Axis};

use crate::config::ATTENTION_EPS;
use crate::error::{ensure_len, Result, SampnnError};
use crate::kernels::segment::{Reduction, SegmentIndex};
use crate::nn::linear::FeedForward;

/// Attention pool owning its gate network.
pub struct GlobalAttentionPool {
    gate: Box<dyn FeedForward>,
}

impl GlobalAttentionPool {
    /// The gate must map each row to exactly one logit.
    pub fn new(gate: Box<dyn FeedForward>) -> Result<Self> {
        if gate.out_dim() != 1 {
            return Err(SampnnError::InvalidConfig(format!(
                "attention gate must output one logit per row, got width {}",
                gate.out_dim()
            )));
        }
        Ok(Self { gate })
    }

    pub fn gate(&self) -> &dyn FeedForward {
        self.gate.as_ref()
    }

    /// Attention coefficient of every row; they sum to 1 within each non-empty segment.
    pub fn coefficients(
        &self,
        x: &Array2<f32>,
        index: &SegmentIndex,
        weights: &Array1<f32>,
    ) -> Result<Array1<f32>> {
        ensure_len("attention pool rows", index.num_rows(), x.nrows())?;
        ensure_len("attention pool weights", x.nrows(), weights.len())?;

        let logits = self.gate.forward(x)?;
        if logits.dim() != (x.nrows(), 1) {
            return Err(SampnnError::ShapeMismatch {
                context: "attention gate output",
                expected: (x.nrows(), 1),
                got: logits.dim(),
            });
        }
        segment_softmax(&logits, index, weights)
    }

    /// Pool `x` into one row per segment.
    pub fn forward(
        &self,
        x: &Array2<f32>,
        index: &SegmentIndex,
        weights: &Array1<f32>,
    ) -> Result<Array2<f32>> {
        let coeff = self.coefficients(x, index, weights)?;
        let weighted = x * &coeff.view().insert_axis(Axis(1));
        index.reduce_auto(&weighted, Reduction::Sum)
    }

    pub fn param_count(&self) -> usize {
        self.gate.param_count()
    }
}

/// Weighted softmax of `[R, 1]` logits within each segment.
///
/// The segment max runs over every row, weighted or not. A zero weight only
/// zeroes that row's numerator.
pub fn segment_softmax(
    logits: &Array2<f32>,
    index: &SegmentIndex,
    weights: &Array1<f32>,
) -> Result<Array1<f32>> {
    ensure_len("segment softmax logits", index.num_rows(), logits.nrows())?;
    ensure_len("segment softmax weights", index.num_rows(), weights.len())?;
    ensure_len("segment softmax logit width", 1, logits.ncols())?;
    if let Some((row, &value)) = weights
        .iter()
        .enumerate()
        .find(|(_, w)| !w.is_finite() || **w < 0.0)
    {
        return Err(SampnnError::InvalidWeight { row, value });
    }

    let seg_max = index.gather(&index.reduce_auto(logits, Reduction::Max)?)?;
    let unnorm = Array1::from_shape_fn(weights.len(), |r| {
        weights[r] * (logits[[r, 0]] - seg_max[[r, 0]]).exp()
    });
    let seg_sum = index.reduce_auto(&unnorm.view().insert_axis(Axis(1)).to_owned(), Reduction::Sum)?;
    let denom = index
        .gather(&seg_sum)?
        .column(0)
        .mapv(|s| s + ATTENTION_EPS);

    Ok(unnorm / &denom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::linear::Linear;
    use ndarray::array;

    fn linear_gate(w: [f32; 2], bias: f32) -> Box<dyn FeedForward> {
        Box::new(Linear {
            weight: array![[w[0], w[1]]],
            bias: array![bias],
        })
    }

    fn sample() -> (Array2<f32>, SegmentIndex, Array1<f32>) {
        let x = array![
            [1.0, 0.0],
            [0.5, 2.0],
            [-1.0, 3.0],
            [2.0, 2.0],
            [0.0, -1.0],
        ];
        let index = SegmentIndex::new(vec![0, 0, 1, 1, 1], 2).unwrap();
        let w = array![1.0, 2.0, 0.5, 1.0, 3.0];
        (x, index, w)
    }

    /// Gate with the wrong output row count.
    struct BadGate;

    impl FeedForward for BadGate {
        fn forward(&self, _x: &Array2<f32>) -> Result<Array2<f32>> {
            Ok(Array2::zeros((1, 1)))
        }
        fn in_dim(&self) -> usize {
            2
        }
        fn out_dim(&self) -> usize {
            1
        }
        fn param_count(&self) -> usize {
            0
        }
    }

    #[test]
    fn test_coefficients_sum_to_one() {
        let (x, index, w) = sample();
        let pool = GlobalAttentionPool::new(linear_gate([0.7, -0.3], 0.1)).unwrap();
        let coeff = pool.coefficients(&x, &index, &w).unwrap();

        for s in 0..index.num_segments() {
            let total: f32 = index.members(s).iter().map(|&r| coeff[r]).sum();
            assert!((total - 1.0).abs() < 1e-6, "segment {} sums to {}", s, total);
        }
        assert!(coeff.iter().all(|&c| (0.0..=1.0).contains(&c)));
    }

    #[test]
    fn test_output_shape() {
        let (x, index, w) = sample();
        let pool = GlobalAttentionPool::new(linear_gate([1.0, 1.0], 0.0)).unwrap();
        let out = pool.forward(&x, &index, &w).unwrap();
        assert_eq!(out.dim(), (2, 2));
    }

    #[test]
    fn test_shift_invariance() {
        let (x, index, w) = sample();
        let base = GlobalAttentionPool::new(linear_gate([0.4, 0.9], 0.0)).unwrap();
        let shifted = GlobalAttentionPool::new(linear_gate([0.4, 0.9], 50.0)).unwrap();

        let a = base.forward(&x, &index, &w).unwrap();
        let b = shifted.forward(&x, &index, &w).unwrap();
        for (u, v) in a.iter().zip(b.iter()) {
            assert!((u - v).abs() < 1e-4, "{} vs {}", u, v);
        }
    }

    #[test]
    fn test_large_logits_stay_finite() {
        let (x, index, w) = sample();
        let pool = GlobalAttentionPool::new(linear_gate([100.0, 100.0], 1e4)).unwrap();
        let coeff = pool.coefficients(&x, &index, &w).unwrap();
        let out = pool.forward(&x, &index, &w).unwrap();

        assert!(coeff.iter().all(|c| c.is_finite()));
        assert!(out.iter().all(|v| v.is_finite()));
        for s in 0..2 {
            let total: f32 = index.members(s).iter().map(|&r| coeff[r]).sum();
            assert!((total - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_constant_gate_is_weighted_mean() {
        let (x, index, w) = sample();
        let pool = GlobalAttentionPool::new(linear_gate([0.0, 0.0], 3.0)).unwrap();
        let out = pool.forward(&x, &index, &w).unwrap();
        let mean = index.weighted_mean(&x, &w).unwrap();
        for (u, v) in out.iter().zip(mean.iter()) {
            assert!((u - v).abs() < 1e-5, "{} vs {}", u, v);
        }
    }

    #[test]
    fn test_zero_weight_row_contributes_nothing() {
        let (mut x, index, mut w) = sample();
        w[3] = 0.0;
        x[[3, 0]] = 4.0;
        x[[3, 1]] = -2.0;
        let pool = GlobalAttentionPool::new(linear_gate([0.2, 0.1], 0.0)).unwrap();

        let coeff = pool.coefficients(&x, &index, &w).unwrap();
        assert_eq!(coeff[3], 0.0);

        // Same segment without the zero-weight row.
        let x_drop = array![[1.0, 0.0], [0.5, 2.0], [-1.0, 3.0], [0.0, -1.0]];
        let w_drop = array![1.0, 2.0, 0.5, 3.0];
        let index_drop = SegmentIndex::new(vec![0, 0, 1, 1], 2).unwrap();

        let out = pool.forward(&x, &index, &w).unwrap();
        let expected = pool.forward(&x_drop, &index_drop, &w_drop).unwrap();
        for (u, v) in out.iter().zip(expected.iter()) {
            assert!((u - v).abs() < 1e-5, "{} vs {}", u, v);
        }
    }

    #[test]
    fn test_empty_segment_is_zero_row() {
        let (x, _, w) = sample();
        let index = SegmentIndex::new(vec![0, 0, 2, 2, 2], 3).unwrap();
        let pool = GlobalAttentionPool::new(linear_gate([1.0, -1.0], 0.0)).unwrap();
        let out = pool.forward(&x, &index, &w).unwrap();
        assert_eq!(out.nrows(), 3);
        assert!(out.row(1).iter().all(|&v| v == 0.0));
        assert!(out.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_all_zero_weights_bounded() {
        let (x, index, _) = sample();
        let w = Array1::zeros(5);
        let pool = GlobalAttentionPool::new(linear_gate([1.0, 0.0], 0.0)).unwrap();
        let out = pool.forward(&x, &index, &w).unwrap();
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_negative_weight_rejected() {
        let (x, index, mut w) = sample();
        w[1] = -0.5;
        let pool = GlobalAttentionPool::new(linear_gate([1.0, 0.0], 0.0)).unwrap();
        assert!(matches!(
            pool.forward(&x, &index, &w),
            Err(SampnnError::InvalidWeight { row: 1, .. })
        ));
    }

    #[test]
    fn test_gate_width_rejected() {
        let gate = Box::new(Linear::zeros(2, 3));
        assert!(matches!(
            GlobalAttentionPool::new(gate),
            Err(SampnnError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_gate_row_count_checked() {
        let (x, index, w) = sample();
        let pool = GlobalAttentionPool::new(Box::new(BadGate)).unwrap();
        assert!(matches!(
            pool.forward(&x, &index, &w),
            Err(SampnnError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_weight_length_checked() {
        let (x, index, _) = sample();
        let pool = GlobalAttentionPool::new(linear_gate([1.0, 0.0], 0.0)).unwrap();
        let w = array![1.0, 1.0];
        assert!(matches!(
            pool.forward(&x, &index, &w),
            Err(SampnnError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_zero_weight_row_still_sets_segment_max() {
        let logits = array![[100.0], [0.0]];
        let index = SegmentIndex::new(vec![0, 0], 1).unwrap();
        let w = array![0.0, 1.0];
        let c = segment_softmax(&logits, &index, &w).unwrap();

        // e^-100 / (e^-100 + ε)
        assert_eq!(c[0], 0.0);
        assert!(c[1] < 1e-20, "coefficient {} should vanish", c[1]);

        let near = array![[2.0], [0.0]];
        let c = segment_softmax(&near, &index, &w).unwrap();
        assert_eq!(c[0], 0.0);
        assert!((c[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_shift_within_one_segment() {
        let logits = array![[0.3], [1.2], [-0.5], [2.0], [0.1]];
        let index = SegmentIndex::new(vec![0, 0, 1, 1, 1], 2).unwrap();
        let w = array![1.0, 2.0, 0.5, 1.0, 3.0];

        let mut shifted = logits.clone();
        shifted[[0, 0]] += 7.0;
        shifted[[1, 0]] += 7.0;

        let a = segment_softmax(&logits, &index, &w).unwrap();
        let b = segment_softmax(&shifted, &index, &w).unwrap();
        for r in [0, 1] {
            assert!((a[r] - b[r]).abs() < 1e-6, "row {}: {} vs {}", r, a[r], b[r]);
        }
        for r in [2, 3, 4] {
            assert_eq!(a[r], b[r]);
        }
    }

    #[test]
    fn test_segment_softmax_explicit_logits() {
        let logits = array![[0.0], [2.0_f32.ln()], [5.0]];
        let index = SegmentIndex::new(vec![0, 0, 1], 2).unwrap();
        let w = array![1.0, 1.0, 4.0];
        let c = segment_softmax(&logits, &index, &w).unwrap();
        assert!((c[0] - 1.0 / 3.0).abs() < 1e-6);
        assert!((c[1] - 2.0 / 3.0).abs() < 1e-6);
        assert!((c[2] - 1.0).abs() < 1e-6);
    }
}
