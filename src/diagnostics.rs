//! Health checks for feature matrices and batch-norm calibration state.
//!
//! Empty segments pool to exact zero rows and overflow shows up as non-finite
//! values, so both are counted here and folded into a [`HealthStatus`].

use ndarray::Array2;

use crate::nn::composition::CompositionNet;
use crate::nn::norm::BatchNorm1d;

/// Health status levels.
#[derive(Clone, Debug, PartialEq)]
pub enum HealthStatus {
    /// All values finite, no degenerate rows.
    Healthy,
    /// Usable, but some rows are all zero.
    Degraded(String),
    /// Non-finite values present.
    Critical(String),
}

/// Summary of an `[rows, cols]` feature matrix.
#[derive(Clone, Debug)]
pub struct FeatureSummary {
    pub rows: usize,
    pub cols: usize,

    /// NaN or infinite entries.
    pub non_finite: usize,

    /// Rows whose entries are all exactly zero.
    pub zero_rows: usize,

    /// Mean L2 norm over rows (finite entries only).
    pub mean_row_norm: f32,

    /// Largest absolute finite entry.
    pub max_abs: f32,
}

impl FeatureSummary {
    pub fn from_features(x: &Array2<f32>) -> Self {
        let mut non_finite = 0;
        let mut zero_rows = 0;
        let mut norm_sum = 0.0f32;
        let mut max_abs = 0.0f32;

        for row in x.rows() {
            let mut sq = 0.0f32;
            let mut all_zero = true;
            for &v in row.iter() {
                if !v.is_finite() {
                    non_finite += 1;
                    all_zero = false;
                    continue;
                }
                if v != 0.0 {
                    all_zero = false;
                }
                sq += v * v;
                max_abs = max_abs.max(v.abs());
            }
            if all_zero {
                zero_rows += 1;
            }
            norm_sum += sq.sqrt();
        }

        let mean_row_norm = if x.nrows() == 0 {
            0.0
        } else {
            norm_sum / x.nrows() as f32
        };

        Self {
            rows: x.nrows(),
            cols: x.ncols(),
            non_finite,
            zero_rows,
            mean_row_norm,
            max_abs,
        }
    }

    pub fn status(&self) -> HealthStatus {
        if self.non_finite > 0 {
            return HealthStatus::Critical(format!(
                "{} non-finite values in {}x{} features",
                self.non_finite, self.rows, self.cols
            ));
        }
        if self.zero_rows > 0 {
            return HealthStatus::Degraded(format!(
                "{} of {} rows are all zero",
                self.zero_rows, self.rows
            ));
        }
        HealthStatus::Healthy
    }
}

/// Running statistics of one batch norm.
#[derive(Clone, Debug)]
pub struct NormSnapshot {
    /// Message layer index.
    pub layer: usize,

    /// `"filter"` or `"core"`.
    pub name: &'static str,

    pub batches_tracked: u64,
    pub mean_of_running_mean: f32,
    pub mean_of_running_var: f32,
    pub min_running_var: f32,
}

impl NormSnapshot {
    fn new(layer: usize, name: &'static str, bn: &BatchNorm1d) -> Self {
        let n = bn.num_features().max(1) as f32;
        Self {
            layer,
            name,
            batches_tracked: bn.num_batches_tracked,
            mean_of_running_mean: bn.running_mean.sum() / n,
            mean_of_running_var: bn.running_var.sum() / n,
            min_running_var: bn
                .running_var
                .iter()
                .copied()
                .fold(f32::INFINITY, f32::min),
        }
    }

    /// Still at the initial `mean = 0, var = 1` calibration.
    pub fn is_uncalibrated(&self) -> bool {
        self.batches_tracked == 0
    }
}

/// Snapshot every batch norm in the network, layer by layer.
pub fn norm_snapshots(net: &CompositionNet) -> Vec<NormSnapshot> {
    net.layers()
        .iter()
        .enumerate()
        .flat_map(|(i, layer)| {
            let [filter, core] = layer.norms();
            [
                NormSnapshot::new(i, "filter", filter),
                NormSnapshot::new(i, "core", core),
            ]
        })
        .collect()
}

/// Worst status among the inputs.
pub fn overall_status(checks: &[HealthStatus]) -> HealthStatus {
    for check in checks {
        if matches!(check, HealthStatus::Critical(_)) {
            return check.clone();
        }
    }
    for check in checks {
        if matches!(check, HealthStatus::Degraded(_)) {
            return check.clone();
        }
    }
    HealthStatus::Healthy
}
