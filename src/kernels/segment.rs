//! Segment (scatter) reductions over row-indexed batches.
//!
//! A segment index assigns every row of a matrix to one of `S` segments:
//! bonds to their owning atom, or atoms to their crystal. Reductions produce
//! one row per segment, gather-back broadcasts a per-segment row to every
//! member row.
//!
//! Two implementations:
//! 1. `SegmentIndex::reduce` — single pass, accumulates into pre-sized
//!    per-segment buffers
//! 2. `SegmentIndex::reduce_parallel` — rayon over segments, reading rows
//!    through the bucketed (CSR) layout built once at construction
//!
//! Both visit the rows of a segment in ascending row order, so they agree
//! bit-for-bit.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use rayon::prelude::*;

use crate::config::{ATTENTION_EPS, PARALLEL_REDUCE_THRESHOLD};
use crate::error::{ensure_len, Result, SampnnError};

/// Reduction operator applied within each segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reduction {
    Max,
    Sum,
    Mean,
    Product,
}

impl Reduction {
    fn init(self) -> f32 {
        match self {
            Reduction::Max => f32::NEG_INFINITY,
            Reduction::Sum | Reduction::Mean => 0.0,
            Reduction::Product => 1.0,
        }
    }

    /// Value written for segments with no rows.
    pub fn empty_fill(self) -> f32 {
        match self {
            Reduction::Product => 1.0,
            _ => 0.0,
        }
    }
}

impl std::fmt::Display for Reduction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reduction::Max => write!(f, "max"),
            Reduction::Sum => write!(f, "sum"),
            Reduction::Mean => write!(f, "mean"),
            Reduction::Product => write!(f, "product"),
        }
    }
}

/// Validated row → segment assignment with rows bucketed by segment.
#[derive(Clone, Debug)]
pub struct SegmentIndex {
    /// Segment id of every row.
    ids: Vec<usize>,

    /// Number of segments `S`.
    num_segments: usize,

    /// `offsets[s]..offsets[s + 1]` spans segment `s` inside `order`.
    offsets: Vec<usize>,

    /// Row ids sorted by segment, ascending within each segment.
    order: Vec<usize>,
}

impl SegmentIndex {
    /// Bucket `ids` into `num_segments` segments (counting sort, O(R + S)).
    pub fn new(ids: Vec<usize>, num_segments: usize) -> Result<Self> {
        let mut counts = vec![0usize; num_segments];
        for &s in &ids {
            if s >= num_segments {
                return Err(SampnnError::IndexOutOfRange {
                    context: "segment id",
                    index: s,
                    bound: num_segments,
                });
            }
            counts[s] += 1;
        }

        let mut offsets = Vec::with_capacity(num_segments + 1);
        offsets.push(0);
        for c in &counts {
            let last = offsets[offsets.len() - 1];
            offsets.push(last + c);
        }

        let mut cursor = offsets[..num_segments].to_vec();
        let mut order = vec![0usize; ids.len()];
        for (row, &s) in ids.iter().enumerate() {
            order[cursor[s]] = row;
            cursor[s] += 1;
        }

        Ok(Self {
            ids,
            num_segments,
            offsets,
            order,
        })
    }

    pub fn from_slice(ids: &[usize], num_segments: usize) -> Result<Self> {
        Self::new(ids.to_vec(), num_segments)
    }

    /// Segment id of every row.
    pub fn ids(&self) -> &[usize] {
        &self.ids
    }

    pub fn num_rows(&self) -> usize {
        self.ids.len()
    }

    pub fn num_segments(&self) -> usize {
        self.num_segments
    }

    /// Rows belonging to segment `s`, ascending.
    ///
    /// # Panics
    ///
    /// Panics if `s >= num_segments()`.
    pub fn members(&self, s: usize) -> &[usize] {
        &self.order[self.offsets[s]..self.offsets[s + 1]]
    }

    /// Number of rows in segment `s`.
    ///
    /// # Panics
    ///
    /// Panics if `s >= num_segments()`.
    pub fn segment_len(&self, s: usize) -> usize {
        self.offsets[s + 1] - self.offsets[s]
    }

    /// Number of segments with no member rows.
    pub fn empty_segments(&self) -> usize {
        (0..self.num_segments)
            .filter(|&s| self.segment_len(s) == 0)
            .count()
    }

    /// Single-pass reduction into `S` rows.
    pub fn reduce(&self, x: &Array2<f32>, op: Reduction) -> Result<Array2<f32>> {
        ensure_len("segment reduce rows", self.ids.len(), x.nrows())?;

        let mut out = Array2::from_elem((self.num_segments, x.ncols()), op.init());
        for (row, &s) in x.rows().into_iter().zip(self.ids.iter()) {
            let mut acc = out.row_mut(s);
            match op {
                Reduction::Max => acc.zip_mut_with(&row, |a, &b| *a = a.max(b)),
                Reduction::Sum | Reduction::Mean => acc += &row,
                Reduction::Product => acc *= &row,
            }
        }

        for s in 0..self.num_segments {
            let n = self.segment_len(s);
            let mut acc = out.row_mut(s);
            if n == 0 {
                acc.fill(op.empty_fill());
            } else if op == Reduction::Mean {
                acc /= n as f32;
            }
        }
        Ok(out)
    }

    /// Parallel reduction: one rayon task per segment, each owning its output row.
    pub fn reduce_parallel(&self, x: &Array2<f32>, op: Reduction) -> Result<Array2<f32>> {
        ensure_len("segment reduce rows", self.ids.len(), x.nrows())?;

        let width = x.ncols();
        let rows: Vec<Array1<f32>> = (0..self.num_segments)
            .into_par_iter()
            .map(|s| self.reduce_segment(x, s, op))
            .collect();

        let mut out = Array2::zeros((self.num_segments, width));
        for (s, row) in rows.into_iter().enumerate() {
            out.row_mut(s).assign(&row);
        }
        Ok(out)
    }

    /// Serial for small inputs, rayon once the work exceeds
    /// [`PARALLEL_REDUCE_THRESHOLD`].
    pub fn reduce_auto(&self, x: &Array2<f32>, op: Reduction) -> Result<Array2<f32>> {
        if x.len() >= PARALLEL_REDUCE_THRESHOLD && self.num_segments > 1 {
            self.reduce_parallel(x, op)
        } else {
            self.reduce(x, op)
        }
    }

    fn reduce_segment(&self, x: &Array2<f32>, s: usize, op: Reduction) -> Array1<f32> {
        let members = self.members(s);
        if members.is_empty() {
            return Array1::from_elem(x.ncols(), op.empty_fill());
        }

        let mut acc = Array1::from_elem(x.ncols(), op.init());
        for &r in members {
            let row: ArrayView1<f32> = x.row(r);
            match op {
                Reduction::Max => acc.zip_mut_with(&row, |a, &b| *a = a.max(b)),
                Reduction::Sum | Reduction::Mean => acc += &row,
                Reduction::Product => acc *= &row,
            }
        }
        if op == Reduction::Mean {
            acc /= members.len() as f32;
        }
        acc
    }

    /// Gather-back: row `r` of the result is `reduced[ids[r]]`.
    pub fn gather(&self, reduced: &Array2<f32>) -> Result<Array2<f32>> {
        ensure_len("gather-back segments", self.num_segments, reduced.nrows())?;
        Ok(reduced.select(Axis(0), &self.ids))
    }

    /// `Σ w·x / (Σ w + ε)` per segment.
    pub fn weighted_mean(&self, x: &Array2<f32>, weights: &Array1<f32>) -> Result<Array2<f32>> {
        ensure_len("weighted mean weights", self.ids.len(), weights.len())?;

        let w = weights.view().insert_axis(Axis(1));
        let num = self.reduce(&(x * &w), Reduction::Sum)?;
        let den = self
            .reduce(&w.to_owned(), Reduction::Sum)?
            .mapv(|v| v + ATTENTION_EPS);
        Ok(&num / &den)
    }
}

// ──────────────────────────────────────────────────────────────
// One-off helpers (build the index per call)
// ──────────────────────────────────────────────────────────────

pub fn scatter_max(x: &Array2<f32>, ids: &[usize], num_segments: usize) -> Result<Array2<f32>> {
    SegmentIndex::from_slice(ids, num_segments)?.reduce(x, Reduction::Max)
}

pub fn scatter_add(x: &Array2<f32>, ids: &[usize], num_segments: usize) -> Result<Array2<f32>> {
    SegmentIndex::from_slice(ids, num_segments)?.reduce(x, Reduction::Sum)
}

pub fn scatter_mean(x: &Array2<f32>, ids: &[usize], num_segments: usize) -> Result<Array2<f32>> {
    SegmentIndex::from_slice(ids, num_segments)?.reduce(x, Reduction::Mean)
}

pub fn scatter_mul(x: &Array2<f32>, ids: &[usize], num_segments: usize) -> Result<Array2<f32>> {
    SegmentIndex::from_slice(ids, num_segments)?.reduce(x, Reduction::Product)
}

/// Row gather with bounds checking: row `j` of the result is `x[idx[j]]`.
pub fn gather_rows(x: &Array2<f32>, idx: &[usize], context: &'static str) -> Result<Array2<f32>> {
    let bound = x.nrows();
    if let Some(&bad) = idx.iter().find(|&&i| i >= bound) {
        return Err(SampnnError::IndexOutOfRange {
            context,
            index: bad,
            bound,
        });
    }
    Ok(x.select(Axis(0), idx))
}

/// Scalar gather with bounds checking.
pub fn gather_values(v: &Array1<f32>, idx: &[usize], context: &'static str) -> Result<Array1<f32>> {
    let bound = v.len();
    if let Some(&bad) = idx.iter().find(|&&i| i >= bound) {
        return Err(SampnnError::IndexOutOfRange {
            context,
            index: bad,
            bound,
        });
    }
    Ok(v.select(Axis(0), idx))
}
