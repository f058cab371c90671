//! One round of message passing on the atom/bond composition graph.
//!
//! For every bond `j` (owner `i = self[j]`, neighbour `k = nbr[j]`):
//!
//! ```text
//! z_j      = [h_i ‖ h_k ‖ e_j]
//! filter_j = σ(BN_f(W_f z_j + b_f))
//! core_j   = ELU(BN_c(W_c z_j + b_c))
//! m_j      = filter_j ⊙ core_j
//! h'_i     = AttentionPool({m_j : self[j] = i}, weights w_k)
//! ```

use ndarray::{concatenate, Array1, Array2, Axis};
use rand::Rng;

use crate::config::ELU_ALPHA;
use crate::error::{ensure_len, Result, SampnnError};
use crate::kernels::segment::{gather_rows, gather_values, SegmentIndex};
use crate::nn::activation::{elu, sigmoid};
use crate::nn::linear::{FeedForward, Linear};
use crate::nn::norm::{BatchNorm1d, Mode};
use crate::nn::pooling::GlobalAttentionPool;

/// Gated message layer with its own attention pool and batch-norm state.
pub struct MessageLayer {
    atom_fea_len: usize,
    nbr_fea_len: usize,

    filter_msg: Linear,
    filter_bn: BatchNorm1d,

    core_msg: Linear,
    core_bn: BatchNorm1d,

    pooling: GlobalAttentionPool,
}

impl MessageLayer {
    /// `atom_gate` must read `atom_fea_len`-wide message rows and emit one logit.
    pub fn new<R: Rng + ?Sized>(
        atom_fea_len: usize,
        nbr_fea_len: usize,
        atom_gate: Box<dyn FeedForward>,
        rng: &mut R,
    ) -> Result<Self> {
        if atom_gate.in_dim() != atom_fea_len {
            return Err(SampnnError::InvalidConfig(format!(
                "atom gate reads {} features, messages have {}",
                atom_gate.in_dim(),
                atom_fea_len
            )));
        }

        let in_len = 2 * atom_fea_len + nbr_fea_len;
        Ok(Self {
            atom_fea_len,
            nbr_fea_len,
            filter_msg: Linear::init(in_len, atom_fea_len, rng),
            filter_bn: BatchNorm1d::new(atom_fea_len),
            core_msg: Linear::init(in_len, atom_fea_len, rng),
            core_bn: BatchNorm1d::new(atom_fea_len),
            pooling: GlobalAttentionPool::new(atom_gate)?,
        })
    }

    /// Refine atom features from their neighbours.
    ///
    /// `self_index` carries the owner atom of each bond and must have one
    /// segment per atom row. Returns a new `[N, atom_fea_len]` matrix.
    pub fn forward(
        &mut self,
        atom_weights: &Array1<f32>,
        atom_in_fea: &Array2<f32>,
        bond_nbr_fea: &Array2<f32>,
        self_index: &SegmentIndex,
        nbr_fea_idx: &[usize],
        mode: Mode,
    ) -> Result<Array2<f32>> {
        let n_atoms = atom_in_fea.nrows();
        let n_bonds = self_index.num_rows();

        if atom_in_fea.ncols() != self.atom_fea_len {
            return Err(SampnnError::ShapeMismatch {
                context: "message layer atom features",
                expected: (n_atoms, self.atom_fea_len),
                got: atom_in_fea.dim(),
            });
        }
        if bond_nbr_fea.dim() != (n_bonds, self.nbr_fea_len) {
            return Err(SampnnError::ShapeMismatch {
                context: "message layer bond features",
                expected: (n_bonds, self.nbr_fea_len),
                got: bond_nbr_fea.dim(),
            });
        }
        ensure_len("nbr_fea_idx vs self_fea_idx", n_bonds, nbr_fea_idx.len())?;
        ensure_len("atom weights", n_atoms, atom_weights.len())?;
        ensure_len("self index segments", n_atoms, self_index.num_segments())?;

        let atom_nbr_weights = gather_values(atom_weights, nbr_fea_idx, "nbr_fea_idx")?;
        let atom_nbr_fea = gather_rows(atom_in_fea, nbr_fea_idx, "nbr_fea_idx")?;
        let atom_self_fea = gather_rows(atom_in_fea, self_index.ids(), "self_fea_idx")?;

        let total_fea = concatenate(
            Axis(1),
            &[atom_self_fea.view(), atom_nbr_fea.view(), bond_nbr_fea.view()],
        )?;

        let filter = self
            .filter_bn
            .forward(&self.filter_msg.forward(&total_fea)?, mode)?
            .mapv(sigmoid);
        let core = self
            .core_bn
            .forward(&self.core_msg.forward(&total_fea)?, mode)?
            .mapv(|v| elu(v, ELU_ALPHA));

        let nbr_message = filter * core;

        self.pooling
            .forward(&nbr_message, self_index, &atom_nbr_weights)
    }

    pub fn atom_fea_len(&self) -> usize {
        self.atom_fea_len
    }

    pub fn nbr_fea_len(&self) -> usize {
        self.nbr_fea_len
    }

    /// Filter and core batch norms, in that order.
    pub fn norms(&self) -> [&BatchNorm1d; 2] {
        [&self.filter_bn, &self.core_bn]
    }

    pub fn gate(&self) -> &dyn FeedForward {
        self.pooling.gate()
    }

    pub fn param_count(&self) -> usize {
        self.filter_msg.param_count()
            + self.filter_bn.param_count()
            + self.core_msg.param_count()
            + self.core_bn.param_count()
            + self.pooling.param_count()
    }
}
