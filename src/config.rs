//! Model-wide constants and the network hyperparameter set.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SampnnError};

/// Guard added to the softmax denominator in attention pooling.
pub const ATTENTION_EPS: f32 = 1e-13;

/// Batch-norm variance epsilon.
pub const BN_EPS: f32 = 1e-5;

/// Batch-norm running-statistics momentum.
pub const BN_MOMENTUM: f32 = 0.1;

/// ELU alpha.
pub const ELU_ALPHA: f32 = 1.0;

/// Negative slope of the LeakyReLU used inside gate and head networks.
pub const LEAKY_RELU_SLOPE: f32 = 0.01;

/// Row × width product above which segment reductions run on rayon.
pub const PARALLEL_REDUCE_THRESHOLD: usize = 1 << 16;

/// Hyperparameters for a [`CompositionNet`](crate::nn::composition::CompositionNet).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Width of the raw per-atom features (element embedding length).
    pub orig_atom_fea_len: usize,

    /// Width of the per-bond features.
    pub nbr_fea_len: usize,

    /// Hidden atom feature width used by every message layer.
    pub atom_fea_len: usize,

    /// Number of message passing rounds.
    pub n_graph: usize,

    /// Hidden layer widths of the per-layer atom gates.
    pub atom_gate_hidden: Vec<usize>,

    /// Hidden layer widths of the crystal gate.
    pub crys_gate_hidden: Vec<usize>,

    /// Hidden widths of the output head. `None` runs as a feature extractor.
    pub output_hidden: Option<Vec<usize>>,

    /// Output width of the head, if one is attached.
    pub n_targets: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            orig_atom_fea_len: 92,
            nbr_fea_len: 41,
            atom_fea_len: 64,
            n_graph: 3,
            atom_gate_hidden: vec![256],
            crys_gate_hidden: vec![256],
            output_hidden: Some(vec![128]),
            n_targets: 1,
        }
    }
}

impl NetworkConfig {
    /// Reject zero widths; they make the linear init range degenerate.
    pub fn validate(&self) -> Result<()> {
        let widths = [
            ("orig_atom_fea_len", self.orig_atom_fea_len),
            ("nbr_fea_len", self.nbr_fea_len),
            ("atom_fea_len", self.atom_fea_len),
        ];
        for (name, w) in widths {
            if w == 0 {
                return Err(SampnnError::InvalidConfig(format!("{name} must be > 0")));
            }
        }
        if self
            .atom_gate_hidden
            .iter()
            .chain(self.crys_gate_hidden.iter())
            .any(|&h| h == 0)
        {
            return Err(SampnnError::InvalidConfig(
                "gate hidden widths must be > 0".into(),
            ));
        }
        if let Some(hidden) = &self.output_hidden {
            if hidden.iter().any(|&h| h == 0) || self.n_targets == 0 {
                return Err(SampnnError::InvalidConfig(
                    "output head widths must be > 0".into(),
                ));
            }
        }
        Ok(())
    }

    /// Load and validate a JSON config. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }
}
