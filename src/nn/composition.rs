//! Full composition network: embedding → message passing → crystal pooling.
//!
//! The network maps a [`CrystalGraphBatch`] to one row per crystal. Without an
//! output head it is a feature extractor and returns the pooled crystal
//! features unchanged; with a head, the head's output is returned instead.

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::NetworkConfig;
use crate::error::{Result, SampnnError};
use crate::graph::CrystalGraphBatch;
use crate::nn::linear::{FeedForward, Linear, Mlp};
use crate::nn::message::MessageLayer;
use crate::nn::norm::Mode;
use crate::nn::pooling::GlobalAttentionPool;

/// Structure-agnostic message passing network over composition graphs.
pub struct CompositionNet {
    /// Trainable projection `orig_atom_fea_len → atom_fea_len`.
    embedding: Linear,

    /// Message passing rounds, applied in order.
    graphs: Vec<MessageLayer>,

    /// Atoms → crystals attention pool.
    pooling: GlobalAttentionPool,

    /// Optional task head applied to the pooled crystal rows.
    output_nn: Option<Box<dyn FeedForward>>,

    atom_fea_len: usize,
}

impl CompositionNet {
    /// Build a network with `n_graph` message layers.
    ///
    /// `atom_gate` is called once per message layer, so every layer owns a
    /// separately initialised gate. `crys_gate` scores atoms for the final
    /// crystal pooling.
    pub fn new<R, F>(
        orig_atom_fea_len: usize,
        nbr_fea_len: usize,
        atom_fea_len: usize,
        n_graph: usize,
        mut atom_gate: F,
        crys_gate: Box<dyn FeedForward>,
        rng: &mut R,
    ) -> Result<Self>
    where
        R: Rng + ?Sized,
        F: FnMut(&mut R) -> Box<dyn FeedForward>,
    {
        if crys_gate.in_dim() != atom_fea_len {
            return Err(SampnnError::InvalidConfig(format!(
                "crystal gate reads {} features, atoms have {}",
                crys_gate.in_dim(),
                atom_fea_len
            )));
        }

        let embedding = Linear::init(orig_atom_fea_len, atom_fea_len, rng);

        let mut graphs = Vec::with_capacity(n_graph);
        for _ in 0..n_graph {
            let gate = atom_gate(&mut *rng);
            graphs.push(MessageLayer::new(atom_fea_len, nbr_fea_len, gate, rng)?);
        }

        tracing::info!(
            orig_atom_fea_len,
            nbr_fea_len,
            atom_fea_len,
            n_graph,
            "composition net built"
        );

        Ok(Self {
            embedding,
            graphs,
            pooling: GlobalAttentionPool::new(crys_gate)?,
            output_nn: None,
            atom_fea_len,
        })
    }

    /// Attach a task head reading `atom_fea_len`-wide crystal rows.
    pub fn with_output_head(mut self, head: Box<dyn FeedForward>) -> Result<Self> {
        if head.in_dim() != self.atom_fea_len {
            return Err(SampnnError::InvalidConfig(format!(
                "output head reads {} features, crystals have {}",
                head.in_dim(),
                self.atom_fea_len
            )));
        }
        self.output_nn = Some(head);
        Ok(self)
    }

    /// Build from hyperparameters with `Mlp` gates (and head, if configured)
    /// drawn from a seeded generator.
    pub fn from_config(config: &NetworkConfig, seed: u64) -> Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(seed);
        let width = config.atom_fea_len;

        let crys_gate = Box::new(Mlp::gate(width, &config.crys_gate_hidden, &mut rng));
        let atom_hidden = config.atom_gate_hidden.clone();
        let net = Self::new(
            config.orig_atom_fea_len,
            config.nbr_fea_len,
            width,
            config.n_graph,
            |rng: &mut StdRng| Box::new(Mlp::gate(width, &atom_hidden, rng)) as Box<dyn FeedForward>,
            crys_gate,
            &mut rng,
        )?;

        match &config.output_hidden {
            Some(hidden) => {
                let head = Mlp::new(width, hidden, config.n_targets, &mut rng);
                net.with_output_head(Box::new(head))
            }
            None => Ok(net),
        }
    }

    /// Embedded and message-passed atom features, `[N, atom_fea_len]`.
    pub fn atom_features(&mut self, batch: &CrystalGraphBatch, mode: Mode) -> Result<Array2<f32>> {
        let mut atom_fea = self.embedding.forward(batch.atom_fea())?;
        for layer in &mut self.graphs {
            atom_fea = layer.forward(
                batch.atom_weights(),
                &atom_fea,
                batch.nbr_fea(),
                batch.bond_segments(),
                batch.nbr_fea_idx(),
                mode,
            )?;
        }
        Ok(atom_fea)
    }

    /// Pooled crystal features, `[C, atom_fea_len]`, ignoring any output head.
    pub fn crystal_features(
        &mut self,
        batch: &CrystalGraphBatch,
        mode: Mode,
    ) -> Result<Array2<f32>> {
        let atom_fea = self.atom_features(batch, mode)?;
        self.pooling
            .forward(&atom_fea, batch.crystal_segments(), batch.atom_weights())
    }

    /// Full forward pass. Returns the head output if a head is attached.
    pub fn forward(&mut self, batch: &CrystalGraphBatch, mode: Mode) -> Result<Array2<f32>> {
        tracing::debug!(
            atoms = batch.n_atoms(),
            bonds = batch.n_bonds(),
            crystals = batch.n_crystals(),
            %mode,
            "composition forward"
        );

        let crys_fea = self.crystal_features(batch, mode)?;
        match &self.output_nn {
            Some(head) => head.forward(&crys_fea),
            None => Ok(crys_fea),
        }
    }

    pub fn n_graph(&self) -> usize {
        self.graphs.len()
    }

    pub fn atom_fea_len(&self) -> usize {
        self.atom_fea_len
    }

    pub fn has_output_head(&self) -> bool {
        self.output_nn.is_some()
    }

    pub fn layers(&self) -> &[MessageLayer] {
        &self.graphs
    }

    /// Width of the rows returned by [`forward`](Self::forward).
    pub fn output_len(&self) -> usize {
        self.output_nn
            .as_ref()
            .map(|h| h.out_dim())
            .unwrap_or(self.atom_fea_len)
    }

    pub fn param_count(&self) -> usize {
        self.embedding.param_count()
            + self.graphs.iter().map(|g| g.param_count()).sum::<usize>()
            + self.pooling.param_count()
            + self.output_nn.as_ref().map(|h| h.param_count()).unwrap_or(0)
    }
}
