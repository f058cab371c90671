//! # SAMPNN
//!
//! **Structure-Agnostic Message Passing Neural Network** forward passes for
//! predicting material properties from stoichiometry alone.
//!
//! A material is a dense graph over its element nodes. Each node carries an
//! element embedding and a fractional abundance weight; each directed bond
//! carries its own features. The network refines node features with gated
//! messages, reduces each node's incoming messages by weighted softmax
//! attention, then pools nodes into one vector per crystal the same way.
//!
//! ## Components
//!
//! 1. **Segment reduction**: max/sum/mean/product of rows grouped by segment id
//! 2. **Attention pooling**: numerically stable weighted segment softmax
//! 3. **Message layer**: sigmoid filter ⊙ ELU core, batch-normed, attention-pooled
//! 4. **Composition net**: embedding → `n_graph` message rounds → crystal pooling
//!    → optional output head
//!
//! Everything runs on `ndarray` on the CPU; large segment reductions are split
//! across segments with `rayon`.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod graph;
pub mod kernels;
pub mod nn;

pub use error::{Result, SampnnError};
