//! Network layers.
//!
//! - `linear`: affine layers, `Mlp`, and the `FeedForward` trait for gates and heads
//! - `norm`: batch normalization with running statistics and the `Mode` switch
//! - `pooling`: weighted softmax attention pooling over segments
//! - `message`: one gated message passing round
//! - `composition`: the full embedding → message passing → pooling network

pub mod activation;
pub mod composition;
pub mod linear;
pub mod message;
pub mod norm;
pub mod pooling;

pub use composition::CompositionNet;
pub use linear::{FeedForward, Linear, Mlp};
pub use norm::{BatchNorm1d, Mode};
