//! Reduction kernels shared by the message and pooling layers.
//!
//! - **segment**: scatter reductions (max, sum, mean, product) keyed by a
//!   small-integer partition, plus gather-back and bounds-checked gathers

pub mod segment;
