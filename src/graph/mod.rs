//! Crystal graph containers — per-crystal graphs, validated batches, and
//! synthetic generators.

pub mod batch;
pub mod synthetic;

pub use batch::{collate, CrystalGraph, CrystalGraphBatch};
