//! Error types for SAMPNN.
//!
//! Every failure in the forward path is an input-contract violation. Errors
//! are returned to the caller immediately; nothing in this crate retries.

use thiserror::Error;

/// SAMPNN error type.
#[derive(Debug, Error)]
pub enum SampnnError {
    /// A matrix had the wrong shape.
    #[error("shape mismatch in {context}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: (usize, usize),
        got: (usize, usize),
    },

    /// Two sequences that must agree in length did not.
    #[error("length mismatch in {context}: expected {expected}, got {got}")]
    LengthMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },

    /// A gather index or segment id outside its valid domain.
    #[error("index {index} out of range for {context} (bound {bound})")]
    IndexOutOfRange {
        context: &'static str,
        index: usize,
        bound: usize,
    },

    /// Atom weights must be finite and non-negative.
    #[error("invalid atom weight {value} at row {row}")]
    InvalidWeight { row: usize, value: f32 },

    /// Batch statistics need at least two rows in training mode.
    #[error("batch norm needs more than one row per feature in training mode, got {rows}")]
    InsufficientBatch { rows: usize },

    /// Collating or pooling over zero crystals.
    #[error("empty batch: {0}")]
    EmptyBatch(&'static str),

    /// Invalid network configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// ndarray shape error.
    #[error("ndarray shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// I/O error while reading configuration.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration parse error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, SampnnError>;

/// Check that `got` equals `expected`, naming the failing site.
pub(crate) fn ensure_len(context: &'static str, expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(SampnnError::LengthMismatch {
            context,
            expected,
            got,
        });
    }
    Ok(())
}
