//! # Error taxonomy
//!
//! Three classes of failure are distinguished:
//! - **structural mismatch** between the mechanism compiler and this runtime (unknown reaction
//!   kind, desynchronized record boundaries, sparsity skeleton of the wrong size). These are fatal:
//!   once a record boundary is lost every following offset is garbage.
//! - **configuration** problems detected while building a solver.
//! - **integrator failure** reported by the external time stepper.
//!
//! Numeric degeneracies (zero rate, zero concentration) never show up here, they are handled
//! locally by the reaction that meets them.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PhlexError {
    #[error("Unrecognized reaction kind tag {0}")]
    UnrecognizedReactionKind(i32),
    #[error("Reaction buffer truncated: needed {needed} bytes at offset {offset}, buffer has {len}")]
    TruncatedBuffer {
        offset: usize,
        needed: usize,
        len: usize,
    },
    #[error("Reaction buffer desynchronized: {remaining} trailing bytes after {n_rxn} reactions")]
    TrailingBytes { n_rxn: usize, remaining: usize },
    #[error("Malformed reaction record at offset {offset}: {reason}")]
    MalformedRecord { offset: usize, reason: String },
    #[error("Jacobian sparsity mismatch: {0}")]
    SparsityMismatch(String),
    #[error("Dimension mismatch for {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        what: String,
        expected: usize,
        got: usize,
    },
    #[error("State index {index} out of range (n_state_var = {n_state_var})")]
    StateIndexOutOfRange { index: usize, n_state_var: usize },
    #[error("Invalid state variable type code {0}")]
    InvalidVarType(i32),
    #[error("Unknown species: {0}")]
    UnknownSpecies(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Integrator failure: {0}")]
    IntegratorFailure(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl PhlexError {
    /// true for errors that mean the buffer or the sparsity skeleton can no longer be trusted
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            PhlexError::UnrecognizedReactionKind(_)
                | PhlexError::TruncatedBuffer { .. }
                | PhlexError::TrailingBytes { .. }
                | PhlexError::MalformedRecord { .. }
                | PhlexError::SparsityMismatch(_)
        )
    }
}

pub type PhlexResult<T> = Result<T, PhlexError>;
