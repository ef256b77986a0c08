use thiserror::Error;

use crate::solver::ids::{ActionNodeId, BeliefId, SequenceId, StateId};

#[derive(Debug, Error)]
/// Error type for planning sessions and tree operations.
pub enum SolverError {
    #[error("model returned no state while sampling {0}")]
    ModelSample(&'static str),

    #[error("model produced no step result")]
    ModelStep,

    #[error("no legal action available at belief {}", .0.index())]
    NoAction(BeliefId),

    #[error("missing belief node {}", .0.index())]
    MissingBelief(BeliefId),

    #[error("missing action node {}", .0.index())]
    MissingActionNode(ActionNodeId),

    #[error("missing history sequence {}", .0.index())]
    MissingSequence(SequenceId),

    #[error("missing pooled state {}", .0.index())]
    MissingState(StateId),

    #[error("root belief has no particles")]
    EmptyRootBelief,

    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl SolverError {
    /// Whether this error condemns only the current simulation. Such errors
    /// are logged once per session and the simulation dropped; everything
    /// else aborts the session.
    pub fn is_model_error(&self) -> bool {
        matches!(
            self,
            SolverError::ModelSample(_) | SolverError::ModelStep | SolverError::NoAction(_)
        )
    }
}

#[derive(Debug, Error)]
/// Error type for saving and loading persisted trees.
pub enum SerializeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown serialization tag '{tag}'")]
    UnknownTag { tag: String },

    #[error("malformed tree file at line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}
