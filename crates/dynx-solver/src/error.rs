//! Error taxonomy for the explicit solver.
//!
//! Setup errors (`DuplicateId`, `InvalidTopology`, `Configuration`) are
//! raised before the first step. Runtime errors (`Convergence`,
//! `MeshDegeneracy`) abort the run.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SolverError>;

#[derive(Error, Debug)]
pub enum SolverError {
    #[error("Duplicate {entity} id {id}")]
    DuplicateId { entity: &'static str, id: i32 },

    #[error("Invalid topology for element {element}: {reason}")]
    InvalidTopology { element: i32, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Return mapping failed in element {element}, point {point} ({iterations} iterations)")]
    Convergence {
        element: i32,
        point: usize,
        iterations: usize,
    },

    #[error("Power iteration failed after {iterations} iterations (relative change {change:e})")]
    PowerIteration { iterations: usize, change: f64 },

    #[error("Mesh degeneracy: {0}")]
    MeshDegeneracy(String),

    #[error(transparent)]
    Io(#[from] dynx_io::IoError),
}

impl SolverError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        SolverError::Configuration(message.into())
    }

    /// Whether the error belongs to the setup phase.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            SolverError::DuplicateId { .. }
                | SolverError::InvalidTopology { .. }
                | SolverError::Configuration(_)
        )
    }
}
