//! Agent errors

use thiserror::Error;

/// Failures raised while learning or persisting the agent
#[derive(Error, Debug)]
pub enum AgentError {
    /// The learning update produced a non-finite loss or parameters
    #[error("learning update diverged: loss={loss}")]
    Divergence { loss: f64 },

    /// Reading or writing the model file failed
    #[error("model file error: {0}")]
    Persistence(#[from] std::io::Error),

    /// The model blob could not be encoded or decoded
    #[error("model serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A loaded model does not match the agent's dimensions
    #[error("model shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },
}
