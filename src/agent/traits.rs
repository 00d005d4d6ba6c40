//! Agent trait definition.

use crate::agent::AgentError;
use crate::environment::{SignalAction, TrafficState};
use std::path::Path;

/// Policy and learner driven by the training loop.
///
/// Methods take `&self` so an agent can be shared between the simulation loop
/// and a background learning update; implementations synchronize internally.
pub trait Agent: Send + Sync {
    /// Select an action for the given state
    fn act(&self, state: &TrafficState) -> SignalAction;

    /// Current Q-value estimates for every action
    fn q_values(&self, state: &TrafficState) -> Vec<f64>;

    /// Store a transition
    fn remember(
        &self,
        state: TrafficState,
        action: SignalAction,
        reward: f64,
        next_state: TrafficState,
        done: bool,
    );

    /// Learn from a sampled batch. `Ok(None)` when memory holds too few transitions.
    fn replay(&self, batch_size: usize) -> Result<Option<f64>, AgentError>;

    /// Number of stored transitions
    fn memory_len(&self) -> usize;

    /// Get the current epsilon value
    fn epsilon(&self) -> f64;

    /// Persist the learned parameters
    fn save(&self, path: &Path) -> Result<(), AgentError>;

    /// Get agent name
    fn name(&self) -> &str;
}
