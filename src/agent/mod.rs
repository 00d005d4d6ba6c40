//! DQN agent, its replay memory and Q-network.

pub mod dqn_agent;
mod error;
mod experience_replay;
mod neural_network;
mod traits;

pub use dqn_agent::{compute_target, DQNAgent, DQNConfig};
pub use error::AgentError;
pub use experience_replay::{Experience, ReplayBuffer};
pub use neural_network::{argmax, NeuralNetwork};
pub use traits::Agent;
