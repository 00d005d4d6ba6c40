//! # Rust RL Traffic
//!
//! Deep Q-Network control of a single signalised intersection.
//!
//! ## Modules
//!
//! - `agent` - DQN agent, replay memory and Q-network
//! - `environment` - Traffic-signal environment over a pluggable simulator
//! - `training` - Episode loop and background learning updates
//! - `utils` - Configuration and metrics

pub mod agent;
pub mod environment;
pub mod training;
pub mod utils;

pub use agent::{Agent, DQNAgent, DQNConfig};
pub use environment::{SignalAction, SyntheticSimulator, TrafficEnvironment, TrafficState};
pub use training::{Trainer, TrainerConfig};
