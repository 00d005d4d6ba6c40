//! Deep Q-Network (DQN) agent implementation.

use crate::agent::{Agent, AgentError, Experience, NeuralNetwork, ReplayBuffer};
use crate::environment::{SignalAction, TrafficState, ACTION_SIZE, STATE_SIZE};
use parking_lot::{Mutex, RwLock};
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::debug;

/// DQN agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DQNConfig {
    /// Adam learning rate
    pub learning_rate: f64,
    /// Discount factor
    pub gamma: f64,
    /// Initial epsilon for exploration
    pub epsilon_start: f64,
    /// Floor for epsilon
    pub epsilon_min: f64,
    /// Multiplicative epsilon decay per learning update
    pub epsilon_decay: f64,
    /// Replay memory capacity
    pub memory_size: usize,
    /// Hidden layer sizes
    pub hidden_layers: Vec<usize>,
}

impl Default for DQNConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            gamma: 0.95,
            epsilon_start: 0.3,
            epsilon_min: 0.01,
            epsilon_decay: 0.95,
            memory_size: 2000,
            hidden_layers: vec![24, 24],
        }
    }
}

impl DQNConfig {
    fn layer_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![STATE_SIZE];
        sizes.extend(&self.hidden_layers);
        sizes.push(ACTION_SIZE);
        sizes
    }
}

/// Bellman target for one transition.
///
/// Terminal transitions use the reward alone; otherwise the discounted best
/// next-state Q-value is added.
pub fn compute_target(reward: f64, done: bool, gamma: f64, next_q_values: &[f64]) -> f64 {
    if done || next_q_values.is_empty() {
        return reward;
    }
    let max_next_q = next_q_values
        .iter()
        .cloned()
        .fold(f64::NEG_INFINITY, f64::max);
    reward + gamma * max_next_q
}

/// State read by `act` and written by `replay`
struct Policy {
    network: NeuralNetwork,
    epsilon: f64,
    updates: u64,
}

/// Deep Q-Network agent.
///
/// The Q-network and epsilon sit behind one `RwLock`, so `act` always sees a
/// consistent pair. `replay` holds `replay_guard` for its whole duration:
/// it trains a copy of the network and installs it together with the decayed
/// epsilon under a short write lock.
pub struct DQNAgent {
    policy: RwLock<Policy>,
    memory: Mutex<ReplayBuffer>,
    replay_guard: Mutex<()>,
    config: DQNConfig,
}

impl DQNAgent {
    /// Create a new DQN agent
    pub fn new(config: DQNConfig) -> Self {
        let network = NeuralNetwork::new(&config.layer_sizes(), config.learning_rate);
        let epsilon = config.epsilon_start.clamp(config.epsilon_min, 1.0);

        Self {
            policy: RwLock::new(Policy {
                network,
                epsilon,
                updates: 0,
            }),
            memory: Mutex::new(ReplayBuffer::new(config.memory_size)),
            replay_guard: Mutex::new(()),
            config,
        }
    }

    /// Store an experience in replay memory
    pub fn remember_experience(&self, experience: Experience) {
        self.memory.lock().push(experience);
    }

    /// Sample a batch and take one gradient step per transition, then decay epsilon.
    ///
    /// Returns the mean loss, or `None` when memory holds fewer than
    /// `batch_size` transitions; in that case nothing is changed.
    pub fn replay_batch(&self, batch_size: usize) -> Result<Option<f64>, AgentError> {
        let _guard = self.replay_guard.lock();

        let batch = match self.memory.lock().sample(batch_size) {
            Some(batch) if !batch.is_empty() => batch,
            _ => return Ok(None),
        };

        let mut network = self.policy.read().network.clone();
        let mut total_loss = 0.0;

        for experience in &batch {
            let next_q = network.predict(&experience.next_state.to_array());
            let target = compute_target(
                experience.reward,
                experience.done,
                self.config.gamma,
                next_q.as_slice().unwrap_or(&[]),
            );

            let state = experience.state.to_array();
            let mut target_q = network.predict(&state);
            target_q[experience.action.to_index()] = target;

            total_loss += network.fit(&state, &target_q);
        }

        let loss = total_loss / batch.len() as f64;
        if !loss.is_finite() || !network.is_finite() {
            return Err(AgentError::Divergence { loss });
        }

        let mut policy = self.policy.write();
        policy.network = network;
        policy.epsilon = (policy.epsilon * self.config.epsilon_decay).max(self.config.epsilon_min);
        policy.updates += 1;

        debug!(
            loss,
            epsilon = policy.epsilon,
            updates = policy.updates,
            optimizer_steps = policy.network.steps(),
            "replay update"
        );

        Ok(Some(loss))
    }

    /// Override epsilon, clamped to `[epsilon_min, 1]`
    pub fn set_epsilon(&self, epsilon: f64) {
        self.policy.write().epsilon = epsilon.clamp(self.config.epsilon_min, 1.0);
    }

    /// Number of completed learning updates
    pub fn updates(&self) -> u64 {
        self.policy.read().updates
    }

    /// Adam steps applied to the live network, one per replayed transition
    pub fn optimizer_steps(&self) -> u64 {
        self.policy.read().network.steps()
    }

    pub fn config(&self) -> &DQNConfig {
        &self.config
    }

    /// Load an agent saved with [`Agent::save`]; replay memory starts empty
    pub fn load(path: &Path) -> Result<Self, AgentError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let state: DQNAgentState = serde_json::from_reader(reader)?;

        let expected = state.config.layer_sizes();
        let found = state.q_network.layer_sizes();
        if expected != found {
            return Err(AgentError::ShapeMismatch { expected, found });
        }

        let epsilon = state.epsilon.clamp(state.config.epsilon_min, 1.0);

        Ok(Self {
            policy: RwLock::new(Policy {
                network: state.q_network,
                epsilon,
                updates: state.updates,
            }),
            memory: Mutex::new(ReplayBuffer::new(state.config.memory_size)),
            replay_guard: Mutex::new(()),
            config: state.config,
        })
    }
}

impl Agent for DQNAgent {
    fn act(&self, state: &TrafficState) -> SignalAction {
        let policy = self.policy.read();
        let mut rng = thread_rng();

        if rng.gen::<f64>() < policy.epsilon {
            let action_idx = rng.gen_range(0..ACTION_SIZE);
            debug!(action = action_idx, "exploration: random action");
            SignalAction::from_index(action_idx).unwrap_or(SignalAction::Green5)
        } else {
            let state_array = state.to_array();
            let action_idx = policy.network.best_action(&state_array);
            debug!(action = action_idx, "exploitation: greedy action");
            SignalAction::from_index(action_idx).unwrap_or(SignalAction::Green5)
        }
    }

    fn q_values(&self, state: &TrafficState) -> Vec<f64> {
        self.policy.read().network.predict(&state.to_array()).to_vec()
    }

    fn remember(
        &self,
        state: TrafficState,
        action: SignalAction,
        reward: f64,
        next_state: TrafficState,
        done: bool,
    ) {
        self.remember_experience(Experience::new(state, action, reward, next_state, done));
    }

    fn replay(&self, batch_size: usize) -> Result<Option<f64>, AgentError> {
        self.replay_batch(batch_size)
    }

    fn memory_len(&self) -> usize {
        self.memory.lock().len()
    }

    fn epsilon(&self) -> f64 {
        self.policy.read().epsilon
    }

    fn save(&self, path: &Path) -> Result<(), AgentError> {
        let state = {
            let policy = self.policy.read();
            DQNAgentState {
                q_network: policy.network.clone(),
                config: self.config.clone(),
                epsilon: policy.epsilon,
                updates: policy.updates,
            }
        };

        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer(writer, &state)?;
        Ok(())
    }

    fn name(&self) -> &str {
        "DQN"
    }
}

/// Serializable agent state for saving/loading
#[derive(Serialize, Deserialize)]
struct DQNAgentState {
    q_network: NeuralNetwork,
    config: DQNConfig,
    epsilon: f64,
    updates: u64,
}
