//! Traffic-signal environment.
//!
//! Turns simulator observations into MDP states and rewards, and agent
//! actions into signal commands.

use crate::environment::dynamics::{DynamicsConfig, TrafficDynamics, TrafficRegime};
use crate::environment::simulator::{SimResult, Simulator, SimulatorError};
use crate::environment::{SignalAction, TrafficState, ACTION_SIZE, STATE_SIZE};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Weights of the reward terms
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardWeights {
    pub flow: f64,
    pub waiting_time: f64,
    pub queue_length: f64,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            flow: 1.0,
            waiting_time: -0.7,
            queue_length: -0.5,
        }
    }
}

impl RewardWeights {
    /// Weighted sum of the totals, averaged over the monitored edges
    pub fn combine(
        &self,
        flow: f64,
        waiting_time: f64,
        queue_length: f64,
        edge_count: usize,
    ) -> f64 {
        if edge_count == 0 {
            return 0.0;
        }
        let weighted =
            self.flow * flow + self.waiting_time * waiting_time + self.queue_length * queue_length;
        weighted / edge_count as f64
    }
}

/// Environment configuration: which network objects are observed and controlled
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvConfig {
    /// Controlled traffic light
    pub tls_id: String,
    /// Lane used for the density feature
    pub density_lane: String,
    /// Edge used for the waiting-time feature
    pub waiting_edge: String,
    /// Lane used for the queue-length feature
    pub queue_lane: String,
    /// Edges summed for flow and waiting time in the reward
    pub reward_edges: Vec<String>,
    /// Lanes summed for queue length in the reward
    pub queue_lanes: Vec<String>,
    pub reward_weights: RewardWeights,
    pub dynamics: DynamicsConfig,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            tls_id: "J12".to_string(),
            density_lane: "E3_1".to_string(),
            waiting_edge: "E8".to_string(),
            queue_lane: "E9_0".to_string(),
            reward_edges: ["E5", "E3", "E6", "E8", "E9"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            queue_lanes: ["E9_0", "E5_0", "E6_0", "E8_0"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            reward_weights: RewardWeights::default(),
            dynamics: DynamicsConfig::default(),
        }
    }
}

/// One entry of the per-step history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub time_step: usize,
    pub action: usize,
    pub reward: f64,
    pub cumulative_reward: f64,
    pub waiting_time: f64,
    pub regime: TrafficRegime,
    pub high_traffic_count: usize,
    pub low_traffic_count: usize,
}

/// Step result returned by the environment
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Next state observation
    pub state: TrafficState,
    pub reward: f64,
    /// Whether the episode reached its step limit
    pub done: bool,
    pub info: StepRecord,
}

/// Single-intersection environment over a [`Simulator`]
pub struct TrafficEnvironment<S: Simulator> {
    simulator: S,
    config: EnvConfig,
    dynamics: TrafficDynamics,
    /// Steps taken in the current episode
    time_step: usize,
    cumulative_reward: f64,
    history: Vec<StepRecord>,
}

impl<S: Simulator> TrafficEnvironment<S> {
    /// Create an environment; `seed` drives the demand perturbation
    pub fn new(simulator: S, config: EnvConfig, seed: Option<u64>) -> Self {
        let dynamics = TrafficDynamics::new(config.dynamics.clone(), seed);
        Self {
            simulator,
            config,
            dynamics,
            time_step: 0,
            cumulative_reward: 0.0,
            history: Vec::new(),
        }
    }

    pub fn state_size(&self) -> usize {
        STATE_SIZE
    }

    pub fn action_size(&self) -> usize {
        ACTION_SIZE
    }

    /// (Re)open the simulator session and return the initial state.
    ///
    /// An already active session is closed and started again once.
    pub fn reset(&mut self) -> Result<TrafficState> {
        match self.simulator.start() {
            Ok(()) => {}
            Err(SimulatorError::AlreadyActive) => {
                warn!("simulator connection already active, closing and restarting");
                match self.simulator.close() {
                    Ok(()) | Err(SimulatorError::AlreadyClosed) => {}
                    Err(err) => return Err(err).context("failed to close active simulator session"),
                }
                self.simulator
                    .start()
                    .context("failed to restart simulator session")?;
            }
            Err(err) => return Err(err).context("failed to start simulator session"),
        }

        self.time_step = 0;
        self.cumulative_reward = 0.0;

        self.get_state().context("failed to read initial state")
    }

    /// Close the simulator session; closing twice is not an error
    pub fn close(&mut self) -> Result<()> {
        match self.simulator.close() {
            Ok(()) | Err(SimulatorError::AlreadyClosed) => Ok(()),
            Err(err) => Err(err).context("failed to close simulator session"),
        }
    }

    /// Inject one round of synthetic demand
    pub fn perturb_traffic(&mut self) -> Result<TrafficRegime> {
        self.dynamics
            .perturb(&mut self.simulator)
            .context("traffic perturbation failed")
    }

    /// Take one MDP step.
    ///
    /// `done` is set once `step_count` reaches `max_steps`; nothing else ends
    /// an episode.
    pub fn step(
        &mut self,
        action: SignalAction,
        step_count: usize,
        max_steps: usize,
    ) -> Result<StepResult> {
        self.time_step += 1;
        let regime = self.perturb_traffic()?;

        self.apply_action(action)
            .with_context(|| format!("failed to apply action {}", action))?;
        self.simulator
            .simulation_step()
            .context("failed to advance simulation")?;

        let state = self.get_state().context("failed to read state")?;
        let reward = self.get_reward().context("failed to compute reward")?;
        self.cumulative_reward += reward;

        let done = step_count >= max_steps;

        let info = StepRecord {
            time_step: self.time_step,
            action: action.to_index(),
            reward,
            cumulative_reward: self.cumulative_reward,
            waiting_time: state.waiting_time,
            regime,
            high_traffic_count: self.dynamics.high_traffic_count(),
            low_traffic_count: self.dynamics.low_traffic_count(),
        };
        self.history.push(info.clone());

        debug!(
            time_step = self.time_step,
            action = action.to_index(),
            reward,
            cumulative_reward = self.cumulative_reward,
            "environment step"
        );

        Ok(StepResult {
            state,
            reward,
            done,
            info,
        })
    }

    /// Set the green time and run the simulator through the red time
    pub fn apply_action(&mut self, action: SignalAction) -> SimResult<()> {
        let timing = action.timing();
        self.simulator
            .set_phase_duration(&self.config.tls_id, timing.green_duration as f64)?;
        for _ in 0..timing.red_duration {
            self.simulator.simulation_step()?;
        }
        Ok(())
    }

    /// Read the current observation
    pub fn get_state(&self) -> SimResult<TrafficState> {
        let vehicles = self.simulator.lane_vehicle_count(&self.config.density_lane)? as f64;
        let length = self.simulator.lane_length(&self.config.density_lane)?;
        let density = if length > 0.0 { vehicles / length } else { 0.0 };

        let waiting_time = self.simulator.edge_waiting_time(&self.config.waiting_edge)?;
        let queue_length = self.simulator.lane_vehicle_count(&self.config.queue_lane)? as f64;

        Ok(TrafficState::new(density, waiting_time, queue_length))
    }

    /// Reward for the current simulator state
    pub fn get_reward(&self) -> SimResult<f64> {
        let mut total_flow = 0.0;
        let mut total_waiting_time = 0.0;
        for edge in &self.config.reward_edges {
            total_flow += self.simulator.edge_vehicle_count(edge)? as f64;
            total_waiting_time += self.simulator.edge_waiting_time(edge)?;
        }

        let mut total_queue_length = 0.0;
        for lane in &self.config.queue_lanes {
            total_queue_length += self.simulator.lane_vehicle_count(lane)? as f64;
        }

        Ok(self.config.reward_weights.combine(
            total_flow,
            total_waiting_time,
            total_queue_length,
            self.config.reward_edges.len(),
        ))
    }

    /// Reward accumulated in the current episode
    pub fn cumulative_reward(&self) -> f64 {
        self.cumulative_reward
    }

    pub fn time_step(&self) -> usize {
        self.time_step
    }

    /// Step history across all episodes
    pub fn history(&self) -> &[StepRecord] {
        &self.history
    }

    pub fn dynamics(&self) -> &TrafficDynamics {
        &self.dynamics
    }

    pub fn simulator(&self) -> &S {
        &self.simulator
    }
}
