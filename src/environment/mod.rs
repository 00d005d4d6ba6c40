//! Traffic-signal environment implementing a Gym-like reset/step interface.

mod dynamics;
mod simulator;
mod synthetic;
mod traffic_env;
mod traffic_state;

pub use dynamics::{DynamicsConfig, TrafficDynamics, TrafficRegime, TrafficVariation};
pub use simulator::{SimResult, Simulator, SimulatorError};
pub use synthetic::{SyntheticConfig, SyntheticSimulator};
pub use traffic_env::{EnvConfig, RewardWeights, StepRecord, StepResult, TrafficEnvironment};
pub use traffic_state::{
    SignalAction, SignalTiming, TrafficState, ACTION_SIZE, SIGNAL_TIMINGS, STATE_SIZE,
};
