//! Observation and action types for the intersection MDP.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Number of features in a [`TrafficState`].
pub const STATE_SIZE: usize = 3;

/// Number of signal-timing actions.
pub const ACTION_SIZE: usize = 5;

/// Green/red split of one signal cycle, in simulator ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalTiming {
    pub green_duration: u32,
    pub red_duration: u32,
}

impl SignalTiming {
    pub const fn new(green_duration: u32, red_duration: u32) -> Self {
        Self {
            green_duration,
            red_duration,
        }
    }

    /// Length of the full cycle
    pub fn cycle_length(&self) -> u32 {
        self.green_duration + self.red_duration
    }
}

/// The single action table shared by the environment, metrics and CLI.
///
/// Ordered from least to most green; every entry sums to a 30-tick cycle.
pub const SIGNAL_TIMINGS: [SignalTiming; ACTION_SIZE] = [
    SignalTiming::new(5, 25),
    SignalTiming::new(10, 20),
    SignalTiming::new(15, 15),
    SignalTiming::new(20, 10),
    SignalTiming::new(25, 5),
];

/// Signal timing chosen by the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalAction {
    Green5,
    Green10,
    Green15,
    Green20,
    Green25,
}

impl SignalAction {
    /// All actions in index order
    pub const ALL: [SignalAction; ACTION_SIZE] = [
        SignalAction::Green5,
        SignalAction::Green10,
        SignalAction::Green15,
        SignalAction::Green20,
        SignalAction::Green25,
    ];

    /// Convert an index into an action, `None` when out of range
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn to_index(&self) -> usize {
        match self {
            SignalAction::Green5 => 0,
            SignalAction::Green10 => 1,
            SignalAction::Green15 => 2,
            SignalAction::Green20 => 3,
            SignalAction::Green25 => 4,
        }
    }

    /// Timing looked up in [`SIGNAL_TIMINGS`]
    pub fn timing(&self) -> SignalTiming {
        SIGNAL_TIMINGS[self.to_index()]
    }
}

impl std::fmt::Display for SignalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let timing = self.timing();
        write!(
            f,
            "{} (green {}, red {})",
            self.to_index(),
            timing.green_duration,
            timing.red_duration
        )
    }
}

/// Snapshot of the intersection as seen by the agent
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrafficState {
    /// Vehicles per unit length on the density lane
    pub density: f64,
    /// Accumulated waiting time on the monitored edge
    pub waiting_time: f64,
    /// Vehicles on the queue lane
    pub queue_length: f64,
}

impl TrafficState {
    pub fn new(density: f64, waiting_time: f64, queue_length: f64) -> Self {
        Self {
            density,
            waiting_time,
            queue_length,
        }
    }

    /// Feature vector fed to the Q-network
    pub fn to_array(&self) -> Array1<f64> {
        Array1::from_vec(self.to_vec())
    }

    pub fn to_vec(&self) -> Vec<f64> {
        vec![self.density, self.waiting_time, self.queue_length]
    }

    /// Build a state from a feature slice of length [`STATE_SIZE`]
    pub fn from_slice(values: &[f64]) -> Option<Self> {
        match values {
            [density, waiting_time, queue_length] => {
                Some(Self::new(*density, *waiting_time, *queue_length))
            }
            _ => None,
        }
    }
}
