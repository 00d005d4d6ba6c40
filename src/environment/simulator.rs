//! Control interface to the traffic micro-simulator.
//!
//! The shape follows a TraCI-style session: start/close, single-tick stepping,
//! lane and edge queries, traffic-light commands and vehicle injection.

use thiserror::Error;

/// Errors reported by a simulator backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulatorError {
    /// A session is already running
    #[error("simulator connection already active")]
    AlreadyActive,

    /// The session was already closed
    #[error("simulator connection already closed")]
    AlreadyClosed,

    /// A command was issued without a running session
    #[error("simulator is not connected")]
    NotConnected,

    /// Vehicle id already in use
    #[error("vehicle '{0}' already exists")]
    DuplicateVehicle(String),

    /// Route id not defined in the network
    #[error("unknown route '{0}'")]
    UnknownRoute(String),

    /// Lane index not valid for the vehicle's current edge
    #[error("invalid lane {lane} for vehicle '{vehicle}'")]
    InvalidLane { vehicle: String, lane: usize },

    /// Lane, edge or traffic light id not defined in the network
    #[error("unknown {kind} '{id}'")]
    UnknownObject { kind: &'static str, id: String },

    /// Any other backend failure
    #[error("simulator command failed: {0}")]
    Command(String),
}

impl SimulatorError {
    /// Failures that only mean a synthetic vehicle could not be placed.
    pub fn is_injection_failure(&self) -> bool {
        matches!(
            self,
            SimulatorError::DuplicateVehicle(_)
                | SimulatorError::UnknownRoute(_)
                | SimulatorError::InvalidLane { .. }
        )
    }

    pub fn unknown(kind: &'static str, id: impl Into<String>) -> Self {
        Self::UnknownObject {
            kind,
            id: id.into(),
        }
    }
}

pub type SimResult<T> = Result<T, SimulatorError>;

/// Session-oriented simulator control
pub trait Simulator {
    /// Open a session. Fails with [`SimulatorError::AlreadyActive`] if one is open.
    fn start(&mut self) -> SimResult<()>;

    /// Close the session. Fails with [`SimulatorError::AlreadyClosed`] if none is open.
    fn close(&mut self) -> SimResult<()>;

    /// Advance one tick
    fn simulation_step(&mut self) -> SimResult<()>;

    /// Current simulation time
    fn time(&self) -> SimResult<f64>;

    /// Vehicles on a lane during the last tick
    fn lane_vehicle_count(&self, lane: &str) -> SimResult<usize>;

    fn lane_length(&self, lane: &str) -> SimResult<f64>;

    /// Vehicles on an edge during the last tick
    fn edge_vehicle_count(&self, edge: &str) -> SimResult<usize>;

    /// Summed waiting time of the vehicles on an edge
    fn edge_waiting_time(&self, edge: &str) -> SimResult<f64>;

    /// Set the remaining duration of the current phase
    fn set_phase_duration(&mut self, tls_id: &str, duration: f64) -> SimResult<()>;

    fn add_vehicle(&mut self, vehicle_id: &str, route_id: &str, depart: f64) -> SimResult<()>;

    /// Pin a vehicle to a lane index for `duration` ticks
    fn change_lane(&mut self, vehicle_id: &str, lane_index: usize, duration: f64)
        -> SimResult<()>;
}
