//! In-process stand-in for the micro-simulator.
//!
//! A single signalised junction `J12` with a main approach
//! (`E5 -> E3 -> E6`) and a cross approach (`E8 -> E9`). Every edge has two
//! lanes named `<edge>_<index>`. Vehicles travel an edge in a fixed number of
//! ticks, then queue at the stop line until their approach is green. Each lane
//! discharges a bounded number of vehicles per tick. Cross traffic arrives at
//! random. It is deliberately coarse: good enough to give the agent a
//! responsive environment without an external process.

use crate::environment::simulator::{SimResult, Simulator, SimulatorError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const LANES_PER_EDGE: usize = 2;
const EDGES: [&str; 5] = ["E5", "E3", "E6", "E8", "E9"];
const MAIN_ROUTE: &str = "E5_to_E6_via_E3";
const CROSS_ROUTE: &str = "E8_to_E9";

/// Tuning knobs of the synthetic junction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticConfig {
    /// RNG seed for cross-traffic arrivals
    pub seed: Option<u64>,
    /// Traffic light id
    pub tls_id: String,
    /// Length of every lane
    pub lane_length: f64,
    /// Ticks needed to traverse an edge
    pub travel_ticks: u32,
    /// Vehicles a lane can discharge per tick
    pub discharge_per_lane: usize,
    /// Probability of a cross-traffic arrival per tick
    pub cross_arrival_rate: f64,
    /// Phase length used after a phase expires on its own
    pub default_phase_duration: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            seed: None,
            tls_id: "J12".to_string(),
            lane_length: 100.0,
            travel_ticks: 4,
            discharge_per_lane: 1,
            cross_arrival_rate: 0.3,
            default_phase_duration: 15.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Approach {
    Main,
    Cross,
}

impl Approach {
    fn other(self) -> Self {
        match self {
            Approach::Main => Approach::Cross,
            Approach::Cross => Approach::Main,
        }
    }
}

#[derive(Debug, Clone)]
struct Vehicle {
    id: String,
    route: usize,
    position: usize,
    lane: usize,
    ticks_on_edge: u32,
    waiting_time: f64,
    arrived: bool,
}

/// Simplified single-junction simulator
pub struct SyntheticSimulator {
    config: SyntheticConfig,
    routes: Vec<(String, Vec<usize>)>,
    rng: StdRng,
    active: bool,
    time: f64,
    phase: Approach,
    phase_remaining: f64,
    vehicles: Vec<Vehicle>,
    vehicle_ids: HashSet<String>,
    cross_counter: u64,
    arrived: u64,
}

impl SyntheticSimulator {
    pub fn new(config: SyntheticConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let routes = vec![
            (MAIN_ROUTE.to_string(), vec![0, 1, 2]),
            (CROSS_ROUTE.to_string(), vec![3, 4]),
        ];
        let phase_remaining = config.default_phase_duration;

        Self {
            config,
            routes,
            rng,
            active: false,
            time: 0.0,
            phase: Approach::Main,
            phase_remaining,
            vehicles: Vec::new(),
            vehicle_ids: HashSet::new(),
            cross_counter: 0,
            arrived: 0,
        }
    }

    /// Whether a session is open
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Vehicles currently in the network
    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    /// Vehicles that completed their route in this session
    pub fn arrived_count(&self) -> u64 {
        self.arrived
    }

    /// Whether the main approach currently has green
    pub fn main_approach_green(&self) -> bool {
        self.phase == Approach::Main
    }

    fn ensure_active(&self) -> SimResult<()> {
        if self.active {
            Ok(())
        } else {
            Err(SimulatorError::NotConnected)
        }
    }

    fn edge_index(&self, edge: &str) -> SimResult<usize> {
        EDGES
            .iter()
            .position(|e| *e == edge)
            .ok_or_else(|| SimulatorError::unknown("edge", edge))
    }

    fn lane_index(&self, lane: &str) -> SimResult<(usize, usize)> {
        let (edge, index) = lane
            .rsplit_once('_')
            .ok_or_else(|| SimulatorError::unknown("lane", lane))?;
        let index: usize = index
            .parse()
            .map_err(|_| SimulatorError::unknown("lane", lane))?;
        let edge = self
            .edge_index(edge)
            .map_err(|_| SimulatorError::unknown("lane", lane))?;
        if index >= LANES_PER_EDGE {
            return Err(SimulatorError::unknown("lane", lane));
        }
        Ok((edge, index))
    }

    fn current_edge(&self, vehicle: &Vehicle) -> usize {
        self.routes[vehicle.route].1[vehicle.position]
    }

    fn spawn(&mut self, id: String, route: usize, lane: usize) {
        self.vehicle_ids.insert(id.clone());
        self.vehicles.push(Vehicle {
            id,
            route,
            position: 0,
            lane,
            ticks_on_edge: 0,
            waiting_time: 0.0,
            arrived: false,
        });
    }

    fn advance(&mut self) {
        self.time += 1.0;
        self.phase_remaining -= 1.0;
        if self.phase_remaining <= 0.0 {
            self.phase = self.phase.other();
            self.phase_remaining = self.config.default_phase_duration;
        }

        if self.rng.gen::<f64>() < self.config.cross_arrival_rate {
            let id = format!("cross_{}", self.cross_counter);
            self.cross_counter += 1;
            let lane = self.rng.gen_range(0..LANES_PER_EDGE);
            self.spawn(id, 1, lane);
        }

        let mut discharged = vec![0usize; EDGES.len() * LANES_PER_EDGE];
        let phase = self.phase;
        let travel_ticks = self.config.travel_ticks;
        let capacity = self.config.discharge_per_lane;

        for vehicle in &mut self.vehicles {
            if vehicle.ticks_on_edge < travel_ticks {
                vehicle.ticks_on_edge += 1;
                continue;
            }

            let route = &self.routes[vehicle.route].1;
            if vehicle.position + 1 == route.len() {
                vehicle.arrived = true;
                continue;
            }

            let edge = route[vehicle.position];
            let green = stop_line(edge).map_or(true, |approach| approach == phase);
            let slot = edge * LANES_PER_EDGE + vehicle.lane;
            if !green || discharged[slot] >= capacity {
                vehicle.waiting_time += 1.0;
                continue;
            }

            discharged[slot] += 1;
            vehicle.position += 1;
            vehicle.ticks_on_edge = 0;
            vehicle.waiting_time = 0.0;
        }

        let before = self.vehicles.len();
        let vehicle_ids = &mut self.vehicle_ids;
        self.vehicles.retain(|v| {
            if v.arrived {
                vehicle_ids.remove(&v.id);
            }
            !v.arrived
        });
        self.arrived += (before - self.vehicles.len()) as u64;
    }
}

/// Edges that end at the junction's stop lines
fn stop_line(edge: usize) -> Option<Approach> {
    match EDGES[edge] {
        "E3" => Some(Approach::Main),
        "E8" => Some(Approach::Cross),
        _ => None,
    }
}

impl Simulator for SyntheticSimulator {
    fn start(&mut self) -> SimResult<()> {
        if self.active {
            return Err(SimulatorError::AlreadyActive);
        }
        self.active = true;
        self.time = 0.0;
        self.phase = Approach::Main;
        self.phase_remaining = self.config.default_phase_duration;
        self.vehicles.clear();
        self.vehicle_ids.clear();
        self.arrived = 0;
        Ok(())
    }

    fn close(&mut self) -> SimResult<()> {
        if !self.active {
            return Err(SimulatorError::AlreadyClosed);
        }
        self.active = false;
        self.vehicles.clear();
        self.vehicle_ids.clear();
        Ok(())
    }

    fn simulation_step(&mut self) -> SimResult<()> {
        self.ensure_active()?;
        self.advance();
        Ok(())
    }

    fn time(&self) -> SimResult<f64> {
        self.ensure_active()?;
        Ok(self.time)
    }

    fn lane_vehicle_count(&self, lane: &str) -> SimResult<usize> {
        self.ensure_active()?;
        let (edge, index) = self.lane_index(lane)?;
        Ok(self
            .vehicles
            .iter()
            .filter(|v| self.current_edge(v) == edge && v.lane == index)
            .count())
    }

    fn lane_length(&self, lane: &str) -> SimResult<f64> {
        self.ensure_active()?;
        self.lane_index(lane)?;
        Ok(self.config.lane_length)
    }

    fn edge_vehicle_count(&self, edge: &str) -> SimResult<usize> {
        self.ensure_active()?;
        let edge = self.edge_index(edge)?;
        Ok(self
            .vehicles
            .iter()
            .filter(|v| self.current_edge(v) == edge)
            .count())
    }

    fn edge_waiting_time(&self, edge: &str) -> SimResult<f64> {
        self.ensure_active()?;
        let edge = self.edge_index(edge)?;
        Ok(self
            .vehicles
            .iter()
            .filter(|v| self.current_edge(v) == edge)
            .map(|v| v.waiting_time)
            .sum())
    }

    fn set_phase_duration(&mut self, tls_id: &str, duration: f64) -> SimResult<()> {
        self.ensure_active()?;
        if tls_id != self.config.tls_id {
            return Err(SimulatorError::unknown("traffic light", tls_id));
        }
        // The action always describes the main approach's green time
        self.phase = Approach::Main;
        self.phase_remaining = duration;
        Ok(())
    }

    fn add_vehicle(&mut self, vehicle_id: &str, route_id: &str, _depart: f64) -> SimResult<()> {
        self.ensure_active()?;
        if self.vehicle_ids.contains(vehicle_id) {
            return Err(SimulatorError::DuplicateVehicle(vehicle_id.to_string()));
        }
        let route = self
            .routes
            .iter()
            .position(|(id, _)| id == route_id)
            .ok_or_else(|| SimulatorError::UnknownRoute(route_id.to_string()))?;
        self.spawn(vehicle_id.to_string(), route, 0);
        Ok(())
    }

    fn change_lane(
        &mut self,
        vehicle_id: &str,
        lane_index: usize,
        _duration: f64,
    ) -> SimResult<()> {
        self.ensure_active()?;
        if lane_index >= LANES_PER_EDGE {
            return Err(SimulatorError::InvalidLane {
                vehicle: vehicle_id.to_string(),
                lane: lane_index,
            });
        }
        let vehicle = self
            .vehicles
            .iter_mut()
            .find(|v| v.id == vehicle_id)
            .ok_or_else(|| SimulatorError::unknown("vehicle", vehicle_id))?;
        vehicle.lane = lane_index;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet() -> SyntheticSimulator {
        SyntheticSimulator::new(SyntheticConfig {
            seed: Some(7),
            cross_arrival_rate: 0.0,
            ..Default::default()
        })
    }

    #[test]
    fn test_session_lifecycle() {
        let mut sim = quiet();
        assert_eq!(sim.time(), Err(SimulatorError::NotConnected));
        assert_eq!(sim.close(), Err(SimulatorError::AlreadyClosed));

        sim.start().unwrap();
        assert_eq!(sim.start(), Err(SimulatorError::AlreadyActive));
        sim.simulation_step().unwrap();
        assert_eq!(sim.time().unwrap(), 1.0);

        sim.close().unwrap();
        assert!(!sim.is_active());
    }

    #[test]
    fn test_injection_errors() {
        let mut sim = quiet();
        sim.start().unwrap();

        sim.add_vehicle("v0", MAIN_ROUTE, 0.0).unwrap();
        assert_eq!(
            sim.add_vehicle("v0", MAIN_ROUTE, 0.0),
            Err(SimulatorError::DuplicateVehicle("v0".into()))
        );
        assert_eq!(
            sim.add_vehicle("v1", "nowhere", 0.0),
            Err(SimulatorError::UnknownRoute("nowhere".into()))
        );
        assert!(sim.change_lane("v0", 5, 1000.0).unwrap_err().is_injection_failure());

        sim.change_lane("v0", 1, 1000.0).unwrap();
        assert_eq!(sim.lane_vehicle_count("E5_1").unwrap(), 1);
        assert_eq!(sim.lane_vehicle_count("E5_0").unwrap(), 0);
        assert_eq!(sim.edge_vehicle_count("E5").unwrap(), 1);
    }

    #[test]
    fn test_unknown_objects() {
        let mut sim = quiet();
        sim.start().unwrap();

        assert!(sim.lane_vehicle_count("E42_0").is_err());
        assert!(sim.lane_vehicle_count("E3_7").is_err());
        assert!(sim.edge_waiting_time("nope").is_err());
        assert!(sim.set_phase_duration("J99", 10.0).is_err());
        assert_eq!(sim.lane_length("E3_1").unwrap(), 100.0);
    }

    #[test]
    fn test_red_light_builds_waiting_time() {
        let mut sim = quiet();
        sim.start().unwrap();
        sim.add_vehicle("v0", MAIN_ROUTE, 0.0).unwrap();

        // Hold the cross approach green for a long time
        sim.set_phase_duration("J12", 1.0).unwrap();
        sim.simulation_step().unwrap();
        assert!(!sim.main_approach_green());
        sim.phase_remaining = 1000.0;

        for _ in 0..30 {
            sim.simulation_step().unwrap();
        }

        assert_eq!(sim.edge_vehicle_count("E3").unwrap(), 1);
        assert!(sim.edge_waiting_time("E3").unwrap() > 0.0);
    }

    #[test]
    fn test_green_light_lets_vehicles_through() {
        let mut sim = quiet();
        sim.start().unwrap();
        sim.add_vehicle("v0", MAIN_ROUTE, 0.0).unwrap();
        sim.set_phase_duration("J12", 1000.0).unwrap();

        for _ in 0..20 {
            sim.simulation_step().unwrap();
        }

        assert_eq!(sim.vehicle_count(), 0);
        assert_eq!(sim.arrived_count(), 1);
    }

    #[test]
    fn test_restart_clears_network() {
        let mut sim = quiet();
        sim.start().unwrap();
        sim.add_vehicle("v0", MAIN_ROUTE, 0.0).unwrap();
        sim.close().unwrap();
        sim.start().unwrap();

        assert_eq!(sim.vehicle_count(), 0);
        assert_eq!(sim.time().unwrap(), 0.0);
        sim.add_vehicle("v0", MAIN_ROUTE, 0.0).unwrap();
    }
}
