//! Synthetic demand fluctuation.
//!
//! Every call flips a coin between a high and a low traffic regime and injects
//! vehicles accordingly, independent of what the agent does. This is what makes
//! the load the agent sees non-stationary.

use crate::environment::simulator::{SimResult, Simulator};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{info, trace};

/// Coarse demand class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrafficRegime {
    High,
    Low,
}

impl std::fmt::Display for TrafficRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrafficRegime::High => write!(f, "High Traffic"),
            TrafficRegime::Low => write!(f, "Low Traffic"),
        }
    }
}

/// Injection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicsConfig {
    /// Route every injected vehicle follows
    pub route_id: String,
    /// Lane indices vehicles are pinned to
    pub injection_lanes: Vec<usize>,
    /// Vehicles per lane in the high regime
    pub vehicles_per_lane_high: usize,
    /// Draws above this value select the high regime
    pub high_traffic_threshold: f64,
    /// Prefix of generated vehicle ids
    pub vehicle_prefix: String,
    /// How long an injected vehicle stays on its lane
    pub lane_change_duration: f64,
}

impl Default for DynamicsConfig {
    fn default() -> Self {
        Self {
            route_id: "E5_to_E6_via_E3".to_string(),
            injection_lanes: vec![0, 1],
            vehicles_per_lane_high: 5,
            high_traffic_threshold: 0.5,
            vehicle_prefix: "dynamic_car_".to_string(),
            lane_change_duration: 1000.0,
        }
    }
}

/// Regime and counters after one perturbation round
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrafficVariation {
    pub regime: TrafficRegime,
    pub high_count: usize,
    pub low_count: usize,
}

impl TrafficVariation {
    pub fn total(&self) -> usize {
        self.high_count + self.low_count
    }
}

/// Stochastic vehicle injector
pub struct TrafficDynamics {
    config: DynamicsConfig,
    rng: StdRng,
    vehicle_counter: u64,
    high_traffic_count: usize,
    low_traffic_count: usize,
    previous: Option<TrafficRegime>,
    variation: Vec<TrafficVariation>,
}

impl TrafficDynamics {
    /// Create an injector; a seed makes the regime sequence reproducible
    pub fn new(config: DynamicsConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            config,
            rng,
            vehicle_counter: 0,
            high_traffic_count: 0,
            low_traffic_count: 0,
            previous: None,
            variation: Vec::new(),
        }
    }

    /// Run one perturbation round against the simulator.
    ///
    /// Injection failures are dropped; any other simulator error is returned.
    pub fn perturb<S: Simulator + ?Sized>(&mut self, sim: &mut S) -> SimResult<TrafficRegime> {
        let draw: f64 = self.rng.gen();
        let regime = if draw > self.config.high_traffic_threshold {
            TrafficRegime::High
        } else {
            TrafficRegime::Low
        };

        if let Some(previous) = self.previous {
            if previous != regime {
                self.close_regime(previous);
            }
        }

        match regime {
            TrafficRegime::High => {
                let lanes = self.config.injection_lanes.clone();
                for lane_index in lanes {
                    for _ in 0..self.config.vehicles_per_lane_high {
                        if self.inject(sim, lane_index)? {
                            self.high_traffic_count += 1;
                        }
                    }
                }
            }
            TrafficRegime::Low => {
                let lane = self.config.injection_lanes.choose(&mut self.rng).copied();
                if let Some(lane_index) = lane {
                    if self.inject(sim, lane_index)? {
                        self.low_traffic_count += 1;
                    }
                }
            }
        }

        self.variation.push(TrafficVariation {
            regime,
            high_count: self.high_traffic_count,
            low_count: self.low_traffic_count,
        });
        self.previous = Some(regime);

        Ok(regime)
    }

    fn close_regime(&mut self, left: TrafficRegime) {
        let counter = match left {
            TrafficRegime::High => &mut self.high_traffic_count,
            TrafficRegime::Low => &mut self.low_traffic_count,
        };
        info!(regime = %left, cars_added = *counter, "traffic regime ended");
        *counter = 0;
    }

    /// Place one vehicle; `Ok(false)` when the simulator refused it
    fn inject<S: Simulator + ?Sized>(&mut self, sim: &mut S, lane_index: usize) -> SimResult<bool> {
        let vehicle_id = format!("{}{}", self.config.vehicle_prefix, self.vehicle_counter);
        self.vehicle_counter += 1;

        let depart = sim.time()?;
        let placed = sim
            .add_vehicle(&vehicle_id, &self.config.route_id, depart)
            .and_then(|_| {
                sim.change_lane(&vehicle_id, lane_index, self.config.lane_change_duration)
            });

        match placed {
            Ok(()) => Ok(true),
            Err(err) if err.is_injection_failure() => {
                trace!(vehicle = %vehicle_id, error = %err, "vehicle injection skipped");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    pub fn high_traffic_count(&self) -> usize {
        self.high_traffic_count
    }

    pub fn low_traffic_count(&self) -> usize {
        self.low_traffic_count
    }

    /// Number of vehicle ids handed out so far
    pub fn vehicles_generated(&self) -> u64 {
        self.vehicle_counter
    }

    /// Per-round regime and counter history
    pub fn variation(&self) -> &[TrafficVariation] {
        &self.variation
    }
}
