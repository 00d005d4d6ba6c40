//! Configuration and metrics helpers.

mod config;
mod metrics;

pub use config::{AppConfig, TrainingConfig};
pub use metrics::{
    action_distribution, export_metrics, mean, save_episodes_csv, save_steps_csv,
    save_variation_csv, ActionShare, TrainingMetrics,
};
