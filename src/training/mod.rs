//! Training loop and background learning.

mod replay_worker;
mod trainer;

pub use replay_worker::ReplayWorker;
pub use trainer::{EpisodeSummary, Trainer, TrainerConfig, TrainingReport};
