//! Training metrics and CSV export.

use crate::environment::{
    SignalAction, StepRecord, TrafficRegime, TrafficVariation, ACTION_SIZE, SIGNAL_TIMINGS,
};
use crate::training::EpisodeSummary;
use anyhow::{Context, Result};
use std::path::Path;

/// Mean of a slice, `0.0` when empty
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// How often one signal timing was chosen
#[derive(Debug, Clone, PartialEq)]
pub struct ActionShare {
    pub action: SignalAction,
    pub count: usize,
    /// Fraction of all recorded steps
    pub share: f64,
}

/// Count of every action over the history, in table order
pub fn action_distribution(history: &[StepRecord]) -> Vec<ActionShare> {
    let mut counts = [0usize; ACTION_SIZE];
    for record in history {
        if let Some(slot) = counts.get_mut(record.action) {
            *slot += 1;
        }
    }

    let total = history.len();
    SignalAction::ALL
        .iter()
        .zip(counts.iter())
        .map(|(&action, &count)| ActionShare {
            action,
            count,
            share: if total == 0 {
                0.0
            } else {
                count as f64 / total as f64
            },
        })
        .collect()
}

/// Summary of a training run
#[derive(Debug, Clone)]
pub struct TrainingMetrics {
    pub episodes: usize,
    pub total_steps: usize,
    pub mean_episode_reward: f64,
    pub best_episode_reward: f64,
    pub mean_step_reward: f64,
    pub mean_waiting_time: f64,
    pub high_traffic_steps: usize,
    pub low_traffic_steps: usize,
    pub final_epsilon: f64,
    pub actions: Vec<ActionShare>,
}

impl TrainingMetrics {
    pub fn from_run(history: &[StepRecord], episodes: &[EpisodeSummary]) -> Self {
        let episode_rewards: Vec<f64> = episodes.iter().map(|e| e.total_reward).collect();
        let step_rewards: Vec<f64> = history.iter().map(|r| r.reward).collect();
        let waiting: Vec<f64> = history.iter().map(|r| r.waiting_time).collect();
        let high_traffic_steps = history
            .iter()
            .filter(|r| r.regime == TrafficRegime::High)
            .count();

        Self {
            episodes: episodes.len(),
            total_steps: history.len(),
            mean_episode_reward: mean(&episode_rewards),
            best_episode_reward: episode_rewards
                .iter()
                .copied()
                .fold(f64::NEG_INFINITY, f64::max),
            mean_step_reward: mean(&step_rewards),
            mean_waiting_time: mean(&waiting),
            high_traffic_steps,
            low_traffic_steps: history.len() - high_traffic_steps,
            final_epsilon: episodes.last().map_or(0.0, |e| e.epsilon),
            actions: action_distribution(history),
        }
    }
}

impl std::fmt::Display for TrainingMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Training Metrics:")?;
        writeln!(f, "  Episodes:            {:>10}", self.episodes)?;
        writeln!(f, "  Total Steps:         {:>10}", self.total_steps)?;
        writeln!(f, "  Mean Episode Reward: {:>10.3}", self.mean_episode_reward)?;
        writeln!(f, "  Best Episode Reward: {:>10.3}", self.best_episode_reward)?;
        writeln!(f, "  Mean Step Reward:    {:>10.3}", self.mean_step_reward)?;
        writeln!(f, "  Mean Waiting Time:   {:>10.2}", self.mean_waiting_time)?;
        writeln!(f, "  High Traffic Steps:  {:>10}", self.high_traffic_steps)?;
        writeln!(f, "  Low Traffic Steps:   {:>10}", self.low_traffic_steps)?;
        writeln!(f, "  Final Epsilon:       {:>10.4}", self.final_epsilon)?;
        writeln!(f, "  Action Distribution:")?;
        for share in &self.actions {
            let timing = share.action.timing();
            writeln!(
                f,
                "    green {:>2}s / red {:>2}s: {:>6} ({:>5.1}%)",
                timing.green_duration,
                timing.red_duration,
                share.count,
                share.share * 100.0
            )?;
        }
        Ok(())
    }
}

/// Write the per-step history
pub fn save_steps_csv(history: &[StepRecord], path: impl AsRef<Path>) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;

    writer.write_record([
        "time_step",
        "action",
        "green_duration",
        "red_duration",
        "reward",
        "cumulative_reward",
        "waiting_time",
        "regime",
        "high_traffic_count",
        "low_traffic_count",
    ])?;

    for record in history {
        let (green, red) = SIGNAL_TIMINGS
            .get(record.action)
            .map_or((0, 0), |t| (t.green_duration, t.red_duration));
        writer.write_record([
            record.time_step.to_string(),
            record.action.to_string(),
            green.to_string(),
            red.to_string(),
            record.reward.to_string(),
            record.cumulative_reward.to_string(),
            record.waiting_time.to_string(),
            record.regime.to_string(),
            record.high_traffic_count.to_string(),
            record.low_traffic_count.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Write one row per episode
pub fn save_episodes_csv(episodes: &[EpisodeSummary], path: impl AsRef<Path>) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;

    writer.write_record(["episode", "total_reward", "steps", "epsilon"])?;

    for episode in episodes {
        writer.write_record([
            episode.episode.to_string(),
            episode.total_reward.to_string(),
            episode.steps.to_string(),
            episode.epsilon.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Write one row per perturbation round
pub fn save_variation_csv(variation: &[TrafficVariation], path: impl AsRef<Path>) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;

    writer.write_record(["round", "regime", "high_count", "low_count", "total"])?;

    for (round, entry) in variation.iter().enumerate() {
        writer.write_record([
            (round + 1).to_string(),
            entry.regime.to_string(),
            entry.high_count.to_string(),
            entry.low_count.to_string(),
            entry.total().to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Write `steps.csv`, `variation.csv` and `episodes.csv` into `dir`,
/// creating it if needed
pub fn export_metrics(
    dir: impl AsRef<Path>,
    history: &[StepRecord],
    variation: &[TrafficVariation],
    episodes: &[EpisodeSummary],
) -> Result<()> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create metrics dir {}", dir.display()))?;
    save_steps_csv(history, dir.join("steps.csv"))?;
    save_variation_csv(variation, dir.join("variation.csv"))?;
    save_episodes_csv(episodes, dir.join("episodes.csv"))?;
    Ok(())
}
