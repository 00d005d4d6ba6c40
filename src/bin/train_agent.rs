//! Train a DQN agent to time the signal at a single junction.
//!
//! Usage:
//! ```bash
//! cargo run --release --bin train_agent
//! cargo run --release --bin train_agent -- --episodes 20 --max-steps 200 --metrics-dir results
//! cargo run --release --bin train_agent -- --config traffic.json
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rust_rl_traffic::{
    agent::{Agent, DQNAgent},
    environment::{SyntheticSimulator, TrafficEnvironment},
    training::Trainer,
    utils::{export_metrics, AppConfig, TrainingMetrics},
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Train a DQN traffic-signal controller")]
struct Args {
    /// JSON configuration file; defaults plus TRAFFIC_* variables otherwise
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of episodes
    #[arg(long)]
    episodes: Option<usize>,

    /// Steps per episode
    #[arg(long)]
    max_steps: Option<usize>,

    /// Batch size for learning updates
    #[arg(long)]
    batch_size: Option<usize>,

    /// Seed for traffic demand and the synthetic junction
    #[arg(long)]
    seed: Option<u64>,

    /// Output path for the trained model
    #[arg(long)]
    output: Option<PathBuf>,

    /// Directory for steps.csv, variation.csv and episodes.csv
    #[arg(long)]
    metrics_dir: Option<PathBuf>,

    /// Write the effective configuration to this path and exit
    #[arg(long)]
    write_config: Option<PathBuf>,
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    }
    .with_env_overrides();

    if let Some(episodes) = args.episodes {
        config.training.episodes = episodes;
    }
    if let Some(max_steps) = args.max_steps {
        config.training.max_steps = max_steps;
    }
    if let Some(batch_size) = args.batch_size {
        config.training.batch_size = batch_size;
    }
    if let Some(seed) = args.seed {
        config.training.seed = Some(seed);
    }
    if let Some(output) = &args.output {
        config.training.model_path = output.to_string_lossy().into_owned();
    }
    if let Some(dir) = &args.metrics_dir {
        config.training.metrics_dir = Some(dir.to_string_lossy().into_owned());
    }

    if config.simulator.seed.is_none() {
        config.simulator.seed = config.training.seed;
    }

    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    if let Some(path) = &args.write_config {
        config.to_file(path)?;
        info!("Configuration written to {:?}", path);
        return Ok(());
    }

    let simulator = SyntheticSimulator::new(config.simulator.clone());
    let env = TrafficEnvironment::new(simulator, config.environment.clone(), config.training.seed);
    let agent = Arc::new(DQNAgent::new(config.agent.clone()));

    info!(
        "Training {} for {} episodes of {} steps",
        agent.name(),
        config.training.episodes,
        config.training.max_steps
    );

    let pb = ProgressBar::new(config.training.episodes as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(concat!(
                "{spinner:.green} [{elapsed_precise}] ",
                "[{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}"
            ))?
            .progress_chars("#>-"),
    );

    let log_freq = config.training.log_freq.max(1);
    let mut trainer = Trainer::new(env, Arc::clone(&agent), config.training.trainer_config());
    let report = trainer.run_with(|summary| {
        pb.inc(1);
        pb.set_message(format!(
            "Reward: {:>9.2} | ε: {:.3}",
            summary.total_reward, summary.epsilon
        ));
        if summary.episode % log_freq == 0 {
            pb.println(format!(
                "Episode {}: Reward: {:.3}, Steps: {}, Epsilon: {:.4}",
                summary.episode, summary.total_reward, summary.steps, summary.epsilon
            ));
        }
    });
    pb.finish_with_message("Training complete!");

    let report = match report {
        Ok(report) => report,
        Err(err) => {
            let _ = trainer.close();
            return Err(err);
        }
    };

    let metrics = TrainingMetrics::from_run(trainer.env().history(), &report.episodes);
    info!("\n{}", metrics);
    info!(
        "Learning updates: {} launched, {} skipped while busy",
        report.replays_launched, report.replays_dropped
    );

    let model_path = PathBuf::from(&config.training.model_path);
    if let Some(parent) = model_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    agent
        .save(&model_path)
        .with_context(|| format!("failed to save model to {:?}", model_path))?;
    info!("Model saved to {:?}", model_path);

    if let Some(dir) = &config.training.metrics_dir {
        export_metrics(
            dir,
            trainer.env().history(),
            trainer.env().dynamics().variation(),
            &report.episodes,
        )?;
        info!("Metrics written to {}", dir);
    }

    trainer.close()?;
    Ok(())
}
