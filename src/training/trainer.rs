//! Episode loop driving the environment with an agent.

use crate::agent::Agent;
use crate::environment::{Simulator, TrafficEnvironment};
use crate::training::ReplayWorker;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, Level};

/// Training loop parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Number of episodes
    pub episodes: usize,
    /// Steps per episode
    pub max_steps: usize,
    /// Batch size for each learning update
    pub batch_size: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            episodes: 1,
            max_steps: 100,
            batch_size: 64,
        }
    }
}

/// Outcome of one episode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub episode: usize,
    pub total_reward: f64,
    pub steps: usize,
    /// Epsilon when the episode ended
    pub epsilon: f64,
}

/// Outcome of a full training run
#[derive(Debug, Clone, Default)]
pub struct TrainingReport {
    pub episodes: Vec<EpisodeSummary>,
    /// Learning updates launched in the background
    pub replays_launched: u64,
    /// Learning triggers dropped because an update was running
    pub replays_dropped: u64,
}

/// Owns the environment and a shared handle to the agent
pub struct Trainer<S: Simulator, A: Agent + 'static> {
    env: TrafficEnvironment<S>,
    agent: Arc<A>,
    config: TrainerConfig,
    worker: ReplayWorker,
}

impl<S: Simulator, A: Agent + 'static> Trainer<S, A> {
    pub fn new(env: TrafficEnvironment<S>, agent: Arc<A>, config: TrainerConfig) -> Self {
        Self {
            env,
            agent,
            config,
            worker: ReplayWorker::new(),
        }
    }

    /// Run every episode
    pub fn run(&mut self) -> Result<TrainingReport> {
        self.run_with(|_| {})
    }

    /// Run every episode, calling `on_episode` after each one.
    ///
    /// Returns only after any in-flight learning update has finished, so the
    /// agent's parameters are final once this returns.
    pub fn run_with<F>(&mut self, mut on_episode: F) -> Result<TrainingReport>
    where
        F: FnMut(&EpisodeSummary),
    {
        let mut episodes = Vec::with_capacity(self.config.episodes);

        for episode in 0..self.config.episodes {
            let summary = match self.run_episode(episode) {
                Ok(summary) => summary,
                Err(err) => {
                    // Still wait for the learner before handing the error back
                    let _ = self.worker.join();
                    return Err(err);
                }
            };
            on_episode(&summary);
            episodes.push(summary);
        }

        self.worker
            .join()
            .context("background learning update failed")?;

        Ok(TrainingReport {
            episodes,
            replays_launched: self.worker.launched(),
            replays_dropped: self.worker.dropped(),
        })
    }

    fn run_episode(&mut self, episode: usize) -> Result<EpisodeSummary> {
        info!(
            episode = episode + 1,
            episodes = self.config.episodes,
            "starting episode"
        );

        let mut state = self
            .env
            .reset()
            .with_context(|| format!("failed to reset environment for episode {}", episode + 1))?;
        let mut total_reward = 0.0;
        let mut step_count = 0;
        let mut done = false;

        while !done {
            self.env.perturb_traffic()?;

            if tracing::enabled!(Level::DEBUG) {
                let q_values = self.agent.q_values(&state);
                debug!(
                    step = step_count + 1,
                    ?q_values,
                    epsilon = self.agent.epsilon(),
                    "q-values"
                );
            }

            let action = self.agent.act(&state);
            let result = self.env.step(action, step_count + 1, self.config.max_steps)?;

            self.agent
                .remember(state, action, result.reward, result.state, result.done);

            state = result.state;
            total_reward += result.reward;
            step_count += 1;
            done = result.done;

            if self.agent.memory_len() > self.config.batch_size {
                let agent = Arc::clone(&self.agent);
                let batch_size = self.config.batch_size;
                self.worker.trigger(move || {
                    agent.replay(batch_size)?;
                    Ok(())
                })?;
            }
        }

        let summary = EpisodeSummary {
            episode: episode + 1,
            total_reward,
            steps: step_count,
            epsilon: self.agent.epsilon(),
        };

        info!(
            episode = summary.episode,
            total_reward = summary.total_reward,
            steps = summary.steps,
            epsilon = summary.epsilon,
            "episode finished"
        );

        Ok(summary)
    }

    /// Close the simulator session
    pub fn close(&mut self) -> Result<()> {
        self.env.close()
    }

    pub fn env(&self) -> &TrafficEnvironment<S> {
        &self.env
    }
}
