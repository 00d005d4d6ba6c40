//! End-to-end training runs on the synthetic junction.

use rust_rl_traffic::agent::{Agent, DQNAgent, DQNConfig};
use rust_rl_traffic::environment::{
    EnvConfig, SyntheticConfig, SyntheticSimulator, TrafficEnvironment, TrafficState, ACTION_SIZE,
};
use rust_rl_traffic::training::{Trainer, TrainerConfig};
use rust_rl_traffic::utils::{export_metrics, AppConfig, TrainingMetrics};
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

fn environment(seed: u64) -> TrafficEnvironment<SyntheticSimulator> {
    let simulator = SyntheticSimulator::new(SyntheticConfig {
        seed: Some(seed),
        ..Default::default()
    });
    TrafficEnvironment::new(simulator, EnvConfig::default(), Some(seed))
}

#[test]
fn test_training_run_completes() {
    let agent = Arc::new(DQNAgent::new(DQNConfig::default()));
    let config = TrainerConfig {
        episodes: 2,
        max_steps: 12,
        batch_size: 4,
    };
    let mut trainer = Trainer::new(environment(11), Arc::clone(&agent), config);

    let mut seen = Vec::new();
    let report = trainer.run_with(|summary| seen.push(summary.episode)).unwrap();

    assert_eq!(seen, vec![1, 2]);
    assert_eq!(report.episodes.len(), 2);
    assert!(report.episodes.iter().all(|e| e.steps == 12));
    assert!(report.episodes.iter().all(|e| e.total_reward.is_finite()));
    assert_eq!(agent.memory_len(), 24);

    // Every launched replay ran to completion before `run` returned
    assert!(report.replays_launched >= 1);
    assert_eq!(agent.updates(), report.replays_launched);

    let expected = (0.3 * 0.95f64.powi(report.replays_launched as i32)).max(0.01);
    assert!((agent.epsilon() - expected).abs() < 1e-12);

    assert_eq!(trainer.env().history().len(), 24);
    trainer.close().unwrap();
    assert!(!trainer.env().simulator().is_active());
}

#[test]
fn test_back_to_back_episodes_restart_the_session() {
    let agent = Arc::new(DQNAgent::new(DQNConfig::default()));
    let config = TrainerConfig {
        episodes: 3,
        max_steps: 3,
        batch_size: 64,
    };
    let mut trainer = Trainer::new(environment(12), agent, config);

    let report = trainer.run().unwrap();

    assert_eq!(report.episodes.len(), 3);
    assert_eq!(report.replays_launched, 0);
    assert!(trainer.env().simulator().is_active());
    // Cumulative reward restarts with every episode
    let last = &trainer.env().history()[8];
    assert!((last.cumulative_reward - report.episodes[2].total_reward).abs() < 1e-9);
}

#[test]
fn test_trained_model_round_trips() {
    let dir = tempdir().unwrap();
    let model_path = dir.path().join("traffic_dqn.json");

    let agent = Arc::new(DQNAgent::new(DQNConfig::default()));
    let config = TrainerConfig {
        episodes: 1,
        max_steps: 10,
        batch_size: 3,
    };
    let mut trainer = Trainer::new(environment(13), Arc::clone(&agent), config);
    trainer.run().unwrap();
    agent.save(&model_path).unwrap();

    let loaded = DQNAgent::load(&model_path).unwrap();
    assert_eq!(loaded.updates(), agent.updates());
    assert!((loaded.epsilon() - agent.epsilon()).abs() < 1e-12);
    assert_eq!(loaded.memory_len(), 0);

    let state = TrafficState::new(0.02, 15.0, 3.0);
    let original = agent.q_values(&state);
    let restored = loaded.q_values(&state);
    assert_eq!(original.len(), ACTION_SIZE);
    for (a, b) in original.iter().zip(restored.iter()) {
        assert!((a - b).abs() < 1e-9);
    }
}

#[test]
fn test_shared_agent_serves_actions_during_learning() {
    let agent = Arc::new(DQNAgent::new(DQNConfig::default()));
    let mut env = environment(14);
    let mut state = env.reset().unwrap();

    for step in 1..=40 {
        let action = agent.act(&state);
        let result = env.step(action, step, 40).unwrap();
        agent.remember(state, action, result.reward, result.state, result.done);
        state = result.state;
    }

    let learner = {
        let agent = Arc::clone(&agent);
        thread::spawn(move || {
            for _ in 0..10 {
                agent.replay(16).unwrap();
            }
        })
    };

    for _ in 0..200 {
        let q_values = agent.q_values(&state);
        assert_eq!(q_values.len(), ACTION_SIZE);
        assert!(q_values.iter().all(|q| q.is_finite()));
        let epsilon = agent.epsilon();
        assert!((0.01..=0.3).contains(&epsilon));
        agent.act(&state);
    }

    learner.join().unwrap();
    assert_eq!(agent.updates(), 10);
    env.close().unwrap();
}

#[test]
fn test_metrics_export_after_training() {
    let dir = tempdir().unwrap();
    let agent = Arc::new(DQNAgent::new(DQNConfig::default()));
    let config = TrainerConfig {
        episodes: 2,
        max_steps: 5,
        batch_size: 64,
    };
    let mut trainer = Trainer::new(environment(15), agent, config);
    let report = trainer.run().unwrap();

    let history = trainer.env().history();
    let variation = trainer.env().dynamics().variation();
    export_metrics(dir.path(), history, variation, &report.episodes).unwrap();

    let mut steps = csv::Reader::from_path(dir.path().join("steps.csv")).unwrap();
    assert_eq!(steps.records().count(), 10);
    // Two perturbation rounds per step: one before acting, one inside the step
    let mut rounds = csv::Reader::from_path(dir.path().join("variation.csv")).unwrap();
    assert_eq!(rounds.records().count(), 20);
    let mut episodes = csv::Reader::from_path(dir.path().join("episodes.csv")).unwrap();
    assert_eq!(episodes.records().count(), 2);

    let metrics = TrainingMetrics::from_run(history, &report.episodes);
    assert_eq!(metrics.total_steps, 10);
    let counted: usize = metrics.actions.iter().map(|a| a.count).sum();
    assert_eq!(counted, 10);
}

#[test]
fn test_default_config_builds_a_runnable_setup() {
    let mut config = AppConfig::default();
    config.training.max_steps = 2;
    config.simulator.seed = Some(16);
    config.validate().unwrap();

    let simulator = SyntheticSimulator::new(config.simulator.clone());
    let env = TrafficEnvironment::new(simulator, config.environment.clone(), Some(16));
    let agent = Arc::new(DQNAgent::new(config.agent.clone()));
    let mut trainer = Trainer::new(env, agent, config.training.trainer_config());

    let report = trainer.run().unwrap();
    assert_eq!(report.episodes.len(), 1);
    assert_eq!(report.episodes[0].steps, 2);
}
