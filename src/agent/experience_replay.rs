//! Experience replay buffer for DQN.

use crate::environment::{SignalAction, TrafficState};
use rand::seq::index;
use rand::thread_rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Single experience tuple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub state: TrafficState,
    pub action: SignalAction,
    pub reward: f64,
    pub next_state: TrafficState,
    pub done: bool,
}

impl Experience {
    pub fn new(
        state: TrafficState,
        action: SignalAction,
        reward: f64,
        next_state: TrafficState,
        done: bool,
    ) -> Self {
        Self {
            state,
            action,
            reward,
            next_state,
            done,
        }
    }
}

/// Fixed-capacity FIFO buffer of experiences
pub struct ReplayBuffer {
    buffer: VecDeque<Experience>,
    capacity: usize,
}

impl ReplayBuffer {
    /// Create a new replay buffer with given capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Add an experience, evicting the oldest one when full
    pub fn push(&mut self, experience: Experience) {
        if self.capacity == 0 {
            return;
        }
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(experience);
    }

    /// Draw `batch_size` distinct experiences uniformly at random.
    ///
    /// Returns `None` while fewer than `batch_size` experiences are stored.
    pub fn sample(&self, batch_size: usize) -> Option<Vec<Experience>> {
        if !self.can_sample(batch_size) {
            return None;
        }

        let mut rng = thread_rng();
        let batch = index::sample(&mut rng, self.buffer.len(), batch_size)
            .into_iter()
            .map(|i| self.buffer[i].clone())
            .collect();
        Some(batch)
    }

    /// Get the current size of the buffer
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Check if buffer has enough samples for training
    pub fn can_sample(&self, batch_size: usize) -> bool {
        self.buffer.len() >= batch_size
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Iterate from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &Experience> {
        self.buffer.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn experience(tag: usize) -> Experience {
        let state = TrafficState::new(0.0, tag as f64, 0.0);
        let next_state = TrafficState::new(0.1, tag as f64 + 1.0, 1.0);
        Experience::new(state, SignalAction::Green15, tag as f64, next_state, false)
    }

    fn tag(experience: &Experience) -> usize {
        experience.reward as usize
    }

    #[test]
    fn test_size_never_exceeds_capacity() {
        let mut buffer = ReplayBuffer::new(10);

        for i in 0..25 {
            buffer.push(experience(i));
            assert!(buffer.len() <= buffer.capacity());
        }

        assert_eq!(buffer.len(), 10);
    }

    #[test]
    fn test_fifo_eviction() {
        let mut buffer = ReplayBuffer::new(5);
        for i in 0..6 {
            buffer.push(experience(i));
        }

        let tags: Vec<usize> = buffer.iter().map(tag).collect();
        assert_eq!(tags, vec![1, 2, 3, 4, 5]);
        assert!(!buffer.iter().any(|e| tag(e) == 0));
    }

    #[test]
    fn test_sample_requires_enough_experiences() {
        let mut buffer = ReplayBuffer::new(100);
        for i in 0..31 {
            buffer.push(experience(i));
        }

        assert!(!buffer.can_sample(32));
        assert!(buffer.sample(32).is_none());

        buffer.push(experience(31));
        let batch = buffer.sample(32).unwrap();
        assert_eq!(batch.len(), 32);
    }

    #[test]
    fn test_sample_without_replacement() {
        let mut buffer = ReplayBuffer::new(100);
        for i in 0..50 {
            buffer.push(experience(i));
        }

        for _ in 0..20 {
            let batch = buffer.sample(40).unwrap();
            let distinct: HashSet<usize> = batch.iter().map(tag).collect();
            assert_eq!(distinct.len(), 40);
        }
    }

    #[test]
    fn test_clear() {
        let mut buffer = ReplayBuffer::new(4);
        buffer.push(experience(0));
        buffer.clear();
        assert!(buffer.is_empty());
    }
}
