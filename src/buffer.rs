// src/buffer.rs
//
// Fixed-capacity history of (observation, action) pairs.
//
// Oldest entries are discarded on overflow. The pair stored at index k
// holds the observation reached at sample k together with the action that
// was in effect when it was reached (the previous sample's action).

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct ObservationActionBuffer {
    capacity: usize,
    observations: VecDeque<Vec<f64>>,
    actions: VecDeque<Vec<f64>>,
}

impl ObservationActionBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            observations: VecDeque::with_capacity(capacity),
            actions: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn push(&mut self, observation: &[f64], action: &[f64]) {
        if self.observations.len() == self.capacity {
            self.observations.pop_front();
            self.actions.pop_front();
        }
        self.observations.push_back(observation.to_vec());
        self.actions.push_back(action.to_vec());
    }

    pub fn observations(&self) -> impl Iterator<Item = &Vec<f64>> {
        self.observations.iter()
    }

    pub fn actions(&self) -> impl Iterator<Item = &Vec<f64>> {
        self.actions.iter()
    }

    /// Consecutive transitions `(o_k, a_k, o_{k+1})` where `a_k` is the
    /// action applied between the two observations.
    pub fn transitions(&self) -> impl Iterator<Item = (&Vec<f64>, &Vec<f64>, &Vec<f64>)> {
        self.observations
            .iter()
            .zip(self.observations.iter().skip(1))
            .zip(self.actions.iter().skip(1))
            .map(|((obs, next_obs), action)| (obs, action, next_obs))
    }

    pub fn latest_observation(&self) -> Option<&Vec<f64>> {
        self.observations.back()
    }

    pub fn clear(&mut self) {
        self.observations.clear();
        self.actions.clear();
    }
}
