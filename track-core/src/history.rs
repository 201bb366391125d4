use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitnessSample {
    pub tick: u64,
    pub best: f32,
    pub average: f32,
}

/// Fixed-capacity ring of recent fitness samples; the oldest sample is
/// dropped when a new one arrives at capacity.
#[derive(Clone, Debug)]
pub struct FitnessHistory {
    capacity: usize,
    samples: VecDeque<FitnessSample>,
}

impl FitnessHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn push(&mut self, sample: FitnessSample) {
        if self.capacity == 0 {
            return;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn latest(&self) -> Option<&FitnessSample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FitnessSample> {
        self.samples.iter()
    }

    pub fn to_vec(&self) -> Vec<FitnessSample> {
        self.samples.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(tick: u64) -> FitnessSample {
        FitnessSample {
            tick,
            best: tick as f32,
            average: 0.0,
        }
    }

    #[test]
    fn overflow_drops_oldest() {
        let mut history = FitnessHistory::new(3);
        for tick in 0..5 {
            history.push(sample(tick));
        }
        let ticks: Vec<u64> = history.iter().map(|s| s.tick).collect();
        assert_eq!(ticks, vec![2, 3, 4]);
        assert_eq!(history.latest().map(|s| s.tick), Some(4));
    }
}
