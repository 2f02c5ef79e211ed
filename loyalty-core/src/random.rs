//! Pluggable randomness for the proof bonus

use parking_lot::Mutex;
use rand::Rng;
use std::collections::VecDeque;

/// Source of bounded random integers
pub trait RandomSource: Send + Sync {
    /// Draw an integer in `[min, max]` (inclusive)
    fn next(&self, min: u64, max: u64) -> u64;
}

/// Thread-local RNG from `rand`
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next(&self, min: u64, max: u64) -> u64 {
        rand::thread_rng().gen_range(min..=max)
    }
}

/// Deterministic source replaying a fixed sequence, clamped into range.
///
/// Once the sequence is exhausted the last value repeats.
#[derive(Debug)]
pub struct FixedRandom {
    values: Mutex<VecDeque<u64>>,
    last: Mutex<u64>,
}

impl FixedRandom {
    /// Always return `value`
    pub fn constant(value: u64) -> Self {
        Self::sequence(vec![value])
    }

    /// Return `values` in order
    pub fn sequence(values: Vec<u64>) -> Self {
        let last = values.last().copied().unwrap_or_default();
        Self {
            values: Mutex::new(values.into()),
            last: Mutex::new(last),
        }
    }
}

impl RandomSource for FixedRandom {
    fn next(&self, min: u64, max: u64) -> u64 {
        let value = match self.values.lock().pop_front() {
            Some(v) => {
                *self.last.lock() = v;
                v
            }
            None => *self.last.lock(),
        };
        value.clamp(min, max)
    }
}
