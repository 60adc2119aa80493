//! Random source for sampling.

use crate::application::ports::RandomSource;
use rand::Rng;

/// Draws from the thread-local generator of the `rand` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl ThreadRandom {
    /// Create a new random source.
    pub fn new() -> Self {
        Self
    }
}

impl RandomSource for ThreadRandom {
    fn one_in(&self, n: u32) -> bool {
        n <= 1 || rand::rng().random_range(0..n) == 0
    }
}
