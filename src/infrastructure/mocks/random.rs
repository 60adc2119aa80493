//! Deterministic random source for testing sampling.

use crate::application::ports::RandomSource;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Random source replaying a fixed script of hits and misses.
///
/// Once the script is exhausted every draw returns the fallback value.
#[derive(Debug)]
pub struct ScriptedRandom {
    script: Mutex<VecDeque<bool>>,
    requested: Mutex<Vec<u32>>,
    fallback: bool,
}

impl ScriptedRandom {
    /// Replay `script`, then miss.
    pub fn new(script: impl IntoIterator<Item = bool>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            requested: Mutex::new(Vec::new()),
            fallback: false,
        }
    }

    /// Always return `hit`.
    pub fn always(hit: bool) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            requested: Mutex::new(Vec::new()),
            fallback: hit,
        }
    }

    /// The `n` of every draw so far.
    pub fn requested(&self) -> Vec<u32> {
        self.requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl RandomSource for ScriptedRandom {
    fn one_in(&self, n: u32) -> bool {
        self.requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(n);
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(self.fallback)
    }
}
