//! Document generation tokens
//!
//! Every `open_document` / `teardown` advances the counter. Work started
//! under an older generation checks its token before applying results and
//! discards them when the token is stale.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic generation counter shared by a cache and its in-flight work
#[derive(Debug, Clone, Default)]
pub struct GenerationCounter {
    current: Arc<AtomicU64>,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new generation, invalidating every earlier token
    pub fn advance(&self) -> Generation {
        let value = self.current.fetch_add(1, Ordering::AcqRel) + 1;
        Generation {
            value,
            current: Arc::clone(&self.current),
        }
    }

    /// Token for the generation currently in effect
    pub fn token(&self) -> Generation {
        Generation {
            value: self.current.load(Ordering::Acquire),
            current: Arc::clone(&self.current),
        }
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }
}

/// Token tying a piece of work to the generation it started in
#[derive(Debug, Clone)]
pub struct Generation {
    value: u64,
    current: Arc<AtomicU64>,
}

impl Generation {
    pub fn value(&self) -> u64 {
        self.value
    }

    /// False once a newer generation has started
    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::Acquire) == self.value
    }
}
