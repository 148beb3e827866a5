//! Two-tier concurrency limiter.
//!
//! Bounds how many verifications run at once process-wide, with a separate
//! budget per level: level 1 is cheap DNS work and gets a wide bound, level 2
//! holds TCP connections to foreign mail servers and gets a narrow one. A
//! worker holds its permit for the duration of one address's verification.

use tokio::sync::{Semaphore, SemaphorePermit};
use verifier_core::Level;

pub struct LevelLimiter {
    level1: Semaphore,
    level2: Semaphore,
}

impl LevelLimiter {
    pub fn new(level1: usize, level2: usize) -> Self {
        Self {
            level1: Semaphore::new(level1.max(1)),
            level2: Semaphore::new(level2.max(1)),
        }
    }

    pub async fn acquire(&self, level: Level) -> SemaphorePermit<'_> {
        let semaphore = match level {
            Level::Mx => &self.level1,
            Level::Smtp => &self.level2,
        };
        // The semaphores live as long as self and are never closed.
        semaphore
            .acquire()
            .await
            .expect("limiter semaphore closed")
    }

    #[allow(dead_code)]
    pub fn available(&self, level: Level) -> usize {
        match level {
            Level::Mx => self.level1.available_permits(),
            Level::Smtp => self.level2.available_permits(),
        }
    }
}
