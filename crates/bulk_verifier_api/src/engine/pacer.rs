//! Global pacing of outbound SMTP probes.
//!
//! A token bucket with a hard cap of 1000 tokens. A producer task refills
//! once per second with `round(rate + U(-jitter*rate, +jitter*rate))`
//! tokens, at least one, discarding whatever would overflow the cap. Each
//! level-2 verification consumes exactly one token and blocks until one is
//! available. The bucket is shared by every job in the process: the limit it
//! models (outbound SMTP reputation) is per host, not per job.

use std::sync::{Arc, Weak};
use std::time::Duration;

use rand::Rng;
use tokio::sync::Semaphore;
use tracing::trace;

/// Maximum tokens the bucket can hold.
const BUCKET_CAP: usize = 1000;

pub struct ProbePacer {
    tokens: Semaphore,
}

impl ProbePacer {
    /// Create a pacer refilling at `rate` tokens/second with `jitter`
    /// fractional variation. The bucket starts full, allowing an initial
    /// burst of up to the cap.
    pub fn new(rate: f64, jitter: f64) -> Arc<Self> {
        let pacer = Arc::new(Self {
            tokens: Semaphore::new(BUCKET_CAP),
        });
        tokio::spawn(refill(Arc::downgrade(&pacer), rate, jitter));
        pacer
    }

    /// Take one token, waiting until the producer makes one available.
    pub async fn acquire(&self) {
        if let Ok(permit) = self.tokens.acquire().await {
            permit.forget();
        }
    }

    pub fn available(&self) -> usize {
        self.tokens.available_permits()
    }

    fn add_tokens(&self, count: usize) {
        let room = BUCKET_CAP.saturating_sub(self.available());
        let added = count.min(room);
        if added > 0 {
            self.tokens.add_permits(added);
        }
        trace!(requested = count, added, "pacer refill");
    }
}

/// Tokens to produce for one tick.
fn tick_count(rate: f64, jitter: f64) -> usize {
    let span = rate.abs() * jitter.abs();
    let variation = if span > 0.0 {
        rand::rng().random_range(-span..=span)
    } else {
        0.0
    };
    (rate + variation).round().max(1.0) as usize
}

async fn refill(pacer: Weak<ProbePacer>, rate: f64, jitter: f64) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await; // immediate first tick
    loop {
        interval.tick().await;
        let Some(pacer) = pacer.upgrade() else {
            return;
        };
        pacer.add_tokens(tick_count(rate, jitter));
    }
}
