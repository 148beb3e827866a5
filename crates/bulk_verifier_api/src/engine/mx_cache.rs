//! Process-wide MX lookup cache.
//!
//! Write-through with no TTL, no size bound, and no negative caching: a
//! failed lookup returns `None` and the next caller retries DNS. Concurrent
//! misses for the same domain may both resolve; the writers store equivalent
//! values, so the race is harmless.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;
use verifier_core::{MxRecords, Verify};

#[derive(Default)]
pub struct MxCache {
    entries: DashMap<String, Arc<MxRecords>>,
}

impl MxCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached records for the domain, resolving through the verifier on a
    /// miss. DNS failures are not cached.
    pub async fn lookup(&self, verifier: &dyn Verify, domain: &str) -> Option<Arc<MxRecords>> {
        if let Some(hit) = self.entries.get(domain) {
            return Some(hit.clone());
        }

        match verifier.lookup_mx(domain).await {
            Ok(records) => {
                let records = Arc::new(records);
                self.entries.insert(domain.to_string(), records.clone());
                debug!(domain = %domain, entries = self.entries.len(), "mx records cached");
                Some(records)
            }
            Err(e) => {
                debug!(domain = %domain, error = %e, "mx lookup failed, not cached");
                None
            }
        }
    }
}
