//! Minimum spacing between outgoing explorer requests

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use super::types::OpeningDatabase;
use crate::config::RateLimitScope;

pub struct RateLimiter {
    min_interval: Duration,
    scope: RateLimitScope,
    // Next instant each key may fire; `None` is the shared global key
    next_slot: Mutex<HashMap<Option<OpeningDatabase>, Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration, scope: RateLimitScope) -> Self {
        Self {
            min_interval,
            scope,
            next_slot: Mutex::new(HashMap::new()),
        }
    }

    pub fn scope(&self) -> RateLimitScope {
        self.scope
    }

    /// Waits until a request to `database` may be sent.
    ///
    /// Slots are reserved under the lock and waited for outside it, so
    /// concurrent callers queue up one interval apart.
    pub async fn acquire(&self, database: OpeningDatabase) {
        let key = match self.scope {
            RateLimitScope::Global => None,
            RateLimitScope::PerDatabase => Some(database),
        };

        let slot = {
            let mut next_slot = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match next_slot.get(&key) {
                Some(reserved) if *reserved > now => *reserved,
                _ => now,
            };
            next_slot.insert(key, slot + self.min_interval);
            slot
        };

        if slot > Instant::now() {
            debug!(
                "Rate limiting {} request for {:?}",
                database,
                slot - Instant::now()
            );
            sleep_until(slot).await;
        }
    }
}
