//! Time-boxed response cache in front of the network.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Entries are swept for expiry once the map grows past this.
const SWEEP_THRESHOLD: usize = 100;

struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// Successful response bodies keyed by operation and input.
pub struct ResponseCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().ok()?;
        let entry = entries.get(key)?;
        (Instant::now() < entry.expires_at).then(|| entry.value.clone())
    }

    pub fn insert(&self, key: String, value: String) {
        if !self.is_enabled() {
            return;
        }
        if let Ok(mut entries) = self.entries.lock() {
            let now = Instant::now();
            if entries.len() > SWEEP_THRESHOLD {
                entries.retain(|_, e| e.expires_at > now);
            }
            entries.insert(
                key,
                CacheEntry {
                    value,
                    expires_at: now + self.ttl,
                },
            );
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
