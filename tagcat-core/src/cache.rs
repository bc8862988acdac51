//! Category cache collaborator
//!
//! A generic TTL key-value cache fronting the authoritative `tags.category`
//! column. Entries are best-effort: a miss and an unavailable backend are
//! the same observable (`None`), so a degraded cache can only cause extra
//! authoritative reads, never a hard failure.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Cache key for a tag's category entry.
pub fn category_cache_key(name: &str) -> String {
    format!("tc:{:x}", Sha256::digest(name.as_bytes()))
}

/// Key-value cache with per-entry TTL.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Look up one key. Expired entries and backend outages both read as None.
    async fn get(&self, key: &str) -> Option<i64>;

    /// Batched lookup; the returned map holds only the keys that hit.
    async fn get_multi(&self, keys: &[String]) -> HashMap<String, i64>;

    /// Store a value, replacing any existing entry.
    async fn put(&self, key: &str, value: i64, ttl: Duration);
}

/// In-process cache backend.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (i64, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Option<i64> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((value, deadline)) if Instant::now() < *deadline => Some(*value),
            Some(_) => {
                // Expired; drop lazily on access.
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    async fn get_multi(&self, keys: &[String]) -> HashMap<String, i64> {
        let mut entries = self.entries.lock().unwrap();
        let now = Instant::now();
        let mut hits = HashMap::new();
        for key in keys {
            match entries.get(key) {
                Some((value, deadline)) if now < *deadline => {
                    hits.insert(key.clone(), *value);
                }
                Some(_) => {
                    entries.remove(key);
                }
                None => {}
            }
        }
        hits
    }

    async fn put(&self, key: &str, value: i64, ttl: Duration) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key.to_string(), (value, Instant::now() + ttl));
    }
}
