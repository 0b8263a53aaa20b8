//! Time-to-live keyed stores shared by concurrent requests.
//!
//! Keys are lowercased on every access so a community name never misses
//! because of casing. Expiry is checked lazily on `get`; there is no
//! background sweep.

use crate::types::{CommentInsights, PostGuidelines, PostThread};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

pub const GUIDELINES_TTL: Duration = Duration::from_secs(48 * 60 * 60);
pub const INSIGHTS_TTL: Duration = Duration::from_secs(48 * 60 * 60);
pub const POST_THREAD_TTL: Duration = Duration::from_secs(15 * 60);

pub type GuidelinesCache = TtlCache<PostGuidelines>;
pub type InsightsCache = TtlCache<CommentInsights>;
pub type PostThreadCache = TtlCache<PostThread>;

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
}

#[derive(Debug)]
pub struct TtlCache<V> {
    name: &'static str,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns an owned copy of the entry, or `None` once it is older than the TTL.
    pub fn get(&self, key: &str) -> Option<V> {
        let key = normalize_key(key);
        let mut entries = self.lock();

        let expired = match entries.get(&key) {
            None => {
                debug!(cache = self.name, %key, "cache miss");
                return None;
            }
            Some(entry) => entry.stored_at.elapsed() > self.ttl,
        };

        if expired {
            debug!(cache = self.name, %key, "cache entry expired");
            entries.remove(&key);
            return None;
        }

        debug!(cache = self.name, %key, "cache hit");
        entries.get(&key).map(|entry| entry.value.clone())
    }

    pub fn set(&self, key: &str, value: V) {
        let key = normalize_key(key);
        self.lock().insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    /// Number of entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry<V>>> {
        // A poisoned map still holds consistent entries; each write is a single insert.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TtlCache<PostGuidelines> {
    pub fn guidelines() -> Self {
        Self::new("post_guidelines", GUIDELINES_TTL)
    }
}

impl TtlCache<CommentInsights> {
    pub fn insights() -> Self {
        Self::new("comment_insights", INSIGHTS_TTL)
    }
}

impl TtlCache<PostThread> {
    pub fn post_threads() -> Self {
        Self::new("post_threads", POST_THREAD_TTL)
    }

    pub fn thread_key(subreddit: &str, post_id: &str) -> String {
        format!("{}:{}", subreddit.to_lowercase(), post_id)
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}
