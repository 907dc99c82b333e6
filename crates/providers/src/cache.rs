//! Bounded memo of oracle replies keyed by `(model, prompt)`.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

type Key = (String, String);

/// Least-recently-used cache. A capacity of zero caches nothing.
pub struct ResponseCache {
    inner: Option<Mutex<LruCache<Key, String>>>,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    pub fn get(&self, model: &str, prompt: &str) -> Option<String> {
        let inner = self.inner.as_ref()?;
        let key = (model.to_string(), prompt.to_string());
        inner.lock().get(&key).cloned()
    }

    pub fn insert(&self, model: &str, prompt: &str, reply: &str) {
        if let Some(inner) = &self.inner {
            inner
                .lock()
                .put((model.to_string(), prompt.to_string()), reply.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.inner.as_ref().map_or(0, |inner| inner.lock().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Some(inner) = &self.inner {
            inner.lock().clear();
        }
    }
}
