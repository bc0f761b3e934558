//! Per-key cache of values read out of release payloads.
//!
//! Component image references never change for a given release image, so
//! each `(image name, release image)` pair is resolved at most once. Callers
//! racing on the same key wait on that key's lock; other keys are unaffected
//! and readers of a populated key never lock.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, OnceLock};

use tokio::sync::Mutex;
use tracing::debug;

#[derive(Default)]
struct CacheEntry {
    value: OnceLock<String>,
    /// Held while the value is being resolved.
    lock: Mutex<()>,
}

/// Cache keyed by `image_name@release_image`.
#[derive(Default)]
pub struct ReleaseImageCache {
    entries: Mutex<HashMap<String, Arc<CacheEntry>>>,
}

impl ReleaseImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(image_name: &str, release_image: &str) -> String {
        format!("{image_name}@{release_image}")
    }

    async fn entry(&self, key: String) -> Arc<CacheEntry> {
        let mut entries = self.entries.lock().await;
        Arc::clone(entries.entry(key).or_default())
    }

    /// Cached value for the key, if already resolved.
    pub async fn get(&self, image_name: &str, release_image: &str) -> Option<String> {
        let entries = self.entries.lock().await;
        entries
            .get(&Self::key(image_name, release_image))
            .and_then(|entry| entry.value.get().cloned())
    }

    /// Return the cached value or run `resolve` to produce it.
    ///
    /// `resolve` runs at most once per key at a time, and not at all once a
    /// value is stored. Errors and empty values are not cached.
    pub async fn get_or_resolve<F, Fut, E>(
        &self,
        image_name: &str,
        release_image: &str,
        resolve: F,
    ) -> Result<String, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        let entry = self.entry(Self::key(image_name, release_image)).await;

        if let Some(value) = entry.value.get() {
            return Ok(value.clone());
        }

        let _guard = entry.lock.lock().await;

        // Another caller may have finished while we waited.
        if let Some(value) = entry.value.get() {
            debug!(image_name, release_image, "Release image cache hit after wait");
            return Ok(value.clone());
        }

        let value = resolve().await?;
        if !value.is_empty() {
            let _ = entry.value.set(value.clone());
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_callers_resolve_once() {
        let cache = Arc::new(ReleaseImageCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_resolve("must-gather", "quay.io/release:4.14.2", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok::<_, String>("quay.io/must-gather@sha256:abc".to_string())
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "quay.io/must-gather@sha256:abc");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let cache = ReleaseImageCache::new();
        let a = cache
            .get_or_resolve("must-gather", "release:1", || async { Ok::<_, String>("a".into()) })
            .await
            .unwrap();
        let b = cache
            .get_or_resolve("machine-config-operator", "release:1", || async {
                Ok::<_, String>("b".into())
            })
            .await
            .unwrap();

        assert_eq!((a.as_str(), b.as_str()), ("a", "b"));
        assert_eq!(cache.get("must-gather", "release:1").await.as_deref(), Some("a"));
        assert_eq!(cache.get("must-gather", "release:2").await, None);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let cache = ReleaseImageCache::new();

        let err = cache
            .get_or_resolve("must-gather", "release:1", || async {
                Err::<String, _>("boom".to_string())
            })
            .await
            .unwrap_err();
        assert_eq!(err, "boom");
        assert_eq!(cache.get("must-gather", "release:1").await, None);

        let value = cache
            .get_or_resolve("must-gather", "release:1", || async { Ok::<_, String>("ok".into()) })
            .await
            .unwrap();
        assert_eq!(value, "ok");
    }
}
