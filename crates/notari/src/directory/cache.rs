//! Single-flight caching resolver. A coarse mutex is held
//! across the *entire* call to the wrapped provider, not just the cache
//! read/write, so concurrent lookups — even for different usernames —
//! serialize. This trades throughput for simplicity and the guarantee that
//! a failed fetch never poisons the cache.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Provider, User};

pub struct CachingProvider {
    inner: Arc<dyn Provider>,
    cache: Mutex<HashMap<String, User>>,
}

impl CachingProvider {
    pub fn new(inner: Arc<dyn Provider>) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Provider for CachingProvider {
    async fn get_user(&self, username: &str) -> Result<User, anyhow::Error> {
        let mut cache = self.cache.lock().await;

        if let Some(user) = cache.get(username) {
            return Ok(user.clone());
        }

        let user = self.inner.get_user(username).await?;
        cache.insert(username.to_string(), user.clone());
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingProvider {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Provider for CountingProvider {
        async fn get_user(&self, username: &str) -> Result<User, anyhow::Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            if self.fail {
                anyhow::bail!("directory down");
            }
            Ok(User {
                sub: format!("https://github.com/{username}"),
                username: username.to_string(),
                keys: vec![],
                claims: HashMap::new(),
            })
        }
    }

    #[tokio::test]
    async fn caches_successful_fetch_across_concurrent_callers() {
        let inner = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let cache = Arc::new(CachingProvider::new(inner.clone()));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let cache = cache.clone();
            handles.push(tokio::spawn(
                async move { cache.get_user("alice").await.unwrap() },
            ));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_fetch_is_not_cached_and_retries() {
        let inner = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let cache = CachingProvider::new(inner.clone());

        assert!(cache.get_user("alice").await.is_err());
        assert!(cache.get_user("alice").await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }
}
