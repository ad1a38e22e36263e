use async_trait::async_trait;
use moka::future::Cache;
use std::time::Duration;

use crate::geo::CountryCode;

/// Short-lived memo of range-table answers keyed by address fingerprint.
#[async_trait]
pub trait ResolutionCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<CountryCode>;

    async fn insert(&self, key: String, country: CountryCode);

    /// Drop every entry; called after the range tables change.
    fn invalidate_all(&self);
}

pub struct MokaResolutionCache {
    inner: Cache<String, CountryCode>,
}

impl MokaResolutionCache {
    pub fn new(ttl: Duration, max_entries: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(ttl)
                .build(),
        }
    }
}

#[async_trait]
impl ResolutionCache for MokaResolutionCache {
    async fn get(&self, key: &str) -> Option<CountryCode> {
        self.inner.get(key).await
    }

    async fn insert(&self, key: String, country: CountryCode) {
        self.inner.insert(key, country).await;
    }

    fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_get_invalidate() {
        let cache = MokaResolutionCache::new(Duration::from_secs(60), 100);
        let fr = CountryCode::parse("FR").unwrap();

        assert_eq!(cache.get("fingerprint/10.0.0.1").await, None);
        cache.insert("fingerprint/10.0.0.1".to_string(), fr).await;
        assert_eq!(cache.get("fingerprint/10.0.0.1").await, Some(fr));

        cache.invalidate_all();
        assert_eq!(cache.get("fingerprint/10.0.0.1").await, None);
    }
}
