use super::{KeyValueStore, Ttl};
use crate::error::{Result, StrataError};
use crate::limits::{FAST_TIER_MAX_VALUE_BYTES, fits_fast_tier, validate_key};
use async_trait::async_trait;
use std::sync::Arc;

/// Decides, per key and serialized value, whether a write also goes to the
/// persistent tier.
pub type PersistPolicy = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

pub fn persist_all() -> PersistPolicy {
    Arc::new(|_: &str, _: &str| true)
}

/// Two-level store: the fast tier acts as a cache in front of the persistent tier.
///
/// Reads hit the fast tier first and fall back to the persistent tier, warming
/// the cache on the way out. Writes land in the fast tier when the value fits and
/// in the persistent tier when the policy asks for it.
#[derive(Clone)]
pub struct CombinedStore {
    fast: Arc<dyn KeyValueStore>,
    persistent: Arc<dyn KeyValueStore>,
    should_persist: PersistPolicy,
    cache_ttl: Ttl,
}

impl CombinedStore {
    pub fn new(
        fast: Arc<dyn KeyValueStore>,
        persistent: Arc<dyn KeyValueStore>,
        should_persist: PersistPolicy,
    ) -> Self {
        Self {
            fast,
            persistent,
            should_persist,
            cache_ttl: Ttl::Never,
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Ttl) -> Self {
        self.cache_ttl = ttl;
        self
    }
}

#[async_trait]
impl KeyValueStore for CombinedStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if let Some(value) = self.fast.get(key).await? {
            return Ok(Some(value));
        }

        let Some(value) = self.persistent.get(key).await? else {
            return Ok(None);
        };

        if fits_fast_tier(&value) {
            self.fast.put(key, &value, self.cache_ttl).await?;
            tracing::debug!("combined store warmed fast tier for key={}", key);
        }

        Ok(Some(value))
    }

    async fn put(&self, key: &str, value: &str, ttl: Ttl) -> Result<()> {
        validate_key(key)?;
        let persist = (self.should_persist)(key, value);

        if fits_fast_tier(value) {
            self.fast.put(key, value, ttl).await?;
        } else if persist {
            // drop any stale cached copy; reads will come from the persistent tier
            self.fast.delete(key).await?;
        } else {
            return Err(StrataError::ValueTooLarge {
                key: key.to_string(),
                size: value.len(),
                limit: FAST_TIER_MAX_VALUE_BYTES,
            });
        }

        if persist {
            self.persistent.put(key, value, ttl).await?;
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.fast.delete(key).await?;
        self.persistent.delete(key).await
    }
}
