use super::{KeyValueStore, Ttl};
use crate::error::{Result, StrataError};
use crate::limits::{ensure_fits_fast_tier, validate_key, validate_key_segment};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

/// Fast tier backed by Redis.
///
/// Limits are enforced client-side before every write so the Redis tier behaves
/// like the hosted key-value service it stands in for.
#[derive(Clone)]
pub struct RedisKvStore {
    conn: ConnectionManager,
    namespace: Option<String>,
}

impl RedisKvStore {
    pub async fn new(url: &str, namespace: Option<&str>) -> Result<Self> {
        let namespace = match namespace.map(str::trim).filter(|ns| !ns.is_empty()) {
            Some(ns) => {
                validate_key_segment(ns)?;
                Some(ns.to_string())
            }
            None => None,
        };

        let client = redis::Client::open(url)
            .map_err(|e| StrataError::Config(format!("invalid redis url: {}", e)))?;
        let conn = client.get_connection_manager().await?;

        tracing::info!(
            "Connected redis fast tier (namespace={})",
            namespace.as_deref().unwrap_or("-")
        );
        Ok(Self { conn, namespace })
    }

    fn full_key(&self, key: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{}:{}", ns, key),
            None => key.to_string(),
        }
    }
}

#[async_trait]
impl KeyValueStore for RedisKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let full_key = self.full_key(key);
        validate_key(&full_key)?;

        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(&full_key).await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: &str, ttl: Ttl) -> Result<()> {
        let full_key = self.full_key(key);
        ensure_fits_fast_tier(&full_key, value)?;

        let mut conn = self.conn.clone();
        match ttl {
            Ttl::Never => {
                conn.set::<_, _, ()>(&full_key, value).await?;
            }
            Ttl::Seconds(0) => {
                // already expired
                conn.del::<_, ()>(&full_key).await?;
            }
            Ttl::Seconds(seconds) => {
                redis::cmd("SET")
                    .arg(&full_key)
                    .arg(value)
                    .arg("EX")
                    .arg(seconds)
                    .query_async::<_, ()>(&mut conn)
                    .await?;
            }
        }

        tracing::debug!("redis put key={} bytes={} ttl={}", full_key, value.len(), ttl.as_wire());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let full_key = self.full_key(key);
        validate_key(&full_key)?;

        let mut conn = self.conn.clone();
        conn.del::<_, ()>(&full_key).await?;
        Ok(())
    }
}
