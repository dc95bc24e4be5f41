use super::{BlobStore, KeyValueStore, MemoryKvStore, ObjectBlobStore, RedisKvStore};
use crate::context::StoreContext;
use crate::error::{Result, StrataError};
use crate::redaction::RedactionPolicy;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Builds a [`StoreContext`] from backend names.
///
/// Fast tier: `memory` or `redis`. Blob tier: `memory`, `local` or `s3`.
#[derive(Debug, Clone, Default)]
pub struct StoreBuilder {
    fast_backend: Option<String>,
    namespace: Option<String>,
    redis_url: Option<String>,
    blob_backend: Option<String>,
    local_path: Option<PathBuf>,
    s3: Option<S3Settings>,
    redaction: Option<RedactionPolicy>,
}

impl StoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fast_backend(mut self, backend: impl Into<String>) -> Self {
        self.fast_backend = Some(backend.into());
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = Some(url.into());
        self
    }

    pub fn blob_backend(mut self, backend: impl Into<String>) -> Self {
        self.blob_backend = Some(backend.into());
        self
    }

    pub fn local_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_path = Some(path.into());
        self
    }

    pub fn s3(mut self, settings: S3Settings) -> Self {
        self.s3 = Some(settings);
        self
    }

    pub fn redaction(mut self, policy: RedactionPolicy) -> Self {
        self.redaction = Some(policy);
        self
    }

    fn resolve_backend(value: Option<&str>, tier: &str) -> Result<String> {
        let backend = value.unwrap_or_default().trim().to_ascii_lowercase();
        if backend.is_empty() {
            return Err(StrataError::Config(format!(
                "{} backend cannot be empty",
                tier
            )));
        }

        Ok(backend)
    }

    async fn build_fast(&self) -> Result<Arc<dyn KeyValueStore>> {
        let backend = Self::resolve_backend(self.fast_backend.as_deref(), "fast tier")?;

        match backend.as_str() {
            "memory" => Ok(Arc::new(MemoryKvStore::new())),
            "redis" => {
                let url = self.redis_url.as_deref().unwrap_or_default().trim();
                if url.is_empty() {
                    return Err(StrataError::Config(
                        "redis url is required for redis backend".to_string(),
                    ));
                }

                let store = RedisKvStore::new(url, self.namespace.as_deref()).await?;
                Ok(Arc::new(store))
            }
            other => Err(StrataError::Config(format!(
                "unsupported fast tier backend: {}",
                other
            ))),
        }
    }

    fn build_blob(&self) -> Result<Arc<dyn BlobStore>> {
        let backend = Self::resolve_backend(self.blob_backend.as_deref(), "blob tier")?;

        match backend.as_str() {
            "memory" => Ok(Arc::new(ObjectBlobStore::in_memory())),
            "local" => {
                let path = self.local_path.as_ref().ok_or_else(|| {
                    StrataError::Config("local path is required for local backend".to_string())
                })?;
                Ok(Arc::new(ObjectBlobStore::local(path)?))
            }
            "s3" => {
                let s3 = self.s3.as_ref().ok_or_else(|| {
                    StrataError::Config("s3 settings are required for s3 backend".to_string())
                })?;
                if s3.bucket.trim().is_empty() {
                    return Err(StrataError::Config(
                        "s3 bucket cannot be empty".to_string(),
                    ));
                }

                let store = ObjectBlobStore::s3(
                    &s3.bucket,
                    &s3.region,
                    &s3.access_key_id,
                    &s3.secret_access_key,
                    s3.endpoint.as_deref(),
                )?;
                Ok(Arc::new(store))
            }
            other => Err(StrataError::Config(format!(
                "unsupported blob tier backend: {}",
                other
            ))),
        }
    }

    pub async fn build(&self) -> Result<StoreContext> {
        let blob = self.build_blob()?;
        let fast = self.build_fast().await?;
        let redaction = self.redaction.clone().unwrap_or_default();

        tracing::info!(
            "Store context ready (fast={}, blob={})",
            self.fast_backend.as_deref().unwrap_or_default(),
            self.blob_backend.as_deref().unwrap_or_default()
        );
        Ok(StoreContext::new(fast, blob).with_redaction(redaction))
    }
}
