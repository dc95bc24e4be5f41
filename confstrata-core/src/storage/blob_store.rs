use super::{BlobStore, KeyValueStore, Ttl};
use crate::error::{Result, StrataError};
use crate::limits::{KEY_SEPARATOR, validate_key};
use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use std::path::Path;
use std::sync::Arc;

/// Blob tier over any `object_store` backend (memory, local disk, S3).
#[derive(Clone)]
pub struct ObjectBlobStore {
    store: Arc<dyn ObjectStore>,
}

impl ObjectBlobStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()))
    }

    pub fn local(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root).map_err(|e| {
            StrataError::Config(format!("cannot create blob root {:?}: {}", root, e))
        })?;
        let store = LocalFileSystem::new_with_prefix(root)?;
        Ok(Self::new(Arc::new(store)))
    }

    pub fn s3(
        bucket: &str,
        region: &str,
        access_key_id: &str,
        secret_access_key: &str,
        endpoint: Option<&str>,
    ) -> Result<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(bucket)
            .with_region(region)
            .with_access_key_id(access_key_id)
            .with_secret_access_key(secret_access_key);
        if let Some(endpoint) = endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        Ok(Self::new(Arc::new(builder.build()?)))
    }
}

fn object_path(path: &str) -> Result<ObjectPath> {
    if path.trim().is_empty() {
        return Err(StrataError::InvalidRequest(
            "blob path cannot be empty".to_string(),
        ));
    }
    ObjectPath::parse(path)
        .map_err(|e| StrataError::InvalidRequest(format!("invalid blob path {}: {}", path, e)))
}

#[async_trait]
impl BlobStore for ObjectBlobStore {
    async fn read(&self, path: &str) -> Result<Option<Bytes>> {
        let location = object_path(path)?;
        match self.store.get(&location).await {
            Ok(result) => Ok(Some(result.bytes().await?)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, path: &str, content: &str) -> Result<()> {
        let location = object_path(path)?;
        let payload = PutPayload::from(Bytes::from(content.to_string()));
        self.store.put(&location, payload).await?;
        tracing::debug!("blob write path={} bytes={}", path, content.len());
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<Vec<String>> {
        let location = object_path(path)?;
        match self.store.head(&location).await {
            Ok(_) => {}
            Err(object_store::Error::NotFound { .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        }

        match self.store.delete(&location).await {
            Ok(()) => Ok(vec![path.to_string()]),
            Err(object_store::Error::NotFound { .. }) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Exposes a blob tier through the key-value interface so it can serve as the
/// persistent half of a [`super::CombinedStore`]. Key `a:b` maps to `kv/a/b.json`;
/// TTLs are ignored.
#[derive(Clone)]
pub struct BlobKvStore {
    blobs: Arc<dyn BlobStore>,
}

impl BlobKvStore {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    fn path_for(key: &str) -> Result<String> {
        validate_key(key)?;
        let relative = key
            .split(KEY_SEPARATOR)
            .collect::<Vec<_>>()
            .join("/");
        Ok(format!("kv/{}.json", relative))
    }
}

#[async_trait]
impl KeyValueStore for BlobKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = Self::path_for(key)?;
        match self.blobs.read(&path).await? {
            Some(bytes) => {
                let text = String::from_utf8(bytes.to_vec()).map_err(|e| {
                    StrataError::Internal(format!("blob {} is not valid UTF-8: {}", path, e))
                })?;
                Ok(Some(text))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &str, _ttl: Ttl) -> Result<()> {
        let path = Self::path_for(key)?;
        self.blobs.write(&path, value).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = Self::path_for(key)?;
        self.blobs.delete(&path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_object_blob_store_roundtrip() {
        let store = ObjectBlobStore::in_memory();
        let path = "archives/versions/global/01ABC.json";

        assert!(store.read(path).await.unwrap().is_none());
        store.write(path, "{\"id\":\"01ABC\"}").await.unwrap();
        assert_eq!(
            store.read(path).await.unwrap().unwrap(),
            Bytes::from_static(b"{\"id\":\"01ABC\"}")
        );

        assert_eq!(store.delete(path).await.unwrap(), vec![path.to_string()]);
        assert!(store.delete(path).await.unwrap().is_empty());
        assert!(store.read(path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_local_blob_store() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = ObjectBlobStore::local(temp_dir.path()).unwrap();

        store.write("kv/config/global.json", "[]").await.unwrap();
        assert!(temp_dir.path().join("kv/config/global.json").exists());
        assert_eq!(
            store.read("kv/config/global.json").await.unwrap().unwrap(),
            Bytes::from_static(b"[]")
        );
        assert_eq!(store.delete("missing.json").await.unwrap(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn test_blob_kv_maps_keys_to_paths() {
        let blobs = Arc::new(ObjectBlobStore::in_memory());
        let kv = BlobKvStore::new(blobs.clone());

        kv.put("config:global", "[1]", Ttl::Seconds(10)).await.unwrap();
        assert_eq!(kv.get("config:global").await.unwrap().as_deref(), Some("[1]"));
        assert!(blobs.read("kv/config/global.json").await.unwrap().is_some());

        kv.delete("config:global").await.unwrap();
        assert!(kv.get("config:global").await.unwrap().is_none());
    }
}
