use confstrata_core::operations::{ConfigSchema, DEFAULT_MAX_AGE_DAYS};
use confstrata_core::storage::S3Settings;
use confstrata_core::{RedactionPolicy, Result, StoreBuilder, StrataError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub fast_tier: FastTierConfig,
    pub blob_tier: BlobTierConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub redaction: RedactionConfig,
    #[serde(default)]
    pub schema: ConfigSchema,
}

/// Fast (bounded key-value) tier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FastTierConfig {
    pub backend: FastTierBackend,
    #[serde(default)]
    pub namespace: Option<String>,
    pub redis: Option<RedisConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FastTierBackend {
    Memory,
    Redis,
}

impl FastTierBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            FastTierBackend::Memory => "memory",
            FastTierBackend::Redis => "redis",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobTierConfig {
    pub backend: BlobTierBackend,
    pub local: Option<LocalConfig>,
    pub s3: Option<S3Config>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobTierBackend {
    Memory,
    Local,
    S3,
}

impl BlobTierBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlobTierBackend::Memory => "memory",
            BlobTierBackend::Local => "local",
            BlobTierBackend::S3 => "s3",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    pub credentials: S3Credentials,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            max_age_days: default_max_age_days(),
        }
    }
}

fn default_max_age_days() -> u32 {
    DEFAULT_MAX_AGE_DAYS
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedactionConfig {
    #[serde(default)]
    pub extra_fields: Vec<String>,
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(path))
            .add_source(::config::Environment::with_prefix("CONFSTRATA").separator("__"))
            .build()
            .map_err(|e| StrataError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| StrataError::Config(e.to_string()))?;

        Ok(config)
    }

    pub fn redaction_policy(&self) -> RedactionPolicy {
        RedactionPolicy::with_extra_fields(&self.redaction.extra_fields)
    }

    pub fn store_builder(&self) -> StoreBuilder {
        let mut builder = StoreBuilder::new()
            .fast_backend(self.fast_tier.backend.as_str())
            .blob_backend(self.blob_tier.backend.as_str())
            .redaction(self.redaction_policy());

        if let Some(namespace) = &self.fast_tier.namespace {
            builder = builder.namespace(namespace.clone());
        }
        if let Some(redis) = &self.fast_tier.redis {
            builder = builder.redis_url(redis.url.clone());
        }
        if let Some(local) = &self.blob_tier.local {
            builder = builder.local_path(local.path.clone());
        }
        if let Some(s3) = &self.blob_tier.s3 {
            builder = builder.s3(S3Settings {
                bucket: s3.bucket.clone(),
                region: s3.region.clone(),
                endpoint: s3.endpoint.clone(),
                access_key_id: s3.credentials.access_key_id.clone(),
                secret_access_key: s3.credentials.secret_access_key.clone(),
            });
        }

        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Config {
        ::config::Config::builder()
            .add_source(::config::File::from_str(yaml, ::config::FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse(
            r#"
fast_tier:
  backend: memory
blob_tier:
  backend: local
  local:
    path: /tmp/confstrata
"#,
        );

        assert_eq!(config.fast_tier.backend, FastTierBackend::Memory);
        assert_eq!(config.blob_tier.backend, BlobTierBackend::Local);
        assert_eq!(config.archive.max_age_days, 90);
        assert!(config.schema.fields.is_empty());
        assert!(config.redaction_policy().is_sensitive("db_password"));
    }

    #[test]
    fn test_full_config() {
        let config = parse(
            r#"
fast_tier:
  backend: redis
  namespace: shop
  redis:
    url: redis://127.0.0.1:6379
blob_tier:
  backend: s3
  s3:
    bucket: confstrata
    region: us-east-1
    endpoint: http://127.0.0.1:9000
    credentials:
      access_key_id: minio
      secret_access_key: minio123
archive:
  max_age_days: 30
redaction:
  extra_fields: [merchant_pin]
schema:
  fields:
    - name: currency
      default: USD
"#,
        );

        assert_eq!(config.fast_tier.namespace.as_deref(), Some("shop"));
        assert_eq!(config.archive.max_age_days, 30);
        assert!(config.redaction_policy().is_sensitive("merchant_pin"));
        assert_eq!(config.schema.fields[0].name, "currency");
        assert_eq!(
            config.blob_tier.s3.as_ref().unwrap().endpoint.as_deref(),
            Some("http://127.0.0.1:9000")
        );
    }
}
