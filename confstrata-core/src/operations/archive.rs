use crate::context::StoreContext;
use crate::error::{Result, StrataError};
use crate::keys::{archive_path, version_key};
use crate::limits::{ARCHIVE_THRESHOLD_BYTES, serialized_size};
use crate::storage::Ttl;
use crate::types::{ArchiveReason, ArchiveReference, ConfigVersion, StoredVersion};
use chrono::{DateTime, Duration, Utc};
use futures_util::future::join_all;

pub const DEFAULT_MAX_AGE_DAYS: u32 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveDecision {
    pub should: bool,
    pub reason: Option<ArchiveReason>,
    pub size_in_bytes: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaveVersionOutcome {
    pub archived: bool,
    pub reference: Option<ArchiveReference>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveBatchResult {
    pub archived: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum BatchItem {
    Archived,
    Skipped,
}

/// Moves versions between the fast tier and the blob tier.
///
/// An archived version leaves an [`ArchiveReference`] at its fast-tier key; reads
/// through [`ArchiveManager::restore_from_archive`] follow it transparently.
#[derive(Clone)]
pub struct ArchiveManager {
    ctx: StoreContext,
}

impl ArchiveManager {
    pub fn new(ctx: StoreContext) -> Self {
        Self { ctx }
    }

    pub fn should_archive(
        &self,
        version: &ConfigVersion,
        max_age_days: u32,
    ) -> Result<ArchiveDecision> {
        Self::should_archive_at(version, max_age_days, Utc::now())
    }

    pub fn should_archive_at(
        version: &ConfigVersion,
        max_age_days: u32,
        now: DateTime<Utc>,
    ) -> Result<ArchiveDecision> {
        let size_in_bytes = serialized_size(version)?;

        let reason = if size_in_bytes >= ARCHIVE_THRESHOLD_BYTES {
            Some(ArchiveReason::Size)
        } else if now.signed_duration_since(version.timestamp)
            > Duration::days(i64::from(max_age_days))
        {
            Some(ArchiveReason::Age)
        } else {
            None
        };

        Ok(ArchiveDecision {
            should: reason.is_some(),
            reason,
            size_in_bytes,
        })
    }

    pub async fn archive_version(
        &self,
        scope_code: &str,
        version: &ConfigVersion,
        reason: ArchiveReason,
    ) -> Result<ArchiveReference> {
        let path = archive_path(scope_code, &version.id)?;
        let key = version_key(scope_code, &version.id)?;
        let payload = serde_json::to_string(version)?;

        self.ctx.blob.write(&path, &payload).await?;

        let reference = ArchiveReference {
            id: version.id.clone(),
            archived: true,
            archived_at: Utc::now(),
            archive_path: path,
            size_in_bytes: payload.len() as u64,
            reason,
        };
        self.ctx
            .fast
            .put(&key, &serde_json::to_string(&reference)?, Ttl::Never)
            .await?;

        tracing::info!(
            "Archived version {} of scope {} ({} bytes, reason={:?})",
            version.id,
            scope_code,
            payload.len(),
            reason
        );
        Ok(reference)
    }

    /// Raw fast-tier entry for a version: inline payload, archive reference, or nothing.
    pub async fn load_stored_version(
        &self,
        scope_code: &str,
        version_id: &str,
    ) -> Result<Option<StoredVersion>> {
        let key = version_key(scope_code, version_id)?;
        match self.ctx.fast.get(&key).await? {
            Some(raw) => Ok(Some(StoredVersion::decode(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn restore_from_archive(
        &self,
        scope_code: &str,
        version_id: &str,
    ) -> Result<Option<ConfigVersion>> {
        let reference = match self.load_stored_version(scope_code, version_id).await? {
            None => return Ok(None),
            Some(StoredVersion::Inline(version)) => return Ok(Some(version)),
            Some(StoredVersion::Archived(reference)) => reference,
        };

        let Some(bytes) = self.ctx.blob.read(&reference.archive_path).await? else {
            tracing::warn!(
                "archive blob {} for version {} is missing",
                reference.archive_path,
                version_id
            );
            return Err(StrataError::ArchiveCorrupted {
                version_id: version_id.to_string(),
                path: reference.archive_path,
            });
        };

        let version: ConfigVersion = serde_json::from_slice(&bytes)?;
        Ok(Some(version))
    }

    /// Persist a new version, sending it straight to the blob tier when it is too
    /// large for the fast tier to hold comfortably.
    pub async fn save_version_with_auto_archive(
        &self,
        scope_code: &str,
        version: &ConfigVersion,
    ) -> Result<SaveVersionOutcome> {
        let payload = serde_json::to_string(version)?;

        if payload.len() >= ARCHIVE_THRESHOLD_BYTES {
            let reference = self
                .archive_version(scope_code, version, ArchiveReason::Size)
                .await?;
            return Ok(SaveVersionOutcome {
                archived: true,
                reference: Some(reference),
            });
        }

        let key = version_key(scope_code, &version.id)?;
        self.ctx.fast.put(&key, &payload, Ttl::Never).await?;
        tracing::debug!(
            "saved version {} of scope {} inline ({} bytes)",
            version.id,
            scope_code,
            payload.len()
        );

        Ok(SaveVersionOutcome {
            archived: false,
            reference: None,
        })
    }

    /// Remove a version from both tiers.
    pub async fn delete_version(&self, scope_code: &str, version_id: &str) -> Result<()> {
        if let Some(StoredVersion::Archived(reference)) =
            self.load_stored_version(scope_code, version_id).await?
        {
            let removed = self.ctx.blob.delete(&reference.archive_path).await?;
            tracing::debug!("removed archive blobs {:?}", removed);
        }

        let key = version_key(scope_code, version_id)?;
        self.ctx.fast.delete(&key).await
    }

    async fn archive_if_due(
        &self,
        scope_code: &str,
        version_id: &str,
        max_age_days: u32,
        now: DateTime<Utc>,
    ) -> Result<BatchItem> {
        let version = match self.load_stored_version(scope_code, version_id).await? {
            Some(StoredVersion::Inline(version)) => version,
            Some(StoredVersion::Archived(_)) | None => return Ok(BatchItem::Skipped),
        };

        let decision = Self::should_archive_at(&version, max_age_days, now)?;
        match decision.reason {
            Some(reason) => {
                self.archive_version(scope_code, &version, reason).await?;
                Ok(BatchItem::Archived)
            }
            None => Ok(BatchItem::Skipped),
        }
    }

    /// Archive every listed version that is due, concurrently.
    ///
    /// Per-version failures are logged and counted; they never abort the batch.
    pub async fn archive_old_versions(
        &self,
        scope_code: &str,
        version_ids: &[String],
        max_age_days: u32,
    ) -> ArchiveBatchResult {
        let now = Utc::now();
        let results = join_all(
            version_ids
                .iter()
                .map(|id| self.archive_if_due(scope_code, id, max_age_days, now)),
        )
        .await;

        let mut summary = ArchiveBatchResult::default();
        for (id, result) in version_ids.iter().zip(results) {
            match result {
                Ok(BatchItem::Archived) => summary.archived += 1,
                Ok(BatchItem::Skipped) => summary.skipped += 1,
                Err(e) => {
                    tracing::warn!(
                        "Failed to archive version {} of scope {}: {}",
                        id,
                        scope_code,
                        e
                    );
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            "Archive batch for scope {}: archived={} skipped={} failed={}",
            scope_code,
            summary.archived,
            summary.skipped,
            summary.failed
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConfigValue, ScopeRef};
    use serde_json::json;

    fn scope() -> ScopeRef {
        ScopeRef {
            id: "global".to_string(),
            code: "global".to_string(),
            level: "global".to_string(),
        }
    }

    fn version_with_padding(id: &str, padding: usize) -> ConfigVersion {
        ConfigVersion {
            id: id.to_string(),
            scope: scope(),
            snapshot: vec![ConfigValue::new("blob", json!("x".repeat(padding)))],
            diff: Vec::new(),
            timestamp: Utc::now(),
            previous_version_id: None,
            version_number: 1,
            actor: None,
        }
    }

    /// A version whose JSON form is exactly `size` bytes.
    fn version_of_size(id: &str, size: usize) -> ConfigVersion {
        let mut version = version_with_padding(id, 0);
        let base = serialized_size(&version).unwrap();
        version.snapshot[0].value = json!("x".repeat(size - base));
        assert_eq!(serialized_size(&version).unwrap(), size);
        version
    }

    #[tokio::test]
    async fn test_threshold_boundary() {
        let ctx = StoreContext::in_memory();
        let manager = ArchiveManager::new(ctx.clone());

        let below = version_of_size("01BELOW", ARCHIVE_THRESHOLD_BYTES - 1);
        let outcome = manager
            .save_version_with_auto_archive("global", &below)
            .await
            .unwrap();
        assert!(!outcome.archived);
        assert!(matches!(
            manager.load_stored_version("global", "01BELOW").await.unwrap(),
            Some(StoredVersion::Inline(_))
        ));

        let at = version_of_size("01AT", ARCHIVE_THRESHOLD_BYTES);
        let outcome = manager.save_version_with_auto_archive("global", &at).await.unwrap();
        assert!(outcome.archived);
        let reference = outcome.reference.unwrap();
        assert_eq!(reference.size_in_bytes, ARCHIVE_THRESHOLD_BYTES as u64);
        assert_eq!(reference.reason, ArchiveReason::Size);
        assert_eq!(reference.archive_path, "archives/versions/global/01AT.json");

        let restored = manager.restore_from_archive("global", "01AT").await.unwrap();
        assert_eq!(restored, Some(at));
    }

    #[tokio::test]
    async fn test_restore_missing_blob_is_corruption() {
        let ctx = StoreContext::in_memory();
        let manager = ArchiveManager::new(ctx.clone());
        let version = version_with_padding("01GONE", 4);

        let reference = manager
            .archive_version("global", &version, ArchiveReason::Age)
            .await
            .unwrap();
        ctx.blob.delete(&reference.archive_path).await.unwrap();

        let result = manager.restore_from_archive("global", "01GONE").await;
        assert!(matches!(result, Err(StrataError::ArchiveCorrupted { .. })));
        assert!(manager.restore_from_archive("global", "01NONE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_archive_path_validation() {
        let manager = ArchiveManager::new(StoreContext::in_memory());
        let version = version_with_padding("01BAD", 1);

        let result = manager
            .archive_version("../etc", &version, ArchiveReason::Size)
            .await;
        assert!(matches!(result, Err(StrataError::InvalidPathComponent(_))));
    }

    #[test]
    fn test_should_archive_by_age() {
        let mut version = version_with_padding("01OLD", 1);
        let now = Utc::now();

        version.timestamp = now - Duration::days(91);
        let decision = ArchiveManager::should_archive_at(&version, 90, now).unwrap();
        assert_eq!(decision.reason, Some(ArchiveReason::Age));

        version.timestamp = now - Duration::days(89);
        let decision = ArchiveManager::should_archive_at(&version, 90, now).unwrap();
        assert!(!decision.should);
        assert_eq!(decision.reason, None);
    }

    #[tokio::test]
    async fn test_archive_old_versions_tolerates_failures() {
        let ctx = StoreContext::in_memory();
        let manager = ArchiveManager::new(ctx.clone());

        let mut old = version_with_padding("01OLD", 1);
        old.timestamp = Utc::now() - Duration::days(120);
        let fresh = version_with_padding("01FRESH", 1);
        manager.save_version_with_auto_archive("global", &old).await.unwrap();
        manager.save_version_with_auto_archive("global", &fresh).await.unwrap();
        ctx.fast
            .put("version:global:01BROKEN", "not json", Ttl::Never)
            .await
            .unwrap();

        let ids = vec![
            "01OLD".to_string(),
            "01FRESH".to_string(),
            "01BROKEN".to_string(),
            "01MISSING".to_string(),
        ];
        let summary = manager.archive_old_versions("global", &ids, 90).await;
        assert_eq!(
            summary,
            ArchiveBatchResult {
                archived: 1,
                skipped: 2,
                failed: 1
            }
        );

        let again = manager.archive_old_versions("global", &ids[..1], 90).await;
        assert_eq!(again.archived, 0);
        assert_eq!(again.skipped, 1);
    }

    #[tokio::test]
    async fn test_delete_version_removes_blob() {
        let ctx = StoreContext::in_memory();
        let manager = ArchiveManager::new(ctx.clone());
        let version = version_with_padding("01DEL", 1);

        let reference = manager
            .archive_version("global", &version, ArchiveReason::Age)
            .await
            .unwrap();
        manager.delete_version("global", "01DEL").await.unwrap();

        assert!(ctx.blob.read(&reference.archive_path).await.unwrap().is_none());
        assert!(manager.load_stored_version("global", "01DEL").await.unwrap().is_none());
    }
}
