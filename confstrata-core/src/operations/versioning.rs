use super::archive::ArchiveManager;
use crate::context::StoreContext;
use crate::diff::{apply_diff, calculate_diff, invert_diff};
use crate::error::Result;
use crate::keys::{version_list_key, version_metadata_key};
use crate::storage::Ttl;
use crate::types::{ConfigDiff, ConfigValue, ConfigVersion, ScopeRef, VersionMetadata};
use chrono::Utc;
use ulid::Ulid;

/// Versions kept per scope; older ones are pruned first-in first-out.
pub const MAX_VERSIONS_PER_SCOPE: usize = 25;

pub const DEFAULT_HISTORY_LIMIT: usize = 25;

#[derive(Debug, Clone)]
pub struct CreateVersionRequest {
    pub scope: ScopeRef,
    pub old_config: Vec<ConfigValue>,
    pub new_config: Vec<ConfigValue>,
    pub actor: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateVersionResult {
    pub version: ConfigVersion,
    pub metadata: VersionMetadata,
    pub archived: bool,
    pub pruned: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct VersionHistoryQuery {
    pub scope_code: String,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct VersionHistoryPage {
    pub versions: Vec<ConfigVersion>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct VersionComparison {
    pub version: ConfigVersion,
    pub before: Vec<ConfigValue>,
    pub after: Vec<ConfigValue>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoVersionComparison {
    pub from_version: ConfigVersion,
    pub to_version: ConfigVersion,
    pub from_config: Vec<ConfigValue>,
    pub to_config: Vec<ConfigValue>,
    pub changes: Vec<ConfigDiff>,
}

/// Immutable, numbered versions per scope.
///
/// Creation is a read-modify-write over the scope's metadata and version list
/// without any lock: concurrent writers to one scope must be serialized by the
/// caller.
#[derive(Clone)]
pub struct VersionManager {
    ctx: StoreContext,
    archive: ArchiveManager,
}

impl VersionManager {
    pub fn new(ctx: StoreContext) -> Self {
        let archive = ArchiveManager::new(ctx.clone());
        Self { ctx, archive }
    }

    pub fn archive(&self) -> &ArchiveManager {
        &self.archive
    }

    pub async fn get_metadata(&self, scope_code: &str) -> Result<Option<VersionMetadata>> {
        let key = version_metadata_key(scope_code)?;
        match self.ctx.fast.get(&key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Version ids of a scope, oldest first.
    pub async fn version_ids(&self, scope_code: &str) -> Result<Vec<String>> {
        let key = version_list_key(scope_code)?;
        match self.ctx.fast.get(&key).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    pub async fn create_version(
        &self,
        request: CreateVersionRequest,
    ) -> Result<CreateVersionResult> {
        let CreateVersionRequest {
            scope,
            old_config,
            new_config,
            actor,
        } = request;

        let previous = self.get_metadata(&scope.code).await?;
        let diff = calculate_diff(&old_config, &new_config);

        let version = ConfigVersion {
            id: Ulid::new().to_string(),
            scope: scope.clone(),
            snapshot: self.ctx.redaction.redact_values(&new_config),
            diff: self.ctx.redaction.redact_changes(&diff),
            timestamp: Utc::now(),
            previous_version_id: previous
                .as_ref()
                .and_then(|meta| meta.latest_version_id.clone()),
            version_number: previous
                .as_ref()
                .map(VersionMetadata::next_version_number)
                .unwrap_or(1),
            actor,
        };

        let saved = self
            .archive
            .save_version_with_auto_archive(&scope.code, &version)
            .await?;

        let mut ids = self.version_ids(&scope.code).await?;
        ids.push(version.id.clone());
        let excess = ids.len().saturating_sub(MAX_VERSIONS_PER_SCOPE);
        let pruned: Vec<String> = ids.drain(..excess).collect();

        // Metadata goes first so a failed prune never hands out this number again.
        let metadata = VersionMetadata {
            latest_version_id: Some(version.id.clone()),
            total_versions: ids.len() as u64,
            last_updated: version.timestamp,
            latest_version_number: version.version_number,
        };
        self.ctx
            .fast
            .put(
                &version_metadata_key(&scope.code)?,
                &serde_json::to_string(&metadata)?,
                Ttl::Never,
            )
            .await?;
        self.ctx
            .fast
            .put(
                &version_list_key(&scope.code)?,
                &serde_json::to_string(&ids)?,
                Ttl::Never,
            )
            .await?;

        for old_id in &pruned {
            self.archive.delete_version(&scope.code, old_id).await?;
            tracing::debug!("pruned version {} of scope {}", old_id, scope.code);
        }

        tracing::info!(
            "Created version {} (#{}) for scope {} with {} change(s)",
            version.id,
            version.version_number,
            scope.code,
            version.diff.len()
        );

        Ok(CreateVersionResult {
            version,
            metadata,
            archived: saved.archived,
            pruned,
        })
    }

    pub async fn get_version(
        &self,
        scope_code: &str,
        version_id: &str,
    ) -> Result<Option<ConfigVersion>> {
        self.archive.restore_from_archive(scope_code, version_id).await
    }

    /// Newest first.
    pub async fn get_version_history(
        &self,
        query: VersionHistoryQuery,
    ) -> Result<VersionHistoryPage> {
        let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        let offset = query.offset.unwrap_or(0);
        let ids = self.version_ids(&query.scope_code).await?;

        let mut versions = Vec::new();
        for id in ids.iter().rev().skip(offset).take(limit) {
            match self.get_version(&query.scope_code, id).await? {
                Some(version) => versions.push(version),
                None => tracing::warn!(
                    "version {} listed for scope {} has no stored payload",
                    id,
                    query.scope_code
                ),
            }
        }

        Ok(VersionHistoryPage {
            versions,
            total: ids.len(),
            limit,
            offset,
        })
    }

    /// The configuration as it was right before `version_id` and right after it.
    pub async fn get_version_comparison(
        &self,
        scope_code: &str,
        version_id: &str,
    ) -> Result<Option<VersionComparison>> {
        let Some(version) = self.get_version(scope_code, version_id).await? else {
            return Ok(None);
        };

        let before = apply_diff(&version.snapshot, &invert_diff(&version.diff));
        let after = version.snapshot.clone();
        Ok(Some(VersionComparison {
            version,
            before,
            after,
        }))
    }

    pub async fn compare_two_versions(
        &self,
        scope_code: &str,
        from_id: &str,
        to_id: &str,
    ) -> Result<Option<TwoVersionComparison>> {
        let Some(from_version) = self.get_version(scope_code, from_id).await? else {
            return Ok(None);
        };
        let Some(to_version) = self.get_version(scope_code, to_id).await? else {
            return Ok(None);
        };

        let changes = calculate_diff(&from_version.snapshot, &to_version.snapshot);
        Ok(Some(TwoVersionComparison {
            from_config: from_version.snapshot.clone(),
            to_config: to_version.snapshot.clone(),
            from_version,
            to_version,
            changes,
        }))
    }
}
