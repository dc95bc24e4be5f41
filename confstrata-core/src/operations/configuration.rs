use super::archive::ArchiveBatchResult;
use super::audit::{AuditLogger, LogChangeRequest};
use super::versioning::{CreateVersionRequest, VersionManager};
use crate::context::StoreContext;
use crate::diff::calculate_diff;
use crate::error::{Result, StrataError};
use crate::keys::{SCOPE_TREE_KEY, config_key};
use crate::redaction::is_redacted;
use crate::scope_tree::{
    CommerceHierarchy, ScopeSelector, ScopeTree, build_updated_scope_tree, merge_commerce_scopes,
};
use crate::storage::{BlobKvStore, CombinedStore, KeyValueStore, Ttl, persist_all};
use crate::types::{Actor, AuditAction, ConfigValue, ScopeRef};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

const SYSTEM_ACTOR: &str = "system";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(default)]
    pub default: Value,
}

/// Declared fields and their defaults, used when no scope in the chain sets a value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfigSchema {
    #[serde(default)]
    pub fields: Vec<SchemaField>,
}

#[derive(Debug, Clone, Default)]
pub struct SetConfigurationRequest {
    /// Raw entries; anything that is not an object with a `name` and a `value` is dropped.
    pub config: Vec<Value>,
    pub actor: Option<Actor>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigurationResponse {
    pub scope: ScopeRef,
    pub config: Vec<ConfigValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationChange {
    pub scope: ScopeRef,
    /// Scope-level (not inherited) configuration after the change.
    pub config: Vec<ConfigValue>,
    /// Version recorded for the change; `None` when nothing changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
}

/// Extract `{name, value}` pairs from raw request entries.
///
/// Null and other falsy values count as set; only a missing `value` key drops an entry.
pub fn sanitize_entries(entries: &[Value]) -> Vec<ConfigValue> {
    entries
        .iter()
        .filter_map(|entry| {
            let object = entry.as_object()?;
            let name = object.get("name")?.as_str()?.trim();
            if name.is_empty() {
                return None;
            }
            let value = object.get("value")?;
            Some(ConfigValue::new(name, value.clone()))
        })
        .collect()
}

fn upsert(base: &[ConfigValue], updates: &[ConfigValue]) -> Vec<ConfigValue> {
    let mut merged = base.to_vec();
    let mut positions: HashMap<String, usize> = merged
        .iter()
        .enumerate()
        .map(|(idx, entry)| (entry.name.clone(), idx))
        .collect();

    for update in updates {
        match positions.get(&update.name) {
            Some(&idx) => merged[idx].value = update.value.clone(),
            None => {
                positions.insert(update.name.clone(), merged.len());
                merged.push(update.clone());
            }
        }
    }
    merged
}

/// Reads and writes scoped configuration, recording a version and an audit entry
/// for every effective change.
///
/// Scope-level values live at `config:{level}:{code}` in a [`CombinedStore`]: the fast
/// tier caches what the blob tier persists.
#[derive(Clone)]
pub struct ConfigurationManager {
    store: CombinedStore,
    versions: VersionManager,
    audit: AuditLogger,
    schema: ConfigSchema,
}

impl ConfigurationManager {
    pub fn new(ctx: StoreContext) -> Self {
        let persistent = Arc::new(BlobKvStore::new(ctx.blob.clone()));
        let store = CombinedStore::new(ctx.fast.clone(), persistent, persist_all());

        Self {
            store,
            versions: VersionManager::new(ctx.clone()),
            audit: AuditLogger::new(ctx),
            schema: ConfigSchema::default(),
        }
    }

    pub fn with_schema(mut self, schema: ConfigSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn versions(&self) -> &VersionManager {
        &self.versions
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    pub async fn scope_tree(&self) -> Result<ScopeTree> {
        match self.store.get(SCOPE_TREE_KEY).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(ScopeTree::with_global_root()),
        }
    }

    pub async fn save_scope_tree(&self, tree: &ScopeTree) -> Result<()> {
        self.store
            .put(SCOPE_TREE_KEY, &serde_json::to_string(tree)?, Ttl::Never)
            .await
    }

    /// Merge a fresh commerce hierarchy into the stored tree and persist the result.
    pub async fn sync_commerce_scopes(&self, hierarchy: &CommerceHierarchy) -> Result<ScopeTree> {
        let existing = self.scope_tree().await?;
        let subtree = merge_commerce_scopes(hierarchy, &existing);
        let updated = build_updated_scope_tree(subtree, &existing);
        self.save_scope_tree(&updated).await?;

        tracing::info!(
            "Synced commerce scopes: {} website(s), {} root(s) in tree",
            hierarchy.websites.len(),
            updated.roots.len()
        );
        Ok(updated)
    }

    async fn resolve_chain(&self, selector: &ScopeSelector) -> Result<Vec<ScopeRef>> {
        let tree = self.scope_tree().await?;
        tree.resolve(selector)
    }

    async fn resolve_scope(&self, selector: &ScopeSelector) -> Result<ScopeRef> {
        self.resolve_chain(selector)
            .await?
            .pop()
            .ok_or_else(|| StrataError::Internal("resolved an empty scope chain".to_string()))
    }

    /// Values set directly on a scope, without inheritance.
    pub async fn load_scope_config(&self, scope: &ScopeRef) -> Result<Vec<ConfigValue>> {
        match self.store.get(&config_key(scope)?).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    async fn save_scope_config(&self, scope: &ScopeRef, config: &[ConfigValue]) -> Result<()> {
        self.store
            .put(
                &config_key(scope)?,
                &serde_json::to_string(config)?,
                Ttl::Never,
            )
            .await
    }

    /// Resolved configuration: ancestors first, each child overriding its parent,
    /// schema defaults filling whatever no scope sets.
    pub async fn get_configuration(
        &self,
        selector: &ScopeSelector,
    ) -> Result<ConfigurationResponse> {
        let chain = self.resolve_chain(selector).await?;

        let mut resolved: Vec<ConfigValue> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for scope in &chain {
            for entry in self.load_scope_config(scope).await? {
                let value = ConfigValue::new(entry.name, entry.value).with_origin(scope.clone());
                match positions.get(&value.name) {
                    Some(&idx) => resolved[idx] = value,
                    None => {
                        positions.insert(value.name.clone(), resolved.len());
                        resolved.push(value);
                    }
                }
            }
        }

        for field in &self.schema.fields {
            if !positions.contains_key(&field.name) {
                positions.insert(field.name.clone(), resolved.len());
                resolved.push(ConfigValue::new(field.name.clone(), field.default.clone()));
            }
        }

        let scope = chain
            .last()
            .cloned()
            .ok_or_else(|| StrataError::Internal("resolved an empty scope chain".to_string()))?;
        Ok(ConfigurationResponse {
            scope,
            config: resolved,
        })
    }

    async fn commit(
        &self,
        scope: ScopeRef,
        current: Vec<ConfigValue>,
        next: Vec<ConfigValue>,
        actor: Option<Actor>,
        action: AuditAction,
    ) -> Result<ConfigurationChange> {
        let changes = calculate_diff(&current, &next);
        if changes.is_empty() {
            tracing::debug!("no effective change for scope {}", scope.code);
            return Ok(ConfigurationChange {
                scope,
                config: current,
                version_id: None,
            });
        }

        let actor = actor.unwrap_or_else(|| Actor::new(SYSTEM_ACTOR));

        let created = self
            .versions
            .create_version(CreateVersionRequest {
                scope: scope.clone(),
                old_config: current,
                new_config: next.clone(),
                actor: Some(actor.user_id.clone()),
            })
            .await?;

        self.audit
            .log_change(LogChangeRequest {
                scope: scope.clone(),
                version_id: created.version.id.clone(),
                actor,
                changes,
                action,
            })
            .await?;

        // Live values change only once the version and audit entry are recorded.
        self.save_scope_config(&scope, &next).await?;

        Ok(ConfigurationChange {
            scope,
            config: next,
            version_id: Some(created.version.id),
        })
    }

    /// Merge `request.config` into the scope's own values; unmentioned values are kept.
    pub async fn set_configuration(
        &self,
        request: SetConfigurationRequest,
        selector: &ScopeSelector,
    ) -> Result<ConfigurationChange> {
        let scope = self.resolve_scope(selector).await?;
        let updates = sanitize_entries(&request.config);
        if updates.len() < request.config.len() {
            tracing::debug!(
                "dropped {} malformed entr(ies) for scope {}",
                request.config.len() - updates.len(),
                scope.code
            );
        }

        let current = self.load_scope_config(&scope).await?;
        let action = if current.is_empty() {
            AuditAction::Create
        } else {
            AuditAction::Update
        };
        let merged = upsert(&current, &updates);

        self.commit(scope, current, merged, request.actor, action).await
    }

    pub async fn delete_configuration(
        &self,
        selector: &ScopeSelector,
        names: &[String],
        actor: Option<Actor>,
    ) -> Result<ConfigurationChange> {
        let scope = self.resolve_scope(selector).await?;
        let current = self.load_scope_config(&scope).await?;
        let remaining = current
            .iter()
            .filter(|entry| !names.contains(&entry.name))
            .cloned()
            .collect();

        self.commit(scope, current, remaining, actor, AuditAction::Delete)
            .await
    }

    /// Restore the scope-level values captured by `version_id`.
    ///
    /// Redacted values in the snapshot keep the scope's current value, or are
    /// left out when the scope no longer has one. Returns `None` for an unknown version.
    pub async fn rollback_to_version(
        &self,
        selector: &ScopeSelector,
        version_id: &str,
        actor: Option<Actor>,
    ) -> Result<Option<ConfigurationChange>> {
        let scope = self.resolve_scope(selector).await?;
        let Some(version) = self.versions.get_version(&scope.code, version_id).await? else {
            return Ok(None);
        };

        let current = self.load_scope_config(&scope).await?;
        let mut restored = Vec::with_capacity(version.snapshot.len());
        for entry in version.snapshot {
            if !is_redacted(&entry.value) {
                restored.push(ConfigValue::new(entry.name, entry.value));
                continue;
            }
            match current.iter().find(|existing| existing.name == entry.name) {
                Some(existing) => restored.push(existing.clone()),
                None => tracing::warn!(
                    "rollback of scope {} skips redacted value {} with no current value",
                    scope.code,
                    entry.name
                ),
            }
        }

        let change = self
            .commit(scope, current, restored, actor, AuditAction::Rollback)
            .await?;
        Ok(Some(change))
    }

    /// Move the scope's versions that are old or large enough to the blob tier.
    pub async fn archive_scope_versions(
        &self,
        scope_code: &str,
        max_age_days: u32,
    ) -> Result<ArchiveBatchResult> {
        let ids = self.versions.version_ids(scope_code).await?;
        Ok(self
            .versions
            .archive()
            .archive_old_versions(scope_code, &ids, max_age_days)
            .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redaction::REDACTED_PLACEHOLDER;
    use crate::scope_tree::{
        CommerceStoreGroup, CommerceStoreView, CommerceWebsite, LEVEL_STORE_VIEW, LEVEL_WEBSITE,
    };
    use crate::types::{ConfigDiff, StoredVersion};
    use serde_json::json;

    fn hierarchy() -> CommerceHierarchy {
        CommerceHierarchy {
            websites: vec![CommerceWebsite {
                id: 1,
                code: "base".to_string(),
                name: "Main Website".to_string(),
                default_group_id: Some(1),
            }],
            store_groups: vec![CommerceStoreGroup {
                id: 1,
                website_id: 1,
                code: "main_store".to_string(),
                name: "Main Store".to_string(),
                root_category_id: None,
                default_store_id: Some(1),
            }],
            store_views: vec![CommerceStoreView {
                id: 1,
                code: "default".to_string(),
                name: "Default Store View".to_string(),
                website_id: 1,
                store_group_id: 1,
                is_active: Some(1),
            }],
        }
    }

    fn global() -> ScopeSelector {
        ScopeSelector::by_code("global", "global")
    }

    fn set(entries: Vec<Value>) -> SetConfigurationRequest {
        SetConfigurationRequest {
            config: entries,
            actor: Some(Actor::new("admin")),
        }
    }

    async fn manager() -> ConfigurationManager {
        let manager = ConfigurationManager::new(StoreContext::in_memory());
        manager.sync_commerce_scopes(&hierarchy()).await.unwrap();
        manager
    }

    #[test]
    fn test_sanitize_entries() {
        let entries = vec![
            json!({"name": "currency", "value": "USD", "extra": true}),
            json!({"name": "flag", "value": false}),
            json!({"name": "empty", "value": null}),
            json!({"name": "missing_value"}),
            json!({"value": 3}),
            json!({"name": "", "value": 3}),
            json!("not an object"),
        ];

        let sanitized = sanitize_entries(&entries);
        assert_eq!(
            sanitized,
            vec![
                ConfigValue::new("currency", json!("USD")),
                ConfigValue::new("flag", json!(false)),
                ConfigValue::new("empty", Value::Null),
            ]
        );
    }

    #[tokio::test]
    async fn test_set_merges_and_records_version() {
        let manager = manager().await;

        let first = manager
            .set_configuration(
                set(vec![json!({"name": "currency", "value": "USD"}), json!({"name": "bad"})]),
                &global(),
            )
            .await
            .unwrap();
        assert_eq!(first.config, vec![ConfigValue::new("currency", json!("USD"))]);
        assert!(first.version_id.is_some());

        let second = manager
            .set_configuration(set(vec![json!({"name": "locale", "value": "en_US"})]), &global())
            .await
            .unwrap();
        assert_eq!(second.config.len(), 2);

        let noop = manager
            .set_configuration(set(vec![json!({"name": "locale", "value": "en_US"})]), &global())
            .await
            .unwrap();
        assert!(noop.version_id.is_none());

        let history = manager
            .versions()
            .get_version_history(crate::operations::VersionHistoryQuery {
                scope_code: "global".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(history.total, 2);

        let log = manager
            .audit()
            .get_audit_log(Default::default())
            .await
            .unwrap();
        assert_eq!(log.total, 2);
        assert_eq!(log.entries[1].action, AuditAction::Create);
        assert_eq!(log.entries[0].action, AuditAction::Update);
        assert!(manager.audit().verify_audit_chain("global").await.unwrap().valid);
    }

    #[tokio::test]
    async fn test_inheritance_and_origin() {
        let manager = manager().await;
        manager
            .set_configuration(
                set(vec![
                    json!({"name": "currency", "value": "USD"}),
                    json!({"name": "locale", "value": "en_US"}),
                ]),
                &global(),
            )
            .await
            .unwrap();
        manager
            .set_configuration(
                set(vec![json!({"name": "locale", "value": "fr_FR"})]),
                &ScopeSelector::by_code("base", LEVEL_WEBSITE),
            )
            .await
            .unwrap();

        let manager = manager.with_schema(ConfigSchema {
            fields: vec![SchemaField {
                name: "timezone".to_string(),
                default: json!("UTC"),
            }],
        });
        let resolved = manager
            .get_configuration(&ScopeSelector::by_code("default", LEVEL_STORE_VIEW))
            .await
            .unwrap();

        assert_eq!(resolved.scope.code, "default");
        let by_name: HashMap<&str, &ConfigValue> = resolved
            .config
            .iter()
            .map(|entry| (entry.name.as_str(), entry))
            .collect();
        assert_eq!(by_name["currency"].value, json!("USD"));
        assert_eq!(by_name["currency"].origin.as_ref().unwrap().code, "global");
        assert_eq!(by_name["locale"].value, json!("fr_FR"));
        assert_eq!(by_name["locale"].origin.as_ref().unwrap().code, "base");
        assert_eq!(by_name["timezone"].value, json!("UTC"));
        assert!(by_name["timezone"].origin.is_none());
    }

    #[tokio::test]
    async fn test_reads_fall_back_to_blob_tier() {
        let ctx = StoreContext::in_memory();
        let manager = ConfigurationManager::new(ctx.clone());
        manager
            .set_configuration(set(vec![json!({"name": "currency", "value": "USD"})]), &global())
            .await
            .unwrap();

        ctx.fast.delete("config:global:global").await.unwrap();
        let resolved = manager.get_configuration(&global()).await.unwrap();
        assert_eq!(resolved.config[0].value, json!("USD"));
        assert!(ctx.fast.get("config:global:global").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unknown_scope_is_rejected() {
        let manager = manager().await;
        let result = manager
            .get_configuration(&ScopeSelector::by_code("nowhere", LEVEL_WEBSITE))
            .await;
        assert!(matches!(result, Err(StrataError::ScopeNotFound(_))));

        let result = manager
            .set_configuration(set(vec![]), &ScopeSelector::by_id(""))
            .await;
        assert!(matches!(result, Err(StrataError::InvalidScope(_))));
    }

    #[tokio::test]
    async fn test_delete_configuration() {
        let manager = manager().await;
        manager
            .set_configuration(
                set(vec![
                    json!({"name": "currency", "value": "USD"}),
                    json!({"name": "locale", "value": "en_US"}),
                ]),
                &global(),
            )
            .await
            .unwrap();

        let change = manager
            .delete_configuration(&global(), &["locale".to_string()], None)
            .await
            .unwrap();
        assert_eq!(change.config, vec![ConfigValue::new("currency", json!("USD"))]);

        let log = manager.audit().get_audit_log(Default::default()).await.unwrap();
        assert_eq!(log.entries[0].action, AuditAction::Delete);
        assert_eq!(log.entries[0].actor.user_id, SYSTEM_ACTOR);
        assert!(matches!(log.entries[0].changes[0], ConfigDiff::Removed { .. }));
    }

    #[tokio::test]
    async fn test_rollback_keeps_current_secret() {
        let manager = manager().await;
        let v1 = manager
            .set_configuration(
                set(vec![
                    json!({"name": "currency", "value": "USD"}),
                    json!({"name": "api_key", "value": "sk-1"}),
                ]),
                &global(),
            )
            .await
            .unwrap();
        manager
            .set_configuration(
                set(vec![
                    json!({"name": "currency", "value": "EUR"}),
                    json!({"name": "api_key", "value": "sk-2"}),
                ]),
                &global(),
            )
            .await
            .unwrap();

        let rolled = manager
            .rollback_to_version(&global(), v1.version_id.as_deref().unwrap(), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            rolled.config,
            vec![
                ConfigValue::new("currency", json!("USD")),
                ConfigValue::new("api_key", json!("sk-2")),
            ]
        );
        assert!(!rolled.config.iter().any(|entry| entry.value == json!(REDACTED_PLACEHOLDER)));

        assert!(
            manager
                .rollback_to_version(&global(), "01MISSING", None)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_sync_keeps_ids_and_default_tree() {
        let manager = ConfigurationManager::new(StoreContext::in_memory());
        let initial = manager.scope_tree().await.unwrap();
        assert_eq!(initial, ScopeTree::with_global_root());

        let first = manager.sync_commerce_scopes(&hierarchy()).await.unwrap();
        let second = manager.sync_commerce_scopes(&hierarchy()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(manager.scope_tree().await.unwrap(), second);
    }

    #[tokio::test]
    async fn test_archive_scope_versions() {
        let manager = manager().await;
        manager
            .set_configuration(set(vec![json!({"name": "currency", "value": "USD"})]), &global())
            .await
            .unwrap();

        let summary = manager.archive_scope_versions("global", 90).await.unwrap();
        assert_eq!(summary.archived, 0);
        assert_eq!(summary.skipped, 1);

        let summary = manager.archive_scope_versions("global", 0).await.unwrap();
        assert_eq!(summary.archived, 1);
        assert_eq!(summary.failed, 0);

        let ids = manager.versions().version_ids("global").await.unwrap();
        assert!(matches!(
            manager
                .versions()
                .archive()
                .load_stored_version("global", &ids[0])
                .await
                .unwrap(),
            Some(StoredVersion::Archived(_))
        ));
        let restored = manager
            .versions()
            .get_version("global", &ids[0])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(restored.snapshot, vec![ConfigValue::new("currency", json!("USD"))]);
    }

    #[tokio::test]
    async fn test_shared_code_across_levels_stays_separate() {
        let manager = ConfigurationManager::new(StoreContext::in_memory());
        let mut shared = hierarchy();
        shared.websites[0].code = "us".to_string();
        shared.store_views[0].code = "us".to_string();
        manager.sync_commerce_scopes(&shared).await.unwrap();

        let view = ScopeSelector::by_code("us", LEVEL_STORE_VIEW);
        let website = ScopeSelector::by_code("us", LEVEL_WEBSITE);
        manager
            .set_configuration(set(vec![json!({"name": "locale", "value": "fr_FR"})]), &view)
            .await
            .unwrap();

        let resolved = manager.get_configuration(&website).await.unwrap();
        assert!(resolved.config.is_empty());

        let resolved = manager.get_configuration(&view).await.unwrap();
        assert_eq!(resolved.config.len(), 1);
        let origin = resolved.config[0].origin.as_ref().unwrap();
        assert_eq!(origin.level, LEVEL_STORE_VIEW);
    }

    #[tokio::test]
    async fn test_failed_audit_leaves_live_config_unchanged() {
        let ctx = StoreContext::in_memory();
        let manager = ConfigurationManager::new(ctx.clone());
        ctx.fast
            .put("audit-list:global", "not json", Ttl::Never)
            .await
            .unwrap();

        let result = manager
            .set_configuration(set(vec![json!({"name": "currency", "value": "USD"})]), &global())
            .await;
        assert!(result.is_err());

        let resolved = manager.get_configuration(&global()).await.unwrap();
        assert!(resolved.config.is_empty());
        assert!(ctx.fast.get("config:global:global").await.unwrap().is_none());
    }
}
