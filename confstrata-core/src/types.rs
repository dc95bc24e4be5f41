//! Data model shared by every component.
//!
//! Field names serialize in camelCase so persisted JSON stays compatible with
//! existing fast-tier and blob-tier contents. Scope tree nodes are the exception
//! and keep snake_case.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identity of one node of the scope hierarchy.
///
/// `code` + `level` is the stable external key; `id` is the storage-stable id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeRef {
    pub id: String,
    pub code: String,
    pub level: String,
}

/// Persisted inside the `scope-tree` document with snake_case field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeNode {
    pub id: String,
    pub code: String,
    pub label: String,
    pub level: String,
    pub is_editable: bool,
    pub is_final: bool,
    pub is_removable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commerce_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<ScopeNode>>,
}

impl ScopeNode {
    pub fn scope_ref(&self) -> ScopeRef {
        ScopeRef {
            id: self.id.clone(),
            code: self.code.clone(),
            level: self.level.clone(),
        }
    }

    pub fn children(&self) -> &[ScopeNode] {
        self.children.as_deref().unwrap_or_default()
    }
}

/// One named configuration value.
///
/// `origin` is set on resolved (inherited) reads and names the scope that
/// actually defined the value. Stored scope-level entries and snapshots carry
/// no origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigValue {
    pub name: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<ScopeRef>,
}

impl ConfigValue {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: ScopeRef) -> Self {
        self.origin = Some(origin);
        self
    }
}

/// Per-name change between two configuration value sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConfigDiff {
    #[serde(rename_all = "camelCase")]
    Added { name: String, new_value: Value },
    #[serde(rename_all = "camelCase")]
    Modified {
        name: String,
        old_value: Value,
        new_value: Value,
    },
    #[serde(rename_all = "camelCase")]
    Removed { name: String, old_value: Value },
}

impl ConfigDiff {
    pub fn name(&self) -> &str {
        match self {
            ConfigDiff::Added { name, .. }
            | ConfigDiff::Modified { name, .. }
            | ConfigDiff::Removed { name, .. } => name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ConfigDiff::Added { .. } => "added",
            ConfigDiff::Modified { .. } => "modified",
            ConfigDiff::Removed { .. } => "removed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigVersion {
    pub id: String,
    pub scope: ScopeRef,
    pub snapshot: Vec<ConfigValue>,
    pub diff: Vec<ConfigDiff>,
    pub timestamp: DateTime<Utc>,
    pub previous_version_id: Option<String>,
    pub version_number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionMetadata {
    pub latest_version_id: Option<String>,
    /// Number of versions currently retained for the scope.
    pub total_versions: u64,
    pub last_updated: DateTime<Utc>,
    /// Highest version number ever assigned; survives retention pruning.
    #[serde(default)]
    pub latest_version_number: u64,
}

impl VersionMetadata {
    pub fn next_version_number(&self) -> u64 {
        self.latest_version_number.max(self.total_versions) + 1
    }
}

/// Who performed a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Actor {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Rollback,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
            AuditAction::Rollback => "rollback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub scope: ScopeRef,
    pub version_id: String,
    pub actor: Actor,
    pub changes: Vec<ConfigDiff>,
    pub integrity_hash: String,
    pub previous_hash: Option<String>,
    pub action: AuditAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveReason {
    Size,
    Age,
}

/// Lightweight stand-in kept in the fast tier once a version lives in the blob tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveReference {
    pub id: String,
    pub archived: bool,
    pub archived_at: DateTime<Utc>,
    pub archive_path: String,
    pub size_in_bytes: u64,
    pub reason: ArchiveReason,
}

/// What the fast tier holds at a `version:{scope}:{id}` key.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredVersion {
    Inline(ConfigVersion),
    Archived(ArchiveReference),
}

impl StoredVersion {
    /// Decode a fast-tier payload, telling references apart by their `archived` flag.
    pub fn decode(raw: &str) -> crate::Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        if value.get("archived").and_then(Value::as_bool) == Some(true) {
            Ok(StoredVersion::Archived(serde_json::from_value(value)?))
        } else {
            Ok(StoredVersion::Inline(serde_json::from_value(value)?))
        }
    }
}
