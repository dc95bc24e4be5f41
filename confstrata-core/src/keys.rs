//! Persisted key shapes and archive paths.
//!
//! These strings are read by other deployments; keep them bit-exact.

use crate::error::{Result, StrataError};
use crate::limits::{validate_key, validate_key_segment};
use crate::types::ScopeRef;

pub const SCOPE_TREE_KEY: &str = "scope-tree";

pub const ARCHIVE_ROOT: &str = "archives/versions";

pub fn version_key(scope_code: &str, version_id: &str) -> Result<String> {
    compose(&["version", scope_code, version_id])
}

pub fn version_metadata_key(scope_code: &str) -> Result<String> {
    compose(&["version-meta", scope_code])
}

pub fn version_list_key(scope_code: &str) -> Result<String> {
    compose(&["version-list", scope_code])
}

pub fn audit_entry_key(audit_id: &str) -> Result<String> {
    compose(&["audit", audit_id])
}

pub fn audit_list_key(scope_code: &str) -> Result<String> {
    compose(&["audit-list", scope_code])
}

/// Scope-level values are keyed by level as well as code: commerce lets a website
/// and a store view share a code.
pub fn config_key(scope: &ScopeRef) -> Result<String> {
    compose(&["config", &scope.level, &scope.code])
}

fn compose(segments: &[&str]) -> Result<String> {
    for segment in segments {
        validate_key_segment(segment)?;
    }
    let key = segments.join(":");
    validate_key(&key)?;
    Ok(key)
}

/// Archive components may only hold `[A-Za-z0-9_-]`; dots and separators are refused
/// so a crafted scope code or id cannot escape `archives/versions/`.
pub fn validate_path_component(component: &str) -> Result<()> {
    let valid = !component.is_empty()
        && component
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'));
    if valid {
        return Ok(());
    }

    Err(StrataError::InvalidPathComponent(component.to_string()))
}

pub fn archive_path(scope_code: &str, version_id: &str) -> Result<String> {
    validate_path_component(scope_code)?;
    validate_path_component(version_id)?;
    Ok(format!("{}/{}/{}.json", ARCHIVE_ROOT, scope_code, version_id))
}
