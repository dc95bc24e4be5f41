//! Confstrata Core - versioned, audited configuration over tiered storage
//!
//! Scoped business configuration with:
//! - inheritance along a global / website / store / store view tree
//! - immutable diff-based versions, 25 retained per scope
//! - a SHA-256 hash-chained, redacted audit trail
//! - automatic migration of large or old versions to a blob tier

pub mod context;
pub mod diff;
pub mod error;
pub mod hashing;
pub mod keys;
pub mod limits;
pub mod operations;
pub mod redaction;
pub mod scope_tree;
pub mod storage;
pub mod types;

pub use context::StoreContext;
pub use diff::{apply_diff, calculate_diff, invert_diff};
pub use error::{Result, StrataError};
pub use hashing::{AUDIT_HASH_ALGORITHM, HashAlgorithm, compute_hash, hash_canonical_json};
pub use limits::{
    ARCHIVE_THRESHOLD_BYTES, FAST_TIER_MAX_KEY_BYTES, FAST_TIER_MAX_VALUE_BYTES, serialized_size,
    validate_key,
};
pub use operations::{
    ArchiveManager, AuditLogger, AuditQuery, ConfigSchema, ConfigurationManager,
    SetConfigurationRequest, VersionHistoryQuery, VersionManager,
};
pub use redaction::{REDACTED_PLACEHOLDER, RedactionPolicy};
pub use scope_tree::{
    CommerceHierarchy, ScopeSelector, ScopeTree, build_updated_scope_tree, merge_commerce_scopes,
};
pub use storage::{
    BlobStore, CombinedStore, KeyValueStore, MemoryKvStore, ObjectBlobStore, StoreBuilder, Ttl,
};
pub use types::*;
