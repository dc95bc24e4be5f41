pub mod archive;
pub mod audit;
pub mod configuration;
pub mod versioning;

pub use archive::{
    ArchiveBatchResult, ArchiveDecision, ArchiveManager, DEFAULT_MAX_AGE_DAYS, SaveVersionOutcome,
};
pub use audit::{
    AuditLogPage, AuditLogger, AuditQuery, ChainVerification, LogChangeRequest,
    compute_integrity_hash,
};
pub use configuration::{
    ConfigSchema, ConfigurationChange, ConfigurationManager, ConfigurationResponse, SchemaField,
    SetConfigurationRequest, sanitize_entries,
};
pub use versioning::{
    CreateVersionRequest, CreateVersionResult, MAX_VERSIONS_PER_SCOPE, TwoVersionComparison,
    VersionComparison, VersionHistoryPage, VersionHistoryQuery, VersionManager,
};
