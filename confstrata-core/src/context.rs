use crate::redaction::RedactionPolicy;
use crate::storage::{BlobStore, KeyValueStore, MemoryKvStore, ObjectBlobStore};
use std::sync::Arc;

/// Storage collaborators handed to every component.
///
/// There is no process-wide client: build one context (usually through
/// [`crate::storage::StoreBuilder`]) and clone it into each manager.
#[derive(Clone)]
pub struct StoreContext {
    pub fast: Arc<dyn KeyValueStore>,
    pub blob: Arc<dyn BlobStore>,
    pub redaction: RedactionPolicy,
}

impl StoreContext {
    pub fn new(fast: Arc<dyn KeyValueStore>, blob: Arc<dyn BlobStore>) -> Self {
        Self {
            fast,
            blob,
            redaction: RedactionPolicy::default(),
        }
    }

    pub fn with_redaction(mut self, redaction: RedactionPolicy) -> Self {
        self.redaction = redaction;
        self
    }

    /// Both tiers in process memory.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryKvStore::new()),
            Arc::new(ObjectBlobStore::in_memory()),
        )
    }
}
