use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use boardpilot_core::domain::memory::{
    ContextEntry, Conversation, MemorySnapshot, RecentCreation, StoredResource,
    DEFAULT_CONVERSATION_LIMIT,
};
use boardpilot_core::domain::plan::ResourceType;
use boardpilot_core::domain::report::{ExecutionReport, ResourceRecord};

use crate::backend::{BackendError, InMemoryBackend, JsonFileBackend, SnapshotBackend};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not persist memory to `{location}`: {source}")]
    Write { location: String, source: BackendError },
    #[error("cannot store a {0} record without an id")]
    MissingResourceId(ResourceType),
    #[error("invalid context data: {0}")]
    InvalidContext(#[source] serde_json::Error),
}

/// Bounded, durable history of conversations and the resources they created.
///
/// All mutations go through one async mutex. Each is applied to a copy of
/// the snapshot, written out in full, and only then swapped in, so a failed
/// write leaves the in-memory state untouched.
pub struct MemoryStore {
    backend: Arc<dyn SnapshotBackend>,
    state: Mutex<MemorySnapshot>,
    conversation_limit: usize,
    write_failed: AtomicBool,
}

impl MemoryStore {
    /// Loads the snapshot from `backend`. An absent or unreadable document
    /// yields fresh state, which is written back immediately.
    pub async fn open(backend: Arc<dyn SnapshotBackend>, conversation_limit: usize) -> Self {
        let location = backend.location();
        let snapshot = match backend.load().await {
            Ok(Some(snapshot)) => {
                info!(
                    event_name = "memory.store.loaded",
                    location = %location,
                    conversations = snapshot.conversations.len(),
                    "memory snapshot loaded"
                );
                Some(snapshot)
            }
            Ok(None) => None,
            Err(error) => {
                warn!(
                    event_name = "memory.store.read_failed",
                    location = %location,
                    error = %error,
                    "memory snapshot unreadable, starting fresh"
                );
                None
            }
        };

        let mut write_failed = false;
        let snapshot = match snapshot {
            Some(snapshot) => snapshot,
            None => {
                let fresh = MemorySnapshot::default();
                if let Err(error) = backend.save(&fresh).await {
                    warn!(
                        event_name = "memory.store.write_failed",
                        location = %location,
                        error = %error,
                        "could not initialise memory snapshot"
                    );
                    write_failed = true;
                }
                fresh
            }
        };

        Self {
            backend,
            state: Mutex::new(snapshot),
            conversation_limit: conversation_limit.max(1),
            write_failed: AtomicBool::new(write_failed),
        }
    }

    pub async fn open_file(path: impl Into<PathBuf>, conversation_limit: usize) -> Self {
        Self::open(Arc::new(JsonFileBackend::new(path)), conversation_limit).await
    }

    pub async fn in_memory() -> Self {
        Self::open(Arc::new(InMemoryBackend::new()), DEFAULT_CONVERSATION_LIMIT).await
    }

    pub fn location(&self) -> String {
        self.backend.location()
    }

    pub fn conversation_limit(&self) -> usize {
        self.conversation_limit
    }

    /// False when the most recent write to the backend failed.
    pub fn is_persisting(&self) -> bool {
        !self.write_failed.load(Ordering::SeqCst)
    }

    pub async fn conversation_count(&self) -> usize {
        self.state.lock().await.conversations.len()
    }

    async fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut MemorySnapshot) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut current = self.state.lock().await;
        let mut next = current.clone();
        let output = apply(&mut next)?;

        if let Err(source) = self.backend.save(&next).await {
            let location = self.backend.location();
            warn!(
                event_name = "memory.store.write_failed",
                location = %location,
                error = %source,
                "memory snapshot write failed"
            );
            self.write_failed.store(true, Ordering::SeqCst);
            return Err(StoreError::Write { location, source });
        }

        self.write_failed.store(false, Ordering::SeqCst);
        *current = next;
        Ok(output)
    }

    pub async fn store_conversation(
        &self,
        user_input: &str,
        result: &ExecutionReport,
    ) -> Result<Conversation, StoreError> {
        let conversation = Conversation::new(user_input, result.clone(), Utc::now());
        let limit = self.conversation_limit;
        self.mutate(|snapshot| {
            snapshot.record_conversation(conversation.clone(), limit);
            Ok(conversation)
        })
        .await
    }

    /// Registers `record` under `resource_type` and its id, and under
    /// `context` when one is given.
    pub async fn store_resource(
        &self,
        resource_type: ResourceType,
        record: &ResourceRecord,
        context: Option<&str>,
    ) -> Result<StoredResource, StoreError> {
        let id = record
            .id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .ok_or(StoreError::MissingResourceId(resource_type))?;
        let mut record = record.clone();
        record.resource_type = resource_type;
        let now = Utc::now();

        self.mutate(|snapshot| {
            snapshot.insert_resource(&id, record.clone(), context, now);
            Ok(StoredResource { record, timestamp: now })
        })
        .await
    }

    pub async fn get_resources(
        &self,
        resource_type: ResourceType,
    ) -> BTreeMap<String, StoredResource> {
        self.state.lock().await.resources_of(resource_type)
    }

    pub async fn get_resource(
        &self,
        resource_type: ResourceType,
        id: &str,
    ) -> Option<StoredResource> {
        self.state.lock().await.resource(resource_type, id)
    }

    pub async fn find_resources_by_name(
        &self,
        resource_type: ResourceType,
        needle: &str,
    ) -> Vec<StoredResource> {
        self.state.lock().await.find_by_name(resource_type, needle)
    }

    /// Resources grouped by type for `tag`; empty when the tag is unknown.
    pub async fn get_context_resources(
        &self,
        tag: &str,
    ) -> BTreeMap<String, BTreeMap<String, ResourceRecord>> {
        self.state
            .lock()
            .await
            .contexts
            .get(tag)
            .map(|context| context.resources.clone())
            .unwrap_or_default()
    }

    /// Replaces the context `name` with `data` plus a fresh timestamp.
    pub async fn store_context(
        &self,
        name: &str,
        data: Map<String, Value>,
    ) -> Result<ContextEntry, StoreError> {
        let now = Utc::now();
        self.mutate(|snapshot| {
            snapshot.replace_context(name, data, now).map_err(StoreError::InvalidContext)
        })
        .await
    }

    pub async fn get_recent_conversations(&self, limit: usize) -> Vec<Conversation> {
        self.state.lock().await.conversations.iter().take(limit).cloned().collect()
    }

    pub async fn get_recent_creations(&self, limit: usize) -> Vec<RecentCreation> {
        self.state.lock().await.recent_creations(limit)
    }

    pub async fn clear_memory(&self) -> Result<(), StoreError> {
        self.mutate(|snapshot| {
            *snapshot = MemorySnapshot::default();
            Ok(())
        })
        .await?;
        info!(event_name = "memory.store.cleared", location = %self.location(), "memory cleared");
        Ok(())
    }

    pub async fn snapshot(&self) -> MemorySnapshot {
        self.state.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Map};

    use boardpilot_core::domain::plan::{Operation, ResourceType};
    use boardpilot_core::domain::report::{ExecutionReport, ResourceRecord};

    use super::{MemoryStore, StoreError};
    use crate::backend::InMemoryBackend;

    fn item(id: &str, name: &str) -> ResourceRecord {
        ResourceRecord::new(ResourceType::Item, Operation::Create).with_id(id).with_name(name)
    }

    #[tokio::test]
    async fn fresh_store_writes_initial_snapshot() {
        let backend = Arc::new(InMemoryBackend::new());
        let _store = MemoryStore::open(backend.clone(), 100).await;

        assert_eq!(backend.save_count(), 1);
        assert!(backend.stored().await.is_some());
    }

    #[tokio::test]
    async fn record_without_id_is_rejected() {
        let store = MemoryStore::in_memory().await;
        let record = ResourceRecord::new(ResourceType::Board, Operation::Create).with_name("x");

        let result = store.store_resource(ResourceType::Board, &record, None).await;
        assert!(matches!(result, Err(StoreError::MissingResourceId(ResourceType::Board))));
        assert!(store.get_resources(ResourceType::Board).await.is_empty());
    }

    #[tokio::test]
    async fn stored_resource_is_visible_by_id_context_and_name() {
        let store = MemoryStore::in_memory().await;
        let record = item("501", "Write launch brief");

        let stored = store
            .store_resource(ResourceType::Item, &record, Some("request_1"))
            .await
            .expect("store resource");
        assert_eq!(stored.record, record);

        let fetched = store.get_resource(ResourceType::Item, "501").await.expect("fetched");
        assert_eq!(fetched.record, record);
        assert_eq!(fetched.timestamp, stored.timestamp);

        let context = store.get_context_resources("request_1").await;
        assert_eq!(context.get("item").and_then(|items| items.get("501")), Some(&record));
        assert!(store.get_context_resources("request_2").await.is_empty());

        assert_eq!(store.find_resources_by_name(ResourceType::Item, "LAUNCH").await.len(), 1);
    }

    #[tokio::test]
    async fn failed_write_leaves_state_untouched() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = MemoryStore::open(backend.clone(), 100).await;
        backend.reject_writes(true);

        let result = store.store_conversation("make a board", &ExecutionReport::default()).await;
        assert!(matches!(result, Err(StoreError::Write { .. })));
        assert!(store.get_recent_conversations(10).await.is_empty());
        assert!(!store.is_persisting());

        backend.reject_writes(false);
        store.store_conversation("make a board", &ExecutionReport::default()).await.expect("store");
        assert_eq!(store.get_recent_conversations(10).await.len(), 1);
        assert!(store.is_persisting());
    }

    #[tokio::test]
    async fn conversation_count_tracks_the_bounded_history() {
        let store = MemoryStore::open(Arc::new(InMemoryBackend::new()), 2).await;
        assert_eq!(store.conversation_count().await, 0);

        for request in ["first", "second", "third"] {
            store.store_conversation(request, &ExecutionReport::default()).await.expect("store");
        }
        assert_eq!(store.conversation_count().await, 2);
    }

    #[tokio::test]
    async fn unwritable_backend_at_open_is_not_persisting() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.reject_writes(true);
        let store = MemoryStore::open(backend, 100).await;

        assert!(!store.is_persisting());
        assert_eq!(store.conversation_count().await, 0);
    }

    #[tokio::test]
    async fn store_context_replaces_previous_data() {
        let store = MemoryStore::in_memory().await;
        let mut first = Map::new();
        first.insert("topic".to_string(), json!("hiring"));
        let mut second = Map::new();
        second.insert("owner".to_string(), json!("ops"));

        store.store_context("team", first).await.expect("first");
        let entry = store.store_context("team", second).await.expect("second");

        assert!(entry.data.get("topic").is_none());
        assert_eq!(entry.data.get("owner"), Some(&json!("ops")));
    }

    #[tokio::test]
    async fn clear_memory_empties_everything() {
        let store = MemoryStore::in_memory().await;
        store.store_conversation("hello", &ExecutionReport::default()).await.expect("store");
        store.store_resource(ResourceType::Item, &item("1", "a"), Some("ctx")).await.expect("store");

        store.clear_memory().await.expect("clear");

        let snapshot = store.snapshot().await;
        assert!(snapshot.conversations.is_empty());
        assert!(snapshot.resources.is_empty());
        assert!(snapshot.contexts.is_empty());
    }
}
