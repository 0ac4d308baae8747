use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::plan::ResourceType;
use crate::domain::report::{ExecutionReport, ResourceRecord};

pub const DEFAULT_CONVERSATION_LIMIT: usize = 100;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub timestamp: DateTime<Utc>,
    pub user_input: String,
    pub result: ExecutionReport,
    pub success: bool,
}

impl Conversation {
    pub fn new(user_input: impl Into<String>, result: ExecutionReport, timestamp: DateTime<Utc>) -> Self {
        let success = result.success;
        Self { timestamp, user_input: user_input.into(), result, success }
    }
}

/// A registry entry: the record as reported plus the time it was stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredResource {
    #[serde(flatten)]
    pub record: ResourceRecord,
    pub timestamp: DateTime<Utc>,
}

/// Resources grouped under one context tag, plus any caller-supplied fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    #[serde(default)]
    pub resources: BTreeMap<String, BTreeMap<String, ResourceRecord>>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl ContextEntry {
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self { resources: BTreeMap::new(), timestamp, data: Map::new() }
    }

    pub fn contains(&self, resource_type: ResourceType, id: &str) -> bool {
        self.resources
            .get(resource_type.as_str())
            .map(|by_id| by_id.contains_key(id))
            .unwrap_or(false)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentCreation {
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub user_input: String,
}

/// The whole persisted memory document. Top-level keys this version does not
/// know are carried in `extra` and written back untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    #[serde(default)]
    pub conversations: Vec<Conversation>,
    #[serde(default)]
    pub resources: BTreeMap<String, BTreeMap<String, StoredResource>>,
    #[serde(default)]
    pub contexts: BTreeMap<String, ContextEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MemorySnapshot {
    /// Prepends `conversation`, evicting the oldest entries beyond `limit`.
    pub fn record_conversation(&mut self, conversation: Conversation, limit: usize) {
        self.conversations.insert(0, conversation);
        self.conversations.truncate(limit.max(1));
    }

    pub fn insert_resource(
        &mut self,
        id: &str,
        record: ResourceRecord,
        context: Option<&str>,
        now: DateTime<Utc>,
    ) {
        let type_key = record.resource_type.as_str().to_string();

        if let Some(tag) = context {
            let entry =
                self.contexts.entry(tag.to_string()).or_insert_with(|| ContextEntry::empty(now));
            entry
                .resources
                .entry(type_key.clone())
                .or_default()
                .insert(id.to_string(), record.clone());
        }

        self.resources
            .entry(type_key)
            .or_default()
            .insert(id.to_string(), StoredResource { record, timestamp: now });
    }

    pub fn resources_of(&self, resource_type: ResourceType) -> BTreeMap<String, StoredResource> {
        self.resources.get(resource_type.as_str()).cloned().unwrap_or_default()
    }

    pub fn resource(&self, resource_type: ResourceType, id: &str) -> Option<StoredResource> {
        self.resources.get(resource_type.as_str()).and_then(|by_id| by_id.get(id)).cloned()
    }

    /// Case-insensitive substring match over each record's name (or title).
    pub fn find_by_name(&self, resource_type: ResourceType, needle: &str) -> Vec<StoredResource> {
        let needle = needle.to_lowercase();
        self.resources
            .get(resource_type.as_str())
            .into_iter()
            .flat_map(|by_id| by_id.values())
            .filter(|stored| {
                stored.record.label().unwrap_or_default().to_lowercase().contains(&needle)
            })
            .cloned()
            .collect()
    }

    pub fn replace_context(
        &mut self,
        name: &str,
        data: Map<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<ContextEntry, serde_json::Error> {
        let mut fields = data;
        fields.insert("timestamp".to_string(), serde_json::to_value(now)?);
        let entry: ContextEntry = serde_json::from_value(Value::Object(fields))?;
        self.contexts.insert(name.to_string(), entry.clone());
        Ok(entry)
    }

    /// Newest-first projection of created resources from successful
    /// conversations. Stops as soon as `limit` entries are collected, which
    /// can cut a conversation's details short.
    pub fn recent_creations(&self, limit: usize) -> Vec<RecentCreation> {
        let mut creations = Vec::new();
        if limit == 0 {
            return creations;
        }

        for conversation in self.conversations.iter().filter(|conversation| conversation.success) {
            for detail in conversation.result.details.iter().filter(|detail| detail.is_creation()) {
                creations.push(RecentCreation {
                    resource_type: detail.resource_type,
                    id: detail.id.clone(),
                    name: detail.label().map(str::to_string),
                    timestamp: conversation.timestamp,
                    user_input: conversation.user_input.clone(),
                });
                if creations.len() >= limit {
                    return creations;
                }
            }
        }

        creations
    }
}
