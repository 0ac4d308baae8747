//! The remote workspace resource model and the capability that mutates it.
//!
//! [`ResourceApi`] is implemented over the wire by `boardpilot-monday` and in
//! process by [`memory::InMemoryWorkspace`].

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::ids::{deserialize_id, deserialize_opt_id};

pub use memory::{InMemoryWorkspace, WorkspaceCall, WorkspaceOp};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("workspace request failed: {0}")]
    Transport(String),
    #[error("workspace API returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("GraphQL Error: {0}")]
    Remote(String),
    #[error("could not decode workspace response: {0}")]
    Decode(String),
    #[error("{resource} `{id}` was not found")]
    NotFound { resource: &'static str, id: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub title: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub column_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings_str: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRef {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub title: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnValue {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemInfo {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupRef>,
    #[serde(default)]
    pub column_values: Vec<ColumnValue>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub board_kind: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub board_folder_id: Option<String>,
    #[serde(default)]
    pub items_count: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub workspace_id: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnInfo>,
    #[serde(default)]
    pub groups: Vec<GroupInfo>,
    #[serde(default)]
    pub items: Vec<ItemInfo>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedBoard {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub board_kind: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedColumn {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub title: String,
    #[serde(rename = "type", default)]
    pub column_type: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedGroup {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub title: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedItem {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatedItem {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub column_values: Vec<ColumnValue>,
}

/// The account the API key belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedWebhook {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(deserialize_with = "deserialize_id")]
    pub board_id: String,
}

/// One logical workspace operation per call. Implementations own transport,
/// retries and timeouts; callers see a typed payload or an [`ApiError`].
#[async_trait]
pub trait ResourceApi: Send + Sync {
    async fn get_boards(&self) -> Result<Vec<Board>, ApiError>;

    async fn get_board(&self, board_id: &str) -> Result<Board, ApiError>;

    async fn get_workspaces(&self) -> Result<Vec<Workspace>, ApiError>;

    async fn get_me(&self) -> Result<Account, ApiError>;

    /// Boards saved as templates; their ids feed
    /// [`ResourceApi::create_board_from_template`].
    async fn get_board_templates(&self) -> Result<Vec<Board>, ApiError>;

    async fn create_board(
        &self,
        name: &str,
        board_kind: &str,
        workspace_id: Option<&str>,
    ) -> Result<CreatedBoard, ApiError>;

    async fn create_board_from_template(
        &self,
        name: &str,
        template_id: &str,
        workspace_id: Option<&str>,
    ) -> Result<CreatedBoard, ApiError>;

    async fn create_column(
        &self,
        board_id: &str,
        title: &str,
        column_type: &str,
    ) -> Result<CreatedColumn, ApiError>;

    async fn create_group(&self, board_id: &str, group_name: &str)
        -> Result<CreatedGroup, ApiError>;

    async fn create_item(
        &self,
        board_id: &str,
        item_name: &str,
        group_id: Option<&str>,
        column_values: &Map<String, Value>,
    ) -> Result<CreatedItem, ApiError>;

    async fn update_item(
        &self,
        item_id: &str,
        board_id: &str,
        column_values: &Map<String, Value>,
    ) -> Result<UpdatedItem, ApiError>;

    /// Registers `url` to receive `event` notifications for a board.
    async fn create_webhook(
        &self,
        board_id: &str,
        url: &str,
        event: &str,
        config: &Map<String, Value>,
    ) -> Result<CreatedWebhook, ApiError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::Board;

    #[test]
    fn board_payload_decodes_with_numeric_workspace_id() {
        let board: Board = serde_json::from_value(json!({
            "id": "3201",
            "name": "Launch Plan",
            "board_kind": "public",
            "items_count": 2,
            "workspace_id": 551,
            "columns": [{ "id": "status", "title": "Status", "type": "status", "settings_str": "{}" }],
            "groups": [{ "id": "topics", "title": "Group Title", "color": "#579bfc", "position": "65536" }],
            "items": [{
                "id": "77",
                "name": "Kickoff",
                "group": { "id": "topics", "title": "Group Title" },
                "column_values": [{ "id": "status", "text": "Done", "type": "status", "value": "{\"index\":1}" }]
            }]
        }))
        .expect("board should decode");

        assert_eq!(board.workspace_id.as_deref(), Some("551"));
        assert_eq!(board.columns[0].column_type.as_deref(), Some("status"));
        assert_eq!(board.items[0].group.as_ref().map(|group| group.id.as_str()), Some("topics"));
    }
}
