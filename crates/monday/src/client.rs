use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use boardpilot_core::config::MondayConfig;
use boardpilot_core::domain::plan::DEFAULT_BOARD_KIND;
use boardpilot_core::workspace::{
    Account, ApiError, Board, CreatedBoard, CreatedColumn, CreatedGroup, CreatedItem,
    CreatedWebhook, ResourceApi, UpdatedItem, Workspace,
};

use crate::queries;

pub const DEFAULT_BOARD_LIMIT: u32 = 100;
const ERROR_BODY_LIMIT: usize = 512;

/// Reply shape read before `data` is typed, so that `errors` win over a
/// `data` object whose fields came back null.
#[derive(Debug, Deserialize)]
struct GraphqlEnvelope {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Option<Vec<GraphqlError>>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct BoardsData {
    boards: Vec<Board>,
}

#[derive(Debug, Deserialize)]
struct WorkspacesData {
    workspaces: Vec<Workspace>,
}

#[derive(Debug, Deserialize)]
struct MeData {
    me: Account,
}

#[derive(Debug, Deserialize)]
struct CreateWebhookData {
    create_webhook: CreatedWebhook,
}

#[derive(Debug, Deserialize)]
struct CreateBoardData {
    create_board: CreatedBoard,
}

#[derive(Debug, Deserialize)]
struct CreateColumnData {
    create_column: CreatedColumn,
}

#[derive(Debug, Deserialize)]
struct CreateGroupData {
    create_group: CreatedGroup,
}

#[derive(Debug, Deserialize)]
struct CreateItemData {
    create_item: CreatedItem,
}

#[derive(Debug, Deserialize)]
struct UpdateItemData {
    change_multiple_column_values: UpdatedItem,
}

/// monday.com GraphQL v2 client. Board and workspace listings are cached
/// until a board or column is created, or [`MondayClient::clear_cache`] runs.
pub struct MondayClient {
    http: Client,
    api_url: String,
    api_key: SecretString,
    board_limit: u32,
    boards: RwLock<Option<Vec<Board>>>,
    workspaces: RwLock<Option<Vec<Workspace>>>,
}

impl MondayClient {
    pub fn new(
        api_url: impl Into<String>,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| ApiError::Transport(error.to_string()))?;

        Ok(Self {
            http,
            api_url: api_url.into(),
            api_key,
            board_limit: DEFAULT_BOARD_LIMIT,
            boards: RwLock::new(None),
            workspaces: RwLock::new(None),
        })
    }

    pub fn from_config(config: &MondayConfig) -> Result<Self, ApiError> {
        Self::new(
            config.api_url.clone(),
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn with_board_limit(mut self, limit: u32) -> Self {
        self.board_limit = limit.max(1);
        self
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub async fn clear_cache(&self) {
        *self.boards.write().await = None;
        *self.workspaces.write().await = None;
    }

    async fn invalidate_boards(&self) {
        *self.boards.write().await = None;
    }

    async fn query<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        document: &str,
        variables: Value,
    ) -> Result<T, ApiError> {
        debug!(event_name = "monday.request.start", operation, "sending GraphQL request");

        let response = self
            .http
            .post(&self.api_url)
            .header("Authorization", self.api_key.expose_secret())
            .json(&json!({ "query": document, "variables": variables }))
            .send()
            .await
            .map_err(|error| {
                warn!(
                    event_name = "monday.request.failed",
                    operation,
                    error = %error,
                    "GraphQL request could not be sent"
                );
                ApiError::Transport(error.to_string())
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| ApiError::Transport(error.to_string()))?;
        let envelope = match serde_json::from_str::<GraphqlEnvelope>(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => return Err(http_error(status.as_u16(), &body)),
            Err(error) => return Err(ApiError::Decode(format!("{operation}: {error}"))),
        };

        if let Some(error) = envelope.errors.into_iter().flatten().next() {
            warn!(
                event_name = "monday.request.graphql_error",
                operation,
                message = %error.message,
                "GraphQL request returned errors"
            );
            return Err(ApiError::Remote(error.message));
        }
        if let Some(message) = envelope.error_message {
            return Err(ApiError::Remote(message));
        }
        if !status.is_success() {
            return Err(http_error(status.as_u16(), &body));
        }

        let data = envelope
            .data
            .filter(|data| !data.is_null())
            .ok_or_else(|| ApiError::Decode(format!("{operation} response carried no data")))?;
        serde_json::from_value(data).map_err(|error| ApiError::Decode(format!("{operation}: {error}")))
    }

    async fn create_board_with(
        &self,
        name: &str,
        board_kind: &str,
        workspace_id: Option<&str>,
        template_id: Option<&str>,
    ) -> Result<CreatedBoard, ApiError> {
        let mut variables = Map::new();
        variables.insert("boardName".to_string(), json!(name));
        variables.insert("boardKind".to_string(), json!(board_kind));
        variables.insert("workspaceId".to_string(), json!(workspace_id));
        if let Some(template_id) = template_id {
            variables.insert("templateId".to_string(), json!(template_id));
        }

        let data: CreateBoardData =
            self.query("create_board", queries::CREATE_BOARD, Value::Object(variables)).await?;
        self.invalidate_boards().await;
        Ok(data.create_board)
    }
}

fn http_error(status: u16, body: &str) -> ApiError {
    let body = body.chars().take(ERROR_BODY_LIMIT).collect();
    ApiError::Http { status, body }
}

#[async_trait]
impl ResourceApi for MondayClient {
    async fn get_boards(&self) -> Result<Vec<Board>, ApiError> {
        if let Some(cached) = self.boards.read().await.as_ref() {
            return Ok(cached.clone());
        }

        let data: BoardsData =
            self.query("get_boards", queries::BOARDS, json!({ "limit": self.board_limit })).await?;
        *self.boards.write().await = Some(data.boards.clone());
        Ok(data.boards)
    }

    async fn get_board(&self, board_id: &str) -> Result<Board, ApiError> {
        let data: BoardsData =
            self.query("get_board", queries::BOARD_BY_ID, json!({ "ids": [board_id] })).await?;
        data.boards
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::NotFound { resource: "board", id: board_id.to_string() })
    }

    async fn get_workspaces(&self) -> Result<Vec<Workspace>, ApiError> {
        if let Some(cached) = self.workspaces.read().await.as_ref() {
            return Ok(cached.clone());
        }

        let data: WorkspacesData =
            self.query("get_workspaces", queries::WORKSPACES, json!({})).await?;
        *self.workspaces.write().await = Some(data.workspaces.clone());
        Ok(data.workspaces)
    }

    async fn get_me(&self) -> Result<Account, ApiError> {
        let data: MeData = self.query("get_me", queries::ME, json!({})).await?;
        Ok(data.me)
    }

    async fn get_board_templates(&self) -> Result<Vec<Board>, ApiError> {
        let data: BoardsData =
            self.query("get_board_templates", queries::BOARD_TEMPLATES, json!({})).await?;
        Ok(data.boards)
    }

    async fn create_board(
        &self,
        name: &str,
        board_kind: &str,
        workspace_id: Option<&str>,
    ) -> Result<CreatedBoard, ApiError> {
        self.create_board_with(name, board_kind, workspace_id, None).await
    }

    async fn create_board_from_template(
        &self,
        name: &str,
        template_id: &str,
        workspace_id: Option<&str>,
    ) -> Result<CreatedBoard, ApiError> {
        self.create_board_with(name, DEFAULT_BOARD_KIND, workspace_id, Some(template_id)).await
    }

    async fn create_column(
        &self,
        board_id: &str,
        title: &str,
        column_type: &str,
    ) -> Result<CreatedColumn, ApiError> {
        let data: CreateColumnData = self
            .query(
                "create_column",
                queries::CREATE_COLUMN,
                json!({ "boardId": board_id, "title": title, "columnType": column_type }),
            )
            .await?;
        self.invalidate_boards().await;
        Ok(data.create_column)
    }

    async fn create_group(
        &self,
        board_id: &str,
        group_name: &str,
    ) -> Result<CreatedGroup, ApiError> {
        let data: CreateGroupData = self
            .query(
                "create_group",
                queries::CREATE_GROUP,
                json!({ "boardId": board_id, "groupName": group_name }),
            )
            .await?;
        Ok(data.create_group)
    }

    async fn create_item(
        &self,
        board_id: &str,
        item_name: &str,
        group_id: Option<&str>,
        column_values: &Map<String, Value>,
    ) -> Result<CreatedItem, ApiError> {
        let data: CreateItemData = self
            .query(
                "create_item",
                queries::CREATE_ITEM,
                json!({
                    "boardId": board_id,
                    "itemName": item_name,
                    "groupId": group_id,
                    "columnValues": Value::Object(column_values.clone()).to_string(),
                }),
            )
            .await?;
        Ok(data.create_item)
    }

    async fn update_item(
        &self,
        item_id: &str,
        board_id: &str,
        column_values: &Map<String, Value>,
    ) -> Result<UpdatedItem, ApiError> {
        let data: UpdateItemData = self
            .query(
                "update_item",
                queries::UPDATE_ITEM,
                json!({
                    "itemId": item_id,
                    "boardId": board_id,
                    "columnValues": Value::Object(column_values.clone()).to_string(),
                }),
            )
            .await?;
        Ok(data.change_multiple_column_values)
    }

    async fn create_webhook(
        &self,
        board_id: &str,
        url: &str,
        event: &str,
        config: &Map<String, Value>,
    ) -> Result<CreatedWebhook, ApiError> {
        let data: CreateWebhookData = self
            .query(
                "create_webhook",
                queries::CREATE_WEBHOOK,
                json!({
                    "boardId": board_id,
                    "url": url,
                    "event": event,
                    "config": Value::Object(config.clone()).to_string(),
                }),
            )
            .await?;
        Ok(data.create_webhook)
    }
}

#[cfg(test)]
mod tests {
    use super::http_error;
    use boardpilot_core::workspace::ApiError;

    #[test]
    fn http_error_body_is_truncated() {
        let body = "x".repeat(2_000);
        let ApiError::Http { status, body } = http_error(502, &body) else {
            panic!("expected http error");
        };
        assert_eq!(status, 502);
        assert_eq!(body.len(), 512);
    }
}
