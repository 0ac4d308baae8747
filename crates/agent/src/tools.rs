use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use boardpilot_core::domain::column::format_column_value;
use boardpilot_core::domain::ids::{deserialize_id, deserialize_opt_id};
use boardpilot_core::domain::plan::{Operation, ResourceType, DEFAULT_BOARD_KIND, DEFAULT_COLUMN_TYPE};
use boardpilot_core::domain::report::ResourceRecord;
use boardpilot_core::workspace::ResourceApi;

use crate::llm::ToolDefinition;

/// What a tool hands back: the observation shown to the model, plus a
/// record when the tool changed the workspace.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolOutput {
    pub observation: String,
    pub record: Option<ResourceRecord>,
}

impl ToolOutput {
    fn observe(observation: impl Into<String>) -> Self {
        Self { observation: observation.into(), record: None }
    }

    fn json<T: serde::Serialize>(value: &T) -> Result<Self> {
        Ok(Self::observe(serde_json::to_string(value)?))
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Tools that change remote state. A run that has called one of these
    /// must not be replayed through another path.
    fn mutates(&self) -> bool {
        false
    }

    async fn execute(&self, input: &str) -> Result<ToolOutput>;
}

fn parse_input<T: DeserializeOwned>(tool: &str, input: &str) -> Result<T> {
    serde_json::from_str(input.trim())
        .with_context(|| format!("{tool} expects a JSON object input, got `{input}`"))
}

pub struct GetBoardsTool {
    api: Arc<dyn ResourceApi>,
}

#[async_trait]
impl Tool for GetBoardsTool {
    fn name(&self) -> &'static str {
        "GetBoards"
    }

    fn description(&self) -> &'static str {
        "Get a list of boards from monday.com"
    }

    async fn execute(&self, _input: &str) -> Result<ToolOutput> {
        let boards = self.api.get_boards().await?;
        ToolOutput::json(&boards)
    }
}

pub struct GetBoardTool {
    api: Arc<dyn ResourceApi>,
}

#[async_trait]
impl Tool for GetBoardTool {
    fn name(&self) -> &'static str {
        "GetBoard"
    }

    fn description(&self) -> &'static str {
        "Get a specific board by ID. Input should be the board ID."
    }

    async fn execute(&self, input: &str) -> Result<ToolOutput> {
        let board_id = input.trim().trim_matches('"').trim();
        if board_id.is_empty() {
            return Err(anyhow!("GetBoard needs a board id"));
        }
        let board = self.api.get_board(board_id).await?;
        ToolOutput::json(&board)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBoardInput {
    name: String,
    #[serde(default)]
    board_kind: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    workspace_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    template_id: Option<String>,
}

pub struct CreateBoardTool {
    api: Arc<dyn ResourceApi>,
}

#[async_trait]
impl Tool for CreateBoardTool {
    fn name(&self) -> &'static str {
        "CreateBoard"
    }

    fn description(&self) -> &'static str {
        "Create a new board. Input should be a JSON string with name, boardKind, and optionally workspaceId and templateId."
    }

    fn mutates(&self) -> bool {
        true
    }

    async fn execute(&self, input: &str) -> Result<ToolOutput> {
        let params: CreateBoardInput = parse_input(self.name(), input)?;
        let workspace_id = params.workspace_id.as_deref();
        let created = match params.template_id.as_deref() {
            Some(template_id) => {
                self.api.create_board_from_template(&params.name, template_id, workspace_id).await?
            }
            None => {
                let board_kind = params.board_kind.as_deref().unwrap_or(DEFAULT_BOARD_KIND);
                self.api.create_board(&params.name, board_kind, workspace_id).await?
            }
        };

        let record = ResourceRecord::new(ResourceType::Board, Operation::Create)
            .with_id(created.id.clone())
            .with_name(created.name.clone());
        Ok(ToolOutput { observation: serde_json::to_string(&created)?, record: Some(record) })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateColumnInput {
    #[serde(deserialize_with = "deserialize_id")]
    board_id: String,
    title: String,
    #[serde(default)]
    column_type: Option<String>,
}

pub struct CreateColumnTool {
    api: Arc<dyn ResourceApi>,
}

#[async_trait]
impl Tool for CreateColumnTool {
    fn name(&self) -> &'static str {
        "CreateColumn"
    }

    fn description(&self) -> &'static str {
        "Create a new column in a board. Input should be a JSON string with boardId, title, and columnType."
    }

    fn mutates(&self) -> bool {
        true
    }

    async fn execute(&self, input: &str) -> Result<ToolOutput> {
        let params: CreateColumnInput = parse_input(self.name(), input)?;
        let column_type = params.column_type.as_deref().unwrap_or(DEFAULT_COLUMN_TYPE);
        let created = self.api.create_column(&params.board_id, &params.title, column_type).await?;

        let record = ResourceRecord::new(ResourceType::Column, Operation::Create)
            .with_id(created.id.clone())
            .with_title(created.title.clone())
            .with_board_id(params.board_id);
        Ok(ToolOutput { observation: serde_json::to_string(&created)?, record: Some(record) })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateGroupInput {
    #[serde(deserialize_with = "deserialize_id")]
    board_id: String,
    group_name: String,
}

pub struct CreateGroupTool {
    api: Arc<dyn ResourceApi>,
}

#[async_trait]
impl Tool for CreateGroupTool {
    fn name(&self) -> &'static str {
        "CreateGroup"
    }

    fn description(&self) -> &'static str {
        "Create a new group in a board. Input should be a JSON string with boardId and groupName."
    }

    fn mutates(&self) -> bool {
        true
    }

    async fn execute(&self, input: &str) -> Result<ToolOutput> {
        let params: CreateGroupInput = parse_input(self.name(), input)?;
        let created = self.api.create_group(&params.board_id, &params.group_name).await?;

        let record = ResourceRecord::new(ResourceType::Group, Operation::Create)
            .with_id(created.id.clone())
            .with_title(created.title.clone())
            .with_board_id(params.board_id);
        Ok(ToolOutput { observation: serde_json::to_string(&created)?, record: Some(record) })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateItemInput {
    #[serde(deserialize_with = "deserialize_id")]
    board_id: String,
    item_name: String,
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    group_id: Option<String>,
    #[serde(default)]
    column_values: Option<Map<String, Value>>,
}

pub struct CreateItemTool {
    api: Arc<dyn ResourceApi>,
}

#[async_trait]
impl Tool for CreateItemTool {
    fn name(&self) -> &'static str {
        "CreateItem"
    }

    fn description(&self) -> &'static str {
        "Create a new item in a board or group. Input should be a JSON string with boardId, itemName, optionally groupId, and optionally columnValues."
    }

    fn mutates(&self) -> bool {
        true
    }

    async fn execute(&self, input: &str) -> Result<ToolOutput> {
        let params: CreateItemInput = parse_input(self.name(), input)?;
        let column_values = params.column_values.unwrap_or_default();
        let created = self
            .api
            .create_item(&params.board_id, &params.item_name, params.group_id.as_deref(), &column_values)
            .await?;

        let record = ResourceRecord::new(ResourceType::Item, Operation::Create)
            .with_id(created.id.clone())
            .with_name(created.name.clone())
            .with_board_id(params.board_id);
        Ok(ToolOutput { observation: serde_json::to_string(&created)?, record: Some(record) })
    }
}

#[derive(Debug, Deserialize)]
struct FormatColumnValueInput {
    #[serde(rename = "type")]
    column_type: String,
    value: Value,
}

pub struct FormatColumnValueTool;

#[async_trait]
impl Tool for FormatColumnValueTool {
    fn name(&self) -> &'static str {
        "FormatColumnValue"
    }

    fn description(&self) -> &'static str {
        "Format a column value for a specific column type. Input should be a JSON string with type and value."
    }

    async fn execute(&self, input: &str) -> Result<ToolOutput> {
        let params: FormatColumnValueInput = parse_input(self.name(), input)?;
        let formatted = format_column_value(&params.column_type, &params.value)?;
        Ok(ToolOutput::observe(formatted))
    }
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    /// The seven workspace primitives exposed to the autonomous executor.
    pub fn standard(api: Arc<dyn ResourceApi>) -> Self {
        let mut registry = Self::default();
        registry.register(GetBoardsTool { api: Arc::clone(&api) });
        registry.register(GetBoardTool { api: Arc::clone(&api) });
        registry.register(CreateBoardTool { api: Arc::clone(&api) });
        registry.register(CreateColumnTool { api: Arc::clone(&api) });
        registry.register(CreateGroupTool { api: Arc::clone(&api) });
        registry.register(CreateItemTool { api });
        registry.register(FormatColumnValueTool);
        registry
    }

    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Box::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|tool| tool.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Function definitions in name order; every tool takes one string.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.names()
            .into_iter()
            .filter_map(|name| self.get(name))
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "input": { "type": "string", "description": tool.description() }
                    },
                    "required": ["input"]
                }),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use boardpilot_core::domain::plan::ResourceType;
    use boardpilot_core::workspace::{InMemoryWorkspace, ResourceApi, WorkspaceOp};

    use super::ToolRegistry;

    #[tokio::test]
    async fn standard_registry_exposes_seven_primitives() {
        let registry = ToolRegistry::standard(Arc::new(InMemoryWorkspace::new()));

        assert_eq!(registry.len(), 7);
        assert_eq!(
            registry.names(),
            vec![
                "CreateBoard",
                "CreateColumn",
                "CreateGroup",
                "CreateItem",
                "FormatColumnValue",
                "GetBoard",
                "GetBoards"
            ]
        );
        let mutating: Vec<&str> = registry
            .names()
            .into_iter()
            .filter(|name| registry.get(name).map(|tool| tool.mutates()).unwrap_or(false))
            .collect();
        assert_eq!(mutating, vec!["CreateBoard", "CreateColumn", "CreateGroup", "CreateItem"]);
    }

    #[tokio::test]
    async fn create_board_tool_defaults_kind_and_returns_record() {
        let workspace = Arc::new(InMemoryWorkspace::new());
        let registry = ToolRegistry::standard(workspace.clone());
        let tool = registry.get("CreateBoard").expect("tool");

        let output = tool.execute(r#"{"name":"Sprint 12","workspaceId":42}"#).await.expect("run");
        let record = output.record.expect("record");
        assert_eq!(record.resource_type, ResourceType::Board);
        assert_eq!(record.name.as_deref(), Some("Sprint 12"));

        let board = workspace.board(record.id.as_deref().unwrap_or_default()).expect("stored");
        assert_eq!(board.board_kind.as_deref(), Some("public"));
        assert_eq!(board.workspace_id.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn create_board_tool_uses_template_when_given() {
        let workspace =
            Arc::new(InMemoryWorkspace::new().with_template("77", "Sprint template", &[("Status", "status")]));
        let registry = ToolRegistry::standard(workspace.clone());
        let tool = registry.get("CreateBoard").expect("tool");

        let output = tool.execute(r#"{"name":"Sprint 13","templateId":77}"#).await.expect("run");
        let record = output.record.expect("record");

        let board = workspace.board(record.id.as_deref().unwrap_or_default()).expect("stored");
        assert_eq!(board.name, "Sprint 13");
        assert_eq!(board.columns.len(), 1);
        assert_eq!(board.columns[0].title, "Status");

        let missing = tool.execute(r#"{"name":"Sprint 14","templateId":"404"}"#).await;
        assert!(missing.is_err());
    }

    #[tokio::test]
    async fn get_board_accepts_raw_or_quoted_id() {
        let workspace = Arc::new(InMemoryWorkspace::new());
        let board = workspace.create_board("Ops", "public", None).await.expect("board");
        let registry = ToolRegistry::standard(workspace.clone());
        let tool = registry.get("GetBoard").expect("tool");

        let raw = tool.execute(&board.id).await.expect("raw id");
        let quoted = tool.execute(&format!("\"{}\"", board.id)).await.expect("quoted id");
        assert_eq!(raw.observation, quoted.observation);
        assert!(raw.record.is_none());
        assert_eq!(workspace.count(WorkspaceOp::GetBoard), 2);
    }

    #[tokio::test]
    async fn malformed_input_is_an_error_not_a_call() {
        let workspace = Arc::new(InMemoryWorkspace::new());
        let registry = ToolRegistry::standard(workspace.clone());

        let error = registry
            .get("CreateItem")
            .expect("tool")
            .execute("item please")
            .await
            .expect_err("should reject");
        assert!(error.to_string().contains("CreateItem expects a JSON object input"));
        assert_eq!(workspace.count(WorkspaceOp::CreateItem), 0);
    }

    #[tokio::test]
    async fn format_column_value_tool_encodes_status() {
        let registry = ToolRegistry::standard(Arc::new(InMemoryWorkspace::new()));
        let output = registry
            .get("FormatColumnValue")
            .expect("tool")
            .execute(r#"{"type":"status","value":"3"}"#)
            .await
            .expect("format");
        assert_eq!(output.observation, r#"{"index":3}"#);
    }

    #[test]
    fn definitions_wrap_a_single_string_input() {
        let registry = ToolRegistry::standard(Arc::new(InMemoryWorkspace::new()));
        let definitions = registry.definitions();

        assert_eq!(definitions.len(), 7);
        assert_eq!(definitions[0].name, "CreateBoard");
        assert_eq!(definitions[0].parameters["required"][0], "input");
    }
}
