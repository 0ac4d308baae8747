use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::plan::DEFAULT_BOARD_KIND;
use crate::workspace::{
    Account, ApiError, Board, ColumnInfo, ColumnValue, CreatedBoard, CreatedColumn, CreatedGroup,
    CreatedItem, CreatedWebhook, GroupInfo, GroupRef, ItemInfo, ResourceApi, UpdatedItem,
    Workspace,
};

const FIRST_BOARD_ID: u64 = 1_000;
const DEFAULT_GROUP_ID: &str = "topics";
const DEFAULT_GROUP_TITLE: &str = "Group Title";
const SANDBOX_ACCOUNT_ID: &str = "1";
const SANDBOX_ACCOUNT_NAME: &str = "Sandbox User";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkspaceOp {
    GetBoards,
    GetBoard,
    GetWorkspaces,
    GetMe,
    GetBoardTemplates,
    CreateBoard,
    CreateColumn,
    CreateGroup,
    CreateItem,
    UpdateItem,
    CreateWebhook,
}

/// One call as observed by [`InMemoryWorkspace`]; `subject` is the name,
/// title or id the call was about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkspaceCall {
    pub op: WorkspaceOp,
    pub subject: String,
}

#[derive(Clone, Debug)]
struct Fault {
    op: WorkspaceOp,
    subject: Option<String>,
    error: ApiError,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    boards: BTreeMap<String, Board>,
    templates: BTreeMap<String, Board>,
    workspaces: Vec<Workspace>,
    webhooks: Vec<(CreatedWebhook, String)>,
    calls: Vec<WorkspaceCall>,
    faults: Vec<Fault>,
}

/// Process-local workspace used for offline runs and tests. Behaves like the
/// remote API for the operations the agent issues, and can be told to fail
/// specific calls.
#[derive(Debug, Default)]
pub struct InMemoryWorkspace {
    state: Mutex<State>,
}

impl InMemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workspace(self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.lock().workspaces.push(Workspace {
            id: id.into(),
            name: name.into(),
            kind: Some("open".to_string()),
            description: None,
        });
        self
    }

    /// Adds a template whose columns are copied into boards created from it.
    pub fn with_template(self, id: impl Into<String>, name: impl Into<String>, columns: &[(&str, &str)]) -> Self {
        let id = id.into();
        let mut template = empty_board(id.clone(), name.into(), "template", None);
        for (title, column_type) in columns {
            let column_id = column_id(title, &template.columns);
            template.columns.push(ColumnInfo {
                id: column_id,
                title: title.to_string(),
                column_type: Some(column_type.to_string()),
                settings_str: None,
            });
        }
        self.lock().templates.insert(id, template);
        self
    }

    /// Registered webhooks as `(webhook, event)` pairs.
    pub fn webhooks(&self) -> Vec<(CreatedWebhook, String)> {
        self.lock().webhooks.clone()
    }

    /// Makes every later `op` call fail with `error`. With a `subject`, only
    /// calls about that name, title or id fail.
    pub fn fail_when(&self, op: WorkspaceOp, subject: Option<&str>, error: ApiError) {
        self.lock().faults.push(Fault { op, subject: subject.map(str::to_string), error });
    }

    pub fn calls(&self) -> Vec<WorkspaceCall> {
        self.lock().calls.clone()
    }

    pub fn count(&self, op: WorkspaceOp) -> usize {
        self.lock().calls.iter().filter(|call| call.op == op).count()
    }

    pub fn board(&self, board_id: &str) -> Option<Board> {
        self.lock().boards.get(board_id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin(&self, op: WorkspaceOp, subject: &str) -> Result<std::sync::MutexGuard<'_, State>, ApiError> {
        let mut state = self.lock();
        state.calls.push(WorkspaceCall { op, subject: subject.to_string() });
        let injected = state
            .faults
            .iter()
            .find(|fault| {
                fault.op == op
                    && fault.subject.as_deref().map_or(true, |expected| expected == subject)
            })
            .map(|fault| fault.error.clone());
        match injected {
            Some(error) => Err(error),
            None => Ok(state),
        }
    }
}

impl State {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        FIRST_BOARD_ID + self.next_id
    }

    fn board_mut(&mut self, board_id: &str) -> Result<&mut Board, ApiError> {
        self.boards
            .get_mut(board_id)
            .ok_or_else(|| ApiError::NotFound { resource: "board", id: board_id.to_string() })
    }
}

fn empty_board(id: String, name: String, board_kind: &str, workspace_id: Option<&str>) -> Board {
    Board {
        id,
        name,
        description: None,
        board_kind: Some(board_kind.to_string()),
        board_folder_id: None,
        items_count: Some(0),
        workspace_id: workspace_id.map(str::to_string),
        columns: vec![ColumnInfo {
            id: "name".to_string(),
            title: "Name".to_string(),
            column_type: Some("name".to_string()),
            settings_str: None,
        }],
        groups: vec![GroupInfo {
            id: DEFAULT_GROUP_ID.to_string(),
            title: DEFAULT_GROUP_TITLE.to_string(),
            color: None,
            position: None,
        }],
        items: Vec::new(),
    }
}

fn column_id(title: &str, taken: &[ColumnInfo]) -> String {
    let slug: String = title
        .trim()
        .to_lowercase()
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect();
    let slug = if slug.is_empty() { "column".to_string() } else { slug };
    let mut candidate = slug.clone();
    let mut suffix = 0;
    while taken.iter().any(|column| column.id == candidate) {
        suffix += 1;
        candidate = format!("{slug}_{suffix}");
    }
    candidate
}

fn apply_values(item: &mut ItemInfo, values: &Map<String, Value>) {
    for (column, value) in values {
        let text = match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        let encoded = Some(value.to_string());
        match item.column_values.iter_mut().find(|existing| &existing.id == column) {
            Some(existing) => {
                existing.text = Some(text);
                existing.value = encoded;
            }
            None => item.column_values.push(ColumnValue {
                id: column.clone(),
                text: Some(text),
                value_type: None,
                value: encoded,
            }),
        }
    }
}

#[async_trait]
impl ResourceApi for InMemoryWorkspace {
    async fn get_boards(&self) -> Result<Vec<Board>, ApiError> {
        let state = self.begin(WorkspaceOp::GetBoards, "")?;
        Ok(state.boards.values().cloned().collect())
    }

    async fn get_board(&self, board_id: &str) -> Result<Board, ApiError> {
        let state = self.begin(WorkspaceOp::GetBoard, board_id)?;
        state
            .boards
            .get(board_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound { resource: "board", id: board_id.to_string() })
    }

    async fn get_workspaces(&self) -> Result<Vec<Workspace>, ApiError> {
        let state = self.begin(WorkspaceOp::GetWorkspaces, "")?;
        Ok(state.workspaces.clone())
    }

    async fn get_me(&self) -> Result<Account, ApiError> {
        self.begin(WorkspaceOp::GetMe, "")?;
        Ok(Account {
            id: SANDBOX_ACCOUNT_ID.to_string(),
            name: SANDBOX_ACCOUNT_NAME.to_string(),
            email: None,
        })
    }

    async fn get_board_templates(&self) -> Result<Vec<Board>, ApiError> {
        let state = self.begin(WorkspaceOp::GetBoardTemplates, "")?;
        Ok(state.templates.values().cloned().collect())
    }

    async fn create_board(
        &self,
        name: &str,
        board_kind: &str,
        workspace_id: Option<&str>,
    ) -> Result<CreatedBoard, ApiError> {
        let mut state = self.begin(WorkspaceOp::CreateBoard, name)?;
        let id = state.allocate_id().to_string();
        let board = empty_board(id.clone(), name.to_string(), board_kind, workspace_id);
        state.boards.insert(id.clone(), board);
        Ok(CreatedBoard { id, name: name.to_string(), board_kind: Some(board_kind.to_string()) })
    }

    async fn create_board_from_template(
        &self,
        name: &str,
        template_id: &str,
        workspace_id: Option<&str>,
    ) -> Result<CreatedBoard, ApiError> {
        let mut state = self.begin(WorkspaceOp::CreateBoard, name)?;
        let template = state
            .templates
            .get(template_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound { resource: "template", id: template_id.to_string() })?;
        let id = state.allocate_id().to_string();
        let board = Board {
            id: id.clone(),
            name: name.to_string(),
            board_kind: Some(DEFAULT_BOARD_KIND.to_string()),
            workspace_id: workspace_id.map(str::to_string),
            items: Vec::new(),
            items_count: Some(0),
            ..template
        };
        state.boards.insert(id.clone(), board);
        Ok(CreatedBoard { id, name: name.to_string(), board_kind: Some(DEFAULT_BOARD_KIND.to_string()) })
    }

    async fn create_column(
        &self,
        board_id: &str,
        title: &str,
        column_type: &str,
    ) -> Result<CreatedColumn, ApiError> {
        let mut state = self.begin(WorkspaceOp::CreateColumn, title)?;
        let board = state.board_mut(board_id)?;
        let id = column_id(title, &board.columns);
        board.columns.push(ColumnInfo {
            id: id.clone(),
            title: title.to_string(),
            column_type: Some(column_type.to_string()),
            settings_str: None,
        });
        Ok(CreatedColumn { id, title: title.to_string(), column_type: Some(column_type.to_string()) })
    }

    async fn create_group(
        &self,
        board_id: &str,
        group_name: &str,
    ) -> Result<CreatedGroup, ApiError> {
        let mut state = self.begin(WorkspaceOp::CreateGroup, group_name)?;
        let sequence = state.allocate_id();
        let board = state.board_mut(board_id)?;
        let id = format!("group_{sequence}");
        board.groups.push(GroupInfo {
            id: id.clone(),
            title: group_name.to_string(),
            color: None,
            position: None,
        });
        Ok(CreatedGroup { id, title: group_name.to_string() })
    }

    async fn create_item(
        &self,
        board_id: &str,
        item_name: &str,
        group_id: Option<&str>,
        column_values: &Map<String, Value>,
    ) -> Result<CreatedItem, ApiError> {
        let mut state = self.begin(WorkspaceOp::CreateItem, item_name)?;
        let id = state.allocate_id().to_string();
        let board = state.board_mut(board_id)?;
        let group = match group_id {
            Some(group_id) => board
                .groups
                .iter()
                .find(|group| group.id == group_id)
                .ok_or_else(|| ApiError::NotFound { resource: "group", id: group_id.to_string() })?,
            None => board.groups.first().ok_or_else(|| {
                ApiError::Remote(format!("board {board_id} has no groups to hold items"))
            })?,
        };
        let mut item = ItemInfo {
            id: id.clone(),
            name: item_name.to_string(),
            group: Some(GroupRef { id: group.id.clone(), title: group.title.clone() }),
            column_values: Vec::new(),
        };
        apply_values(&mut item, column_values);
        board.items.push(item);
        board.items_count = Some(board.items.len() as u64);
        Ok(CreatedItem { id, name: item_name.to_string() })
    }

    async fn update_item(
        &self,
        item_id: &str,
        board_id: &str,
        column_values: &Map<String, Value>,
    ) -> Result<UpdatedItem, ApiError> {
        let mut state = self.begin(WorkspaceOp::UpdateItem, item_id)?;
        let board = state.board_mut(board_id)?;
        let item = board
            .items
            .iter_mut()
            .find(|item| item.id == item_id)
            .ok_or_else(|| ApiError::NotFound { resource: "item", id: item_id.to_string() })?;
        apply_values(item, column_values);
        Ok(UpdatedItem {
            id: item.id.clone(),
            name: item.name.clone(),
            column_values: item.column_values.clone(),
        })
    }

    async fn create_webhook(
        &self,
        board_id: &str,
        url: &str,
        event: &str,
        _config: &Map<String, Value>,
    ) -> Result<CreatedWebhook, ApiError> {
        let mut state = self.begin(WorkspaceOp::CreateWebhook, url)?;
        state.board_mut(board_id)?;
        let webhook =
            CreatedWebhook { id: state.allocate_id().to_string(), board_id: board_id.to_string() };
        state.webhooks.push((webhook.clone(), event.to_string()));
        Ok(webhook)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map};

    use super::{InMemoryWorkspace, WorkspaceOp};
    use crate::workspace::{ApiError, ResourceApi};

    #[tokio::test]
    async fn created_board_collects_columns_groups_and_items() {
        let workspace = InMemoryWorkspace::new();
        let board = workspace.create_board("Launch", "public", Some("42")).await.expect("board");
        workspace.create_column(&board.id, "Status", "status").await.expect("column");
        let group = workspace.create_group(&board.id, "Backlog").await.expect("group");

        let mut values = Map::new();
        values.insert("status".to_string(), json!("Working on it"));
        let item = workspace
            .create_item(&board.id, "Kickoff", Some(&group.id), &values)
            .await
            .expect("item");

        let stored = workspace.get_board(&board.id).await.expect("board lookup");
        assert_eq!(stored.workspace_id.as_deref(), Some("42"));
        assert!(stored.columns.iter().any(|column| column.id == "status"));
        assert_eq!(stored.items[0].id, item.id);
        assert_eq!(
            stored.items[0].group.as_ref().map(|group| group.title.as_str()),
            Some("Backlog")
        );
    }

    #[tokio::test]
    async fn duplicate_column_titles_get_distinct_ids() {
        let workspace = InMemoryWorkspace::new();
        let board = workspace.create_board("Dupes", "public", None).await.expect("board");
        let first = workspace.create_column(&board.id, "Due", "date").await.expect("first");
        let second = workspace.create_column(&board.id, "Due", "date").await.expect("second");

        assert_eq!(first.id, "due");
        assert_eq!(second.id, "due_1");
    }

    #[tokio::test]
    async fn injected_fault_hits_only_matching_subject() {
        let workspace = InMemoryWorkspace::new();
        workspace.fail_when(
            WorkspaceOp::CreateColumn,
            Some("Budget"),
            ApiError::Remote("ColumnType is invalid".to_string()),
        );
        let board = workspace.create_board("Finance", "public", None).await.expect("board");

        let failed = workspace.create_column(&board.id, "Budget", "money").await;
        assert_eq!(failed, Err(ApiError::Remote("ColumnType is invalid".to_string())));
        assert!(workspace.create_column(&board.id, "Owner", "people").await.is_ok());
        assert_eq!(workspace.count(WorkspaceOp::CreateColumn), 2);
    }

    #[tokio::test]
    async fn template_boards_copy_columns_but_not_items() {
        let workspace =
            InMemoryWorkspace::new().with_template("77", "Sprint", &[("Status", "status"), ("Due", "date")]);

        let templates = workspace.get_board_templates().await.expect("templates");
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].name, "Sprint");

        let created =
            workspace.create_board_from_template("Sprint 14", "77", Some("9")).await.expect("board");
        let board = workspace.board(&created.id).expect("stored");
        let titles: Vec<&str> = board.columns.iter().map(|column| column.title.as_str()).collect();
        assert_eq!(titles, vec!["Name", "Status", "Due"]);
        assert_eq!(board.name, "Sprint 14");
        assert_eq!(board.workspace_id.as_deref(), Some("9"));

        let missing = workspace.create_board_from_template("Other", "404", None).await;
        assert!(matches!(missing, Err(ApiError::NotFound { resource: "template", .. })));
    }

    #[tokio::test]
    async fn webhooks_require_an_existing_board() {
        let workspace = InMemoryWorkspace::new();
        let board = workspace.create_board("Hooks", "public", None).await.expect("board");

        let webhook = workspace
            .create_webhook(&board.id, "https://example.test/hook", "create_item", &Map::new())
            .await
            .expect("webhook");
        assert_eq!(webhook.board_id, board.id);
        assert_eq!(workspace.webhooks()[0].1, "create_item");

        let missing = workspace.create_webhook("9999", "https://example.test/hook", "create_item", &Map::new()).await;
        assert!(matches!(missing, Err(ApiError::NotFound { resource: "board", .. })));
        assert_eq!(workspace.get_me().await.expect("me").name, "Sandbox User");
    }

    #[tokio::test]
    async fn update_of_unknown_item_is_not_found() {
        let workspace = InMemoryWorkspace::new();
        let board = workspace.create_board("Ops", "public", None).await.expect("board");

        let result = workspace.update_item("999", &board.id, &Map::new()).await;
        assert!(matches!(result, Err(ApiError::NotFound { resource: "item", .. })));
    }
}
