//! GraphQL documents sent to the monday.com v2 endpoint. Every argument is
//! passed as a variable.

pub const ME: &str = "query { me { id name email } }";

pub const WORKSPACES: &str = "query { workspaces { id name kind description } }";

pub const BOARDS: &str = r#"
query ($limit: Int) {
  boards(limit: $limit) {
    id
    name
    description
    board_kind
    board_folder_id
    items_count
    workspace_id
    columns { id title type settings_str }
  }
}"#;

pub const BOARD_BY_ID: &str = r#"
query ($ids: [ID!]) {
  boards(ids: $ids) {
    id
    name
    description
    board_kind
    items_count
    workspace_id
    columns { id title type settings_str }
    groups { id title color position }
    items {
      id
      name
      group { id title }
      column_values { id text type value }
    }
  }
}"#;

pub const BOARD_TEMPLATES: &str = r#"
query {
  boards(state: templates) {
    id
    name
    description
    board_kind
  }
}"#;

pub const CREATE_BOARD: &str = r#"
mutation ($boardName: String!, $boardKind: BoardKind!, $workspaceId: ID, $templateId: ID) {
  create_board(
    board_name: $boardName
    board_kind: $boardKind
    workspace_id: $workspaceId
    template_id: $templateId
  ) {
    id
    name
    board_kind
  }
}"#;

pub const CREATE_COLUMN: &str = r#"
mutation ($boardId: ID!, $title: String!, $columnType: ColumnType!) {
  create_column(board_id: $boardId, title: $title, column_type: $columnType) {
    id
    title
    type
  }
}"#;

pub const CREATE_GROUP: &str = r#"
mutation ($boardId: ID!, $groupName: String!) {
  create_group(board_id: $boardId, group_name: $groupName) {
    id
    title
  }
}"#;

pub const CREATE_ITEM: &str = r#"
mutation ($boardId: ID!, $itemName: String!, $groupId: String, $columnValues: JSON) {
  create_item(board_id: $boardId, item_name: $itemName, group_id: $groupId, column_values: $columnValues) {
    id
    name
  }
}"#;

pub const UPDATE_ITEM: &str = r#"
mutation ($itemId: ID!, $boardId: ID!, $columnValues: JSON!) {
  change_multiple_column_values(item_id: $itemId, board_id: $boardId, column_values: $columnValues) {
    id
    name
    column_values { id text value }
  }
}"#;

pub const CREATE_WEBHOOK: &str = r#"
mutation ($boardId: ID!, $url: String!, $event: WebhookEventType!, $config: JSON) {
  create_webhook(board_id: $boardId, url: $url, event: $event, config: $config) {
    id
    board_id
  }
}"#;
