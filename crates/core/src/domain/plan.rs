use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::domain::ids::deserialize_opt_id;
use crate::errors::DomainError;

/// Column types the workspace API accepts for `create_column`.
pub const COLUMN_TYPES: &[&str] =
    &["text", "long_text", "numbers", "status", "dropdown", "people", "date", "file", "link", "timeline"];

pub const DEFAULT_BOARD_KIND: &str = "public";
pub const DEFAULT_COLUMN_TYPE: &str = "text";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Board,
    Item,
    Column,
    Group,
    Automation,
    Webhook,
}

impl ResourceType {
    pub const ALL: [ResourceType; 6] =
        [Self::Board, Self::Item, Self::Column, Self::Group, Self::Automation, Self::Webhook];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Board => "board",
            Self::Item => "item",
            Self::Column => "column",
            Self::Group => "group",
            Self::Automation => "automation",
            Self::Webhook => "webhook",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "board" | "boards" => Some(Self::Board),
            "item" | "items" => Some(Self::Item),
            "column" | "columns" => Some(Self::Column),
            "group" | "groups" => Some(Self::Group),
            "automation" | "automations" => Some(Self::Automation),
            "webhook" | "webhooks" => Some(Self::Webhook),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Delete,
    Get,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Get => "get",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub title: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub column_type: Option<String>,
}

impl ColumnSpec {
    pub fn new(title: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self { title: title.into(), column_type: Some(column_type.into()) }
    }

    pub fn column_type_or_default(&self) -> &str {
        self.column_type
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_COLUMN_TYPE)
    }
}

/// Operation-specific fields of a plan. Keys the pipeline does not know are
/// kept in `extra` so that nothing the interpreter produced is lost.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_kind: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_id", skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_id", skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_id", skip_serializing_if = "Option::is_none")]
    pub board_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_id", skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_id", skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<ColumnSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_values: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Structured interpretation of one user request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub resource_type: ResourceType,
    pub operation: Operation,
    pub attributes: PlanAttributes,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewBoard {
    pub name: String,
    pub board_kind: String,
    pub workspace_id: Option<String>,
    /// Board to copy structure from instead of starting empty.
    pub template_id: Option<String>,
    pub columns: Vec<ColumnSpec>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewItem {
    pub board_id: String,
    pub name: String,
    pub group_id: Option<String>,
    pub column_values: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ItemUpdate {
    pub item_id: String,
    pub board_id: String,
    pub column_values: Map<String, Value>,
}

/// The executable form of a [`Plan`]: one variant per supported
/// resource/operation pair.
#[derive(Clone, Debug, PartialEq)]
pub enum PlanAction {
    CreateBoard(NewBoard),
    GetBoard { board_id: String },
    CreateColumn { board_id: String, column: ColumnSpec },
    CreateItem(NewItem),
    UpdateItem(ItemUpdate),
    CreateGroup { board_id: String, name: String },
}

impl PlanAction {
    pub fn resource_type(&self) -> ResourceType {
        match self {
            Self::CreateBoard(_) | Self::GetBoard { .. } => ResourceType::Board,
            Self::CreateColumn { .. } => ResourceType::Column,
            Self::CreateItem(_) | Self::UpdateItem(_) => ResourceType::Item,
            Self::CreateGroup { .. } => ResourceType::Group,
        }
    }

    pub fn operation(&self) -> Operation {
        match self {
            Self::GetBoard { .. } => Operation::Get,
            Self::UpdateItem(_) => Operation::Update,
            Self::CreateBoard(_)
            | Self::CreateColumn { .. }
            | Self::CreateItem(_)
            | Self::CreateGroup { .. } => Operation::Create,
        }
    }
}

impl Plan {
    pub fn new(resource_type: ResourceType, operation: Operation, attributes: PlanAttributes) -> Self {
        Self { resource_type, operation, attributes, steps: Vec::new() }
    }

    pub fn action(&self) -> Result<PlanAction, DomainError> {
        let attributes = &self.attributes;
        let required = |value: Option<&String>, attribute: &'static str| {
            value.map(|value| value.trim()).filter(|value| !value.is_empty()).map(str::to_string).ok_or(
                DomainError::MissingAttribute {
                    resource_type: self.resource_type,
                    operation: self.operation,
                    attribute,
                },
            )
        };

        match (self.resource_type, self.operation) {
            (ResourceType::Board, Operation::Create) => Ok(PlanAction::CreateBoard(NewBoard {
                name: required(attributes.name.as_ref(), "name")?,
                board_kind: attributes
                    .board_kind
                    .as_deref()
                    .map(str::trim)
                    .filter(|kind| !kind.is_empty())
                    .unwrap_or(DEFAULT_BOARD_KIND)
                    .to_string(),
                workspace_id: attributes.workspace_id.clone(),
                template_id: attributes.template_id.clone(),
                columns: attributes.columns.clone().unwrap_or_default(),
            })),
            (ResourceType::Board, Operation::Get) => {
                Ok(PlanAction::GetBoard { board_id: required(attributes.board_id.as_ref(), "boardId")? })
            }
            (ResourceType::Column, Operation::Create) => {
                let title = attributes.name.as_ref().or(attributes.title.as_ref());
                Ok(PlanAction::CreateColumn {
                    board_id: required(attributes.board_id.as_ref(), "boardId")?,
                    column: ColumnSpec {
                        title: required(title, "name")?,
                        column_type: attributes.column_type.clone(),
                    },
                })
            }
            (ResourceType::Item, Operation::Create) => Ok(PlanAction::CreateItem(NewItem {
                board_id: required(attributes.board_id.as_ref(), "boardId")?,
                name: required(attributes.name.as_ref(), "name")?,
                group_id: attributes.group_id.clone(),
                column_values: attributes.column_values.clone().unwrap_or_default(),
            })),
            (ResourceType::Item, Operation::Update) => Ok(PlanAction::UpdateItem(ItemUpdate {
                item_id: required(attributes.item_id.as_ref(), "itemId")?,
                board_id: required(attributes.board_id.as_ref(), "boardId")?,
                column_values: attributes.column_values.clone().unwrap_or_default(),
            })),
            (ResourceType::Group, Operation::Create) => Ok(PlanAction::CreateGroup {
                board_id: required(attributes.board_id.as_ref(), "boardId")?,
                name: required(attributes.name.as_ref(), "name")?,
            }),
            (resource_type @ (ResourceType::Automation | ResourceType::Webhook), _) => {
                Err(DomainError::UnsupportedResourceType(resource_type))
            }
            (
                resource_type @ (ResourceType::Board
                | ResourceType::Column
                | ResourceType::Item
                | ResourceType::Group),
                operation,
            ) => Err(DomainError::UnsupportedOperation { resource_type, operation }),
        }
    }
}

/// JSON-Schema-like description of [`Plan`] handed to the interpreter.
pub fn plan_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "resourceType": {
                "type": "string",
                "enum": ResourceType::ALL.iter().map(ResourceType::as_str).collect::<Vec<_>>()
            },
            "operation": {
                "type": "string",
                "enum": ["create", "update", "delete", "get"]
            },
            "attributes": {
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "description": { "type": "string" },
                    "boardKind": { "type": "string" },
                    "workspaceId": { "type": "string" },
                    "templateId": { "type": "string" },
                    "boardId": { "type": "string" },
                    "groupId": { "type": "string" },
                    "itemId": { "type": "string" },
                    "columnType": { "type": "string" },
                    "columns": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "title": { "type": "string" },
                                "type": { "type": "string" }
                            }
                        }
                    },
                    "columnValues": { "type": "object" }
                }
            },
            "steps": {
                "type": "array",
                "items": { "type": "string" }
            }
        },
        "required": ["resourceType", "operation", "attributes"]
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ColumnSpec, Operation, Plan, PlanAction, ResourceType};
    use crate::errors::DomainError;

    fn plan(value: serde_json::Value) -> Plan {
        serde_json::from_value(value).expect("plan should deserialize")
    }

    #[test]
    fn board_create_with_columns_becomes_typed_action() {
        let plan = plan(json!({
            "resourceType": "board",
            "operation": "create",
            "attributes": {
                "name": "Launch Plan",
                "columns": [
                    { "title": "Owner", "type": "people" },
                    { "title": "Notes" }
                ]
            },
            "steps": ["create board", "add columns"]
        }));

        let PlanAction::CreateBoard(board) = plan.action().expect("supported action") else {
            panic!("expected board creation");
        };
        assert_eq!(board.name, "Launch Plan");
        assert_eq!(board.board_kind, "public");
        assert_eq!(board.columns.len(), 2);
        assert_eq!(board.columns[0], ColumnSpec::new("Owner", "people"));
        assert_eq!(board.columns[1].column_type_or_default(), "text");
        assert_eq!(board.template_id, None);
    }

    #[test]
    fn numeric_template_id_is_carried_into_board_action() {
        let plan = plan(json!({
            "resourceType": "board",
            "operation": "create",
            "attributes": { "name": "Sprint 14", "templateId": 8123 }
        }));

        let PlanAction::CreateBoard(board) = plan.action().expect("supported action") else {
            panic!("expected board creation");
        };
        assert_eq!(board.template_id.as_deref(), Some("8123"));
    }

    #[test]
    fn missing_top_level_fields_fail_to_parse() {
        let missing_attributes =
            serde_json::from_value::<Plan>(json!({ "resourceType": "board", "operation": "create" }));
        assert!(missing_attributes.is_err());

        let missing_operation =
            serde_json::from_value::<Plan>(json!({ "resourceType": "board", "attributes": {} }));
        assert!(missing_operation.is_err());
    }

    #[test]
    fn unknown_enum_values_are_rejected_not_coerced() {
        let bad_type = serde_json::from_value::<Plan>(json!({
            "resourceType": "Boards",
            "operation": "create",
            "attributes": {}
        }));
        assert!(bad_type.is_err());

        let bad_operation = serde_json::from_value::<Plan>(json!({
            "resourceType": "board",
            "operation": "archive",
            "attributes": {}
        }));
        assert!(bad_operation.is_err());
    }

    #[test]
    fn numeric_ids_and_unknown_attributes_survive() {
        let plan = plan(json!({
            "resourceType": "item",
            "operation": "create",
            "attributes": { "boardId": 987654, "name": "Write brief", "priority": "high" }
        }));

        assert_eq!(plan.attributes.board_id.as_deref(), Some("987654"));
        assert_eq!(plan.attributes.extra.get("priority"), Some(&json!("high")));

        let round_trip = serde_json::to_value(&plan).expect("serialize");
        assert_eq!(round_trip["attributes"]["priority"], "high");
        assert_eq!(round_trip["attributes"]["boardId"], "987654");
    }

    #[test]
    fn unsupported_pairs_are_distinguished_from_missing_attributes() {
        let automation = Plan::new(ResourceType::Automation, Operation::Create, Default::default());
        assert_eq!(
            automation.action(),
            Err(DomainError::UnsupportedResourceType(ResourceType::Automation))
        );

        let delete_board = Plan::new(ResourceType::Board, Operation::Delete, Default::default());
        assert!(matches!(
            delete_board.action(),
            Err(DomainError::UnsupportedOperation {
                resource_type: ResourceType::Board,
                operation: Operation::Delete
            })
        ));

        let item_without_board = plan(json!({
            "resourceType": "item",
            "operation": "create",
            "attributes": { "name": "Orphan" }
        }));
        assert!(matches!(
            item_without_board.action(),
            Err(DomainError::MissingAttribute { attribute: "boardId", .. })
        ));
    }

    #[test]
    fn column_create_accepts_title_alias() {
        let plan = plan(json!({
            "resourceType": "column",
            "operation": "create",
            "attributes": { "boardId": "42", "title": "Due", "columnType": "date" }
        }));

        assert_eq!(
            plan.action(),
            Ok(PlanAction::CreateColumn {
                board_id: "42".to_string(),
                column: ColumnSpec::new("Due", "date"),
            })
        );
    }

    #[test]
    fn schema_lists_every_resource_type() {
        let schema = super::plan_schema();
        let types = schema["properties"]["resourceType"]["enum"].as_array().expect("enum");
        assert_eq!(types.len(), ResourceType::ALL.len());
        assert_eq!(schema["required"], json!(["resourceType", "operation", "attributes"]));
    }
}
