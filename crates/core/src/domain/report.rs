use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::ids::deserialize_opt_id;
use crate::domain::plan::{Operation, ResourceType};

pub const DEFAULT_SUCCESS_MESSAGE: &str = "Successfully processed your request";

/// Outcome of one primitive remote operation. `id` is present iff the
/// operation succeeded; a failed sub-operation carries `error` instead.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRecord {
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,
    #[serde(default, deserialize_with = "deserialize_opt_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_id", skip_serializing_if = "Option::is_none")]
    pub board_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board: Option<Value>,
}

impl ResourceRecord {
    pub fn new(resource_type: ResourceType, operation: Operation) -> Self {
        Self {
            resource_type,
            operation: Some(operation),
            id: None,
            name: None,
            title: None,
            board_id: None,
            error: None,
            board: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_board_id(mut self, board_id: impl Into<String>) -> Self {
        self.board_id = Some(board_id.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_board(mut self, board: Value) -> Self {
        self.board = Some(board);
        self
    }

    /// `name`, falling back to `title` (columns and groups are titled).
    pub fn label(&self) -> Option<&str> {
        self.name.as_deref().or(self.title.as_deref())
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_creation(&self) -> bool {
        matches!(self.operation, None | Some(Operation::Create))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStep {
    pub tool: String,
    pub input: String,
    pub output: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub details: Vec<ResourceRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agent_steps: Vec<AgentStep>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Default for ExecutionReport {
    fn default() -> Self {
        Self::succeeded(DEFAULT_SUCCESS_MESSAGE)
    }
}

impl ExecutionReport {
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            details: Vec::new(),
            output: None,
            agent_steps: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { success: false, ..Self::succeeded(message) }
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.success = false;
        self.message = message.into();
    }

    pub fn push(&mut self, record: ResourceRecord) {
        self.details.push(record);
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Records that name a remote resource this request changed. Lookups
    /// carry an id too but are not registered.
    pub fn identified_records(&self) -> impl Iterator<Item = &ResourceRecord> {
        self.details
            .iter()
            .filter(|record| record.id.is_some() && record.operation != Some(Operation::Get))
    }

    pub fn failed_records(&self) -> usize {
        self.details.iter().filter(|record| record.is_failure()).count()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ExecutionReport, ResourceRecord};
    use crate::domain::plan::{Operation, ResourceType};

    #[test]
    fn record_serializes_in_wire_shape() {
        let record = ResourceRecord::new(ResourceType::Column, Operation::Create)
            .with_title("Status")
            .with_board_id("101")
            .with_error("ColumnType is invalid");

        let value = serde_json::to_value(&record).expect("serialize");
        assert_eq!(
            value,
            json!({
                "type": "column",
                "operation": "create",
                "title": "Status",
                "boardId": "101",
                "error": "ColumnType is invalid"
            })
        );
    }

    #[test]
    fn record_without_operation_counts_as_creation() {
        let record: ResourceRecord =
            serde_json::from_value(json!({ "type": "item", "id": 7, "name": "Draft" }))
                .expect("deserialize");

        assert!(record.is_creation());
        assert_eq!(record.id.as_deref(), Some("7"));
        assert_eq!(record.label(), Some("Draft"));
    }

    #[test]
    fn failed_report_keeps_details_and_omits_empty_extras() {
        let mut report = ExecutionReport::default();
        report.push(ResourceRecord::new(ResourceType::Board, Operation::Create).with_id("1"));
        report.fail("Error executing plan: boom");

        let value = serde_json::to_value(&report).expect("serialize");
        assert_eq!(value["success"], false);
        assert_eq!(value["details"].as_array().map(Vec::len), Some(1));
        assert!(value.get("agentSteps").is_none());
        assert!(value.get("warnings").is_none());
        assert_eq!(report.identified_records().count(), 1);
    }

    #[test]
    fn lookups_are_not_identified_records() {
        let mut report = ExecutionReport::default();
        report.push(ResourceRecord::new(ResourceType::Board, Operation::Get).with_id("1001"));
        report.push(ResourceRecord::new(ResourceType::Item, Operation::Update).with_id("77"));

        let ids: Vec<_> = report.identified_records().filter_map(|record| record.id.as_deref()).collect();
        assert_eq!(ids, vec!["77"]);
    }
}
