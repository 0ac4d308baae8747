use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use boardpilot_core::domain::plan::{NewBoard, Operation, Plan, PlanAction, ResourceType};
use boardpilot_core::domain::report::{ExecutionReport, ResourceRecord};
use boardpilot_core::errors::ApplicationError;
use boardpilot_core::workspace::ResourceApi;
use boardpilot_db::MemoryStore;

/// Executes validated plans against the workspace API, one sequential call
/// at a time, and records every outcome in memory.
pub struct PlanDispatcher {
    api: Arc<dyn ResourceApi>,
    memory: Arc<MemoryStore>,
}

impl PlanDispatcher {
    pub fn new(api: Arc<dyn ResourceApi>, memory: Arc<MemoryStore>) -> Self {
        Self { api, memory }
    }

    pub fn api(&self) -> &Arc<dyn ResourceApi> {
        &self.api
    }

    pub async fn execute(&self, plan: &Plan, user_input: &str) -> ExecutionReport {
        let mut report = self.dispatch(plan).await;
        record_outcome(&self.memory, user_input, &mut report).await;
        report
    }

    async fn dispatch(&self, plan: &Plan) -> ExecutionReport {
        let action = match plan.action() {
            Ok(action) => action,
            Err(error) if error.is_unsupported() => {
                info!(
                    event_name = "agent.dispatch.unsupported",
                    resource_type = %plan.resource_type,
                    operation = %plan.operation,
                    "plan has no handler"
                );
                return ExecutionReport::failed(error.to_string());
            }
            Err(error) => {
                return ExecutionReport::failed(format!(
                    "Error executing plan: {}",
                    ApplicationError::from(error)
                ))
            }
        };

        let mut report = ExecutionReport::default();
        if let Err(error) = self.run(action, &mut report).await {
            warn!(
                event_name = "agent.dispatch.failed",
                resource_type = %plan.resource_type,
                operation = %plan.operation,
                error = %error,
                "remote call aborted plan"
            );
            report.fail(format!("Error executing plan: {error}"));
        }
        report
    }

    async fn run(&self, action: PlanAction, report: &mut ExecutionReport) -> Result<(), ApplicationError> {
        match action {
            PlanAction::CreateBoard(board) => self.create_board(board, report).await?,
            PlanAction::GetBoard { board_id } => {
                let board = self.api.get_board(&board_id).await?;
                let snapshot = serde_json::to_value(&board).unwrap_or_else(|_| json!({}));
                report.push(
                    ResourceRecord::new(ResourceType::Board, Operation::Get)
                        .with_id(board.id)
                        .with_name(board.name)
                        .with_board(snapshot),
                );
            }
            PlanAction::CreateColumn { board_id, column } => {
                let created = self
                    .api
                    .create_column(&board_id, &column.title, column.column_type_or_default())
                    .await?;
                report.push(
                    ResourceRecord::new(ResourceType::Column, Operation::Create)
                        .with_id(created.id)
                        .with_title(created.title)
                        .with_board_id(board_id),
                );
            }
            PlanAction::CreateItem(item) => {
                let created = self
                    .api
                    .create_item(&item.board_id, &item.name, item.group_id.as_deref(), &item.column_values)
                    .await?;
                report.push(
                    ResourceRecord::new(ResourceType::Item, Operation::Create)
                        .with_id(created.id)
                        .with_name(created.name)
                        .with_board_id(item.board_id),
                );
            }
            PlanAction::UpdateItem(update) => {
                let updated = self
                    .api
                    .update_item(&update.item_id, &update.board_id, &update.column_values)
                    .await?;
                report.push(
                    ResourceRecord::new(ResourceType::Item, Operation::Update)
                        .with_id(updated.id)
                        .with_name(updated.name)
                        .with_board_id(update.board_id),
                );
            }
            PlanAction::CreateGroup { board_id, name } => {
                let created = self.api.create_group(&board_id, &name).await?;
                report.push(
                    ResourceRecord::new(ResourceType::Group, Operation::Create)
                        .with_id(created.id)
                        .with_title(created.title)
                        .with_board_id(board_id),
                );
            }
        }
        Ok(())
    }

    /// Creates the board, then each column in order. A failed column is
    /// recorded and the rest still run.
    async fn create_board(&self, board: NewBoard, report: &mut ExecutionReport) -> Result<(), ApplicationError> {
        let workspace_id = board.workspace_id.as_deref();
        let created = match board.template_id.as_deref() {
            Some(template_id) => {
                self.api.create_board_from_template(&board.name, template_id, workspace_id).await?
            }
            None => self.api.create_board(&board.name, &board.board_kind, workspace_id).await?,
        };
        report.push(
            ResourceRecord::new(ResourceType::Board, Operation::Create)
                .with_id(created.id.clone())
                .with_name(created.name),
        );

        for column in &board.columns {
            let record = match self
                .api
                .create_column(&created.id, &column.title, column.column_type_or_default())
                .await
            {
                Ok(column) => ResourceRecord::new(ResourceType::Column, Operation::Create)
                    .with_id(column.id)
                    .with_title(column.title),
                Err(error) => {
                    warn!(
                        event_name = "agent.dispatch.column_failed",
                        board_id = %created.id,
                        column = %column.title,
                        error = %error,
                        "column creation failed; continuing with remaining columns"
                    );
                    ResourceRecord::new(ResourceType::Column, Operation::Create)
                        .with_error(error.to_string())
                        .with_title(column.title.clone())
                }
            };
            report.push(record.with_board_id(created.id.clone()));
        }
        Ok(())
    }
}

/// Grouping key for the resources one request produced.
pub fn context_tag() -> String {
    let short = Uuid::new_v4().simple().to_string();
    format!("request_{}_{}", Utc::now().timestamp_millis(), &short[..8])
}

/// Stores the conversation, then registers every identified record under a
/// fresh context tag. Persistence failures become report warnings since the
/// remote side may already have changed.
pub(crate) async fn record_outcome(memory: &MemoryStore, user_input: &str, report: &mut ExecutionReport) {
    if let Err(error) = memory.store_conversation(user_input, report).await {
        warn!(
            event_name = "agent.memory.conversation_failed",
            error = %error,
            "conversation was not recorded"
        );
        report.warn(format!("conversation was not recorded: {error}"));
    }

    let tag = context_tag();
    let records: Vec<ResourceRecord> = report.identified_records().cloned().collect();
    for record in records {
        if let Err(error) = memory.store_resource(record.resource_type, &record, Some(&tag)).await {
            warn!(
                event_name = "agent.memory.resource_failed",
                resource_type = %record.resource_type,
                error = %error,
                "resource was not registered"
            );
            report.warn(format!("{} was not registered: {error}", record.resource_type));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::context_tag;

    #[test]
    fn context_tag_has_millis_and_short_suffix() {
        let tag = context_tag();
        let parts: Vec<&str> = tag.split('_').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "request");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 8);
        assert_ne!(context_tag(), tag);
    }
}
