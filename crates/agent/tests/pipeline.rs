use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::json;

use boardpilot_agent::autonomous::AutonomousExecutor;
use boardpilot_agent::llm::{AgentTurn, ChatMessage, LlmClient, ToolCall, ToolCallingClient, ToolDefinition};
use boardpilot_agent::{AgentRuntime, Strategy, StructuredInterpreter, ToolRegistry};
use boardpilot_core::domain::plan::{Operation, ResourceType};
use boardpilot_core::workspace::{ApiError, InMemoryWorkspace, WorkspaceOp};
use boardpilot_core::Plan;
use boardpilot_db::{InMemoryBackend, MemoryStore};

/// Interpretation model that replays canned completions and records prompts.
#[derive(Default)]
struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn replying(replies: Vec<Result<&str, &str>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|reply| reply.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|prompts| prompts.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedModel {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _system_prompt: Option<&str>, prompt: &str) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        match self.replies.lock().ok().and_then(|mut replies| replies.pop_front()) {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no scripted reply left")),
        }
    }
}

/// Tool-calling session that replays canned turns.
#[derive(Default)]
struct ScriptedAgent {
    refuse_setup: bool,
    turns: Mutex<VecDeque<Result<AgentTurn, String>>>,
}

#[async_trait]
impl ToolCallingClient for ScriptedAgent {
    async fn prepare(&self, _tools: &[ToolDefinition]) -> Result<()> {
        if self.refuse_setup {
            bail!("tool calling is not available");
        }
        Ok(())
    }

    async fn next_turn(&self, _messages: &[ChatMessage], _tools: &[ToolDefinition]) -> Result<AgentTurn> {
        match self.turns.lock().ok().and_then(|mut turns| turns.pop_front()) {
            Some(Ok(turn)) => Ok(turn),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no scripted turn left")),
        }
    }
}

struct Harness {
    runtime: AgentRuntime,
    workspace: Arc<InMemoryWorkspace>,
    model: Arc<ScriptedModel>,
    memory: Arc<MemoryStore>,
}

async fn harness(replies: Vec<Result<&str, &str>>) -> Harness {
    harness_with(replies, None, Arc::new(MemoryStore::in_memory().await)).await
}

async fn harness_with(
    replies: Vec<Result<&str, &str>>,
    agent: Option<ScriptedAgent>,
    memory: Arc<MemoryStore>,
) -> Harness {
    let workspace = Arc::new(InMemoryWorkspace::new());
    let model = ScriptedModel::replying(replies);
    let interpreter = StructuredInterpreter::new(model.clone(), None);
    let mut runtime = AgentRuntime::new(interpreter, workspace.clone(), memory.clone());
    if let Some(agent) = agent {
        runtime = runtime.with_autonomous(AutonomousExecutor::new(
            Arc::new(agent),
            ToolRegistry::standard(workspace.clone()),
            5,
        ));
    }
    Harness { runtime, workspace, model, memory }
}

fn plan_reply(plan: serde_json::Value) -> String {
    format!("```json\n{plan}\n```")
}

fn tool_turn(id: &str, tool: &str, input: &str) -> Result<AgentTurn, String> {
    let arguments = json!({ "input": input }).to_string();
    Ok(AgentTurn::ToolCalls { content: None, calls: vec![ToolCall::new(id, tool, arguments)] })
}

#[tokio::test]
async fn board_request_creates_one_board_and_records_it() {
    let reply = plan_reply(json!({
        "resourceType": "board",
        "operation": "create",
        "attributes": { "name": "Launch Plan" }
    }));
    let h = harness(vec![Ok(reply.as_str())]).await;

    let report = h.runtime.process("create a board called Launch Plan", Strategy::Dispatcher).await;

    assert!(report.success, "report: {report:?}");
    assert_eq!(report.details.len(), 1);
    let record = &report.details[0];
    assert_eq!(record.resource_type, ResourceType::Board);
    assert_eq!(record.operation, Some(Operation::Create));
    assert_eq!(record.name.as_deref(), Some("Launch Plan"));
    assert_eq!(h.workspace.count(WorkspaceOp::CreateBoard), 1);

    let board_id = record.id.clone().expect("board id");
    let stored = h.memory.get_resource(ResourceType::Board, &board_id).await.expect("registered");
    assert_eq!(stored.record.name.as_deref(), Some("Launch Plan"));

    let snapshot = h.memory.snapshot().await;
    assert_eq!(snapshot.conversations.len(), 1);
    assert_eq!(snapshot.conversations[0].user_input, "create a board called Launch Plan");
    let (tag, _) = snapshot.contexts.iter().next().expect("context tag");
    assert!(tag.starts_with("request_"));
    let grouped = h.memory.get_context_resources(tag).await;
    assert!(grouped["board"].contains_key(&board_id));
}

#[tokio::test]
async fn unsupported_resource_type_fails_and_stores_one_conversation() {
    let reply = plan_reply(json!({
        "resourceType": "automation",
        "operation": "create",
        "attributes": { "name": "Notify on done" }
    }));
    let h = harness(vec![Ok(reply.as_str())]).await;

    let report = h.runtime.process_request("notify me when done").await;

    assert!(!report.success);
    assert_eq!(report.message, "Unsupported resource type: automation");
    assert!(h.workspace.calls().is_empty());
    let conversations = h.memory.get_recent_conversations(10).await;
    assert_eq!(conversations.len(), 1);
    assert!(!conversations[0].success);
}

#[tokio::test]
async fn failing_column_is_recorded_and_siblings_continue() {
    let reply = plan_reply(json!({
        "resourceType": "board",
        "operation": "create",
        "attributes": {
            "name": "Q3 Budget",
            "columns": [
                { "title": "Owner", "type": "people" },
                { "title": "Budget", "type": "numbers" },
                { "title": "Due" }
            ]
        }
    }));
    let h = harness(vec![Ok(reply.as_str())]).await;
    h.workspace.fail_when(
        WorkspaceOp::CreateColumn,
        Some("Budget"),
        ApiError::Remote("ColumnType is invalid".to_string()),
    );

    let report = h.runtime.process_request("budget board").await;

    assert!(report.success);
    assert_eq!(report.details.len(), 4);
    let failures: Vec<usize> = report
        .details
        .iter()
        .enumerate()
        .filter(|(_, record)| record.error.is_some())
        .map(|(index, _)| index)
        .collect();
    assert_eq!(failures, vec![2]);

    let failed = &report.details[2];
    assert_eq!(failed.title.as_deref(), Some("Budget"));
    assert_eq!(failed.error.as_deref(), Some("GraphQL Error: ColumnType is invalid"));
    assert_eq!(failed.board_id, report.details[0].id);
    assert!(failed.id.is_none());

    let board = h.workspace.board(report.details[0].id.as_deref().unwrap_or_default()).expect("board");
    let titles: Vec<&str> = board.columns.iter().map(|column| column.title.as_str()).collect();
    assert_eq!(titles, vec!["Name", "Owner", "Due"]);
    assert_eq!(board.columns[2].column_type.as_deref(), Some("text"));

    let columns = h.memory.get_resources(ResourceType::Column).await;
    assert_eq!(columns.len(), 2);
}

#[tokio::test]
async fn standalone_column_failure_aborts_the_report() {
    let reply = plan_reply(json!({
        "resourceType": "column",
        "operation": "create",
        "attributes": { "boardId": 4242, "name": "Owner", "columnType": "people" }
    }));
    let h = harness(vec![Ok(reply.as_str())]).await;

    let report = h.runtime.process_request("add an owner column to board 4242").await;

    assert!(!report.success);
    assert_eq!(report.message, "Error executing plan: board `4242` was not found");
    assert!(report.details.is_empty());
}

#[tokio::test]
async fn missing_attribute_is_an_execution_error() {
    let reply = plan_reply(json!({
        "resourceType": "item",
        "operation": "create",
        "attributes": { "name": "Orphan task" }
    }));
    let h = harness(vec![Ok(reply.as_str())]).await;

    let report = h.runtime.process_request("add a task").await;

    assert!(!report.success);
    assert!(report.message.starts_with("Error executing plan:"));
    assert!(report.message.contains("boardId"));
}

#[tokio::test]
async fn interpretation_failure_still_records_a_conversation() {
    let h = harness(vec![Ok("I am not sure what you mean.")]).await;

    let report = h.runtime.process_request("do the thing").await;

    assert!(!report.success);
    assert!(report.message.starts_with("Error processing request: "));
    let conversations = h.memory.get_recent_conversations(5).await;
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0].user_input, "do the thing");
    assert!(!conversations[0].success);
}

#[tokio::test]
async fn both_models_failing_reports_the_primary_error() {
    let primary = ScriptedModel::replying(vec![Err("primary model unavailable")]);
    let fallback = ScriptedModel::replying(vec![Err("fallback model unavailable")]);
    let memory = Arc::new(MemoryStore::in_memory().await);
    let runtime = AgentRuntime::new(
        StructuredInterpreter::new(primary.clone(), Some(fallback.clone())),
        Arc::new(InMemoryWorkspace::new()),
        memory.clone(),
    );

    let report = runtime.process("make a board", Strategy::Dispatcher).await;

    assert!(!report.success);
    assert_eq!(
        report.message,
        "Error processing request: model provider call failed: primary model unavailable"
    );
    assert_eq!(primary.prompts().len(), 1);
    assert_eq!(fallback.prompts().len(), 1);

    let snapshot = memory.snapshot().await;
    assert_eq!(snapshot.conversations.len(), 1);
    assert!(!snapshot.conversations[0].success);
}

#[tokio::test]
async fn board_plan_with_template_copies_template_columns() {
    let reply = plan_reply(json!({
        "resourceType": "board",
        "operation": "create",
        "attributes": { "name": "Sprint 15", "templateId": 77 }
    }));
    let workspace =
        Arc::new(InMemoryWorkspace::new().with_template("77", "Sprint template", &[("Status", "status")]));
    let runtime = AgentRuntime::new(
        StructuredInterpreter::new(ScriptedModel::replying(vec![Ok(reply.as_str())]), None),
        workspace.clone(),
        Arc::new(MemoryStore::in_memory().await),
    );

    let report = runtime.process_request("create sprint 15 from the sprint template").await;

    assert!(report.success, "{}", report.message);
    let board_id = report.details[0].id.clone().expect("board id");
    let board = workspace.board(&board_id).expect("board");
    assert_eq!(board.name, "Sprint 15");
    assert_eq!(board.columns.iter().map(|column| column.title.as_str()).collect::<Vec<_>>(), vec!["Status"]);
    assert_eq!(workspace.count(WorkspaceOp::CreateBoard), 1);
}

#[tokio::test]
async fn recent_creations_are_offered_as_context_but_not_recorded() {
    let board = plan_reply(json!({
        "resourceType": "board",
        "operation": "create",
        "attributes": { "name": "Launch Plan" }
    }));
    let group = plan_reply(json!({
        "resourceType": "group",
        "operation": "create",
        "attributes": { "boardId": "1001", "name": "Week 1" }
    }));
    let h = harness(vec![Ok(board.as_str()), Ok(group.as_str())]).await;

    let first = h.runtime.process_request("create a board called Launch Plan").await;
    assert_eq!(first.details[0].id.as_deref(), Some("1001"));
    let second = h.runtime.process_request("add a Week 1 group to it").await;
    assert!(second.success);
    assert_eq!(second.details[0].title.as_deref(), Some("Week 1"));

    let prompts = h.model.prompts();
    assert!(!prompts[0].contains("Recently created resources"));
    assert!(prompts[1].contains("- board: \"Launch Plan\" (id: 1001)"));

    let conversations = h.memory.get_recent_conversations(5).await;
    assert_eq!(conversations[0].user_input, "add a Week 1 group to it");
}

#[tokio::test]
async fn memory_write_failure_becomes_a_warning() {
    let backend = Arc::new(InMemoryBackend::new());
    let memory = Arc::new(MemoryStore::open(backend.clone(), 100).await);
    backend.reject_writes(true);
    let reply = plan_reply(json!({
        "resourceType": "board",
        "operation": "create",
        "attributes": { "name": "Ops" }
    }));
    let h = harness_with(vec![Ok(reply.as_str())], None, memory).await;

    let report = h.runtime.process_request("create an ops board").await;

    assert!(report.success);
    assert_eq!(report.warnings.len(), 2);
    assert!(report.warnings[0].starts_with("conversation was not recorded"));
    assert_eq!(h.workspace.count(WorkspaceOp::CreateBoard), 1);
    assert!(h.memory.get_recent_conversations(5).await.is_empty());
}

#[tokio::test]
async fn execute_runs_a_plan_directly() {
    let h = harness(vec![]).await;
    let board = h.workspace_board("Existing").await;
    let plan: Plan = serde_json::from_value(json!({
        "resourceType": "board",
        "operation": "get",
        "attributes": { "boardId": board }
    }))
    .expect("plan");

    let report = h.runtime.execute(&plan, "show me the existing board").await;

    assert!(report.success);
    assert_eq!(report.details[0].operation, Some(Operation::Get));
    assert_eq!(report.details[0].board.as_ref().map(|value| &value["name"]), Some(&json!("Existing")));
    assert!(h.model.prompts().is_empty());
    assert!(h.memory.get_resources(ResourceType::Board).await.is_empty());
}

#[tokio::test]
async fn autonomous_setup_failure_falls_back_to_dispatcher() {
    let reply = plan_reply(json!({
        "resourceType": "board",
        "operation": "create",
        "attributes": { "name": "Fallback Board" }
    }));
    let agent = ScriptedAgent { refuse_setup: true, ..ScriptedAgent::default() };
    let h = harness_with(vec![Ok(reply.as_str())], Some(agent), Arc::new(MemoryStore::in_memory().await)).await;

    let report = h.runtime.process("create a fallback board", Strategy::Autonomous).await;

    assert!(report.success);
    assert_eq!(report.message, "Successfully processed your request");
    assert!(report.agent_steps.is_empty());
    assert_eq!(h.model.prompts().len(), 1);
    assert_eq!(h.memory.get_recent_conversations(5).await.len(), 1);
}

#[tokio::test]
async fn autonomous_failure_after_mutation_does_not_replay() {
    let agent = ScriptedAgent {
        turns: Mutex::new(VecDeque::from(vec![
            tool_turn("c1", "CreateBoard", r#"{"name":"Hiring"}"#),
            Err("upstream disconnected".to_string()),
        ])),
        ..ScriptedAgent::default()
    };
    let h = harness_with(vec![], Some(agent), Arc::new(MemoryStore::in_memory().await)).await;

    let report = h.runtime.process_request_autonomous("set up hiring").await;

    assert!(!report.success);
    assert_eq!(report.agent_steps.len(), 1);
    assert_eq!(report.details.len(), 1);
    assert!(h.model.prompts().is_empty());
    assert_eq!(h.workspace.count(WorkspaceOp::CreateBoard), 1);

    let conversations = h.memory.get_recent_conversations(5).await;
    assert_eq!(conversations.len(), 1);
    assert!(!conversations[0].success);
    assert_eq!(h.memory.get_resources(ResourceType::Board).await.len(), 1);
}

#[tokio::test]
async fn autonomous_success_is_recorded_like_a_dispatch() {
    let agent = ScriptedAgent {
        turns: Mutex::new(VecDeque::from(vec![
            tool_turn("c1", "CreateBoard", r#"{"name":"Roadmap"}"#),
            Ok(AgentTurn::Final("Done.".to_string())),
        ])),
        ..ScriptedAgent::default()
    };
    let h = harness_with(vec![], Some(agent), Arc::new(MemoryStore::in_memory().await)).await;

    let report = h.runtime.process("roadmap board please", Strategy::Autonomous).await;

    assert!(report.success);
    assert_eq!(report.message, "Successfully processed your request with the autonomous agent");
    assert_eq!(report.output.as_deref(), Some("Done."));
    let creations = h.memory.get_recent_creations(10).await;
    assert_eq!(creations.len(), 1);
    assert_eq!(creations[0].name.as_deref(), Some("Roadmap"));
}

impl Harness {
    async fn workspace_board(&self, name: &str) -> String {
        use boardpilot_core::workspace::ResourceApi;

        self.workspace.create_board(name, "public", None).await.map(|board| board.id).unwrap_or_default()
    }
}
