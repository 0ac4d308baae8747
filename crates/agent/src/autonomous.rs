use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use boardpilot_core::domain::report::{AgentStep, ExecutionReport, ResourceRecord};

use crate::llm::{AgentTurn, ChatMessage, ToolCallingClient, ToolDefinition};
use crate::tools::ToolRegistry;

pub const DEFAULT_MAX_ITERATIONS: u32 = 5;
pub const AUTONOMOUS_SUCCESS_MESSAGE: &str =
    "Successfully processed your request with the autonomous agent";

const AGENT_PROMPT: &str = "You are an assistant that manages monday.com workspaces.
Use the available tools to carry out the user's request step by step.
Every tool takes a single string input; structured inputs are JSON objects encoded as strings.
When the request is complete, reply with a short summary of what you did.";

/// How a tool-calling run ended.
#[derive(Clone, Debug, PartialEq)]
pub enum AutonomousOutcome {
    Completed(ExecutionReport),
    /// Nothing was mutated; the request can safely go through the plan
    /// dispatcher instead.
    FallBack { reason: String },
    /// A mutating tool was called before the failure. The report carries the
    /// steps and records up to that point.
    Failed(ExecutionReport),
}

#[derive(Default)]
struct Run {
    steps: Vec<AgentStep>,
    records: Vec<ResourceRecord>,
    committed: bool,
}

impl Run {
    fn into_report(self, mut report: ExecutionReport) -> ExecutionReport {
        report.details = self.records;
        report.agent_steps = self.steps;
        report
    }
}

pub struct AutonomousExecutor {
    client: Arc<dyn ToolCallingClient>,
    tools: ToolRegistry,
    session: OnceCell<Result<Vec<ToolDefinition>, String>>,
    max_iterations: u32,
}

impl AutonomousExecutor {
    pub fn new(client: Arc<dyn ToolCallingClient>, tools: ToolRegistry, max_iterations: u32) -> Self {
        Self { client, tools, session: OnceCell::new(), max_iterations: max_iterations.max(1) }
    }

    /// Prepares the tool-calling session on first use. The result, success
    /// or failure, is kept for the life of the executor.
    async fn session(&self) -> Result<&[ToolDefinition], String> {
        let session = self
            .session
            .get_or_init(|| async {
                let definitions = self.tools.definitions();
                match self.client.prepare(&definitions).await {
                    Ok(()) => {
                        info!(
                            event_name = "agent.autonomous.ready",
                            tools = definitions.len(),
                            "autonomous session prepared"
                        );
                        Ok(definitions)
                    }
                    Err(error) => Err(format!("autonomous setup failed: {error:#}")),
                }
            })
            .await;

        match session {
            Ok(definitions) => Ok(definitions.as_slice()),
            Err(reason) => Err(reason.clone()),
        }
    }

    pub async fn run(&self, request: &str) -> AutonomousOutcome {
        let definitions = match self.session().await {
            Ok(definitions) => definitions,
            Err(reason) => return AutonomousOutcome::FallBack { reason },
        };

        let mut messages = vec![ChatMessage::system(AGENT_PROMPT), ChatMessage::user(request)];
        let mut run = Run::default();

        for iteration in 1..=self.max_iterations {
            let turn = match self.client.next_turn(&messages, definitions).await {
                Ok(turn) => turn,
                Err(error) => return abort(run, format!("{error:#}")),
            };

            let (content, calls) = match turn {
                AgentTurn::Final(answer) => {
                    let mut report = ExecutionReport::succeeded(AUTONOMOUS_SUCCESS_MESSAGE);
                    report.output = Some(answer);
                    return AutonomousOutcome::Completed(run.into_report(report));
                }
                AgentTurn::ToolCalls { content, calls } => (content, calls),
            };

            debug!(event_name = "agent.autonomous.turn", iteration, calls = calls.len(), "model requested tools");
            messages.push(ChatMessage::assistant_tool_calls(content, calls.clone()));

            for call in calls {
                let input = call.input();
                let observation = self.invoke(&call.function.name, &input, &mut run).await;
                run.steps.push(AgentStep {
                    tool: call.function.name.clone(),
                    input,
                    output: observation.clone(),
                });
                messages.push(ChatMessage::tool_result(call.id, observation));
            }
        }

        abort(run, format!("agent stopped after {} iterations without a final answer", self.max_iterations))
    }

    /// Runs one tool and returns what the model should see. Failures are
    /// observations too; the model decides what to do next.
    async fn invoke(&self, name: &str, input: &str, run: &mut Run) -> String {
        let Some(tool) = self.tools.get(name) else {
            return format!("Unknown tool `{name}`. Available tools: {}", self.tools.names().join(", "));
        };

        if tool.mutates() {
            run.committed = true;
        }

        match tool.execute(input).await {
            Ok(output) => {
                if let Some(record) = output.record {
                    run.records.push(record);
                }
                output.observation
            }
            Err(error) => {
                warn!(event_name = "agent.autonomous.tool_failed", tool = name, error = %format!("{error:#}"), "tool call failed");
                format!("Error: {error:#}")
            }
        }
    }
}

fn abort(run: Run, reason: String) -> AutonomousOutcome {
    if !run.committed {
        return AutonomousOutcome::FallBack { reason };
    }

    warn!(
        event_name = "agent.autonomous.failed_after_mutation",
        reason = %reason,
        steps = run.steps.len(),
        "autonomous run failed after mutating the workspace; not falling back"
    );
    let report = ExecutionReport::failed(format!("Error processing request: {reason}"));
    AutonomousOutcome::Failed(run.into_report(report))
}
