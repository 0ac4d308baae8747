use std::sync::Arc;

use anyhow::Result;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use boardpilot_core::config::AppConfig;
use boardpilot_core::domain::plan::Plan;
use boardpilot_core::domain::report::ExecutionReport;
use boardpilot_core::workspace::ResourceApi;
use boardpilot_db::MemoryStore;

use crate::autonomous::{AutonomousExecutor, AutonomousOutcome};
use crate::dispatcher::{record_outcome, PlanDispatcher};
use crate::interpret::{with_context, StructuredInterpreter};
use crate::llm::{LlmClient, OpenRouterClient, ToolCallingClient};
use crate::tools::ToolRegistry;

pub const DEFAULT_CONTEXT_LIMIT: usize = 5;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Strategy {
    #[default]
    Dispatcher,
    Autonomous,
}

/// Entry point for natural-language requests. Every call yields a report
/// and leaves a conversation in memory.
pub struct AgentRuntime {
    interpreter: StructuredInterpreter,
    dispatcher: PlanDispatcher,
    autonomous: Option<AutonomousExecutor>,
    memory: Arc<MemoryStore>,
    context_limit: usize,
}

impl AgentRuntime {
    pub fn new(
        interpreter: StructuredInterpreter,
        api: Arc<dyn ResourceApi>,
        memory: Arc<MemoryStore>,
    ) -> Self {
        Self {
            interpreter,
            dispatcher: PlanDispatcher::new(api, Arc::clone(&memory)),
            autonomous: None,
            memory,
            context_limit: DEFAULT_CONTEXT_LIMIT,
        }
    }

    pub fn with_autonomous(mut self, executor: AutonomousExecutor) -> Self {
        self.autonomous = Some(executor);
        self
    }

    pub fn with_context_limit(mut self, context_limit: usize) -> Self {
        self.context_limit = context_limit;
        self
    }

    /// Wires OpenRouter clients for interpretation and, when enabled, the
    /// autonomous session over the standard tool set.
    pub fn from_config(
        config: &AppConfig,
        api: Arc<dyn ResourceApi>,
        memory: Arc<MemoryStore>,
    ) -> Result<Self> {
        let primary = Arc::new(OpenRouterClient::primary(&config.llm)?);
        let fallback = OpenRouterClient::fallback(&config.llm)?
            .map(|client| Arc::new(client) as Arc<dyn LlmClient>);
        let interpreter = StructuredInterpreter::new(primary.clone(), fallback);

        let mut runtime = Self::new(interpreter, Arc::clone(&api), memory)
            .with_context_limit(config.agent.context_limit);
        if config.agent.autonomous_enabled {
            let client: Arc<dyn ToolCallingClient> = primary;
            runtime = runtime.with_autonomous(AutonomousExecutor::new(
                client,
                ToolRegistry::standard(api),
                config.agent.max_iterations,
            ));
        }
        Ok(runtime)
    }

    pub fn memory(&self) -> &Arc<MemoryStore> {
        &self.memory
    }

    pub fn api(&self) -> &Arc<dyn ResourceApi> {
        self.dispatcher.api()
    }

    pub fn autonomous_enabled(&self) -> bool {
        self.autonomous.is_some()
    }

    /// Runs `user_input` through `strategy` inside a span carrying a fresh
    /// correlation id.
    pub async fn process(&self, user_input: &str, strategy: Strategy) -> ExecutionReport {
        let correlation_id = Uuid::new_v4().to_string();
        let span = info_span!("request", correlation_id = %correlation_id, strategy = ?strategy);
        async {
            let report = match strategy {
                Strategy::Dispatcher => self.process_request(user_input).await,
                Strategy::Autonomous => self.process_request_autonomous(user_input).await,
            };
            info!(
                event_name = "agent.request.completed",
                success = report.success,
                records = report.details.len(),
                failed_records = report.failed_records(),
                "request processed"
            );
            report
        }
        .instrument(span)
        .await
    }

    pub async fn process_request(&self, user_input: &str) -> ExecutionReport {
        let request = self.contextualize(user_input).await;
        match self.interpreter.interpret(&request).await {
            Ok(plan) => self.dispatcher.execute(&plan, user_input).await,
            Err(error) => {
                let mut report = ExecutionReport::failed(format!("Error processing request: {error}"));
                record_outcome(&self.memory, user_input, &mut report).await;
                report
            }
        }
    }

    /// Tool-calling path. Falls back to interpretation and dispatch when the
    /// agent is unavailable or fails before touching the workspace.
    pub async fn process_request_autonomous(&self, user_input: &str) -> ExecutionReport {
        let Some(executor) = self.autonomous.as_ref() else {
            info!(
                event_name = "agent.autonomous.fallback",
                reason = "autonomous agent disabled",
                "using plan dispatcher"
            );
            return self.process_request(user_input).await;
        };

        let request = self.contextualize(user_input).await;
        match executor.run(&request).await {
            AutonomousOutcome::Completed(mut report) | AutonomousOutcome::Failed(mut report) => {
                record_outcome(&self.memory, user_input, &mut report).await;
                report
            }
            AutonomousOutcome::FallBack { reason } => {
                info!(event_name = "agent.autonomous.fallback", reason = %reason, "using plan dispatcher");
                self.process_request(user_input).await
            }
        }
    }

    pub async fn execute(&self, plan: &Plan, user_input: &str) -> ExecutionReport {
        self.dispatcher.execute(plan, user_input).await
    }

    async fn contextualize(&self, user_input: &str) -> String {
        if self.context_limit == 0 {
            return user_input.to_string();
        }
        let creations = self.memory.get_recent_creations(self.context_limit).await;
        with_context(user_input, &creations)
    }
}
