//! Request pipeline for Boardpilot.
//!
//! Free text becomes a [`Plan`](boardpilot_core::Plan) through the
//! [`interpret`] module, which the [`dispatcher`] executes against a
//! [`ResourceApi`](boardpilot_core::ResourceApi). The [`autonomous`] executor
//! is the tool-calling alternative and falls back to the dispatcher as long
//! as it has not mutated anything. Every outcome is recorded in the
//! [`MemoryStore`](boardpilot_db::MemoryStore).

pub mod autonomous;
pub mod dispatcher;
pub mod interpret;
pub mod llm;
pub mod runtime;
pub mod tools;

pub use autonomous::{AutonomousExecutor, AutonomousOutcome};
pub use dispatcher::PlanDispatcher;
pub use interpret::{InterpretationError, StructuredInterpreter};
pub use llm::{LlmClient, OpenRouterClient, ToolCallingClient};
pub use runtime::{AgentRuntime, Strategy};
pub use tools::{Tool, ToolRegistry};
