use boardpilot_core::domain::plan::ResourceType;
use serde_json::json;

use crate::commands::{async_runtime, load_memory_config, open_memory, CommandResult, EXIT_MEMORY, EXIT_USAGE};

const COMMAND: &str = "memory";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemoryQuery {
    Conversations { limit: usize },
    Creations { limit: usize },
    Resources { resource_type: String },
    Clear,
}

pub fn run(query: MemoryQuery) -> CommandResult {
    let resource_type = match &query {
        MemoryQuery::Resources { resource_type } => match ResourceType::parse(resource_type) {
            Some(parsed) => Some(parsed),
            None => {
                return CommandResult::failure(
                    COMMAND,
                    "invalid_argument",
                    format!("Unknown resource type: {resource_type}"),
                    EXIT_USAGE,
                )
            }
        },
        _ => None,
    };

    let config = match load_memory_config(COMMAND) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match async_runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    runtime.block_on(async {
        let memory = open_memory(&config).await;
        match (query, resource_type) {
            (MemoryQuery::Conversations { limit }, _) => {
                let conversations = memory.get_recent_conversations(limit).await;
                CommandResult::success_with(
                    COMMAND,
                    format!("{} conversations", conversations.len()),
                    Some(json!({ "conversations": conversations })),
                )
            }
            (MemoryQuery::Creations { limit }, _) => {
                let creations = memory.get_recent_creations(limit).await;
                CommandResult::success_with(
                    COMMAND,
                    format!("{} recent creations", creations.len()),
                    Some(json!({ "creations": creations })),
                )
            }
            (MemoryQuery::Resources { .. }, Some(resource_type)) => {
                let resources = memory.get_resources(resource_type).await;
                CommandResult::success_with(
                    COMMAND,
                    format!("{} {resource_type} resources", resources.len()),
                    Some(json!({ "resources": resources })),
                )
            }
            (MemoryQuery::Resources { resource_type, .. }, None) => CommandResult::failure(
                COMMAND,
                "invalid_argument",
                format!("Unknown resource type: {resource_type}"),
                EXIT_USAGE,
            ),
            (MemoryQuery::Clear, _) => match memory.clear_memory().await {
                Ok(()) => CommandResult::success(COMMAND, "Memory cleared successfully"),
                Err(error) => {
                    CommandResult::failure(COMMAND, "memory_write", error.to_string(), EXIT_MEMORY)
                }
            },
        }
    })
}
