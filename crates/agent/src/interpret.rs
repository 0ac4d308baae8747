use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use boardpilot_core::domain::memory::RecentCreation;
use boardpilot_core::domain::plan::{plan_schema, Plan, COLUMN_TYPES};

use crate::llm::LlmClient;

pub const SYSTEM_PROMPT: &str = "You are an AI assistant that helps create resources in monday.com.
Your job is to analyze user requests and convert them into structured actions.
Be precise and focus on extracting the exact details needed to fulfill the request.";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterpretationError {
    #[error("model provider call failed: {0}")]
    Provider(String),
    #[error("Failed to generate a valid structured response: {0}")]
    NoConformingOutput(String),
}

pub fn plan_prompt(request: &str) -> String {
    let column_types =
        COLUMN_TYPES.iter().map(|kind| format!("\"{kind}\"")).collect::<Vec<_>>().join(", ");
    format!(
        "Analyze the following request and break it down into specific actions:\n\n\
         User request: \"{request}\"\n\n\
         Extract the information needed to create resources in monday.com.\n\
         Determine what type of resource needs to be created (board, item, column, group, etc.) \
         and what attributes it needs.\n\n\
         For column types, use one of: {column_types}."
    )
}

/// Appends the schema and the answer-only-with-JSON instruction to `prompt`.
pub fn structured_prompt(prompt: &str, schema: &Value) -> String {
    let schema = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    format!(
        "{prompt}\n\nYou MUST respond with a valid JSON object that conforms to the following schema:\n\
         {schema}\n\n\
         Do not include any explanations or notes outside the JSON. Only respond with the JSON object."
    )
}

/// Renders recent creations as the hint block appended to a request, or
/// `None` when there is nothing to mention.
pub fn render_context(creations: &[RecentCreation]) -> Option<String> {
    if creations.is_empty() {
        return None;
    }

    let lines = creations
        .iter()
        .map(|creation| {
            format!(
                "- {}: \"{}\" (id: {})",
                creation.resource_type,
                creation.name.as_deref().unwrap_or_default(),
                creation.id.as_deref().unwrap_or_default()
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    Some(format!(
        "\nRecently created resources:\n{lines}\n\nYou can refer to these resources in your instructions if relevant."
    ))
}

pub fn with_context(request: &str, creations: &[RecentCreation]) -> String {
    match render_context(creations) {
        Some(context) => format!("{request}\n{context}"),
        None => request.to_string(),
    }
}

/// Body of the first fenced ```json block.
fn fenced_json(text: &str) -> Option<&str> {
    let start = text.find("```json")? + "```json".len();
    let rest = &text[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim())
}

/// First balanced top-level `{...}`, skipping braces inside JSON strings.
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

/// The first candidate (fenced block, balanced object, whole text) that
/// parses as JSON.
pub fn extract_json(text: &str) -> Option<Value> {
    [fenced_json(text), balanced_object(text), Some(text.trim())]
        .into_iter()
        .flatten()
        .find_map(|candidate| serde_json::from_str::<Value>(candidate).ok())
}

/// Turns free text into schema-conforming values using a primary model and
/// an optional fallback model.
pub struct StructuredInterpreter {
    primary: Arc<dyn LlmClient>,
    fallback: Option<Arc<dyn LlmClient>>,
}

impl StructuredInterpreter {
    pub fn new(primary: Arc<dyn LlmClient>, fallback: Option<Arc<dyn LlmClient>>) -> Self {
        Self { primary, fallback }
    }

    pub async fn interpret(&self, request: &str) -> Result<Plan, InterpretationError> {
        let plan: Plan =
            self.generate_structured(&plan_prompt(request), &plan_schema(), Some(SYSTEM_PROMPT)).await?;
        info!(
            event_name = "agent.plan.generated",
            resource_type = %plan.resource_type,
            operation = %plan.operation,
            steps = plan.steps.len(),
            "interpreted request into plan"
        );
        Ok(plan)
    }

    /// Asks the primary model, then the fallback once on any failure. When
    /// both fail the primary's error is returned.
    pub async fn generate_structured<T: DeserializeOwned>(
        &self,
        prompt: &str,
        schema: &Value,
        system_prompt: Option<&str>,
    ) -> Result<T, InterpretationError> {
        let prompt = structured_prompt(prompt, schema);

        let primary_error = match attempt(self.primary.as_ref(), &prompt, system_prompt).await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };
        warn!(
            event_name = "agent.interpret.primary_failed",
            model = self.primary.model(),
            error = %primary_error,
            "primary model failed"
        );

        let Some(fallback) = self.fallback.as_ref() else {
            return Err(primary_error);
        };

        match attempt(fallback.as_ref(), &prompt, system_prompt).await {
            Ok(value) => Ok(value),
            Err(fallback_error) => {
                warn!(
                    event_name = "agent.interpret.fallback_failed",
                    model = fallback.model(),
                    error = %fallback_error,
                    "fallback model failed"
                );
                Err(primary_error)
            }
        }
    }
}

async fn attempt<T: DeserializeOwned>(
    client: &dyn LlmClient,
    prompt: &str,
    system_prompt: Option<&str>,
) -> Result<T, InterpretationError> {
    let response = client
        .complete(system_prompt, prompt)
        .await
        .map_err(|error| InterpretationError::Provider(format!("{error:#}")))?;

    let value = extract_json(&response).ok_or_else(|| {
        InterpretationError::NoConformingOutput("response contained no JSON".to_string())
    })?;

    serde_json::from_value(value)
        .map_err(|error| InterpretationError::NoConformingOutput(error.to_string()))
}
