use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use boardpilot_core::config::LlmConfig;

const APP_TITLE: &str = "Boardpilot";

#[async_trait]
pub trait LlmClient: Send + Sync {
    fn model(&self) -> &str;

    async fn complete(&self, system_prompt: Option<&str>, prompt: &str) -> Result<String>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Raw JSON text, as produced by the model.
    #[serde(default)]
    pub arguments: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: function_kind(),
            function: FunctionCall { name: name.into(), arguments: arguments.into() },
        }
    }

    /// The single string argument every tool takes. Models usually wrap it
    /// as `{"input": "..."}`; anything else is passed through verbatim.
    pub fn input(&self) -> String {
        match serde_json::from_str::<Value>(&self.function.arguments) {
            Ok(Value::Object(arguments)) => match arguments.get("input") {
                Some(Value::String(input)) => input.clone(),
                Some(other) => other.to_string(),
                None => self.function.arguments.clone(),
            },
            _ => self.function.arguments.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: Some(content.into()), tool_calls: Vec::new(), tool_call_id: None }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self { role: Role::Assistant, content, tool_calls, tool_call_id: None }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    fn wire(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AgentTurn {
    ToolCalls { content: Option<String>, calls: Vec<ToolCall> },
    Final(String),
}

/// A model session that can pick tools. `prepare` runs once before the first
/// turn and is where a client rejects a configuration it cannot serve.
#[async_trait]
pub trait ToolCallingClient: Send + Sync {
    async fn prepare(&self, _tools: &[ToolDefinition]) -> Result<()> {
        Ok(())
    }

    async fn next_turn(&self, messages: &[ChatMessage], tools: &[ToolDefinition])
        -> Result<AgentTurn>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    error: Option<ProviderError>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    message: String,
}

/// OpenAI-compatible chat completions client, pointed at OpenRouter by
/// default.
pub struct OpenRouterClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenRouterClient {
    pub fn new(config: &LlmConfig, model: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build LLM HTTP client")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: model.into(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    pub fn primary(config: &LlmConfig) -> Result<Self> {
        Self::new(config, config.model.clone())
    }

    pub fn fallback(config: &LlmConfig) -> Result<Option<Self>> {
        config.fallback_model.as_ref().map(|model| Self::new(config, model.clone())).transpose()
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatChoiceMessage> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: tools.iter().map(ToolDefinition::wire).collect(),
            tool_choice: (!tools.is_empty()).then_some("auto"),
        };

        debug!(event_name = "llm.request.start", model = %self.model, "sending chat completion");

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .header("X-Title", APP_TITLE)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("chat completion request to `{}` failed", self.model))?;

        let status = response.status();
        let body = response.text().await.context("failed to read chat completion body")?;
        let parsed: ChatResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                bail!("model `{}` returned HTTP {}: {}", self.model, status.as_u16(), body)
            }
            Err(error) => {
                return Err(anyhow!(error).context("chat completion response was not valid JSON"))
            }
        };

        if let Some(error) = parsed.error {
            bail!("model `{}` returned an error: {}", self.model, error.message);
        }
        if !status.is_success() {
            bail!("model `{}` returned HTTP {}", self.model, status.as_u16());
        }

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| anyhow!("model `{}` returned no choices", self.model))
    }
}

#[async_trait]
impl LlmClient for OpenRouterClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system_prompt: Option<&str>, prompt: &str) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system_prompt) = system_prompt {
            messages.push(ChatMessage::system(system_prompt));
        }
        messages.push(ChatMessage::user(prompt));

        let message = self.chat(&messages, &[]).await?;
        message.content.ok_or_else(|| anyhow!("model `{}` returned an empty message", self.model))
    }
}

#[async_trait]
impl ToolCallingClient for OpenRouterClient {
    async fn prepare(&self, tools: &[ToolDefinition]) -> Result<()> {
        if self.api_key.expose_secret().trim().is_empty() {
            bail!("no API key configured for model `{}`", self.model);
        }
        if tools.is_empty() {
            bail!("tool-calling session needs at least one tool");
        }
        Ok(())
    }

    async fn next_turn(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<AgentTurn> {
        let message = self.chat(messages, tools).await?;
        if message.tool_calls.is_empty() {
            let answer = message.content.unwrap_or_default();
            Ok(AgentTurn::Final(answer))
        } else {
            Ok(AgentTurn::ToolCalls { content: message.content, calls: message.tool_calls })
        }
    }
}
