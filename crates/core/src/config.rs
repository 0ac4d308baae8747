use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::memory::DEFAULT_CONVERSATION_LIMIT;

pub const DEFAULT_CONFIG_FILE: &str = "boardpilot.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub monday: MondayConfig,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub memory: MemoryConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct MondayConfig {
    pub api_key: SecretString,
    pub api_url: String,
    pub timeout_secs: u64,
    /// Run against a process-local workspace instead of the remote API.
    pub sandbox: bool,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub model: String,
    pub fallback_model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub max_iterations: u32,
    pub context_limit: usize,
    pub autonomous_enabled: bool,
}

#[derive(Clone, Debug)]
pub struct MemoryConfig {
    pub path: PathBuf,
    pub max_conversations: usize,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub static_dir: Option<PathBuf>,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub monday_api_key: Option<String>,
    pub monday_sandbox: Option<bool>,
    pub llm_api_key: Option<String>,
    pub llm_model: Option<String>,
    pub memory_path: Option<PathBuf>,
    pub server_port: Option<u16>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            monday: MondayConfig {
                api_key: String::new().into(),
                api_url: "https://api.monday.com/v2".to_string(),
                timeout_secs: 30,
                sandbox: false,
            },
            llm: LlmConfig {
                api_key: String::new().into(),
                base_url: "https://openrouter.ai/api/v1".to_string(),
                model: "google/gemma-7b-it".to_string(),
                fallback_model: Some("anthropic/claude-3-haiku-20240307".to_string()),
                temperature: 0.2,
                max_tokens: 1500,
                timeout_secs: 60,
            },
            agent: AgentConfig { max_iterations: 5, context_limit: 5, autonomous_enabled: true },
            memory: MemoryConfig {
                path: PathBuf::from("memory.json"),
                max_conversations: DEFAULT_CONVERSATION_LIMIT,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 3000,
                static_dir: None,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

/// An empty fallback model disables the secondary provider.
fn fallback_model(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let config = Self::layered(options)?;
        config.validate()?;
        Ok(config)
    }

    /// Layers config like [`AppConfig::load`] but validates only the memory
    /// section. Memory inspection needs no credentials.
    pub fn load_memory_section(options: LoadOptions) -> Result<Self, ConfigError> {
        let config = Self::layered(options)?;
        validate_memory(&config.memory)?;
        Ok(config)
    }

    fn layered(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(monday) = patch.monday {
            if let Some(api_key) = monday.api_key {
                self.monday.api_key = secret_value(api_key);
            }
            if let Some(api_url) = monday.api_url {
                self.monday.api_url = api_url;
            }
            if let Some(timeout_secs) = monday.timeout_secs {
                self.monday.timeout_secs = timeout_secs;
            }
            if let Some(sandbox) = monday.sandbox {
                self.monday.sandbox = sandbox;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = secret_value(api_key);
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(model) = llm.fallback_model {
                self.llm.fallback_model = fallback_model(model);
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(max_iterations) = agent.max_iterations {
                self.agent.max_iterations = max_iterations;
            }
            if let Some(context_limit) = agent.context_limit {
                self.agent.context_limit = context_limit;
            }
            if let Some(autonomous_enabled) = agent.autonomous_enabled {
                self.agent.autonomous_enabled = autonomous_enabled;
            }
        }

        if let Some(memory) = patch.memory {
            if let Some(path) = memory.path {
                self.memory.path = path;
            }
            if let Some(max_conversations) = memory.max_conversations {
                self.memory.max_conversations = max_conversations;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(static_dir) = server.static_dir {
                self.server.static_dir = Some(static_dir);
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let monday_key = read_env("BOARDPILOT_MONDAY_API_KEY").or_else(|| read_env("MONDAY_API_KEY"));
        if let Some(value) = monday_key {
            self.monday.api_key = secret_value(value);
        }
        if let Some(value) = read_env("BOARDPILOT_MONDAY_API_URL") {
            self.monday.api_url = value;
        }
        if let Some(value) = read_env("BOARDPILOT_MONDAY_TIMEOUT_SECS") {
            self.monday.timeout_secs = parse_u64("BOARDPILOT_MONDAY_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("BOARDPILOT_MONDAY_SANDBOX") {
            self.monday.sandbox = parse_bool("BOARDPILOT_MONDAY_SANDBOX", &value)?;
        }

        let llm_key = read_env("BOARDPILOT_LLM_API_KEY").or_else(|| read_env("OPENROUTER_API_KEY"));
        if let Some(value) = llm_key {
            self.llm.api_key = secret_value(value);
        }
        if let Some(value) = read_env("BOARDPILOT_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        let llm_model = read_env("BOARDPILOT_LLM_MODEL").or_else(|| read_env("OPENROUTER_MODEL"));
        if let Some(value) = llm_model {
            self.llm.model = value;
        }
        if let Ok(value) = env::var("BOARDPILOT_LLM_FALLBACK_MODEL") {
            self.llm.fallback_model = fallback_model(value);
        }
        if let Some(value) = read_env("BOARDPILOT_LLM_TEMPERATURE") {
            self.llm.temperature = parse_f32("BOARDPILOT_LLM_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("BOARDPILOT_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_u32("BOARDPILOT_LLM_MAX_TOKENS", &value)?;
        }
        if let Some(value) = read_env("BOARDPILOT_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("BOARDPILOT_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("BOARDPILOT_AGENT_MAX_ITERATIONS") {
            self.agent.max_iterations = parse_u32("BOARDPILOT_AGENT_MAX_ITERATIONS", &value)?;
        }
        if let Some(value) = read_env("BOARDPILOT_AGENT_CONTEXT_LIMIT") {
            self.agent.context_limit = parse_usize("BOARDPILOT_AGENT_CONTEXT_LIMIT", &value)?;
        }
        if let Some(value) = read_env("BOARDPILOT_AGENT_AUTONOMOUS_ENABLED") {
            self.agent.autonomous_enabled =
                parse_bool("BOARDPILOT_AGENT_AUTONOMOUS_ENABLED", &value)?;
        }

        if let Some(value) = read_env("BOARDPILOT_MEMORY_PATH") {
            self.memory.path = PathBuf::from(value);
        }
        if let Some(value) = read_env("BOARDPILOT_MEMORY_MAX_CONVERSATIONS") {
            self.memory.max_conversations =
                parse_usize("BOARDPILOT_MEMORY_MAX_CONVERSATIONS", &value)?;
        }

        if let Some(value) = read_env("BOARDPILOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("BOARDPILOT_SERVER_PORT") {
            self.server.port = parse_u16("BOARDPILOT_SERVER_PORT", &value)?;
        } else if let Some(value) = read_env("PORT") {
            self.server.port = parse_u16("PORT", &value)?;
        }
        if let Some(value) = read_env("BOARDPILOT_SERVER_STATIC_DIR") {
            self.server.static_dir = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("BOARDPILOT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("BOARDPILOT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("BOARDPILOT_LOGGING_LEVEL").or_else(|| read_env("BOARDPILOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("BOARDPILOT_LOGGING_FORMAT").or_else(|| read_env("BOARDPILOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(api_key) = overrides.monday_api_key {
            self.monday.api_key = secret_value(api_key);
        }
        if let Some(sandbox) = overrides.monday_sandbox {
            self.monday.sandbox = sandbox;
        }
        if let Some(api_key) = overrides.llm_api_key {
            self.llm.api_key = secret_value(api_key);
        }
        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
        if let Some(path) = overrides.memory_path {
            self.memory.path = path;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_monday(&self.monday)?;
        validate_llm(&self.llm)?;
        validate_agent(&self.agent)?;
        validate_memory(&self.memory)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }

    /// Effective configuration as TOML-shaped JSON with secrets replaced by a
    /// presence marker.
    pub fn redacted(&self) -> serde_json::Value {
        let marker = |secret: &SecretString| {
            if secret.expose_secret().trim().is_empty() {
                "<unset>"
            } else {
                "<redacted>"
            }
        };

        serde_json::json!({
            "monday": {
                "api_key": marker(&self.monday.api_key),
                "api_url": self.monday.api_url,
                "timeout_secs": self.monday.timeout_secs,
                "sandbox": self.monday.sandbox,
            },
            "llm": {
                "api_key": marker(&self.llm.api_key),
                "base_url": self.llm.base_url,
                "model": self.llm.model,
                "fallback_model": self.llm.fallback_model,
                "temperature": self.llm.temperature,
                "max_tokens": self.llm.max_tokens,
                "timeout_secs": self.llm.timeout_secs,
            },
            "agent": {
                "max_iterations": self.agent.max_iterations,
                "context_limit": self.agent.context_limit,
                "autonomous_enabled": self.agent.autonomous_enabled,
            },
            "memory": {
                "path": self.memory.path.display().to_string(),
                "max_conversations": self.memory.max_conversations,
            },
            "server": {
                "bind_address": self.server.bind_address,
                "port": self.server.port,
                "static_dir": self.server.static_dir.as_ref().map(|dir| dir.display().to_string()),
                "graceful_shutdown_secs": self.server.graceful_shutdown_secs,
            },
            "logging": {
                "level": self.logging.level,
                "format": self.logging.format.as_str(),
            },
        })
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!("{field} must start with http:// or https://")))
    }
}

fn validate_monday(monday: &MondayConfig) -> Result<(), ConfigError> {
    if !monday.sandbox && monday.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "monday.api_key is required. Create a personal API token under Profile > Developers > My Access Tokens, or set monday.sandbox = true".to_string(),
        ));
    }

    validate_http_url("monday.api_url", monday.api_url.trim())?;

    if monday.timeout_secs == 0 || monday.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "monday.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "llm.api_key is required. Get it from https://openrouter.ai/keys".to_string(),
        ));
    }

    validate_http_url("llm.base_url", llm.base_url.trim())?;

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation(
            "llm.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }

    if llm.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "llm.max_tokens must be greater than zero".to_string(),
        ));
    }

    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.max_iterations == 0 {
        return Err(ConfigError::Validation(
            "agent.max_iterations must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_memory(memory: &MemoryConfig) -> Result<(), ConfigError> {
    if memory.path.as_os_str().is_empty() {
        return Err(ConfigError::Validation("memory.path must not be empty".to_string()));
    }

    if memory.max_conversations == 0 {
        return Err(ConfigError::Validation(
            "memory.max_conversations must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse::<usize>().map_err(|_| invalid_override(key, value))
}

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.trim().parse::<f32>().map_err(|_| invalid_override(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.trim().parse::<bool>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    monday: Option<MondayPatch>,
    llm: Option<LlmPatch>,
    agent: Option<AgentPatch>,
    memory: Option<MemoryPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct MondayPatch {
    api_key: Option<String>,
    api_url: Option<String>,
    timeout_secs: Option<u64>,
    sandbox: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    fallback_model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    max_iterations: Option<u32>,
    context_limit: Option<usize>,
    autonomous_enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct MemoryPatch {
    path: Option<PathBuf>,
    max_conversations: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    static_dir: Option<PathBuf>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
