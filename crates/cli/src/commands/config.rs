use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use boardpilot_core::config::{AppConfig, LoadOptions, DEFAULT_CONFIG_FILE};
use toml::Value;

/// Alternate variable names also read for a field, keyed by field path.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("monday.api_key", "MONDAY_API_KEY"),
    ("llm.api_key", "OPENROUTER_API_KEY"),
    ("llm.model", "OPENROUTER_MODEL"),
    ("server.port", "PORT"),
    ("logging.level", "BOARDPILOT_LOG_LEVEL"),
    ("logging.format", "BOARDPILOT_LOG_FORMAT"),
];

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: override > env > file > default):".to_string()];

    let redacted = config.redacted();
    let sections = redacted.as_object().into_iter().flat_map(|sections| sections.iter());
    for (section, fields) in sections {
        let Some(fields) = fields.as_object() else {
            continue;
        };
        for (field, value) in fields {
            let key_path = format!("{section}.{field}");
            let rendered = match value {
                serde_json::Value::String(text) => text.clone(),
                serde_json::Value::Null => "<unset>".to_string(),
                other => other.to_string(),
            };
            lines.push(render_line(
                &key_path,
                &rendered,
                field_source(&key_path, config_file_doc.as_ref(), config_file_path.as_deref()),
            ));
        }
    }

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn env_keys(key_path: &str) -> Vec<String> {
    let mut keys = vec![format!("BOARDPILOT_{}", key_path.replace('.', "_").to_ascii_uppercase())];
    keys.extend(
        LEGACY_ENV
            .iter()
            .filter(|(path, _)| *path == key_path)
            .map(|(_, legacy)| legacy.to_string()),
    );
    keys
}

fn field_source(
    key_path: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys(key_path).into_iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
