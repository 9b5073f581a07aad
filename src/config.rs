//! TOML configuration: load, validate, and redact.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::ollama::ModelOptions;

fn default_true() -> bool {
    true
}

fn default_api_url() -> String {
    "http://localhost:11434/api".to_string()
}

fn default_prompt() -> Vec<String> {
    vec!["you are ".to_string(), ".".to_string()]
}

fn default_history_size() -> usize {
    24
}

fn default_timeout_secs() -> u64 {
    180
}

fn default_max_tool_rounds() -> usize {
    8
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Render replies as HTML from Markdown.
    #[serde(default = "default_true")]
    pub markdown: bool,
    pub matrix: MatrixConfig,
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixConfig {
    /// Homeserver base URL, e.g. "https://matrix.org".
    pub server: String,
    pub username: String,
    pub password: String,
    /// Rooms to join at startup (aliases or room IDs).
    #[serde(default)]
    pub channels: Vec<String>,
    /// Admin display names. The first entry is the owner.
    #[serde(default)]
    pub admins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    pub default_model: String,
    /// Friendly name -> full model tag. Empty means the default model only.
    #[serde(default)]
    pub models: BTreeMap<String, String>,
    /// Default personality inserted into the prompt template.
    pub personality: String,
    /// System prompt template: [prefix, suffix] or [prefix, suffix, extra].
    /// The extra clause is dropped in verbose mode.
    #[serde(default = "default_prompt")]
    pub prompt: Vec<String>,
    /// Sliding transcript window, system turn included.
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Ceiling on tool-call rounds within one completion.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub options: ModelOptions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Provider name -> base URL of an HTTP tool server.
    #[serde(default)]
    pub servers: BTreeMap<String, String>,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<AppConfig> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: AppConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn prompt_prefix(&self) -> &str {
        self.ollama.prompt.first().map(String::as_str).unwrap_or("")
    }

    pub fn prompt_suffix(&self) -> &str {
        self.ollama.prompt.get(1).map(String::as_str).unwrap_or("")
    }

    pub fn prompt_extra(&self) -> &str {
        self.ollama.prompt.get(2).map(String::as_str).unwrap_or("")
    }

    /// Collect every problem instead of stopping at the first, so a broken
    /// config is fixable in one pass.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let http_re = Regex::new(r"(?i)^https?://").unwrap();

        if !http_re.is_match(&self.matrix.server) {
            problems.push(format!(
                "matrix.server must be an http(s) URL, got '{}'",
                self.matrix.server
            ));
        }
        if self.matrix.username.is_empty() {
            problems.push("matrix.username must not be empty".to_string());
        }
        if self.matrix.password.is_empty() {
            problems.push("matrix.password must not be empty".to_string());
        }
        if self.matrix.channels.is_empty() {
            problems.push("matrix.channels must list at least one room".to_string());
        }
        for channel in &self.matrix.channels {
            if !channel.starts_with('#') && !channel.starts_with('!') {
                problems.push(format!(
                    "matrix channel '{channel}' must start with '#' (alias) or '!' (room ID)"
                ));
            }
        }

        if !http_re.is_match(&self.ollama.api_url) {
            problems.push(format!(
                "ollama.api_url must be an http(s) URL, got '{}'",
                self.ollama.api_url
            ));
        }
        if self.ollama.default_model.is_empty() {
            problems.push("ollama.default_model must not be empty".to_string());
        } else if !self.ollama.models.is_empty()
            && !self.ollama.models.contains_key(&self.ollama.default_model)
            && !self
                .ollama
                .models
                .values()
                .any(|tag| tag == &self.ollama.default_model)
        {
            problems.push(format!(
                "ollama.default_model '{}' is not in ollama.models",
                self.ollama.default_model
            ));
        }
        if self.ollama.personality.is_empty() {
            problems.push("ollama.personality must not be empty".to_string());
        }
        if !(2..=3).contains(&self.ollama.prompt.len()) {
            problems.push(format!(
                "ollama.prompt must have 2 or 3 parts, got {}",
                self.ollama.prompt.len()
            ));
        }
        if !(2..=1000).contains(&self.ollama.history_size) {
            problems.push(format!(
                "ollama.history_size must be in 2..=1000, got {}",
                self.ollama.history_size
            ));
        }
        if self.ollama.max_tool_rounds == 0 {
            problems.push("ollama.max_tool_rounds must be at least 1".to_string());
        }

        if let Some(t) = self.ollama.options.temperature {
            if !(0.0..=2.0).contains(&t) {
                problems.push(format!("ollama.options.temperature must be in 0..=2, got {t}"));
            }
        }
        if let Some(p) = self.ollama.options.top_p {
            if !(p > 0.0 && p <= 1.0) {
                problems.push(format!("ollama.options.top_p must be in (0, 1], got {p}"));
            }
        }
        if let Some(r) = self.ollama.options.repeat_penalty {
            if !(0.5..=2.0).contains(&r) {
                problems.push(format!(
                    "ollama.options.repeat_penalty must be in 0.5..=2, got {r}"
                ));
            }
        }

        for (name, url) in &self.tools.servers {
            if !http_re.is_match(url) {
                problems.push(format!(
                    "tools.servers.{name} must be an http(s) URL, got '{url}'"
                ));
            }
        }

        problems
    }

    /// Copy with credentials masked, safe to log or print.
    pub fn redacted(&self) -> AppConfig {
        let mut config = self.clone();
        config.matrix.password = "***".to_string();
        if let Some((_, domain)) = config.matrix.username.split_once(':') {
            config.matrix.username = format!("***:{domain}");
        } else {
            config.matrix.username = "***".to_string();
        }
        config
    }

    /// Pretty-printed redacted config for `--dry-run`.
    pub fn summary(&self) -> String {
        toml::to_string_pretty(&self.redacted()).unwrap_or_else(|_| "<unprintable>".to_string())
    }
}
