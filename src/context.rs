//! Shared runtime state and the iterative tool-call completion loop.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::history::{trim_messages, HistoryStore};
use crate::matrix::ChatTransport;
use crate::ollama::{ChatBackend, ChatMessage, ChatRequest, ModelOptions, Role};
use crate::tools::ToolSet;

/// Everything command handlers need: transcripts, the inference backend, the
/// outbound transport, tools, and the mutable model/admin settings.
pub struct BotContext {
    pub history: HistoryStore,
    pub backend: Arc<dyn ChatBackend>,
    pub transport: Arc<dyn ChatTransport>,
    pub tools: ToolSet,
    pub models: BTreeMap<String, String>,
    pub default_model: String,
    pub model: String,
    pub default_personality: String,
    pub admins: Vec<String>,
    pub options: ModelOptions,
    pub verbose: bool,
    pub markdown: bool,
    pub bot_name: String,
    pub max_tool_rounds: usize,
    config_path: Option<PathBuf>,
}

impl BotContext {
    pub fn new(
        cfg: &AppConfig,
        backend: Arc<dyn ChatBackend>,
        transport: Arc<dyn ChatTransport>,
        tools: ToolSet,
        bot_name: String,
        config_path: Option<PathBuf>,
    ) -> Self {
        let mut history = HistoryStore::new(
            cfg.prompt_prefix(),
            cfg.prompt_suffix(),
            cfg.prompt_extra(),
            &cfg.ollama.personality,
            cfg.ollama.history_size,
        );
        history.set_verbose(cfg.ollama.verbose);

        let default_model = resolve_model(&cfg.ollama.models, &cfg.ollama.default_model);
        Self {
            history,
            backend,
            transport,
            tools,
            models: cfg.ollama.models.clone(),
            model: default_model.clone(),
            default_model,
            default_personality: cfg.ollama.personality.clone(),
            admins: cfg.matrix.admins.clone(),
            options: cfg.ollama.options.clone(),
            verbose: cfg.ollama.verbose,
            markdown: cfg.markdown,
            bot_name,
            max_tool_rounds: cfg.ollama.max_tool_rounds,
            config_path,
        }
    }

    pub fn is_owner(&self, display: &str) -> bool {
        self.admins.first().map(String::as_str) == Some(display)
    }

    /// Render a reply body as HTML, or `None` when Markdown is disabled.
    pub fn render(&self, body: &str) -> Option<String> {
        if !self.markdown {
            return None;
        }
        let parser = pulldown_cmark::Parser::new(body);
        let mut html = String::new();
        pulldown_cmark::html::push_html(&mut html, parser);
        Some(html)
    }

    /// Re-read the model catalog from the config file, best effort.
    pub fn reload_models(&mut self) {
        let Some(path) = &self.config_path else { return };
        match AppConfig::load(path) {
            Ok(cfg) => self.models = cfg.ollama.models,
            Err(e) => warn!("Could not reload model catalog: {e:#}"),
        }
    }

    async fn chat_round(&self, messages: &[ChatMessage], tool_choice: &str) -> Option<ChatMessage> {
        let request = if self.tools.is_empty() {
            ChatRequest::plain(&self.model, messages.to_vec(), self.options.clone())
        } else {
            ChatRequest {
                model: self.model.clone(),
                messages: messages.to_vec(),
                options: self.options.clone(),
                tools: self.tools.schema().to_vec(),
                tool_choice: Some(tool_choice.to_string()),
            }
        };
        match self.backend.chat(&request).await {
            Ok(reply) => Some(reply),
            Err(e) => {
                error!("Chat request failed: {e:#}");
                None
            }
        }
    }

    /// Run one completion, executing tool calls until the model settles on a
    /// final answer or the round ceiling is hit.
    ///
    /// Appends the intermediate assistant/tool turns and the final assistant
    /// turn to `messages`, then prunes tool traffic so transcripts only carry
    /// plain conversation. Returns the final content, or an empty string when
    /// the backend fails.
    pub async fn respond_with_tools(
        &self,
        messages: &mut Vec<ChatMessage>,
        tool_choice: &str,
    ) -> String {
        let Some(mut reply) = self.chat_round(messages, tool_choice).await else {
            return String::new();
        };

        let mut rounds = 0;
        while rounds < self.max_tool_rounds {
            if reply.tool_calls.is_empty() {
                break;
            }
            rounds += 1;
            info!(
                "Tool round {}/{}: {} call(s)",
                rounds,
                self.max_tool_rounds,
                reply.tool_calls.len()
            );

            let calls = reply.tool_calls.clone();
            messages.push(reply);
            for call in calls {
                let args = parse_tool_arguments(&call.function.arguments, &call.function.name);
                let result = self.tools.execute(&call.function.name, &args).await;
                messages.push(ChatMessage::tool(result, call.id.clone()));
            }

            let Some(next) = self.chat_round(messages, tool_choice).await else {
                return String::new();
            };
            reply = next;
        }
        if !reply.tool_calls.is_empty() {
            warn!(
                "Model still requesting tools after {} rounds, stopping",
                self.max_tool_rounds
            );
        }

        let content = reply.content.trim().to_string();
        messages.push(ChatMessage::assistant(content.clone()));
        prune_tool_messages(messages, self.history.max_items());
        content
    }
}

fn resolve_model(models: &BTreeMap<String, String>, name: &str) -> String {
    models.get(name).cloned().unwrap_or_else(|| name.to_string())
}

/// Normalize model-supplied tool arguments into a JSON object.
///
/// Ollama sends an object; OpenAI-compatible servers send a JSON-encoded
/// string. Anything malformed or empty becomes `{}` so the tool itself can
/// report the missing argument.
pub fn parse_tool_arguments(raw: &Value, tool_name: &str) -> Map<String, Value> {
    match raw {
        Value::Object(map) => map.clone(),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Map::new();
            }
            match serde_json::from_str::<Value>(s) {
                Ok(Value::Object(map)) => map,
                _ => {
                    warn!("Unparseable arguments for tool '{tool_name}', using empty object");
                    Map::new()
                }
            }
        }
        Value::Null => Map::new(),
        _ => {
            warn!("Non-object arguments for tool '{tool_name}', using empty object");
            Map::new()
        }
    }
}

/// Drop tool-result turns and the assistant turns that requested them, then
/// trim to the transcript window.
pub fn prune_tool_messages(messages: &mut Vec<ChatMessage>, max_items: usize) {
    messages.retain(|m| m.role != Role::Tool && m.tool_calls.is_empty());
    trim_messages(messages, max_items);
}
