//! HTTP client for the Ollama chat API, plus the chat wire types shared by
//! the transcript store and the tool-call loop.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use crate::tools::ToolDef;

/// Role of a conversational turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single chat turn in the Ollama/OpenAI message format.
///
/// `tool_calls` is only ever present on assistant turns that request tool
/// execution; `tool_call_id` correlates a tool-result turn back to the
/// request that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default, deserialize_with = "null_to_empty")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn tool(content: impl Into<String>, tool_call_id: Option<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id,
        }
    }

    pub fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

/// Some models emit `"content": null` alongside tool calls.
fn null_to_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// A model-issued request to execute a named function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub function: FunctionCall,
}

/// Ollama sends `arguments` as a JSON object; OpenAI-compatible servers may
/// send a JSON-encoded string instead. Kept as a raw value and normalized in
/// the tool loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// Model sampling options forwarded verbatim to the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_penalty: Option<f64>,
}

impl ModelOptions {
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.top_p.is_none() && self.repeat_penalty.is_none()
    }
}

/// One outbound completion request, tool schema included.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub options: ModelOptions,
    pub tools: Vec<ToolDef>,
    pub tool_choice: Option<String>,
}

impl ChatRequest {
    /// Plain completion with no tool schema attached.
    pub fn plain(model: &str, messages: Vec<ChatMessage>, options: ModelOptions) -> Self {
        Self {
            model: model.to_string(),
            messages,
            options,
            tools: Vec::new(),
            tool_choice: None,
        }
    }
}

/// The inference backend as seen by handlers and the tool loop.
///
/// The reply is either a final assistant message or one carrying
/// `tool_calls`; any transport or protocol failure surfaces as `Err`.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatMessage>;
}

#[derive(Serialize)]
struct ChatPayload<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<&'a ModelOptions>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    tools: &'a [ToolDef],
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'a str>,
}

#[derive(Deserialize)]
struct ChatEnvelope {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

/// Client for the Ollama HTTP API (`/chat`, `/tags`).
#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to build Ollama HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Best-effort reachability probe against `/tags`.
    pub async fn health(&self) -> bool {
        let url = format!("{}/tags", self.base_url);
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Fetch the model names known to the server, keyed by themselves.
    pub async fn list_models(&self) -> Result<BTreeMap<String, String>> {
        let url = format!("{}/tags", self.base_url);
        let resp = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .context("Failed to reach Ollama /tags")?;
        if !resp.status().is_success() {
            anyhow::bail!("Ollama /tags returned {}", resp.status());
        }
        let tags: TagsResponse = resp.json().await.context("Invalid JSON from Ollama /tags")?;

        let mut models = BTreeMap::new();
        for item in tags.models {
            if let Some(name) = item.name.or(item.model).filter(|n| !n.is_empty()) {
                models.insert(name.clone(), name);
            }
        }
        if models.is_empty() {
            anyhow::bail!("No models found in Ollama /tags response");
        }
        Ok(models)
    }
}

#[async_trait]
impl ChatBackend for OllamaClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatMessage> {
        let url = format!("{}/chat", self.base_url);
        let payload = ChatPayload {
            model: &request.model,
            messages: &request.messages,
            stream: false,
            options: (!request.options.is_empty()).then_some(&request.options),
            tools: &request.tools,
            tool_choice: request.tool_choice.as_deref(),
        };

        let resp = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .context("Failed to send chat request")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read body".to_string());
            anyhow::bail!("Ollama API returned error {}: {}", status, body);
        }

        let envelope: ChatEnvelope = resp.json().await.context("Failed to parse chat response")?;
        Ok(envelope.message)
    }
}
