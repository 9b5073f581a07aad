//! Callable tools exposed to the model during completions.
//!
//! Tools come from two origins: a local builtin registry and zero or more
//! remote tool providers. Each tool declares a JSON Schema for its
//! parameters, which is merged into OpenAI-format function definitions and
//! attached to chat requests. Execution never panics and never leaks errors
//! past the boundary: every failure becomes an error-shaped JSON payload the
//! model can read.

pub mod math;
pub mod remote;
pub mod text;
pub mod time;
pub mod weather;
pub mod web;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub use remote::RemoteToolProvider;

/// OpenAI-format function definition for LLM function-calling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// OpenAI-format tool definition (wraps [`FunctionDef`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDef,
}

impl ToolDef {
    pub fn function(name: &str, description: &str, parameters: Value) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: FunctionDef {
                name: name.to_string(),
                description: description.to_string(),
                parameters,
            },
        }
    }
}

/// A locally implemented capability the model can invoke mid-completion.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name used in function-calling (e.g., "calculate_expression").
    fn name(&self) -> &str;

    /// Human-readable description shown to the model.
    fn description(&self) -> &str;

    /// JSON Schema describing the tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute with already-parsed arguments. Expected failures (bad input,
    /// unavailable upstream service) should be returned as `Ok` error
    /// payloads so the model can react; `Err` is reserved for unexpected
    /// internal failures and is converted to a payload by the registry.
    async fn execute(&self, args: &Map<String, Value>) -> Result<Value>;
}

/// Registry of builtin tools, populated once at startup.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Overwrites any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        tracing::info!("Registered builtin tool: {}", name);
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// OpenAI-format definitions for all registered tools, sorted by name
    /// for a stable schema order.
    pub fn definitions(&self) -> Vec<ToolDef> {
        let mut defs: Vec<ToolDef> = self
            .tools
            .values()
            .map(|tool| {
                ToolDef::function(tool.name(), tool.description(), tool.parameters_schema())
            })
            .collect();
        defs.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        defs
    }

    /// Execute a tool call, converting every failure into a JSON payload.
    pub async fn execute(&self, name: &str, args: &Map<String, Value>) -> String {
        let Some(tool) = self.get(name) else {
            return json!({"error": format!("Unknown tool: {name}")}).to_string();
        };
        match tool.execute(args).await {
            Ok(Value::String(s)) => json!({"result": s}).to_string(),
            Ok(value) => value.to_string(),
            Err(e) => json!({"error": format!("Tool execution error for {name}: {e:#}")}).to_string(),
        }
    }
}

/// Register the builtin tool suite.
pub fn register_builtin_tools(registry: &mut ToolRegistry) {
    registry.register(Arc::new(math::CalculateExpressionTool::new()));
    registry.register(Arc::new(time::GetTimeTool::new()));
    registry.register(Arc::new(text::TextStatsTool::new()));
    registry.register(Arc::new(web::FetchUrlTool::new()));
    registry.register(Arc::new(weather::GetWeatherTool::new()));
}

/// Builtin registry and remote providers merged behind one lookup.
///
/// Remote providers win on name collision: a builtin whose name is already
/// claimed by a remote tool is dropped from the merged schema and never
/// executed locally.
pub struct ToolSet {
    registry: ToolRegistry,
    remotes: Vec<RemoteToolProvider>,
    remote_tools: HashMap<String, usize>,
    schema: Vec<ToolDef>,
}

impl ToolSet {
    /// Probe each remote provider for its schema and merge with the builtin
    /// registry. Providers that fail to answer are logged and skipped.
    pub async fn assemble(registry: ToolRegistry, remotes: Vec<RemoteToolProvider>) -> Self {
        let mut remote_schema = Vec::new();
        let mut remote_tools = HashMap::new();
        for (idx, provider) in remotes.iter().enumerate() {
            match provider.list_tools().await {
                Ok(defs) => {
                    tracing::info!(
                        "Tool provider '{}' returned {} tool(s)",
                        provider.name(),
                        defs.len()
                    );
                    for def in defs {
                        remote_tools.insert(def.function.name.clone(), idx);
                        remote_schema.push(def);
                    }
                }
                Err(e) => {
                    tracing::warn!("Skipping tool provider '{}': {e:#}", provider.name());
                }
            }
        }
        let schema = merge_schema(remote_schema, registry.definitions(), &remote_tools);
        if schema.is_empty() {
            tracing::info!("Tool calling disabled: no tools available");
        } else {
            tracing::info!(
                "Tool calling enabled with {} tools ({} remote, {} builtin)",
                schema.len(),
                remote_tools.len(),
                schema.len() - remote_tools.len()
            );
        }
        Self {
            registry,
            remotes,
            remote_tools,
            schema,
        }
    }

    /// A tool set with only builtin tools, no remote probing.
    pub fn local(registry: ToolRegistry) -> Self {
        let schema = registry.definitions();
        Self {
            registry,
            remotes: Vec::new(),
            remote_tools: HashMap::new(),
            schema,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.schema.is_empty()
    }

    pub fn schema(&self) -> &[ToolDef] {
        &self.schema
    }

    /// Execute a named tool, preferring a remote provider when the name is
    /// registered there. Always returns a JSON string payload.
    pub async fn execute(&self, name: &str, args: &Map<String, Value>) -> String {
        if let Some(&idx) = self.remote_tools.get(name) {
            tracing::info!("Tool (remote): {}", name);
            return self.remotes[idx].call_tool(name, args).await;
        }
        tracing::info!("Tool (builtin): {}", name);
        self.registry.execute(name, args).await
    }
}

fn merge_schema(
    remote: Vec<ToolDef>,
    builtin: Vec<ToolDef>,
    remote_tools: &HashMap<String, usize>,
) -> Vec<ToolDef> {
    let mut schema = remote;
    for def in builtin {
        if !remote_tools.contains_key(&def.function.name) {
            schema.push(def);
        }
    }
    schema
}
