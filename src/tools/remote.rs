//! HTTP tool providers: external services that contribute extra tools.
//!
//! A provider exposes `GET {base}/tools` returning OpenAI-format tool
//! definitions, and `POST {base}/tools/call` taking `{"name", "arguments"}`
//! and returning the tool result as JSON or plain text.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{json, Map, Value};

use super::ToolDef;

#[derive(Serialize)]
struct CallPayload<'a> {
    name: &'a str,
    arguments: &'a Map<String, Value>,
}

pub struct RemoteToolProvider {
    name: String,
    base_url: String,
    client: reqwest::Client,
}

impl RemoteToolProvider {
    pub fn new(name: &str, base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .with_context(|| format!("Failed to build HTTP client for tool provider '{name}'"))?;
        Ok(Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fetch the provider's tool schema.
    pub async fn list_tools(&self) -> Result<Vec<ToolDef>> {
        let url = format!("{}/tools", self.base_url);
        let resp = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .with_context(|| format!("Failed to reach tool provider '{}'", self.name))?;
        if !resp.status().is_success() {
            anyhow::bail!(
                "Tool provider '{}' returned {} for tool listing",
                self.name,
                resp.status()
            );
        }
        let defs: Vec<ToolDef> = resp
            .json()
            .await
            .with_context(|| format!("Invalid tool listing from provider '{}'", self.name))?;
        Ok(defs)
    }

    /// Invoke a tool on the provider. Never fails: any transport or protocol
    /// error becomes an error-shaped JSON payload for the model.
    pub async fn call_tool(&self, name: &str, args: &Map<String, Value>) -> String {
        match self.try_call(name, args).await {
            Ok(payload) => payload,
            Err(e) => json!({"error": format!("Tool execution error for {name}: {e:#}")}).to_string(),
        }
    }

    async fn try_call(&self, name: &str, args: &Map<String, Value>) -> Result<String> {
        let url = format!("{}/tools/call", self.base_url);
        let payload = CallPayload {
            name,
            arguments: args,
        };
        let resp = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("Failed to reach tool provider '{}'", self.name))?;
        if !resp.status().is_success() {
            anyhow::bail!(
                "Tool provider '{}' returned {} for '{}'",
                self.name,
                resp.status(),
                name
            );
        }
        let body = resp.text().await.context("Failed to read tool response")?;
        // Structured results pass through untouched; plain text is wrapped so
        // the model always sees a JSON object.
        match serde_json::from_str::<Value>(&body) {
            Ok(value @ (Value::Object(_) | Value::Array(_))) => Ok(value.to_string()),
            _ => Ok(json!({"result": body.trim()}).to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        let provider = RemoteToolProvider::new("p", "http://localhost:9000/").unwrap();
        assert_eq!(provider.base_url, "http://localhost:9000");
        assert_eq!(provider.name(), "p");
    }

    #[tokio::test]
    async fn test_unreachable_provider_listing_fails() {
        let provider = RemoteToolProvider::new("p", "http://127.0.0.1:1").unwrap();
        assert!(provider.list_tools().await.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_provider_call_yields_error_payload() {
        let provider = RemoteToolProvider::new("p", "http://127.0.0.1:1").unwrap();
        let out = provider.call_tool("whatever", &Map::new()).await;
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert!(parsed["error"]
            .as_str()
            .unwrap()
            .starts_with("Tool execution error for whatever"));
    }
}
