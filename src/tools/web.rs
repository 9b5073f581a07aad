use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::Tool;

const DEFAULT_MAX_BYTES: u64 = 65536;

/// Fetches a URL over HTTP GET and returns the (possibly truncated) body.
pub struct FetchUrlTool {
    client: reqwest::Client,
}

impl FetchUrlTool {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent("ollamatrix")
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for FetchUrlTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for FetchUrlTool {
    fn name(&self) -> &str {
        "fetch_url"
    }

    fn description(&self) -> &str {
        "Fetch the contents of an HTTP(S) URL, truncated to a byte limit"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The http:// or https:// URL to fetch"
                },
                "max_bytes": {
                    "type": "integer",
                    "description": "Maximum number of body bytes to return (default 65536)"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<Value> {
        let Some(url) = args.get("url").and_then(Value::as_str) else {
            return Ok(json!({"error": "Invalid 'url' argument; expected a string."}));
        };
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Ok(json!({"error": format!("Unsupported URL scheme in '{url}'.")}));
        }
        let max_bytes = args
            .get("max_bytes")
            .and_then(Value::as_u64)
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_MAX_BYTES) as usize;

        let resp = match self.client.get(url).send().await {
            Ok(resp) => resp,
            Err(e) => return Ok(json!({"error": format!("Failed to fetch '{url}': {e}")})),
        };
        let status = resp.status().as_u16();
        let body = match resp.text().await {
            Ok(body) => body,
            Err(e) => return Ok(json!({"error": format!("Failed to read body of '{url}': {e}")})),
        };

        let (content, truncated) = truncate_utf8(&body, max_bytes);
        Ok(json!({
            "url": url,
            "status": status,
            "content": content,
            "truncated": truncated,
        }))
    }
}

/// Cut `text` to at most `max_bytes` bytes without splitting a character.
fn truncate_utf8(text: &str, max_bytes: usize) -> (&str, bool) {
    if text.len() <= max_bytes {
        return (text, false);
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    (&text[..end], true)
}
