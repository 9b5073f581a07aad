use anyhow::Result;
use async_trait::async_trait;
use chrono::{Local, Utc};
use serde_json::{json, Map, Value};

use super::Tool;

/// Reports the current time in UTC or the host's local timezone.
pub struct GetTimeTool;

impl GetTimeTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GetTimeTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for GetTimeTool {
    fn name(&self) -> &str {
        "get_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time in UTC or the server's local timezone"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "timezone_name": {
                    "type": "string",
                    "description": "Either 'UTC' or 'local'",
                    "enum": ["UTC", "local"]
                }
            },
            "required": []
        })
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<Value> {
        let tz = args
            .get("timezone_name")
            .and_then(Value::as_str)
            .unwrap_or("UTC");
        let now = match tz {
            "UTC" => Utc::now().to_rfc3339(),
            "local" => Local::now().to_rfc3339(),
            other => {
                return Ok(json!({
                    "error": format!("Unsupported timezone '{other}'. Use 'UTC' or 'local'.")
                }))
            }
        };
        Ok(json!({"timezone": tz, "time": now}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_defaults_to_utc() {
        let tool = GetTimeTool::new();
        let out = tool.execute(&Map::new()).await.unwrap();
        assert_eq!(out["timezone"], "UTC");
        assert!(out["time"].as_str().unwrap().contains('T'));
    }

    #[tokio::test]
    async fn test_local_time() {
        let tool = GetTimeTool::new();
        let mut args = Map::new();
        args.insert("timezone_name".to_string(), json!("local"));
        let out = tool.execute(&args).await.unwrap();
        assert_eq!(out["timezone"], "local");
    }

    #[tokio::test]
    async fn test_rejects_arbitrary_timezone() {
        let tool = GetTimeTool::new();
        let mut args = Map::new();
        args.insert("timezone_name".to_string(), json!("Mars/Olympus"));
        let out = tool.execute(&args).await.unwrap();
        assert_eq!(
            out["error"],
            "Unsupported timezone 'Mars/Olympus'. Use 'UTC' or 'local'."
        );
    }
}
