use anyhow::Result;
use async_trait::async_trait;
use regex_lite::Regex;
use serde_json::{json, Map, Value};

use super::Tool;

/// Counts words, sentences, and characters in a piece of text.
pub struct TextStatsTool {
    word_re: Regex,
    sentence_re: Regex,
}

impl TextStatsTool {
    pub fn new() -> Self {
        Self {
            word_re: Regex::new(r"\b\w+\b").unwrap(),
            sentence_re: Regex::new(r"[.!?]+").unwrap(),
        }
    }
}

impl Default for TextStatsTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for TextStatsTool {
    fn name(&self) -> &str {
        "text_stats"
    }

    fn description(&self) -> &str {
        "Count words, sentences, and characters in a piece of text"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "The text to analyze"
                }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<Value> {
        let Some(text) = args.get("text").and_then(Value::as_str) else {
            return Ok(json!({"error": "Invalid 'text' argument; expected a string."}));
        };
        let words = self.word_re.find_iter(text).count();
        let sentences = self.sentence_re.find_iter(text).count();
        Ok(json!({
            "words": words,
            "sentences": sentences,
            "characters": text.chars().count(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counts() {
        let tool = TextStatsTool::new();
        let mut args = Map::new();
        args.insert(
            "text".to_string(),
            json!("Hello world. How are you? Fine!"),
        );
        let out = tool.execute(&args).await.unwrap();
        assert_eq!(out["words"], 6);
        assert_eq!(out["sentences"], 3);
        assert_eq!(out["characters"], 31);
    }

    #[tokio::test]
    async fn test_characters_counted_not_bytes() {
        let tool = TextStatsTool::new();
        let mut args = Map::new();
        // "héllo café!" is 11 characters but 13 UTF-8 bytes.
        args.insert("text".to_string(), json!("héllo café!"));
        let out = tool.execute(&args).await.unwrap();
        assert_eq!(out["characters"], 11);
    }

    #[tokio::test]
    async fn test_empty_text() {
        let tool = TextStatsTool::new();
        let mut args = Map::new();
        args.insert("text".to_string(), json!(""));
        let out = tool.execute(&args).await.unwrap();
        assert_eq!(out["words"], 0);
        assert_eq!(out["sentences"], 0);
        assert_eq!(out["characters"], 0);
    }

    #[tokio::test]
    async fn test_missing_argument() {
        let tool = TextStatsTool::new();
        let out = tool.execute(&Map::new()).await.unwrap();
        assert!(out["error"].is_string());
    }
}
