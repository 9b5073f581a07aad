//! Safe arithmetic evaluation for the `calculate_expression` tool.
//!
//! Supports `+ - * / % // **`, unary sign, and parentheses over f64. No
//! names, no calls, so model-supplied expressions cannot reach anything else.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::Tool;

pub struct CalculateExpressionTool;

impl CalculateExpressionTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CalculateExpressionTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for CalculateExpressionTool {
    fn name(&self) -> &str {
        "calculate_expression"
    }

    fn description(&self) -> &str {
        "Evaluate a basic arithmetic expression (+, -, *, /, %, //, **, parentheses)"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "Arithmetic expression to evaluate, e.g. \"2 + 2 * 3\""
                }
            },
            "required": ["expression"]
        })
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<Value> {
        let Some(expression) = args.get("expression").and_then(Value::as_str) else {
            return Ok(json!({"error": "Invalid 'expression' argument; expected a string."}));
        };
        match evaluate(expression) {
            Ok(result) => Ok(json!({"result": result})),
            Err(_) => Ok(json!({"error": "Invalid arithmetic expression."})),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(f64),
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    DoubleStar,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    tokens.push(Token::DoubleStar);
                    i += 2;
                } else {
                    tokens.push(Token::Star);
                    i += 1;
                }
            }
            '/' => {
                if chars.get(i + 1) == Some(&'/') {
                    tokens.push(Token::DoubleSlash);
                    i += 2;
                } else {
                    tokens.push(Token::Slash);
                    i += 1;
                }
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let value: f64 = literal.parse().map_err(|_| anyhow::anyhow!("bad number"))?;
                tokens.push(Token::Num(value));
            }
            _ => anyhow::bail!("unexpected character '{c}'"),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expr(&mut self) -> Result<f64> {
        let mut value = self.term()?;
        while let Some(op @ (Token::Plus | Token::Minus)) = self.peek() {
            self.next();
            let rhs = self.term()?;
            value = match op {
                Token::Plus => value + rhs,
                _ => value - rhs,
            };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64> {
        let mut value = self.unary()?;
        while let Some(op @ (Token::Star | Token::Slash | Token::DoubleSlash | Token::Percent)) =
            self.peek()
        {
            self.next();
            let rhs = self.unary()?;
            if rhs == 0.0 && op != Token::Star {
                anyhow::bail!("division by zero");
            }
            value = match op {
                Token::Star => value * rhs,
                Token::Slash => value / rhs,
                Token::DoubleSlash => (value / rhs).floor(),
                // Sign-of-divisor modulo, matching Python's `%`.
                _ => value - rhs * (value / rhs).floor(),
            };
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<f64> {
        match self.peek() {
            Some(Token::Plus) => {
                self.next();
                self.unary()
            }
            Some(Token::Minus) => {
                self.next();
                Ok(-self.unary()?)
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<f64> {
        let base = self.atom()?;
        if self.peek() == Some(Token::DoubleStar) {
            self.next();
            // Right-associative; the exponent may carry its own sign.
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<f64> {
        match self.next() {
            Some(Token::Num(value)) => Ok(value),
            Some(Token::LParen) => {
                let value = self.expr()?;
                if self.next() != Some(Token::RParen) {
                    anyhow::bail!("unbalanced parentheses");
                }
                Ok(value)
            }
            other => anyhow::bail!("unexpected token {other:?}"),
        }
    }
}

fn evaluate(expression: &str) -> Result<f64> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        anyhow::bail!("empty expression");
    }
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        anyhow::bail!("trailing tokens");
    }
    if !value.is_finite() {
        anyhow::bail!("non-finite result");
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_arithmetic() {
        assert_eq!(evaluate("2+2").unwrap(), 4.0);
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(evaluate("10 / 4").unwrap(), 2.5);
    }

    #[test]
    fn test_python_style_operators() {
        assert_eq!(evaluate("7 // 2").unwrap(), 3.0);
        assert_eq!(evaluate("2 ** 10").unwrap(), 1024.0);
        assert_eq!(evaluate("2 ** 3 ** 2").unwrap(), 512.0);
        assert_eq!(evaluate("-2 ** 2").unwrap(), -4.0);
        assert_eq!(evaluate("2 ** -1").unwrap(), 0.5);
        assert_eq!(evaluate("-7 % 3").unwrap(), 2.0);
    }

    #[test]
    fn test_unary_sign() {
        assert_eq!(evaluate("-3 + 5").unwrap(), 2.0);
        assert_eq!(evaluate("--3").unwrap(), 3.0);
        assert_eq!(evaluate("+4").unwrap(), 4.0);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(evaluate("1 / 0").is_err());
        assert!(evaluate("5 % 0").is_err());
        assert!(evaluate("2 +").is_err());
        assert!(evaluate("(1 + 2").is_err());
        assert!(evaluate("import os").is_err());
        assert!(evaluate("").is_err());
    }

    #[tokio::test]
    async fn test_tool_payloads() {
        let tool = CalculateExpressionTool::new();
        let mut args = Map::new();
        args.insert("expression".to_string(), Value::String("2+2".to_string()));
        assert_eq!(tool.execute(&args).await.unwrap(), serde_json::json!({"result": 4.0}));

        let mut bad = Map::new();
        bad.insert("expression".to_string(), Value::String("nope".to_string()));
        assert_eq!(
            tool.execute(&bad).await.unwrap(),
            serde_json::json!({"error": "Invalid arithmetic expression."})
        );

        assert!(tool.execute(&Map::new()).await.unwrap()["error"].is_string());
    }
}
