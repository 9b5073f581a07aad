//! Matrix chat bot backed by a local Ollama inference server.
//!
//! Each (room, user) pair gets its own rolling conversation transcript with a
//! configurable system prompt. Commands are routed by a leading token (`.ai`,
//! `.persona`, ...) or a `BotName:` mention. When tool schemas are available
//! (builtin or from remote providers), completions run through a bounded
//! tool-call loop before the final answer is relayed to the room.

pub mod config;
pub mod context;
pub mod handlers;
pub mod history;
pub mod matrix;
pub mod ollama;
pub mod router;
pub mod runtime;
pub mod tools;
