//! Language-model capability
//!
//! Message/turn types plus the `ChatModel` trait the orchestrator drives:
//! a completion either finishes with text or requests tool calls, and the
//! streaming variant forwards text fragments through a channel while the
//! call is in flight.

mod openai;

pub use openai::*;

use crate::error::Result;
use crate::tools::ToolDefinition;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

/// Roles on the model wire. `Tool` carries a tool result back to the model
/// and never reaches durable history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatRole::System => write!(f, "system"),
            ChatRole::User => write!(f, "user"),
            ChatRole::Assistant => write!(f, "assistant"),
            ChatRole::Tool => write!(f, "tool"),
        }
    }
}

/// A tool invocation requested by the model
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// One message in the prompt sent to the model
#[derive(Debug, Clone)]
pub struct PromptMessage {
    pub role: ChatRole,
    pub content: String,
    pub image_url: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub tool_call_id: Option<String>,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
            image_url: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            image_url: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user_with_image(content: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            image_url: Some(image_url.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            image_url: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Assistant message echoing the tool calls the model requested
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: String::new(),
            image_url: None,
            tool_calls,
            tool_call_id: None,
        }
    }

    /// Tool result answering one requested call
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: content.into(),
            image_url: None,
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// Outcome of one model invocation
#[derive(Debug, Clone)]
pub enum ModelTurn {
    /// The model produced its final text
    Final(String),
    /// The model wants tool results before finishing
    ToolCalls(Vec<ToolCall>),
}

/// Capability trait for the generation backend
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Run a completion to its end
    async fn complete(
        &self,
        messages: &[PromptMessage],
        tools: &[ToolDefinition],
    ) -> Result<ModelTurn>;

    /// Run a completion, forwarding text fragments through `fragments` as
    /// they are generated. The accumulated turn is still returned. A send
    /// failure means the consumer went away; implementations stop emitting
    /// and return a model error.
    async fn stream(
        &self,
        messages: &[PromptMessage],
        tools: &[ToolDefinition],
        fragments: &mpsc::Sender<String>,
    ) -> Result<ModelTurn>;
}
