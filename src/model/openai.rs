//! OpenAI-compatible chat backend
//!
//! Speaks `/v1/chat/completions` with JSON tool descriptors, image
//! attachments as `image_url` content parts, and SSE streaming with
//! tool-call delta accumulation.

use super::{ChatModel, ChatRole, ModelTurn, PromptMessage, ToolCall};
use crate::config::ChatConfig;
use crate::error::{Error, Result};
use crate::tools::ToolDefinition;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use url::Url;

pub struct OpenAiChatModel {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiChatModel {
    pub fn new(config: &ChatConfig, api_key: Option<String>) -> Result<Self> {
        let endpoint = Url::parse(&config.backend_url)?
            .join("/v1/chat/completions")
            .map_err(|e| Error::Config(format!("Invalid chat backend URL: {}", e)))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn request_body(
        &self,
        messages: &[PromptMessage],
        tools: &[ToolDefinition],
        stream: bool,
    ) -> Value {
        let mut body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "messages": messages.iter().map(wire_message).collect::<Vec<_>>(),
        });

        if !tools.is_empty() {
            body["tools"] = Value::Array(
                tools
                    .iter()
                    .map(|t| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": t.name,
                                "description": t.description,
                                "parameters": t.input_schema,
                            }
                        })
                    })
                    .collect(),
            );
        }

        if stream {
            body["stream"] = Value::Bool(true);
        }

        body
    }

    fn request(&self, body: &Value) -> reqwest::RequestBuilder {
        let mut request = self.client.post(self.endpoint.clone()).json(body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }
        request
    }
}

fn wire_message(message: &PromptMessage) -> Value {
    match (&message.role, &message.image_url) {
        (ChatRole::User, Some(image_url)) => json!({
            "role": "user",
            "content": [
                { "type": "text", "text": message.content },
                {
                    "type": "image_url",
                    "image_url": { "url": image_url }
                }
            ]
        }),
        (ChatRole::Assistant, _) if !message.tool_calls.is_empty() => json!({
            "role": "assistant",
            "content": Value::Null,
            "tool_calls": message
                .tool_calls
                .iter()
                .map(|c| {
                    json!({
                        "id": c.id,
                        "type": "function",
                        "function": {
                            "name": c.name,
                            "arguments": c.arguments.to_string(),
                        }
                    })
                })
                .collect::<Vec<_>>(),
        }),
        (ChatRole::Tool, _) => json!({
            "role": "tool",
            "tool_call_id": message.tool_call_id.as_deref().unwrap_or(""),
            "content": message.content,
        }),
        (role, _) => json!({
            "role": role.to_string(),
            "content": message.content,
        }),
    }
}

fn parse_arguments(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!("Tool call arguments are not valid JSON ({}), using empty object", e);
        json!({})
    })
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<DeltaToolCall>>,
}

#[derive(Debug, Deserialize)]
struct DeltaToolCall {
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<DeltaFunction>,
}

#[derive(Debug, Deserialize)]
struct DeltaFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Tool call being assembled from stream deltas
#[derive(Debug, Default)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(
        &self,
        messages: &[PromptMessage],
        tools: &[ToolDefinition],
    ) -> Result<ModelTurn> {
        let body = self.request_body(messages, tools, false);
        debug!("Calling chat backend with {} messages", messages.len());

        let response = self
            .request(&body)
            .send()
            .await
            .map_err(|e| Error::Model(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::Model(e.to_string()))?;

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Model(e.to_string()))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Model("Backend returned no choices".to_string()))?;

        if let Some(calls) = choice.message.tool_calls {
            if !calls.is_empty() {
                let tool_calls = calls
                    .into_iter()
                    .map(|c| ToolCall {
                        id: c.id,
                        name: c.function.name,
                        arguments: parse_arguments(&c.function.arguments),
                    })
                    .collect();
                return Ok(ModelTurn::ToolCalls(tool_calls));
            }
        }

        Ok(ModelTurn::Final(choice.message.content.unwrap_or_default()))
    }

    async fn stream(
        &self,
        messages: &[PromptMessage],
        tools: &[ToolDefinition],
        fragments: &mpsc::Sender<String>,
    ) -> Result<ModelTurn> {
        let body = self.request_body(messages, tools, true);
        debug!("Streaming from chat backend with {} messages", messages.len());

        let response = self
            .request(&body)
            .send()
            .await
            .map_err(|e| Error::Model(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::Model(e.to_string()))?;

        let mut byte_stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut accumulated = String::new();
        let mut pending_calls: BTreeMap<usize, PendingToolCall> = BTreeMap::new();
        let mut finish_reason: Option<String> = None;

        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk.map_err(|e| Error::Model(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(newline) = buffer.find('\n') {
                let line = buffer[..newline].trim().to_string();
                buffer.drain(..newline + 1);

                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                let data = data.trim();
                if data.is_empty() {
                    continue;
                }
                if data == "[DONE]" {
                    buffer.clear();
                    break;
                }

                let parsed: StreamChunk = match serde_json::from_str(data) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        warn!("Skipping unparseable stream chunk: {}", e);
                        continue;
                    }
                };

                for choice in parsed.choices {
                    if let Some(reason) = choice.finish_reason {
                        finish_reason = Some(reason);
                    }

                    if let Some(content) = choice.delta.content {
                        if !content.is_empty() {
                            accumulated.push_str(&content);
                            if fragments.send(content).await.is_err() {
                                return Err(Error::Model(
                                    "Stream consumer went away".to_string(),
                                ));
                            }
                        }
                    }

                    for delta in choice.delta.tool_calls.unwrap_or_default() {
                        let pending = pending_calls.entry(delta.index).or_default();
                        if let Some(id) = delta.id {
                            pending.id = id;
                        }
                        if let Some(function) = delta.function {
                            if let Some(name) = function.name {
                                pending.name = name;
                            }
                            if let Some(arguments) = function.arguments {
                                pending.arguments.push_str(&arguments);
                            }
                        }
                    }
                }
            }
        }

        if finish_reason.as_deref() == Some("tool_calls") || !pending_calls.is_empty() {
            let tool_calls = pending_calls
                .into_values()
                .map(|c| ToolCall {
                    id: c.id,
                    name: c.name,
                    arguments: parse_arguments(&c.arguments),
                })
                .collect();
            return Ok(ModelTurn::ToolCalls(tool_calls));
        }

        Ok(ModelTurn::Final(accumulated))
    }
}
