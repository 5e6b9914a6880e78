//! Conversation and wire types
//!
//! `Message` is the provider-neutral model stored in threads and exchanged
//! with the Delegate Oracle. The `Claude*` and `OpenAi*` types are the two
//! wire formats `LlmClient` speaks.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "tool" => Some(Self::Tool),
            _ => None,
        }
    }
}

/// A structured "call this tool with these arguments" directive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique within one assistant message
    pub id: String,
    pub name: String,
    /// JSON object for well-formed calls. Arguments the model produced as
    /// invalid JSON are kept verbatim as a JSON string.
    pub arguments: JsonValue,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: JsonValue) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// String argument by key, when arguments are an object
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(JsonValue::as_str)
    }
}

/// Message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    /// Set on `Role::Tool` messages: the call this result answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Attribution, e.g. the sub-agent that produced the message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
            name: None,
        }
    }

    /// Create a user message with text
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    /// Create an assistant message with text
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// Create an assistant message that delegates to tools
    pub fn assistant_with_tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::new(Role::Assistant, text)
        }
    }

    /// Create a tool-result message answering `tool_call_id`
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(Role::Tool, content)
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Oracle-visible tool: name, description and JSON schema of its input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSignature {
    pub name: String,
    pub description: String,
    pub input_schema: JsonValue,
}

impl ToolSignature {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: JsonValue,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// Parse model-produced tool arguments, keeping malformed input verbatim
pub fn parse_tool_arguments(raw: &str) -> JsonValue {
    if raw.trim().is_empty() {
        return JsonValue::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| JsonValue::String(raw.to_string()))
}

// ============================================================================
// Claude Messages API
// ============================================================================

/// Content block in a Claude message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: JsonValue,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeMessage {
    pub role: String,
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeTool {
    pub name: String,
    pub description: String,
    pub input_schema: JsonValue,
}

/// Messages API request
#[derive(Debug, Clone, Serialize)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<ClaudeMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ClaudeTool>>,
}

impl MessagesRequest {
    /// Build from neutral history.
    ///
    /// Tool results travel as `tool_result` blocks inside a user message and
    /// consecutive messages of the same wire role are merged, since the API
    /// requires strict user/assistant alternation.
    pub fn from_history(
        model: &str,
        max_tokens: u64,
        system: Option<&str>,
        history: &[Message],
        tools: &[ToolSignature],
    ) -> Self {
        let mut messages: Vec<ClaudeMessage> = Vec::new();

        for msg in history {
            let (role, blocks) = match msg.role {
                Role::User => ("user", vec![ContentBlock::Text { text: msg.content.clone() }]),
                Role::Assistant => {
                    let mut blocks = Vec::new();
                    if !msg.content.is_empty() {
                        blocks.push(ContentBlock::Text { text: msg.content.clone() });
                    }
                    for call in &msg.tool_calls {
                        blocks.push(ContentBlock::ToolUse {
                            id: call.id.clone(),
                            name: call.name.clone(),
                            input: call.arguments.clone(),
                        });
                    }
                    ("assistant", blocks)
                }
                Role::Tool => (
                    "user",
                    vec![ContentBlock::ToolResult {
                        tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                        content: msg.content.clone(),
                        is_error: false,
                    }],
                ),
            };

            if blocks.is_empty() {
                continue;
            }

            match messages.last_mut() {
                Some(last) if last.role == role => last.content.extend(blocks),
                _ => messages.push(ClaudeMessage {
                    role: role.to_string(),
                    content: blocks,
                }),
            }
        }

        let tools = if tools.is_empty() {
            None
        } else {
            Some(
                tools
                    .iter()
                    .map(|t| ClaudeTool {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        input_schema: t.input_schema.clone(),
                    })
                    .collect(),
            )
        };

        Self {
            model: model.to_string(),
            max_tokens,
            system: system.map(str::to_string),
            messages,
            tools,
        }
    }
}

/// Messages API response
#[derive(Debug, Clone, Deserialize)]
pub struct MessagesResponse {
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl MessagesResponse {
    pub fn into_message(self) -> Message {
        let mut text = Vec::new();
        let mut tool_calls = Vec::new();

        for block in self.content {
            match block {
                ContentBlock::Text { text: t } => text.push(t),
                ContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall::new(id, name, input))
                }
                ContentBlock::ToolResult { .. } => {}
            }
        }

        Message::assistant_with_tool_calls(text.join("\n"), tool_calls)
    }
}

/// Token usage information
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

// ============================================================================
// OpenAI-compatible Chat Completions API (OpenRouter, OpenAI, etc.)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl OpenAiMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: Some(text.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

impl From<&Message> for OpenAiMessage {
    fn from(msg: &Message) -> Self {
        let tool_calls = if msg.tool_calls.is_empty() {
            None
        } else {
            Some(msg.tool_calls.iter().map(OpenAiToolCall::from).collect())
        };

        // Assistant turns that only call tools carry null content
        let content = if msg.role == Role::Assistant && msg.content.is_empty() && tool_calls.is_some() {
            None
        } else {
            Some(msg.content.clone())
        };

        Self {
            role: msg.role.as_str().to_string(),
            content,
            tool_calls,
            tool_call_id: msg.tool_call_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub call_type: String,
    pub function: OpenAiFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiFunctionCall {
    pub name: String,
    /// JSON-encoded arguments
    #[serde(default)]
    pub arguments: String,
}

impl From<&ToolCall> for OpenAiToolCall {
    fn from(call: &ToolCall) -> Self {
        let arguments = match &call.arguments {
            JsonValue::String(raw) => raw.clone(),
            other => other.to_string(),
        };
        Self {
            id: call.id.clone(),
            call_type: function_type(),
            function: OpenAiFunctionCall {
                name: call.name.clone(),
                arguments,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiTool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: OpenAiFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiFunction {
    pub name: String,
    pub description: String,
    pub parameters: JsonValue,
}

impl From<&ToolSignature> for OpenAiTool {
    fn from(tool: &ToolSignature) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: OpenAiFunction {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.input_schema.clone(),
            },
        }
    }
}

/// OpenAI-compatible chat completion request
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<OpenAiTool>>,
    pub temperature: f32,
}

impl ChatCompletionRequest {
    pub fn from_history(
        model: &str,
        max_tokens: u64,
        system: Option<&str>,
        history: &[Message],
        tools: &[ToolSignature],
    ) -> Self {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if let Some(system) = system {
            messages.push(OpenAiMessage::system(system));
        }
        messages.extend(history.iter().map(OpenAiMessage::from));

        let tools = if tools.is_empty() {
            None
        } else {
            Some(tools.iter().map(OpenAiTool::from).collect())
        };

        Self {
            model: model.to_string(),
            messages,
            max_tokens: Some(max_tokens),
            tools,
            temperature: 0.0,
        }
    }
}

/// OpenAI-compatible chat completion response
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<OpenAiUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: OpenAiMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OpenAiUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl ChatCompletionResponse {
    pub fn into_message(self) -> Option<Message> {
        let choice = self.choices.into_iter().next()?;
        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                ToolCall::new(
                    tc.id,
                    tc.function.name,
                    parse_tool_arguments(&tc.function.arguments),
                )
            })
            .collect();

        Some(Message::assistant_with_tool_calls(
            choice.message.content.unwrap_or_default(),
            tool_calls,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool_call_history() -> Vec<Message> {
        vec![
            Message::user("What is the leak penalty?"),
            Message::assistant_with_tool_calls(
                "",
                vec![ToolCall::new("call_1", "ask_industrial_agent", json!({"query": "leak penalty"}))],
            ),
            Message::tool_result("call_1", "The penalty is $10,000.").with_name("Industrial_RAG"),
        ]
    }

    #[test]
    fn test_message_serialization_skips_empty_fields() {
        let json = serde_json::to_string(&Message::user("Hello")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"Hello"}"#);
    }

    #[test]
    fn test_message_roundtrip_with_tool_calls() {
        let msg = &tool_call_history()[1];
        let back: Message = serde_json::from_str(&serde_json::to_string(msg).unwrap()).unwrap();
        assert_eq!(&back, msg);
    }

    #[test]
    fn test_parse_tool_arguments() {
        assert_eq!(parse_tool_arguments(r#"{"query":"x"}"#), json!({"query": "x"}));
        assert_eq!(parse_tool_arguments(""), json!({}));
        assert_eq!(parse_tool_arguments("{query: x"), json!("{query: x"));
    }

    #[test]
    fn test_claude_request_groups_tool_results() {
        let mut history = tool_call_history();
        history.push(Message::tool_result("call_2", "second"));

        let req = MessagesRequest::from_history("m", 100, Some("sys"), &history, &[]);

        assert_eq!(req.messages.len(), 3);
        assert_eq!(req.messages[1].role, "assistant");
        assert!(matches!(req.messages[1].content[0], ContentBlock::ToolUse { .. }));
        assert_eq!(req.messages[2].role, "user");
        assert_eq!(req.messages[2].content.len(), 2);
        assert!(req.tools.is_none());
        assert_eq!(req.system.as_deref(), Some("sys"));
    }

    #[test]
    fn test_openai_request_conversion() {
        let tools = vec![ToolSignature::new("ask_industrial_agent", "d", json!({"type": "object"}))];
        let req = ChatCompletionRequest::from_history("m", 100, Some("sys"), &tool_call_history(), &tools);

        assert_eq!(req.messages.len(), 4);
        assert_eq!(req.messages[0].role, "system");
        assert!(req.messages[2].content.is_none());
        let call = &req.messages[2].tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.function.arguments, r#"{"query":"leak penalty"}"#);
        assert_eq!(req.messages[3].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(req.tools.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_openai_response_to_message() {
        let body = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "ask_financial_agent", "arguments": "{\"query\":\"revenue\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        });

        let resp: ChatCompletionResponse = serde_json::from_value(body).unwrap();
        let msg = resp.into_message().unwrap();

        assert_eq!(msg.role, Role::Assistant);
        assert!(msg.content.is_empty());
        assert_eq!(msg.tool_calls[0].name, "ask_financial_agent");
        assert_eq!(msg.tool_calls[0].str_arg("query"), Some("revenue"));
    }

    #[test]
    fn test_claude_response_to_message() {
        let body = json!({
            "content": [
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "tu_1", "name": "retrieve_documents", "input": {"query": "osha"}}
            ],
            "stop_reason": "tool_use"
        });

        let resp: MessagesResponse = serde_json::from_value(body).unwrap();
        let msg = resp.into_message();

        assert_eq!(msg.content, "Let me check.");
        assert_eq!(msg.tool_calls.len(), 1);
        assert_eq!(msg.tool_calls[0].id, "tu_1");
    }
}
