//! Structured lifecycle events emitted by the engine during a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::program::{Program, Tool};

/// One structured event. Exactly one of run, call or prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frame {
    Run(RunFrame),
    Call(CallFrame),
    Prompt(PromptFrame),
}

impl Frame {
    pub fn as_call(&self) -> Option<&CallFrame> {
        match self {
            Self::Call(call) => Some(call),
            _ => None,
        }
    }

    pub fn as_run(&self) -> Option<&RunFrame> {
        match self {
            Self::Run(run) => Some(run),
            _ => None,
        }
    }

    pub fn as_prompt(&self) -> Option<&PromptFrame> {
        match self {
            Self::Prompt(prompt) => Some(prompt),
            _ => None,
        }
    }
}

/// Run-level event kinds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum RunEventType {
    RunStart,
    RunFinish,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Call-level event kinds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum CallEventType {
    CallStart,
    CallContinue,
    CallSubCalls,
    CallProgress,
    CallChat,
    CallConfirm,
    CallFinish,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Prompt event kinds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum PromptEventType {
    Prompt,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Role a tool plays in the call graph.
#[derive(
    Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ToolCategory {
    Provider,
    Credential,
    Context,
    Input,
    Output,
    #[default]
    #[serde(rename = "")]
    #[strum(serialize = "")]
    None,
    #[serde(other)]
    Other,
}

impl ToolCategory {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// Engine-invocation lifecycle event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunFrame {
    pub id: String,
    pub program: Program,
    pub input: String,
    pub output: String,
    pub error: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub state: String,
    pub chat_state: Value,
    #[serde(rename = "type")]
    pub event_type: RunEventType,
}

/// Token counts reported for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Usage {
    #[serde(skip_serializing_if = "is_zero")]
    pub prompt_tokens: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub completion_tokens: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub total_tokens: u64,
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

impl Usage {
    /// Add another usage to this one.
    pub fn merge(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// A sub-call requested by a tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubCall {
    #[serde(rename = "toolID", skip_serializing_if = "String::is_empty")]
    pub tool_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub input: String,
}

/// One accumulated output entry of a call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Output {
    pub content: String,
    pub sub_calls: HashMap<String, SubCall>,
}

/// Context attached to a call as input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputContext {
    #[serde(rename = "toolID", skip_serializing_if = "String::is_empty")]
    pub tool_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub content: String,
}

/// One tool call's lifecycle event. Re-emitted as the call progresses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CallFrame {
    pub id: String,
    pub tool: Tool,
    pub display_text: String,
    pub input_context: Vec<InputContext>,
    #[serde(skip_serializing_if = "ToolCategory::is_none")]
    pub tool_category: ToolCategory,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub tool_name: String,
    #[serde(rename = "parentID", skip_serializing_if = "String::is_empty")]
    pub parent_id: String,
    #[serde(rename = "type")]
    pub event_type: CallEventType,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub input: String,
    pub output: Vec<Output>,
    pub usage: Usage,
    #[serde(rename = "llmRequest")]
    pub llm_request: Value,
    #[serde(rename = "llmResponse")]
    pub llm_response: Value,
}

impl CallFrame {
    /// Whether this is the top-level call of a run.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_empty() && self.tool_category.is_none()
    }
}

/// A request for user input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PromptFrame {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: PromptEventType,
    pub time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub sensitive: bool,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl std::fmt::Display for PromptFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Message: {}\nFields: {:?}\nSensitive: {}",
            self.message, self.fields, self.sensitive
        )
    }
}
