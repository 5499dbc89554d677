//! Tool definitions submitted for evaluation.
//!
//! The engine accepts tools as text. Anything implementing [`Display`] can be
//! evaluated; [`ToolDef`] and [`FreeForm`] cover the common cases.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use bon::Builder;
use serde::{Deserialize, Serialize};

/// Separator placed between tools when several are evaluated together.
pub const TOOL_SEPARATOR: &str = "\n---\n";

/// A structured tool definition.
#[derive(Debug, Clone, Default, PartialEq, Builder, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolDef {
    #[builder(default, into)]
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[builder(default, into)]
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[builder(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[builder(default, into)]
    #[serde(skip_serializing_if = "String::is_empty")]
    pub model_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[builder(default)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub json_response: bool,
    #[builder(default)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub chat: bool,
    /// Argument name to description.
    #[builder(default)]
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub arguments: BTreeMap<String, String>,
    #[builder(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
    #[builder(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub credentials: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_prompt: Option<bool>,
    #[builder(default, into)]
    #[serde(skip_serializing_if = "String::is_empty")]
    pub instructions: String,
}

impl Display for ToolDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.name.is_empty() {
            writeln!(f, "Name: {}", self.name)?;
        }
        if !self.description.is_empty() {
            writeln!(f, "Description: {}", self.description)?;
        }
        if !self.tools.is_empty() {
            writeln!(f, "Tools: {}", self.tools.join(", "))?;
        }
        if let Some(max_tokens) = self.max_tokens {
            writeln!(f, "Max Tokens: {max_tokens}")?;
        }
        if !self.model_name.is_empty() {
            writeln!(f, "Model: {}", self.model_name)?;
        }
        if self.cache == Some(false) {
            writeln!(f, "Cache: false")?;
        }
        if let Some(temperature) = self.temperature {
            writeln!(f, "Temperature: {temperature}")?;
        }
        if self.json_response {
            writeln!(f, "JSON Response: true")?;
        }
        if self.chat {
            writeln!(f, "Chat: true")?;
        }
        for (arg, desc) in &self.arguments {
            writeln!(f, "Args: {arg}: {desc}")?;
        }
        if !self.context.is_empty() {
            writeln!(f, "Context: {}", self.context.join(", "))?;
        }
        if !self.credentials.is_empty() {
            writeln!(f, "Credentials: {}", self.credentials.join(", "))?;
        }
        if let Some(internal) = self.internal_prompt {
            writeln!(f, "Internal Prompt: {internal}")?;
        }
        if !self.instructions.is_empty() {
            write!(f, "\n{}", self.instructions)?;
        }
        Ok(())
    }
}

/// Raw tool text, passed through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreeForm(pub String);

impl FreeForm {
    pub fn new(content: impl Into<String>) -> Self {
        Self(content.into())
    }
}

impl Display for FreeForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Join tools into one document.
pub fn render_tools<T: Display>(tools: &[T]) -> String {
    tools
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(TOOL_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_header_then_instructions() {
        let tool = ToolDef::builder()
            .name("capital")
            .tools(vec!["sys.http.get".into()])
            .cache(false)
            .instructions("What is the capital of the United States?")
            .build();

        assert_eq!(
            tool.to_string(),
            "Name: capital\nTools: sys.http.get\nCache: false\n\nWhat is the capital of the United States?"
        );
    }

    #[test]
    fn multiple_tools_are_separated() {
        let rendered = render_tools(&[FreeForm::new("a"), FreeForm::new("b")]);
        assert_eq!(rendered, "a\n---\nb");
    }

    #[test]
    fn instructions_only_tool_has_no_header() {
        let tool = ToolDef::builder().instructions("say hi").build();
        assert_eq!(tool.to_string(), "\nsay hi");
    }
}
