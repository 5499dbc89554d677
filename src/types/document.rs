//! Parsed script documents, used by `parse` and `fmt`.

use serde::{Deserialize, Serialize};

use super::program::Tool;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Document {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<Node>,
}

/// One block of a script: free text or a tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Node {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_node: Option<TextNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_node: Option<ToolNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextNode {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub text: String,
    /// Set when the text is a `!fmt` directive block such as `!metadata:tool:file`.
    #[serde(skip)]
    pub fmt: String,
}

const FMT_PREFIX: char = '!';

impl TextNode {
    /// Split a leading `!directive` line off the text into `fmt`.
    pub fn process(&mut self) {
        if !self.text.starts_with(FMT_PREFIX) {
            return;
        }
        if let Some((fmt, rest)) = self.text[1..].split_once('\n') {
            self.fmt = fmt.to_string();
            self.text = rest.to_string();
        }
    }

    /// Inverse of [`process`](Self::process); run before sending nodes back to the engine.
    pub fn combine(&mut self) {
        if self.fmt.is_empty() {
            return;
        }
        self.text = format!("{FMT_PREFIX}{}\n{}", self.fmt, self.text);
        self.fmt.clear();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolNode {
    pub tool: Tool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_and_combine_are_inverse() {
        let original = "!metadata:demo:package.json\n{\"name\": \"demo\"}\n".to_string();
        let mut node = TextNode {
            text: original.clone(),
            fmt: String::new(),
        };

        node.process();
        assert_eq!(node.fmt, "metadata:demo:package.json");
        assert_eq!(node.text, "{\"name\": \"demo\"}\n");

        node.combine();
        assert_eq!(node.text, original);
        assert!(node.fmt.is_empty());
    }

    #[test]
    fn plain_text_is_untouched() {
        let mut node = TextNode {
            text: "# heading".into(),
            fmt: String::new(),
        };
        node.process();
        assert!(node.fmt.is_empty());
        assert_eq!(node.text, "# heading");
    }
}
