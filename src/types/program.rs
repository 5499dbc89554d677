//! The resolved tool graph behind a run.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Tool ID to tool definition.
pub type ToolSet = HashMap<String, Tool>;

/// A compiled program: every tool reachable from the entry tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Program {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(rename = "entryToolId", skip_serializing_if = "String::is_empty")]
    pub entry_tool_id: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub tool_set: ToolSet,
}

impl Program {
    pub fn is_empty(&self) -> bool {
        self.entry_tool_id.is_empty() && self.tool_set.is_empty()
    }

    /// The entry tool, if it is part of the tool set.
    pub fn entry_tool(&self) -> Option<&Tool> {
        self.tool_set.get(&self.entry_tool_id)
    }
}

/// Where a tool was loaded from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolSource {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub location: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub line_no: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<Repo>,
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Repo {
    #[serde(rename = "VCS")]
    pub vcs: String,
    pub root: String,
    pub path: String,
    pub name: String,
    pub revision: String,
}

/// A single tool definition as the engine reports it.
///
/// Only the commonly inspected fields are typed; everything else the engine
/// sends is kept in `extra` so that a tool can be passed back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Tool {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub model_name: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub chat: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub credentials: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub instructions: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub local_tools: HashMap<String, String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub working_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ToolSource>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_tool_fields_survive_a_round_trip() {
        let raw = json!({
            "id": "t1",
            "name": "echo",
            "instructions": "#!/bin/echo",
            "toolMapping": {"sys.echo": [{"reference": "sys.echo"}]},
            "internalPrompt": null
        });

        let tool: Tool = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(tool.name, "echo");
        assert!(tool.extra.contains_key("toolMapping"));
        assert_eq!(serde_json::to_value(&tool).unwrap(), raw);
    }

    #[test]
    fn entry_tool_is_looked_up_in_tool_set() {
        let program: Program = serde_json::from_value(json!({
            "name": "demo.gpt",
            "entryToolId": "demo.gpt:main",
            "toolSet": {"demo.gpt:main": {"id": "demo.gpt:main", "name": "main"}}
        }))
        .unwrap();

        assert_eq!(program.entry_tool().unwrap().name, "main");
        assert!(!program.is_empty());
    }
}
