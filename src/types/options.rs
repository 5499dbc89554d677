//! Per-call options and the outbound request payload.

use bon::Builder;
use serde::{Deserialize, Serialize};

pub use crate::config::GlobalOptions;

/// Options for a single run or evaluation.
///
/// The embedded [`GlobalOptions`] are merged over the client's global options
/// when the run is created.
#[derive(Debug, Clone, Default, PartialEq, Builder, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Options {
    #[serde(flatten)]
    #[builder(default)]
    pub global: GlobalOptions,
    #[serde(skip_serializing_if = "is_false")]
    #[builder(default)]
    pub disable_cache: bool,
    /// Ask the caller to confirm tool calls via [`confirm`](crate::engine::Gptscript::confirm).
    #[serde(skip_serializing_if = "is_false")]
    #[builder(default)]
    pub confirm: bool,
    /// Input for the first turn. Later turns take their input from `next_chat`.
    #[serde(skip_serializing)]
    #[builder(default, into)]
    pub input: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    #[builder(default, into)]
    pub sub_tool: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    #[builder(default, into)]
    pub workspace: String,
    /// Opaque engine chat state to resume from.
    #[serde(skip_serializing_if = "String::is_empty")]
    #[builder(default, into)]
    pub chat_state: String,
    /// Forward frames to [`Run::events`](crate::run::Run::events).
    #[serde(skip_serializing_if = "is_false")]
    #[builder(default)]
    pub include_events: bool,
    /// Allow the engine to emit prompt frames.
    #[serde(skip_serializing_if = "is_false")]
    #[builder(default)]
    pub prompt: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[builder(default)]
    pub credential_overrides: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[builder(default)]
    pub credential_contexts: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    #[builder(default, into)]
    pub location: String,
    #[serde(skip_serializing_if = "is_false")]
    #[builder(default)]
    pub force_sequential: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl Options {
    /// Render the options as engine command-line flags.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.disable_cache {
            args.push("--disable-cache".to_string());
        }
        if !self.global.cache_dir.is_empty() {
            args.push(format!("--cache-dir={}", self.global.cache_dir));
        }
        if !self.global.default_model.is_empty() {
            args.push(format!("--default-model={}", self.global.default_model));
        }
        if !self.global.default_model_provider.is_empty() {
            args.push(format!(
                "--default-model-provider={}",
                self.global.default_model_provider
            ));
        }
        if !self.sub_tool.is_empty() {
            args.push(format!("--sub-tool={}", self.sub_tool));
        }
        if !self.workspace.is_empty() {
            args.push(format!("--workspace={}", self.workspace));
        }
        if !self.location.is_empty() {
            args.push(format!("--location={}", self.location));
        }
        if !self.credential_overrides.is_empty() {
            args.push(format!(
                "--credential-override={}",
                self.credential_overrides.join(",")
            ));
        }
        if !self.credential_contexts.is_empty() {
            args.push(format!(
                "--credential-context={}",
                self.credential_contexts.join(",")
            ));
        }
        if self.force_sequential {
            args.push("--force-sequential".to_string());
        }
        if self.confirm {
            args.push("--confirm".to_string());
        }
        args
    }
}

/// What a run executes: inline tool content or a script file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunTarget {
    /// Tool definitions rendered to text.
    Content(String),
    /// Path (or URL) to a script.
    File(String),
}

/// JSON body sent for `run` and `evaluate` requests.
#[derive(Debug, Clone, Serialize)]
pub struct RequestPayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<&'a str>,
    pub input: &'a str,
    #[serde(flatten)]
    pub options: &'a Options,
}

impl<'a> RequestPayload<'a> {
    pub fn new(target: &'a RunTarget, input: &'a str, options: &'a Options) -> Self {
        let (content, file) = match target {
            RunTarget::Content(content) => (Some(content.as_str()), None),
            RunTarget::File(file) => (None, Some(file.as_str())),
        };
        Self {
            content,
            file,
            input,
            options,
        }
    }
}

/// Options for [`list_models`](crate::engine::Gptscript::list_models).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListModelsOptions {
    pub providers: Vec<String>,
    pub credential_overrides: Vec<String>,
}

/// Options for [`parse`](crate::engine::Gptscript::parse).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    pub disable_cache: bool,
}

/// Options for the `load_*` family.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadOptions {
    pub disable_cache: bool,
    pub sub_tool: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn payload_flattens_options_and_selects_target() {
        let options = Options::builder()
            .disable_cache(true)
            .chat_state("{\"x\":1}")
            .input("ignored in body")
            .global(GlobalOptions {
                default_model: "gpt-4o".into(),
                token: "secret".into(),
                ..Default::default()
            })
            .build();
        let target = RunTarget::File("demo.gpt".into());

        let body = serde_json::to_value(RequestPayload::new(&target, "hello", &options)).unwrap();

        assert_eq!(
            body,
            json!({
                "file": "demo.gpt",
                "input": "hello",
                "DefaultModel": "gpt-4o",
                "disableCache": true,
                "chatState": "{\"x\":1}"
            })
        );
    }

    #[test]
    fn args_follow_option_flags() {
        let options = Options::builder()
            .disable_cache(true)
            .sub_tool("helper")
            .credential_overrides(vec!["a:b".into(), "c:d".into()])
            .build();

        assert_eq!(
            options.to_args(),
            vec![
                "--disable-cache".to_string(),
                "--sub-tool=helper".to_string(),
                "--credential-override=a:b,c:d".to_string(),
            ]
        );
    }
}
