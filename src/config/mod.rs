//! Configuration system (layered: explicit options > env > defaults).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const ENV_URL: &str = "GPTSCRIPT_URL";
pub const ENV_TOKEN: &str = "GPTSCRIPT_TOKEN";
pub const ENV_BIN: &str = "GPTSCRIPT_BIN";
pub const ENV_DISABLE_SERVER: &str = "GPTSCRIPT_DISABLE_SERVER";
pub const ENV_WORKSPACE_ID: &str = "GPTSCRIPT_WORKSPACE_ID";

/// Prefix in `GPTSCRIPT_BIN` meaning "relative to the running executable".
const RELATIVE_TO_BINARY: &str = "<me>";

const DEFAULT_BIN: &str = "gptscript";

/// Settings applied to every request made through a client handle.
///
/// Per-call [`Options`](crate::types::Options) embed a copy of these; the
/// per-call values win wherever they are set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalOptions {
    /// Base URL of an already running SDK server. Client-side only.
    #[serde(skip)]
    pub url: String,
    /// Bearer token sent in the `Authorization` header. Client-side only.
    #[serde(skip)]
    pub token: String,
    #[serde(rename = "APIKey", default, skip_serializing_if = "String::is_empty")]
    pub openai_api_key: String,
    #[serde(rename = "BaseURL", default, skip_serializing_if = "String::is_empty")]
    pub openai_base_url: String,
    #[serde(rename = "DefaultModel", default, skip_serializing_if = "String::is_empty")]
    pub default_model: String,
    #[serde(
        rename = "DefaultModelProvider",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub default_model_provider: String,
    #[serde(rename = "CacheDir", default, skip_serializing_if = "String::is_empty")]
    pub cache_dir: String,
    #[serde(rename = "env", default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    /// Dataset tool override, sent with each dataset request.
    #[serde(skip)]
    pub dataset_tool: String,
    /// Workspace tool override, sent with each workspace request.
    #[serde(skip)]
    pub workspace_tool: String,
}

fn first_set(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

impl GlobalOptions {
    /// Load from the environment (`GPTSCRIPT_URL`, `GPTSCRIPT_TOKEN`), reading `.env` if present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self {
            url: non_empty_env(ENV_URL).unwrap_or_default(),
            token: non_empty_env(ENV_TOKEN).unwrap_or_default(),
            ..Self::default()
        }
    }

    /// Merge layers in order; later non-empty values win and env lists are appended.
    pub fn merge<'a>(layers: impl IntoIterator<Item = &'a GlobalOptions>) -> Self {
        let mut result = Self::default();
        for layer in layers {
            result.url = first_set(&layer.url, &result.url);
            result.token = first_set(&layer.token, &result.token);
            result.openai_api_key = first_set(&layer.openai_api_key, &result.openai_api_key);
            result.openai_base_url = first_set(&layer.openai_base_url, &result.openai_base_url);
            result.default_model = first_set(&layer.default_model, &result.default_model);
            result.default_model_provider =
                first_set(&layer.default_model_provider, &result.default_model_provider);
            result.cache_dir = first_set(&layer.cache_dir, &result.cache_dir);
            result.dataset_tool = first_set(&layer.dataset_tool, &result.dataset_tool);
            result.workspace_tool = first_set(&layer.workspace_tool, &result.workspace_tool);
            result.env.extend(layer.env.iter().cloned());
        }
        result
    }

    /// Environment entries (`KEY=value`) the engine reads for these options.
    pub fn to_env(&self) -> Vec<String> {
        let mut env = Vec::new();
        if !self.openai_api_key.is_empty() {
            env.push(format!("OPENAI_API_KEY={}", self.openai_api_key));
        }
        if !self.openai_base_url.is_empty() {
            env.push(format!("OPENAI_BASE_URL={}", self.openai_base_url));
        }
        if !self.default_model.is_empty() {
            env.push(format!("GPTSCRIPT_SDKSERVER_DEFAULT_MODEL={}", self.default_model));
        }
        if !self.default_model_provider.is_empty() {
            env.push(format!(
                "GPTSCRIPT_SDKSERVER_DEFAULT_MODEL_PROVIDER={}",
                self.default_model_provider
            ));
        }
        env
    }
}

/// How a client handle reaches the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportMode {
    /// Talk to an SDK server over HTTP, spawning one if needed.
    #[default]
    Http,
    /// Fork the engine binary once per run.
    Process,
}

/// Process-level bootstrap settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Engine binary to spawn.
    pub bin_path: PathBuf,
    /// Never spawn a local SDK server.
    pub disable_server: bool,
    /// Default workspace for workspace operations.
    pub workspace_id: Option<String>,
    pub transport: TransportMode,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            bin_path: PathBuf::from(DEFAULT_BIN),
            disable_server: false,
            workspace_id: None,
            transport: TransportMode::Http,
        }
    }
}

impl EngineSettings {
    /// Load from `GPTSCRIPT_BIN`, `GPTSCRIPT_DISABLE_SERVER` and `GPTSCRIPT_WORKSPACE_ID`.
    pub fn from_env() -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));
        let bin_path = match non_empty_env(ENV_BIN) {
            Some(bin) => match exe_dir {
                Some(dir) => resolve_bin(&dir, &bin),
                None => PathBuf::from(bin),
            },
            None => PathBuf::from(DEFAULT_BIN),
        };

        Self {
            bin_path,
            disable_server: non_empty_env(ENV_DISABLE_SERVER).is_some_and(|v| v == "true"),
            workspace_id: non_empty_env(ENV_WORKSPACE_ID),
            transport: TransportMode::Http,
        }
    }

    pub fn with_transport(mut self, transport: TransportMode) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_bin_path(mut self, bin_path: impl Into<PathBuf>) -> Self {
        self.bin_path = bin_path.into();
        self
    }
}

/// Resolve a `GPTSCRIPT_BIN` value, expanding the `<me>` prefix against `dir`.
pub fn resolve_bin(dir: &Path, bin: &str) -> PathBuf {
    let Some(rest) = bin.strip_prefix(RELATIVE_TO_BINARY) else {
        return PathBuf::from(bin);
    };

    let resolved = dir.join(rest.trim_start_matches(&['/', '\\'][..]));
    if resolved.is_absolute() {
        resolved
    } else {
        Path::new(".").join(resolved)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn merge_prefers_later_non_empty_values() {
        let base = GlobalOptions {
            openai_api_key: "base-key".into(),
            default_model: "gpt-4o".into(),
            env: vec!["A=1".into()],
            ..Default::default()
        };
        let overrides = GlobalOptions {
            default_model: "gpt-4o-mini".into(),
            env: vec!["B=2".into()],
            ..Default::default()
        };

        let merged = GlobalOptions::merge([&base, &overrides]);

        assert_eq!(merged.openai_api_key, "base-key");
        assert_eq!(merged.default_model, "gpt-4o-mini");
        assert_eq!(merged.env, vec!["A=1".to_string(), "B=2".to_string()]);
    }

    #[test]
    fn to_env_only_renders_set_values() {
        let opts = GlobalOptions {
            openai_api_key: "sk-test".into(),
            default_model_provider: "anthropic".into(),
            ..Default::default()
        };

        assert_eq!(
            opts.to_env(),
            vec![
                "OPENAI_API_KEY=sk-test".to_string(),
                "GPTSCRIPT_SDKSERVER_DEFAULT_MODEL_PROVIDER=anthropic".to_string(),
            ]
        );
    }

    #[test]
    fn url_and_token_never_serialize() {
        let opts = GlobalOptions {
            url: "http://127.0.0.1:9090".into(),
            token: "secret".into(),
            default_model: "m".into(),
            ..Default::default()
        };

        let value = serde_json::to_value(&opts).unwrap();
        assert_eq!(value, serde_json::json!({"DefaultModel": "m"}));
    }

    #[test]
    fn resolve_bin_leaves_plain_paths_alone() {
        assert_eq!(
            resolve_bin(Path::new("/opt/app"), "/usr/local/bin/gptscript"),
            PathBuf::from("/usr/local/bin/gptscript")
        );
    }

    #[test]
    fn resolve_bin_expands_relative_to_binary_prefix() {
        assert_eq!(
            resolve_bin(Path::new("/opt/app"), "<me>/bin/gptscript"),
            PathBuf::from("/opt/app/bin/gptscript")
        );
        assert_eq!(
            resolve_bin(Path::new("app"), "<me>/gptscript"),
            PathBuf::from("./app/gptscript")
        );
    }
}
