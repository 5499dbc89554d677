//! The client handle: bootstraps a transport and exposes the engine's verbs.

mod credentials;
mod datasets;
pub mod registry;
mod workspace;

pub use registry::ServerRegistry;

use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::{EngineSettings, GlobalOptions, TransportMode, ENV_TOKEN, ENV_URL};
use crate::error::Result;
use crate::run::Run;
use crate::transport::http::normalize_url;
use crate::transport::{HttpTransport, ProcessTransport, Transport};
use crate::types::{
    render_tools, AuthResponse, Document, ListModelsOptions, LoadOptions, Node, Options,
    ParseOptions, Program, PromptResponse, RunTarget, ToolDef,
};

/// Address used when server auto-start is disabled and no URL was given.
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:9090";

/// A handle on the engine.
///
/// Handles created with [`Gptscript::new`] share one SDK server per process;
/// call [`close`](Self::close) when done so the last handle can stop it.
pub struct Gptscript {
    global: GlobalOptions,
    workspace_id: Option<String>,
    transport: Arc<dyn Transport>,
    lease: Option<Arc<ServerRegistry>>,
    released: AtomicBool,
}

impl std::fmt::Debug for Gptscript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gptscript")
            .field("url", &self.global.url)
            .field("workspace_id", &self.workspace_id)
            .field("shares_server", &self.lease.is_some())
            .finish_non_exhaustive()
    }
}

fn process_env() -> Vec<String> {
    std::env::vars().map(|(key, value)| format!("{key}={value}")).collect()
}

impl Gptscript {
    /// Connect using settings from the environment and the process-wide
    /// server registry.
    pub async fn new(options: GlobalOptions) -> Result<Self> {
        Self::with_settings(options, EngineSettings::from_env(), ServerRegistry::global()).await
    }

    /// Connect with explicit bootstrap settings and registry.
    pub async fn with_settings(
        options: GlobalOptions,
        settings: EngineSettings,
        registry: Arc<ServerRegistry>,
    ) -> Result<Self> {
        let mut global = GlobalOptions::merge([&GlobalOptions::from_env(), &options]);
        if global.env.is_empty() {
            global.env = process_env();
        }
        let engine_env = global.to_env();
        global.env.extend(engine_env);

        if settings.transport == TransportMode::Process {
            debug!(bin = %settings.bin_path.display(), "using process transport");
            let transport =
                ProcessTransport::new(settings.bin_path.clone()).with_env(global.env.clone());
            return Ok(Self::assemble(global, settings.workspace_id, Arc::new(transport), None));
        }

        let mut lease = None;
        if global.url.is_empty() {
            if settings.disable_server {
                global.url = DEFAULT_SERVER_URL.to_string();
            } else {
                global.url = registry.acquire(&settings.bin_path, &global.env).await?;
                lease = Some(registry);
            }
        }
        global.url = normalize_url(&global.url);

        let url_entry = format!("{ENV_URL}={}", global.url);
        global.env.push(url_entry);
        if !global.token.is_empty() {
            let token_entry = format!("{ENV_TOKEN}={}", global.token);
            global.env.push(token_entry);
        }

        debug!(url = %global.url, "using http transport");
        let transport = HttpTransport::new(&global.url, Some(global.token.clone()));
        Ok(Self::assemble(global, settings.workspace_id, Arc::new(transport), lease))
    }

    /// Use a caller-supplied transport. No server is started.
    pub fn with_transport(options: GlobalOptions, transport: Arc<dyn Transport>) -> Self {
        let url = transport.base_url().unwrap_or_default().to_string();
        let global = GlobalOptions {
            url: first_non_empty(&options.url, &url),
            ..options
        };
        Self::assemble(global, None, transport, None)
    }

    fn assemble(
        global: GlobalOptions,
        workspace_id: Option<String>,
        transport: Arc<dyn Transport>,
        lease: Option<Arc<ServerRegistry>>,
    ) -> Self {
        Self {
            global,
            workspace_id,
            transport,
            lease,
            released: AtomicBool::new(false),
        }
    }

    /// Set the default workspace for workspace and dataset operations.
    pub fn with_workspace_id(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self
    }

    /// Base URL of the server this handle talks to. Empty in process mode.
    pub fn url(&self) -> &str {
        &self.global.url
    }

    pub fn global_options(&self) -> &GlobalOptions {
        &self.global
    }

    /// Release this handle's reference on the shared server.
    pub async fn close(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(registry) = &self.lease {
            registry.release().await;
        }
    }

    fn complete(&self, mut options: Options) -> Options {
        options.global = GlobalOptions::merge([&self.global, &options.global]);
        options
    }

    async fn start_chat(&self, path: &str, target: RunTarget, options: Options) -> Result<Run> {
        let options = self.complete(options);
        let input = options.input.clone();
        Run::chat(Arc::clone(&self.transport), path, target, options)
            .next_chat(input)
            .await
    }

    /// Evaluate tool definitions (anything that renders to script text).
    pub async fn evaluate<T: Display>(&self, options: Options, tools: &[T]) -> Result<Run> {
        self.start_chat("evaluate", RunTarget::Content(render_tools(tools)), options)
            .await
    }

    /// Run a script file (or URL) known to the engine.
    pub async fn run(&self, tool_path: impl Into<String>, options: Options) -> Result<Run> {
        self.start_chat("run", RunTarget::File(tool_path.into()), options)
            .await
    }

    /// Send one request to a non-chat endpoint and return its output.
    pub async fn run_basic_command(&self, request_path: &str, body: Option<Value>) -> Result<String> {
        let run = Run::basic(Arc::clone(&self.transport), request_path, body).await;
        run.text().await
    }

    async fn basic<B: Serialize>(&self, request_path: &str, body: &B) -> Result<String> {
        let body = serde_json::to_value(body)?;
        self.run_basic_command(request_path, Some(body)).await
    }

    /// Output of `gptscript --version`.
    pub async fn version(&self) -> Result<String> {
        self.run_basic_command("version", None).await
    }

    pub async fn list_models(&self, options: ListModelsOptions) -> Result<Vec<String>> {
        let mut providers = options.providers;
        if !self.global.default_model_provider.is_empty() {
            providers.push(self.global.default_model_provider.clone());
        }

        let out = self
            .basic(
                "list-models",
                &json!({
                    "providers": providers,
                    "env": self.global.env,
                    "credentialOverrides": options.credential_overrides,
                }),
            )
            .await?;

        Ok(out
            .trim()
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Parse a script file into nodes.
    pub async fn parse(&self, file: &str, options: ParseOptions) -> Result<Vec<Node>> {
        let out = self
            .basic("parse", &json!({"file": file, "disableCache": options.disable_cache}))
            .await?;
        parse_document(&out)
    }

    /// Parse script text into nodes.
    pub async fn parse_content(&self, content: &str) -> Result<Vec<Node>> {
        let out = self.basic("parse", &json!({"content": content})).await?;
        parse_document(&out)
    }

    /// Render nodes back into script text.
    pub async fn fmt(&self, mut nodes: Vec<Node>) -> Result<String> {
        for text in nodes.iter_mut().filter_map(|node| node.text_node.as_mut()) {
            text.combine();
        }
        self.basic("fmt", &Document { nodes }).await
    }

    pub async fn load_file(&self, file: &str, options: LoadOptions) -> Result<Program> {
        self.load(json!({"file": file}), options).await
    }

    pub async fn load_content(&self, content: &str, options: LoadOptions) -> Result<Program> {
        self.load(json!({"content": content}), options).await
    }

    pub async fn load_tools(&self, tool_defs: &[ToolDef], options: LoadOptions) -> Result<Program> {
        self.load(json!({"toolDefs": tool_defs}), options).await
    }

    async fn load(&self, mut payload: Value, options: LoadOptions) -> Result<Program> {
        if let Some(map) = payload.as_object_mut() {
            if options.disable_cache {
                map.insert("disableCache".into(), Value::Bool(true));
            }
            if !options.sub_tool.is_empty() {
                map.insert("subTool".into(), Value::String(options.sub_tool));
            }
        }

        #[derive(Deserialize)]
        struct LoadResponse {
            #[serde(default)]
            program: Program,
        }

        let out = self.run_basic_command("load", Some(payload)).await?;
        let response: LoadResponse = serde_json::from_str(&out)?;
        Ok(response.program)
    }

    /// Answer a `callConfirm` frame.
    pub async fn confirm(&self, response: AuthResponse) -> Result<()> {
        let path = format!("confirm/{}", response.id);
        self.basic(&path, &response).await.map(drop)
    }

    /// Answer a prompt frame.
    pub async fn prompt_response(&self, response: PromptResponse) -> Result<()> {
        let path = format!("prompt-response/{}", response.id);
        self.basic(&path, &response.responses).await.map(drop)
    }

    /// Workspace ID for an operation: explicit, then the handle's default.
    fn workspace_for(&self, explicit: Option<String>) -> String {
        explicit
            .filter(|id| !id.is_empty())
            .or_else(|| self.workspace_id.clone())
            .unwrap_or_default()
    }
}

impl Drop for Gptscript {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(registry) = self.lease.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { registry.release().await });
            }
            Err(_) => warn!("client dropped outside a runtime without close(); server left running"),
        }
    }
}

fn first_non_empty(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

fn parse_document(out: &str) -> Result<Vec<Node>> {
    let mut document: Document = serde_json::from_str(out)?;
    for text in document
        .nodes
        .iter_mut()
        .filter_map(|node| node.text_node.as_mut())
    {
        text.process();
    }
    Ok(document.nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsed_documents_split_fmt_directives() {
        let nodes = parse_document(
            r#"{"nodes":[{"textNode":{"text":"!metadata:a:b\nbody"}},{"toolNode":{"tool":{"name":"t"}}}]}"#,
        )
        .unwrap();

        let text = nodes[0].text_node.as_ref().unwrap();
        assert_eq!(text.fmt, "metadata:a:b");
        assert_eq!(text.text, "body");
        assert_eq!(nodes[1].tool_node.as_ref().unwrap().tool.name, "t");
    }

    #[tokio::test]
    async fn disabled_server_falls_back_to_default_url() {
        let settings = EngineSettings {
            disable_server: true,
            ..Default::default()
        };
        let engine = Gptscript::with_settings(
            GlobalOptions::default(),
            settings,
            Arc::new(ServerRegistry::new()),
        )
        .await
        .unwrap();

        if std::env::var(ENV_URL).map_or(true, |url| url.trim().is_empty()) {
            assert_eq!(engine.url(), DEFAULT_SERVER_URL);
        }
        assert!(engine
            .global_options()
            .env
            .iter()
            .any(|entry| entry.starts_with("GPTSCRIPT_URL=")));
    }
}
