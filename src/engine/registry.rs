//! Process-wide supervisor for the shared SDK server.
//!
//! The first client to [`acquire`](ServerRegistry::acquire) spawns
//! `gptscript sys.sdkserver` and waits for it to answer `/healthz`; later
//! clients share its address. The last [`release`](ServerRegistry::release)
//! stops it.

use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStderr, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{GptscriptError, Result};
use crate::transport::http::{normalize_url, shared_client};
use crate::util::timeout::poll_until;

/// How long a freshly spawned server gets to become healthy.
const READY_TIMEOUT: Duration = Duration::from_secs(5);
const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Older servers print `... addr=<host:port>` instead of a bare address.
const ADDR_MARKER: &str = "addr=";

static GLOBAL: OnceLock<Arc<ServerRegistry>> = OnceLock::new();

struct ServerProcess {
    child: Child,
    // Held open: the server exits when its stdin closes.
    _stdin: Option<ChildStdin>,
    drain: JoinHandle<()>,
}

impl ServerProcess {
    async fn stop(mut self) {
        self.drain.abort();
        if let Err(e) = self.child.kill().await {
            debug!(error = %e, "sdk server already exited");
        }
    }
}

#[derive(Default)]
struct RegistryState {
    handles: usize,
    url: Option<String>,
    server: Option<ServerProcess>,
}

/// Reference-counted owner of the shared server process.
#[derive(Default)]
pub struct ServerRegistry {
    state: Mutex<RegistryState>,
}

impl std::fmt::Debug for ServerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerRegistry").finish_non_exhaustive()
    }
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by every client in this process.
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::new())))
    }

    /// Number of clients currently holding the server.
    pub async fn handles(&self) -> usize {
        self.state.lock().await.handles
    }

    /// Take a reference on the shared server, starting it if needed, and
    /// return its base URL.
    pub async fn acquire(&self, bin_path: &Path, env: &[String]) -> Result<String> {
        let mut state = self.state.lock().await;
        if let Some(url) = state.url.clone() {
            state.handles += 1;
            return Ok(url);
        }

        let (server, url) = spawn_server(bin_path, env).await?;
        if let Err(e) = wait_ready(&url).await {
            warn!(url = %url, "sdk server never became healthy");
            server.stop().await;
            return Err(e);
        }

        info!(url = %url, "sdk server started");
        state.server = Some(server);
        state.url = Some(url.clone());
        state.handles += 1;
        Ok(url)
    }

    /// Drop a reference; the last one stops the server.
    pub async fn release(&self) {
        let mut state = self.state.lock().await;
        state.handles = state.handles.saturating_sub(1);
        if state.handles > 0 {
            return;
        }

        state.url = None;
        if let Some(server) = state.server.take() {
            info!("stopping sdk server");
            server.stop().await;
        }
    }
}

async fn spawn_server(bin_path: &Path, env: &[String]) -> Result<(ServerProcess, String)> {
    let mut command = Command::new(bin_path);
    command
        .args(["sys.sdkserver", "--listen-address", "127.0.0.1:0"])
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in env.iter().filter_map(|entry| entry.split_once('=')) {
        command.env(key, value);
    }

    debug!(bin = %bin_path.display(), "spawning sdk server");
    let mut child = command.spawn().map_err(|e| {
        GptscriptError::Configuration(format!(
            "failed to start server {}: {e}",
            bin_path.display()
        ))
    })?;

    let stdin = child.stdin.take();
    let Some(stderr) = child.stderr.take() else {
        return Err(GptscriptError::Configuration("failed to get stderr pipe".into()));
    };

    let mut lines = BufReader::new(stderr).lines();
    let first = match lines.next_line().await {
        Ok(Some(line)) => line,
        Ok(None) => {
            return Err(GptscriptError::Configuration(
                "failed to read server address: stderr closed".into(),
            ))
        }
        Err(e) => {
            return Err(GptscriptError::Configuration(format!(
                "failed to read server address: {e}"
            )))
        }
    };

    let url = normalize_url(parse_address(&first));
    let drain = tokio::spawn(drain_stderr(lines));

    Ok((
        ServerProcess {
            child,
            _stdin: stdin,
            drain,
        },
        url,
    ))
}

/// The listen address from the server's first stderr line.
pub(crate) fn parse_address(line: &str) -> &str {
    match line.split_once(ADDR_MARKER) {
        Some((_, addr)) => addr.trim(),
        None => line.trim(),
    }
}

async fn drain_stderr(mut lines: tokio::io::Lines<BufReader<ChildStderr>>) {
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!(target: "gptscript::sdkserver", "{line}"),
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "sdk server stderr closed");
                break;
            }
        }
    }
}

async fn wait_ready(url: &str) -> Result<()> {
    let health = format!("{url}/healthz");
    let health = health.as_str();
    poll_until(READY_TIMEOUT, READY_POLL_INTERVAL, move || async move {
        match shared_client().get(health).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                debug!(status = %resp.status(), "sdk server not ready");
                false
            }
            Err(e) => {
                debug!(error = %e, "sdk server not ready");
                false
            }
        }
    })
    .await
}
