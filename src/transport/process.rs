//! Subprocess transport: fork the engine binary once per request.
//!
//! The engine's stdout and stderr are read to completion and replayed in the
//! same wire format the SDK server streams. Events arrive live over an extra
//! pipe (unix only) that the engine writes to via `--events-stream-to`.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use super::{Transport, TransportRequest, TransportResponse};
use crate::error::{GptscriptError, Result};
use crate::protocol::best_effort_unquote;
use crate::types::Options;

/// Runs the engine binary directly.
#[derive(Debug, Clone)]
pub struct ProcessTransport {
    bin_path: PathBuf,
    env: Vec<String>,
}

impl ProcessTransport {
    pub fn new(bin_path: impl Into<PathBuf>) -> Self {
        Self {
            bin_path: bin_path.into(),
            env: Vec::new(),
        }
    }

    /// Extra `KEY=value` entries for every spawned engine.
    pub fn with_env(mut self, env: Vec<String>) -> Self {
        self.env = env;
        self
    }
}

/// Command line for one engine invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Invocation {
    pub args: Vec<String>,
    pub stdin: Option<String>,
    pub env: Vec<String>,
    pub events: bool,
}

#[derive(Deserialize)]
struct RunBody {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    input: String,
    #[serde(flatten)]
    options: Options,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ParseBody {
    content: Option<String>,
    file: Option<String>,
}

/// Translate a request into engine arguments.
pub(crate) fn plan(request: &TransportRequest) -> Result<Invocation> {
    let body = request.body.clone().unwrap_or(Value::Null);
    match request.path.as_str() {
        "run" | "evaluate" => {
            let body: RunBody = serde_json::from_value(body)?;
            let mut invocation = Invocation {
                args: body.options.to_args(),
                events: body.options.include_events,
                ..Default::default()
            };

            let chat_state = if body.options.chat_state.is_empty() {
                "null"
            } else {
                body.options.chat_state.as_str()
            };
            invocation.args.push(format!("--chat-state={chat_state}"));

            invocation.env = body.options.global.env.clone();
            invocation.env.extend(body.options.global.to_env());

            match (body.file, body.content) {
                (Some(file), _) => invocation.args.push(file),
                (None, Some(content)) => {
                    invocation.args.push("-".to_string());
                    invocation.stdin = Some(content);
                }
                (None, None) => {
                    return Err(GptscriptError::InvalidArgument(
                        "run request needs a file or content".into(),
                    ))
                }
            }
            if !body.input.is_empty() {
                invocation.args.push(body.input);
            }
            Ok(invocation)
        }
        "version" => Ok(Invocation {
            args: vec!["--version".into()],
            ..Default::default()
        }),
        "list-models" => Ok(Invocation {
            args: vec!["--list-models".into()],
            ..Default::default()
        }),
        "parse" => {
            let body: ParseBody = serde_json::from_value(body).unwrap_or_default();
            match (body.file, body.content) {
                (Some(file), _) => Ok(Invocation {
                    args: vec!["parse".into(), file],
                    ..Default::default()
                }),
                (None, Some(content)) => Ok(Invocation {
                    args: vec!["parse".into(), "-".into()],
                    stdin: Some(content),
                    ..Default::default()
                }),
                (None, None) => Err(GptscriptError::InvalidArgument(
                    "parse request needs a file or content".into(),
                )),
            }
        }
        "fmt" => Ok(Invocation {
            args: vec!["fmt".into(), "-".into()],
            stdin: Some(body.to_string()),
            ..Default::default()
        }),
        other => Err(GptscriptError::UnsupportedOperation(format!(
            "{other} is not available when the engine runs as a subprocess"
        ))),
    }
}

/// Encode one wire chunk.
fn wire_chunk(value: &Value) -> Vec<u8> {
    let mut line = value.to_string().into_bytes();
    line.extend_from_slice(b"\n\n");
    line
}

/// Wrap the engine's stdout: objects stay structured, anything else is text.
fn stdout_chunk(stdout: &[u8]) -> Vec<u8> {
    let text = String::from_utf8_lossy(stdout);
    let value = match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(object)) => Value::Object(object),
        _ => Value::String(best_effort_unquote(&text)),
    };
    wire_chunk(&json!({ "stdout": value }))
}

fn move_key(from: &mut Map<String, Value>, key: &str, to: &mut Map<String, Value>, as_key: &str) {
    if let Some(value) = from.remove(key).filter(|v| !v.is_null()) {
        to.insert(as_key.to_string(), value);
    }
}

/// Convert one CLI event line into a wire frame.
pub(crate) fn event_to_frame(line: &str) -> Option<Value> {
    let Ok(Value::Object(mut event)) = serde_json::from_str::<Value>(line) else {
        debug!(line = %line, "skipping undecodable event");
        return None;
    };
    if ["run", "call", "prompt"].iter().any(|k| event.contains_key(*k)) {
        return Some(Value::Object(event));
    }

    let event_type = event.get("type")?.as_str()?.to_string();
    let mut frame = Map::new();
    if event_type.starts_with("run") {
        move_key(&mut event, "runID", &mut frame, "id");
        move_key(&mut event, "program", &mut frame, "program");
        move_key(&mut event, "input", &mut frame, "input");
        move_key(&mut event, "output", &mut frame, "output");
        move_key(&mut event, "err", &mut frame, "error");
        move_key(&mut event, "time", &mut frame, "start");
        frame.insert("type".into(), Value::String(event_type));
        return Some(json!({ "run": frame }));
    }
    if event_type.starts_with("call") {
        if let Some(Value::Object(context)) = event.remove("callContext") {
            frame.extend(context);
        }
        move_key(&mut event, "input", &mut frame, "input");
        move_key(&mut event, "time", &mut frame, "start");
        let content = event
            .remove("output")
            .or_else(|| event.remove("content"))
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        if !content.is_empty() {
            frame.insert("output".into(), json!([{ "content": content }]));
        }
        frame.insert("type".into(), Value::String(event_type));
        return Some(json!({ "call": frame }));
    }

    debug!(event_type = %event_type, "skipping unknown event type");
    None
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

#[async_trait]
impl Transport for ProcessTransport {
    async fn open(&self, request: TransportRequest) -> Result<TransportResponse> {
        let invocation = plan(&request)?;

        let mut command = Command::new(&self.bin_path);
        command.kill_on_drop(true);
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        command.stdin(if invocation.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        for entry in self.env.iter().chain(invocation.env.iter()) {
            if let Some((key, value)) = entry.split_once('=') {
                command.env(key, value);
            }
        }

        #[cfg(unix)]
        let events = if invocation.events {
            let (read, write) = events_fd::pipe()?;
            events_fd::install(&mut command, &write);
            command.arg("--events-stream-to").arg(events_fd::CHILD_FD_URI);
            Some((read, write))
        } else {
            None
        };

        command.args(&invocation.args);
        debug!(bin = %self.bin_path.display(), args = ?invocation.args, "spawning engine");
        let mut child = command.spawn()?;

        #[cfg(unix)]
        let events = match events {
            Some((read, write)) => {
                drop(write);
                Some(tokio::net::unix::pipe::Receiver::from_file(std::fs::File::from(read))?)
            }
            None => None,
        };
        #[cfg(not(unix))]
        let events: Option<tokio::io::Empty> = {
            if invocation.events {
                warn!("event streaming from a subprocess is only supported on unix");
            }
            None
        };

        if let (Some(content), Some(mut stdin)) = (invocation.stdin, child.stdin.take()) {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(content.as_bytes()).await {
                    warn!(error = %e, "failed to write tool content to engine stdin");
                }
            });
        }

        let stdout_task = tokio::spawn(read_all(child.stdout.take()));
        let stderr_task = tokio::spawn(read_all(child.stderr.take()));

        let body = async_stream::stream! {
            let mut child = child;

            if let Some(events) = events {
                let mut lines = BufReader::new(events).lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => {
                            if let Some(frame) = event_to_frame(&line) {
                                yield Ok(wire_chunk(&frame));
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            debug!(error = %e, "events pipe closed with error");
                            break;
                        }
                    }
                }
            }

            let stderr = match stderr_task.await {
                Ok(Ok(bytes)) => bytes,
                Ok(Err(e)) => { yield Err(GptscriptError::Io(e)); return; }
                Err(e) => { yield Err(GptscriptError::Io(std::io::Error::other(e))); return; }
            };
            let stdout = match stdout_task.await {
                Ok(Ok(bytes)) => bytes,
                Ok(Err(e)) => { yield Err(GptscriptError::Io(e)); return; }
                Err(e) => { yield Err(GptscriptError::Io(std::io::Error::other(e))); return; }
            };

            if !stderr.is_empty() {
                let text = best_effort_unquote(&String::from_utf8_lossy(&stderr));
                yield Ok(wire_chunk(&json!({ "stderr": text })));
            }

            match child.wait().await {
                Ok(status) if status.success() => {
                    if !stdout.is_empty() {
                        yield Ok(stdout_chunk(&stdout));
                    }
                }
                Ok(status) => {
                    yield Err(GptscriptError::Io(std::io::Error::other(format!(
                        "engine exited with {status}"
                    ))));
                }
                Err(e) => yield Err(GptscriptError::Io(e)),
            }
        };

        Ok(TransportResponse {
            status: 200,
            body: body.boxed(),
        })
    }
}

#[cfg(unix)]
mod events_fd {
    use std::io;
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

    use tokio::process::Command;

    /// Descriptor number the engine sees the events pipe as.
    const CHILD_FD: RawFd = 3;
    pub(super) const CHILD_FD_URI: &str = "fd://3";

    /// A close-on-exec pipe; returns (read, write).
    pub(super) fn pipe() -> io::Result<(OwnedFd, OwnedFd)> {
        let mut fds: [libc::c_int; 2] = [0; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
        set_cloexec(read.as_raw_fd(), true)?;
        set_cloexec(write.as_raw_fd(), true)?;
        Ok((read, write))
    }

    fn set_cloexec(fd: RawFd, on: bool) -> io::Result<()> {
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        let flags = if on {
            flags | libc::FD_CLOEXEC
        } else {
            flags & !libc::FD_CLOEXEC
        };
        if unsafe { libc::fcntl(fd, libc::F_SETFD, flags) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Make the write end appear as descriptor 3 in the child.
    pub(super) fn install(command: &mut Command, write: &OwnedFd) {
        let fd = write.as_raw_fd();
        // Only async-signal-safe calls between fork and exec.
        unsafe {
            command.pre_exec(move || {
                if fd == CHILD_FD {
                    set_cloexec(CHILD_FD, false)
                } else if libc::dup2(fd, CHILD_FD) < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(())
                }
            });
        }
    }
}
