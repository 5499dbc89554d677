//! The run state machine and chat continuation.
//!
//! A [`Run`] is one request to the engine. Once dispatched, a background task
//! decodes the response body and updates the run's output, calls, program and
//! chat state. Callers block in [`Run::text`] until the turn resolves, or read
//! frames as they arrive from [`Run::events`].
//!
//! ```no_run
//! use gptscript::prelude::*;
//!
//! # async fn example() -> gptscript::error::Result<()> {
//! let engine = Gptscript::new(GlobalOptions::from_env()).await?;
//! let tool = ToolDef::builder().instructions("Who was the first president?").chat(true).build();
//!
//! let run = engine.evaluate(Options::default(), &[tool]).await?;
//! println!("{}", run.text().await?);
//!
//! let follow_up = run.next_chat("And the second?").await?;
//! println!("{}", follow_up.text().await?);
//! engine.close().await;
//! # Ok(())
//! # }
//! ```

pub mod state;

pub use state::RunState;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::StreamExt;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{GptscriptError, Result, RunError};
use crate::protocol::{self, StdoutChunk, StreamUnit};
use crate::transport::{BodyStream, Transport, TransportRequest};
use crate::types::{
    CallFrame, Frame, Options, Program, RequestPayload, RunEventType, RunTarget, Usage,
};

/// Frames buffered for a slow event consumer before the run waits on it.
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
enum RunKind {
    /// `run` or `evaluate`: stdout objects are chat envelopes.
    Chat { target: RunTarget, options: Options },
    /// Any other endpoint: stdout objects are plain output.
    Basic { body: Option<Value> },
}

/// State written by the consume task and read by everyone else.
#[derive(Debug, Default)]
struct RunShared {
    state: RunState,
    output: String,
    error_output: String,
    raw_output: Option<Map<String, Value>>,
    chat_state: Option<String>,
    /// `done` of the last chat envelope, if one was seen.
    done: Option<bool>,
    calls: HashMap<String, CallFrame>,
    parent_call_id: Option<String>,
    program: Option<Program>,
    response_status: Option<u16>,
    error: Option<RunError>,
}

impl RunShared {
    fn apply_envelope(&mut self, envelope: Map<String, Value>) {
        self.output = match envelope.get("content") {
            Some(Value::String(content)) => content.clone(),
            _ => Value::Object(envelope.clone()).to_string(),
        };
        self.chat_state = match envelope.get("state") {
            None | Some(Value::Null) => None,
            Some(state) => Some(state.to_string()),
        };
        self.done = Some(envelope.get("done").and_then(Value::as_bool).unwrap_or(false));
        self.raw_output = Some(envelope);
    }

    fn apply_frame(&mut self, frame: &Frame) {
        match frame {
            Frame::Run(run) => match run.event_type {
                RunEventType::RunStart if self.program.is_none() => {
                    self.program = Some(run.program.clone());
                }
                RunEventType::RunFinish if !run.error.is_empty() => {
                    self.record_error(RunError::Engine(run.error.clone()));
                }
                _ => {}
            },
            Frame::Call(call) => {
                if call.is_root() {
                    self.parent_call_id = Some(call.id.clone());
                }
                self.calls.insert(call.id.clone(), call.clone());
            }
            Frame::Prompt(_) => {}
        }
    }

    /// First error wins.
    fn record_error(&mut self, error: RunError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }
}

struct RunInner {
    id: Uuid,
    transport: Arc<dyn Transport>,
    request_path: String,
    kind: RunKind,
    input: String,
    /// Chat state this turn was started with; carried forward if it errors.
    incoming_chat_state: String,
    shared: RwLock<RunShared>,
    cancel: CancellationToken,
    resolved: watch::Sender<bool>,
    events: Mutex<Option<mpsc::Receiver<Frame>>>,
    started: AtomicBool,
}

impl RunInner {
    fn read(&self) -> RwLockReadGuard<'_, RunShared> {
        self.shared.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RunShared> {
        self.shared.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_chat(&self) -> bool {
        matches!(self.kind, RunKind::Chat { .. })
    }

    fn options(&self) -> Option<&Options> {
        match &self.kind {
            RunKind::Chat { options, .. } => Some(options),
            RunKind::Basic { .. } => None,
        }
    }

    fn is_resolved(&self) -> bool {
        *self.resolved.borrow()
    }

    /// Fail before any body was consumed.
    fn fail(&self, error: RunError, status: Option<u16>, error_output: String) {
        {
            let mut shared = self.write();
            shared.record_error(error);
            shared.response_status = status;
            shared.error_output.push_str(&error_output);
            shared.state = RunState::Error;
        }
        self.resolved.send_replace(true);
    }

    fn apply_stdout(&self, chunk: StdoutChunk) {
        let chat = self.is_chat();
        let mut shared = self.write();
        match chunk {
            StdoutChunk::Text(text) => shared.output.push_str(&text),
            StdoutChunk::Raw(raw) => shared.output.push_str(&raw),
            StdoutChunk::Envelope(envelope) if chat => shared.apply_envelope(envelope),
            StdoutChunk::Envelope(envelope) => {
                shared.output.push_str(&Value::Object(envelope).to_string())
            }
        }
    }

    /// Settle the final state and wake every waiter. `cancelled` is whether
    /// the consume loop stopped on cancellation rather than end of stream.
    fn resolve(&self, cancelled: bool) {
        let state = {
            let mut shared = self.write();
            if cancelled {
                shared.record_error(RunError::Cancelled);
            }
            shared.state = if shared.error.is_some() {
                RunState::Error
            } else if shared.done == Some(false) {
                RunState::Continue
            } else {
                RunState::Finished
            };
            shared.state
        };
        debug!(run_id = %self.id, state = %state, "run resolved");
        self.resolved.send_replace(true);
    }
}

/// Read a whole (error) body as text.
async fn collect_body(mut body: BodyStream) -> String {
    let mut bytes = Vec::new();
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(chunk) => bytes.extend_from_slice(&chunk),
            Err(e) => {
                debug!(error = %e, "error body ended early");
                break;
            }
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// The consume loop: one task per dispatched run.
async fn consume(inner: Arc<RunInner>, body: BodyStream, mut events: Option<mpsc::Sender<Frame>>) {
    let mut units = protocol::decode_stream(body);
    let mut cancelled = false;

    loop {
        let next = tokio::select! {
            biased;
            _ = inner.cancel.cancelled() => {
                cancelled = true;
                break;
            }
            next = units.next() => next,
        };

        let unit = match next {
            None => break,
            Some(Ok(unit)) => unit,
            Some(Err(e)) => {
                warn!(run_id = %inner.id, error = %e, "run output stream failed");
                inner.write().record_error(RunError::Stream(e.to_string()));
                break;
            }
        };

        match unit {
            StreamUnit::Stdout(chunk) => inner.apply_stdout(chunk),
            StreamUnit::Stderr(text) => inner.write().error_output.push_str(&text),
            StreamUnit::Frame(frame) => {
                if let Frame::Prompt(prompt) = frame.as_ref() {
                    let allowed = inner.options().is_some_and(|o| o.prompt);
                    if !allowed {
                        warn!(run_id = %inner.id, prompt_id = %prompt.id, "prompt frame on a run that does not allow prompts");
                        inner
                            .write()
                            .record_error(RunError::PromptNotAllowed(prompt.message.clone()));
                        inner.cancel.cancel();
                        break;
                    }
                }

                inner.write().apply_frame(&frame);

                let receiver_gone = match &events {
                    Some(tx) => tokio::select! {
                        biased;
                        _ = inner.cancel.cancelled() => {
                            cancelled = true;
                            break;
                        }
                        sent = tx.send(*frame) => sent.is_err(),
                    },
                    None => false,
                };
                if receiver_gone {
                    debug!(run_id = %inner.id, "event receiver dropped, no longer forwarding");
                    events = None;
                }
            }
        }
    }

    // Closing the channel ends the caller's event stream; dropping the body
    // tears down the request or engine process.
    drop(events);
    drop(units);
    inner.resolve(cancelled);
}

/// One request/response lifecycle against the engine.
///
/// Cheap to clone; clones share the same underlying run.
#[derive(Clone)]
pub struct Run {
    inner: Arc<RunInner>,
}

impl std::fmt::Debug for Run {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Run")
            .field("id", &self.inner.id)
            .field("request_path", &self.inner.request_path)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Run {
    fn new(
        transport: Arc<dyn Transport>,
        request_path: String,
        kind: RunKind,
        input: String,
        incoming_chat_state: String,
    ) -> Self {
        let (resolved, _) = watch::channel(false);
        Self {
            inner: Arc::new(RunInner {
                id: Uuid::new_v4(),
                transport,
                request_path,
                kind,
                input,
                incoming_chat_state,
                shared: RwLock::new(RunShared::default()),
                cancel: CancellationToken::new(),
                resolved,
                events: Mutex::new(None),
                started: AtomicBool::new(false),
            }),
        }
    }

    /// A chat run in the `Creating` state. Start it with [`next_chat`](Self::next_chat).
    pub fn chat(
        transport: Arc<dyn Transport>,
        request_path: impl Into<String>,
        target: RunTarget,
        options: Options,
    ) -> Self {
        let incoming = options.chat_state.clone();
        Self::new(
            transport,
            request_path.into(),
            RunKind::Chat { target, options },
            String::new(),
            incoming,
        )
    }

    /// A single request to a non-chat endpoint, already dispatched.
    pub(crate) async fn basic(
        transport: Arc<dyn Transport>,
        request_path: impl Into<String>,
        body: Option<Value>,
    ) -> Self {
        Self::new(
            transport,
            request_path.into(),
            RunKind::Basic { body },
            String::new(),
            String::new(),
        )
        .dispatch()
        .await
    }

    fn request_body(&self) -> Result<Option<Value>> {
        match &self.inner.kind {
            RunKind::Chat { target, options } => {
                let payload = RequestPayload::new(target, &self.inner.input, options);
                Ok(Some(serde_json::to_value(payload)?))
            }
            RunKind::Basic { body } => Ok(body.clone()),
        }
    }

    /// Send the request and start the consume task.
    ///
    /// Failures are recorded on the run (state `Error`) rather than returned.
    async fn dispatch(self) -> Self {
        let inner = &self.inner;
        let body = match self.request_body() {
            Ok(body) => body,
            Err(e) => {
                inner.fail(RunError::Dispatch(e.to_string()), None, String::new());
                return self;
            }
        };

        let events_tx = if inner.options().is_some_and(|o| o.include_events) {
            let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
            *inner.events.lock().unwrap_or_else(PoisonError::into_inner) = Some(rx);
            Some(tx)
        } else {
            None
        };

        debug!(run_id = %inner.id, path = %inner.request_path, "dispatching run");
        let request = TransportRequest::new(inner.request_path.clone(), body);
        let response = match inner.transport.open(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(run_id = %inner.id, error = %e, "failed to dispatch run");
                inner.fail(RunError::Dispatch(e.to_string()), None, String::new());
                return self;
            }
        };

        if !response.is_success() {
            let status = response.status;
            let text = collect_body(response.body).await;
            let message = text.trim().to_string();
            let error = if status == 404 {
                RunError::NotFound(if message.is_empty() {
                    format!("not found: {}", inner.request_path)
                } else {
                    message
                })
            } else {
                RunError::Status { status, message }
            };
            debug!(run_id = %inner.id, status, "engine rejected run");
            inner.fail(error, Some(status), text);
            return self;
        }

        {
            let mut shared = inner.write();
            shared.state = RunState::Running;
            shared.response_status = Some(response.status);
        }
        inner.started.store(true, Ordering::SeqCst);
        tokio::spawn(consume(Arc::clone(inner), response.body, events_tx));
        self
    }

    /// Unique ID of this run (client side only).
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn state(&self) -> RunState {
        self.inner.read().state
    }

    /// The terminal error, if the run failed.
    pub fn err(&self) -> Option<RunError> {
        self.inner.read().error.clone()
    }

    /// Engine stderr collected so far. Still available after an error.
    pub fn error_output(&self) -> String {
        self.inner.read().error_output.clone()
    }

    /// Latest frame of every call seen so far, keyed by call ID.
    pub fn calls(&self) -> HashMap<String, CallFrame> {
        self.inner.read().calls.clone()
    }

    /// The top-level call of the run.
    pub fn parent_call_frame(&self) -> Option<CallFrame> {
        let shared = self.inner.read();
        shared
            .parent_call_id
            .as_ref()
            .and_then(|id| shared.calls.get(id))
            .cloned()
    }

    /// The program, once the run-start frame has been seen.
    pub fn program(&self) -> Option<Program> {
        self.inner.read().program.clone()
    }

    /// Chat state produced by this turn.
    pub fn chat_state(&self) -> Option<String> {
        self.inner.read().chat_state.clone()
    }

    /// Status code the engine answered the request with.
    pub fn response_status(&self) -> Option<u16> {
        self.inner.read().response_status
    }

    /// Token usage summed over every call.
    pub fn usage(&self) -> Usage {
        let shared = self.inner.read();
        shared.calls.values().fold(Usage::default(), |mut total, call| {
            total.merge(&call.usage);
            total
        })
    }

    /// Take the event stream. Only available when `include_events` was set,
    /// and only once. The stream ends when the run resolves.
    ///
    /// Take it before waiting on an unresolved run: [`wait`](Self::wait) and
    /// [`text`](Self::text) discard a stream nobody took.
    pub fn events(&self) -> Option<ReceiverStream<Frame>> {
        self.inner
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(ReceiverStream::new)
    }

    /// Wait until this turn resolves and return the resulting state.
    pub async fn wait(&self) -> RunState {
        if self.state() == RunState::Creating {
            return RunState::Creating;
        }
        if !self.inner.is_resolved() {
            // An untaken receiver would stall the consume task once the
            // channel fills.
            drop(
                self.inner
                    .events
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take(),
            );
        }
        let mut resolved = self.inner.resolved.subscribe();
        // The sender lives as long as `inner`, so this only ends on resolution.
        let _ = resolved.wait_for(|done| *done).await;
        self.state()
    }

    /// Output of the turn. Blocks until it resolves; repeatable.
    pub async fn text(&self) -> Result<String> {
        if self.wait().await == RunState::Creating {
            return Err(GptscriptError::InvalidState("run not started".into()));
        }
        let shared = self.inner.read();
        match &shared.error {
            Some(error) => Err(error.clone().into()),
            None => Ok(shared.output.clone()),
        }
    }

    pub async fn bytes(&self) -> Result<Vec<u8>> {
        self.text().await.map(String::into_bytes)
    }

    /// The last chat envelope exactly as the engine sent it.
    pub async fn raw_output(&self) -> Result<Option<Map<String, Value>>> {
        self.text().await?;
        Ok(self.inner.read().raw_output.clone())
    }

    /// Abort the run. Output collected so far stays readable.
    ///
    /// A no-op once the run has resolved; an error if it never started.
    pub async fn close(&self) -> Result<()> {
        if !self.inner.started.load(Ordering::SeqCst) {
            return Err(GptscriptError::InvalidState("run not started".into()));
        }
        if self.inner.is_resolved() {
            return Ok(());
        }
        debug!(run_id = %self.inner.id, "closing run");
        self.inner.cancel.cancel();
        self.wait().await;
        Ok(())
    }

    /// Start the next turn of the conversation with `input`.
    ///
    /// Allowed from `Creating`, `Continue` and `Error`. After an error the
    /// new turn resumes from the chat state this turn started with.
    pub async fn next_chat(&self, input: impl Into<String>) -> Result<Run> {
        let RunKind::Chat { target, options } = &self.inner.kind else {
            return Err(GptscriptError::InvalidState(
                "only run and evaluate requests can continue a chat".into(),
            ));
        };

        let state = self.state();
        if !state.can_continue() {
            return Err(GptscriptError::InvalidState(format!(
                "run must be in creating, continue or error state, not {state}"
            )));
        }

        let chat_state = match state {
            RunState::Continue => self.chat_state().unwrap_or_default(),
            _ => self.inner.incoming_chat_state.clone(),
        };

        let input = input.into();
        let mut options = options.clone();
        options.input = input.clone();
        options.chat_state = chat_state.clone();

        let next = Run::new(
            Arc::clone(&self.inner.transport),
            self.inner.request_path.clone(),
            RunKind::Chat {
                target: target.clone(),
                options,
            },
            input,
            chat_state,
        );
        Ok(next.dispatch().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportResponse;
    use serde_json::json;

    fn envelope(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn envelope_sets_output_state_and_done() {
        let mut shared = RunShared::default();
        shared.apply_envelope(envelope(json!({
            "content": "Hello", "state": {"b": 2, "a": 1}, "done": false
        })));

        assert_eq!(shared.output, "Hello");
        assert_eq!(shared.chat_state.as_deref(), Some(r#"{"b":2,"a":1}"#));
        assert_eq!(shared.done, Some(false));
        assert!(shared.raw_output.is_some());
    }

    #[test]
    fn envelope_without_string_content_keeps_raw_json() {
        let mut shared = RunShared::default();
        shared.apply_envelope(envelope(json!({"content": {"k": 1}, "done": true})));
        assert_eq!(shared.output, r#"{"content":{"k":1},"done":true}"#);
        assert_eq!(shared.chat_state, None);
        assert_eq!(shared.done, Some(true));
    }

    #[test]
    fn null_state_clears_chat_state() {
        let mut shared = RunShared {
            chat_state: Some("old".into()),
            ..Default::default()
        };
        shared.apply_envelope(envelope(json!({"content": "", "state": null})));
        assert_eq!(shared.chat_state, None);
    }

    #[test]
    fn first_error_wins() {
        let mut shared = RunShared::default();
        shared.record_error(RunError::Engine("boom".into()));
        shared.record_error(RunError::Cancelled);
        assert_eq!(shared.error, Some(RunError::Engine("boom".into())));
    }

    struct Unreachable;

    #[async_trait::async_trait]
    impl Transport for Unreachable {
        async fn open(&self, _request: TransportRequest) -> Result<TransportResponse> {
            Err(GptscriptError::InvalidState("not dispatched in this test".into()))
        }
    }

    fn file_run() -> Run {
        Run::chat(
            Arc::new(Unreachable),
            "run",
            RunTarget::File("a.gpt".into()),
            Options::default(),
        )
    }

    #[test]
    fn cancel_after_end_of_stream_keeps_the_result() {
        let run = file_run();
        run.inner.write().output.push_str("done");
        run.inner.cancel.cancel();
        run.inner.resolve(false);

        assert_eq!(run.state(), RunState::Finished);
        assert_eq!(run.err(), None);
    }

    #[test]
    fn cancelled_stream_resolves_as_cancelled() {
        let run = file_run();
        run.inner.cancel.cancel();
        run.inner.resolve(true);

        assert_eq!(run.state(), RunState::Error);
        assert_eq!(run.err(), Some(RunError::Cancelled));
    }

    #[test]
    fn program_is_captured_once() {
        let mut shared = RunShared::default();
        let first: Frame = serde_json::from_value(json!({
            "run": {"type": "runStart", "program": {"name": "first"}}
        }))
        .unwrap();
        let second: Frame = serde_json::from_value(json!({
            "run": {"type": "runStart", "program": {"name": "second"}}
        }))
        .unwrap();

        shared.apply_frame(&first);
        shared.apply_frame(&second);
        assert_eq!(shared.program.unwrap().name, "first");
    }
}
