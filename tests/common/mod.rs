//! Shared test helpers and a scripted transport.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};

use gptscript::error::{GptscriptError, Result};
use gptscript::transport::{Transport, TransportRequest, TransportResponse};
use gptscript::{GlobalOptions, Gptscript};

enum Scripted {
    Respond {
        status: u16,
        chunks: Vec<String>,
        hang: bool,
    },
    Fail(String),
}

/// A transport that replays queued responses and records every request.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a 200 response whose body is `chunks`, one read per chunk.
    pub fn push(&self, chunks: Vec<String>) {
        self.enqueue(Scripted::Respond {
            status: 200,
            chunks,
            hang: false,
        });
    }

    /// Queue a 200 response that never ends after `chunks`.
    pub fn push_hanging(&self, chunks: Vec<String>) {
        self.enqueue(Scripted::Respond {
            status: 200,
            chunks,
            hang: true,
        });
    }

    /// Queue a non-streaming response with a plain text body.
    pub fn push_status(&self, status: u16, body: &str) {
        self.enqueue(Scripted::Respond {
            status,
            chunks: vec![body.to_string()],
            hang: false,
        });
    }

    /// Queue a request that fails before any response.
    pub fn push_failure(&self, message: &str) {
        self.enqueue(Scripted::Fail(message.to_string()));
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Body of the `n`th request.
    pub fn body(&self, n: usize) -> Value {
        self.requests()[n].body.clone().unwrap_or(Value::Null)
    }

    fn enqueue(&self, scripted: Scripted) {
        self.responses.lock().unwrap().push_back(scripted);
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, request: TransportRequest) -> Result<TransportResponse> {
        self.requests.lock().unwrap().push(request);
        let scripted = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Scripted::Respond {
                status: 200,
                chunks: vec![done()],
                hang: false,
            });

        match scripted {
            Scripted::Fail(message) => Err(GptscriptError::Configuration(message)),
            Scripted::Respond {
                status,
                chunks,
                hang,
            } => {
                let body = futures::stream::iter(
                    chunks
                        .into_iter()
                        .map(|chunk| Ok::<_, GptscriptError>(chunk.into_bytes())),
                );
                let body = if hang {
                    body.chain(futures::stream::pending()).boxed()
                } else {
                    body.boxed()
                };
                Ok(TransportResponse { status, body })
            }
        }
    }
}

/// A client wired to `transport`.
pub fn engine(transport: &Arc<ScriptedTransport>) -> Gptscript {
    let transport: Arc<dyn Transport> = Arc::clone(transport) as Arc<dyn Transport>;
    Gptscript::with_transport(GlobalOptions::default(), transport)
}

/// One SSE chunk carrying `value`.
pub fn chunk(value: Value) -> String {
    format!("data: {value}\n\n")
}

pub fn stdout(value: Value) -> String {
    chunk(json!({ "stdout": value }))
}

pub fn stderr(text: &str) -> String {
    chunk(json!({ "stderr": text }))
}

pub fn call(id: &str, event_type: &str, parent: &str) -> String {
    chunk(json!({
        "call": {"id": id, "type": event_type, "parentID": parent, "tool": {"name": format!("tool-{id}")}}
    }))
}

pub fn done() -> String {
    "data: [DONE]\n\n".to_string()
}
