//! Transports: how a request reaches the engine and how its output comes back.
//!
//! A [`Run`](crate::run::Run) only sees "a status and a byte stream that can be
//! torn down by dropping it". Dropping the body aborts the HTTP request or
//! kills the engine process.

pub mod http;
pub mod process;

pub use http::HttpTransport;
pub use process::ProcessTransport;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::error::Result;

/// One request to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    /// Endpoint relative to the engine root, e.g. `run` or `confirm/<id>`.
    pub path: String,
    /// JSON body. `None` means a bodiless GET.
    pub body: Option<Value>,
}

impl TransportRequest {
    pub fn new(path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            path: path.into(),
            body,
        }
    }
}

/// Body chunks as they arrive.
pub type BodyStream = BoxStream<'static, Result<Vec<u8>>>;

/// A response whose body is still streaming.
pub struct TransportResponse {
    /// HTTP-style status code. Process transports report 200 on spawn.
    pub status: u16,
    pub body: BodyStream,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Send a request and get back a live, cancellable body.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a request. An `Err` means the request could not be built or sent.
    async fn open(&self, request: TransportRequest) -> Result<TransportResponse>;

    /// Base URL, for transports that have one.
    fn base_url(&self) -> Option<&str> {
        None
    }
}
