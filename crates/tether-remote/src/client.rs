//! HTTP transport abstraction.
//!
//! The JSON:API source talks to the network through the [`HttpClient`]
//! trait. The production implementation wraps `reqwest`; [`MockClient`]
//! replays canned responses and records requests for assertions.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tether_core::{Error, Result};

/// The JSON:API media type, sent as both content type and accept.
pub const MEDIA_TYPE: &str = "application/vnd.api+json";

/// Request methods the source issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// One outgoing request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub body: Option<Value>,
}

impl HttpRequest {
    /// Build a request.
    pub fn new(method: HttpMethod, url: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method,
            url: url.into(),
            body,
        }
    }
}

/// One incoming response, body parsed as JSON when present.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Option<Value>,
}

impl HttpResponse {
    /// Build a response.
    pub fn new(status: u16, body: Option<Value>) -> Self {
        Self { status, body }
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The transport the JSON:API source sends requests through.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Send one request and return the response.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// `reqwest`-backed client.
#[derive(Debug, Clone, Default)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Create a client with default settings.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self
            .client
            .request(method, &request.url)
            .header(reqwest::header::CONTENT_TYPE, MEDIA_TYPE)
            .header(reqwest::header::ACCEPT, MEDIA_TYPE);
        if let Some(body) = &request.body {
            let bytes = serde_json::to_vec(body).map_err(Error::serialization)?;
            builder = builder.body(bytes);
        }

        let response = builder.send().await.map_err(Error::transport)?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(Error::transport)?;
        let body = if text.is_empty() {
            None
        } else {
            serde_json::from_str(&text).ok()
        };

        Ok(HttpResponse { status, body })
    }
}

/// In-process client replaying canned responses, for tests.
///
/// Responses are consumed FIFO; sending with an empty queue is an error so
/// a test cannot silently under-specify its exchanges.
#[derive(Debug, Default)]
pub struct MockClient {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockClient {
    /// Create a client with no queued responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next response.
    pub fn enqueue(&self, response: HttpResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    /// Queue a response by status and body.
    pub fn respond_with(&self, status: u16, body: Option<Value>) {
        self.enqueue(HttpResponse::new(status, body));
    }

    /// Every request sent so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for MockClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::Transport("no mock response queued".into()))
    }
}
