use std::collections::{BTreeMap, VecDeque};
use std::error::Error as StdError;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::io::ErrorKind;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::sync::lock_or_recover;

/// Query parameters that carry provider credentials.
const CREDENTIAL_PARAMS: [&str; 5] = ["apikey", "token", "api_token", "access_key", "apiKey"];

/// HTTP GET request issued by a quote adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub timeout_ms: u64,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
            timeout_ms: 10_000,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// URL with credential query parameters masked, safe for log lines.
    pub fn redacted_url(&self) -> String {
        redact_url(&self.url)
    }
}

pub(crate) fn redact_url(url: &str) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_owned();
    };

    let params = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((name, _)) if CREDENTIAL_PARAMS.contains(&name) => format!("{name}=***"),
            _ => pair.to_owned(),
        })
        .collect::<Vec<_>>();
    format!("{base}?{}", params.join("&"))
}

/// HTTP response envelope returned by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok_json(body: impl Into<String>) -> Self {
        Self::with_status(200, body)
    }

    pub fn with_status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Transport failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorKind {
    Timeout,
    Dns,
    ConnectionRefused,
    ConnectionReset,
    Unreachable,
    Connect,
    Body,
    Other,
}

impl HttpErrorKind {
    /// Failures that say nothing about the provider's answer, only about the path to it.
    pub const fn is_network(self) -> bool {
        !matches!(self, Self::Body | Self::Other)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Dns => "dns",
            Self::ConnectionRefused => "connection_refused",
            Self::ConnectionReset => "connection_reset",
            Self::Unreachable => "unreachable",
            Self::Connect => "connect",
            Self::Body => "body",
            Self::Other => "other",
        }
    }
}

/// Transport-level HTTP error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    kind: HttpErrorKind,
    message: String,
}

impl HttpError {
    pub fn new(kind: HttpErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::Timeout, message)
    }

    pub fn refused(message: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::ConnectionRefused, message)
    }

    pub fn dns(message: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::Dns, message)
    }

    pub const fn kind(&self) -> HttpErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn is_network(&self) -> bool {
        self.kind.is_network()
    }

    fn from_reqwest(context: &str, err: reqwest::Error) -> Self {
        let kind = classify(&err);
        Self::new(kind, format!("{context}: {}", err.without_url()))
    }
}

impl Display for HttpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.kind.as_str())
    }
}

impl std::error::Error for HttpError {}

fn classify(err: &reqwest::Error) -> HttpErrorKind {
    if err.is_timeout() {
        return HttpErrorKind::Timeout;
    }

    let mut chain = String::new();
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            match io.kind() {
                ErrorKind::ConnectionRefused => return HttpErrorKind::ConnectionRefused,
                ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::BrokenPipe
                | ErrorKind::UnexpectedEof => return HttpErrorKind::ConnectionReset,
                ErrorKind::TimedOut => return HttpErrorKind::Timeout,
                _ => {}
            }
        }
        chain.push_str(&cause.to_string().to_ascii_lowercase());
        chain.push('\n');
        source = cause.source();
    }

    if chain.contains("dns error") || chain.contains("failed to lookup address") {
        HttpErrorKind::Dns
    } else if chain.contains("unreachable") {
        HttpErrorKind::Unreachable
    } else if err.is_connect() {
        HttpErrorKind::Connect
    } else if err.is_body() || err.is_decode() {
        HttpErrorKind::Body
    } else {
        HttpErrorKind::Other
    }
}

pub type HttpFuture<'a> = Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>>;

/// Transport used by every quote adapter.
pub trait HttpClient: Send + Sync {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a>;
}

/// Production HTTP client backed by reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Arc<reqwest::Client>,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self {
            client: Arc::new(
                reqwest::Client::builder()
                    .user_agent(concat!("tickgate/", env!("CARGO_PKG_VERSION")))
                    .build()
                    .unwrap_or_else(|_| reqwest::Client::new()),
            ),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for ReqwestHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        Box::pin(async move {
            let mut builder = self
                .client
                .get(&request.url)
                .timeout(Duration::from_millis(request.timeout_ms));
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }

            let response = builder
                .send()
                .await
                .map_err(|err| HttpError::from_reqwest("request failed", err))?;

            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|err| HttpError::from_reqwest("failed to read response body", err))?;

            Ok(HttpResponse { status, body })
        })
    }
}

/// Transport that replays canned replies and records what it was asked.
///
/// Queued replies are consumed first, then the fallback reply repeats. With
/// neither, calls fail as [`HttpErrorKind::Other`].
#[derive(Debug, Default)]
pub struct ScriptedHttpClient {
    replies: Mutex<VecDeque<Result<HttpResponse, HttpError>>>,
    fallback: Option<Result<HttpResponse, HttpError>>,
    latency: Duration,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn always(reply: Result<HttpResponse, HttpError>) -> Self {
        Self {
            fallback: Some(reply),
            ..Self::default()
        }
    }

    /// Every call waits `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn push(&self, reply: Result<HttpResponse, HttpError>) {
        lock_or_recover(&self.replies, "scripted replies").push_back(reply);
    }

    pub fn call_count(&self) -> usize {
        lock_or_recover(&self.requests, "scripted requests").len()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        lock_or_recover(&self.requests, "scripted requests").clone()
    }
}

impl HttpClient for ScriptedHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        Box::pin(async move {
            lock_or_recover(&self.requests, "scripted requests").push(request);
            let reply = lock_or_recover(&self.replies, "scripted replies")
                .pop_front()
                .or_else(|| self.fallback.clone())
                .unwrap_or_else(|| Err(HttpError::new(HttpErrorKind::Other, "no scripted reply")));

            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            reply
        })
    }
}
