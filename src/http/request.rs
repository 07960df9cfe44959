//! Correlation identifier resolution and the correlation stage.
//!
//! # Responsibilities
//! - Reuse the inbound `X-Request-ID` value when present and non-empty
//! - Otherwise generate a UUID v4
//! - Attach the identifier to the request extensions
//! - Write it back on the response (primary and mirror header)
//!
//! # Design Decisions
//! - Identifier added as early as possible so every later stage sees it
//! - Generation never fails the request; a local fallback is used instead

use std::fmt;
use std::hash::{Hash, Hasher};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, Response};
use tower::{Layer, Service};
use uuid::Uuid;

use crate::config::CorrelationConfig;

/// Default header carrying the correlation identifier.
pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Default mirror header.
pub static X_UNIQUE_ID: HeaderName = HeaderName::from_static("x-unique-id");

static FALLBACK_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Opaque per-request correlation identifier.
///
/// An identifier taken from a request header keeps the header's exact
/// bytes, so values with obs-text are echoed and propagated unchanged; the
/// text form (lossy for such values) is what gets logged.
#[derive(Debug, Clone)]
pub struct CorrelationId {
    text: String,
    raw: Option<HeaderValue>,
}

impl CorrelationId {
    /// Generate a fresh identifier.
    pub fn generate() -> Self {
        // `new_v4` panics if the OS random source is unavailable.
        match std::panic::catch_unwind(Uuid::new_v4) {
            Ok(uuid) => Self::from(uuid.to_string()),
            Err(_) => Self::fallback(),
        }
    }

    /// Process-local identifier used when no random source is available.
    fn fallback() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let seq = FALLBACK_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self::from(format!("{:x}-{:x}-{:x}", std::process::id(), nanos, seq))
    }

    /// Reuse an inbound header value verbatim.
    pub fn from_header(value: &HeaderValue) -> Self {
        let text = match value.to_str() {
            Ok(s) => s.to_string(),
            Err(_) => String::from_utf8_lossy(value.as_bytes()).into_owned(),
        };
        Self {
            text,
            raw: Some(value.clone()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The identifier as a header value. Resolved identifiers always convert.
    pub fn header_value(&self) -> Option<HeaderValue> {
        match &self.raw {
            Some(raw) => Some(raw.clone()),
            None => HeaderValue::from_str(&self.text).ok(),
        }
    }
}

impl PartialEq for CorrelationId {
    fn eq(&self, other: &Self) -> bool {
        match (&self.raw, &other.raw) {
            (Some(a), Some(b)) => a == b,
            _ => self.text == other.text,
        }
    }
}

impl Eq for CorrelationId {}

impl Hash for CorrelationId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.text.hash(state);
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<String> for CorrelationId {
    fn from(text: String) -> Self {
        Self { text, raw: None }
    }
}

impl From<CorrelationId> for String {
    fn from(id: CorrelationId) -> Self {
        id.text
    }
}

/// Resolve the identifier for a request: the inbound header value verbatim if
/// it is present and non-empty, otherwise a generated one.
pub fn resolve(headers: &HeaderMap, header: &HeaderName) -> CorrelationId {
    headers
        .get(header)
        .filter(|v| !v.is_empty())
        .map_or_else(CorrelationId::generate, CorrelationId::from_header)
}

/// Header names used by the correlation stage.
#[derive(Debug, Clone)]
pub struct CorrelationHeaders {
    pub header: HeaderName,
    pub mirror: Option<HeaderName>,
}

impl Default for CorrelationHeaders {
    fn default() -> Self {
        Self {
            header: X_REQUEST_ID.clone(),
            mirror: Some(X_UNIQUE_ID.clone()),
        }
    }
}

impl CorrelationHeaders {
    /// Build from configuration. Invalid names fall back to the defaults;
    /// `load_config` rejects them before they get here.
    pub fn from_config(config: &CorrelationConfig) -> Self {
        let header = HeaderName::try_from(config.header.as_str()).unwrap_or_else(|_| {
            tracing::warn!(header = %config.header, "Invalid correlation header, using x-request-id");
            X_REQUEST_ID.clone()
        });
        let mirror = if config.mirror_header.is_empty() {
            None
        } else {
            HeaderName::try_from(config.mirror_header.as_str()).ok()
        };
        Self { header, mirror }
    }
}

/// Layer resolving the correlation identifier for every request.
#[derive(Debug, Clone, Default)]
pub struct CorrelationLayer {
    headers: Arc<CorrelationHeaders>,
}

impl CorrelationLayer {
    pub fn new(headers: CorrelationHeaders) -> Self {
        Self {
            headers: Arc::new(headers),
        }
    }

    pub fn from_config(config: &CorrelationConfig) -> Self {
        Self::new(CorrelationHeaders::from_config(config))
    }
}

impl<S> Layer<S> for CorrelationLayer {
    type Service = CorrelationService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CorrelationService {
            inner,
            headers: Arc::clone(&self.headers),
        }
    }
}

/// Service attaching the identifier to the request and echoing it on the response.
#[derive(Debug, Clone)]
pub struct CorrelationService<S> {
    inner: S,
    headers: Arc<CorrelationHeaders>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for CorrelationService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: 'static,
    ReqBody: 'static,
    ResBody: 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let id = resolve(req.headers(), &self.headers.header);
        let value = id.header_value();

        // Keep the header on the request too, for handlers reading headers directly.
        if let Some(val) = &value {
            req.headers_mut().insert(self.headers.header.clone(), val.clone());
        }
        req.extensions_mut().insert(id);

        let headers = Arc::clone(&self.headers);
        let fut = self.inner.call(req);

        Box::pin(async move {
            let mut response = fut.await?;
            if let Some(val) = value {
                if let Some(mirror) = &headers.mirror {
                    response.headers_mut().insert(mirror.clone(), val.clone());
                }
                response.headers_mut().insert(headers.header.clone(), val);
            }
            Ok(response)
        })
    }
}
