//! Outbound HTTP client that carries the request's correlation ID.
//!
//! # Data Flow
//! ```text
//! handler
//!     → TracingClient::get/post/put (build, URL checked before any I/O)
//!     → execute (User-Agent if configured, X-Request-ID if the context has one)
//!     → reqwest
//! ```
//!
//! Failures are returned to the caller as `ClientError` and never logged
//! here. Non-2xx responses are `Ok`. No retries.

pub mod user_agent;

use std::sync::LazyLock;

use axum::http::header::{CONTENT_TYPE, USER_AGENT};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use thiserror::Error;

use crate::config::TraceConfig;
use crate::http::context::RequestContext;
use crate::http::request::X_REQUEST_ID;

pub use user_agent::{global_user_agent, set_global_user_agent, UserAgentError};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to build request: {0}")]
    InvalidRequest(#[source] reqwest::Error),

    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("invalid header {name}: {value:?}")]
    InvalidHeader { name: &'static str, value: String },
}

/// HTTP client for downstream calls made while serving a request.
#[derive(Debug, Clone)]
pub struct TracingClient {
    inner: reqwest::Client,
    user_agent: Option<HeaderValue>,
    request_id_header: HeaderName,
}

impl TracingClient {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Wrap an existing `reqwest::Client`, keeping its pool and settings.
    pub fn with_client(inner: reqwest::Client) -> Self {
        Self {
            inner,
            user_agent: None,
            request_id_header: X_REQUEST_ID.clone(),
        }
    }

    pub fn from_config(config: &TraceConfig) -> Result<Self, ClientError> {
        let mut client = Self::new().request_id_header(&config.correlation.header)?;
        if !config.client.user_agent.is_empty() {
            client = client.user_agent(&config.client.user_agent)?;
        }
        Ok(client)
    }

    /// Send `value` as `User-Agent` instead of the process-wide value. An
    /// empty value clears it.
    pub fn user_agent(mut self, value: &str) -> Result<Self, ClientError> {
        self.user_agent =
            user_agent::parse(value.to_string()).map_err(|_| ClientError::InvalidHeader {
                name: "user-agent",
                value: value.to_string(),
            })?;
        Ok(self)
    }

    /// Header the correlation ID is sent in.
    pub fn request_id_header(mut self, name: &str) -> Result<Self, ClientError> {
        self.request_id_header =
            HeaderName::try_from(name).map_err(|_| ClientError::InvalidHeader {
                name: "request id header",
                value: name.to_string(),
            })?;
        Ok(self)
    }

    pub fn apply_headers(&self, ctx: &RequestContext, headers: &mut HeaderMap) {
        let ua = self.user_agent.clone().or_else(global_user_agent);
        if let Some(ua) = ua.filter(|ua| !ua.is_empty()) {
            headers.insert(USER_AGENT, ua);
        }
        if let Some(value) = ctx.correlation_id().and_then(|id| id.header_value()) {
            headers.insert(self.request_id_header.clone(), value);
        }
    }

    /// Send a prepared request with the tracing headers added.
    pub async fn execute(
        &self,
        ctx: &RequestContext,
        mut request: reqwest::Request,
    ) -> Result<reqwest::Response, ClientError> {
        self.apply_headers(ctx, request.headers_mut());
        tracing::debug!(
            method = %request.method(),
            url = %request.url(),
            request_id = ctx.correlation_id().map(|id| id.as_str()),
            "Outbound request"
        );
        self.inner
            .execute(request)
            .await
            .map_err(ClientError::Transport)
    }

    pub async fn get(
        &self,
        ctx: &RequestContext,
        url: &str,
    ) -> Result<reqwest::Response, ClientError> {
        let request = self.build(Method::GET, url, None)?;
        self.execute(ctx, request).await
    }

    pub async fn post(
        &self,
        ctx: &RequestContext,
        url: &str,
        content_type: &str,
        body: impl Into<reqwest::Body>,
    ) -> Result<reqwest::Response, ClientError> {
        let request = self.build(Method::POST, url, Some((content_type, body.into())))?;
        self.execute(ctx, request).await
    }

    pub async fn put(
        &self,
        ctx: &RequestContext,
        url: &str,
        content_type: &str,
        body: impl Into<reqwest::Body>,
    ) -> Result<reqwest::Response, ClientError> {
        let request = self.build(Method::PUT, url, Some((content_type, body.into())))?;
        self.execute(ctx, request).await
    }

    fn build(
        &self,
        method: Method,
        url: &str,
        body: Option<(&str, reqwest::Body)>,
    ) -> Result<reqwest::Request, ClientError> {
        let parsed = reqwest::Url::parse(url).map_err(|e| ClientError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let mut builder = self.inner.request(method, parsed);
        if let Some((content_type, body)) = body {
            let content_type =
                HeaderValue::from_str(content_type).map_err(|_| ClientError::InvalidHeader {
                    name: "content-type",
                    value: content_type.to_string(),
                })?;
            builder = builder.header(CONTENT_TYPE, content_type).body(body);
        }
        builder.build().map_err(ClientError::InvalidRequest)
    }
}

impl Default for TracingClient {
    fn default() -> Self {
        Self::new()
    }
}

static DEFAULT_CLIENT: LazyLock<TracingClient> = LazyLock::new(TracingClient::new);

/// The process-wide client behind the free `get`, `post` and `put`.
pub fn default_client() -> &'static TracingClient {
    &DEFAULT_CLIENT
}

pub async fn get(ctx: &RequestContext, url: &str) -> Result<reqwest::Response, ClientError> {
    default_client().get(ctx, url).await
}

pub async fn post(
    ctx: &RequestContext,
    url: &str,
    content_type: &str,
    body: impl Into<reqwest::Body>,
) -> Result<reqwest::Response, ClientError> {
    default_client().post(ctx, url, content_type, body).await
}

pub async fn put(
    ctx: &RequestContext,
    url: &str,
    content_type: &str,
    body: impl Into<reqwest::Body>,
) -> Result<reqwest::Response, ClientError> {
    default_client().put(ctx, url, content_type, body).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::CorrelationId;

    #[test]
    fn headers_follow_the_context_and_configuration() {
        let client = TracingClient::new().user_agent("svc-a").unwrap();
        let ctx = RequestContext::with_correlation_id(CorrelationId::from("abc-123"));

        let mut headers = HeaderMap::new();
        client.apply_headers(&ctx, &mut headers);
        assert_eq!(headers[USER_AGENT], "svc-a");
        assert_eq!(headers[&X_REQUEST_ID], "abc-123");
    }

    #[test]
    fn no_request_id_header_without_an_id() {
        let client = TracingClient::new().user_agent("svc-a").unwrap();
        let mut headers = HeaderMap::new();
        client.apply_headers(&RequestContext::detached(), &mut headers);
        assert!(!headers.contains_key(&X_REQUEST_ID));
        assert_eq!(headers[USER_AGENT], "svc-a");
    }

    #[test]
    fn empty_user_agent_is_not_sent() {
        let client = TracingClient::new().user_agent("svc-a").unwrap().user_agent("").unwrap();
        assert!(client.user_agent.is_none());

        let mut headers = HeaderMap::new();
        client.apply_headers(&RequestContext::detached(), &mut headers);
        if let Some(ua) = headers.get(USER_AGENT) {
            assert!(!ua.is_empty());
        }
    }

    #[test]
    fn obs_text_request_id_is_forwarded_unchanged() {
        let raw = HeaderValue::from_bytes(b"id-\xff").unwrap();
        let ctx = RequestContext::with_correlation_id(CorrelationId::from_header(&raw));
        let mut headers = HeaderMap::new();
        TracingClient::new().apply_headers(&ctx, &mut headers);
        assert_eq!(headers[&X_REQUEST_ID], raw);
    }

    #[test]
    fn custom_request_id_header() {
        let client = TracingClient::new().request_id_header("x-trace").unwrap();
        let ctx = RequestContext::with_correlation_id(CorrelationId::from("t-1"));
        let mut headers = HeaderMap::new();
        client.apply_headers(&ctx, &mut headers);
        assert_eq!(headers["x-trace"], "t-1");
    }

    #[test]
    fn invalid_user_agent_is_rejected() {
        assert!(matches!(
            TracingClient::new().user_agent("a\r\nb"),
            Err(ClientError::InvalidHeader { name: "user-agent", .. })
        ));
    }

    #[tokio::test]
    async fn malformed_url_fails_before_sending() {
        let err = TracingClient::new()
            .get(&RequestContext::detached(), "not a url")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidUrl { .. }));
    }

    #[test]
    fn from_config_reads_user_agent_and_header() {
        let mut config = TraceConfig::default();
        config.client.user_agent = "svc-b".to_string();
        config.correlation.header = "x-correlation-id".to_string();

        let client = TracingClient::from_config(&config).unwrap();
        let ctx = RequestContext::with_correlation_id(CorrelationId::from("c-9"));
        let mut headers = HeaderMap::new();
        client.apply_headers(&ctx, &mut headers);
        assert_eq!(headers[USER_AGENT], "svc-b");
        assert_eq!(headers["x-correlation-id"], "c-9");
    }
}
