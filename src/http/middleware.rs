//! Request logging pipeline.
//!
//! # Per-request flow
//! ```text
//! START → IDENTIFIED → RESPONDING → (NORMAL | PANICKED) → LOGGED → END
//!
//! CorrelationLayer      resolve id, attach            (IDENTIFIED)
//!   RequestLogLayer     install RequestContext,
//!                       StatusCapture, catch panics   (RESPONDING)
//!     handler
//!   RequestLogLayer     wrap body in CapturedBody     (NORMAL | PANICKED)
//!                       PendingLog fires once         (LOGGED)
//! CorrelationLayer      echo id on response headers
//! ```
//!
//! `PendingLog` is an RAII guard: it emits at end of body, on body error or
//! panic, or when dropped (client went away, outer timeout, response
//! discarded), and never twice.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use bytes::Bytes;
use futures_util::future::{BoxFuture, FutureExt};
use tower::{BoxError, Layer, Service};

use crate::config::TraceConfig;
use crate::http::context::RequestContext;
use crate::http::recover::{install_panic_hook, RecoveredPanic};
use crate::http::request::{CorrelationId, CorrelationLayer, CorrelationService};
use crate::http::response::{CapturedBody, StatusCapture};
use crate::observability::{Dispatcher, LogSink, RequestOutcome};

/// Log record in the making for one request.
pub(crate) struct PendingLog {
    dispatcher: Dispatcher,
    endpoint: String,
    method: String,
    started: Instant,
    context: RequestContext,
    status: StatusCapture,
    emitted: bool,
}

impl PendingLog {
    fn new<B>(dispatcher: Dispatcher, req: &Request<B>, context: RequestContext) -> Self {
        Self {
            dispatcher,
            endpoint: req.uri().path().to_string(),
            method: req.method().to_string(),
            started: Instant::now(),
            context,
            status: StatusCapture::new(),
            emitted: false,
        }
    }

    pub(crate) fn status(&self) -> &StatusCapture {
        &self.status
    }

    pub(crate) fn finish(mut self) {
        self.emit(None, None);
    }

    pub(crate) fn fail(mut self, error: String) {
        self.emit(Some(error), None);
    }

    pub(crate) fn finish_with_panic(mut self, recovered: RecoveredPanic) {
        self.emit(None, Some(recovered));
    }

    /// Handler panicked before producing a response: answer with a 500.
    fn recover(mut self, recovered: RecoveredPanic) -> Response<Body> {
        let response = recovered.to_response();
        if !self.status.is_committed() {
            self.status.set_status(StatusCode::INTERNAL_SERVER_ERROR);
        }
        self.emit(None, Some(recovered));
        response
    }

    fn emit(&mut self, error: Option<String>, panic: Option<RecoveredPanic>) {
        if self.emitted {
            return;
        }
        self.emitted = true;

        self.dispatcher.dispatch(RequestOutcome {
            endpoint: std::mem::take(&mut self.endpoint),
            method: std::mem::take(&mut self.method),
            elapsed: self.started.elapsed(),
            request_id: self.context.correlation_id().cloned(),
            status: self.status.current_status(),
            fields: self.context.fields().drain_all(),
            error,
            panic,
        });
    }
}

impl Drop for PendingLog {
    fn drop(&mut self) {
        if self.emitted {
            return;
        }
        let error = (!self.status.is_committed())
            .then(|| "request cancelled before a response was produced".to_string());
        self.emit(error, None);
    }
}

impl fmt::Debug for PendingLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingLog")
            .field("endpoint", &self.endpoint)
            .field("method", &self.method)
            .field("status", &self.status.current_status())
            .field("emitted", &self.emitted)
            .finish()
    }
}

/// Layer producing one log record per request.
#[derive(Debug, Clone)]
pub struct RequestLogLayer {
    dispatcher: Dispatcher,
}

impl RequestLogLayer {
    pub fn new(dispatcher: Dispatcher) -> Self {
        install_panic_hook();
        Self { dispatcher }
    }
}

impl<S> Layer<S> for RequestLogLayer {
    type Service = RequestLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLogService {
            inner,
            dispatcher: self.dispatcher.clone(),
        }
    }
}

/// Service wrapper capturing status, panics and fields of each request.
#[derive(Debug, Clone)]
pub struct RequestLogService<S> {
    inner: S,
    dispatcher: Dispatcher,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestLogService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: fmt::Display + Send + 'static,
    ReqBody: 'static,
    ResBody: http_body::Body<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response<Body>, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let context = RequestContext::new(req.extensions().get::<CorrelationId>().cloned());
        req.extensions_mut().insert(context.clone());
        let log = PendingLog::new(self.dispatcher.clone(), &req, context);

        // `call` itself may panic before handing out a future.
        let fut = panic::catch_unwind(AssertUnwindSafe(|| self.inner.call(req)));

        Box::pin(async move {
            let fut = match fut {
                Ok(fut) => fut,
                Err(payload) => return Ok(log.recover(RecoveredPanic::from_payload(payload))),
            };

            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(response)) => {
                    log.status().set_status(response.status());
                    let (parts, body) = response.into_parts();
                    let body = CapturedBody::new(Body::new(body), log);
                    Ok(Response::from_parts(parts, Body::new(body)))
                }
                Ok(Err(err)) => {
                    log.fail(err.to_string());
                    Err(err)
                }
                Err(payload) => Ok(log.recover(RecoveredPanic::from_payload(payload))),
            }
        })
    }
}

/// Full tracing stack: correlation stage around the logging stage.
#[derive(Debug, Clone)]
pub struct TraceLayer {
    correlation: CorrelationLayer,
    logging: RequestLogLayer,
}

impl TraceLayer {
    pub fn new(correlation: CorrelationLayer, logging: RequestLogLayer) -> Self {
        Self {
            correlation,
            logging,
        }
    }

    /// Stack logging through `tracing`, as configured.
    pub fn from_config(config: &TraceConfig) -> Self {
        Self::with_dispatcher(config, Dispatcher::tracing(config.logging.verbose))
    }

    /// Stack logging to a custom sink.
    pub fn with_sink(config: &TraceConfig, sink: Arc<dyn LogSink>) -> Self {
        Self::with_dispatcher(config, Dispatcher::new(config.logging.verbose, sink))
    }

    fn with_dispatcher(config: &TraceConfig, dispatcher: Dispatcher) -> Self {
        Self::new(
            CorrelationLayer::from_config(&config.correlation),
            RequestLogLayer::new(dispatcher),
        )
    }
}

impl<S> Layer<S> for TraceLayer {
    type Service = CorrelationService<RequestLogService<S>>;

    fn layer(&self, inner: S) -> Self::Service {
        self.correlation.layer(self.logging.layer(inner))
    }
}

/// Wrap every route of `router` with request tracing.
pub fn trace(router: Router, config: &TraceConfig) -> Router {
    router.layer(TraceLayer::from_config(config))
}
