//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::Router;
use http_trace::config::TraceConfig;
use http_trace::observability::{LogRecord, MemorySink};
use http_trace::{HttpServer, Shutdown};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A traced server on an ephemeral port, logging into memory.
pub struct TestServer {
    pub addr: SocketAddr,
    pub sink: MemorySink,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<std::io::Result<()>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn spawn_server(config: TraceConfig, routes: Router) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let sink = MemorySink::new();
    let shutdown = Shutdown::new();

    let server = HttpServer::with_sink(config, routes, Arc::new(sink.clone()));
    let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));

    TestServer {
        addr,
        sink,
        shutdown,
        handle,
    }
}

/// Records are emitted when the response body completes, which can be
/// after the client has read it. Poll until `count` records are there.
pub async fn wait_for_records(sink: &MemorySink, count: usize) -> Vec<LogRecord> {
    for _ in 0..200 {
        if sink.len() >= count {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    sink.records()
}

/// What a backend saw of one request.
#[derive(Debug, Clone)]
pub struct Captured {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// A backend that records every request. `/teapot` answers 418, anything
/// else 200.
pub async fn spawn_capturing_backend() -> (SocketAddr, Arc<Mutex<Vec<Captured>>>) {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let store = captured.clone();

    let app = Router::new().fallback(
        move |method: Method, uri: Uri, headers: HeaderMap, body: Bytes| {
            let store = store.clone();
            async move {
                let path = uri.path().to_string();
                let status = if path == "/teapot" {
                    StatusCode::IM_A_TEAPOT
                } else {
                    StatusCode::OK
                };
                store.lock().unwrap().push(Captured {
                    method,
                    path,
                    headers,
                    body,
                });
                status
            }
        },
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, captured)
}
