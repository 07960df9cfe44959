//! An empty process-wide user agent turns the header off.

use http_trace::client::{self, TracingClient};
use http_trace::{CorrelationId, RequestContext};

mod common;

#[tokio::test]
async fn test_empty_global_user_agent_sends_no_header() {
    std::env::set_var("SERVICE_NAME", "from-env");
    client::set_global_user_agent("").unwrap();
    assert!(client::global_user_agent().is_none());

    let (backend, captured) = common::spawn_capturing_backend().await;
    let ctx = RequestContext::with_correlation_id(CorrelationId::from("off-1"));
    TracingClient::new()
        .get(&ctx, &format!("http://{backend}/"))
        .await
        .unwrap();

    let seen = captured.lock().unwrap().clone();
    assert!(!seen[0].headers.contains_key("user-agent"));
    assert_eq!(seen[0].headers["x-request-id"], "off-1");
}
