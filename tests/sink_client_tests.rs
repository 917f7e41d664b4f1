//! External sink client tests against a local mockito server.

use callscope::error::SinkError;
use callscope::plugin::{PluginRegistry, SinkHandler};
use callscope::sink::{route, ExternalMonitorSink, ExternalSinkClient, RetryPolicy, SinkClientConfig};
use callscope::telemetry::TelemetryEvent;
use mockito::{Matcher, Server};
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_secs(1),
    }
}

fn client_for(url: &str) -> ExternalSinkClient {
    let config = SinkClientConfig::new(url)
        .with_retry(fast_retry())
        .with_attempt_timeout(Duration::from_secs(5));
    ExternalSinkClient::new(config).expect("client should build")
}

#[test]
fn test_backoff_schedule_strictly_increases() {
    let policy = RetryPolicy::default();
    let schedule = policy.schedule();
    assert_eq!(schedule.len(), 3);
    assert_eq!(
        schedule,
        vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)]
    );
    assert!(schedule.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_backoff_respects_ceiling() {
    let policy = RetryPolicy {
        max_retries: 10,
        base_delay: Duration::from_millis(100),
        max_delay: Duration::from_millis(500),
    };
    assert_eq!(policy.delay_for(0), Duration::from_millis(100));
    assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    assert_eq!(policy.delay_for(3), Duration::from_millis(500));
    assert_eq!(policy.delay_for(40), Duration::from_millis(500));
}

#[test]
fn test_retryable_statuses() {
    for status in [500, 502, 503, 504] {
        assert!(RetryPolicy::is_retryable_status(status), "{} should retry", status);
    }
    for status in [200, 400, 401, 404, 429, 501] {
        assert!(!RetryPolicy::is_retryable_status(status), "{} should not retry", status);
    }
}

#[tokio::test]
async fn test_sustained_503_gives_up_after_three_retries() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/errors")
        .with_status(503)
        .expect(4)
        .create_async()
        .await;

    let client = client_for(&server.url());
    let started = Instant::now();
    let result = client.send("/errors", json!({ "error_message": "boom" })).await;

    match result {
        Err(SinkError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 4),
        other => panic!("expected exhausted retries, got {:?}", other),
    }
    // 10ms + 20ms + 40ms of backoff at minimum
    assert!(started.elapsed() >= Duration::from_millis(70));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/function_calls")
        .with_status(400)
        .expect(1)
        .create_async()
        .await;

    let client = client_for(&server.url());
    let result = client.send("/function_calls", json!({})).await;

    assert_eq!(result, Err(SinkError::Status(400)));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_success_on_first_attempt() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/performance_summary")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let client = client_for(&server.url());
    let delivery = client
        .send("/performance_summary", json!({ "performance_summary": {} }))
        .await
        .expect("delivery should succeed");

    assert_eq!(delivery.status, 200);
    assert_eq!(delivery.attempts, 1);
    assert!(delivery.delays.is_empty());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_api_key_is_attached_to_body() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/errors")
        .match_body(Matcher::PartialJson(json!({
            "api_key": "secret",
            "error_type": "ValueError",
        })))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let config = SinkClientConfig::new(format!("{}/", server.url()))
        .with_api_key("secret")
        .with_retry(fast_retry());
    let client = ExternalSinkClient::new(config).unwrap();
    client
        .send("/errors", json!({ "error_type": "ValueError", "error_message": "bad" }))
        .await
        .unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_connection_failure_is_retried_then_dropped() {
    // Nothing listens on port 1.
    let config = SinkClientConfig::new("http://127.0.0.1:1").with_retry(RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    });
    let client = ExternalSinkClient::new(config).unwrap();

    match client.send("/errors", json!({})).await {
        Err(SinkError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("expected exhausted retries, got {:?}", other),
    }
}

#[tokio::test]
async fn test_stalled_endpoint_times_out_and_is_retried() {
    // Accepts connections but never answers.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let acceptor = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let config = SinkClientConfig::new(format!("http://{}", addr))
        .with_retry(RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        })
        .with_attempt_timeout(Duration::from_millis(100));
    let client = ExternalSinkClient::new(config).unwrap();

    let started = Instant::now();
    match client.send("/errors", json!({})).await {
        Err(SinkError::RetriesExhausted { attempts, last }) => {
            assert_eq!(attempts, 3);
            assert!(last.contains("timed out"), "last failure was {}", last);
        }
        other => panic!("expected exhausted retries, got {:?}", other),
    }
    assert!(started.elapsed() >= Duration::from_millis(300));
    acceptor.abort();
}

#[test]
fn test_events_route_to_documented_paths() {
    let (path, body) = route(&TelemetryEvent::error("divide", "MathError", "division by zero")).unwrap();
    assert_eq!(path, "/errors");
    assert_eq!(body["error_type"], "MathError");
    assert_eq!(body["error_message"], "division by zero");

    let (path, body) = route(&TelemetryEvent::call("divide", 0.5, Some("bad".to_string()))).unwrap();
    assert_eq!(path, "");
    assert_eq!(body["func_name"], "divide");
    assert_eq!(body["execution_time"], 0.5);
    assert_eq!(body["success"], false);
    assert_eq!(body["error_message"], "bad");
    let mut keys: Vec<_> = body.as_object().unwrap().keys().cloned().collect();
    keys.sort();
    assert_eq!(
        keys,
        vec!["error_message", "execution_time", "func_name", "success", "timestamp"]
    );

    let (path, _) = route(&TelemetryEvent::PerformanceSummary {
        performance_summary: Default::default(),
        timestamp: 0,
    })
    .unwrap();
    assert_eq!(path, "/performance_summary");

    let (path, body) = route(&TelemetryEvent::FunctionCalls {
        function_call_summary: Default::default(),
        timestamp: 7,
    })
    .unwrap();
    assert_eq!(path, "/function_calls");
    assert_eq!(body["timestamp"], 7);
}

#[tokio::test]
async fn test_monitor_sink_forwards_registry_events() {
    let mut server = Server::new_async().await;
    let errors = server
        .mock("POST", "/errors")
        .match_body(Matcher::PartialJson(json!({ "operation": "divide" })))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let (sink, forwarder) = ExternalMonitorSink::spawn(client_for(&server.url()), 16);
    let registry = PluginRegistry::new();
    registry.register("external_monitor", sink).unwrap();

    let report = registry.broadcast(&TelemetryEvent::error("divide", "MathError", "division by zero"));
    assert!(report.is_clean());

    // Dropping the only handle closes the queue; the forwarder finishes delivery first.
    registry.unregister("external_monitor");
    forwarder.await.unwrap();
    errors.assert_async().await;
}

#[tokio::test]
async fn test_monitor_sink_reports_closed_queue() {
    let (sink, forwarder) = ExternalMonitorSink::spawn(client_for("http://127.0.0.1:1"), 1);
    forwarder.abort();
    let _ = forwarder.await;

    let result = sink.handle(&TelemetryEvent::call("op", 0.1, None));
    assert_eq!(result, Err(SinkError::Closed));
}
