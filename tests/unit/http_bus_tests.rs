//! HTTP bus adapter against a canned local server.
//!
//! Each test binds `127.0.0.1:0`, answers exactly one request with a fixed
//! status and JSON body, and hands the raw request back for inspection.

use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use chat_orchestrator::bus::http::HttpBus;
use chat_orchestrator::bus::{messages_channel, read_channel, MessageBus};
use chat_orchestrator::config::BusConfig;
use chat_orchestrator::orchestrator::channel_reader::consume;
use chat_orchestrator::orchestrator::SessionRegistry;
use chat_orchestrator::AppError;

/// Request as seen by the canned server.
struct Captured {
    request_line: String,
    body: String,
}

impl Captured {
    fn json(&self) -> Value {
        serde_json::from_str(&self.body).expect("request body is json")
    }
}

fn header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

fn content_length(head: &str) -> usize {
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

/// Serve one request with `status` and `body`; returns the base URL.
async fn serve_once(status: &'static str, body: &'static str) -> (String, oneshot::Receiver<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let mut buf = Vec::new();
        let mut chunk = [0_u8; 1024];
        let split = loop {
            let n = stream.read(&mut chunk).await.expect("read");
            assert!(n > 0, "connection closed before headers");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = header_end(&buf) {
                break end;
            }
        };
        let head = String::from_utf8_lossy(&buf[..split]).into_owned();
        let wanted = content_length(&head);
        while buf.len() - split < wanted {
            let n = stream.read(&mut chunk).await.expect("read body");
            assert!(n > 0, "connection closed before body");
            buf.extend_from_slice(&chunk[..n]);
        }

        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.expect("write");
        stream.shutdown().await.ok();

        let _ = tx.send(Captured {
            request_line: head.lines().next().unwrap_or_default().to_owned(),
            body: String::from_utf8_lossy(&buf[split..split + wanted]).into_owned(),
        });
    });

    (format!("http://{addr}"), rx)
}

fn client(base_url: &str) -> HttpBus {
    HttpBus::new(base_url, Duration::from_secs(5)).expect("client")
}

#[tokio::test]
async fn register_posts_agent_and_channels() {
    let (url, request) = serve_once("200 OK", r#"{"agent_id":"orchestrator_1"}"#).await;
    let bus = client(&url);
    let channels = vec!["architect_messages".to_owned(), "architect_status".to_owned()];

    let agent_id = bus.register("orchestrator", &channels).await.expect("register");

    assert_eq!(agent_id, "orchestrator_1");
    let request = request.await.expect("request captured");
    assert!(request.request_line.starts_with("POST /register "));
    assert_eq!(
        request.json(),
        json!({"agent": "orchestrator", "channels": ["architect_messages", "architect_status"]})
    );
}

#[tokio::test]
async fn post_sends_channel_sender_and_body() {
    let (url, request) = serve_once("204 No Content", "").await;
    let bus = client(&url);

    bus.post("architect_status", "architect", json!({"done": true}))
        .await
        .expect("post");

    let request = request.await.expect("request captured");
    assert!(request.request_line.starts_with("POST /post "));
    assert_eq!(
        request.json(),
        json!({"channel": "architect_status", "sender": "architect", "body": {"done": true}})
    );
}

#[tokio::test]
async fn pull_passes_channel_since_and_limit() {
    let (url, request) = serve_once(
        "200 OK",
        r#"{"items":[{"id":5,"sender":"architect","body":"hi"}],"next":5}"#,
    )
    .await;
    let bus = client(&format!("{url}/"));

    let response = bus.pull("architect_messages", 4, 5).await.expect("pull");

    assert_eq!(response.items.len(), 1);
    assert_eq!(response.items[0].id, Some(5));
    assert_eq!(response.items[0].sender.as_deref(), Some("architect"));
    assert_eq!(response.items[0].body_text(), "hi");
    assert_eq!(response.next, Some(5));

    let request = request.await.expect("request captured");
    assert!(
        request
            .request_line
            .starts_with("GET /pull?channel=architect_messages&since=4&limit=5 "),
        "got {}",
        request.request_line
    );
}

#[tokio::test]
async fn pull_without_next_advances_by_item_count() {
    let (url, _request) = serve_once(
        "200 OK",
        r#"{"items":[{"body":"a"},{"body":{"step":2}},{"body":"c"}]}"#,
    )
    .await;
    let bus = client(&url);

    let batch = read_channel(&bus, "executor_messages", 7, 5)
        .await
        .expect("read");

    assert_eq!(batch.since, 7);
    assert_eq!(batch.next, 10);
    assert_eq!(batch.items.len(), 3);
    assert_eq!(batch.items[1].body_text(), r#"{"step":2}"#);
}

#[tokio::test]
async fn list_channels_reads_channel_names() {
    let (url, request) = serve_once(
        "200 OK",
        r#"{"channels":["architect_messages","architect_status"]}"#,
    )
    .await;
    let bus = client(&url);

    let channels = bus.list_channels().await.expect("channels");

    assert_eq!(channels, vec!["architect_messages", "architect_status"]);
    let request = request.await.expect("request captured");
    assert!(request.request_line.starts_with("GET /channels "));
}

#[tokio::test]
async fn error_status_is_a_bus_error() {
    let (url, _request) = serve_once("503 Service Unavailable", r#"{"error":"down"}"#).await;
    let bus = client(&url);

    let err = bus.pull("architect_messages", 0, 5).await.unwrap_err();

    assert!(matches!(err, AppError::Bus(_)), "got {err:?}");
    assert!(err.to_string().contains("503"));
}

#[tokio::test]
async fn unreachable_bus_is_a_bus_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let err = client(&format!("http://{addr}"))
        .list_channels()
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Bus(_)), "got {err:?}");
}

#[tokio::test]
async fn failed_pull_leaves_session_untouched() {
    let (url, _request) = serve_once("500 Internal Server Error", "{}").await;
    let bus = client(&url);
    let registry = SessionRegistry::new();
    let id = registry.create("architect", "plan");
    let session = registry.get(&id).expect("session");
    let channel = messages_channel("architect");

    let items = consume(&bus, &registry, &session, &channel, Utc::now()).await;

    assert!(items.is_empty());
    let after = registry.get(&id).expect("session");
    assert_eq!(after.offset_for(&channel), 0);
    assert_eq!(after.message_count, 0);
    assert_eq!(after.last_activity_at, session.last_activity_at);
}

#[test]
fn from_config_requires_url() {
    let err = HttpBus::from_config(&BusConfig::default()).err().expect("no url");
    assert!(matches!(err, AppError::Config(_)), "got {err:?}");

    let config = BusConfig {
        url: Some("http://127.0.0.1:9".into()),
        ..BusConfig::default()
    };
    assert!(HttpBus::from_config(&config).is_ok());
}
