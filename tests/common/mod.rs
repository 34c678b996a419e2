//! Shared harness: an emulator on an ephemeral port, HTTP subscribers
//! that forward what they receive into a channel, and an in-memory queue
//! service.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use local_sns::delivery::retry::RetryPolicy;
use local_sns::delivery::sqs::{QueueService, SendMessage};
use local_sns::handlers::router;
use local_sns::{AppState, Dispatcher, Registry, SharedState, SnsError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, mpsc};

pub const REGION: &str = "us-east-1";
pub const ACCOUNT_ID: &str = "123456789012";

pub fn topic_arn(name: &str) -> String {
    format!("arn:aws:sns:{}:{}:{}", REGION, ACCOUNT_ID, name)
}

#[derive(Default)]
pub struct RecordingQueue {
    pub sent: Mutex<Vec<SendMessage>>,
}

#[async_trait]
impl QueueService for RecordingQueue {
    async fn resolve_queue_url(&self, service_endpoint: &str, queue_name: &str) -> Result<String, SnsError> {
        Ok(format!("{}/{}/{}", service_endpoint, ACCOUNT_ID, queue_name))
    }

    async fn send_message(&self, _service_endpoint: &str, message: SendMessage) -> Result<(), SnsError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

pub fn test_state(retry: RetryPolicy) -> (SharedState, Arc<RecordingQueue>) {
    test_state_with_timeout(retry, Duration::from_secs(5))
}

pub fn test_state_with_timeout(
    retry: RetryPolicy,
    http_timeout: Duration,
) -> (SharedState, Arc<RecordingQueue>) {
    let registry = Arc::new(Registry::new(REGION, ACCOUNT_ID));
    let queue = Arc::new(RecordingQueue::default());
    let dispatcher =
        Dispatcher::new(registry.clone(), queue.clone(), retry).with_http_timeout(http_timeout);
    (AppState::new(registry, dispatcher), queue)
}

/// Bind to port 0 and return the emulator's base URL.
pub async fn start_server(state: SharedState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    format!("http://{addr}/")
}

pub struct SnsClient {
    base: String,
    http: reqwest::Client,
}

impl SnsClient {
    pub fn new(base: String) -> Self {
        Self {
            base,
            http: reqwest::Client::new(),
        }
    }

    pub async fn call(&self, params: &[(&str, &str)]) -> (u16, String) {
        let resp = self.http.post(&self.base).form(params).send().await.unwrap();
        (resp.status().as_u16(), resp.text().await.unwrap())
    }

    pub async fn create_topic(&self, name: &str) -> String {
        let (_, xml) = self.call(&[("Action", "CreateTopic"), ("Name", name)]).await;
        tag(&xml, "TopicArn").unwrap()
    }

    pub async fn subscribe(&self, topic_arn: &str, endpoint: &str, attributes: &[(&str, &str)]) -> String {
        let mut params = vec![
            ("Action".to_string(), "Subscribe".to_string()),
            ("TopicArn".to_string(), topic_arn.to_string()),
            ("Endpoint".to_string(), endpoint.to_string()),
            ("Protocol".to_string(), "http".to_string()),
        ];
        for (index, (key, value)) in attributes.iter().enumerate() {
            params.push((format!("Attributes.entry.{}.key", index + 1), key.to_string()));
            params.push((format!("Attributes.entry.{}.value", index + 1), value.to_string()));
        }
        let params: Vec<(&str, &str)> = params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let (status, xml) = self.call(&params).await;
        assert_eq!(status, 200, "{xml}");
        tag(&xml, "SubscriptionArn").unwrap()
    }

    /// Publishes with `(name, value)` string attributes.
    pub async fn publish(&self, topic_arn: &str, message: &str, attributes: &[(&str, &str)]) -> (u16, String) {
        let mut params = vec![
            ("Action".to_string(), "Publish".to_string()),
            ("TopicArn".to_string(), topic_arn.to_string()),
            ("Message".to_string(), message.to_string()),
        ];
        for (index, (name, value)) in attributes.iter().enumerate() {
            let base = format!("MessageAttributes.entry.{}", index + 1);
            params.push((format!("{base}.Name"), name.to_string()));
            params.push((format!("{base}.Value.DataType"), "String".to_string()));
            params.push((format!("{base}.Value.StringValue"), value.to_string()));
        }
        let params: Vec<(&str, &str)> = params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        self.call(&params).await
    }
}

/// Text of the first `<name>` element.
pub fn tag(xml: &str, name: &str) -> Option<String> {
    tags(xml, name).into_iter().next()
}

pub fn tags(xml: &str, name: &str) -> Vec<String> {
    let open = format!("<{name}>");
    let close = format!("</{name}>");
    let mut found = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find(&open) {
        let after = &rest[start + open.len()..];
        let Some(end) = after.find(&close) else { break };
        found.push(after[..end].to_string());
        rest = &after[end + close.len()..];
    }
    found
}

#[derive(Debug)]
pub struct Received {
    pub headers: HeaderMap,
    pub body: String,
}

#[derive(Clone)]
struct Capture {
    tx: mpsc::UnboundedSender<Received>,
    attempts: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
    fail_first: usize,
    gate: Option<Arc<Notify>>,
}

async fn capture(State(capture): State<Capture>, headers: HeaderMap, body: String) -> StatusCode {
    let attempt = capture.attempts.fetch_add(1, Ordering::SeqCst);
    if attempt < capture.fail_first {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    let _ = capture.tx.send(Received { headers, body });
    if let Some(gate) = &capture.gate {
        gate.notified().await;
    }
    capture.completed.fetch_add(1, Ordering::SeqCst);
    StatusCode::OK
}

/// An HTTP subscriber endpoint.
pub struct Subscriber {
    pub url: String,
    pub attempts: Arc<AtomicUsize>,
    /// Requests answered with 200.
    pub completed: Arc<AtomicUsize>,
    gate: Arc<Notify>,
    rx: mpsc::UnboundedReceiver<Received>,
}

impl Subscriber {
    pub async fn start() -> Self {
        Self::spawn(0, false).await
    }

    /// Answers 500 to the first `fail_first` requests.
    pub async fn failing_first(fail_first: usize) -> Self {
        Self::spawn(fail_first, false).await
    }

    /// Reports each request as it arrives but holds the response until
    /// `release` is called.
    pub async fn gated() -> Self {
        Self::spawn(0, true).await
    }

    async fn spawn(fail_first: usize, gated: bool) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let attempts = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());
        let app = Router::new().route("/", post(capture)).with_state(Capture {
            tx,
            attempts: attempts.clone(),
            completed: completed.clone(),
            fail_first,
            gate: gated.then(|| gate.clone()),
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            url: format!("http://{addr}/"),
            attempts,
            completed,
            gate,
            rx,
        }
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }

    pub async fn recv(&mut self) -> Received {
        tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("timed out waiting for delivery")
            .expect("subscriber channel closed")
    }

    /// True when nothing arrives within a short grace period.
    pub async fn stays_silent(&mut self) -> bool {
        tokio::time::timeout(Duration::from_millis(300), self.rx.recv())
            .await
            .is_err()
    }
}

/// An endpoint nothing listens on.
pub const UNREACHABLE: &str = "http://127.0.0.1:1/";

/// Accepts connections and never answers. Returns the URL and the number
/// of connections accepted so far.
pub async fn stalled_endpoint() -> (String, Arc<AtomicUsize>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            held.push(socket);
        }
    });
    (format!("http://{addr}/"), accepted)
}
