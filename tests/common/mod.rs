use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use mcp_say_hello::configuration::get_configuration;
use mcp_say_hello::mcp::{tools, Dispatcher, SessionManager};
use mcp_say_hello::startup::run;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub struct TestApp {
    pub address: String,
    pub sessions: Arc<SessionManager>,
    pub keep_alive: Duration,
    pub client: reqwest::Client,
}

/// One parsed server-sent event
#[derive(Debug)]
pub struct Event {
    pub event: String,
    pub data: String,
}

/// Reads events off an open `GET /sse` response, skipping keep-alive comments.
pub struct EventStream {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    buffer: String,
}

impl EventStream {
    pub fn new(response: reqwest::Response) -> Self {
        Self {
            body: response
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
                .boxed(),
            buffer: String::new(),
        }
    }

    pub async fn next_event(&mut self) -> Option<Event> {
        loop {
            while let Some(end) = self.buffer.find("\n\n") {
                let block: String = self.buffer.drain(..end + 2).collect();
                if let Some(event) = parse_block(&block) {
                    return Some(event);
                }
            }

            match self.body.next().await {
                Some(Ok(chunk)) => self.buffer.push_str(&String::from_utf8_lossy(&chunk)),
                _ => return None,
            }
        }
    }

    /// Next event, or `None` if nothing arrives in time
    pub async fn next_event_within(&mut self, timeout: Duration) -> Option<Event> {
        tokio::time::timeout(timeout, self.next_event())
            .await
            .ok()
            .flatten()
    }

    /// Next `message` event, parsed as JSON
    pub async fn next_message(&mut self) -> Value {
        let event = self
            .next_event_within(Duration::from_secs(5))
            .await
            .expect("No message arrived on the event stream");
        assert_eq!(event.event, "message");
        serde_json::from_str(&event.data).expect("Message is not JSON")
    }
}

fn parse_block(block: &str) -> Option<Event> {
    let mut event = None;
    let mut data: Vec<&str> = Vec::new();

    for line in block.lines() {
        if let Some(value) = line.strip_prefix("event:") {
            event = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            data.push(value.strip_prefix(' ').unwrap_or(value));
        }
    }

    // comment-only blocks are keep-alives
    if event.is_none() && data.is_empty() {
        return None;
    }

    Some(Event {
        event: event.unwrap_or_else(|| "message".to_string()),
        data: data.join("\n"),
    })
}

impl TestApp {
    /// Open an event channel and return its session id with the stream
    pub async fn open_session(&self) -> (String, EventStream) {
        let response = self
            .client
            .get(format!("{}/sse", self.address))
            .send()
            .await
            .expect("Failed to execute request.");
        assert_eq!(response.status().as_u16(), 200);

        let mut events = EventStream::new(response);
        let endpoint = events
            .next_event_within(Duration::from_secs(5))
            .await
            .expect("No endpoint event");
        assert_eq!(endpoint.event, "endpoint");
        assert!(endpoint.data.starts_with("/messages?sessionId="));

        let session_id = endpoint
            .data
            .split("sessionId=")
            .nth(1)
            .expect("Endpoint without session id")
            .to_string();

        (session_id, events)
    }

    pub async fn post_message(&self, session_id: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(format!("{}/messages?sessionId={}", self.address, session_id))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }
}

pub async fn spawn_app() -> TestApp {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let configuration = get_configuration().expect("Failed to get configuration");
    let keep_alive = configuration.http.keep_alive_interval();

    let registry = tools::default_registry().expect("Failed to register tools");
    let dispatcher = Dispatcher::new(Arc::new(registry), configuration.server.clone());
    let sessions = Arc::new(SessionManager::new());

    let server = run(listener, configuration, dispatcher, sessions.clone())
        .expect("Failed to bind address.");
    let _ = tokio::spawn(server);

    TestApp {
        address,
        sessions,
        keep_alive,
        client: reqwest::Client::new(),
    }
}
