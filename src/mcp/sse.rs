//! HTTP event-stream transport.
//!
//! A client opens `GET /sse` and keeps it open; the first event tells it
//! where to post (`/messages?sessionId=<id>`). Every JSON-RPC request it
//! posts there is dispatched and the response is pushed down the event
//! stream of that session, while the POST itself only gets `202 Accepted`.

use actix_web::http::{header, StatusCode};
use actix_web::{web, HttpRequest, HttpResponse};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::Instrument;

use super::dispatcher::Dispatcher;
use super::errors::SessionClosed;
use super::protocol::{JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION};
use super::session::{SessionId, SessionManager};
use crate::configuration::HttpSettings;
use crate::routes::text_response;

pub const SSE_PATH: &str = "/sse";
pub const MESSAGES_PATH: &str = "/messages";

const KEEP_ALIVE: &[u8] = b": keep-alive\n\n";

/// One server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

impl SseEvent {
    /// Tells the client which URL its messages go to
    pub fn endpoint(url: String) -> Self {
        Self {
            event: "endpoint".to_string(),
            data: url,
        }
    }

    /// Carries a serialized JSON-RPC message
    pub fn message(data: String) -> Self {
        Self {
            event: "message".to_string(),
            data,
        }
    }

    /// Wire format: `event:` line, one `data:` line per payload line, blank line.
    pub fn to_bytes(&self) -> web::Bytes {
        let mut out = format!("event: {}\n", self.event);
        for line in self.data.split('\n') {
            out.push_str("data: ");
            out.push_str(line.trim_end_matches('\r'));
            out.push('\n');
        }
        out.push('\n');
        web::Bytes::from(out)
    }
}

/// Response body of an open `GET /sse`.
///
/// Owns the receiving half of the session's channel. However the stream
/// ends (client gone, write error, server shutdown) actix drops the body,
/// and dropping it removes the session. That is the only place a session
/// is closed on disconnect.
///
/// actix only notices a vanished client when a write fails, and the first
/// write after the peer closed still succeeds. The keep-alive period
/// therefore bounds how long a dead session lingers to two ticks.
pub struct EventChannel {
    session_id: SessionId,
    sessions: Arc<SessionManager>,
    events: mpsc::UnboundedReceiver<SseEvent>,
    keep_alive: Interval,
}

impl EventChannel {
    /// Create a session and the stream that serves it. The endpoint event
    /// is already queued when this returns.
    pub fn open(sessions: Arc<SessionManager>, keep_alive: Duration) -> (SessionId, Self) {
        let (tx, events) = mpsc::unbounded_channel();
        let session_id = sessions.create(tx.clone());

        // cannot fail: `events` is alive
        let _ = tx.send(SseEvent::endpoint(format!(
            "{}?sessionId={}",
            MESSAGES_PATH, session_id
        )));

        let mut keep_alive = interval_at(Instant::now() + keep_alive, keep_alive);
        keep_alive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let channel = Self {
            session_id,
            sessions,
            events,
            keep_alive,
        };
        (session_id, channel)
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }
}

impl Stream for EventChannel {
    type Item = Result<web::Bytes, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        match this.events.poll_recv(cx) {
            Poll::Ready(Some(event)) => return Poll::Ready(Some(Ok(event.to_bytes()))),
            // the session was retired server side
            Poll::Ready(None) => return Poll::Ready(None),
            Poll::Pending => {}
        }

        match this.keep_alive.poll_tick(cx) {
            Poll::Ready(_) => Poll::Ready(Some(Ok(web::Bytes::from_static(KEEP_ALIVE)))),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        if self.sessions.remove(&self.session_id) {
            tracing::info!(session_id = %self.session_id, "SSE connection closed");
        }
    }
}

/// `GET /sse` - open a session and stream its events
#[tracing::instrument(name = "Open SSE session", skip_all)]
pub async fn open_event_channel(
    sessions: web::Data<SessionManager>,
    settings: web::Data<HttpSettings>,
) -> HttpResponse {
    let (session_id, channel) =
        EventChannel::open(sessions.into_inner(), settings.keep_alive_interval());

    tracing::info!(session_id = %session_id, "SSE connection opened");

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(channel)
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// Raw `sessionId` query value, empty when absent or unreadable
fn session_id_param(query: &str) -> String {
    web::Query::<MessageQuery>::from_query(query)
        .ok()
        .and_then(|q| q.into_inner().session_id)
        .unwrap_or_default()
}

fn is_json(req: &HttpRequest) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false)
}

fn no_transport(raw_id: &str) -> HttpResponse {
    text_response(
        StatusCode::BAD_REQUEST,
        &format!("No transport found for sessionId '{}'", raw_id),
    )
}

/// `POST /messages?sessionId=<id>` - dispatch one message for a session
pub async fn submit_message(
    req: HttpRequest,
    mut payload: web::Payload,
    sessions: web::Data<SessionManager>,
    dispatcher: web::Data<Dispatcher>,
    settings: web::Data<HttpSettings>,
) -> Result<HttpResponse, actix_web::Error> {
    let raw_id = session_id_param(req.query_string());

    // malformed and unknown ids are the same thing to the caller
    let session_id = match raw_id.parse::<SessionId>() {
        Ok(id) if sessions.get(&id).is_some() => id,
        _ => {
            tracing::warn!(session_id = %raw_id, "Message for unknown session");
            return Ok(no_transport(&raw_id));
        }
    };

    if !is_json(&req) {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");
        return Ok(text_response(
            StatusCode::BAD_REQUEST,
            &format!("Unsupported content-type: {}", content_type),
        ));
    }

    // the body is only read once the session is known to exist
    let mut body = web::BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk?;
        if body.len() + chunk.len() > settings.max_message_bytes {
            return Ok(text_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                &format!("Message exceeds {} bytes", settings.max_message_bytes),
            ));
        }
        body.extend_from_slice(&chunk);
    }

    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::error!("[MCP] Failed to parse JSON-RPC request: {}", e);
            return Ok(text_response(
                StatusCode::BAD_REQUEST,
                &format!("Invalid message: {}", e),
            ));
        }
    };

    let span = tracing::info_span!(
        "mcp_message",
        session_id = %session_id,
        method = %request.method
    );
    if let Some(response) = dispatcher.handle(request).instrument(span).await {
        if let Err(e) = deliver(&sessions, &session_id, &response) {
            tracing::warn!("Response not delivered: {}", e);
            return Ok(no_transport(&raw_id));
        }
    }

    Ok(HttpResponse::Accepted().body("Accepted"))
}

/// Push a response onto the session's event stream.
///
/// The session is looked up again because it may have closed while the
/// request was being dispatched.
fn deliver(
    sessions: &SessionManager,
    session_id: &SessionId,
    response: &JsonRpcResponse,
) -> Result<(), SessionClosed> {
    let session = sessions
        .get(session_id)
        .ok_or_else(|| SessionClosed(session_id.to_string()))?;

    let text = serde_json::to_string(response).unwrap_or_else(|e| {
        tracing::error!("[MCP] Failed to serialize JSON-RPC response: {}", e);
        serde_json::json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": response.id,
            "error": { "code": -32603, "message": "failed to serialize response" }
        })
        .to_string()
    });

    session.send(SseEvent::message(text))?;
    tracing::debug!(
        session_id = %session_id,
        "[MCP] Sent JSON-RPC response: id={:?}, has_error={}",
        response.id,
        response.error.is_some()
    );
    Ok(())
}
