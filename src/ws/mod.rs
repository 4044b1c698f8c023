//! WebSocket audio server
//!
//! Browser-facing listener on its own port. Each connection is upgraded,
//! told the stream format in a JSON text frame, and then fed PCM as binary
//! frames from a bounded per-session queue. A text `"ping"` elicits a text
//! `"pong"`; sessions that go silent past the timeout are closed with the
//! going-away code.

pub mod session;

pub use session::WsSession;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, HeaderValue};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::broadcast::AudioSink;
use crate::capture::AudioFormat;

/// `Server` header sent in the upgrade response
const SERVER_HEADER: &str = "AudioShare-WebSocket/1.0";

/// How long the sender naps when a session's queue is empty
const SEND_IDLE_WAIT: Duration = Duration::from_millis(5);

type WsSink = Arc<tokio::sync::Mutex<SplitSink<WebSocket, Message>>>;

/// WebSocket audio server and session table
pub struct WsServer {
    sessions: Mutex<HashMap<u64, Arc<WsSession>>>,
    next_id: AtomicU64,
    format_document: String,
    heartbeat_interval: Duration,
    heartbeat_timeout: Duration,
    shutdown: CancellationToken,
}

impl WsServer {
    pub(crate) fn new(
        format: &AudioFormat,
        heartbeat_interval: Duration,
        heartbeat_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            format_document: format.to_json_document(),
            heartbeat_interval,
            heartbeat_timeout,
            shutdown,
        }
    }

    /// Serve upgrade requests on `listener` until `shutdown` is cancelled
    pub(crate) async fn run(self: Arc<Self>, listener: TcpListener) {
        let shutdown = self.shutdown.clone();
        let app = Router::new()
            .route("/", get(upgrade_handler))
            .fallback(upgrade_handler)
            .with_state(Arc::clone(&self));

        let serve = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await });

        if let Err(e) = serve.await {
            tracing::error!(error = %e, "websocket server error");
        }
        tracing::info!("websocket server stopped");
    }

    /// Number of live sessions
    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    fn insert_session(&self) -> Arc<WsSession> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(WsSession::new(id, self.shutdown.child_token()));

        let mut sessions = self.sessions.lock().unwrap();
        sessions.insert(id, Arc::clone(&session));
        tracing::info!(session_id = id, total = sessions.len(), "websocket session added");

        session
    }

    fn remove_session(&self, id: u64) {
        let mut sessions = self.sessions.lock().unwrap();
        if sessions.remove(&id).is_some() {
            tracing::info!(session_id = id, total = sessions.len(), "websocket session removed");
        }
    }
}

impl AudioSink for WsServer {
    /// Queue one PCM block for every live session
    ///
    /// The block is copied once; sessions share the copy by reference.
    fn deliver(&self, data: &[u8], _block_align: usize) {
        let sessions: Vec<Arc<WsSession>> = {
            let sessions = self.sessions.lock().unwrap();
            if sessions.is_empty() {
                return;
            }
            sessions.values().cloned().collect()
        };

        let payload = Bytes::copy_from_slice(data);
        for session in sessions {
            if !session.is_closed() {
                session.enqueue(payload.clone());
            }
        }
    }
}

async fn upgrade_handler(
    State(server): State<Arc<WsServer>>,
    ws: WebSocketUpgrade,
) -> Response {
    let mut response = ws.on_upgrade(move |socket| run_session(server, socket));
    response
        .headers_mut()
        .insert(header::SERVER, HeaderValue::from_static(SERVER_HEADER));
    response
}

async fn run_session(server: Arc<WsServer>, socket: WebSocket) {
    let session = server.insert_session();
    let (sink, stream) = socket.split();
    let sink: WsSink = Arc::new(tokio::sync::Mutex::new(sink));

    // Announce the stream format before any audio.
    let format = Message::Text(server.format_document.clone().into());
    if sink.lock().await.send(format).await.is_err() {
        tracing::debug!(session_id = session.id, "format announcement failed");
        session.close();
        server.remove_session(session.id);
        return;
    }

    tokio::spawn(sender_loop(Arc::clone(&session), Arc::clone(&sink)));
    tokio::spawn(heartbeat_loop(
        Arc::clone(&session),
        Arc::clone(&sink),
        server.heartbeat_interval,
        server.heartbeat_timeout,
    ));

    read_loop(&session, &sink, stream).await;

    session.close();
    server.remove_session(session.id);
    if session.dropped_count() > 0 {
        tracing::debug!(
            session_id = session.id,
            dropped = session.dropped_count(),
            "session ended with dropped segments"
        );
    }
}

async fn read_loop(session: &Arc<WsSession>, sink: &WsSink, mut stream: SplitStream<WebSocket>) {
    loop {
        let message = tokio::select! {
            _ = session.shutdown.cancelled() => break,
            message = stream.next() => message,
        };

        let Some(message) = message else { break };
        session.last_tick.touch();

        match message {
            Ok(Message::Text(text)) => {
                if text.as_str() == "ping" {
                    let pong = Message::Text("pong".into());
                    if sink.lock().await.send(pong).await.is_err() {
                        break;
                    }
                }
            }
            Ok(Message::Close(_)) => {
                tracing::debug!(session_id = session.id, "client closed connection");
                break;
            }
            // Binary and ping/pong frames only refresh liveness.
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(session_id = session.id, error = %e, "read error");
                break;
            }
        }
    }
}

/// Pop queued segments and write them as binary frames
async fn sender_loop(session: Arc<WsSession>, sink: WsSink) {
    loop {
        match session.pop() {
            Some(payload) => {
                if sink.lock().await.send(Message::Binary(payload)).await.is_err() {
                    session.close();
                    break;
                }
            }
            None => {
                tokio::select! {
                    _ = session.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(SEND_IDLE_WAIT) => {}
                }
            }
        }

        if session.is_closed() {
            break;
        }
    }
    tracing::trace!(session_id = session.id, "sender stopped");
}

/// Close sessions whose inbound traffic has gone stale
async fn heartbeat_loop(
    session: Arc<WsSession>,
    sink: WsSink,
    interval: Duration,
    timeout: Duration,
) {
    loop {
        tokio::select! {
            _ = session.shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        if session.last_tick.age() > timeout {
            tracing::info!(session_id = session.id, "websocket heartbeat timeout");
            let close = Message::Close(Some(CloseFrame {
                code: close_code::AWAY,
                reason: "heartbeat timeout".into(),
            }));
            let _ = sink.lock().await.send(close).await;
            session.close();
            break;
        }
    }
    tracing::trace!(session_id = session.id, "heartbeat supervisor stopped");
}
