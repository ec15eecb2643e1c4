//! WebSocket transport for job sessions.
//!
//! Each connection gets its own [`SessionController`]. The controller writes
//! into a bounded channel; a writer task drains it into the socket. Inbound
//! text frames are parsed as job requests, anything unparseable is ignored.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures::{future, SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use vidscope_core::{JobRequest, ServerMessage, SessionController, SessionError};

use crate::metrics::{
    WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_MALFORMED_MESSAGES, WS_MESSAGES_SENT,
    WS_SESSION_ERRORS,
};
use crate::state::AppState;

/// Query accepted on the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    /// Source to analyze as soon as the connection is up.
    pub url: Option<String>,
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.url))
}

/// Handle a single WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, initial: Option<String>) {
    let (mut sender, receiver) = socket.split();
    let session_config = state.config().session.clone();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(session_config.channel_capacity);

    // Track connection metrics
    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();

    let mut controller = SessionController::new(state.sessions(), tx);
    info!(session = %controller.id(), "WebSocket client connected");

    if let Some(url) = initial {
        controller.enqueue(JobRequest::new(url));
    }

    // Forward session messages to the client
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            WS_MESSAGES_SENT.with_label_values(&[message_type(&msg)]).inc();

            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, client disconnected");
                        return;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize ServerMessage: {}", e);
                }
            }
        }
        let _ = sender.close().await;
    });

    // Client frames until close or error, as job requests
    let inbound = receiver
        .take_while(|result| {
            future::ready(match result {
                Ok(Message::Close(_)) => {
                    debug!("WebSocket client requested close");
                    false
                }
                Ok(_) => true,
                Err(e) => {
                    warn!("WebSocket receive error: {}", e);
                    false
                }
            })
        })
        .filter_map(|result| {
            future::ready(match result {
                Ok(Message::Text(text)) => parse_request(text.as_str()),
                _ => None,
            })
        })
        .boxed();

    match controller.run(inbound).await {
        Ok(summary) => {
            debug!(
                started = summary.jobs_started,
                succeeded = summary.jobs_succeeded,
                "Session finished"
            );
            // Let the writer flush what is queued, but not forever.
            let grace = Duration::from_secs(session_config.client_send_timeout_secs);
            if tokio::time::timeout(grace, &mut send_task).await.is_err() {
                send_task.abort();
            }
        }
        Err(e) => {
            if matches!(e, SessionError::Connection(_)) {
                WS_SESSION_ERRORS.inc();
            }
            warn!("Session aborted: {}", e);
            send_task.abort();
        }
    }

    WS_CONNECTIONS_ACTIVE.dec();
    info!("WebSocket client disconnected");
}

/// Parses one text frame; malformed frames are logged and dropped.
fn parse_request(text: &str) -> Option<JobRequest> {
    match serde_json::from_str::<JobRequest>(text) {
        Ok(request) => Some(request),
        Err(e) => {
            WS_MALFORMED_MESSAGES.inc();
            warn!("Ignoring malformed request: {}", e);
            None
        }
    }
}

fn message_type(msg: &ServerMessage) -> &'static str {
    match msg {
        ServerMessage::Progress { .. } => "progress",
        ServerMessage::Completed => "completed",
        ServerMessage::Result { .. } => "result",
        ServerMessage::Failure { .. } => "failure",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request() {
        let request = parse_request(r#"{"source_locator":"https://youtu.be/c8XQp5brszI"}"#).unwrap();
        assert_eq!(request.locator(), Some("https://youtu.be/c8XQp5brszI"));

        let legacy = parse_request(r#"{"message":"video.mp4"}"#).unwrap();
        assert_eq!(legacy.locator(), Some("video.mp4"));
    }

    #[test]
    fn test_parse_request_rejects_garbage() {
        assert!(parse_request("not json").is_none());
        assert!(parse_request(r#"["source_locator"]"#).is_none());
    }

    #[test]
    fn test_message_type_matches_wire_tag() {
        let messages = [
            ServerMessage::Progress { line: "x".to_string() },
            ServerMessage::Completed,
            ServerMessage::Result { video_url: "/static/output.mp4".to_string() },
        ];
        for msg in messages {
            let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
            assert_eq!(json["type"], message_type(&msg));
        }
    }
}
