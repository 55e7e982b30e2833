use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::debug;

use crate::api::AppState;
use crate::observer::ScreeningEvent;

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    /// Only forward events for this screening session.
    pub session_id: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.session_id))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, session_id: Option<String>) {
    let (sender, receiver) = socket.split();
    let rx = state.ws_tx.subscribe();
    debug!(session_id = ?session_id, "WebSocket client connected");
    run_socket_loop(sender, receiver, rx, session_id).await;
    debug!("WebSocket client disconnected");
}

/// Whether a serialized [`ScreeningEvent`] should reach a client filtering on `session_id`.
///
/// Frames that are not screening events are forwarded unchanged.
pub fn frame_matches(frame: &str, session_id: Option<&str>) -> bool {
    let Some(wanted) = session_id else {
        return true;
    };
    match serde_json::from_str::<ScreeningEvent>(frame) {
        Ok(event) => event.session_id() == wanted,
        Err(_) => true,
    }
}

/// Core WebSocket loop with ping/pong keepalive.
///
/// Combines broadcast forwarding, client message receiving, and periodic
/// ping/pong health checking into a single select loop. If no Pong is
/// received within [`PONG_TIMEOUT`] after a Ping is sent, the connection
/// is considered dead and the loop exits.
async fn run_socket_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut rx: broadcast::Receiver<String>,
    session_id: Option<String>,
) {
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // The first tick completes immediately.
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    break;
                }
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }

            result = rx.recv() => {
                match result {
                    Ok(frame) => {
                        if !frame_matches(&frame, session_id.as_deref()) {
                            continue;
                        }
                        if sender.send(Message::Text(frame.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "WebSocket client lagging, events dropped");
                        continue;
                    }
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    let _ = sender.send(Message::Close(None)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::BroadcastObserver;
    use screenwise_common::RunStatus;

    fn finished(session_id: &str) -> ScreeningEvent {
        ScreeningEvent::RunFinished {
            session_id: session_id.to_string(),
            status: RunStatus::Completed,
            error: None,
        }
    }

    #[test]
    fn test_frame_matches_session_filter() {
        let frame = serde_json::to_string(&finished("s-1")).unwrap();
        assert!(frame_matches(&frame, None));
        assert!(frame_matches(&frame, Some("s-1")));
        assert!(!frame_matches(&frame, Some("s-2")));
        assert!(frame_matches("not an event", Some("s-2")));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_subscribers() {
        let (tx, mut rx1) = broadcast::channel::<String>(16);
        let mut rx2 = tx.subscribe();

        let observer = BroadcastObserver::connect(&tx);
        assert_eq!(observer.send(&finished("s-1")), 2);

        let received1 = rx1.recv().await.unwrap();
        let received2 = rx2.recv().await.unwrap();
        assert!(received1.contains("\"type\":\"RunFinished\""));
        assert_eq!(received1, received2);
    }

    #[test]
    fn test_keepalive_constants() {
        assert!(PONG_TIMEOUT > PING_INTERVAL);
    }
}
