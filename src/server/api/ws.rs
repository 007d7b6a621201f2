//! `GET /ws/bulk-jobs/{id}`: streams a job's event-bus traffic to a
//! WebSocket client as JSON text frames.
//!
//! Grounded on `original_source/backend-bulk/app/api/v1/websocket.py`'s
//! `ConnectionManager`: a `connected` handshake message first, then every
//! event published on the job's channel for the life of the connection.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;

use crate::events::JobEvent;
use crate::server::AppState;

pub async fn job_events(State(state): State<AppState>, Path(job_id): Path<String>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, job_id))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, job_id: String) {
    let mut receiver = match state.events.subscribe(&job_id).await {
        Ok(rx) => rx,
        Err(e) => {
            tracing::warn!(job_id = %job_id, error = %e, "failed to subscribe to job event channel");
            return;
        }
    };

    let handshake = JobEvent::Connected { job_id: job_id.clone() };
    if send_event(&mut socket, &handshake).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            event = receiver.recv() => {
                match event {
                    Ok(event) => {
                        if send_event(&mut socket, &event).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(job_id = %job_id, skipped, "websocket consumer lagged behind event bus");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }
}

async fn send_event(socket: &mut WebSocket, event: &JobEvent) -> Result<(), axum::Error> {
    let payload = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    socket.send(Message::Text(payload)).await
}
