use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Serialize;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub async fn bookings_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let stream = state.subscribe_booking_events();
    ws.on_upgrade(move |socket| forward(socket, stream, "bookings"))
}

pub async fn tracking_ws(
    ws: WebSocketUpgrade,
    Path(booking_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let stream = state.tracker.subscribe(booking_id)?;
    Ok(ws.on_upgrade(move |socket| forward(socket, stream, "tracking")))
}

/// Fan a broadcast stream out to one websocket client. Dropping the
/// socket drops the subscription; no further work happens for a detached
/// consumer.
async fn forward<T>(socket: WebSocket, mut stream: BroadcastStream<T>, channel: &'static str)
where
    T: Serialize + Clone + Send + 'static,
{
    let (mut sender, mut receiver) = socket.split();

    info!(channel, "websocket client connected");

    let send_task = tokio::spawn(async move {
        while let Some(event) = stream.next().await {
            // Lagged subscribers skip dropped events and continue.
            let Ok(event) = event else { continue };

            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize event for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!(channel, "websocket client disconnected");
}
