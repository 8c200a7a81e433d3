use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::manager::RequestOffer;
use crate::engine::tracking::LocationUpdate;
use crate::error::AppError;
use crate::state::AppState;

/// Driver-side stream of new-request offers. The socket doubles as the
/// driver's liveness signal: when it drops, the driver's tracking sessions
/// are purged (dead-man's switch) and restart on the next online toggle.
pub async fn driver_offers(
    ws: WebSocketUpgrade,
    Path(driver_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let manager = state
        .managers
        .get(&driver_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::Conflict("driver is not online".to_string()))?;

    let offers = manager.subscribe_offers();
    Ok(ws.on_upgrade(move |socket| handle_offers(socket, state, driver_id, offers)))
}

async fn handle_offers(
    socket: WebSocket,
    state: Arc<AppState>,
    driver_id: Uuid,
    mut offers: broadcast::Receiver<RequestOffer>,
) {
    let (mut sender, mut receiver) = socket.split();

    info!(%driver_id, "driver offer stream connected");

    let send_task = tokio::spawn(async move {
        while let Ok(offer) = offers.recv().await {
            let json = match serde_json::to_string(&offer) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize offer for ws");
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

    state.tracker.disconnect_cleanup(driver_id);
    info!(%driver_id, "driver offer stream disconnected");
}

/// Customer-side live position feed for one ride.
pub async fn ride_location(
    ws: WebSocketUpgrade,
    Path(ride_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let updates = state.tracker.subscribe();
    ws.on_upgrade(move |socket| handle_location(socket, ride_id, updates))
}

async fn handle_location(
    socket: WebSocket,
    ride_id: Uuid,
    mut updates: broadcast::Receiver<LocationUpdate>,
) {
    let (mut sender, mut receiver) = socket.split();

    let send_task = tokio::spawn(async move {
        while let Ok(update) = updates.recv().await {
            if update.ride_id != ride_id {
                continue;
            }
            let json = match serde_json::to_string(&update) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize location update for ws");
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
}
