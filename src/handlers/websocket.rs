use futures_util::sink::SinkExt;
use futures_util::stream::StreamExt;
use log::{debug, error, info};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;
use warp::ws::WebSocket;

use crate::core::event_handler::EventHandler;
use crate::core::gateway::SharedGateway;

/// Connect parameters carried on the upgrade request query string
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub token: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

// Handle one WebSocket connection: admission, read loop, cleanup
pub async fn handle_ws_client(ws: WebSocket, query: ConnectQuery, gateway: SharedGateway) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<warp::ws::Message>();

    // Writer pump: forward queued frames to the socket. A close frame
    // (queued by a kick or rejection) ends the pump after delivery.
    tokio::task::spawn(async move {
        while let Some(message) = rx.recv().await {
            let is_close = message.is_close();
            if let Err(e) = ws_tx.send(message).await {
                error!("Failed to send WebSocket message: {}", e);
                break;
            }
            if is_close {
                break;
            }
        }
    });

    let connection_id = Uuid::new_v4().to_string();

    // Admission: on any failure the rejection notice (if one applies)
    // is already queued; close the transport and stop.
    if let Err(e) = gateway
        .admit_connection(
            connection_id.clone(),
            query.token.as_deref(),
            query.user_id.as_deref(),
            tx.clone(),
        )
        .await
    {
        info!("Connection {} rejected: {}", connection_id, e);
        let _ = tx.send(warp::ws::Message::close());
        return;
    }

    info!(
        "Client connected: {} ({} online)",
        connection_id,
        gateway.connection_count().await
    );

    let handler = EventHandler::new(gateway.clone());

    // Each connection's events are handled sequentially here, which
    // preserves per-sender acceptance order.
    while let Some(result) = ws_rx.next().await {
        match result {
            Ok(msg) => {
                if let Ok(text) = msg.to_str() {
                    handler.handle_event(&connection_id, text).await;
                } else if msg.is_close() {
                    debug!("Close frame from {}", connection_id);
                    break;
                }
            }
            Err(e) => {
                error!("WebSocket error on {}: {}", connection_id, e);
                break;
            }
        }
    }

    // Removal is unconditional; a kicked session reaches here when the
    // transport drops after the close frame.
    gateway.disconnect(&connection_id).await;
}
