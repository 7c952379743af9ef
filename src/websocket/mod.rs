//! WebSocket server for realtime notification and chat delivery

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};
use uuid::Uuid;

use crate::auth::AuthService;
use crate::chat::ChatMessage;
use crate::error::ApiError;
use crate::notifications::Notification;

/// Event pushed to a connected user
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RealtimeEvent {
    Notification { notification: Notification },
    Message { message: ChatMessage },
}

/// Event addressed to a single user
#[derive(Debug, Clone)]
pub struct Delivery {
    pub recipient: Uuid,
    pub event: RealtimeEvent,
}

/// WebSocket server state
#[derive(Clone)]
pub struct WsState {
    /// Broadcast channel; every connection filters by recipient
    pub tx: broadcast::Sender<Delivery>,
    /// Connected clients registry, keyed by connection id
    pub clients: Arc<RwLock<HashMap<Uuid, ClientInfo>>>,
}

/// Client connection information
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub connection_id: Uuid,
    pub user_id: Uuid,
    pub connected_at: DateTime<Utc>,
}

/// Client message types
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ClientMessage {
    Ping,
}

/// Server control messages
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    Connected { user_id: Uuid },
    Pong,
    Error { message: String },
}

impl Default for WsState {
    fn default() -> Self {
        Self::new()
    }
}

impl WsState {
    /// Create new WebSocket state
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self {
            tx,
            clients: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Best-effort delivery to one user's open connections
    pub fn send_to(&self, recipient: Uuid, event: RealtimeEvent) {
        if self.tx.receiver_count() == 0 {
            return;
        }
        if let Err(e) = self.tx.send(Delivery { recipient, event }) {
            tracing::debug!(recipient = %recipient, "Realtime delivery dropped: {}", e);
        }
    }

    /// Number of open connections
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    async fn register_client(&self, connection_id: Uuid, user_id: Uuid) {
        let mut clients = self.clients.write().await;
        clients.insert(
            connection_id,
            ClientInfo {
                connection_id,
                user_id,
                connected_at: Utc::now(),
            },
        );
        tracing::info!(connection_id = %connection_id, user_id = %user_id, "Client connected");
    }

    async fn unregister_client(&self, connection_id: &Uuid) {
        let mut clients = self.clients.write().await;
        clients.remove(connection_id);
        tracing::info!(connection_id = %connection_id, "Client disconnected");
    }
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: String,
}

/// Upgrades the connection once the access token in `?token=` checks out
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(auth_service): State<Arc<AuthService>>,
    State(state): State<WsState>,
) -> Result<Response, ApiError> {
    let user = auth_service.authenticate(&query.token).await?;
    let user_id = user.id;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user_id)))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, state: WsState, user_id: Uuid) {
    let connection_id = Uuid::new_v4();
    state.register_client(connection_id, user_id).await;

    let (mut sender, mut receiver) = socket.split();

    // Control replies produced by the receive loop
    let (internal_tx, mut internal_rx) = mpsc::channel::<ServerMessage>(32);
    let _ = internal_tx.send(ServerMessage::Connected { user_id }).await;

    let mut rx = state.tx.subscribe();

    let mut send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                Ok(delivery) = rx.recv() => {
                    if delivery.recipient != user_id {
                        continue;
                    }
                    if let Ok(text) = serde_json::to_string(&delivery.event) {
                        if sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                }
                Some(msg) = internal_rx.recv() => {
                    if let Ok(text) = serde_json::to_string(&msg) {
                        if sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                }
                else => break,
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    let reply = match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(ClientMessage::Ping) => ServerMessage::Pong,
                        Err(_) => ServerMessage::Error {
                            message: "Unsupported message".to_string(),
                        },
                    };
                    let _ = internal_tx.send(reply).await;
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    state.unregister_client(&connection_id).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::NotificationType;

    fn notification_for(user_id: Uuid) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            user_id,
            kind: NotificationType::OrderPlaced,
            title: "New order".to_string(),
            message: "You have a new order".to_string(),
            data: serde_json::json!({}),
            is_read: false,
            read_at: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_send_to_reaches_subscribers() {
        let state = WsState::new();
        let mut rx = state.tx.subscribe();
        let user_id = Uuid::new_v4();

        state.send_to(
            user_id,
            RealtimeEvent::Notification {
                notification: notification_for(user_id),
            },
        );

        let delivery = rx.recv().await.unwrap();
        assert_eq!(delivery.recipient, user_id);
    }

    #[test]
    fn test_send_without_subscribers_is_silent() {
        let state = WsState::new();
        let user_id = Uuid::new_v4();
        state.send_to(
            user_id,
            RealtimeEvent::Notification {
                notification: notification_for(user_id),
            },
        );
    }

    #[test]
    fn test_event_wire_format() {
        let user_id = Uuid::new_v4();
        let event = RealtimeEvent::Notification {
            notification: notification_for(user_id),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "notification");
        assert_eq!(json["notification"]["type"], "ORDER_PLACED");
        assert_eq!(json["notification"]["userId"], user_id.to_string());
    }

    #[test]
    fn test_control_messages() {
        let ping: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(ping, ClientMessage::Ping));

        let json = serde_json::to_value(ServerMessage::Connected {
            user_id: Uuid::nil(),
        })
        .unwrap();
        assert_eq!(json["type"], "connected");
        assert!(json.get("userId").is_some());
    }
}
