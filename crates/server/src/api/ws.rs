//! WebSocket push of collection changes to the user they belong to.
//!
//! The upgrade is authenticated like any other protected request, with the
//! access token taken from the `Authorization` header or, for browsers that
//! cannot set headers on a socket, the `access_token` query parameter.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use cinematicdb_core::CollectionKind;

use super::error::ApiError;
use super::middleware::{authenticate, bearer_token};
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_LAG_EVENTS, WS_MESSAGES_SENT};
use crate::state::AppState;

/// WebSocket message sent to clients.
///
/// Every message belongs to one user and is only delivered to that user's
/// sockets. The owner is not part of the payload.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// An item was added to or removed from a collection.
    CollectionChanged {
        #[serde(skip)]
        user_id: String,
        collection: CollectionKind,
        media_id: u64,
        member: bool,
    },
    /// The user signed out; the socket is closed after this message.
    SignedOut {
        #[serde(skip)]
        user_id: String,
    },
}

impl WsMessage {
    fn label(&self) -> &'static str {
        match self {
            WsMessage::CollectionChanged { .. } => "collection_changed",
            WsMessage::SignedOut { .. } => "signed_out",
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            WsMessage::CollectionChanged { user_id, .. } | WsMessage::SignedOut { user_id } => {
                user_id
            }
        }
    }

    pub fn visible_to(&self, user_id: &str) -> bool {
        self.user_id() == user_id
    }
}

/// Broadcaster for WebSocket messages using tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct WsBroadcaster {
    sender: broadcast::Sender<WsMessage>,
}

impl WsBroadcaster {
    /// Create a new broadcaster with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Broadcast a message to all connected sockets; each socket keeps only
    /// its own user's messages.
    pub fn broadcast(&self, msg: WsMessage) {
        // No receivers just means no client is connected
        let _ = self.sender.send(msg);
    }

    /// Subscribe to receive messages.
    pub fn subscribe(&self) -> broadcast::Receiver<WsMessage> {
        self.sender.subscribe()
    }

    pub fn collection_changed(
        &self,
        user_id: &str,
        collection: CollectionKind,
        media_id: u64,
        member: bool,
    ) {
        self.broadcast(WsMessage::CollectionChanged {
            user_id: user_id.to_string(),
            collection,
            media_id,
            member,
        });
    }
}

impl Default for WsBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

#[derive(Debug, Deserialize)]
pub struct WsParams {
    #[serde(default)]
    pub access_token: Option<String>,
}

/// WebSocket upgrade handler. Unauthenticated upgrades get a 401.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let token = bearer_token(&headers).or(params.access_token.as_deref());
    let session = authenticate(&state, token).await?;
    let user_id = session.user.id;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user_id)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, user_id: String) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.ws_broadcaster().subscribe();

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();
    info!(%user_id, "WebSocket client connected");

    let owner = user_id.clone();
    let send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(msg) if !msg.visible_to(&owner) => {}
                Ok(msg) => {
                    WS_MESSAGES_SENT.with_label_values(&[msg.label()]).inc();
                    match serde_json::to_string(&msg) {
                        Ok(json) => {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                debug!("WebSocket send failed, client disconnected");
                                break;
                            }
                        }
                        Err(e) => {
                            error!("Failed to serialize WsMessage: {}", e);
                        }
                    }
                    if matches!(msg, WsMessage::SignedOut { .. }) {
                        debug!(user_id = %owner, "Closing socket after sign-out");
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("WebSocket client lagged, skipped {} messages", n);
                    WS_LAG_EVENTS.inc();
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Broadcast channel closed");
                    break;
                }
            }
        }
    });

    // Clients only listen; incoming frames are drained until close.
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Close(_)) => {
                debug!("WebSocket client requested close");
                break;
            }
            Ok(Message::Text(text)) => {
                debug!("Ignoring client text message: {}", text);
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
        }
    }

    send_task.abort();
    WS_CONNECTIONS_ACTIVE.dec();
    info!(%user_id, "WebSocket client disconnected");
}
