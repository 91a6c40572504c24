//! Client side of the hub protocol.
//!
//! One `HubClient` owns one WebSocket connection and implements both
//! `StateStore` and `ChangeNotifier` on top of it. A reader task routes
//! replies to the pending request and `Changed` messages to local
//! per-game broadcast channels.

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use ttt_core::GameState;

use crate::error::SyncError;
use crate::notifier::{receiver_stream, ChangeNotifier, Notification, NotificationStream, DEFAULT_CAPACITY};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::store::{Snapshot, StateStore};

type Subscriptions = Arc<DashMap<String, broadcast::Sender<Notification>>>;

/// Connection to a running hub.
pub struct HubClient {
    url: String,
    outgoing: mpsc::UnboundedSender<Message>,
    /// Held for the whole round trip, so only one request is in flight
    responses: Mutex<mpsc::UnboundedReceiver<ServerMessage>>,
    next_request_id: AtomicU64,
    subscriptions: Subscriptions,
    reader: JoinHandle<()>,
}

impl HubClient {
    /// Connect to a hub at `url` (e.g. `ws://127.0.0.1:8709`)
    pub async fn connect(url: &str) -> Result<Self, SyncError> {
        let (ws_stream, _) = connect_async(url).await?;
        info!("Connected to hub at {}", url);

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        // Forward outgoing messages from the channel to the socket
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
        tokio::spawn(async move {
            while let Some(msg) = outgoing_rx.recv().await {
                if ws_sender.send(msg).await.is_err() {
                    break;
                }
            }
        });

        let (response_tx, responses) = mpsc::unbounded_channel::<ServerMessage>();
        let subscriptions: Subscriptions = Arc::new(DashMap::new());

        let routes = Arc::clone(&subscriptions);
        let reader = tokio::spawn(async move {
            while let Some(msg) = ws_receiver.next().await {
                match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(ServerMessage::Changed { game_id }) => {
                            let delivered = match routes.get(&game_id) {
                                Some(tx) => tx.send(Notification { game_id: game_id.clone() }).is_ok(),
                                None => false,
                            };
                            // Every local subscriber for this game has gone away
                            if !delivered {
                                routes.remove_if(&game_id, |_, tx| tx.receiver_count() == 0);
                            }
                        }
                        Ok(ServerMessage::Pong) => {}
                        Ok(reply) => {
                            if response_tx.send(reply).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Invalid message from hub: {}", e),
                    },
                    Ok(Message::Close(_)) => {
                        info!("Hub closed the connection");
                        break;
                    }
                    Err(e) => {
                        warn!("Hub connection error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }

            // Dropping the senders ends every subscription stream with an error
            routes.clear();
        });

        Ok(Self {
            url: url.to_string(),
            outgoing,
            responses: Mutex::new(responses),
            next_request_id: AtomicU64::new(1),
            subscriptions,
            reader,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Games this client still routes `Changed` messages for
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Close the connection politely
    pub async fn close(&self) -> Result<(), SyncError> {
        self.outgoing
            .send(Message::Close(None))
            .map_err(|_| SyncError::Transport("hub connection already closed".into()))?;
        info!("Closing hub connection to {}", self.url);
        Ok(())
    }

    /// Send a request built from a fresh id and wait for its reply
    async fn request(&self, build: impl FnOnce(u64) -> ClientMessage) -> Result<ServerMessage, SyncError> {
        let mut responses = self.responses.lock().await;

        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let text = serde_json::to_string(&build(request_id))?;
        self.outgoing
            .send(Message::Text(text))
            .map_err(|_| SyncError::Transport("hub connection closed".into()))?;

        loop {
            let reply = responses
                .recv()
                .await
                .ok_or_else(|| SyncError::Transport("hub connection closed".into()))?;

            match reply {
                ServerMessage::Error {
                    request_id: Some(id),
                    error,
                } if id == request_id => return Err(error),
                reply if reply.request_id() == Some(request_id) => return Ok(reply),
                stale => debug!("Dropping stale reply {:?}", stale.request_id()),
            }
        }
    }

    async fn request_snapshot(&self, build: impl FnOnce(u64) -> ClientMessage) -> Result<Snapshot, SyncError> {
        match self.request(build).await? {
            ServerMessage::Snapshot { version, state, .. } => Ok(Snapshot { version, state }),
            other => Err(unexpected(other)),
        }
    }

    async fn request_ack(&self, build: impl FnOnce(u64) -> ClientMessage) -> Result<(), SyncError> {
        match self.request(build).await? {
            ServerMessage::Ack { .. } => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}

impl Drop for HubClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

fn unexpected(reply: ServerMessage) -> SyncError {
    SyncError::Transport(format!("unexpected reply from hub: {reply:?}"))
}

#[async_trait]
impl StateStore for HubClient {
    async fn load(&self, game_id: &str) -> Result<Snapshot, SyncError> {
        self.request_snapshot(|request_id| ClientMessage::Load {
            request_id,
            game_id: game_id.to_string(),
        })
        .await
    }

    async fn save(&self, state: &GameState, expected_version: u64) -> Result<u64, SyncError> {
        let reply = self
            .request(|request_id| ClientMessage::Save {
                request_id,
                state: state.clone(),
                expected_version,
            })
            .await?;
        match reply {
            ServerMessage::Saved { version, .. } => Ok(version),
            other => Err(unexpected(other)),
        }
    }

    async fn reset(&self, game_id: &str) -> Result<Snapshot, SyncError> {
        self.request_snapshot(|request_id| ClientMessage::Reset {
            request_id,
            game_id: game_id.to_string(),
        })
        .await
    }
}

#[async_trait]
impl ChangeNotifier for HubClient {
    async fn publish(&self, game_id: &str) -> Result<(), SyncError> {
        self.request_ack(|request_id| ClientMessage::Publish {
            request_id,
            game_id: game_id.to_string(),
        })
        .await
    }

    async fn subscribe(&self, game_id: &str) -> Result<NotificationStream, SyncError> {
        // Take the receiver first so a Changed racing the Ack is not lost
        let rx = self
            .subscriptions
            .entry(game_id.to_string())
            .or_insert_with(|| broadcast::channel(DEFAULT_CAPACITY).0)
            .subscribe();

        self.request_ack(|request_id| ClientMessage::Subscribe {
            request_id,
            game_id: game_id.to_string(),
        })
        .await?;

        Ok(receiver_stream(game_id.to_string(), rx))
    }
}
