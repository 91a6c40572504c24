//! WebSocket server and connection handling.

use crate::hub::SubscriberRegistry;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use ttt_sync::{ClientMessage, MemoryStore, ServerMessage, SyncError};
use uuid::Uuid;

/// Server state shared across all connections.
pub struct ServerState {
    /// All game records
    pub store: MemoryStore,
    /// Who listens to which game
    pub subscribers: SubscriberRegistry,
    /// Mapping from connection ID to its message sender
    pub connections: DashMap<Uuid, mpsc::UnboundedSender<ServerMessage>>,
}

impl ServerState {
    pub fn new() -> Self {
        Self {
            store: MemoryStore::new(),
            subscribers: SubscriberRegistry::new(),
            connections: DashMap::new(),
        }
    }

    /// Send a message to a specific connection.
    pub fn send_to_connection(&self, connection_id: Uuid, msg: ServerMessage) {
        if let Some(sender) = self.connections.get(&connection_id) {
            let _ = sender.send(msg);
        }
    }

    /// Tell every subscriber of a game that it changed. Returns how many were told.
    pub fn broadcast_change(&self, game_id: &str) -> usize {
        let subscribers = self.subscribers.subscribers(game_id);
        for connection_id in &subscribers {
            self.send_to_connection(
                *connection_id,
                ServerMessage::Changed {
                    game_id: game_id.to_string(),
                },
            );
        }
        subscribers.len()
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the WebSocket server.
pub async fn run_server(addr: SocketAddr, state: Arc<ServerState>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Hub listening on {}", listener.local_addr()?);
    serve(listener, state).await
}

/// Accept connections on an already bound listener.
pub async fn serve(listener: TcpListener, state: Arc<ServerState>) -> anyhow::Result<()> {
    while let Ok((stream, peer_addr)) = listener.accept().await {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer_addr, state).await {
                error!("Connection error from {}: {}", peer_addr, e);
            }
        });
    }

    Ok(())
}

/// Handle a single WebSocket connection.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<ServerState>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    info!("New WebSocket connection from {}", addr);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let connection_id = Uuid::new_v4();

    // Create channel for outgoing messages
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    state.connections.insert(connection_id, tx);

    // Spawn task to forward messages from channel to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(text) = serde_json::to_string(&msg) {
                if ws_sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        }
    });

    // Handle incoming messages
    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => handle_message(connection_id, client_msg, &state),
                Err(e) => {
                    warn!("Invalid message from {}: {}", connection_id, text);
                    state.send_to_connection(
                        connection_id,
                        ServerMessage::Error {
                            request_id: None,
                            error: SyncError::MalformedInput(e.to_string()),
                        },
                    );
                }
            },
            Ok(Message::Close(_)) => {
                info!("Client {} closing connection", connection_id);
                break;
            }
            Ok(Message::Ping(_)) => {
                state.send_to_connection(connection_id, ServerMessage::Pong);
            }
            Err(e) => {
                error!("WebSocket error from {}: {}", connection_id, e);
                break;
            }
            _ => {}
        }
    }

    // Clean up on disconnect
    let watched = state.subscribers.remove_connection(connection_id);
    state.connections.remove(&connection_id);
    send_task.abort();

    info!(
        "Connection closed for {} (was watching {} games, {} games still watched)",
        connection_id,
        watched,
        state.subscribers.game_count()
    );
    Ok(())
}

/// Reply to a request with either its success message or the error.
fn reply<T>(
    request_id: u64,
    result: Result<T, SyncError>,
    ok: impl FnOnce(T) -> ServerMessage,
) -> ServerMessage {
    match result {
        Ok(value) => ok(value),
        Err(error) => ServerMessage::Error {
            request_id: Some(request_id),
            error,
        },
    }
}

/// Handle a client message.
fn handle_message(connection_id: Uuid, msg: ClientMessage, state: &Arc<ServerState>) {
    let response = match msg {
        ClientMessage::Load {
            request_id,
            game_id,
        } => reply(request_id, state.store.load_record(&game_id), |s| {
            ServerMessage::Snapshot {
                request_id,
                version: s.version,
                state: s.state,
            }
        }),

        ClientMessage::Save {
            request_id,
            state: record,
            expected_version,
        } => {
            let result = state.store.save_record(&record, expected_version);
            match &result {
                Ok(version) => debug!(game_id = %record.game_id, version, "Record saved"),
                Err(e) => debug!(game_id = %record.game_id, "Save refused: {}", e),
            }
            reply(request_id, result, |version| ServerMessage::Saved {
                request_id,
                version,
            })
        }

        ClientMessage::Reset {
            request_id,
            game_id,
        } => {
            let result = state.store.reset_record(&game_id);
            if result.is_ok() {
                info!(%game_id, "Game reset");
            }
            reply(request_id, result, |s| ServerMessage::Snapshot {
                request_id,
                version: s.version,
                state: s.state,
            })
        }

        ClientMessage::Publish {
            request_id,
            game_id,
        } => {
            let told = state.broadcast_change(&game_id);
            debug!(%game_id, subscribers = told, "Change published");
            ServerMessage::Ack { request_id }
        }

        ClientMessage::Subscribe {
            request_id,
            game_id,
        } => {
            if state.subscribers.subscribe(connection_id, &game_id) {
                info!(%game_id, %connection_id, "Subscribed");
            }
            ServerMessage::Ack { request_id }
        }

        ClientMessage::Ping => ServerMessage::Pong,
    };

    state.send_to_connection(connection_id, response);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio_tungstenite::connect_async;
    use ttt_core::{BotDifficulty, GameState, Player};
    use ttt_sync::{
        BotSource, ChangeNotifier, GameService, HubClient, LoopEvent, MoveResult, ParticipantLoop, Renderer,
        StateStore,
    };

    struct Silent;

    impl Renderer for Silent {
        fn show(&mut self, _event: LoopEvent<'_>) {}
    }

    fn connect(state: &ServerState) -> (Uuid, mpsc::UnboundedReceiver<ServerMessage>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        state.connections.insert(id, tx);
        (id, rx)
    }

    #[test]
    fn test_load_missing_game() {
        let state = Arc::new(ServerState::new());
        let (conn, mut rx) = connect(&state);

        handle_message(
            conn,
            ClientMessage::Load {
                request_id: 1,
                game_id: "g1".into(),
            },
            &state,
        );

        assert_eq!(
            rx.try_recv().unwrap(),
            ServerMessage::Error {
                request_id: Some(1),
                error: SyncError::NotFound("g1".into()),
            }
        );
    }

    #[test]
    fn test_reset_then_save() {
        let state = Arc::new(ServerState::new());
        let (conn, mut rx) = connect(&state);

        handle_message(
            conn,
            ClientMessage::Reset {
                request_id: 1,
                game_id: "g1".into(),
            },
            &state,
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            ServerMessage::Snapshot {
                request_id: 1,
                version: 1,
                state: GameState::new("g1"),
            }
        );

        let (next, _) = GameState::new("g1").with_move(Player::X, 4).unwrap();
        handle_message(
            conn,
            ClientMessage::Save {
                request_id: 2,
                state: next.clone(),
                expected_version: 1,
            },
            &state,
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            ServerMessage::Saved {
                request_id: 2,
                version: 2
            }
        );

        // Stale version from a second writer
        let (other, _) = GameState::new("g1").with_move(Player::X, 0).unwrap();
        handle_message(
            conn,
            ClientMessage::Save {
                request_id: 3,
                state: other,
                expected_version: 1,
            },
            &state,
        );
        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerMessage::Error {
                request_id: Some(3),
                error: SyncError::Conflict { .. }
            }
        ));
        assert_eq!(state.store.load_record("g1").unwrap().state, next);
    }

    #[test]
    fn test_publish_reaches_only_subscribers() {
        let state = Arc::new(ServerState::new());
        let (watcher, mut watcher_rx) = connect(&state);
        let (other, mut other_rx) = connect(&state);
        let (publisher, mut publisher_rx) = connect(&state);

        handle_message(
            watcher,
            ClientMessage::Subscribe {
                request_id: 1,
                game_id: "g1".into(),
            },
            &state,
        );
        handle_message(
            other,
            ClientMessage::Subscribe {
                request_id: 1,
                game_id: "g2".into(),
            },
            &state,
        );
        assert_eq!(watcher_rx.try_recv().unwrap(), ServerMessage::Ack { request_id: 1 });
        assert_eq!(other_rx.try_recv().unwrap(), ServerMessage::Ack { request_id: 1 });

        handle_message(
            publisher,
            ClientMessage::Publish {
                request_id: 9,
                game_id: "g1".into(),
            },
            &state,
        );

        assert_eq!(publisher_rx.try_recv().unwrap(), ServerMessage::Ack { request_id: 9 });
        assert_eq!(
            watcher_rx.try_recv().unwrap(),
            ServerMessage::Changed {
                game_id: "g1".into()
            }
        );
        assert!(other_rx.try_recv().is_err());
    }

    #[test]
    fn test_ping() {
        let state = Arc::new(ServerState::new());
        let (conn, mut rx) = connect(&state);
        handle_message(conn, ClientMessage::Ping, &state);
        assert_eq!(rx.try_recv().unwrap(), ServerMessage::Pong);
    }

    async fn start_hub() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, Arc::new(ServerState::new())));
        format!("ws://{}", addr)
    }

    #[tokio::test]
    async fn test_clients_play_through_hub() {
        let url = start_hub().await;
        let x = Arc::new(HubClient::connect(&url).await.unwrap());
        let o = Arc::new(HubClient::connect(&url).await.unwrap());

        assert!(matches!(
            x.load("g1").await,
            Err(SyncError::NotFound(_))
        ));

        let mut o_updates = o.subscribe("g1").await.unwrap();
        let fresh = x.reset("g1").await.unwrap();
        assert_eq!(fresh.state, GameState::new("g1"));

        let x_service = GameService::new(Arc::clone(&x));
        let result = x_service.make_move("g1", Player::X, 4).await.unwrap();
        assert!(result.is_accepted());
        x.publish("g1").await.unwrap();

        let woken = tokio::time::timeout(Duration::from_secs(5), o_updates.next())
            .await
            .expect("o should be notified");
        assert!(matches!(woken, Some(Ok(_))));

        let o_service = GameService::new(Arc::clone(&o));
        let seen = o_service.get_state("g1").await.unwrap();
        assert_eq!(seen.cells[4], Some(Player::X));
        assert_eq!(seen.turn, Player::O);

        assert_eq!(
            o_service.make_move("g1", Player::O, 4).await.unwrap(),
            MoveResult::Rejected {
                reason: ttt_core::GameError::CellOccupied(4)
            }
        );

        // A stale save from x is refused by the hub
        let stale = x.save(&fresh.state.with_move(Player::X, 0).unwrap().0, fresh.version).await;
        assert!(matches!(stale, Err(SyncError::Conflict { .. })));

        x.close().await.unwrap();
        o.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_unparseable_frame_gets_error_without_request_id() {
        let url = start_hub().await;
        let (mut ws, _) = connect_async(url.as_str()).await.unwrap();

        // A save whose board has one cell instead of nine
        let bad = r#"{"type":"Save","payload":{"request_id":7,"state":{"game_id":"g1","state":"is_playing","player_turn":"x","positions":[""]},"expected_version":1}}"#;
        ws.send(Message::Text(bad.to_string())).await.unwrap();

        let reply = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("hub should answer")
            .expect("connection should stay open")
            .unwrap();
        let Message::Text(text) = reply else {
            panic!("expected a text frame, got {reply:?}");
        };
        match serde_json::from_str::<ServerMessage>(&text).unwrap() {
            ServerMessage::Error {
                request_id: None,
                error: SyncError::MalformedInput(detail),
            } => assert!(detail.contains("exactly 9 positions"), "{detail}"),
            other => panic!("expected a malformed input error, got {other:?}"),
        }

        // The connection is still served afterwards
        let ping = serde_json::to_string(&ClientMessage::Ping).unwrap();
        ws.send(Message::Text(ping)).await.unwrap();
        let reply = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("hub should answer")
            .expect("connection should stay open")
            .unwrap();
        assert_eq!(reply, Message::Text(serde_json::to_string(&ServerMessage::Pong).unwrap()));
    }

    #[tokio::test]
    async fn test_hub_shutdown_ends_participant_loop() {
        // The hub gets its own runtime so it can be torn down mid-game
        let hub_runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        hub_runtime.spawn(async move {
            let listener = TcpListener::from_std(listener).unwrap();
            serve(listener, Arc::new(ServerState::new())).await
        });

        let client = Arc::new(HubClient::connect(&url).await.unwrap());
        client.reset("g1").await.unwrap();

        // o has nothing to do before x moves, so it parks on its subscription
        let participant = ParticipantLoop::new(
            "g1",
            Player::O,
            Arc::clone(&client),
            Arc::clone(&client),
            BotSource::with_seed(Player::O, BotDifficulty::Random, 1),
            Silent,
        );
        let running = tokio::spawn(participant.run());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!running.is_finished());

        hub_runtime.shutdown_background();

        let result = tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .expect("loop should stop once the hub is gone")
            .unwrap();
        assert!(matches!(result, Err(SyncError::Transport(_))), "got {result:?}");
    }

    #[tokio::test]
    async fn test_client_forgets_dropped_subscription() {
        let url = start_hub().await;
        let watcher = HubClient::connect(&url).await.unwrap();
        let publisher = HubClient::connect(&url).await.unwrap();

        let updates = watcher.subscribe("g1").await.unwrap();
        assert_eq!(watcher.subscription_count(), 1);
        drop(updates);

        // The next Changed for g1 finds nobody listening locally
        publisher.publish("g1").await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while watcher.subscription_count() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("route should be dropped");
    }
}
