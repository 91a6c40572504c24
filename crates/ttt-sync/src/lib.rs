//! Synchronization layer for relayed tic-tac-toe.
//!
//! Participants never talk to each other directly. They share:
//! - a record store keyed by game id ([`store`]), written with an optimistic
//!   version check so concurrent moves cannot silently overwrite each other
//! - a change channel per game id ([`notifier`]) that only says "re-fetch"
//!
//! [`participant`] ties these together into the loop each player runs, and
//! [`remote`] provides both over a WebSocket connection to a hub.

pub mod error;
pub mod notifier;
pub mod participant;
pub mod protocol;
pub mod remote;
pub mod service;
pub mod store;

pub use error::SyncError;
pub use notifier::{ChangeNotifier, MemoryNotifier, Notification, NotificationStream};
pub use participant::{
    parse_move, watch, BotSource, LoopEvent, MoveSource, ParticipantLoop, Phase, Renderer, RoundEnd,
};
pub use protocol::{ClientMessage, ServerMessage};
pub use remote::HubClient;
pub use service::{GameService, MoveResult};
pub use store::{MemoryStore, Snapshot, StateStore};
