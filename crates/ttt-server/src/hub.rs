//! Subscriber bookkeeping for the hub.

use dashmap::DashMap;
use std::collections::HashSet;
use uuid::Uuid;

/// Which connections listen to which games.
#[derive(Default)]
pub struct SubscriberRegistry {
    by_game: DashMap<String, HashSet<Uuid>>,
    by_connection: DashMap<Uuid, HashSet<String>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `connection_id` for `game_id`. Returns false if it already was.
    pub fn subscribe(&self, connection_id: Uuid, game_id: &str) -> bool {
        let added = self
            .by_game
            .entry(game_id.to_string())
            .or_default()
            .insert(connection_id);
        self.by_connection
            .entry(connection_id)
            .or_default()
            .insert(game_id.to_string());
        added
    }

    /// Connections currently subscribed to `game_id`
    pub fn subscribers(&self, game_id: &str) -> Vec<Uuid> {
        self.by_game
            .get(game_id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Forget a connection everywhere. Returns how many games it was watching.
    pub fn remove_connection(&self, connection_id: Uuid) -> usize {
        let Some((_, games)) = self.by_connection.remove(&connection_id) else {
            return 0;
        };

        for game_id in &games {
            let now_empty = match self.by_game.get_mut(game_id) {
                Some(mut ids) => {
                    ids.remove(&connection_id);
                    ids.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.by_game.remove_if(game_id, |_, ids| ids.is_empty());
            }
        }

        games.len()
    }

    /// Number of games with at least one subscriber
    pub fn game_count(&self) -> usize {
        self.by_game.len()
    }
}
