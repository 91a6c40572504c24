//! "Something changed" signals, scoped per game id.
//!
//! A notification carries no state. Receivers treat it as a hint to reload
//! the record from the store. Delivery is best-effort: a publish with no
//! subscribers is dropped, and a subscriber that falls behind gets one
//! coalesced notification instead of the ones it missed.

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::error::SyncError;

/// Default per-game channel capacity
pub const DEFAULT_CAPACITY: usize = 16;

/// Content-free change signal for one game
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub game_id: String,
}

/// Endless stream of notifications for one game
pub type NotificationStream = BoxStream<'static, Result<Notification, SyncError>>;

/// Publish/subscribe access to change signals.
#[async_trait]
pub trait ChangeNotifier: Send + Sync {
    /// Announce that `game_id` changed. Fire-and-forget.
    async fn publish(&self, game_id: &str) -> Result<(), SyncError>;

    /// Start receiving notifications for `game_id`.
    ///
    /// Only signals published after this returns are guaranteed to arrive.
    async fn subscribe(&self, game_id: &str) -> Result<NotificationStream, SyncError>;
}

#[async_trait]
impl<T: ChangeNotifier + ?Sized> ChangeNotifier for Arc<T> {
    async fn publish(&self, game_id: &str) -> Result<(), SyncError> {
        (**self).publish(game_id).await
    }

    async fn subscribe(&self, game_id: &str) -> Result<NotificationStream, SyncError> {
        (**self).subscribe(game_id).await
    }
}

/// Turn a broadcast receiver into a notification stream.
///
/// The stream yields a transport error once if the sending side goes away,
/// then ends.
pub(crate) fn receiver_stream(
    game_id: String,
    rx: broadcast::Receiver<Notification>,
) -> NotificationStream {
    stream::unfold(Some(rx), move |rx| {
        let game_id = game_id.clone();
        async move {
            let mut rx = rx?;
            match rx.recv().await {
                Ok(notification) => Some((Ok(notification), Some(rx))),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(%game_id, skipped, "Subscriber lagged, coalescing notifications");
                    Some((Ok(Notification { game_id }), Some(rx)))
                }
                Err(broadcast::error::RecvError::Closed) => Some((
                    Err(SyncError::Transport(format!(
                        "notification channel for {game_id} closed"
                    ))),
                    None,
                )),
            }
        }
    })
    .boxed()
}

/// In-process notifier backed by one broadcast channel per game.
#[derive(Debug)]
pub struct MemoryNotifier {
    channels: DashMap<String, broadcast::Sender<Notification>>,
    capacity: usize,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity,
        }
    }

    /// Send to current subscribers; returns how many received it.
    ///
    /// A channel whose last receiver has gone away is dropped here.
    pub fn notify(&self, game_id: &str) -> usize {
        let receivers = match self.channels.get(game_id) {
            Some(tx) => tx
                .send(Notification {
                    game_id: game_id.to_string(),
                })
                .unwrap_or(0),
            None => 0,
        };

        if receivers == 0 {
            trace!(%game_id, "No subscribers, dropping notification");
            self.channels
                .remove_if(game_id, |_, tx| tx.receiver_count() == 0);
        }
        receivers
    }

    /// Raw receiver for `game_id`, creating the channel on first use
    pub fn receiver(&self, game_id: &str) -> broadcast::Receiver<Notification> {
        self.channels
            .entry(game_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Number of live subscribers for `game_id`
    pub fn subscriber_count(&self, game_id: &str) -> usize {
        self.channels
            .get(game_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for MemoryNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChangeNotifier for MemoryNotifier {
    async fn publish(&self, game_id: &str) -> Result<(), SyncError> {
        self.notify(game_id);
        Ok(())
    }

    async fn subscribe(&self, game_id: &str) -> Result<NotificationStream, SyncError> {
        Ok(receiver_stream(game_id.to_string(), self.receiver(game_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_dropped() {
        let notifier = MemoryNotifier::new();
        assert_eq!(notifier.notify("g1"), 0);
        notifier.publish("g1").await.unwrap();

        // A late subscriber does not see earlier signals
        let mut updates = notifier.subscribe("g1").await.unwrap();
        assert!(timeout(Duration::from_millis(50), updates.next()).await.is_err());
    }

    #[tokio::test]
    async fn test_subscribers_receive_publish() {
        let notifier = MemoryNotifier::new();
        let mut a = notifier.subscribe("g1").await.unwrap();
        let mut b = notifier.subscribe("g1").await.unwrap();
        assert_eq!(notifier.subscriber_count("g1"), 2);

        notifier.publish("g1").await.unwrap();

        let expected = Notification {
            game_id: "g1".into(),
        };
        assert_eq!(a.next().await, Some(Ok(expected.clone())));
        assert_eq!(b.next().await, Some(Ok(expected)));
    }

    #[tokio::test]
    async fn test_notifications_are_scoped_by_game() {
        let notifier = MemoryNotifier::new();
        let mut g1 = notifier.subscribe("g1").await.unwrap();
        let _g2 = notifier.subscribe("g2").await.unwrap();

        assert_eq!(notifier.notify("g2"), 1);
        assert!(timeout(Duration::from_millis(50), g1.next()).await.is_err());
    }

    #[tokio::test]
    async fn test_lagging_subscriber_gets_coalesced_signal() {
        let notifier = MemoryNotifier::with_capacity(2);
        let mut updates = notifier.subscribe("g1").await.unwrap();

        for _ in 0..5 {
            notifier.notify("g1");
        }

        let first = updates.next().await;
        assert_eq!(
            first,
            Some(Ok(Notification {
                game_id: "g1".into()
            }))
        );
    }

    #[tokio::test]
    async fn test_dropped_subscription_frees_receiver() {
        let notifier = MemoryNotifier::new();
        let updates = notifier.subscribe("g1").await.unwrap();
        assert_eq!(notifier.subscriber_count("g1"), 1);
        drop(updates);
        assert_eq!(notifier.subscriber_count("g1"), 0);
    }

    #[tokio::test]
    async fn test_idle_channel_is_pruned_on_publish() {
        let notifier = MemoryNotifier::new();
        let kept = notifier.subscribe("g1").await.unwrap();
        let dropped = notifier.subscribe("g2").await.unwrap();
        assert_eq!(notifier.channels.len(), 2);

        drop(dropped);
        assert_eq!(notifier.notify("g2"), 0);
        assert_eq!(notifier.notify("g1"), 1);
        assert_eq!(notifier.channels.len(), 1);
        assert!(notifier.channels.contains_key("g1"));

        // Subscribing again recreates the channel
        let mut again = notifier.subscribe("g2").await.unwrap();
        assert_eq!(notifier.notify("g2"), 1);
        assert!(again.next().await.unwrap().is_ok());
        drop(kept);
    }
}
