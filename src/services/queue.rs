use crate::{
    error::Result,
    models::notification::{Notification, NotificationKey},
    services::storage::JsonStore,
};
use std::sync::Arc;
use tracing::debug;

/// Delivery channel a notification is queued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    SmsPending,
    PushPending,
}

impl Channel {
    fn dir(&self) -> &'static str {
        match self {
            Channel::SmsPending => "sms-unsent",
            Channel::PushPending => "push-unsent",
        }
    }
}

/// Per-user, per-channel durable notification queues.
///
/// One JSON list per (group, user, channel). Reads tolerate missing or
/// corrupt backing files by returning an empty list. Writes are whole-file
/// read-modify-write with last-writer-wins semantics; two concurrent events
/// for the same recipient can lose one update. Accepted at group scale.
#[derive(Clone)]
pub struct NotificationQueues {
    store: Arc<JsonStore>,
}

impl NotificationQueues {
    pub fn new(store: Arc<JsonStore>) -> Self {
        Self { store }
    }

    fn key(group_id: &str, user_id: &str, channel: Channel) -> String {
        format!("{}/notifications/{}/{}.json", group_id, channel.dir(), user_id)
    }

    /// Append a notification to the user's queue.
    pub async fn enqueue(
        &self,
        group_id: &str,
        user_id: &str,
        channel: Channel,
        notification: Notification,
    ) -> Result<()> {
        let key = Self::key(group_id, user_id, channel);
        let mut queued: Vec<Notification> = self.store.read_list(&key).await?;
        queued.push(notification);
        self.store.write(&key, &queued).await?;
        debug!("Queued notification for {} on {:?}", user_id, channel);
        Ok(())
    }

    /// All queued notifications for the user, oldest first.
    pub async fn pending(
        &self,
        group_id: &str,
        user_id: &str,
        channel: Channel,
    ) -> Result<Vec<Notification>> {
        self.store
            .read_list(&Self::key(group_id, user_id, channel))
            .await
    }

    /// Remove every queued entry matching the identity triple
    /// (itemId, type, actorId). Used to retract a reaction that was toggled
    /// off before digest delivery.
    pub async fn remove(
        &self,
        group_id: &str,
        user_id: &str,
        channel: Channel,
        key: &NotificationKey,
    ) -> Result<()> {
        let store_key = Self::key(group_id, user_id, channel);
        let queued: Vec<Notification> = self.store.read_list(&store_key).await?;
        let remaining: Vec<Notification> =
            queued.into_iter().filter(|n| !n.matches(key)).collect();
        self.store.write(&store_key, &remaining).await
    }

    /// Empty the queue, e.g. after a successful SMS digest delivery.
    pub async fn clear(&self, group_id: &str, user_id: &str, channel: Channel) -> Result<()> {
        let key = Self::key(group_id, user_id, channel);
        self.store.write(&key, &Vec::<Notification>::new()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::notification::{Actor, NotificationKind};

    fn queues() -> (tempfile::TempDir, NotificationQueues) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonStore::new(dir.path()));
        (dir, NotificationQueues::new(store))
    }

    fn reaction(item: &str, actor: &str, emoji: &str) -> Notification {
        Notification {
            item_id: item.to_string(),
            kind: NotificationKind::Reaction {
                reaction: emoji.to_string(),
            },
            actor: Actor {
                id: actor.to_string(),
                name: actor.to_uppercase(),
            },
        }
    }

    #[tokio::test]
    async fn enqueue_preserves_insertion_order() {
        let (_dir, queues) = queues();
        queues
            .enqueue("g1", "u1", Channel::SmsPending, reaction("i1", "a", "❤️"))
            .await
            .unwrap();
        queues
            .enqueue("g1", "u1", Channel::SmsPending, reaction("i2", "b", "🔥"))
            .await
            .unwrap();

        let pending = queues.pending("g1", "u1", Channel::SmsPending).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].item_id, "i1");
        assert_eq!(pending[1].item_id, "i2");
    }

    #[tokio::test]
    async fn remove_deletes_only_matching_identity() {
        let (_dir, queues) = queues();
        let keep = reaction("i1", "a", "❤️");
        let retract = reaction("i2", "b", "🔥");
        queues
            .enqueue("g1", "u1", Channel::SmsPending, keep.clone())
            .await
            .unwrap();
        queues
            .enqueue("g1", "u1", Channel::SmsPending, retract.clone())
            .await
            .unwrap();

        queues
            .remove("g1", "u1", Channel::SmsPending, &retract.key())
            .await
            .unwrap();

        let pending = queues.pending("g1", "u1", Channel::SmsPending).await.unwrap();
        assert_eq!(pending, vec![keep]);
    }

    #[tokio::test]
    async fn clear_empties_the_queue() {
        let (_dir, queues) = queues();
        queues
            .enqueue("g1", "u1", Channel::SmsPending, reaction("i1", "a", "❤️"))
            .await
            .unwrap();
        queues.clear("g1", "u1", Channel::SmsPending).await.unwrap();
        assert!(queues
            .pending("g1", "u1", Channel::SmsPending)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn pending_on_missing_queue_is_empty() {
        let (_dir, queues) = queues();
        assert!(queues
            .pending("g1", "nobody", Channel::PushPending)
            .await
            .unwrap()
            .is_empty());
    }
}
