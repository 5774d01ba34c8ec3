use crate::{
    error::Result,
    models::{
        comment::Comment,
        member::Member,
        notification::{
            Actor, EventAction, EventKind, Notification, NotificationEvent, NotificationKind,
        },
    },
    services::{
        directory::GroupDirectory,
        mentions::extract_mentions,
        push::{PushPayload, PushService},
        queue::{Channel, NotificationQueues},
        renderer::notification_text,
        storage::JsonStore,
    },
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Turns one upload/comment/reaction event into per-recipient notifications.
///
/// SMS-preference recipients get an entry appended to their pending queue for
/// later digest delivery; push-preference recipients get an immediate
/// fire-and-forget dispatch. A recipient that cannot be resolved is logged
/// and skipped so the rest of the fan-out still happens.
#[derive(Clone)]
pub struct FanoutEngine {
    directory: GroupDirectory,
    queues: NotificationQueues,
    push: PushService,
    store: Arc<JsonStore>,
    client_url: String,
}

impl FanoutEngine {
    pub fn new(
        directory: GroupDirectory,
        queues: NotificationQueues,
        push: PushService,
        store: Arc<JsonStore>,
        client_url: String,
    ) -> Self {
        Self {
            directory,
            queues,
            push,
            store,
            client_url,
        }
    }

    pub async fn process(&self, event: &NotificationEvent) -> Result<()> {
        let members = self.directory.members(&event.group_id).await?;

        match &event.kind {
            EventKind::Upload => {
                // Everyone but the uploader hears about a new post.
                for member in &members {
                    if member.id != event.owner_id {
                        self.deliver(
                            &members,
                            event,
                            &member.id,
                            NotificationKind::Upload,
                            EventAction::Add,
                        )
                        .await?;
                    }
                }
            }

            EventKind::Comment {
                comment,
                comment_index,
            } => {
                self.fan_out_comment(&members, event, comment, *comment_index)
                    .await?;
            }

            EventKind::Reaction { reaction } => {
                if event.actor_id != event.owner_id {
                    self.deliver(
                        &members,
                        event,
                        &event.owner_id,
                        NotificationKind::Reaction {
                            reaction: reaction.clone(),
                        },
                        event.action,
                    )
                    .await?;
                }
            }

            EventKind::CommentReaction {
                reaction,
                comment_index,
            } => {
                // owner_id is the comment author here.
                if event.actor_id != event.owner_id {
                    self.deliver(
                        &members,
                        event,
                        &event.owner_id,
                        NotificationKind::ReactionOnYourComment {
                            reaction: reaction.clone(),
                            comment_index: *comment_index,
                        },
                        EventAction::Add,
                    )
                    .await?;
                }
            }
        }

        Ok(())
    }

    async fn fan_out_comment(
        &self,
        members: &[Member],
        event: &NotificationEvent,
        comment: &str,
        comment_index: Option<usize>,
    ) -> Result<()> {
        // The post owner, unless they commented on their own post.
        if event.actor_id != event.owner_id {
            self.deliver(
                members,
                event,
                &event.owner_id,
                NotificationKind::CommentOnYourPost {
                    comment: comment.to_string(),
                    comment_index,
                },
                EventAction::Add,
            )
            .await?;
        }

        // Every distinct prior commenter on this item, minus owner and actor.
        let comments: Vec<Comment> = self
            .store
            .read_list(&format!(
                "{}/comments/{}.json",
                event.group_id, event.item_id
            ))
            .await?;

        let mut prior_commenters: Vec<String> = Vec::new();
        for c in &comments {
            if c.user_id != event.owner_id
                && c.user_id != event.actor_id
                && !prior_commenters.contains(&c.user_id)
            {
                prior_commenters.push(c.user_id.clone());
            }
        }

        for commenter_id in &prior_commenters {
            self.deliver(
                members,
                event,
                commenter_id,
                NotificationKind::CommentOnPostYouCommentedOn {
                    comment: comment.to_string(),
                    comment_index,
                },
                EventAction::Add,
            )
            .await?;
        }

        // Mentioned members not already covered above; the notified set grows
        // as mentions are processed so nobody is double-notified.
        let mut already_notified: HashSet<String> =
            prior_commenters.iter().cloned().collect();
        already_notified.insert(event.owner_id.clone());
        already_notified.insert(event.actor_id.clone());

        for mentioned_id in extract_mentions(comment, members) {
            if already_notified.insert(mentioned_id.clone()) {
                self.deliver(
                    members,
                    event,
                    &mentioned_id,
                    NotificationKind::Mention {
                        comment: comment.to_string(),
                        comment_index,
                    },
                    EventAction::Add,
                )
                .await?;
            }
        }

        Ok(())
    }

    /// Route one notification to one recipient according to their preference.
    async fn deliver(
        &self,
        members: &[Member],
        event: &NotificationEvent,
        recipient_id: &str,
        kind: NotificationKind,
        action: EventAction,
    ) -> Result<()> {
        let Some(recipient) = GroupDirectory::find(members, recipient_id) else {
            warn!(
                "User {} not found in group {}; skipping notification",
                recipient_id, event.group_id
            );
            return Ok(());
        };

        let actor_name = GroupDirectory::find(members, &event.actor_id)
            .map(|m| m.name.clone())
            .unwrap_or_else(|| "Unknown".to_string());

        let notification = Notification {
            item_id: event.item_id.clone(),
            kind,
            actor: Actor {
                id: event.actor_id.clone(),
                name: actor_name,
            },
        };

        if action == EventAction::Remove {
            return self
                .queues
                .remove(
                    &event.group_id,
                    recipient_id,
                    Channel::SmsPending,
                    &notification.key(),
                )
                .await;
        }

        if recipient.wants_sms() {
            self.queues
                .enqueue(
                    &event.group_id,
                    recipient_id,
                    Channel::SmsPending,
                    notification,
                )
                .await?;
        } else if recipient.wants_push() {
            self.dispatch_push(&event.group_id, recipient_id, &notification);
        } else {
            debug!(
                "User {} has no notification preference; skipping",
                recipient_id
            );
        }

        Ok(())
    }

    /// Fire-and-forget push dispatch: a delivery failure is logged, never
    /// propagated to the event that triggered it.
    fn dispatch_push(&self, group_id: &str, recipient_id: &str, notification: &Notification) {
        let payload = PushPayload {
            title: "New activity in WAVE!".to_string(),
            body: notification_text(notification),
            url: Some(format!(
                "{}/{}/{}#{}",
                self.client_url, group_id, recipient_id, notification.item_id
            )),
            data: Some(serde_json::json!({
                "itemId": notification.item_id,
                "commentIndex": notification.kind.comment_index(),
            })),
        };

        let push = self.push.clone();
        let group_id = group_id.to_string();
        let recipient_id = recipient_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = push.send(&group_id, &recipient_id, &payload).await {
                error!("Push notification to {} failed: {}", recipient_id, e);
            }
        });
    }
}
