use serde::{Deserialize, Serialize};

/// The member who triggered a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub name: String,
}

/// One queued or dispatched notification.
///
/// Persisted as `{"itemId", "type", "content", "user"}` in the per-user
/// queue files; `kind` flattens into the `type`/`content` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "itemId")]
    pub item_id: String,
    #[serde(flatten)]
    pub kind: NotificationKind,
    #[serde(rename = "user")]
    pub actor: Actor,
}

/// Notification payload, tagged by the user-facing notification type.
///
/// Each variant carries only the fields its rendering needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "kebab-case")]
pub enum NotificationKind {
    Upload,
    Reaction {
        reaction: String,
    },
    #[serde(rename_all = "camelCase")]
    CommentOnYourPost {
        comment: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment_index: Option<usize>,
    },
    #[serde(rename_all = "camelCase")]
    CommentOnPostYouCommentedOn {
        comment: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment_index: Option<usize>,
    },
    #[serde(rename_all = "camelCase")]
    ReactionOnYourComment {
        reaction: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment_index: Option<usize>,
    },
    #[serde(rename_all = "camelCase")]
    Mention {
        comment: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment_index: Option<usize>,
    },
}

impl NotificationKind {
    /// Stable wire label, also used as the digest grouping key.
    pub fn label(&self) -> &'static str {
        match self {
            NotificationKind::Upload => "upload",
            NotificationKind::Reaction { .. } => "reaction",
            NotificationKind::CommentOnYourPost { .. } => "comment-on-your-post",
            NotificationKind::CommentOnPostYouCommentedOn { .. } => {
                "comment-on-post-you-commented-on"
            }
            NotificationKind::ReactionOnYourComment { .. } => "reaction-on-your-comment",
            NotificationKind::Mention { .. } => "mention",
        }
    }

    pub fn comment_index(&self) -> Option<usize> {
        match self {
            NotificationKind::CommentOnYourPost { comment_index, .. }
            | NotificationKind::CommentOnPostYouCommentedOn { comment_index, .. }
            | NotificationKind::ReactionOnYourComment { comment_index, .. }
            | NotificationKind::Mention { comment_index, .. } => *comment_index,
            _ => None,
        }
    }
}

/// Identity triple used for dedup and reaction retraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationKey {
    pub item_id: String,
    pub kind: &'static str,
    pub actor_id: String,
}

impl Notification {
    pub fn key(&self) -> NotificationKey {
        NotificationKey {
            item_id: self.item_id.clone(),
            kind: self.kind.label(),
            actor_id: self.actor.id.clone(),
        }
    }

    pub fn matches(&self, key: &NotificationKey) -> bool {
        self.item_id == key.item_id
            && self.kind.label() == key.kind
            && self.actor.id == key.actor_id
    }
}

/// Whether an event adds a notification or retracts a previously queued one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAction {
    Add,
    Remove,
}

/// The raw activity the fan-out engine turns into per-recipient notifications.
#[derive(Debug, Clone)]
pub enum EventKind {
    Upload,
    Comment {
        comment: String,
        comment_index: Option<usize>,
    },
    Reaction {
        reaction: String,
    },
    CommentReaction {
        reaction: String,
        comment_index: Option<usize>,
    },
}

/// An upload/comment/reaction event entering the notification engine.
///
/// `owner_id` is the post owner, or the comment author for
/// [`EventKind::CommentReaction`].
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    pub action: EventAction,
    pub group_id: String,
    pub item_id: String,
    pub owner_id: String,
    pub actor_id: String,
    pub kind: EventKind,
}
