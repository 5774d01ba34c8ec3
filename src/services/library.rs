use crate::{
    error::{AppError, Result},
    models::{
        comment::Comment,
        notification::{Actor, EventAction},
        post::{ItemMetadata, MediaItem, Post},
        reaction::Reaction,
    },
    services::{
        directory::GroupDirectory, mentions::extract_mentions, posts::group_into_posts,
        storage::JsonStore,
    },
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Typed access to a group's per-item documents: metadata, comments,
/// reactions, unread lists, and the posts derived from them.
#[derive(Clone)]
pub struct MediaLibrary {
    store: Arc<JsonStore>,
    directory: GroupDirectory,
}

impl MediaLibrary {
    pub fn new(store: Arc<JsonStore>, directory: GroupDirectory) -> Self {
        Self { store, directory }
    }

    fn metadata_key(group_id: &str, item_id: &str) -> String {
        format!("{}/metadata/{}.json", group_id, item_id)
    }

    fn comments_key(group_id: &str, item_id: &str) -> String {
        format!("{}/comments/{}.json", group_id, item_id)
    }

    fn reactions_key(group_id: &str, item_id: &str) -> String {
        format!("{}/reactions/{}.json", group_id, item_id)
    }

    fn unread_key(group_id: &str, user_id: &str) -> String {
        format!("{}/users/unread/{}.json", group_id, user_id)
    }

    pub async fn metadata(&self, group_id: &str, item_id: &str) -> Result<Option<ItemMetadata>> {
        self.store.read(&Self::metadata_key(group_id, item_id)).await
    }

    pub async fn save_metadata(&self, group_id: &str, metadata: &ItemMetadata) -> Result<()> {
        if metadata.item_id.is_empty() {
            return Err(AppError::validation("Item metadata requires an itemId"));
        }
        self.store
            .write(&Self::metadata_key(group_id, &metadata.item_id), metadata)
            .await
    }

    pub async fn comments(&self, group_id: &str, item_id: &str) -> Result<Vec<Comment>> {
        self.store.read_list(&Self::comments_key(group_id, item_id)).await
    }

    /// Append a comment; returns its index and the member ids it mentions.
    pub async fn add_comment(
        &self,
        group_id: &str,
        item_id: &str,
        mut comment: Comment,
    ) -> Result<(usize, Vec<String>)> {
        if comment.comment.trim().is_empty() && comment.media.is_none() {
            return Err(AppError::validation("Comment must have text or media"));
        }
        comment.timestamp.get_or_insert_with(Utc::now);

        let key = Self::comments_key(group_id, item_id);
        let mut comments: Vec<Comment> = self.store.read_list(&key).await?;

        let members = self.directory.members(group_id).await?;
        let mentioned = extract_mentions(&comment.comment, &members);

        comments.push(comment);
        let index = comments.len() - 1;
        self.store.write(&key, &comments).await?;
        Ok((index, mentioned))
    }

    pub async fn reactions(&self, group_id: &str, item_id: &str) -> Result<Vec<Reaction>> {
        self.store.read_list(&Self::reactions_key(group_id, item_id)).await
    }

    /// Toggle a user's reaction on an item.
    ///
    /// Re-sending the same reaction removes it; a different reaction replaces
    /// the old one. Returns the resulting list plus whether the fan-out
    /// should add or retract the owner's notification.
    pub async fn toggle_reaction(
        &self,
        group_id: &str,
        item_id: &str,
        user_id: &str,
        reaction: &str,
    ) -> Result<(Vec<Reaction>, EventAction)> {
        if user_id.is_empty() || reaction.is_empty() {
            return Err(AppError::validation("userId and reaction are required"));
        }

        let key = Self::reactions_key(group_id, item_id);
        let mut reactions: Vec<Reaction> = self.store.read_list(&key).await?;

        let had_same = reactions
            .iter()
            .any(|r| r.user_id == user_id && r.reaction == reaction);
        reactions.retain(|r| r.user_id != user_id);

        let action = if had_same {
            EventAction::Remove
        } else {
            reactions.push(Reaction {
                user_id: user_id.to_string(),
                reaction: reaction.to_string(),
                timestamp: Utc::now(),
            });
            EventAction::Add
        };

        self.store.write(&key, &reactions).await?;
        Ok((reactions, action))
    }

    pub async fn unread_items(&self, group_id: &str, user_id: &str) -> Result<Vec<String>> {
        self.store.read_list(&Self::unread_key(group_id, user_id)).await
    }

    /// Delete an item and everything hanging off it: media file, thumbnail,
    /// metadata, comments, reactions, and unread-list entries.
    ///
    /// Only the uploader may delete. When the deleted item is the last member
    /// of an explicit post, the post-level comment and reaction documents go
    /// too. Cleanup is per-file tolerant; only a missing item or an owner
    /// mismatch fails the call.
    pub async fn delete_item(
        &self,
        group_id: &str,
        item_id: &str,
        requesting_user_id: &str,
    ) -> Result<()> {
        let Some(metadata) = self.metadata(group_id, item_id).await? else {
            return Err(AppError::not_found("Item"));
        };
        if metadata.uploader_id != requesting_user_id {
            return Err(AppError::validation(
                "Owner validation failed: only the uploader can delete an item",
            ));
        }

        let post_id = metadata.effective_post_id().to_string();

        self.delete_media_file(group_id, item_id).await;

        for key in [
            format!("{}/thumbnails/{}.jpg", group_id, item_id),
            Self::comments_key(group_id, item_id),
            Self::reactions_key(group_id, item_id),
        ] {
            if let Err(e) = self.store.delete(&key).await {
                warn!("Could not delete {}: {}", key, e);
            }
        }
        self.store.delete(&Self::metadata_key(group_id, item_id)).await?;

        // Post-level documents survive until the last member item is gone.
        let last_of_post = metadata.has_explicit_post_id()
            && !self.post_has_other_items(group_id, &post_id, item_id).await?;
        if last_of_post {
            for key in [
                Self::comments_key(group_id, &post_id),
                Self::reactions_key(group_id, &post_id),
            ] {
                if let Err(e) = self.store.delete(&key).await {
                    warn!("Could not delete {}: {}", key, e);
                }
            }
        }

        self.scrub_unread(group_id, item_id, &post_id, last_of_post).await;

        info!("Deleted item {} from {}", item_id, group_id);
        Ok(())
    }

    /// Remove the item's media file, whatever its extension.
    async fn delete_media_file(&self, group_id: &str, item_id: &str) {
        let media_dir = self.store.resolve(&format!("{}/media", group_id));
        let mut entries = match tokio::fs::read_dir(&media_dir).await {
            Ok(entries) => entries,
            Err(_) => return,
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let stem = path.file_stem().and_then(|s| s.to_str());
            if stem == Some(item_id) {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!("Could not delete media file {}: {}", path.display(), e);
                }
                return;
            }
        }
    }

    /// Whether any other item's metadata still claims this postId.
    async fn post_has_other_items(
        &self,
        group_id: &str,
        post_id: &str,
        deleted_item_id: &str,
    ) -> Result<bool> {
        let metadata_dir = self.store.resolve(&format!("{}/metadata", group_id));
        let mut entries = match tokio::fs::read_dir(&metadata_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(other_id) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            if other_id == deleted_item_id {
                continue;
            }
            if let Some(other) = self.metadata(group_id, other_id).await? {
                if other.post_id.as_deref() == Some(post_id) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Drop the deleted item (and its postId when the post is now empty) from
    /// every member's unread list. Per-list failures are logged and skipped.
    async fn scrub_unread(
        &self,
        group_id: &str,
        item_id: &str,
        post_id: &str,
        post_emptied: bool,
    ) {
        let unread_dir = self.store.resolve(&format!("{}/users/unread", group_id));
        let mut entries = match tokio::fs::read_dir(&unread_dir).await {
            Ok(entries) => entries,
            Err(_) => return,
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let Some(user_id) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };

            let key = Self::unread_key(group_id, user_id);
            let result: Result<()> = async {
                let unread: Vec<String> = self.store.read_list(&key).await?;
                let remaining: Vec<String> = unread
                    .iter()
                    .filter(|i| i.as_str() != item_id && !(post_emptied && i.as_str() == post_id))
                    .cloned()
                    .collect();
                if remaining.len() != unread.len() {
                    self.store.write(&key, &remaining).await?;
                }
                Ok(())
            }
            .await;

            if let Err(e) = result {
                warn!("Unread cleanup failed for {}: {}", user_id, e);
            }
        }
    }

    /// All items in the group as seen by one viewer, newest first.
    pub async fn items(&self, group_id: &str, viewer_id: &str) -> Result<Vec<MediaItem>> {
        let members = self.directory.members(group_id).await?;
        let unread: Vec<String> = self.unread_items(group_id, viewer_id).await?;

        let metadata_dir = self.store.resolve(&format!("{}/metadata", group_id));
        let mut entries = match tokio::fs::read_dir(&metadata_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut items = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(item_id) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            let Some(metadata) = self.metadata(group_id, item_id).await? else {
                debug!("Skipping unreadable metadata for item {}", item_id);
                continue;
            };

            let uploader = GroupDirectory::find(&members, &metadata.uploader_id)
                .map(|m| Actor {
                    id: m.id.clone(),
                    name: m.name.clone(),
                })
                .unwrap_or_else(|| Actor {
                    id: "unknown".to_string(),
                    name: "Unknown".to_string(),
                });

            items.push(MediaItem {
                is_unread: unread.contains(&metadata.item_id),
                metadata,
                uploader,
            });
        }

        items.sort_by_key(|i| std::cmp::Reverse(i.metadata.upload_date));
        Ok(items)
    }

    /// The viewer's feed: items reconstructed into posts.
    pub async fn posts(&self, group_id: &str, viewer_id: &str) -> Result<Vec<Post>> {
        let items = self.items(group_id, viewer_id).await?;
        Ok(group_into_posts(&items))
    }
}
