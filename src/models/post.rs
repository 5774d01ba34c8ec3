use super::notification::Actor;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Per-item metadata, written once at upload time.
///
/// `post_id` defaults to the item's own id for singleton uploads; legacy
/// items predating multi-photo posts have no `post_id` at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemMetadata {
    pub item_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    pub uploader_id: String,
    /// Epoch milliseconds.
    pub upload_date: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl ItemMetadata {
    /// The post this item belongs to; its own id when uploaded standalone.
    pub fn effective_post_id(&self) -> &str {
        self.post_id.as_deref().unwrap_or(&self.item_id)
    }

    /// True when the item was uploaded as part of an explicit multi-item post.
    pub fn has_explicit_post_id(&self) -> bool {
        self.post_id
            .as_deref()
            .is_some_and(|p| p != self.item_id)
    }
}

/// One media item as fed into post grouping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub metadata: ItemMetadata,
    pub uploader: Actor,
    #[serde(default)]
    pub is_unread: bool,
}

/// A user-facing post, derived from item metadata on every read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub post_id: String,
    pub items: Vec<MediaItem>,
    pub uploader: Actor,
    /// Earliest member item's upload date, epoch milliseconds.
    pub upload_date: i64,
    pub is_unread: bool,
}
