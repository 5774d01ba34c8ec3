use crate::models::post::{MediaItem, Post};
use std::collections::HashSet;

/// Items uploaded by the same person within this window form one legacy post.
pub const POST_GROUPING_WINDOW_MS: i64 = 120_000;

/// Reconstruct posts from flat per-item metadata.
///
/// Single greedy pass in input order: an item with an explicit postId pulls
/// in every unassigned item sharing it; otherwise the legacy heuristic pulls
/// in unassigned items from the same uploader within two minutes (skipping
/// items that belong to some other explicit post). Group members sort by
/// orderIndex when every member has one, else by upload date. Output posts
/// appear in the order their seed items were first encountered.
pub fn group_into_posts(items: &[MediaItem]) -> Vec<Post> {
    let mut posts = Vec::new();
    let mut assigned: HashSet<String> = HashSet::new();

    for seed in items {
        if assigned.contains(&seed.metadata.item_id) {
            continue;
        }

        let post_id = seed.metadata.effective_post_id().to_string();

        let mut group: Vec<MediaItem> = if seed.metadata.has_explicit_post_id() {
            items
                .iter()
                .filter(|i| {
                    !assigned.contains(&i.metadata.item_id)
                        && i.metadata.effective_post_id() == post_id
                })
                .cloned()
                .collect()
        } else {
            items
                .iter()
                .filter(|i| {
                    !assigned.contains(&i.metadata.item_id)
                        && !i.metadata.has_explicit_post_id()
                        && i.metadata.uploader_id == seed.metadata.uploader_id
                        && (i.metadata.upload_date - seed.metadata.upload_date).abs()
                            <= POST_GROUPING_WINDOW_MS
                })
                .cloned()
                .collect()
        };

        if group.iter().all(|i| i.metadata.order_index.is_some()) {
            group.sort_by_key(|i| i.metadata.order_index);
        } else {
            group.sort_by_key(|i| i.metadata.upload_date);
        }

        for item in &group {
            assigned.insert(item.metadata.item_id.clone());
        }

        // The post's date and uploader come from the chronologically earliest
        // member, which need not be first when ordering by orderIndex. The
        // filter always matches the seed itself, so the group is non-empty.
        let Some(earliest) = group.iter().min_by_key(|i| i.metadata.upload_date) else {
            continue;
        };
        let uploader = earliest.uploader.clone();
        let upload_date = earliest.metadata.upload_date;

        posts.push(Post {
            post_id,
            uploader,
            upload_date,
            is_unread: group.iter().any(|i| i.is_unread),
            items: group,
        });
    }

    posts
}
