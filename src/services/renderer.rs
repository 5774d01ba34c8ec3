use crate::models::notification::{Notification, NotificationKind};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Hard SMS segment boundary; digests longer than this are split.
pub const SMS_SEGMENT_LIMIT: usize = 160;

/// Mention markup as stored in comments: `@[Name](userId)`.
static MENTION_MARKUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@\[([^\]]+)\]\([^)]+\)").expect("mention markup regex"));

/// Reduce `@[Name](userId)` markup to plain `@Name` for display.
pub fn strip_mention_markup(text: &str) -> String {
    MENTION_MARKUP.replace_all(text, "@$1").into_owned()
}

/// Render a single notification into its push/preview text.
pub fn notification_text(notification: &Notification) -> String {
    let actor = &notification.actor.name;
    match &notification.kind {
        NotificationKind::Upload => format!("{} uploaded a new post.", actor),
        NotificationKind::Reaction { reaction } => {
            format!("{} reacted {} to your post.", actor, reaction)
        }
        NotificationKind::CommentOnYourPost { comment, .. } => format!(
            "{} commented on your post: \"{}\"",
            actor,
            strip_mention_markup(comment)
        ),
        NotificationKind::CommentOnPostYouCommentedOn { comment, .. } => format!(
            "{} also commented on a post you commented on: \"{}\"",
            actor,
            strip_mention_markup(comment)
        ),
        NotificationKind::ReactionOnYourComment { reaction, .. } => {
            format!("{} reacted {} to your comment.", actor, reaction)
        }
        NotificationKind::Mention { comment, .. } => format!(
            "{} mentioned you in a comment: \"{}\"",
            actor,
            strip_mention_markup(comment)
        ),
    }
}

/// Render a batch of queued notifications into SMS digest messages.
///
/// Notifications are grouped by type; each group becomes one clause naming
/// the distinct actors and how many posts were affected. When the combined
/// message fits in one SMS segment a single string is returned; otherwise
/// one message per clause, with the `(WAVE)<groupId>: ` header only on the
/// first and the deep link only on the last.
pub fn digest(
    group_id: &str,
    user_id: &str,
    notifications: &[Notification],
    client_url: &str,
) -> Vec<String> {
    if notifications.is_empty() {
        return Vec::new();
    }

    // Group by type, preserving first-seen order.
    let mut groups: Vec<(&'static str, Vec<&Notification>)> = Vec::new();
    for n in notifications {
        let label = n.kind.label();
        match groups.iter_mut().find(|(l, _)| *l == label) {
            Some((_, group)) => group.push(n),
            None => groups.push((label, vec![n])),
        }
    }

    let clauses: Vec<String> = groups
        .iter()
        .map(|(_, group)| summarize_group(group))
        .collect();

    let prefix = format!("(WAVE){}: ", group_id);
    let suffix = format!(". {}/{}/{}", client_url, group_id, user_id);
    let combined = format!("{}{}{}", prefix, clauses.join(". "), suffix);

    if combined.chars().count() <= SMS_SEGMENT_LIMIT {
        return vec![combined];
    }

    let last = clauses.len() - 1;
    clauses
        .iter()
        .enumerate()
        .map(|(i, clause)| {
            format!(
                "{}{}{}",
                if i == 0 { prefix.as_str() } else { "" },
                clause,
                if i == last { suffix.as_str() } else { "." }
            )
        })
        .collect()
}

fn summarize_group(group: &[&Notification]) -> String {
    let mut seen = HashSet::new();
    let actors: Vec<&str> = group
        .iter()
        .map(|n| n.actor.name.as_str())
        .filter(|name| seen.insert(*name))
        .collect();

    let item_count = group
        .iter()
        .map(|n| n.item_id.as_str())
        .collect::<HashSet<_>>()
        .len();

    let item_text = if item_count > 1 { "posts" } else { "a post" };
    let your_item_text = if item_count > 1 {
        "your posts"
    } else {
        "your post"
    };
    let names = format_name_list(&actors);

    match group[0].kind.label() {
        "reaction" => format!("{} reacted to {}", names, your_item_text),
        "comment-on-your-post" => format!("{} commented on {}", names, your_item_text),
        "comment-on-post-you-commented-on" => format!(
            "{} also commented on {} that you commented on",
            names, item_text
        ),
        "reaction-on-your-comment" => format!(
            "{} reacted to your {}",
            names,
            if item_count > 1 { "comments" } else { "comment" }
        ),
        "upload" => format!(
            "{} added {}",
            names,
            if group.len() > 1 { "posts" } else { "a post" }
        ),
        "mention" => format!("{} mentioned you in a comment", names),
        other => format!("Unknown: {}", other),
    }
}

/// English list formatting: "A", "A and B", "A, B, and N other(s)".
fn format_name_list(names: &[&str]) -> String {
    match names {
        [only] => (*only).to_string(),
        [a, b] => format!("{} and {}", a, b),
        [a, b, rest @ ..] => format!(
            "{}, {}, and {} {}",
            a,
            b,
            rest.len(),
            if rest.len() > 1 { "others" } else { "other" }
        ),
        [] => String::new(),
    }
}
