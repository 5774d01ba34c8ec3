use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One reaction in an item's `reactions/<itemId>.json` list.
///
/// A user holds at most one reaction per item; toggling the same reaction
/// removes it, a different reaction replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub user_id: String,
    pub reaction: String,
    pub timestamp: DateTime<Utc>,
}
