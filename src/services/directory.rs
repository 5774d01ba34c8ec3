use crate::{error::Result, models::member::Member, services::storage::JsonStore};
use std::sync::Arc;

/// Group membership lookup over the `users/identities.json` document.
#[derive(Clone)]
pub struct GroupDirectory {
    store: Arc<JsonStore>,
}

impl GroupDirectory {
    pub fn new(store: Arc<JsonStore>) -> Self {
        Self { store }
    }

    pub async fn members(&self, group_id: &str) -> Result<Vec<Member>> {
        self.store
            .read_list(&format!("{}/users/identities.json", group_id))
            .await
    }

    pub fn find<'a>(members: &'a [Member], user_id: &str) -> Option<&'a Member> {
        members.iter().find(|m| m.id == user_id)
    }

    pub async fn username(&self, group_id: &str, user_id: &str) -> Result<Option<String>> {
        let members = self.members(group_id).await?;
        Ok(Self::find(&members, user_id).map(|m| m.name.clone()))
    }
}
