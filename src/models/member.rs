use serde::{Deserialize, Serialize};

/// A group member as stored in `users/identities.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub name: String,
    #[serde(
        rename = "notificationPreference",
        skip_serializing_if = "Option::is_none"
    )]
    pub notification_preference: Option<NotificationPreference>,
    #[serde(rename = "phoneNumber", skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<PhoneNumber>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationPreference {
    #[serde(rename = "SMS")]
    Sms,
    #[serde(rename = "PUSH")]
    Push,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoneNumber {
    pub number: String,
    pub verified: bool,
}

impl Member {
    /// Whether the member should receive SMS digests.
    pub fn wants_sms(&self) -> bool {
        self.notification_preference == Some(NotificationPreference::Sms)
            && self.phone_number.as_ref().is_some_and(|p| p.verified)
    }

    pub fn wants_push(&self) -> bool {
        self.notification_preference == Some(NotificationPreference::Push)
    }
}
