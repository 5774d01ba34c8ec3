use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Keys negotiated by the browser's push service for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// One registered device endpoint for web push delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSubscription {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub renewal_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_renewal: Option<DateTime<Utc>>,
}

/// The per-group subscription document: userId -> registered devices.
pub type SubscriptionMap = HashMap<String, Vec<DeviceSubscription>>;
