use crate::{
    error::{AppError, Result},
    models::subscription::{DeviceSubscription, SubscriptionMap},
    services::storage::JsonStore,
};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use web_push::{
    ContentEncoding, IsahcWebPushClient, SubscriptionInfo, VapidSignatureBuilder, WebPushClient,
    WebPushError, WebPushMessageBuilder,
};

/// Message handed to the push transport after rendering.
#[derive(Debug, Clone, Serialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Error)]
pub enum PushSendError {
    /// Provider reported the subscription as gone/expired (HTTP 410-class).
    #[error("subscription expired or unsubscribed")]
    Gone,
    #[error("push transport error: {0}")]
    Transport(String),
}

/// Provider boundary: deliver one payload to one device.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn send(
        &self,
        subscription: &DeviceSubscription,
        payload: &str,
    ) -> std::result::Result<(), PushSendError>;
}

/// Web Push over VAPID, the production transport.
pub struct WebPushTransport {
    client: IsahcWebPushClient,
    private_key: String,
    subject: String,
}

impl WebPushTransport {
    pub fn new(private_key: &str, subject: &str) -> Result<Self> {
        let client = IsahcWebPushClient::new()
            .map_err(|e| AppError::PushDelivery(format!("Failed to build push client: {}", e)))?;
        Ok(Self {
            client,
            private_key: private_key.to_string(),
            subject: subject.to_string(),
        })
    }
}

#[async_trait]
impl PushTransport for WebPushTransport {
    async fn send(
        &self,
        subscription: &DeviceSubscription,
        payload: &str,
    ) -> std::result::Result<(), PushSendError> {
        let info = SubscriptionInfo::new(
            subscription.endpoint.clone(),
            subscription.keys.p256dh.clone(),
            subscription.keys.auth.clone(),
        );

        let mut signature = VapidSignatureBuilder::from_base64(
            &self.private_key,
            web_push::URL_SAFE_NO_PAD,
            &info,
        )
        .map_err(|e| PushSendError::Transport(format!("Invalid VAPID key: {}", e)))?;
        signature.add_claim("sub", self.subject.as_str());
        let signature = signature
            .build()
            .map_err(|e| PushSendError::Transport(format!("VAPID signing failed: {}", e)))?;

        let mut builder = WebPushMessageBuilder::new(&info);
        builder.set_payload(ContentEncoding::Aes128Gcm, payload.as_bytes());
        builder.set_vapid_signature(signature);
        let message = builder
            .build()
            .map_err(|e| PushSendError::Transport(e.to_string()))?;

        match self.client.send(message).await {
            Ok(()) => Ok(()),
            Err(WebPushError::EndpointNotFound) | Err(WebPushError::EndpointNotValid) => {
                Err(PushSendError::Gone)
            }
            Err(e) => Err(PushSendError::Transport(e.to_string())),
        }
    }
}

/// Result of a multi-device send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// The user has no registered devices; non-fatal.
    NoSubscription,
    Sent {
        delivered: usize,
        expired: usize,
    },
}

/// Push delivery with subscription lifecycle.
///
/// Owns the per-group subscription document exclusively: expired device
/// records are pruned on the spot so subsequent sends never retry them.
#[derive(Clone)]
pub struct PushService {
    store: Arc<JsonStore>,
    transport: Arc<dyn PushTransport>,
}

impl PushService {
    pub fn new(store: Arc<JsonStore>, transport: Arc<dyn PushTransport>) -> Self {
        Self { store, transport }
    }

    fn subscriptions_key(group_id: &str) -> String {
        format!("{}/notifications/subscriptions/web-push.json", group_id)
    }

    /// Register a device for a user, replacing any prior record for the same
    /// endpoint.
    pub async fn subscribe(
        &self,
        group_id: &str,
        user_id: &str,
        device: DeviceSubscription,
    ) -> Result<()> {
        let key = Self::subscriptions_key(group_id);
        let mut map: SubscriptionMap = self.store.read(&key).await?.unwrap_or_default();

        let devices = map.entry(user_id.to_string()).or_default();
        if let Some(existing) = devices.iter_mut().find(|d| d.endpoint == device.endpoint) {
            existing.keys = device.keys;
            existing.renewal_count += 1;
            existing.last_renewal = Some(Utc::now());
        } else {
            devices.push(device);
        }

        self.store.write(&key, &map).await?;
        info!("Registered push subscription for {} in {}", user_id, group_id);
        Ok(())
    }

    /// Drop one device registration by endpoint.
    pub async fn unsubscribe(&self, group_id: &str, user_id: &str, endpoint: &str) -> Result<()> {
        let key = Self::subscriptions_key(group_id);
        let mut map: SubscriptionMap = self.store.read(&key).await?.unwrap_or_default();

        if let Some(devices) = map.get_mut(user_id) {
            devices.retain(|d| d.endpoint != endpoint);
            if devices.is_empty() {
                map.remove(user_id);
            }
            self.store.write(&key, &map).await?;
        }
        Ok(())
    }

    /// Send a payload to every device the user has registered.
    ///
    /// Gone/expired devices are pruned before returning. A transport failure
    /// on every device surfaces as an error; callers in the fan-out path
    /// treat delivery as best-effort and log it.
    pub async fn send(
        &self,
        group_id: &str,
        user_id: &str,
        payload: &PushPayload,
    ) -> Result<PushOutcome> {
        let key = Self::subscriptions_key(group_id);
        let mut map: SubscriptionMap = self.store.read(&key).await?.unwrap_or_default();

        let Some(devices) = map.get(user_id).filter(|d| !d.is_empty()).cloned() else {
            debug!("No push subscription for {} in {}", user_id, group_id);
            return Ok(PushOutcome::NoSubscription);
        };

        let body = serde_json::to_string(&serde_json::json!({
            "title": payload.title,
            "body": payload.body,
            "url": payload.url,
            "data": payload.data,
            "timestamp": Utc::now().timestamp_millis(),
        }))?;

        let mut delivered = 0;
        let mut gone_endpoints: Vec<String> = Vec::new();
        let mut errors: Vec<String> = Vec::new();

        for device in &devices {
            match self.transport.send(device, &body).await {
                Ok(()) => delivered += 1,
                Err(PushSendError::Gone) => {
                    info!(
                        "Pruning expired push subscription for {} ({})",
                        user_id, device.endpoint
                    );
                    gone_endpoints.push(device.endpoint.clone());
                }
                Err(PushSendError::Transport(msg)) => {
                    warn!("Push delivery to {} failed: {}", device.endpoint, msg);
                    errors.push(msg);
                }
            }
        }

        let expired = gone_endpoints.len();
        if expired > 0 {
            if let Some(devices) = map.get_mut(user_id) {
                devices.retain(|d| !gone_endpoints.contains(&d.endpoint));
                if devices.is_empty() {
                    map.remove(user_id);
                }
            }
            self.store.write(&key, &map).await?;
        }

        if delivered == 0 && !errors.is_empty() {
            return Err(AppError::PushDelivery(errors.join("; ")));
        }

        Ok(PushOutcome::Sent { delivered, expired })
    }
}
