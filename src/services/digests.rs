use crate::{
    error::Result,
    services::{
        directory::GroupDirectory,
        queue::{Channel, NotificationQueues},
        renderer::digest,
        sms::SmsQueue,
    },
};
use tracing::{debug, info};

/// Flushes SMS-pending notification queues into the rate-limited dispatch
/// queue as digests. Typically driven by a periodic scheduler in the
/// embedding process.
#[derive(Clone)]
pub struct DigestSender {
    directory: GroupDirectory,
    queues: NotificationQueues,
    sms: SmsQueue,
    client_url: String,
}

impl DigestSender {
    pub fn new(
        directory: GroupDirectory,
        queues: NotificationQueues,
        sms: SmsQueue,
        client_url: String,
    ) -> Self {
        Self {
            directory,
            queues,
            sms,
            client_url,
        }
    }

    /// Render and enqueue digests for every SMS-preference member with
    /// pending notifications, then clear their queues.
    pub async fn flush_group(&self, group_id: &str) -> Result<usize> {
        let members = self.directory.members(group_id).await?;
        let mut flushed = 0;

        for member in &members {
            if !member.wants_sms() {
                continue;
            }
            let Some(phone) = member.phone_number.as_ref() else {
                continue;
            };

            let pending = self
                .queues
                .pending(group_id, &member.id, Channel::SmsPending)
                .await?;
            if pending.is_empty() {
                debug!("No pending notifications for {}", member.id);
                continue;
            }

            let messages = digest(group_id, &member.id, &pending, &self.client_url);
            for message in &messages {
                self.sms.enqueue(&phone.number, message);
            }

            // Cleared only after every message is handed to the dispatcher;
            // the dispatcher owns retries from here.
            self.queues
                .clear(group_id, &member.id, Channel::SmsPending)
                .await?;

            info!(
                "Flushed {} notification(s) as {} SMS message(s) for {}",
                pending.len(),
                messages.len(),
                member.id
            );
            flushed += 1;
        }

        Ok(flushed)
    }
}
