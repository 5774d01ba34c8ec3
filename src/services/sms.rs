use crate::{
    config::Config,
    error::{AppError, Result},
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Provider boundary: deliver one SMS. No delivery receipts.
#[async_trait]
pub trait SmsTransport: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> Result<()>;
}

/// Twilio Messages API transport.
pub struct TwilioTransport {
    http: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from: String,
}

impl TwilioTransport {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            account_sid: config.twilio_account_sid.clone(),
            auth_token: config.twilio_auth_token.clone(),
            from: config.twilio_phone_number.clone(),
        }
    }
}

#[async_trait]
impl SmsTransport for TwilioTransport {
    async fn send(&self, to: &str, body: &str) -> Result<()> {
        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        );
        let params = [("From", self.from.as_str()), ("To", to), ("Body", body)];

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalService(format!(
                "Twilio rejected message ({}): {}",
                status, detail
            )));
        }
        Ok(())
    }
}

/// Rate-limit and retry knobs for the dispatch loop.
#[derive(Debug, Clone)]
pub struct SmsLimits {
    /// Minimum spacing between consecutive sends.
    pub min_send_interval: Duration,
    /// Maximum sends inside any rolling 60-second window.
    pub per_minute_limit: usize,
    /// Fixed pause before re-checking budgets or retrying a failed send.
    pub retry_delay: Duration,
}

impl SmsLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_send_interval: Duration::from_millis(config.sms_min_send_interval_ms),
            per_minute_limit: config.sms_per_minute_limit,
            retry_delay: Duration::from_millis(config.sms_retry_delay_ms),
        }
    }
}

#[derive(Debug, Clone)]
struct SmsMessage {
    to: String,
    body: String,
}

/// Process-wide FIFO SMS queue with token-bucket pacing.
///
/// Entries are transient and in-memory; a crash loses whatever is pending.
/// A failed send re-enqueues the same entry at the tail and retries after a
/// fixed delay, forever — a permanently bad number keeps cycling but never
/// blocks other recipients' messages. Timing runs on tokio's clock, so tests
/// exercise the limiter under a paused runtime.
#[derive(Clone)]
pub struct SmsQueue {
    tx: mpsc::UnboundedSender<SmsMessage>,
}

impl SmsQueue {
    pub fn new(transport: Arc<dyn SmsTransport>, limits: SmsLimits) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(
            Drain {
                rx,
                transport,
                limits,
                backlog: VecDeque::new(),
                sent_window: VecDeque::new(),
                last_send: None,
            }
            .run(),
        );
        Self { tx }
    }

    /// Append a message; the drain loop picks it up in FIFO order.
    pub fn enqueue(&self, to: &str, body: &str) {
        let message = SmsMessage {
            to: to.to_string(),
            body: body.to_string(),
        };
        if self.tx.send(message).is_err() {
            warn!("SMS drain loop is gone; dropping message");
        }
    }
}

struct Drain {
    rx: mpsc::UnboundedReceiver<SmsMessage>,
    transport: Arc<dyn SmsTransport>,
    limits: SmsLimits,
    backlog: VecDeque<SmsMessage>,
    sent_window: VecDeque<Instant>,
    last_send: Option<Instant>,
}

impl Drain {
    async fn run(mut self) {
        loop {
            if self.backlog.is_empty() {
                match self.rx.recv().await {
                    Some(message) => self.backlog.push_back(message),
                    None => return,
                }
            }
            // Absorb anything else already waiting without blocking.
            while let Ok(message) = self.rx.try_recv() {
                self.backlog.push_back(message);
            }

            let now = Instant::now();
            while self
                .sent_window
                .front()
                .is_some_and(|t| now.duration_since(*t) >= Duration::from_secs(60))
            {
                self.sent_window.pop_front();
            }

            // Minute budget exhausted: hold the whole queue, keep order.
            if self.sent_window.len() >= self.limits.per_minute_limit {
                debug!("SMS per-minute budget exhausted; pausing drain");
                sleep(self.limits.retry_delay).await;
                continue;
            }

            // Per-send spacing.
            if let Some(last) = self.last_send {
                let elapsed = now.duration_since(last);
                if elapsed < self.limits.min_send_interval {
                    sleep(self.limits.min_send_interval - elapsed).await;
                }
            }

            let Some(message) = self.backlog.pop_front() else {
                continue;
            };

            match self.transport.send(&message.to, &message.body).await {
                Ok(()) => {
                    let sent_at = Instant::now();
                    self.last_send = Some(sent_at);
                    self.sent_window.push_back(sent_at);
                    debug!("SMS sent to {}", message.to);
                }
                Err(e) => {
                    // Re-enqueue at the tail; unbounded retries by design.
                    warn!("SMS send to {} failed: {}; will retry", message.to, e);
                    self.backlog.push_back(message);
                    sleep(self.limits.retry_delay).await;
                }
            }
        }
    }
}
