use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Storage configuration
    pub data_dir: PathBuf,

    // Frontend URL used in notification deep links
    pub client_url: String,

    // Twilio SMS configuration
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_phone_number: String,

    // Web push (VAPID) configuration
    pub vapid_private_key: String,
    pub vapid_subject: String,

    // SMS dispatch rate limits
    pub sms_min_send_interval_ms: u64,
    pub sms_per_minute_limit: usize,
    pub sms_retry_delay_ms: u64,

    // Image processing
    pub image_max_width: u32,
    pub image_max_height: u32,
    pub image_quality: u8,
    pub thumbnail_size: u32,
    pub thumbnail_quality: u8,
    pub image_task_timeout_secs: u64,

    // Worker pool sizing (0 = derive from available cores)
    pub worker_pool_size: usize,

    // Video frame extraction
    pub video_frame_count: usize,

    // File-readiness retry
    pub file_wait_attempts: usize,
    pub file_wait_delay_ms: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Config {
            data_dir: env::var("DATA_DIR")
                .unwrap_or_else(|_| "groups".to_string())
                .into(),

            client_url: env::var("CLIENT_URL")
                .unwrap_or_else(|_| "http://localhost:3001".to_string()),

            twilio_account_sid: env::var("TWILIO_ACCOUNT_SID").unwrap_or_default(),
            twilio_auth_token: env::var("TWILIO_AUTH_TOKEN").unwrap_or_default(),
            twilio_phone_number: env::var("TWILIO_PHONE_NUMBER").unwrap_or_default(),

            vapid_private_key: env::var("VAPID_PRIVATE_KEY").unwrap_or_default(),
            vapid_subject: env::var("VAPID_SUBJECT")
                .unwrap_or_else(|_| "mailto:admin@wave.local".to_string()),

            sms_min_send_interval_ms: env::var("SMS_MIN_SEND_INTERVAL_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,
            sms_per_minute_limit: env::var("SMS_PER_MINUTE_LIMIT")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,
            sms_retry_delay_ms: env::var("SMS_RETRY_DELAY_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()?,

            image_max_width: env::var("IMAGE_MAX_WIDTH")
                .unwrap_or_else(|_| "2000".to_string())
                .parse()?,
            image_max_height: env::var("IMAGE_MAX_HEIGHT")
                .unwrap_or_else(|_| "2000".to_string())
                .parse()?,
            image_quality: env::var("IMAGE_QUALITY")
                .unwrap_or_else(|_| "85".to_string())
                .parse()?,
            thumbnail_size: env::var("THUMBNAIL_SIZE")
                .unwrap_or_else(|_| "128".to_string())
                .parse()?,
            thumbnail_quality: env::var("THUMBNAIL_QUALITY")
                .unwrap_or_else(|_| "50".to_string())
                .parse()?,
            image_task_timeout_secs: env::var("IMAGE_TASK_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,

            worker_pool_size: env::var("WORKER_POOL_SIZE")
                .unwrap_or_else(|_| "0".to_string())
                .parse()?,

            video_frame_count: env::var("VIDEO_FRAME_COUNT")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,

            file_wait_attempts: env::var("FILE_WAIT_ATTEMPTS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
            file_wait_delay_ms: env::var("FILE_WAIT_DELAY_MS")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,
        })
    }

    /// Effective worker pool capacity: available cores minus one, minimum 1,
    /// unless overridden explicitly.
    pub fn effective_pool_size(&self) -> usize {
        if self.worker_pool_size > 0 {
            return self.worker_pool_size;
        }
        std::thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1))
            .unwrap_or(1)
            .max(1)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: "groups".into(),
            client_url: "http://localhost:3001".to_string(),
            twilio_account_sid: String::new(),
            twilio_auth_token: String::new(),
            twilio_phone_number: String::new(),
            vapid_private_key: String::new(),
            vapid_subject: "mailto:admin@wave.local".to_string(),
            sms_min_send_interval_ms: 1000,
            sms_per_minute_limit: 60,
            sms_retry_delay_ms: 5000,
            image_max_width: 2000,
            image_max_height: 2000,
            image_quality: 85,
            thumbnail_size: 128,
            thumbnail_quality: 50,
            image_task_timeout_secs: 30,
            worker_pool_size: 0,
            video_frame_count: 3,
            file_wait_attempts: 10,
            file_wait_delay_ms: 100,
        }
    }
}
