pub mod digests;
pub mod directory;
pub mod fanout;
pub mod library;
pub mod media;
pub mod mentions;
pub mod posts;
pub mod push;
pub mod queue;
pub mod renderer;
pub mod sms;
pub mod storage;
pub mod upload;
pub mod video;

// Re-export commonly used types
pub use digests::DigestSender;
pub use directory::GroupDirectory;
pub use fanout::FanoutEngine;
pub use library::MediaLibrary;
pub use media::{ImagePipeline, ResizeOptions, WorkerPool};
pub use push::{PushOutcome, PushPayload, PushService, PushTransport, WebPushTransport};
pub use queue::{Channel, NotificationQueues};
pub use sms::{SmsLimits, SmsQueue, SmsTransport, TwilioTransport};
pub use storage::JsonStore;
pub use upload::UploadPipeline;
pub use video::VideoProcessor;
