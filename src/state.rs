use crate::{
    config::Config,
    error::Result,
    services::{
        digests::DigestSender,
        directory::GroupDirectory,
        fanout::FanoutEngine,
        library::MediaLibrary,
        media::{ImagePipeline, WorkerPool},
        push::{PushService, PushTransport, WebPushTransport},
        queue::NotificationQueues,
        sms::{SmsLimits, SmsQueue, SmsTransport, TwilioTransport},
        storage::JsonStore,
        upload::UploadPipeline,
        video::VideoProcessor,
    },
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Shared application state: every service, wired once at startup.
///
/// The embedding HTTP layer clones this into its request handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<JsonStore>,
    pub directory: GroupDirectory,
    pub queues: NotificationQueues,
    pub push: PushService,
    pub sms: SmsQueue,
    pub fanout: FanoutEngine,
    pub library: MediaLibrary,
    pub images: ImagePipeline,
    pub video: VideoProcessor,
    pub upload: UploadPipeline,
    pub digests: DigestSender,
}

impl AppState {
    /// Wire everything against the production transports.
    pub fn initialize(config: Config) -> Result<Self> {
        let push_transport: Arc<dyn PushTransport> = Arc::new(WebPushTransport::new(
            &config.vapid_private_key,
            &config.vapid_subject,
        )?);
        let sms_transport: Arc<dyn SmsTransport> = Arc::new(TwilioTransport::new(&config));
        Self::with_transports(config, push_transport, sms_transport)
    }

    /// Wire with injected delivery transports; tests substitute fakes here.
    pub fn with_transports(
        config: Config,
        push_transport: Arc<dyn PushTransport>,
        sms_transport: Arc<dyn SmsTransport>,
    ) -> Result<Self> {
        let store = Arc::new(JsonStore::new(config.data_dir.clone()));
        let directory = GroupDirectory::new(store.clone());
        let queues = NotificationQueues::new(store.clone());
        let push = PushService::new(store.clone(), push_transport);
        let sms = SmsQueue::new(sms_transport, SmsLimits::from_config(&config));

        let fanout = FanoutEngine::new(
            directory.clone(),
            queues.clone(),
            push.clone(),
            store.clone(),
            config.client_url.clone(),
        );

        let pool = Arc::new(WorkerPool::new(
            config.effective_pool_size(),
            Duration::from_secs(config.image_task_timeout_secs),
        ));
        info!("Image worker pool capacity: {}", pool.capacity());

        let images = ImagePipeline::new(&config, pool);
        let video = VideoProcessor::new(config.video_frame_count);
        let library = MediaLibrary::new(store.clone(), directory.clone());
        let upload = UploadPipeline::new(
            store.clone(),
            directory.clone(),
            library.clone(),
            images.clone(),
            video.clone(),
        );
        let digests = DigestSender::new(
            directory.clone(),
            queues.clone(),
            sms.clone(),
            config.client_url.clone(),
        );

        Ok(Self {
            config,
            store,
            directory,
            queues,
            push,
            sms,
            fanout,
            library,
            images,
            video,
            upload,
            digests,
        })
    }
}
