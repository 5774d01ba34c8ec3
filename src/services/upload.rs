use crate::{
    error::{AppError, Result},
    models::post::ItemMetadata,
    services::{
        directory::GroupDirectory, library::MediaLibrary, media::ImagePipeline,
        storage::JsonStore, video::{is_video_path, VideoProcessor},
    },
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Finalizes one uploaded media file: metadata save, thumbnail generation,
/// and per-member unread-list updates run concurrently and are joined before
/// the upload counts as durably recorded.
///
/// Metadata and thumbnail failures abort the upload with an aggregated
/// error; an unread-list failure is logged and swallowed. In a multi-file
/// batch each file is finalized independently, so callers must expect
/// partial success.
#[derive(Clone)]
pub struct UploadPipeline {
    store: Arc<JsonStore>,
    directory: GroupDirectory,
    library: MediaLibrary,
    images: ImagePipeline,
    video: VideoProcessor,
}

impl UploadPipeline {
    pub fn new(
        store: Arc<JsonStore>,
        directory: GroupDirectory,
        library: MediaLibrary,
        images: ImagePipeline,
        video: VideoProcessor,
    ) -> Self {
        Self {
            store,
            directory,
            library,
            images,
            video,
        }
    }

    pub fn media_path(&self, group_id: &str, filename: &str) -> PathBuf {
        self.store.resolve(&format!("{}/media/{}", group_id, filename))
    }

    pub fn thumbnail_path(&self, group_id: &str, item_id: &str) -> PathBuf {
        self.store
            .resolve(&format!("{}/thumbnails/{}.jpg", group_id, item_id))
    }

    pub async fn finalize(
        &self,
        group_id: &str,
        metadata: &ItemMetadata,
        media_path: &Path,
    ) -> Result<()> {
        let (saved, thumbed, unread) = tokio::join!(
            self.library.save_metadata(group_id, metadata),
            self.generate_thumbnail(group_id, &metadata.item_id, media_path),
            self.mark_unread(group_id, &metadata.item_id, &metadata.uploader_id),
        );

        if let Err(e) = unread {
            warn!(
                "Unread-list update failed for item {}: {}",
                metadata.item_id, e
            );
        }

        let mut failures = Vec::new();
        if let Err(e) = saved {
            failures.push(format!("metadata: {}", e));
        }
        if let Err(e) = thumbed {
            failures.push(format!("thumbnail: {}", e));
        }
        if !failures.is_empty() {
            return Err(AppError::Internal(format!(
                "Upload finalization failed for {}: {}",
                metadata.item_id,
                failures.join("; ")
            )));
        }

        info!("Finalized upload {} in {}", metadata.item_id, group_id);
        Ok(())
    }

    async fn generate_thumbnail(
        &self,
        group_id: &str,
        item_id: &str,
        media_path: &Path,
    ) -> Result<()> {
        let out = self.thumbnail_path(group_id, item_id);
        if is_video_path(media_path) {
            self.video.thumbnail(media_path, &out).await
        } else {
            self.images.thumbnail(media_path, &out).await
        }
    }

    /// Add the item to every other member's unread list.
    ///
    /// Per-member failures are logged and the remaining members still get
    /// updated; only a membership read failure aborts.
    async fn mark_unread(&self, group_id: &str, item_id: &str, uploader_id: &str) -> Result<()> {
        let members = self.directory.members(group_id).await?;

        let updates = members
            .iter()
            .filter(|m| m.id != uploader_id)
            .map(|member| {
                let key = format!("{}/users/unread/{}.json", group_id, member.id);
                let member_id = member.id.clone();
                async move {
                    let result: Result<()> = async {
                        let mut unread: Vec<String> = self.store.read_list(&key).await?;
                        if !unread.iter().any(|i| i == item_id) {
                            unread.push(item_id.to_string());
                            self.store.write(&key, &unread).await?;
                        }
                        Ok(())
                    }
                    .await;

                    if let Err(e) = result {
                        warn!("Failed to update unread list for {}: {}", member_id, e);
                    }
                }
            });
        futures::future::join_all(updates).await;

        Ok(())
    }
}

/// Probe media dimensions for metadata, image or video alike.
pub async fn probe_dimensions(
    images: &ImagePipeline,
    video: &VideoProcessor,
    path: &Path,
) -> Result<crate::models::post::Dimensions> {
    if is_video_path(path) {
        video.probe_dimensions(path).await
    } else {
        images.dimensions(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::member::Member;
    use crate::services::media::WorkerPool;
    use image::{Rgb, RgbImage};
    use std::time::Duration;

    fn pipeline(root: &Path) -> (Arc<JsonStore>, UploadPipeline) {
        let store = Arc::new(JsonStore::new(root));
        let directory = GroupDirectory::new(store.clone());
        let library = MediaLibrary::new(store.clone(), directory.clone());
        let pool = Arc::new(WorkerPool::new(2, Duration::from_secs(30)));
        let config = Config::default();
        let images = ImagePipeline::new(&config, pool);
        let video = VideoProcessor::new(config.video_frame_count);
        let upload = UploadPipeline::new(store.clone(), directory, library, images, video);
        (store, upload)
    }

    async fn seed_members(store: &JsonStore) {
        let members: Vec<Member> = ["u1", "u2", "u3"]
            .iter()
            .map(|id| Member {
                id: id.to_string(),
                name: id.to_uppercase(),
                notification_preference: None,
                phone_number: None,
            })
            .collect();
        store.write("g1/users/identities.json", &members).await.unwrap();
    }

    fn metadata(item_id: &str) -> ItemMetadata {
        ItemMetadata {
            item_id: item_id.to_string(),
            post_id: None,
            uploader_id: "u1".to_string(),
            upload_date: 1_700_000_000_000,
            dimensions: None,
            media_type: None,
            order_index: None,
            original_name: None,
            mime_type: None,
            size: None,
        }
    }

    #[tokio::test]
    async fn finalize_saves_metadata_thumbnail_and_unread_lists() {
        let dir = tempfile::tempdir().unwrap();
        let (store, upload) = pipeline(dir.path());
        seed_members(&store).await;

        let media = upload.media_path("g1", "item1.png");
        std::fs::create_dir_all(media.parent().unwrap()).unwrap();
        RgbImage::from_pixel(64, 64, Rgb([10u8, 200, 10]))
            .save(&media)
            .unwrap();

        upload.finalize("g1", &metadata("item1"), &media).await.unwrap();

        // Metadata written.
        let meta: Option<ItemMetadata> = store.read("g1/metadata/item1.json").await.unwrap();
        assert_eq!(meta.unwrap().item_id, "item1");

        // Thumbnail produced and within the 128px box.
        let thumb = image::open(upload.thumbnail_path("g1", "item1")).unwrap();
        assert!(thumb.width() <= 128 && thumb.height() <= 128);

        // Everyone but the uploader has the item marked unread.
        let unread_u2: Vec<String> = store.read_list("g1/users/unread/u2.json").await.unwrap();
        let unread_u3: Vec<String> = store.read_list("g1/users/unread/u3.json").await.unwrap();
        assert_eq!(unread_u2, vec!["item1".to_string()]);
        assert_eq!(unread_u3, vec!["item1".to_string()]);
        assert!(!store.exists("g1/users/unread/u1.json").await);
    }

    #[tokio::test]
    async fn finalize_fails_when_media_file_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = pipeline(dir.path());
        seed_members(&store).await;

        // Shrink the readiness poll so the test fails fast.
        let config = Config {
            file_wait_attempts: 2,
            file_wait_delay_ms: 1,
            ..Config::default()
        };
        let pool = Arc::new(WorkerPool::new(1, Duration::from_secs(5)));
        let directory = GroupDirectory::new(store.clone());
        let library = MediaLibrary::new(store.clone(), directory.clone());
        let upload = UploadPipeline::new(
            store.clone(),
            directory,
            library,
            ImagePipeline::new(&config, pool),
            VideoProcessor::new(3),
        );

        let missing = upload.media_path("g1", "ghost.png");
        let result = upload.finalize("g1", &metadata("ghost"), &missing).await;
        assert!(result.is_err());

        // Metadata still landed; the aggregate error names the thumbnail.
        let err = result.unwrap_err().to_string();
        assert!(err.contains("thumbnail"), "unexpected error: {}", err);
        assert!(store.exists("g1/metadata/ghost.json").await);
    }

    #[tokio::test]
    async fn duplicate_finalize_does_not_duplicate_unread_entries() {
        let dir = tempfile::tempdir().unwrap();
        let (store, upload) = pipeline(dir.path());
        seed_members(&store).await;

        let media = upload.media_path("g1", "item2.png");
        std::fs::create_dir_all(media.parent().unwrap()).unwrap();
        RgbImage::from_pixel(16, 16, Rgb([0u8, 0, 250]))
            .save(&media)
            .unwrap();

        upload.finalize("g1", &metadata("item2"), &media).await.unwrap();
        upload.finalize("g1", &metadata("item2"), &media).await.unwrap();

        let unread: Vec<String> = store.read_list("g1/users/unread/u2.json").await.unwrap();
        assert_eq!(unread, vec!["item2".to_string()]);
    }
}
