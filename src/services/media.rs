use crate::{
    config::Config,
    error::{AppError, Result},
    models::post::Dimensions,
    utils::retry::{retry, wait_for_file},
};
use image::DynamicImage;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

/// Bounded pool for CPU-heavy image work.
///
/// Admission is future-based: callers wait on a semaphore permit instead of
/// polling for a free slot. The permit travels into the blocking task and is
/// released when the task finishes, success or failure, so at most `capacity`
/// jobs ever run at once.
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    task_timeout: Duration,
}

impl WorkerPool {
    pub fn new(capacity: usize, task_timeout: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            task_timeout,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Run a blocking task once a slot is free, bounded by the pool timeout.
    ///
    /// On timeout the blocking task cannot be interrupted; it keeps its slot
    /// until it finishes on its own, but the caller gets an error right away.
    pub async fn run<T, F>(&self, task: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AppError::internal("Worker pool is shut down"))?;

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            task()
        });

        match tokio::time::timeout(self.task_timeout, handle).await {
            Ok(joined) => joined?,
            Err(_) => Err(AppError::ImageProcessing(format!(
                "Image task timed out after {:?}",
                self.task_timeout
            ))),
        }
    }
}

/// Resize parameters for one processing pass.
#[derive(Debug, Clone, Copy)]
pub struct ResizeOptions {
    pub max_width: u32,
    pub max_height: u32,
    pub quality: u8,
}

/// Image resize/thumbnail pipeline over the worker pool.
#[derive(Clone)]
pub struct ImagePipeline {
    pool: Arc<WorkerPool>,
    resize: ResizeOptions,
    thumbnail: ResizeOptions,
    file_wait_attempts: usize,
    file_wait_delay: Duration,
}

impl ImagePipeline {
    pub fn new(config: &Config, pool: Arc<WorkerPool>) -> Self {
        Self {
            pool,
            resize: ResizeOptions {
                max_width: config.image_max_width,
                max_height: config.image_max_height,
                quality: config.image_quality,
            },
            thumbnail: ResizeOptions {
                max_width: config.thumbnail_size,
                max_height: config.thumbnail_size,
                quality: config.thumbnail_quality,
            },
            file_wait_attempts: config.file_wait_attempts,
            file_wait_delay: Duration::from_millis(config.file_wait_delay_ms),
        }
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Primary resize/re-encode pass: orientation-aware rotation, fit-inside
    /// resize without upscaling, quality-bounded JPEG output.
    pub async fn process(
        &self,
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        options: ResizeOptions,
    ) -> Result<()> {
        let input = input.into();
        let output = output.into();
        self.pool
            .run(move || {
                let img = load_oriented(&input)?;
                let resized = resize_fit_inside(img, options.max_width, options.max_height);
                encode_jpeg(&resized, &output, options.quality)
            })
            .await
    }

    pub async fn process_default(
        &self,
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Result<()> {
        self.process(input, output, self.resize).await
    }

    /// Thumbnail pass, gated on the source file being fully flushed.
    ///
    /// The readiness poll itself runs at a fixed interval; the retry wrapper
    /// around it backs off exponentially between whole poll rounds.
    pub async fn thumbnail(
        &self,
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Result<()> {
        let input = input.into();
        let attempts = self.file_wait_attempts;
        let delay = self.file_wait_delay;
        retry(|| wait_for_file(&input, attempts, delay), 3, delay).await?;

        self.process(input, output, self.thumbnail).await
    }

    /// Orientation-corrected pixel dimensions.
    pub async fn dimensions(&self, path: impl Into<PathBuf>) -> Result<Dimensions> {
        let path = path.into();
        self.pool
            .run(move || {
                let img = load_oriented(&path)?;
                Ok(Dimensions {
                    width: img.width(),
                    height: img.height(),
                })
            })
            .await
    }
}

/// Decode an image and bake in its EXIF orientation.
fn load_oriented(path: &Path) -> Result<DynamicImage> {
    let img = image::open(path)?;
    let oriented = match exif_orientation(path) {
        Some(2) => img.fliph(),
        Some(3) => img.rotate180(),
        Some(4) => img.flipv(),
        Some(5) => img.rotate90().fliph(),
        Some(6) => img.rotate90(),
        Some(7) => img.rotate270().fliph(),
        Some(8) => img.rotate270(),
        _ => img,
    };
    Ok(oriented)
}

fn exif_orientation(path: &Path) -> Option<u32> {
    let file = std::fs::File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    let exif = exif::Reader::new()
        .read_from_container(&mut reader)
        .ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    field.value.get_uint(0)
}

/// Constrain to the box, preserving aspect ratio, never upscaling.
fn resize_fit_inside(img: DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
    if img.width() <= max_width && img.height() <= max_height {
        return img;
    }
    debug!(
        "Resizing {}x{} to fit {}x{}",
        img.width(),
        img.height(),
        max_width,
        max_height
    );
    img.resize(max_width, max_height, image::imageops::FilterType::Lanczos3)
}

fn encode_jpeg(img: &DynamicImage, output: &Path, quality: u8) -> Result<()> {
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::io::BufWriter::new(std::fs::File::create(output)?);
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut file, quality);
    // JPEG has no alpha; flatten before encoding.
    encoder.encode_image(&img.to_rgb8())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_config() -> Config {
        Config::default()
    }

    fn write_test_png(path: &Path, width: u32, height: u32) {
        let img = RgbImage::from_pixel(width, height, Rgb([200u8, 40, 40]));
        img.save(path).unwrap();
    }

    #[tokio::test]
    async fn pool_never_exceeds_capacity() {
        let pool = Arc::new(WorkerPool::new(2, Duration::from_secs(30)));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            let running = running.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                pool.run(move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(30));
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2, "peak {}", peak.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn pool_releases_slot_on_task_failure() {
        let pool = WorkerPool::new(1, Duration::from_secs(5));
        let failed: Result<()> = pool.run(|| Err(AppError::image("boom"))).await;
        assert!(failed.is_err());

        // The slot must be free again.
        pool.run(|| Ok(())).await.unwrap();
    }

    #[tokio::test]
    async fn resize_fits_inside_without_upscaling() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        let output = dir.path().join("out.jpg");
        write_test_png(&input, 64, 32);

        let pool = Arc::new(WorkerPool::new(1, Duration::from_secs(30)));
        let pipeline = ImagePipeline::new(&test_config(), pool);

        pipeline
            .process(
                &input,
                &output,
                ResizeOptions {
                    max_width: 16,
                    max_height: 16,
                    quality: 80,
                },
            )
            .await
            .unwrap();

        let out = image::open(&output).unwrap();
        assert!(out.width() <= 16 && out.height() <= 16);
        // Aspect ratio preserved: 64x32 -> 16x8.
        assert_eq!((out.width(), out.height()), (16, 8));
    }

    #[tokio::test]
    async fn small_images_are_not_upscaled() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        let output = dir.path().join("out.jpg");
        write_test_png(&input, 10, 10);

        let pool = Arc::new(WorkerPool::new(1, Duration::from_secs(30)));
        let pipeline = ImagePipeline::new(&test_config(), pool);

        pipeline
            .process(
                &input,
                &output,
                ResizeOptions {
                    max_width: 100,
                    max_height: 100,
                    quality: 80,
                },
            )
            .await
            .unwrap();

        let out = image::open(&output).unwrap();
        assert_eq!((out.width(), out.height()), (10, 10));
    }

    #[tokio::test]
    async fn dimensions_reports_pixel_size() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        write_test_png(&input, 48, 24);

        let pool = Arc::new(WorkerPool::new(1, Duration::from_secs(30)));
        let pipeline = ImagePipeline::new(&test_config(), pool);

        let dims = pipeline.dimensions(&input).await.unwrap();
        assert_eq!((dims.width, dims.height), (48, 24));
    }

    #[tokio::test]
    async fn thumbnail_fails_when_source_never_appears() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("never.png");
        let output = dir.path().join("thumb.jpg");

        let mut config = test_config();
        config.file_wait_attempts = 2;
        config.file_wait_delay_ms = 1;
        let pool = Arc::new(WorkerPool::new(1, Duration::from_secs(30)));
        let pipeline = ImagePipeline::new(&config, pool);

        assert!(pipeline.thumbnail(&missing, &output).await.is_err());
    }
}
