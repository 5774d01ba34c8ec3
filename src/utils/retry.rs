use crate::error::{AppError, Result};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Retry an async operation with exponential backoff.
///
/// The delay doubles after every failed attempt; no sleep follows the final
/// failure. `attempts` is clamped to at least 1.
pub async fn retry<T, E, F, Fut>(
    mut op: F,
    attempts: usize,
    initial_delay: Duration,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = attempts.max(1);
    let mut delay = initial_delay;

    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                debug!("Attempt {}/{} failed: {}, retrying in {:?}", attempt, attempts, e, delay);
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Poll until `path` exists with non-zero size, at a fixed interval.
///
/// Used to bridge the gap between an upload handler finishing and the media
/// file being fully flushed to disk.
pub async fn wait_for_file(path: &Path, max_attempts: usize, delay: Duration) -> Result<()> {
    for attempt in 1..=max_attempts.max(1) {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.len() > 0 => return Ok(()),
            _ => {
                debug!(
                    "File {} not ready (attempt {}/{})",
                    path.display(),
                    attempt,
                    max_attempts
                );
                tokio::time::sleep(delay).await;
            }
        }
    }

    Err(AppError::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("File never became ready: {}", path.display()),
    )))
}
