use crate::{
    error::{AppError, Result},
    models::post::Dimensions,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, error};
use uuid::Uuid;

/// One extracted video frame, read back into memory.
#[derive(Debug, Clone)]
pub struct Frame {
    pub bytes: Vec<u8>,
    pub media_type: &'static str,
}

/// Video probing and frame extraction via external ffmpeg/ffprobe processes.
#[derive(Debug, Clone)]
pub struct VideoProcessor {
    frame_count: usize,
}

#[derive(Deserialize)]
struct ProbeStreams {
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeStream {
    width: u32,
    height: u32,
}

impl VideoProcessor {
    pub fn new(frame_count: usize) -> Self {
        Self {
            frame_count: frame_count.max(1),
        }
    }

    /// Duration in seconds, via ffprobe.
    pub async fn probe_duration(&self, path: &Path) -> Result<f64> {
        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .output()
            .await
            .map_err(|e| AppError::ExternalService(format!("ffprobe failed to start: {}", e)))?;

        if !output.status.success() {
            return Err(AppError::ExternalService(format!(
                "ffprobe exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse()
            .map_err(|_| AppError::ExternalService("Could not parse video duration".to_string()))
    }

    /// Pixel dimensions of the first video stream.
    pub async fn probe_dimensions(&self, path: &Path) -> Result<Dimensions> {
        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height",
                "-of",
                "json",
            ])
            .arg(path)
            .output()
            .await
            .map_err(|e| AppError::ExternalService(format!("ffprobe failed to start: {}", e)))?;

        if !output.status.success() {
            return Err(AppError::ExternalService(format!(
                "ffprobe exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let probed: ProbeStreams = serde_json::from_slice(&output.stdout)?;
        let stream = probed
            .streams
            .first()
            .ok_or_else(|| AppError::ExternalService("No video stream found".to_string()))?;
        Ok(Dimensions {
            width: stream.width,
            height: stream.height,
        })
    }

    async fn extract_frame_at(&self, path: &Path, timestamp: f64, out: &Path) -> Result<()> {
        let status = Command::new("ffmpeg")
            .arg("-ss")
            .arg(format!("{}", timestamp))
            .arg("-i")
            .arg(path)
            .args(["-vframes", "1", "-vf", "scale=800:-1", "-q:v", "5", "-y"])
            .arg(out)
            .output()
            .await
            .map_err(|e| AppError::ExternalService(format!("ffmpeg failed to start: {}", e)))?;

        if !status.status.success() {
            return Err(AppError::ExternalService(format!(
                "ffmpeg exited with {}: {}",
                status.status,
                String::from_utf8_lossy(&status.stderr)
            )));
        }
        Ok(())
    }

    /// Extract evenly spaced frames, one frame only for clips under 3s.
    ///
    /// Each frame goes through a temp path that is removed whether or not
    /// extraction succeeded; a single bad frame is logged and skipped.
    pub async fn extract_frames(&self, path: &Path) -> Result<Vec<Frame>> {
        let duration = self.probe_duration(path).await?;
        let timestamps = frame_timestamps(duration, self.frame_count);
        debug!("Extracting {} frame(s) from {}", timestamps.len(), path.display());

        let mut frames = Vec::with_capacity(timestamps.len());
        for (i, timestamp) in timestamps.iter().enumerate() {
            let tmp: PathBuf =
                std::env::temp_dir().join(format!("wave-frame-{}-{}.jpg", Uuid::new_v4(), i));

            let extracted = self.extract_frame_at(path, *timestamp, &tmp).await;
            let read = match &extracted {
                Ok(()) => tokio::fs::read(&tmp).await.map_err(AppError::from),
                Err(_) => Err(AppError::external("frame extraction failed")),
            };

            // Guaranteed cleanup, success or failure.
            let _ = tokio::fs::remove_file(&tmp).await;

            match (extracted, read) {
                (Ok(()), Ok(bytes)) => frames.push(Frame {
                    bytes,
                    media_type: "image/jpeg",
                }),
                (Err(e), _) | (_, Err(e)) => {
                    error!("Error extracting frame at {}s: {}", timestamp, e);
                }
            }
        }

        Ok(frames)
    }

    /// Small poster frame for the thumbnail strip: half a second in,
    /// 100px wide.
    pub async fn thumbnail(&self, video: &Path, out: &Path) -> Result<()> {
        if let Some(parent) = out.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let output = Command::new("ffmpeg")
            .arg("-i")
            .arg(video)
            .args([
                "-ss",
                "00:00:00.5",
                "-vframes",
                "1",
                "-vf",
                "scale=100:-1",
                "-q:v",
                "10",
                "-y",
            ])
            .arg(out)
            .output()
            .await
            .map_err(|e| AppError::ExternalService(format!("ffmpeg failed to start: {}", e)))?;

        if !output.status.success() {
            return Err(AppError::ExternalService(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }
}

/// Evenly spaced sample points, excluding the very start and end.
fn frame_timestamps(duration: f64, frame_count: usize) -> Vec<f64> {
    let count = if duration < 3.0 { 1 } else { frame_count };
    (1..=count)
        .map(|i| duration * (i as f64) / (count as f64 + 1.0))
        .collect()
}

/// File extensions treated as video uploads.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "webm", "mkv", "m4v"];

pub fn is_video_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| VIDEO_EXTENSIONS.contains(&e.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_clips_sample_a_single_frame() {
        let stamps = frame_timestamps(2.0, 3);
        assert_eq!(stamps.len(), 1);
        assert!((stamps[0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn long_clips_sample_evenly_spaced_interior_points() {
        let stamps = frame_timestamps(8.0, 3);
        assert_eq!(stamps.len(), 3);
        assert!((stamps[0] - 2.0).abs() < 1e-9);
        assert!((stamps[1] - 4.0).abs() < 1e-9);
        assert!((stamps[2] - 6.0).abs() < 1e-9);
    }

    #[test]
    fn video_extension_detection_is_case_insensitive() {
        assert!(is_video_path(Path::new("clip.MP4")));
        assert!(is_video_path(Path::new("clip.mov")));
        assert!(!is_video_path(Path::new("photo.jpeg")));
        assert!(!is_video_path(Path::new("noextension")));
    }
}
