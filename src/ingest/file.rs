//! Opening a video by path.
//!
//! `stub://` URLs open the synthetic demo scene. Anything else must be a local
//! file path; other URL schemes are rejected before any I/O happens. Local files
//! need the `ingest-file-ffmpeg` feature.

use anyhow::{anyhow, Result};

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegVideo;
use super::source::VideoSource;
use super::synthetic::SyntheticVideo;

/// Where to load a video from.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Local file path (e.g., "/srv/footage/yard.mp4") or a `stub://` URL.
    pub path: String,
    /// Frame rate of the synthetic `stub://` scene.
    pub target_fps: u32,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            target_fps: 10,
        }
    }
}

impl FileConfig {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            ..Self::default()
        }
    }
}

/// Open `config.path` as a boxed video source.
pub fn open_video(config: &FileConfig) -> Result<Box<dyn VideoSource>> {
    if !is_local_file_path(&config.path) {
        return Err(anyhow!(
            "video sources must be local paths or stub:// URLs, got '{}'",
            config.path
        ));
    }
    if config.path.starts_with("stub://") {
        log::info!("opening synthetic video {}", config.path);
        return Ok(Box::new(
            SyntheticVideo::demo_scene(&config.path).with_fps(config.target_fps.max(1) as f64),
        ));
    }

    #[cfg(feature = "ingest-file-ffmpeg")]
    {
        log::info!("decoding {} with ffmpeg", config.path);
        Ok(Box::new(FfmpegVideo::open(config)?))
    }
    #[cfg(not(feature = "ingest-file-ffmpeg"))]
    {
        Err(anyhow!(
            "local video files require the ingest-file-ffmpeg feature"
        ))
    }
}

pub fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_urls_are_rejected() {
        for path in ["rtsp://cam/1", "https://example.com/a.mp4", "", "   "] {
            assert!(!is_local_file_path(path), "{path}");
            assert!(open_video(&FileConfig::new(path)).is_err());
        }
    }

    #[test]
    fn stub_urls_open_the_demo_scene() {
        let video = open_video(&FileConfig::new("stub://yard")).unwrap();
        assert_eq!(video.dimensions(), (320, 240));
        assert_eq!(video.duration(), 10.0);
        assert_eq!(video.describe(), "stub://yard");
    }

    #[test]
    fn plain_paths_are_local() {
        assert!(is_local_file_path("/srv/footage/yard.mp4"));
        assert!(is_local_file_path("clips/yard.mp4"));
    }
}
