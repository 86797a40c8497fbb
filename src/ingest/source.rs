use anyhow::Result;
use async_trait::async_trait;

use crate::frame::Surface;

/// Seekable video playback, consumed by the control loops.
///
/// Times are seconds from the start of the video. `seek` resolves once the new
/// position has settled; until then `render` keeps drawing the previously
/// presented frame.
#[async_trait]
pub trait VideoSource: Send {
    /// Human-readable origin (path or `stub://` URL), for logs.
    fn describe(&self) -> String;

    /// Source dimensions in pixels. `(0, 0)` until metadata is known.
    fn dimensions(&self) -> (u32, u32);

    fn duration(&self) -> f64;

    fn current_time(&self) -> f64;

    /// Move the playhead to `t` (clamped to `[0, duration]`).
    async fn seek(&mut self, t: f64) -> Result<()>;

    fn play(&mut self);

    fn pause(&mut self);

    fn is_paused(&self) -> bool;

    /// Draw the presented frame into `surface`.
    fn render(&mut self, surface: &mut Surface) -> Result<()>;
}

/// Playback clock shared by the concrete sources.
#[derive(Debug)]
pub(crate) struct Playhead {
    duration: f64,
    position: f64,
    playing_since: Option<tokio::time::Instant>,
}

impl Playhead {
    pub(crate) fn new(duration: f64) -> Self {
        Self {
            duration: if duration.is_finite() { duration.max(0.0) } else { 0.0 },
            position: 0.0,
            playing_since: None,
        }
    }

    pub(crate) fn duration(&self) -> f64 {
        self.duration
    }

    pub(crate) fn current_time(&self) -> f64 {
        match self.playing_since {
            Some(since) => (self.position + since.elapsed().as_secs_f64()).min(self.duration),
            None => self.position,
        }
    }

    /// Clamp `t` into the video and move there.
    pub(crate) fn jump(&mut self, t: f64) -> f64 {
        let target = t.clamp(0.0, self.duration);
        self.position = target;
        if self.playing_since.is_some() {
            self.playing_since = Some(tokio::time::Instant::now());
        }
        target
    }

    pub(crate) fn play(&mut self) {
        if self.playing_since.is_none() {
            self.playing_since = Some(tokio::time::Instant::now());
        }
    }

    pub(crate) fn pause(&mut self) {
        self.position = self.current_time();
        self.playing_since = None;
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.playing_since.is_none()
    }
}
