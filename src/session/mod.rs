//! Review session: one loaded video, one event log, at most one running loop.
//!
//! The session owns the single source of truth every loop consults (mode, loop
//! generation, tunables, events, current detection) behind `Arc<Mutex<_>>`. The
//! video source and its raster surface are moved into whichever loop runs and
//! come back when it ends, so two loops can never share them.

mod batch;
mod live;
mod pipeline;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

pub use batch::{ScanPhase, ScanReport};

use batch::BatchRun;
use live::{LiveHandle, LiveRun};
use pipeline::{FrameAnalyzer, Tunables};

use crate::detect::{DetectorHandle, MotionDetector, ObjectFilter};
use crate::error::SessionError;
use crate::frame::Surface;
use crate::ingest::VideoSource;
use crate::overlay::CurrentDetection;
use crate::state::{DetectionState, Mode};
use crate::timeline::EventLog;
use crate::zone::{DisplaySize, Scale, Zone};
use crate::{MovementEvent, Thresholds, DEDUP_WINDOW_SECS, SAMPLE_INTERVAL_SECS};

/// Which detector feeds the timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pipeline {
    Motion,
    Objects,
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Pipeline::Motion => "motion",
            Pipeline::Objects => "objects",
        })
    }
}

#[derive(Clone, Debug)]
pub struct SessionSettings {
    pub thresholds: Thresholds,
    pub zone: Option<Zone>,
    /// Refuse to start a loop until a zone has been drawn.
    pub zone_required: bool,
    /// Size the overlay is drawn at. `None` keeps source coordinates.
    pub display: Option<DisplaySize>,
    pub object_filter: ObjectFilter,
    pub sample_interval: f64,
    pub dedup_window: f64,
    pub live_tick_hz: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            zone: None,
            zone_required: false,
            display: None,
            object_filter: ObjectFilter::All,
            sample_interval: SAMPLE_INTERVAL_SECS,
            dedup_window: DEDUP_WINDOW_SECS,
            live_tick_hz: 60,
        }
    }
}

impl SessionSettings {
    /// Reject sampling parameters the loops cannot honor.
    ///
    /// The sample interval must be a positive number of seconds, otherwise a batch
    /// scan never reaches the end of the video. The dedup window may be widened but
    /// never narrowed below `DEDUP_WINDOW_SECS`.
    pub fn validate(&self) -> Result<(), SessionError> {
        if !(self.sample_interval.is_finite() && self.sample_interval > 0.0) {
            return Err(SessionError::InvalidSettings(format!(
                "sample interval must be a positive number of seconds, got {}",
                self.sample_interval
            )));
        }
        if !(self.dedup_window.is_finite() && self.dedup_window >= DEDUP_WINDOW_SECS) {
            return Err(SessionError::InvalidSettings(format!(
                "dedup window must be at least {DEDUP_WINDOW_SECS}s, got {}",
                self.dedup_window
            )));
        }
        if self.live_tick_hz == 0 {
            return Err(SessionError::InvalidSettings(
                "live tick rate must be at least 1 Hz".to_string(),
            ));
        }
        Ok(())
    }

    fn tick(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.live_tick_hz.max(1) as f64)
    }
}

// ----------------------------------------------------------------------------
// Shared state
// ----------------------------------------------------------------------------

pub(crate) struct Shared {
    pub(crate) state: DetectionState,
    pub(crate) events: EventLog,
    pub(crate) current: CurrentDetection,
    pub(crate) tunables: Tunables,
}

pub(crate) type SharedState = Arc<Mutex<Shared>>;

pub(crate) fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Loaded video plus the surface it renders into.
pub(crate) struct Media {
    pub(crate) video: Box<dyn VideoSource>,
    pub(crate) surface: Surface,
}

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

pub struct Session {
    settings: SessionSettings,
    shared: SharedState,
    video: Option<Box<dyn VideoSource>>,
    surface: Option<Surface>,
    live: Option<LiveHandle>,
    detector: Option<Arc<DetectorHandle>>,
}

impl Session {
    pub fn new(settings: SessionSettings) -> Self {
        let tunables = Tunables {
            thresholds: settings.thresholds,
            zone: settings.zone,
            object_filter: settings.object_filter.clone(),
        };
        Self {
            settings,
            shared: Arc::new(Mutex::new(Shared {
                state: DetectionState::new(),
                events: EventLog::new(),
                current: CurrentDetection::None,
                tunables,
            })),
            video: None,
            surface: None,
            live: None,
            detector: None,
        }
    }

    /// Attach the object detector used by `Pipeline::Objects`.
    pub fn with_detector(mut self, detector: Arc<DetectorHandle>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Replace the video. Clears the event log and the overlay.
    pub fn load_video(&mut self, video: Box<dyn VideoSource>) -> Result<(), SessionError> {
        if self.live.is_some() {
            return Err(SessionError::Busy(Mode::LiveDetecting));
        }
        let mut shared = lock(&self.shared);
        shared.state.ensure_idle()?;
        shared.events.clear();
        shared.current = CurrentDetection::None;
        drop(shared);

        let (width, height) = video.dimensions();
        log::info!(
            "loaded {} ({width}x{height}, {:.2}s)",
            video.describe(),
            video.duration()
        );
        self.video = Some(video);
        self.surface = None;
        Ok(())
    }

    /// The loaded video, unless a live loop currently holds it.
    pub fn video(&self) -> Option<&dyn VideoSource> {
        self.video.as_deref()
    }

    /// Seek the loaded video, e.g. after a timeline click.
    pub async fn seek(&mut self, t: f64) -> Result<(), SessionError> {
        let video = self.idle_video()?;
        video.seek(t).await.map_err(SessionError::Video)?;
        let at = video.current_time();
        self.refresh_overlay(at);
        Ok(())
    }

    /// Set or clear the region of interest. Takes effect at the next sample.
    pub fn set_zone(&mut self, zone: Option<Zone>) {
        self.settings.zone = zone;
        lock(&self.shared).tunables.zone = zone;
    }

    pub fn set_thresholds(&mut self, thresholds: Thresholds) {
        self.settings.thresholds = thresholds;
        lock(&self.shared).tunables.thresholds = thresholds;
    }

    pub fn set_object_filter(&mut self, filter: ObjectFilter) {
        self.settings.object_filter = filter.clone();
        lock(&self.shared).tunables.object_filter = filter;
    }

    pub fn mode(&self) -> Mode {
        lock(&self.shared).state.mode()
    }

    pub fn events(&self) -> Vec<MovementEvent> {
        lock(&self.shared).events.events().to_vec()
    }

    pub fn event_log(&self) -> EventLog {
        lock(&self.shared).events.clone()
    }

    pub fn current_detection(&self) -> CurrentDetection {
        lock(&self.shared).current.clone()
    }

    /// Overlay for playback review at time `t`, looked up in the event log.
    pub fn overlay_at(&self, t: f64) -> CurrentDetection {
        let shared = lock(&self.shared);
        CurrentDetection::from_event(shared.events.event_at(t, self.settings.dedup_window))
    }

    fn refresh_overlay(&mut self, t: f64) {
        let overlay = self.overlay_at(t);
        lock(&self.shared).current = overlay;
    }

    /// Run a batch scan over the whole video.
    pub async fn scan(&mut self, pipeline: Pipeline) -> Result<ScanReport, SessionError> {
        self.scan_with_progress(pipeline, |_| {}).await
    }

    pub async fn scan_with_progress<F>(
        &mut self,
        pipeline: Pipeline,
        progress: F,
    ) -> Result<ScanReport, SessionError>
    where
        F: FnMut(ScanPhase) + Send,
    {
        self.reap_finished_loop().await?;
        let analyzer = self.prepare(pipeline).await?;
        let mut media = self.take_media()?;
        let began = lock(&self.shared).state.begin_batch();
        if let Err(err) = began {
            self.restore_media(media);
            return Err(err);
        }

        let scale = self.scale(&*media.video);
        let outcome = BatchRun {
            media: &mut media,
            analyzer,
            shared: &self.shared,
            interval: self.settings.sample_interval,
            scale,
        }
        .run(pipeline, progress)
        .await;

        lock(&self.shared).state.finish_batch();
        self.restore_media(media);
        if let Err(err) = &outcome {
            log::error!("batch scan aborted: {err}");
        }
        outcome
    }

    /// Start live detection while the video plays.
    pub async fn start_live(&mut self, pipeline: Pipeline) -> Result<(), SessionError> {
        self.reap_finished_loop().await?;
        let analyzer = self.prepare(pipeline).await?;
        let media = self.take_media()?;
        let generation = {
            let mut shared = lock(&self.shared);
            let began = shared.state.begin_live();
            match began {
                Ok(generation) => {
                    shared.current = CurrentDetection::None;
                    generation
                }
                Err(err) => {
                    drop(shared);
                    self.restore_media(media);
                    return Err(err);
                }
            }
        };

        let scale = self.scale(&*media.video);
        let stop = Arc::new(Notify::new());
        let run = LiveRun {
            media,
            analyzer,
            shared: Arc::clone(&self.shared),
            generation,
            stop: Arc::clone(&stop),
            tick: self.settings.tick(),
            dedup_window: self.settings.dedup_window,
            scale,
        };
        self.live = Some(LiveHandle {
            generation,
            stop,
            task: tokio::spawn(run.run()),
        });
        Ok(())
    }

    /// Stop live detection. The video keeps playing and the log is kept.
    pub async fn stop_live(&mut self) -> Result<(), SessionError> {
        let live = self.live.take().ok_or(SessionError::NotRunning)?;
        {
            let mut shared = lock(&self.shared);
            if shared.state.is_live(live.generation) {
                shared.state.stop_live()?;
            }
        }
        live.stop.notify_one();
        let media = live
            .task
            .await
            .map_err(|err| SessionError::LoopAborted(err.to_string()))?;
        self.restore_media(media);
        Ok(())
    }

    pub fn is_live(&self) -> bool {
        self.live.is_some() && self.mode() == Mode::LiveDetecting
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Check preconditions shared by both loops and build the detection stage.
    async fn prepare(&mut self, pipeline: Pipeline) -> Result<FrameAnalyzer, SessionError> {
        lock(&self.shared).state.ensure_idle()?;
        self.settings.validate()?;
        let video = self.video.as_ref().ok_or(SessionError::NoVideo)?;
        if self.settings.zone_required && self.settings.zone.is_none() {
            return Err(SessionError::ZoneRequired);
        }
        let (width, height) = video.dimensions();
        if !self.surface.as_ref().is_some_and(|s| s.fits(width, height)) {
            self.surface = Some(Surface::acquire(width, height)?);
        }

        match pipeline {
            Pipeline::Motion => Ok(FrameAnalyzer::Motion(MotionDetector::new())),
            Pipeline::Objects => {
                let detector = self.detector.clone().ok_or(SessionError::NoDetector)?;
                detector.ensure_loaded().await?;
                Ok(FrameAnalyzer::Objects(detector))
            }
        }
    }

    fn idle_video(&mut self) -> Result<&mut Box<dyn VideoSource>, SessionError> {
        if self.live.is_some() {
            return Err(SessionError::Busy(Mode::LiveDetecting));
        }
        lock(&self.shared).state.ensure_idle()?;
        self.video.as_mut().ok_or(SessionError::NoVideo)
    }

    fn take_media(&mut self) -> Result<Media, SessionError> {
        let video = self.video.take().ok_or(SessionError::NoVideo)?;
        match self.surface.take() {
            Some(surface) => Ok(Media { video, surface }),
            None => {
                self.video = Some(video);
                Err(SessionError::SurfaceUnavailable(
                    "surface was not acquired".to_string(),
                ))
            }
        }
    }

    fn restore_media(&mut self, media: Media) {
        self.video = Some(media.video);
        self.surface = Some(media.surface);
    }

    /// Collect a live loop that already ended on its own (video failure).
    async fn reap_finished_loop(&mut self) -> Result<(), SessionError> {
        let finished = match &self.live {
            Some(live) => !lock(&self.shared).state.is_live(live.generation),
            None => false,
        };
        if finished {
            self.stop_live().await?;
        }
        Ok(())
    }

    fn scale(&self, video: &dyn VideoSource) -> Scale {
        let (width, height) = video.dimensions();
        Scale::between(width, height, self.settings.display)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(live) = &self.live {
            live.stop.notify_one();
        }
    }
}
