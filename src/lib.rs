//! ZoneWatch
//!
//! Surveillance-video review: flag the moments in a video where something moves
//! inside a region of interest, or where an object detector sees something
//! relevant, and collect them into a seekable event timeline.
//!
//! # Architecture
//!
//! Two pipelines share one interaction shape:
//!
//! 1. **Motion**: frame sampling, pixel differencing, bounding-box extraction, timeline.
//! 2. **Objects**: frame sampling, external object model, label filter, timeline.
//!
//! Either pipeline is driven by a bounded batch scan (fixed 0.5 s sampling over
//! the whole video) or by an unbounded live loop (one sample per display tick
//! while playing). At most one loop runs at a time; see `state`.
//!
//! # Module Structure
//!
//! - `detect`: pixel differencing, the object-model seam and `DetectorHandle`
//! - `frame`: immutable `Frame` snapshots and the reusable `Surface`
//! - `ingest`: video sources (synthetic `stub://`, FFmpeg-decoded files)
//! - `session`: the batch and live control loops
//! - `timeline`, `overlay`, `zone`: event log, current detection, zone geometry
//! - Core types: `Thresholds`, `MovementEvent`

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod overlay;
pub mod session;
pub mod state;
pub mod timeline;
pub mod ui;
pub mod zone;

pub use config::ZoneWatchConfig;
pub use detect::{
    DetectedObject, DetectorHandle, ModelLoader, MotionDetector, ObjectFilter, ObjectModel,
    RawPrediction,
};
pub use error::SessionError;
pub use frame::{Frame, Surface};
pub use ingest::{open_video, FileConfig, SyntheticVideo, VideoSource};
pub use overlay::CurrentDetection;
pub use session::{Pipeline, ScanPhase, ScanReport, Session, SessionSettings};
pub use state::Mode;
pub use timeline::EventLog;
pub use zone::{BoundingBox, DisplaySize, Scale, Zone, ZoneDrag};

/// Spacing between batch-scan samples, in seconds.
pub const SAMPLE_INTERVAL_SECS: f64 = 0.5;

/// Live detections closer than this to a logged event are not logged again.
pub const DEDUP_WINDOW_SECS: f64 = 0.5;

// -------------------- Thresholds --------------------

pub const SENSITIVITY_RANGE: (u32, u32) = (5, 50);
pub const MOVEMENT_RANGE: (u32, u32) = (10, 200);
pub const MOVEMENT_STEP: u32 = 5;

/// Pixel-difference tuning.
///
/// `sensitivity` is the per-pixel mean RGB change a pixel must strictly exceed to
/// count as changed; `movement` is the changed-pixel count a frame must strictly
/// exceed to count as movement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Thresholds {
    sensitivity: u32,
    movement: u32,
}

impl Thresholds {
    pub fn new(sensitivity: u32, movement: u32) -> Result<Self> {
        let (s_min, s_max) = SENSITIVITY_RANGE;
        if !(s_min..=s_max).contains(&sensitivity) {
            return Err(anyhow!(
                "sensitivity {sensitivity} outside {s_min}..={s_max}"
            ));
        }
        let (m_min, m_max) = MOVEMENT_RANGE;
        if !(m_min..=m_max).contains(&movement) {
            return Err(anyhow!("movement threshold {movement} outside {m_min}..={m_max}"));
        }
        if (movement - m_min) % MOVEMENT_STEP != 0 {
            return Err(anyhow!(
                "movement threshold {movement} must be a multiple of {MOVEMENT_STEP}"
            ));
        }
        Ok(Self {
            sensitivity,
            movement,
        })
    }

    pub fn sensitivity(&self) -> u32 {
        self.sensitivity
    }

    pub fn movement(&self) -> u32 {
        self.movement
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            sensitivity: 30,
            movement: 50,
        }
    }
}

// -------------------- Events --------------------

/// One flagged moment of the video. Boxes are in display space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementEvent {
    /// Seconds from the start of the video.
    pub timestamp: f64,
    pub bounding_box: Option<BoundingBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_objects: Option<Vec<DetectedObject>>,
}

impl MovementEvent {
    pub fn motion(timestamp: f64, bounding_box: BoundingBox) -> Self {
        Self {
            timestamp,
            bounding_box: Some(bounding_box),
            detected_objects: None,
        }
    }

    /// Object event; the box is the envelope of all detected objects.
    pub fn objects(timestamp: f64, objects: Vec<DetectedObject>) -> Self {
        Self {
            timestamp,
            bounding_box: BoundingBox::enclosing(objects.iter().map(DetectedObject::bounds)),
            detected_objects: Some(objects),
        }
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.detected_objects
            .iter()
            .flatten()
            .map(|object| object.label.as_str())
    }
}
