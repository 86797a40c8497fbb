use thiserror::Error;

use crate::state::Mode;

/// Errors surfaced by session operations.
///
/// Per-frame detection failures never appear here: the control loops log them and
/// treat the frame as having no detection.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("no video loaded")]
    NoVideo,

    #[error("a detection zone must be selected first")]
    ZoneRequired,

    #[error("object pipeline requires a detector handle")]
    NoDetector,

    #[error("detection already active ({0})")]
    Busy(Mode),

    #[error("live detection is not running")]
    NotRunning,

    #[error("invalid session settings: {0}")]
    InvalidSettings(String),

    #[error("raster surface unavailable: {0}")]
    SurfaceUnavailable(String),

    #[error("object model unavailable: {0}")]
    ModelLoad(String),

    #[error("video source error: {0:#}")]
    Video(#[source] anyhow::Error),

    #[error("live detection loop aborted: {0}")]
    LoopAborted(String),
}
