//! Video sources.
//!
//! - Synthetic `stub://` scenes (always available, used by tests and the demo)
//! - Local video files (feature: ingest-file-ffmpeg)
//!
//! Sources only ever read local media. Frames stay in memory and are handed to the
//! control loops through a `Surface`.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
mod source;
pub mod synthetic;

pub use file::{is_local_file_path, open_video, FileConfig};
pub use source::VideoSource;
pub use synthetic::SyntheticVideo;
