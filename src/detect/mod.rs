mod backend;
pub mod backends;
mod handle;
pub mod labels;
pub mod motion;
mod result;

pub use backend::{ModelLoader, ObjectModel};
pub use backends::{StubLoader, StubModel};
pub use handle::DetectorHandle;
pub use motion::{extract_bounding_box, has_movement, scan_changes, ChangeSummary, MotionDetector};
pub use result::{DetectedObject, ObjectFilter, PixelBox, RawPrediction};
