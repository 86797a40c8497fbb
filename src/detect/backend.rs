use anyhow::Result;
use async_trait::async_trait;

use crate::detect::result::RawPrediction;
use crate::frame::Frame;

/// Pre-trained object detector, treated as an opaque asynchronous function.
///
/// Boxes are returned in source-frame pixels; rescaling into display space and
/// label filtering happen in `DetectorHandle`. Implementations may suspend for
/// inference latency and may fail per frame.
#[async_trait]
pub trait ObjectModel: Send + Sync {
    /// Model identifier, for logs.
    fn name(&self) -> &'static str;

    /// Run inference on one sampled frame.
    async fn detect(&self, frame: &Frame) -> Result<Vec<RawPrediction>>;
}

/// One-time model initialization (weights, runtime warm-up).
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self) -> Result<Box<dyn ObjectModel>>;
}
