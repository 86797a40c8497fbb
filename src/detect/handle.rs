use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use tokio::sync::OnceCell;

use crate::detect::backend::{ModelLoader, ObjectModel};
use crate::detect::result::DetectedObject;
use crate::error::SessionError;
use crate::frame::Frame;
use crate::zone::Scale;

/// Explicitly owned handle to the external object detector.
///
/// Construct once per session and share it by `Arc`. The model is loaded on first
/// use; callers that arrive while the load is in flight wait for that same load.
/// A failed load is remembered: the handle reports the same failure on every later
/// call and never retries. Build a new handle to retry.
pub struct DetectorHandle {
    loader: Box<dyn ModelLoader>,
    model: OnceCell<std::result::Result<Box<dyn ObjectModel>, String>>,
    load_attempts: AtomicUsize,
}

impl DetectorHandle {
    pub fn new<L: ModelLoader + 'static>(loader: L) -> Self {
        Self {
            loader: Box::new(loader),
            model: OnceCell::new(),
            load_attempts: AtomicUsize::new(0),
        }
    }

    /// Load the model if nothing has tried yet, and return it.
    pub async fn ensure_loaded(&self) -> std::result::Result<&dyn ObjectModel, SessionError> {
        let slot = self
            .model
            .get_or_init(|| async {
                self.load_attempts.fetch_add(1, Ordering::SeqCst);
                log::info!("loading object detection model");
                match self.loader.load().await {
                    Ok(model) => {
                        log::info!("object detection model '{}' ready", model.name());
                        Ok(model)
                    }
                    Err(err) => {
                        log::error!("object detection model failed to load: {err:#}");
                        Err(format!("{err:#}"))
                    }
                }
            })
            .await;

        match slot {
            Ok(model) => Ok(model.as_ref()),
            Err(reason) => Err(SessionError::ModelLoad(reason.clone())),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.model.get(), Some(Ok(_)))
    }

    /// How many times the loader has been invoked (0 or 1).
    pub fn load_attempts(&self) -> usize {
        self.load_attempts.load(Ordering::SeqCst)
    }

    /// Run inference on `frame` and rescale every box by `scale`.
    pub async fn detect(&self, frame: &Frame, scale: Scale) -> Result<Vec<DetectedObject>> {
        let model = self.ensure_loaded().await?;
        let predictions = model.detect(frame).await?;
        log::trace!("{} returned {} predictions", model.name(), predictions.len());
        Ok(predictions
            .into_iter()
            .map(|prediction| DetectedObject::from_prediction(prediction, scale))
            .collect())
    }
}
