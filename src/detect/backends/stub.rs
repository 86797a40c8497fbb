use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::detect::backend::{ModelLoader, ObjectModel};
use crate::detect::result::{PixelBox, RawPrediction};
use crate::frame::Frame;

type Script = Box<dyn Fn(&Frame) -> Result<Vec<RawPrediction>> + Send + Sync>;

/// Scripted object model for tests and the synthetic demo.
pub struct StubModel {
    script: Script,
    latency: Duration,
    calls: AtomicUsize,
}

impl StubModel {
    /// Model whose output is computed by `script` for every frame.
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&Frame) -> Result<Vec<RawPrediction>> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Model that reports the same predictions for every frame.
    pub fn fixed(predictions: Vec<RawPrediction>) -> Self {
        Self::new(move |_| Ok(predictions.clone()))
    }

    /// Reports the envelope of near-white pixels as one object labelled `label`.
    ///
    /// Pairs with the synthetic `stub://` scenes, where the walking figure is the
    /// only bright region.
    pub fn bright_regions(label: &'static str) -> Self {
        Self::new(move |frame| {
            let mut bounds: Option<(u32, u32, u32, u32)> = None;
            for y in 0..frame.height {
                for x in 0..frame.width {
                    let Some([r, g, b, _]) = frame.pixel(x, y) else {
                        continue;
                    };
                    if r < 200 || g < 200 || b < 200 {
                        continue;
                    }
                    bounds = Some(match bounds {
                        None => (x, y, x, y),
                        Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
                    });
                }
            }
            Ok(bounds
                .map(|(x0, y0, x1, y1)| RawPrediction {
                    bbox: PixelBox {
                        xmin: x0 as f64,
                        ymin: y0 as f64,
                        xmax: (x1 + 1) as f64,
                        ymax: (y1 + 1) as f64,
                    },
                    label: label.to_string(),
                    score: 0.9,
                })
                .into_iter()
                .collect())
        })
    }

    /// Suspend for `latency` before answering each frame.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of inference calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectModel for StubModel {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn detect(&self, frame: &Frame) -> Result<Vec<RawPrediction>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        (self.script)(frame)
    }
}

/// Hands out a prepared `StubModel` once, optionally after a delay or with an error.
pub struct StubLoader {
    model: Mutex<Option<StubModel>>,
    delay: Duration,
    failure: Option<String>,
}

impl StubLoader {
    pub fn new(model: StubModel) -> Self {
        Self {
            model: Mutex::new(Some(model)),
            delay: Duration::ZERO,
            failure: None,
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            model: Mutex::new(None),
            delay: Duration::ZERO,
            failure: Some(reason.to_string()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl ModelLoader for StubLoader {
    async fn load(&self) -> Result<Box<dyn ObjectModel>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(reason) = &self.failure {
            return Err(anyhow!("{reason}"));
        }
        let model = self
            .model
            .lock()
            .map_err(|_| anyhow!("stub loader lock poisoned"))?
            .take()
            .ok_or_else(|| anyhow!("stub model already handed out"))?;
        Ok(Box::new(model))
    }
}
