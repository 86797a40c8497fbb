#![cfg(feature = "backend-tract")]

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use image::imageops::{self, FilterType};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::{ModelLoader, ObjectModel};
use crate::detect::labels::label_for_class;
use crate::detect::result::{PixelBox, RawPrediction};
use crate::frame::Frame;

/// Input edge length of the lite MobileNet SSD export.
pub const DEFAULT_INPUT_SIZE: u32 = 300;

/// Loads a local SSD-style ONNX export on first use.
pub struct TractLoader {
    path: PathBuf,
    input_size: u32,
    min_score: f32,
}

impl TractLoader {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            input_size: DEFAULT_INPUT_SIZE,
            min_score: 0.5,
        }
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_input_size(mut self, size: u32) -> Self {
        self.input_size = size;
        self
    }
}

#[async_trait]
impl ModelLoader for TractLoader {
    async fn load(&self) -> Result<Box<dyn ObjectModel>> {
        let model = TractModel::open(&self.path, self.input_size)?.with_min_score(self.min_score);
        Ok(Box::new(model))
    }
}

/// Tract-based SSD detector.
///
/// Expects a `uint8[1, H, W, 3]` input and the four TensorFlow object detection
/// outputs: normalized boxes `[1, N, 4]` as `(ymin, xmin, ymax, xmax)`, 1-based
/// class ids `[1, N]`, scores `[1, N]` and the valid count `[1]`. Reads the
/// model file once and performs no other I/O.
pub struct TractModel {
    plan: TypedRunnableModel<TypedModel>,
    input_size: u32,
    min_score: f32,
}

impl TractModel {
    pub fn open(path: &Path, input_size: u32) -> Result<Self> {
        if input_size == 0 {
            return Err(anyhow!("model input size must be positive"));
        }
        let side = input_size as usize;
        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .with_context(|| format!("failed to load ONNX model from {}", path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(u8::datum_type(), tvec!(1, side, side, 3)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            plan,
            input_size,
            min_score: 0.5,
        })
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let rgb: Vec<u8> = frame
            .pixels()
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();
        let image = RgbImage::from_raw(frame.width, frame.height, rgb)
            .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", frame.width, frame.height))?;
        let resized = imageops::resize(&image, self.input_size, self.input_size, FilterType::Triangle);

        let side = self.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, side, side, 3), |(_, y, x, c)| {
            resized.get_pixel(x as u32, y as u32)[c]
        });
        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>, frame: &Frame) -> Result<Vec<RawPrediction>> {
        if outputs.len() < 4 {
            return Err(anyhow!("expected 4 model outputs, found {}", outputs.len()));
        }
        let boxes = outputs[0]
            .to_array_view::<f32>()
            .context("box tensor was not f32")?;
        let classes = outputs[1]
            .to_array_view::<f32>()
            .context("class tensor was not f32")?;
        let scores = outputs[2]
            .to_array_view::<f32>()
            .context("score tensor was not f32")?;
        let count = outputs[3]
            .to_array_view::<f32>()
            .context("count tensor was not f32")?
            .iter()
            .next()
            .copied()
            .unwrap_or(0.0)
            .max(0.0) as usize;

        let boxes: Vec<f32> = boxes.iter().copied().collect();
        let classes: Vec<f32> = classes.iter().copied().collect();
        let scores: Vec<f32> = scores.iter().copied().collect();
        let count = count.min(scores.len()).min(classes.len()).min(boxes.len() / 4);

        let (w, h) = (frame.width as f64, frame.height as f64);
        let mut predictions = Vec::new();
        for i in 0..count {
            let score = scores[i];
            if !(score >= self.min_score) {
                continue;
            }
            let b = &boxes[i * 4..i * 4 + 4];
            predictions.push(RawPrediction {
                bbox: PixelBox {
                    xmin: (b[1] as f64).clamp(0.0, 1.0) * w,
                    ymin: (b[0] as f64).clamp(0.0, 1.0) * h,
                    xmax: (b[3] as f64).clamp(0.0, 1.0) * w,
                    ymax: (b[2] as f64).clamp(0.0, 1.0) * h,
                },
                label: label_for_class(classes[i].max(0.0).round() as usize).to_string(),
                score,
            });
        }
        Ok(predictions)
    }
}

#[async_trait]
impl ObjectModel for TractModel {
    fn name(&self) -> &'static str {
        "tract"
    }

    async fn detect(&self, frame: &Frame) -> Result<Vec<RawPrediction>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, frame)
    }
}
