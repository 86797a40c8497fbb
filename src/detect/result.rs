use serde::{Deserialize, Serialize};

use crate::zone::{BoundingBox, Scale};

/// Box corners in source-frame pixels, as reported by an object model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelBox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

/// One raw model prediction, before rescaling and filtering.
#[derive(Clone, Debug, PartialEq)]
pub struct RawPrediction {
    pub bbox: PixelBox,
    pub label: String,
    pub score: f32,
}

/// Detected object in display coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub label: String,
    /// Clamped to `[0, 1]`.
    pub confidence: f32,
}

impl DetectedObject {
    pub fn from_prediction(prediction: RawPrediction, scale: Scale) -> Self {
        let b = prediction.bbox;
        let confidence = if prediction.score.is_finite() {
            prediction.score.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            x: b.xmin * scale.x,
            y: b.ymin * scale.y,
            width: (b.xmax - b.xmin).max(0.0) * scale.x,
            height: (b.ymax - b.ymin).max(0.0) * scale.y,
            label: prediction.label,
            confidence,
        }
    }

    pub fn bounds(&self) -> BoundingBox {
        BoundingBox {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }

    /// Overlay caption, e.g. `person (87%)`.
    pub fn caption(&self) -> String {
        format!("{} ({}%)", self.label, (self.confidence * 100.0).round() as u32)
    }
}

/// Restricts detections to one semantic class.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ObjectFilter {
    #[default]
    All,
    /// Keep only this label (case-insensitive).
    Label(String),
}

impl ObjectFilter {
    pub fn person_only() -> Self {
        Self::Label("person".to_string())
    }

    /// Map the "restrict to person class" toggle.
    pub fn from_person_toggle(person_only: bool) -> Self {
        if person_only {
            Self::person_only()
        } else {
            Self::All
        }
    }

    pub fn accepts(&self, object: &DetectedObject) -> bool {
        match self {
            Self::All => true,
            Self::Label(label) => object.label.eq_ignore_ascii_case(label),
        }
    }

    pub fn apply(&self, objects: Vec<DetectedObject>) -> Vec<DetectedObject> {
        objects.into_iter().filter(|o| self.accepts(o)).collect()
    }
}
