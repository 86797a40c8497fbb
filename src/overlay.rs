use serde::Serialize;

use crate::detect::DetectedObject;
use crate::zone::BoundingBox;
use crate::MovementEvent;

/// What the overlay should draw right now, in display coordinates.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum CurrentDetection {
    #[default]
    None,
    Motion(BoundingBox),
    Objects(Vec<DetectedObject>),
}

impl CurrentDetection {
    /// Overlay for an event found in the log, e.g. during playback review.
    pub fn from_event(event: Option<&MovementEvent>) -> Self {
        let Some(event) = event else {
            return Self::None;
        };
        match (&event.detected_objects, event.bounding_box) {
            (Some(objects), _) if !objects.is_empty() => Self::Objects(objects.clone()),
            (_, Some(bbox)) => Self::Motion(bbox),
            _ => Self::None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn boxes(&self) -> Vec<BoundingBox> {
        match self {
            Self::None => Vec::new(),
            Self::Motion(bbox) => vec![*bbox],
            Self::Objects(objects) => objects.iter().map(DetectedObject::bounds).collect(),
        }
    }

    /// One caption per box; motion boxes are captioned "motion".
    pub fn captions(&self) -> Vec<String> {
        match self {
            Self::None => Vec::new(),
            Self::Motion(_) => vec!["motion".to_string()],
            Self::Objects(objects) => objects.iter().map(DetectedObject::caption).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn objects_take_precedence_over_envelope() {
        let person = DetectedObject {
            x: 1.0,
            y: 2.0,
            width: 3.0,
            height: 4.0,
            label: "person".to_string(),
            confidence: 0.87,
        };
        let event = MovementEvent::objects(1.0, vec![person.clone()]);
        let overlay = CurrentDetection::from_event(Some(&event));
        assert_eq!(overlay, CurrentDetection::Objects(vec![person]));
        assert_eq!(overlay.captions(), vec!["person (87%)"]);
        assert_eq!(overlay.boxes().len(), 1);
    }

    #[test]
    fn motion_and_empty_events() {
        let bbox = BoundingBox {
            x: 0.0,
            y: 0.0,
            width: 5.0,
            height: 5.0,
        };
        let motion = MovementEvent::motion(0.0, bbox);
        assert_eq!(CurrentDetection::from_event(Some(&motion)), CurrentDetection::Motion(bbox));
        assert!(CurrentDetection::from_event(None).is_none());
        assert!(CurrentDetection::None.captions().is_empty());
    }
}
