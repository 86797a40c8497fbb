use std::sync::Arc;

use crate::detect::{DetectorHandle, MotionDetector, ObjectFilter};
use crate::frame::Frame;
use crate::zone::{Scale, Zone};
use crate::{MovementEvent, Thresholds};

/// Parameters a running loop re-reads from the session for every sample.
#[derive(Clone, Debug, Default)]
pub(crate) struct Tunables {
    pub(crate) thresholds: Thresholds,
    pub(crate) zone: Option<Zone>,
    pub(crate) object_filter: ObjectFilter,
}

/// Per-run detection stage: turns one sampled frame into at most one event.
pub(crate) enum FrameAnalyzer {
    Motion(MotionDetector),
    Objects(Arc<DetectorHandle>),
}

impl FrameAnalyzer {
    /// Detection failures are logged and reported as "nothing found".
    pub(crate) async fn analyze(
        &mut self,
        frame: Frame,
        timestamp: f64,
        tunables: &Tunables,
        scale: Scale,
    ) -> Option<MovementEvent> {
        match self {
            Self::Motion(detector) => {
                let region = tunables
                    .zone
                    .unwrap_or_else(|| Zone::full_frame(frame.width, frame.height));
                let envelope = detector.observe(frame, &region, &tunables.thresholds)?;
                log::debug!("movement at {timestamp:.2}s inside {envelope:?}");
                Some(MovementEvent::motion(timestamp, scale.zone(&envelope)))
            }
            Self::Objects(handle) => match handle.detect(&frame, scale).await {
                Ok(objects) => {
                    let objects = tunables.object_filter.apply(objects);
                    if objects.is_empty() {
                        return None;
                    }
                    log::debug!("{} objects at {timestamp:.2}s", objects.len());
                    Some(MovementEvent::objects(timestamp, objects))
                }
                Err(err) => {
                    log::warn!("object detection failed at {timestamp:.2}s: {err:#}");
                    None
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{PixelBox, RawPrediction, StubLoader, StubModel};

    fn frame_with_block(lit: bool) -> Frame {
        Frame::from_fn(32, 32, |x, y| {
            if lit && (8..12).contains(&x) && (8..12).contains(&y) {
                [255, 255, 255, 255]
            } else {
                [0, 0, 0, 255]
            }
        })
    }

    #[tokio::test]
    async fn motion_needs_a_reference_frame() {
        let mut analyzer = FrameAnalyzer::Motion(MotionDetector::new());
        let tunables = Tunables {
            thresholds: Thresholds::new(30, 10).unwrap(),
            ..Tunables::default()
        };
        let scale = Scale::identity();
        assert!(analyzer
            .analyze(frame_with_block(false), 0.0, &tunables, scale)
            .await
            .is_none());
        let event = analyzer
            .analyze(frame_with_block(true), 0.5, &tunables, scale)
            .await
            .unwrap();
        assert_eq!(event.timestamp, 0.5);
        let bbox = event.bounding_box.unwrap();
        assert_eq!((bbox.x, bbox.y, bbox.width, bbox.height), (8.0, 8.0, 3.0, 3.0));
    }

    #[tokio::test]
    async fn motion_outside_zone_is_ignored() {
        let mut analyzer = FrameAnalyzer::Motion(MotionDetector::new());
        let tunables = Tunables {
            thresholds: Thresholds::new(30, 10).unwrap(),
            zone: Some(Zone::new(20, 20, 10, 10).unwrap()),
            ..Tunables::default()
        };
        let scale = Scale::identity();
        analyzer.analyze(frame_with_block(false), 0.0, &tunables, scale).await;
        assert!(analyzer
            .analyze(frame_with_block(true), 0.5, &tunables, scale)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn filtered_out_objects_produce_no_event() {
        let car = RawPrediction {
            bbox: PixelBox {
                xmin: 0.0,
                ymin: 0.0,
                xmax: 4.0,
                ymax: 4.0,
            },
            label: "car".to_string(),
            score: 0.9,
        };
        let handle = Arc::new(DetectorHandle::new(StubLoader::new(StubModel::fixed(vec![car]))));
        let mut analyzer = FrameAnalyzer::Objects(handle);
        let mut tunables = Tunables {
            object_filter: ObjectFilter::person_only(),
            ..Tunables::default()
        };
        let scale = Scale::identity();
        assert!(analyzer
            .analyze(frame_with_block(false), 1.0, &tunables, scale)
            .await
            .is_none());

        tunables.object_filter = ObjectFilter::All;
        let event = analyzer
            .analyze(frame_with_block(false), 1.0, &tunables, scale)
            .await
            .unwrap();
        assert_eq!(event.labels().collect::<Vec<_>>(), vec!["car"]);
    }

    #[tokio::test]
    async fn inference_errors_become_no_detection() {
        let model = StubModel::new(|_| Err(anyhow::anyhow!("tensor shape mismatch")));
        let handle = Arc::new(DetectorHandle::new(StubLoader::new(model)));
        let mut analyzer = FrameAnalyzer::Objects(handle);
        assert!(analyzer
            .analyze(frame_with_block(true), 0.0, &Tunables::default(), Scale::identity())
            .await
            .is_none());
    }
}
