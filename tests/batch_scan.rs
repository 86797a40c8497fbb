use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use zonewatch::detect::{PixelBox, RawPrediction, StubLoader, StubModel};
use zonewatch::frame::Surface;
use zonewatch::{
    DetectorHandle, DisplaySize, Mode, Pipeline, ScanPhase, Session, SessionError,
    SessionSettings, SyntheticVideo, Thresholds, VideoSource, Zone,
};

/// 64x64 dark frame; a 10x10 white block covers (20..=29, 20..=29) from 1.5 s on.
fn block_scene() -> SyntheticVideo {
    SyntheticVideo::new("stub://block", 64, 64, 3.0, |t, x, y| {
        if t >= 1.5 && (20..30).contains(&x) && (20..30).contains(&y) {
            [230, 230, 230, 255]
        } else {
            [20, 20, 20, 255]
        }
    })
    .with_fps(10.0)
}

fn motion_session(settings: SessionSettings) -> Session {
    let mut session = Session::new(settings);
    session.load_video(Box::new(block_scene())).unwrap();
    session
}

fn labelled(label: &str) -> RawPrediction {
    RawPrediction {
        bbox: PixelBox {
            xmin: 20.0,
            ymin: 20.0,
            xmax: 30.0,
            ymax: 30.0,
        },
        label: label.to_string(),
        score: 0.8,
    }
}

#[tokio::test]
async fn motion_scan_finds_block_once() {
    let mut session = motion_session(SessionSettings::default());

    let report = session.scan(Pipeline::Motion).await.unwrap();

    assert_eq!(report.frames_sampled, 6);
    assert_eq!(report.events, 1);
    assert_eq!(report.distinct_labels, None);
    let events = session.events();
    assert_eq!(events.len(), 1);
    assert!((events[0].timestamp - 1.5).abs() < 1e-9);
    let bbox = events[0].bounding_box.unwrap();
    assert_eq!((bbox.x, bbox.y, bbox.width, bbox.height), (20.0, 20.0, 9.0, 9.0));

    assert_eq!(session.mode(), Mode::Idle);
    let video = session.video().unwrap();
    assert_eq!(video.current_time(), 0.0);
    assert!(video.is_paused());
}

#[tokio::test]
async fn high_movement_threshold_suppresses_event() {
    let mut session = motion_session(SessionSettings {
        thresholds: Thresholds::new(30, 150).unwrap(),
        ..SessionSettings::default()
    });
    let report = session.scan(Pipeline::Motion).await.unwrap();
    assert_eq!(report.events, 0);
    assert!(session.events().is_empty());
}

#[tokio::test]
async fn boxes_are_reported_in_display_space() {
    let mut session = motion_session(SessionSettings {
        display: Some(DisplaySize::new(128.0, 128.0).unwrap()),
        ..SessionSettings::default()
    });
    session.scan(Pipeline::Motion).await.unwrap();
    let bbox = session.events()[0].bounding_box.unwrap();
    assert_eq!((bbox.x, bbox.y, bbox.width, bbox.height), (40.0, 40.0, 18.0, 18.0));
}

#[tokio::test]
async fn zone_limits_where_motion_counts() {
    let mut session = motion_session(SessionSettings {
        zone: Some(Zone::new(40, 40, 20, 20).unwrap()),
        ..SessionSettings::default()
    });
    assert_eq!(session.scan(Pipeline::Motion).await.unwrap().events, 0);

    session.set_zone(Some(Zone::new(0, 0, 32, 32).unwrap()));
    assert_eq!(session.scan(Pipeline::Motion).await.unwrap().events, 1);
}

#[tokio::test]
async fn rescan_replaces_previous_events() {
    let mut session = motion_session(SessionSettings::default());
    session.scan(Pipeline::Motion).await.unwrap();
    session.scan(Pipeline::Motion).await.unwrap();
    assert_eq!(session.events().len(), 1);
}

#[tokio::test]
async fn progress_walks_the_timeline_in_order() {
    let mut session = motion_session(SessionSettings::default());
    let mut phases = Vec::new();
    session
        .scan_with_progress(Pipeline::Motion, |phase| phases.push(phase))
        .await
        .unwrap();

    let sampled: Vec<f64> = phases
        .iter()
        .filter_map(|phase| match phase {
            ScanPhase::Sampling(t) => Some(*t),
            _ => None,
        })
        .collect();
    assert_eq!(sampled, vec![0.0, 0.5, 1.0, 1.5, 2.0, 2.5]);
    assert_eq!(phases.first(), Some(&ScanPhase::Seeking(0.0)));
    assert_eq!(phases.last(), Some(&ScanPhase::Done));
}

#[tokio::test]
async fn object_scan_counts_distinct_labels() {
    let model = StubModel::new(|frame| {
        let lit = frame.pixel(25, 25).is_some_and(|px| px[0] > 200);
        Ok(if lit {
            vec![labelled("person"), labelled("dog")]
        } else {
            Vec::new()
        })
    });
    let detector = Arc::new(DetectorHandle::new(StubLoader::new(model)));
    let mut session = Session::new(SessionSettings::default()).with_detector(detector);
    session.load_video(Box::new(block_scene())).unwrap();

    let report = session.scan(Pipeline::Objects).await.unwrap();

    assert_eq!(report.frames_sampled, 6);
    assert_eq!(report.events, 3);
    assert_eq!(report.distinct_labels, Some(2));
    let timestamps: Vec<f64> = session.events().iter().map(|e| e.timestamp).collect();
    assert_eq!(timestamps, vec![1.5, 2.0, 2.5]);
    assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn person_filter_drops_other_labels() {
    let model = StubModel::fixed(vec![labelled("car")]);
    let detector = Arc::new(DetectorHandle::new(StubLoader::new(model)));
    let mut session = Session::new(SessionSettings {
        object_filter: zonewatch::ObjectFilter::person_only(),
        ..SessionSettings::default()
    })
    .with_detector(detector);
    session.load_video(Box::new(block_scene())).unwrap();

    let report = session.scan(Pipeline::Objects).await.unwrap();
    assert_eq!(report.events, 0);
    assert_eq!(report.distinct_labels, Some(0));
}

#[tokio::test]
async fn per_frame_detection_failures_do_not_abort() {
    let model = StubModel::new(|frame| {
        if frame.pixel(25, 25).is_some_and(|px| px[0] > 200) {
            Ok(vec![labelled("person")])
        } else {
            Err(anyhow!("inference backend hiccup"))
        }
    });
    let detector = Arc::new(DetectorHandle::new(StubLoader::new(model)));
    let mut session = Session::new(SessionSettings::default()).with_detector(detector);
    session.load_video(Box::new(block_scene())).unwrap();

    let report = session.scan(Pipeline::Objects).await.unwrap();
    assert_eq!(report.frames_sampled, 6);
    assert_eq!(report.events, 3);
}

#[tokio::test]
async fn model_load_failure_is_reported_and_sticky() {
    let detector = Arc::new(DetectorHandle::new(StubLoader::failing("weights missing")));
    let mut session = Session::new(SessionSettings::default()).with_detector(Arc::clone(&detector));
    session.load_video(Box::new(block_scene())).unwrap();

    for _ in 0..2 {
        let err = session.scan(Pipeline::Objects).await.unwrap_err();
        assert!(matches!(err, SessionError::ModelLoad(ref msg) if msg.contains("weights missing")));
        assert_eq!(session.mode(), Mode::Idle);
    }
    assert_eq!(detector.load_attempts(), 1);

    // The motion pipeline does not need the model.
    assert!(session.scan(Pipeline::Motion).await.is_ok());
}

#[tokio::test]
async fn preconditions_are_checked_before_starting() {
    let mut empty = Session::new(SessionSettings::default());
    assert!(matches!(
        empty.scan(Pipeline::Motion).await,
        Err(SessionError::NoVideo)
    ));

    let mut no_detector = motion_session(SessionSettings::default());
    assert!(matches!(
        no_detector.scan(Pipeline::Objects).await,
        Err(SessionError::NoDetector)
    ));

    let mut needs_zone = motion_session(SessionSettings {
        zone_required: true,
        ..SessionSettings::default()
    });
    assert!(matches!(
        needs_zone.scan(Pipeline::Motion).await,
        Err(SessionError::ZoneRequired)
    ));
    needs_zone.set_zone(Some(Zone::new(0, 0, 64, 64).unwrap()));
    assert!(needs_zone.scan(Pipeline::Motion).await.is_ok());

    let mut no_surface = Session::new(SessionSettings::default());
    no_surface
        .load_video(Box::new(SyntheticVideo::new("stub://empty", 0, 0, 3.0, |_, _, _| {
            [0, 0, 0, 255]
        })))
        .unwrap();
    assert!(matches!(
        no_surface.scan(Pipeline::Motion).await,
        Err(SessionError::SurfaceUnavailable(_))
    ));
    assert_eq!(no_surface.mode(), Mode::Idle);
}

#[tokio::test]
async fn scan_is_refused_while_live() {
    let mut session = motion_session(SessionSettings::default());
    session.start_live(Pipeline::Motion).await.unwrap();
    assert!(matches!(
        session.scan(Pipeline::Motion).await,
        Err(SessionError::Busy(Mode::LiveDetecting))
    ));
    session.stop_live().await.unwrap();
    assert!(session.scan(Pipeline::Motion).await.is_ok());
}

#[tokio::test]
async fn unusable_sampling_settings_are_refused() {
    for sample_interval in [0.0, -0.5, f64::NAN, f64::INFINITY] {
        let mut session = motion_session(SessionSettings {
            sample_interval,
            ..SessionSettings::default()
        });
        assert!(matches!(
            session.scan(Pipeline::Motion).await,
            Err(SessionError::InvalidSettings(_))
        ));
        assert!(matches!(
            session.start_live(Pipeline::Motion).await,
            Err(SessionError::InvalidSettings(_))
        ));
        assert_eq!(session.mode(), Mode::Idle);
        assert!(session.video().is_some());
    }

    let mut narrow_dedup = motion_session(SessionSettings {
        dedup_window: 0.1,
        ..SessionSettings::default()
    });
    assert!(matches!(
        narrow_dedup.start_live(Pipeline::Motion).await,
        Err(SessionError::InvalidSettings(_))
    ));

    let mut wide_dedup = motion_session(SessionSettings {
        dedup_window: 2.0,
        ..SessionSettings::default()
    });
    assert!(wide_dedup.scan(Pipeline::Motion).await.is_ok());
}

#[tokio::test]
async fn scan_lets_other_tasks_run_between_samples() {
    let mut session = motion_session(SessionSettings::default());
    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    let _other = tokio::spawn(async move { flag.store(true, Ordering::SeqCst) });

    let seen = Arc::clone(&ran);
    let mut ran_before_done = false;
    session
        .scan_with_progress(Pipeline::Motion, |phase| {
            if phase == ScanPhase::Done {
                ran_before_done = seen.load(Ordering::SeqCst);
            }
        })
        .await
        .unwrap();

    assert!(ran_before_done);
}

/// Wraps the block scene and fails every seek past `fail_after` seconds.
struct FlakyVideo {
    inner: SyntheticVideo,
    fail_after: f64,
}

#[async_trait]
impl VideoSource for FlakyVideo {
    fn describe(&self) -> String {
        self.inner.describe()
    }

    fn dimensions(&self) -> (u32, u32) {
        self.inner.dimensions()
    }

    fn duration(&self) -> f64 {
        self.inner.duration()
    }

    fn current_time(&self) -> f64 {
        self.inner.current_time()
    }

    async fn seek(&mut self, t: f64) -> Result<()> {
        if t > self.fail_after {
            return Err(anyhow!("demuxer lost sync at {t}s"));
        }
        self.inner.seek(t).await
    }

    fn play(&mut self) {
        self.inner.play()
    }

    fn pause(&mut self) {
        self.inner.pause()
    }

    fn is_paused(&self) -> bool {
        self.inner.is_paused()
    }

    fn render(&mut self, surface: &mut Surface) -> Result<()> {
        self.inner.render(surface)
    }
}

#[tokio::test]
async fn video_failure_aborts_scan_and_returns_to_idle() {
    let mut session = Session::new(SessionSettings::default());
    session
        .load_video(Box::new(FlakyVideo {
            inner: block_scene(),
            fail_after: 1.0,
        }))
        .unwrap();

    let err = session.scan(Pipeline::Motion).await.unwrap_err();
    assert!(matches!(err, SessionError::Video(_)));
    assert!(err.to_string().contains("demuxer lost sync"));
    assert_eq!(session.mode(), Mode::Idle);
    // The video is still loaded and usable.
    assert!(session.video().is_some());
}

#[tokio::test]
async fn overlay_follows_playback_position() {
    let mut session = motion_session(SessionSettings::default());
    session.scan(Pipeline::Motion).await.unwrap();

    assert!(session.overlay_at(1.0).is_none());
    assert!(!session.overlay_at(1.7).is_none());
    assert!(session.overlay_at(2.1).is_none());

    session.seek(1.6).await.unwrap();
    assert!(matches!(
        session.current_detection(),
        zonewatch::CurrentDetection::Motion(_)
    ));
}
