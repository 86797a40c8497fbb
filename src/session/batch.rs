//! Bounded batch scan.
//!
//! `Idle -> Seeking -> Sampling -> (Seeking | Done)`. The scan pauses playback,
//! clears the event log and seeks to 0, then samples every `interval` seconds
//! until the next position would reach the end of the video. Frames are
//! processed strictly in timestamp order, so the log comes out sorted.

use serde::Serialize;

use super::pipeline::FrameAnalyzer;
use super::{lock, Media, Pipeline, SharedState};
use crate::error::SessionError;
use crate::overlay::CurrentDetection;
use crate::zone::Scale;

/// Where a running scan is, reported to progress callbacks.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum ScanPhase {
    /// Waiting for the seek to this position to settle.
    Seeking(f64),
    /// Sampling the frame at this position.
    Sampling(f64),
    Done,
}

/// Summary of a finished batch scan.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub pipeline: Pipeline,
    pub frames_sampled: usize,
    pub events: usize,
    /// Number of different object labels found (object pipeline only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distinct_labels: Option<usize>,
    pub duration: f64,
}

pub(super) struct BatchRun<'a> {
    pub(super) media: &'a mut Media,
    pub(super) analyzer: FrameAnalyzer,
    pub(super) shared: &'a SharedState,
    pub(super) interval: f64,
    pub(super) scale: Scale,
}

impl BatchRun<'_> {
    pub(super) async fn run<F>(mut self, pipeline: Pipeline, mut progress: F) -> Result<ScanReport, SessionError>
    where
        F: FnMut(ScanPhase) + Send,
    {
        let Media { video, surface } = &mut *self.media;
        let duration = video.duration();
        log::info!(
            "batch {pipeline} scan of {} ({duration:.2}s, every {}s)",
            video.describe(),
            self.interval
        );

        video.pause();
        {
            let mut shared = lock(self.shared);
            shared.events.clear();
            shared.current = CurrentDetection::None;
        }
        progress(ScanPhase::Seeking(0.0));
        video.seek(0.0).await.map_err(SessionError::Video)?;

        let mut position = 0.0;
        let mut frames_sampled = 0;
        loop {
            progress(ScanPhase::Sampling(position));
            video.render(surface).map_err(SessionError::Video)?;
            let frame = surface.snapshot();
            let timestamp = video.current_time();
            let tunables = lock(self.shared).tunables.clone();
            frames_sampled += 1;

            if let Some(event) = self.analyzer.analyze(frame, timestamp, &tunables, self.scale).await {
                lock(self.shared).events.push(event);
            }

            let next = position + self.interval;
            if next >= duration {
                break;
            }
            tokio::task::yield_now().await;
            progress(ScanPhase::Seeking(next));
            video.seek(next).await.map_err(SessionError::Video)?;
            position = next;
        }

        video.seek(0.0).await.map_err(SessionError::Video)?;
        progress(ScanPhase::Done);

        let shared = lock(self.shared);
        let report = ScanReport {
            pipeline,
            frames_sampled,
            events: shared.events.len(),
            distinct_labels: match pipeline {
                Pipeline::Objects => Some(shared.events.distinct_labels().len()),
                Pipeline::Motion => None,
            },
            duration,
        };
        log::info!(
            "batch scan finished: {} events in {frames_sampled} samples",
            report.events
        );
        Ok(report)
    }
}
