//! Unbounded live loop.
//!
//! `Stopped -> Running -> Stopped`. One sample per display tick while the video
//! plays. The loop re-reads the session state at every tick and again after each
//! detection: once its generation is no longer live it exits, and a result that
//! was still in flight is dropped instead of committed. Stopping never pauses the
//! video and leaves the event log intact.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::pipeline::FrameAnalyzer;
use super::{lock, Media, SharedState};
use crate::overlay::CurrentDetection;
use crate::zone::Scale;

/// A spawned live loop. The task hands the media back when it ends.
pub(super) struct LiveHandle {
    pub(super) generation: u64,
    pub(super) stop: Arc<Notify>,
    pub(super) task: JoinHandle<Media>,
}

pub(super) struct LiveRun {
    pub(super) media: Media,
    pub(super) analyzer: FrameAnalyzer,
    pub(super) shared: SharedState,
    pub(super) generation: u64,
    pub(super) stop: Arc<Notify>,
    pub(super) tick: Duration,
    pub(super) dedup_window: f64,
    pub(super) scale: Scale,
}

impl LiveRun {
    pub(super) async fn run(mut self) -> Media {
        let Media { video, surface } = &mut self.media;
        video.play();
        log::info!(
            "live detection #{} on {} every {:?}",
            self.generation,
            video.describe(),
            self.tick
        );

        let mut ticks = tokio::time::interval(self.tick);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = self.stop.notified() => break,
                _ = ticks.tick() => {}
            }

            let tunables = {
                let shared = lock(&self.shared);
                if !shared.state.is_live(self.generation) {
                    break;
                }
                shared.tunables.clone()
            };

            if let Err(err) = video.render(surface) {
                log::error!("live detection stopped, video failed: {err:#}");
                let mut shared = lock(&self.shared);
                if shared.state.is_live(self.generation) {
                    let _ = shared.state.stop_live();
                    shared.current = CurrentDetection::None;
                }
                break;
            }
            let frame = surface.snapshot();
            let timestamp = video.current_time();
            log::trace!("live tick at {timestamp:.3}s");

            let found = self.analyzer.analyze(frame, timestamp, &tunables, self.scale).await;

            let mut shared = lock(&self.shared);
            if !shared.state.is_live(self.generation) {
                log::debug!("discarding detection at {timestamp:.3}s from stopped loop");
                break;
            }
            shared.current = CurrentDetection::from_event(found.as_ref());
            if let Some(event) = found {
                shared.events.push_deduplicated(event, self.dedup_window);
            }
        }

        log::info!("live detection #{} ended", self.generation);
        self.media
    }
}
