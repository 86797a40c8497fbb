//! Synthetic `stub://` video source.
//!
//! Pixels are produced by a scene painter closure evaluated at the presented frame
//! time, so tests can script exactly what changes and when. The playback clock is
//! `tokio::time::Instant`, which makes paused-time tests deterministic.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::source::{Playhead, VideoSource};
use crate::frame::{Surface, BYTES_PER_PIXEL};

/// Paints the RGBA value of pixel `(x, y)` at frame time `t` seconds.
pub type ScenePainter = Box<dyn Fn(f64, u32, u32) -> [u8; 4] + Send + Sync>;

const DEFAULT_FPS: f64 = 25.0;

struct SensorNoise {
    amplitude: u8,
    rng: StdRng,
}

impl SensorNoise {
    fn apply(&mut self, value: u8) -> u8 {
        let delta: i16 = self
            .rng
            .gen_range(-(self.amplitude as i16)..=self.amplitude as i16);
        (value as i16 + delta).clamp(0, 255) as u8
    }
}

pub struct SyntheticVideo {
    url: String,
    width: u32,
    height: u32,
    fps: f64,
    painter: ScenePainter,
    seek_latency: Duration,
    playhead: Playhead,
    noise: Option<SensorNoise>,
    seeks: u64,
}

impl SyntheticVideo {
    pub fn new<F>(url: &str, width: u32, height: u32, duration: f64, painter: F) -> Self
    where
        F: Fn(f64, u32, u32) -> [u8; 4] + Send + Sync + 'static,
    {
        Self {
            url: url.to_string(),
            width,
            height,
            fps: DEFAULT_FPS,
            painter: Box::new(painter),
            seek_latency: Duration::ZERO,
            playhead: Playhead::new(duration),
            noise: None,
            seeks: 0,
        }
    }

    /// Ten seconds of a bright figure walking left to right over a dark yard.
    ///
    /// The figure enters at 1 s; light sensor noise stays below the lowest
    /// sensitivity setting.
    pub fn demo_scene(url: &str) -> Self {
        Self::new(url, 320, 240, 10.0, |t, x, y| {
            if t >= 1.0 {
                let left = 20.0 + (t - 1.0) * 30.0;
                let (x, y) = (x as f64, y as f64);
                if x >= left && x < left + 16.0 && (100.0..132.0).contains(&y) {
                    return [235, 235, 235, 255];
                }
            }
            [40, 48, 40, 255]
        })
        .with_seek_latency(Duration::from_millis(15))
        .with_noise(2, 7)
    }

    pub fn with_fps(mut self, fps: f64) -> Self {
        if fps.is_finite() && fps > 0.0 {
            self.fps = fps;
        }
        self
    }

    /// Time a seek takes to settle.
    pub fn with_seek_latency(mut self, latency: Duration) -> Self {
        self.seek_latency = latency;
        self
    }

    /// Add uniform per-channel noise of `±amplitude`, reproducible from `seed`.
    pub fn with_noise(mut self, amplitude: u8, seed: u64) -> Self {
        self.noise = (amplitude > 0).then(|| SensorNoise {
            amplitude,
            rng: StdRng::seed_from_u64(seed),
        });
        self
    }

    /// Completed seeks since construction.
    pub fn seeks(&self) -> u64 {
        self.seeks
    }

    /// Timestamp of the frame on screen at playhead `t`.
    fn frame_time(&self, t: f64) -> f64 {
        let last = ((self.playhead.duration() * self.fps).ceil() - 1.0).max(0.0) / self.fps;
        ((t * self.fps + 1e-9).floor() / self.fps).clamp(0.0, last)
    }
}

#[async_trait]
impl VideoSource for SyntheticVideo {
    fn describe(&self) -> String {
        self.url.clone()
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn duration(&self) -> f64 {
        self.playhead.duration()
    }

    fn current_time(&self) -> f64 {
        self.playhead.current_time()
    }

    async fn seek(&mut self, t: f64) -> Result<()> {
        if !t.is_finite() {
            return Err(anyhow!("cannot seek {} to {t}", self.url));
        }
        if !self.seek_latency.is_zero() {
            tokio::time::sleep(self.seek_latency).await;
        }
        let target = self.playhead.jump(t);
        self.seeks += 1;
        log::debug!("{} seeked to {target:.3}s", self.url);
        Ok(())
    }

    fn play(&mut self) {
        self.playhead.play();
    }

    fn pause(&mut self) {
        self.playhead.pause();
    }

    fn is_paused(&self) -> bool {
        self.playhead.is_paused()
    }

    fn render(&mut self, surface: &mut Surface) -> Result<()> {
        if !surface.fits(self.width, self.height) {
            return Err(anyhow!(
                "surface is {}x{}, video is {}x{}",
                surface.width(),
                surface.height(),
                self.width,
                self.height
            ));
        }
        let t = self.frame_time(self.current_time());
        let width = self.width as usize;
        let canvas = surface.canvas_mut();
        for (i, px) in canvas.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
            let (x, y) = ((i % width) as u32, (i / width) as u32);
            let mut rgba = (self.painter)(t, x, y);
            if let Some(noise) = self.noise.as_mut() {
                for channel in &mut rgba[..3] {
                    *channel = noise.apply(*channel);
                }
            }
            px.copy_from_slice(&rgba);
        }
        Ok(())
    }
}
