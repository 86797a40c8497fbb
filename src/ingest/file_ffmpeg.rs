//! Local video files decoded with FFmpeg.
//!
//! Frames are decoded on demand by a dedicated thread that owns the demuxer,
//! decoder and scaler. At most the presented frame and one lookahead frame are
//! held in memory. Sequential playback decodes forward; a jump backwards or far
//! ahead seeks the demuxer to the preceding keyframe and decodes up to the
//! target. Timestamps are measured from the stream's first presentation time.

use std::sync::mpsc;
use std::thread;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use ffmpeg_next as ffmpeg;
use tokio::sync::oneshot;

use super::file::FileConfig;
use super::source::{Playhead, VideoSource};
use crate::frame::{Surface, BYTES_PER_PIXEL};

/// Jumps further ahead than this seek instead of decoding every frame between.
const RESEEK_AHEAD_SECS: f64 = 2.0;

/// `AV_NOPTS_VALUE`: the stream does not report a start time.
const NO_PTS: i64 = i64::MIN;

enum Request {
    Seek {
        target: f64,
        reply: oneshot::Sender<Result<()>>,
    },
    Frame {
        at: f64,
        reply: mpsc::SyncSender<Result<Vec<u8>>>,
    },
}

struct StreamInfo {
    width: u32,
    height: u32,
    duration: f64,
}

pub(crate) struct FfmpegVideo {
    path: String,
    width: u32,
    height: u32,
    playhead: Playhead,
    requests: mpsc::Sender<Request>,
}

impl FfmpegVideo {
    pub(crate) fn open(config: &FileConfig) -> Result<Self> {
        let path = config.path.clone();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let (requests, inbox) = mpsc::channel::<Request>();

        thread::Builder::new()
            .name("zonewatch-ffmpeg".to_string())
            .spawn(move || {
                let mut stream = match StreamDecoder::open(&path) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(stream.info()));
                        stream
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                for request in inbox {
                    stream.handle(request);
                }
                log::debug!("ffmpeg decode thread for {path} finished");
            })
            .context("spawn ffmpeg decode thread")?;

        let info = ready_rx
            .recv()
            .map_err(|_| anyhow!("ffmpeg decode thread exited during open"))??;
        log::info!(
            "opened {} ({}x{}, {:.2}s)",
            config.path,
            info.width,
            info.height,
            info.duration
        );

        Ok(Self {
            path: config.path.clone(),
            width: info.width,
            height: info.height,
            playhead: Playhead::new(info.duration),
            requests,
        })
    }

    fn decode_thread_gone(&self) -> anyhow::Error {
        anyhow!("ffmpeg decode thread for {} is gone", self.path)
    }
}

#[async_trait]
impl VideoSource for FfmpegVideo {
    fn describe(&self) -> String {
        self.path.clone()
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
            return Err(anyhow!("cannot seek {} to {t}", self.path));
        }
        let target = self.playhead.jump(t);
        let (reply, settled) = oneshot::channel();
        self.requests
            .send(Request::Seek { target, reply })
            .map_err(|_| self.decode_thread_gone())?;
        settled.await.map_err(|_| self.decode_thread_gone())??;
        log::debug!("{} seeked to {target:.3}s", self.path);
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
        let (reply, frame) = mpsc::sync_channel(1);
        self.requests
            .send(Request::Frame {
                at: self.playhead.current_time(),
                reply,
            })
            .map_err(|_| self.decode_thread_gone())?;
        let rgba = frame.recv().map_err(|_| self.decode_thread_gone())??;

        let canvas = surface.canvas_mut();
        if canvas.len() != rgba.len() {
            return Err(anyhow!(
                "decoded frame is {} bytes, surface holds {}",
                rgba.len(),
                canvas.len()
            ));
        }
        canvas.copy_from_slice(&rgba);
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Decode thread
// ----------------------------------------------------------------------------

struct DecodedFrame {
    timestamp: f64,
    rgba: Vec<u8>,
}

struct StreamDecoder {
    path: String,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    time_base: f64,
    start_time: f64,
    duration: f64,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    /// Packets exhausted and the decoder flushed.
    drained: bool,
    /// Last position frames were requested for.
    position: f64,
    current: Option<DecodedFrame>,
    lookahead: Option<DecodedFrame>,
}

impl StreamDecoder {
    fn open(path: &str) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open '{path}' with ffmpeg"))?;
        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("'{path}' has no video track"))?;
        let stream_index = stream.index();
        let time_base = f64::from(stream.time_base());
        let start_time = match stream.start_time() {
            NO_PTS => 0.0,
            pts => pts as f64 * time_base,
        };
        let stream_duration = stream.duration();
        let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let container = input.duration();
        let duration = if container > 0 {
            container as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE)
        } else if stream_duration > 0 {
            stream_duration as f64 * time_base
        } else {
            return Err(anyhow!("'{path}' does not report a duration"));
        };

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGBA,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        Ok(Self {
            path: path.to_string(),
            input,
            stream_index,
            time_base,
            start_time,
            duration,
            decoder,
            scaler,
            drained: false,
            position: 0.0,
            current: None,
            lookahead: None,
        })
    }

    fn info(&self) -> StreamInfo {
        StreamInfo {
            width: self.decoder.width(),
            height: self.decoder.height(),
            duration: self.duration,
        }
    }

    fn handle(&mut self, request: Request) {
        match request {
            Request::Seek { target, reply } => {
                let _ = reply.send(self.seek(target));
            }
            Request::Frame { at, reply } => {
                let _ = reply.send(self.frame_at(at));
            }
        }
    }

    /// RGBA bytes of the latest frame at or before `t`.
    fn frame_at(&mut self, t: f64) -> Result<Vec<u8>> {
        let current = self.current.as_ref().map(|frame| frame.timestamp);
        if needs_reseek(self.position, current, t) {
            self.seek(t)?;
        } else {
            self.advance_to(t)?;
        }
        self.current
            .as_ref()
            .map(|frame| frame.rgba.clone())
            .ok_or_else(|| anyhow!("'{}' has no frame to present at {t:.3}s", self.path))
    }

    fn seek(&mut self, target: f64) -> Result<()> {
        let ts = ((target + self.start_time) * f64::from(ffmpeg::ffi::AV_TIME_BASE)) as i64;
        self.input
            .seek(ts, ..ts)
            .with_context(|| format!("seek '{}' to {target:.3}s", self.path))?;
        self.decoder.flush();
        self.drained = false;
        self.current = None;
        self.lookahead = None;
        self.advance_to(target)
    }

    /// Decode forward until the next frame would be later than `t`.
    fn advance_to(&mut self, t: f64) -> Result<()> {
        self.position = t;
        loop {
            if self.lookahead.is_none() {
                self.lookahead = self.next_frame()?;
            }
            match &self.lookahead {
                Some(next) if next.timestamp <= t + 1e-9 || self.current.is_none() => {
                    self.current = self.lookahead.take();
                }
                _ => return Ok(()),
            }
        }
    }

    fn next_frame(&mut self) -> Result<Option<DecodedFrame>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return self.convert(&decoded).map(Some);
            }
            if self.drained {
                return Ok(None);
            }
            let mut sent = false;
            for (stream, packet) in self.input.packets() {
                if stream.index() != self.stream_index {
                    continue;
                }
                self.decoder
                    .send_packet(&packet)
                    .context("send packet to ffmpeg decoder")?;
                sent = true;
                break;
            }
            if !sent {
                self.decoder.send_eof().context("flush ffmpeg decoder")?;
                self.drained = true;
            }
        }
    }

    fn convert(&mut self, decoded: &ffmpeg::frame::Video) -> Result<DecodedFrame> {
        let pts = decoded.timestamp().unwrap_or(0);
        let mut rgba = ffmpeg::frame::Video::empty();
        self.scaler
            .run(decoded, &mut rgba)
            .context("scale frame to RGBA")?;
        Ok(DecodedFrame {
            timestamp: stream_seconds(pts, self.time_base, self.start_time),
            rgba: frame_to_rgba(&rgba)?,
        })
    }
}

/// Presentation time of `pts` relative to the stream's first frame.
fn stream_seconds(pts: i64, time_base: f64, start_time: f64) -> f64 {
    (pts as f64 * time_base - start_time).max(0.0)
}

/// Whether presenting `t` needs a demuxer seek rather than decoding forward.
fn needs_reseek(position: f64, current: Option<f64>, t: f64) -> bool {
    match current {
        None => true,
        Some(shown) => t + 1e-9 < position || t - shown > RESEEK_AHEAD_SECS,
    }
}

fn frame_to_rgba(frame: &ffmpeg::frame::Video) -> Result<Vec<u8>> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let row_bytes = width * BYTES_PER_PIXEL;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        return data
            .get(..row_bytes * height)
            .map(<[u8]>::to_vec)
            .context("ffmpeg frame is shorter than its dimensions");
    }

    let mut pixels = Vec::with_capacity(row_bytes * height);
    for row in 0..height {
        let start = row * stride;
        pixels.extend_from_slice(
            data.get(start..start + row_bytes)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }
    Ok(pixels)
}
