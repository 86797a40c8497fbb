//! Decoded frames and the off-screen raster surface they are captured from.
//!
//! - `Frame`: immutable RGBA snapshot of the video at one instant. Bytes are read-only.
//! - `Surface`: reusable off-screen raster. A video source draws into it, the sampling
//!   step snapshots it into a `Frame`. One surface is owned by whichever control loop
//!   is active; it is never reallocated between samples.

use anyhow::{anyhow, Result};

use crate::error::SessionError;

/// Interleaved red, green, blue, alpha.
pub const BYTES_PER_PIXEL: usize = 4;

/// Largest side length a surface may be acquired with.
pub const MAX_SURFACE_DIM: u32 = 16_384;

// ----------------------------------------------------------------------------
// Frame: immutable RGBA raster
// ----------------------------------------------------------------------------

/// Decoded raster image, row-major, top-left origin.
///
/// There is no mutable accessor and no `Clone`: a frame is produced by one sampling
/// step, handed to a detector, then dropped when the next sample supersedes it.
pub struct Frame {
    /// Private pixel data, `width * height * 4` bytes.
    data: Vec<u8>,

    pub width: u32,
    pub height: u32,
}

impl Frame {
    /// Wrap an RGBA buffer. The buffer length must match the dimensions exactly.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = rgba_len(width, height)
            .ok_or_else(|| anyhow!("frame dimensions {width}x{height} overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "expected {} RGBA bytes for {}x{}, received {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Build a frame by evaluating `pixel(x, y)` for every position.
    pub fn from_fn<F>(width: u32, height: u32, mut pixel: F) -> Self
    where
        F: FnMut(u32, u32) -> [u8; 4],
    {
        let mut data = Vec::with_capacity(rgba_len(width, height).unwrap_or(0));
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&pixel(x, y));
            }
        }
        Self {
            data,
            width,
            height,
        }
    }

    /// Uniformly colored frame.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self::from_fn(width, height, |_, _| rgba)
    }

    /// Read-only view of the RGBA bytes.
    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// RGBA value at `(x, y)`, or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        let px = self.data.get(offset..offset + BYTES_PER_PIXEL)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    pub fn same_dimensions(&self, other: &Frame) -> bool {
        self.width == other.width && self.height == other.height
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Pixel content stays out of logs.
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Surface: reusable off-screen raster
// ----------------------------------------------------------------------------

/// Off-screen raster a video source renders into.
///
/// The backing buffer is allocated once at `acquire`. `snapshot` copies it out into a
/// fresh `Frame`, so a captured frame never changes when the surface is redrawn.
pub struct Surface {
    data: Vec<u8>,
    width: u32,
    height: u32,
    snapshots: u64,
}

impl Surface {
    /// Acquire a surface for `width` x `height` frames.
    ///
    /// Fails when the video has not reported usable dimensions yet.
    pub fn acquire(width: u32, height: u32) -> std::result::Result<Self, SessionError> {
        if width == 0 || height == 0 {
            return Err(SessionError::SurfaceUnavailable(format!(
                "video reports empty dimensions {width}x{height}"
            )));
        }
        if width > MAX_SURFACE_DIM || height > MAX_SURFACE_DIM {
            return Err(SessionError::SurfaceUnavailable(format!(
                "{width}x{height} exceeds the {MAX_SURFACE_DIM}px surface limit"
            )));
        }
        let len = rgba_len(width, height).ok_or_else(|| {
            SessionError::SurfaceUnavailable(format!("{width}x{height} overflows"))
        })?;
        log::debug!("acquired {width}x{height} raster surface");
        Ok(Self {
            data: vec![0; len],
            width,
            height,
            snapshots: 0,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn fits(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }

    /// Writable RGBA canvas for video sources to draw the presented frame into.
    pub fn canvas_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Copy the current canvas into an immutable frame.
    pub fn snapshot(&mut self) -> Frame {
        self.snapshots += 1;
        Frame {
            data: self.data.clone(),
            width: self.width,
            height: self.height,
        }
    }

    /// Number of frames captured from this surface.
    pub fn snapshots_taken(&self) -> u64 {
        self.snapshots
    }
}

fn rgba_len(width: u32, height: u32) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(BYTES_PER_PIXEL))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
