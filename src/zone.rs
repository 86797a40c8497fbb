//! Region-of-interest geometry.
//!
//! Two coordinate spaces are in play:
//! - **source space**: integer pixel coordinates of the decoded frame. `Zone` lives here.
//! - **display space**: fractional coordinates of whatever surface presents the video.
//!   `BoundingBox` and every box handed to presentation layers live here.
//!
//! `Scale` converts source boxes into display boxes, `ZoneDrag` goes the other way
//! for a zone drawn on the display.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Minimum side length (display pixels) of a drag that counts as a selection.
pub const MIN_SELECTION_PX: f64 = 10.0;

/// Axis-aligned rectangle in source-frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Zone {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Zone {
    /// Build a finalized zone. Zero-sized zones are rejected.
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("zone must have a non-zero size, got {width}x{height}"));
        }
        Ok(Self {
            x,
            y,
            width,
            height,
        })
    }

    /// Zone covering an entire `width` x `height` frame.
    pub fn full_frame(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    /// Exclusive right edge. Widened so oversized zones cannot overflow.
    pub fn right(&self) -> u64 {
        self.x as u64 + self.width as u64
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u64 {
        self.y as u64 + self.height as u64
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        (x as u64) >= self.x as u64
            && (x as u64) < self.right()
            && (y as u64) >= self.y as u64
            && (y as u64) < self.bottom()
    }

    /// True when `other` lies entirely inside this zone.
    pub fn encloses(&self, other: &Zone) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Parse `x,y,width,height`.
    pub fn parse(value: &str) -> Result<Self> {
        let parts: Vec<&str> = value.split(',').map(|part| part.trim()).collect();
        if parts.len() != 4 {
            return Err(anyhow!("zone must be x,y,width,height (got '{value}')"));
        }
        let mut numbers = [0u32; 4];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| anyhow!("zone component '{part}' is not a pixel count"))?;
        }
        Self::new(numbers[0], numbers[1], numbers[2], numbers[3])
    }
}

/// Axis-aligned rectangle in display coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// Tightest box enclosing every box in `boxes`, or `None` for an empty input.
    pub fn enclosing<I>(boxes: I) -> Option<Self>
    where
        I: IntoIterator<Item = BoundingBox>,
    {
        let mut iter = boxes.into_iter();
        let first = iter.next()?;
        let (mut x0, mut y0) = (first.x, first.y);
        let (mut x1, mut y1) = (first.x + first.width, first.y + first.height);
        for b in iter {
            x0 = x0.min(b.x);
            y0 = y0.min(b.y);
            x1 = x1.max(b.x + b.width);
            y1 = y1.max(b.y + b.height);
        }
        Some(Self {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        })
    }
}

/// Size of the display surface the overlay is drawn on.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DisplaySize {
    pub width: f64,
    pub height: f64,
}

impl DisplaySize {
    pub fn new(width: f64, height: f64) -> Result<Self> {
        if !(width.is_finite() && height.is_finite()) || width <= 0.0 || height <= 0.0 {
            return Err(anyhow!("display size must be positive, got {width}x{height}"));
        }
        Ok(Self { width, height })
    }
}

/// Per-axis ratio `display / source`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Scale {
    pub x: f64,
    pub y: f64,
}

impl Scale {
    pub fn identity() -> Self {
        Self { x: 1.0, y: 1.0 }
    }

    /// Scale from a `source_width` x `source_height` frame onto `display`.
    ///
    /// Without a display size, or for a degenerate source, boxes pass through unscaled.
    pub fn between(source_width: u32, source_height: u32, display: Option<DisplaySize>) -> Self {
        match display {
            Some(display) if source_width > 0 && source_height > 0 => Self {
                x: display.width / source_width as f64,
                y: display.height / source_height as f64,
            },
            _ => Self::identity(),
        }
    }

    pub fn zone(&self, zone: &Zone) -> BoundingBox {
        BoundingBox {
            x: zone.x as f64 * self.x,
            y: zone.y as f64 * self.y,
            width: zone.width as f64 * self.x,
            height: zone.height as f64 * self.y,
        }
    }
}

/// Point in display coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// In-progress zone selection drawn on the display.
///
/// The drag can run in any direction. `finish` converts it to source space and
/// discards selections smaller than `MIN_SELECTION_PX` on either side.
#[derive(Clone, Debug)]
pub struct ZoneDrag {
    start: Point,
    current: Point,
    source_width: u32,
    source_height: u32,
    display: DisplaySize,
}

impl ZoneDrag {
    pub fn begin(start: Point, source_width: u32, source_height: u32, display: DisplaySize) -> Self {
        Self {
            start,
            current: start,
            source_width,
            source_height,
            display,
        }
    }

    pub fn update(&mut self, point: Point) {
        self.current = point;
    }

    /// Rectangle currently covered by the drag, for drawing the rubber band.
    pub fn preview(&self) -> BoundingBox {
        let x0 = self.start.x.min(self.current.x);
        let y0 = self.start.y.min(self.current.y);
        BoundingBox {
            x: x0,
            y: y0,
            width: (self.start.x - self.current.x).abs(),
            height: (self.start.y - self.current.y).abs(),
        }
    }

    /// Finalize the drag. Returns `None` for a non-selection.
    pub fn finish(self) -> Option<Zone> {
        let preview = self.preview();
        if preview.width < MIN_SELECTION_PX || preview.height < MIN_SELECTION_PX {
            log::debug!(
                "zone drag {:.0}x{:.0} below minimum selection, discarded",
                preview.width,
                preview.height
            );
            return None;
        }

        let to_source_x = self.source_width as f64 / self.display.width;
        let to_source_y = self.source_height as f64 / self.display.height;
        let clamp_x = |v: f64| (v * to_source_x).round().clamp(0.0, self.source_width as f64);
        let clamp_y = |v: f64| (v * to_source_y).round().clamp(0.0, self.source_height as f64);

        let x0 = clamp_x(preview.x);
        let y0 = clamp_y(preview.y);
        let x1 = clamp_x(preview.x + preview.width);
        let y1 = clamp_y(preview.y + preview.height);

        Zone::new(x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32).ok()
    }
}
