//! Frame-differencing motion detection.
//!
//! A pixel is "changed" when the mean absolute difference of its red, green and blue
//! channels strictly exceeds the sensitivity threshold. Alpha is ignored.
//!
//! `has_movement` counts changed pixels and compares the count against the movement
//! threshold. `extract_bounding_box` returns the tight envelope of all changed pixels
//! in a zone; the movement threshold never gates it. `scan_changes` fuses both passes.
//!
//! Zone pixels that fall outside the frame are skipped. Both frames are expected to
//! share dimensions; mismatched buffers give meaningless answers but never panic.

use crate::frame::{Frame, BYTES_PER_PIXEL};
use crate::zone::Zone;
use crate::Thresholds;

/// Result of one fused diff pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChangeSummary {
    pub changed_pixels: u64,
    /// Envelope of changed pixels. Always `None` for a whole-frame scan.
    pub envelope: Option<Zone>,
}

/// True when more than `movement_threshold` pixels in `zone` changed between frames.
pub fn has_movement(
    prev: &Frame,
    curr: &Frame,
    zone: Option<&Zone>,
    sensitivity: u32,
    movement_threshold: u32,
) -> bool {
    let mut changed: u64 = 0;
    for_each_changed(prev, curr, zone, sensitivity, |_, _| changed += 1);
    changed > movement_threshold as u64
}

/// Tight bounding box of every changed pixel in `zone`.
///
/// Returns `None` without a zone, or when nothing in the zone changed. The box spans
/// from the minimum to the maximum changed coordinate, so a single changed pixel
/// yields a zero-sized box.
pub fn extract_bounding_box(
    prev: &Frame,
    curr: &Frame,
    zone: Option<&Zone>,
    sensitivity: u32,
) -> Option<Zone> {
    let zone = zone?;
    let mut envelope = Envelope::default();
    for_each_changed(prev, curr, Some(zone), sensitivity, |x, y| {
        envelope.include(x, y)
    });
    envelope.into_zone()
}

/// Count changed pixels and track their envelope in a single pass.
pub fn scan_changes(
    prev: &Frame,
    curr: &Frame,
    zone: Option<&Zone>,
    sensitivity: u32,
) -> ChangeSummary {
    let mut changed_pixels = 0u64;
    let mut envelope = Envelope::default();
    for_each_changed(prev, curr, zone, sensitivity, |x, y| {
        changed_pixels += 1;
        envelope.include(x, y);
    });
    ChangeSummary {
        changed_pixels,
        envelope: zone.and(envelope.into_zone()),
    }
}

#[derive(Default)]
struct Envelope {
    bounds: Option<(u32, u32, u32, u32)>,
}

impl Envelope {
    fn include(&mut self, x: u32, y: u32) {
        self.bounds = Some(match self.bounds {
            None => (x, y, x, y),
            Some((min_x, min_y, max_x, max_y)) => {
                (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
            }
        });
    }

    fn into_zone(self) -> Option<Zone> {
        self.bounds.map(|(min_x, min_y, max_x, max_y)| Zone {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        })
    }
}

fn for_each_changed<F>(
    prev: &Frame,
    curr: &Frame,
    zone: Option<&Zone>,
    sensitivity: u32,
    mut f: F,
) where
    F: FnMut(u32, u32),
{
    let width = prev.width as u64;
    let height = prev.height as u64;
    let region = zone.copied().unwrap_or_else(|| Zone::full_frame(prev.width, prev.height));

    // Clip to the frame; out-of-frame zone pixels are skipped, not wrapped.
    let x_end = region.right().min(width);
    let y_end = region.bottom().min(height);
    let a = prev.pixels();
    let b = curr.pixels();
    // mean(|dr|, |dg|, |db|) > s  <=>  |dr| + |dg| + |db| > 3s
    let limit = sensitivity.saturating_mul(3);

    for y in region.y as u64..y_end {
        for x in region.x as u64..x_end {
            let offset = ((y * width + x) as usize) * BYTES_PER_PIXEL;
            let (Some(p), Some(c)) = (a.get(offset..offset + 3), b.get(offset..offset + 3)) else {
                continue;
            };
            let delta = p[0].abs_diff(c[0]) as u32
                + p[1].abs_diff(c[1]) as u32
                + p[2].abs_diff(c[2]) as u32;
            if delta > limit {
                f(x as u32, y as u32);
            }
        }
    }
}

// ----------------------------------------------------------------------------
// MotionDetector: stateful pairwise comparison
// ----------------------------------------------------------------------------

/// Compares each observed frame against the one observed before it.
#[derive(Default)]
pub struct MotionDetector {
    previous: Option<Frame>,
}

impl MotionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe the next sampled frame.
    ///
    /// Returns the movement box (source space) when movement is found inside `zone`
    /// against the previous frame. The first frame, and a frame whose size differs
    /// from its predecessor, only become the new reference.
    pub fn observe(&mut self, frame: Frame, zone: &Zone, thresholds: &Thresholds) -> Option<Zone> {
        let verdict = match self.previous.as_ref() {
            Some(prev) if prev.same_dimensions(&frame) => {
                let summary = scan_changes(prev, &frame, Some(zone), thresholds.sensitivity());
                if summary.changed_pixels > thresholds.movement() as u64 {
                    summary.envelope
                } else {
                    None
                }
            }
            Some(prev) => {
                log::debug!(
                    "frame size changed {}x{} -> {}x{}, resetting reference",
                    prev.width,
                    prev.height,
                    frame.width,
                    frame.height
                );
                None
            }
            None => None,
        };
        self.previous = Some(frame);
        verdict
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }

    pub fn has_reference(&self) -> bool {
        self.previous.is_some()
    }
}
