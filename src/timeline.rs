//! Event timeline.
//!
//! Batch scans append in sampling order, so the log stays sorted by timestamp.
//! Live detection appends through `push_deduplicated`, which keeps every pair of
//! logged events at least one dedup window apart.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::MovementEvent;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EventLog {
    events: Vec<MovementEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: MovementEvent) {
        self.events.push(event);
    }

    /// Append unless an existing event lies strictly within `window` seconds.
    /// Returns whether the event was logged.
    pub fn push_deduplicated(&mut self, event: MovementEvent, window: f64) -> bool {
        if self.has_event_near(event.timestamp, window) {
            log::trace!("dropping event at {:.3}s, already logged nearby", event.timestamp);
            return false;
        }
        self.events.push(event);
        true
    }

    pub fn has_event_near(&self, timestamp: f64, window: f64) -> bool {
        self.events
            .iter()
            .any(|e| (e.timestamp - timestamp).abs() < window)
    }

    /// First event whose `[timestamp, timestamp + window]` span covers `t`.
    pub fn event_at(&self, t: f64, window: f64) -> Option<&MovementEvent> {
        self.events
            .iter()
            .find(|e| t >= e.timestamp && t <= e.timestamp + window)
    }

    pub fn events(&self) -> &[MovementEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Every object label seen across the log.
    pub fn distinct_labels(&self) -> BTreeSet<String> {
        self.events
            .iter()
            .flat_map(MovementEvent::labels)
            .map(str::to_string)
            .collect()
    }

    /// Marker positions along a timeline bar, as percentages of `duration`.
    pub fn markers(&self, duration: f64) -> Vec<f64> {
        if !(duration > 0.0) {
            return Vec::new();
        }
        self.events
            .iter()
            .map(|e| (e.timestamp / duration * 100.0).clamp(0.0, 100.0))
            .collect()
    }
}

/// `mm:ss`, truncating fractional seconds.
pub fn format_timestamp(seconds: f64) -> String {
    let total = if seconds.is_finite() {
        seconds.max(0.0).floor() as u64
    } else {
        0
    };
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// Seek target for a click at `fraction` (0..=1) of the timeline width.
pub fn seek_time_for_click(fraction: f64, duration: f64) -> f64 {
    if !fraction.is_finite() || !duration.is_finite() {
        return 0.0;
    }
    fraction.clamp(0.0, 1.0) * duration.max(0.0)
}
