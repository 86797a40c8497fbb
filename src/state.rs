//! Detection mode state machine.
//!
//! `Idle -> BatchScanning -> Idle` and `Idle -> LiveDetecting -> Idle` are the only
//! transitions. Every live run gets a fresh generation number; a live loop keeps
//! running only while the shared state still names its generation, so a stopped
//! loop cannot commit results even if it is still finishing a detection.

use std::fmt;

use serde::Serialize;

use crate::error::SessionError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Mode {
    Idle,
    BatchScanning,
    LiveDetecting,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Idle => "idle",
            Mode::BatchScanning => "batch scan",
            Mode::LiveDetecting => "live detection",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug)]
pub struct DetectionState {
    mode: Mode,
    generation: u64,
}

impl DetectionState {
    pub fn new() -> Self {
        Self {
            mode: Mode::Idle,
            generation: 0,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Generation of the most recent live run.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn ensure_idle(&self) -> Result<(), SessionError> {
        match self.mode {
            Mode::Idle => Ok(()),
            busy => Err(SessionError::Busy(busy)),
        }
    }

    pub fn begin_batch(&mut self) -> Result<(), SessionError> {
        self.ensure_idle()?;
        self.mode = Mode::BatchScanning;
        Ok(())
    }

    pub fn finish_batch(&mut self) {
        if self.mode == Mode::BatchScanning {
            self.mode = Mode::Idle;
        }
    }

    /// Enter live detection and return the new run's generation.
    pub fn begin_live(&mut self) -> Result<u64, SessionError> {
        self.ensure_idle()?;
        self.generation += 1;
        self.mode = Mode::LiveDetecting;
        Ok(self.generation)
    }

    pub fn stop_live(&mut self) -> Result<u64, SessionError> {
        if self.mode != Mode::LiveDetecting {
            return Err(SessionError::NotRunning);
        }
        self.mode = Mode::Idle;
        Ok(self.generation)
    }

    /// True while the live run tagged `generation` is the active one.
    pub fn is_live(&self, generation: u64) -> bool {
        self.mode == Mode::LiveDetecting && self.generation == generation
    }
}

impl Default for DetectionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loops_are_mutually_exclusive() {
        let mut state = DetectionState::new();
        state.begin_batch().unwrap();
        assert!(matches!(
            state.begin_live(),
            Err(SessionError::Busy(Mode::BatchScanning))
        ));
        state.finish_batch();

        let generation = state.begin_live().unwrap();
        assert!(matches!(
            state.begin_batch(),
            Err(SessionError::Busy(Mode::LiveDetecting))
        ));
        assert!(state.is_live(generation));
    }

    #[test]
    fn stale_generation_is_not_live() {
        let mut state = DetectionState::new();
        let first = state.begin_live().unwrap();
        state.stop_live().unwrap();
        assert!(!state.is_live(first));

        let second = state.begin_live().unwrap();
        assert_ne!(first, second);
        assert!(!state.is_live(first));
        assert!(state.is_live(second));
    }

    #[test]
    fn stop_requires_running_loop() {
        let mut state = DetectionState::new();
        assert!(matches!(state.stop_live(), Err(SessionError::NotRunning)));
        state.begin_batch().unwrap();
        assert!(matches!(state.stop_live(), Err(SessionError::NotRunning)));
        assert_eq!(state.mode(), Mode::BatchScanning);
    }

    #[test]
    fn finish_batch_leaves_live_untouched() {
        let mut state = DetectionState::new();
        let generation = state.begin_live().unwrap();
        state.finish_batch();
        assert!(state.is_live(generation));
    }
}
