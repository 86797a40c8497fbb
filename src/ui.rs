//! Terminal feedback for the command-line front end.
//!
//! Everything is drawn on stderr so stdout stays machine-readable JSON.

use std::io::IsTerminal;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::session::ScanPhase;
use crate::timeline::format_timestamp;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum UiStyle {
    /// Spinners and bars on an interactive terminal unless `NO_COLOR` is set.
    #[default]
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Copy, Debug)]
pub struct Ui {
    pretty: bool,
}

impl Ui {
    pub fn new(style: UiStyle, is_tty: bool, no_color: bool) -> Self {
        let pretty = is_tty
            && match style {
                UiStyle::Pretty => true,
                UiStyle::Auto => !no_color,
                UiStyle::Plain => false,
            };
        Self { pretty }
    }

    /// Resolve `style` against the real stderr and environment.
    pub fn for_stderr(style: UiStyle) -> Self {
        Self::new(
            style,
            std::io::stderr().is_terminal(),
            std::env::var_os("NO_COLOR").is_some(),
        )
    }

    /// Announce a stage; its duration is reported when the guard drops.
    pub fn stage(&self, name: &str) -> Stage {
        let spinner = self.pretty.then(|| {
            let spinner = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
            spinner.set_style(
                ProgressStyle::with_template("{spinner} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            spinner.enable_steady_tick(Duration::from_millis(120));
            spinner.set_message(name.to_string());
            spinner
        });
        if spinner.is_none() {
            eprintln!("==> {name}");
        }
        Stage {
            name: name.to_string(),
            started: Instant::now(),
            spinner,
        }
    }

    /// Progress bar over the video timeline for a batch scan.
    pub fn scan_progress(&self, duration: f64) -> ScanProgressBar {
        let bar = self.pretty.then(|| {
            let bar = ProgressBar::with_draw_target(
                Some(timeline_millis(duration)),
                ProgressDrawTarget::stderr(),
            );
            bar.set_style(
                ProgressStyle::with_template("{bar:30} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar
        });
        ScanProgressBar { bar, duration }
    }
}

pub struct Stage {
    name: String,
    started: Instant,
    spinner: Option<ProgressBar>,
}

impl Stage {
    fn summary(&self, elapsed: Duration) -> String {
        format!("{} done in {:.1?}", self.name, elapsed)
    }
}

impl Drop for Stage {
    fn drop(&mut self) {
        let summary = self.summary(self.started.elapsed());
        match &self.spinner {
            Some(spinner) => spinner.finish_with_message(summary),
            None => eprintln!("{summary}"),
        }
    }
}

pub struct ScanProgressBar {
    bar: Option<ProgressBar>,
    duration: f64,
}

impl ScanProgressBar {
    pub fn update(&self, phase: ScanPhase) {
        let Some(bar) = &self.bar else {
            return;
        };
        match phase {
            ScanPhase::Seeking(t) => bar.set_message(format!("seeking {}", format_timestamp(t))),
            ScanPhase::Sampling(t) => {
                bar.set_position(timeline_millis(t.min(self.duration)));
                bar.set_message(format!(
                    "sampling {} / {}",
                    format_timestamp(t),
                    format_timestamp(self.duration)
                ));
            }
            ScanPhase::Done => bar.finish_and_clear(),
        }
    }
}

fn timeline_millis(seconds: f64) -> u64 {
    if seconds.is_finite() {
        (seconds.max(0.0) * 1000.0) as u64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pretty_output_needs_a_terminal() {
        assert!(!Ui::new(UiStyle::Pretty, false, false).pretty);
        assert!(Ui::new(UiStyle::Pretty, true, true).pretty);
        assert!(!Ui::new(UiStyle::Auto, true, true).pretty);
        assert!(Ui::new(UiStyle::Auto, true, false).pretty);
        assert!(!Ui::new(UiStyle::Plain, true, false).pretty);
    }

    #[test]
    fn plain_progress_is_silent() {
        let progress = Ui::new(UiStyle::Plain, true, false).scan_progress(3.0);
        assert!(progress.bar.is_none());
        progress.update(ScanPhase::Sampling(1.0));
        progress.update(ScanPhase::Done);
    }

    #[test]
    fn stage_summary_names_the_stage() {
        let stage = Ui::new(UiStyle::Plain, false, false).stage("batch scan");
        assert_eq!(
            stage.summary(Duration::from_millis(1500)),
            "batch scan done in 1.5s"
        );
        assert_eq!(
            stage.summary(Duration::from_millis(250)),
            "batch scan done in 250.0ms"
        );
    }

    #[test]
    fn timeline_positions_are_whole_milliseconds() {
        assert_eq!(timeline_millis(2.5), 2500);
        assert_eq!(timeline_millis(-1.0), 0);
        assert_eq!(timeline_millis(f64::NAN), 0);
    }
}
