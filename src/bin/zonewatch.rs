//! zonewatch - review a video for movement or objects inside a zone

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use env_logger::Env;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use zonewatch::detect::{StubLoader, StubModel};
use zonewatch::ui::{Ui, UiStyle};
use zonewatch::{
    open_video, DetectorHandle, DisplaySize, FileConfig, MovementEvent, ObjectFilter, Pipeline,
    ScanReport, Session, Thresholds, Zone, ZoneWatchConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Terminal output style.
    #[arg(long, value_enum, env = "ZONEWATCH_UI", default_value_t = UiStyle::Auto)]
    ui: UiStyle,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sample the whole video every half second and print the event timeline.
    Scan(RunArgs),
    /// Play the video and detect on every display tick until stopped.
    Live {
        #[command(flatten)]
        run: RunArgs,
        /// Stop after this many seconds (default: run until Ctrl-C).
        #[arg(long)]
        seconds: Option<f64>,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Local video file or stub:// URL.
    #[arg(long, default_value = "stub://demo")]
    video: String,
    #[arg(long, value_enum, default_value_t = PipelineArg::Motion)]
    pipeline: PipelineArg,
    /// Per-pixel colour change threshold (5-50).
    #[arg(long)]
    sensitivity: Option<u32>,
    /// Changed-pixel count threshold (10-200, step 5).
    #[arg(long)]
    movement: Option<u32>,
    /// Region of interest as x,y,width,height in video pixels.
    #[arg(long)]
    zone: Option<String>,
    /// Only report people (object pipeline).
    #[arg(long)]
    person_only: bool,
    /// Display size as WIDTHxHEIGHT; boxes are reported in this space.
    #[arg(long)]
    display: Option<String>,
    /// ONNX detection model (requires the backend-tract feature).
    #[arg(long, env = "ZONEWATCH_MODEL_PATH")]
    model: Option<std::path::PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PipelineArg {
    Motion,
    Objects,
}

impl From<PipelineArg> for Pipeline {
    fn from(value: PipelineArg) -> Self {
        match value {
            PipelineArg::Motion => Pipeline::Motion,
            PipelineArg::Objects => Pipeline::Objects,
        }
    }
}

#[derive(Serialize)]
struct ScanOutput<'a> {
    report: &'a ScanReport,
    events: &'a [MovementEvent],
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let ui = Ui::for_stderr(cli.ui);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("build async runtime")?;
    runtime.block_on(run(cli.command, ui))
}

async fn run(command: Command, ui: Ui) -> Result<()> {
    match command {
        Command::Scan(args) => {
            let mut session = open_session(&args, &ui)?;
            let duration = session.video().map(|v| v.duration()).unwrap_or(0.0);
            let report = {
                let _stage = ui.stage("batch scan");
                let progress = ui.scan_progress(duration);
                session
                    .scan_with_progress(args.pipeline.into(), |phase| progress.update(phase))
                    .await?
            };
            let events = session.events();
            eprintln!(
                "found {} events in {} samples{}",
                report.events,
                report.frames_sampled,
                report
                    .distinct_labels
                    .map(|n| format!(" ({n} object types)"))
                    .unwrap_or_default()
            );
            println!(
                "{}",
                serde_json::to_string_pretty(&ScanOutput {
                    report: &report,
                    events: &events,
                })?
            );
        }
        Command::Live { run, seconds } => {
            let limit = match seconds {
                Some(secs) if secs.is_finite() && secs >= 0.0 => Some(Duration::from_secs_f64(secs)),
                Some(secs) => return Err(anyhow!("--seconds must be a non-negative number, got {secs}")),
                None => None,
            };
            let mut session = open_session(&run, &ui)?;
            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
            ctrlc::set_handler(move || {
                let _ = tx.send(());
            })
            .context("error setting Ctrl-C handler")?;

            session.start_live(run.pipeline.into()).await?;
            {
                let _stage = ui.stage("live detection");
                match limit {
                    Some(limit) => {
                        tokio::select! {
                            _ = rx.recv() => log::info!("interrupted, stopping live detection"),
                            _ = tokio::time::sleep(limit) => {}
                        }
                    }
                    None => {
                        log::info!("live detection running, press Ctrl-C to stop");
                        let _ = rx.recv().await;
                    }
                }
            }
            session.stop_live().await?;
            let events = session.events();
            eprintln!("logged {} events", events.len());
            println!("{}", serde_json::to_string_pretty(&events)?);
        }
    }
    Ok(())
}

fn open_session(args: &RunArgs, ui: &Ui) -> Result<Session> {
    let config = ZoneWatchConfig::load()?;
    let mut settings = config.session_settings()?;
    if args.sensitivity.is_some() || args.movement.is_some() {
        settings.thresholds = Thresholds::new(
            args.sensitivity.unwrap_or(settings.thresholds.sensitivity()),
            args.movement.unwrap_or(settings.thresholds.movement()),
        )?;
    }
    if let Some(zone) = args.zone.as_deref() {
        settings.zone = Some(Zone::parse(zone)?);
    }
    if args.person_only {
        settings.object_filter = ObjectFilter::person_only();
    }
    if let Some(display) = args.display.as_deref() {
        settings.display = Some(parse_display(display)?);
    }

    let video = {
        let _stage = ui.stage("open video");
        open_video(&FileConfig::new(&args.video))?
    };
    let model_path = args.model.clone().or(config.detector.model_path.clone());
    let detector = Arc::new(build_detector(model_path, config.detector.min_score)?);

    let mut session = Session::new(settings).with_detector(detector);
    session.load_video(video)?;
    Ok(session)
}

#[cfg(feature = "backend-tract")]
fn build_detector(model_path: Option<std::path::PathBuf>, min_score: f32) -> Result<DetectorHandle> {
    Ok(match model_path {
        Some(path) => DetectorHandle::new(
            zonewatch::detect::backends::TractLoader::new(path).with_min_score(min_score),
        ),
        None => DetectorHandle::new(StubLoader::new(StubModel::bright_regions("person"))),
    })
}

#[cfg(not(feature = "backend-tract"))]
fn build_detector(model_path: Option<std::path::PathBuf>, _min_score: f32) -> Result<DetectorHandle> {
    if let Some(path) = model_path {
        return Err(anyhow!(
            "model {} requires the backend-tract feature",
            path.display()
        ));
    }
    Ok(DetectorHandle::new(StubLoader::new(
        StubModel::bright_regions("person"),
    )))
}

fn parse_display(value: &str) -> Result<DisplaySize> {
    let (w, h) = value
        .split_once(|c: char| c.eq_ignore_ascii_case(&'x'))
        .ok_or_else(|| anyhow!("display must be WIDTHxHEIGHT (got '{value}')"))?;
    let width: f64 = w.trim().parse().context("display width")?;
    let height: f64 = h.trim().parse().context("display height")?;
    DisplaySize::new(width, height)
}
