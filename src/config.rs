use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::ObjectFilter;
use crate::session::SessionSettings;
use crate::zone::{DisplaySize, Zone};
use crate::{Thresholds, DEDUP_WINDOW_SECS, SAMPLE_INTERVAL_SECS};

const DEFAULT_LIVE_TICK_HZ: u32 = 60;
const DEFAULT_MIN_SCORE: f32 = 0.5;
const MAX_LIVE_TICK_HZ: u32 = 240;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ZoneWatchConfigFile {
    thresholds: Option<ThresholdsConfigFile>,
    sampling: Option<SamplingConfigFile>,
    detector: Option<DetectorConfigFile>,
    zone: Option<ZoneConfigFile>,
    display: Option<DisplayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ThresholdsConfigFile {
    sensitivity: Option<u32>,
    movement: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct SamplingConfigFile {
    interval_secs: Option<f64>,
    dedup_window_secs: Option<f64>,
    live_tick_hz: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    model_path: Option<PathBuf>,
    person_only: Option<bool>,
    min_score: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct ZoneConfigFile {
    x: Option<u32>,
    y: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    required: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    width: Option<f64>,
    height: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ZoneWatchConfig {
    pub sensitivity: u32,
    pub movement_threshold: u32,
    pub sampling: SamplingSettings,
    pub detector: DetectorSettings,
    pub zone: Option<Zone>,
    pub zone_required: bool,
    pub display: Option<DisplaySize>,
}

#[derive(Debug, Clone)]
pub struct SamplingSettings {
    pub interval_secs: f64,
    pub dedup_window_secs: f64,
    pub live_tick_hz: u32,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub model_path: Option<PathBuf>,
    pub person_only: bool,
    pub min_score: f32,
}

impl ZoneWatchConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("ZONEWATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ZoneWatchConfigFile) -> Result<Self> {
        let defaults = Thresholds::default();
        let sensitivity = file
            .thresholds
            .as_ref()
            .and_then(|t| t.sensitivity)
            .unwrap_or(defaults.sensitivity());
        let movement_threshold = file
            .thresholds
            .as_ref()
            .and_then(|t| t.movement)
            .unwrap_or(defaults.movement());
        let sampling = SamplingSettings {
            interval_secs: file
                .sampling
                .as_ref()
                .and_then(|s| s.interval_secs)
                .unwrap_or(SAMPLE_INTERVAL_SECS),
            dedup_window_secs: file
                .sampling
                .as_ref()
                .and_then(|s| s.dedup_window_secs)
                .unwrap_or(DEDUP_WINDOW_SECS),
            live_tick_hz: file
                .sampling
                .as_ref()
                .and_then(|s| s.live_tick_hz)
                .unwrap_or(DEFAULT_LIVE_TICK_HZ),
        };
        let detector = DetectorSettings {
            model_path: file.detector.as_ref().and_then(|d| d.model_path.clone()),
            person_only: file
                .detector
                .as_ref()
                .and_then(|d| d.person_only)
                .unwrap_or(false),
            min_score: file
                .detector
                .as_ref()
                .and_then(|d| d.min_score)
                .unwrap_or(DEFAULT_MIN_SCORE),
        };
        let zone_required = file
            .zone
            .as_ref()
            .and_then(|z| z.required)
            .unwrap_or(false);
        let zone = match file.zone {
            Some(ZoneConfigFile {
                x,
                y,
                width: Some(width),
                height: Some(height),
                ..
            }) => Some(Zone::new(x.unwrap_or(0), y.unwrap_or(0), width, height)?),
            Some(ZoneConfigFile {
                width: None,
                height: None,
                ..
            })
            | None => None,
            Some(_) => return Err(anyhow!("zone needs both width and height")),
        };
        let display = match file.display {
            Some(DisplayConfigFile {
                width: Some(width),
                height: Some(height),
            }) => Some(DisplaySize::new(width, height)?),
            Some(DisplayConfigFile {
                width: None,
                height: None,
            })
            | None => None,
            Some(_) => return Err(anyhow!("display needs both width and height")),
        };
        Ok(Self {
            sensitivity,
            movement_threshold,
            sampling,
            detector,
            zone,
            zone_required,
            display,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var("ZONEWATCH_SENSITIVITY") {
            self.sensitivity = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("ZONEWATCH_SENSITIVITY must be an integer"))?;
        }
        if let Ok(value) = std::env::var("ZONEWATCH_MOVEMENT_THRESHOLD") {
            self.movement_threshold = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("ZONEWATCH_MOVEMENT_THRESHOLD must be an integer"))?;
        }
        if let Ok(value) = std::env::var("ZONEWATCH_PERSON_ONLY") {
            self.detector.person_only = parse_bool(&value)
                .ok_or_else(|| anyhow!("ZONEWATCH_PERSON_ONLY must be true or false"))?;
        }
        if let Ok(path) = std::env::var("ZONEWATCH_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.detector.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(zone) = std::env::var("ZONEWATCH_ZONE") {
            if !zone.trim().is_empty() {
                self.zone = Some(
                    Zone::parse(&zone).map_err(|e| anyhow!("ZONEWATCH_ZONE: {e}"))?,
                );
            }
        }
        if let Ok(hz) = std::env::var("ZONEWATCH_TICK_HZ") {
            self.sampling.live_tick_hz = hz
                .trim()
                .parse()
                .map_err(|_| anyhow!("ZONEWATCH_TICK_HZ must be an integer"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.thresholds()?;
        if !(self.sampling.interval_secs.is_finite() && self.sampling.interval_secs > 0.0) {
            return Err(anyhow!("sampling interval must be greater than zero"));
        }
        if !(self.sampling.dedup_window_secs.is_finite()
            && self.sampling.dedup_window_secs >= DEDUP_WINDOW_SECS)
        {
            return Err(anyhow!("dedup window must be at least {DEDUP_WINDOW_SECS}s"));
        }
        if self.sampling.live_tick_hz == 0 || self.sampling.live_tick_hz > MAX_LIVE_TICK_HZ {
            return Err(anyhow!(
                "live tick rate must be between 1 and {MAX_LIVE_TICK_HZ} Hz"
            ));
        }
        if !(0.0..=1.0).contains(&self.detector.min_score) {
            return Err(anyhow!("detector min_score must be within 0..=1"));
        }
        if self.zone_required && self.zone.is_none() {
            log::warn!("zone.required is set but no zone is configured; loops will refuse to start");
        }
        Ok(())
    }

    pub fn thresholds(&self) -> Result<Thresholds> {
        Thresholds::new(self.sensitivity, self.movement_threshold)
    }

    /// Session settings derived from this configuration.
    pub fn session_settings(&self) -> Result<SessionSettings> {
        Ok(SessionSettings {
            thresholds: self.thresholds()?,
            zone: self.zone,
            zone_required: self.zone_required,
            display: self.display,
            object_filter: ObjectFilter::from_person_toggle(self.detector.person_only),
            sample_interval: self.sampling.interval_secs,
            dedup_window: self.sampling.dedup_window_secs,
            live_tick_hz: self.sampling.live_tick_hz,
        })
    }
}

fn read_config_file(path: &Path) -> Result<ZoneWatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
