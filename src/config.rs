//! Configuration: engine tuning (JSON) and application paths.
//!
//! Path priority: `--config-dir` CLI flag > `SCRUBLINE_CONFIG_DIR` env var >
//! platform config dir (`dirs-next`) > current directory.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::entities::FrameRate;

const APP_DIR: &str = "scrubline";
const CONFIG_ENV: &str = "SCRUBLINE_CONFIG_DIR";

/// Engine config file name inside the config dir
pub const CONFIG_FILE: &str = "scrubline.json";

/// How precisely a committed seek must land
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SeekPrecision {
    /// Decode forward from the keyframe until within `seek_tolerance_ms` of the target
    #[default]
    Exact,
    /// Accept the first frame after the decoder's keyframe seek
    Keyframe,
}

/// Engine tuning knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub seek_precision: SeekPrecision,
    /// Frames this far before the target still count as "landed"
    pub seek_tolerance_ms: i64,
    /// LRU capacity of the scrub preview cache (frames)
    pub preview_cache_frames: usize,
    /// Durations at or above this are treated as implausible metadata
    pub max_plausible_duration_ms: i64,
    /// Smoothing for the measured frame-rate fallback
    pub fps_ema_alpha: f64,
    /// PTS deltas needed before the measured rate is trusted
    pub fps_min_samples: u32,
    /// Nominal rate for image sequences
    pub fallback_sequence_fps: f64,
    /// Resume playback after a drag if it was playing before
    pub resume_after_scrub: bool,
    /// How long to wait for decode threads on close
    pub shutdown_timeout_ms: u64,
    /// Initial playback rate multiplier
    pub playback_rate: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seek_precision: SeekPrecision::Exact,
            seek_tolerance_ms: 20,
            preview_cache_frames: 64,
            max_plausible_duration_ms: 24 * 60 * 60 * 1000,
            fps_ema_alpha: 0.1,
            fps_min_samples: 3,
            fallback_sequence_fps: 24.0,
            resume_after_scrub: false,
            shutdown_timeout_ms: 500,
            playback_rate: 1.0,
        }
    }
}

impl EngineConfig {
    /// Load from JSON. Missing file gives defaults; a broken file is logged
    /// and ignored so a bad edit never prevents playback.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str::<EngineConfig>(&text) {
                Ok(cfg) => {
                    info!("Loaded engine config from {}", path.display());
                    cfg.sanitized()
                }
                Err(e) => {
                    warn!("Ignoring malformed config {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Clamp values into working ranges
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        self.seek_tolerance_ms = self.seek_tolerance_ms.max(0);
        self.preview_cache_frames = self.preview_cache_frames.max(1);
        if self.max_plausible_duration_ms <= 0 {
            self.max_plausible_duration_ms = defaults.max_plausible_duration_ms;
        }
        if !(self.fps_ema_alpha > 0.0 && self.fps_ema_alpha <= 1.0) {
            self.fps_ema_alpha = defaults.fps_ema_alpha;
        }
        self.fps_min_samples = self.fps_min_samples.max(1);
        if FrameRate::from_fps(self.fallback_sequence_fps).is_none() {
            self.fallback_sequence_fps = defaults.fallback_sequence_fps;
        }
        self.playback_rate = clamp_rate(self.playback_rate);
        self
    }

    /// Nominal image-sequence rate as a rational
    pub fn sequence_rate(&self) -> FrameRate {
        FrameRate::from_fps(self.fallback_sequence_fps).unwrap_or(FrameRate::FILM)
    }
}

/// Playback rate limits
pub const MIN_PLAYBACK_RATE: f64 = 0.1;
pub const MAX_PLAYBACK_RATE: f64 = 16.0;

pub fn clamp_rate(rate: f64) -> f64 {
    if rate.is_finite() {
        rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE)
    } else {
        1.0
    }
}

/// Resolved application directories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathConfig {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl PathConfig {
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = cli_dir {
            return Self::single(dir);
        }
        if let Ok(dir) = std::env::var(CONFIG_ENV)
            && !dir.is_empty()
        {
            return Self::single(PathBuf::from(dir));
        }

        let config_dir = dirs_next::config_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("."));
        let data_dir = dirs_next::data_local_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| config_dir.clone());
        Self { config_dir, data_dir }
    }

    fn single(dir: PathBuf) -> Self {
        Self {
            config_dir: dir.clone(),
            data_dir: dir,
        }
    }
}

/// Create config and data directories if missing
pub fn ensure_dirs(paths: &PathConfig) -> std::io::Result<()> {
    std::fs::create_dir_all(&paths.config_dir)?;
    std::fs::create_dir_all(&paths.data_dir)
}

pub fn config_file(name: &str, paths: &PathConfig) -> PathBuf {
    paths.config_dir.join(name)
}

pub fn data_file(name: &str, paths: &PathConfig) -> PathBuf {
    paths.data_dir.join(name)
}
