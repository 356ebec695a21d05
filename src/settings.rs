// src/settings.rs - persisted runtime settings, short keys
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{MotionTuning, PlannerConfig, Speeds};
use crate::error::PlotterError;

/// Everything the control surface can change at runtime and expects to
/// survive a power cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub planner: PlannerConfig,
    pub tuning: MotionTuning,
    pub speeds: Speeds,
    pub pen_settle_ms: u32,
    pub pen_up_angle: i32,
    pub pen_down_angle: i32,
}

impl Default for Settings {
    fn default() -> Self {
        let pen = crate::config::PenConfig::default();
        Self {
            planner: PlannerConfig::default(),
            tuning: MotionTuning::default(),
            speeds: Speeds::default(),
            pen_settle_ms: crate::config::RunnerConfig::default().pen_settle_ms,
            pen_up_angle: pen.up_angle,
            pen_down_angle: pen.down_angle,
        }
    }
}

/// On-disk shape. Keys stay short so they also fit key-value backends with
/// tight key budgets; unknown keys are ignored and missing keys fall back to
/// the defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct StoredSettings {
    #[serde(rename = "jd")]
    junction_deviation_mm: f64,
    #[serde(rename = "la")]
    lookahead_segments: i32,
    #[serde(rename = "mst")]
    min_segment_time_ms: i32,
    #[serde(rename = "cs")]
    corner_slowdown: f64,
    #[serde(rename = "mcf")]
    min_corner_factor: f64,
    #[serde(rename = "msl")]
    min_segment_len_mm: f64,
    #[serde(rename = "col")]
    collinear_deg: f64,
    #[serde(rename = "blx")]
    backlash_x_mm: f64,
    #[serde(rename = "bly")]
    backlash_y_mm: f64,
    #[serde(rename = "scf")]
    s_curve_factor: f64,
    #[serde(rename = "inf")]
    infinite_steps: i64,
    #[serde(rename = "acc")]
    acceleration: i64,
    #[serde(rename = "pspd")]
    print_speed: i32,
    #[serde(rename = "mspd")]
    move_speed: i32,
    #[serde(rename = "pset")]
    pen_settle_ms: u32,
    #[serde(rename = "pup")]
    pen_up_angle: i32,
    #[serde(rename = "pdn")]
    pen_down_angle: i32,
}

impl Default for StoredSettings {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for StoredSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            junction_deviation_mm: settings.planner.junction_deviation_mm,
            lookahead_segments: settings.planner.lookahead_segments,
            min_segment_time_ms: settings.planner.min_segment_time_ms,
            corner_slowdown: settings.planner.corner_slowdown,
            min_corner_factor: settings.planner.min_corner_factor,
            min_segment_len_mm: settings.planner.min_segment_len_mm,
            collinear_deg: settings.planner.collinear_deg,
            backlash_x_mm: settings.planner.backlash_x_mm,
            backlash_y_mm: settings.planner.backlash_y_mm,
            s_curve_factor: settings.planner.s_curve_factor,
            infinite_steps: settings.tuning.infinite_steps,
            acceleration: settings.tuning.acceleration,
            print_speed: settings.speeds.print_steps,
            move_speed: settings.speeds.move_steps,
            pen_settle_ms: settings.pen_settle_ms,
            pen_up_angle: settings.pen_up_angle,
            pen_down_angle: settings.pen_down_angle,
        }
    }
}

impl From<StoredSettings> for Settings {
    fn from(stored: StoredSettings) -> Self {
        Self {
            planner: PlannerConfig {
                junction_deviation_mm: stored.junction_deviation_mm,
                lookahead_segments: stored.lookahead_segments,
                min_segment_time_ms: stored.min_segment_time_ms,
                corner_slowdown: stored.corner_slowdown,
                min_corner_factor: stored.min_corner_factor,
                min_segment_len_mm: stored.min_segment_len_mm,
                collinear_deg: stored.collinear_deg,
                backlash_x_mm: stored.backlash_x_mm,
                backlash_y_mm: stored.backlash_y_mm,
                s_curve_factor: stored.s_curve_factor,
            },
            tuning: MotionTuning {
                infinite_steps: stored.infinite_steps,
                acceleration: stored.acceleration,
            },
            speeds: Speeds {
                print_steps: stored.print_speed,
                move_steps: stored.move_speed,
            },
            pen_settle_ms: stored.pen_settle_ms,
            pen_up_angle: stored.pen_up_angle,
            pen_down_angle: stored.pen_down_angle,
        }
    }
}

/// JSON-backed key-value settings document.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load persisted settings; a missing file yields the defaults.
    pub fn load(&self) -> Result<Settings, PlotterError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Settings::default()),
            Err(e) => {
                return Err(PlotterError::ResourceUnavailable(format!(
                    "{}: {e}",
                    self.path.display()
                )));
            }
        };
        let stored: StoredSettings = serde_json::from_str(&raw).map_err(|e| {
            PlotterError::ResourceUnavailable(format!("{}: {e}", self.path.display()))
        })?;
        Ok(stored.into())
    }

    /// Persist settings atomically (temp file, then rename).
    pub fn save(&self, settings: &Settings) -> Result<(), PlotterError> {
        let stored = StoredSettings::from(settings);
        let raw = serde_json::to_string_pretty(&stored)
            .map_err(|e| PlotterError::ResourceUnavailable(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, raw).map_err(|e| {
            PlotterError::ResourceUnavailable(format!("{}: {e}", tmp.display()))
        })?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            PlotterError::ResourceUnavailable(format!("{}: {e}", self.path.display()))
        })?;
        Ok(())
    }
}
