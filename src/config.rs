// src/config.rs - rig geometry, planner knobs and host settings
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::PlotterError;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub rig: RigConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub tuning: MotionTuning,
    #[serde(default)]
    pub speeds: Speeds,
    #[serde(default)]
    pub pen: PenConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
}

/// Physical geometry of the hanging rig, fixed after calibration.
///
/// Distances are millimetres, masses kilograms. `top_distance_mm` is the only
/// field usually discovered at runtime (tape measure between the two wall
/// pulleys); everything else is a property of the printed sled.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RigConfig {
    /// Distance between the two wall pulleys. -1 until calibrated.
    pub top_distance_mm: i32,

    /// Belt drive: either a GT2 pulley (teeth x pitch) or a legacy round
    /// pulley (diameter x pi) sets the travel per motor rotation.
    pub use_gt2_pulley: bool,
    pub gt2_pitch_mm: f64,
    pub gt2_teeth: u32,
    pub legacy_diameter_mm: f64,
    pub steps_per_rotation: i64,

    /// Out-of-plane offset between the mid pulley and the wall.
    pub mid_pulley_to_wall_mm: f64,
    /// Belt length declared on both axes right after homing.
    pub homed_step_offset_mm: f64,
    /// Y of the parking pose below the top bar.
    pub home_y_offset_mm: f64,

    pub sled_mass_kg: f64,
    pub gravity: f64,
    /// Spacing between the sled's two belt pulleys (d_t).
    pub pulley_spacing_mm: f64,
    /// Pulley-to-pen offset on the sled (d_p).
    pub pen_offset_mm: f64,
    /// Centre-of-mass offset below the pulley line (d_m).
    pub mass_offset_mm: f64,
    pub belt_elongation_coefficient: f64,

    /// Fractions of `top_distance_mm` kept clear on each side / on top,
    /// defining the safe drawing rectangle.
    pub safe_x_fraction: f64,
    pub safe_y_fraction: f64,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            top_distance_mm: -1,
            use_gt2_pulley: false,
            gt2_pitch_mm: 2.0,
            gt2_teeth: 20,
            legacy_diameter_mm: 12.69,
            steps_per_rotation: 200 * 64,
            mid_pulley_to_wall_mm: 41.0,
            homed_step_offset_mm: 40.0,
            home_y_offset_mm: 340.0,
            sled_mass_kg: 1.5,
            gravity: 9.81,
            pulley_spacing_mm: 76.027,
            pen_offset_mm: 4.4866,
            mass_offset_mm: 10.0 + 4.4866,
            belt_elongation_coefficient: 0.0,
            safe_x_fraction: 0.2,
            safe_y_fraction: 0.2,
        }
    }
}

impl RigConfig {
    pub fn travel_per_rotation_mm(&self) -> f64 {
        if self.use_gt2_pulley {
            self.gt2_teeth as f64 * self.gt2_pitch_mm
        } else {
            self.legacy_diameter_mm * std::f64::consts::PI
        }
    }

    pub fn mm_to_steps(&self, mm: f64) -> i64 {
        ((mm / self.travel_per_rotation_mm()) * self.steps_per_rotation as f64) as i64
    }

    pub fn steps_to_mm(&self, steps: i64) -> f64 {
        (steps as f64 / self.steps_per_rotation as f64) * self.travel_per_rotation_mm()
    }
}

/// Tunable planner behaviour. Every setter clamps to the documented range,
/// so a `PlannerConfig` read back from the motion core is always in bounds.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Allowed chord error at corners, GRBL style.
    pub junction_deviation_mm: f64,
    /// Max buffered upcoming commands.
    pub lookahead_segments: i32,
    /// Lower bound on per-segment duration; suppresses speed spikes on
    /// bursts of tiny segments.
    pub min_segment_time_ms: i32,
    /// Weight of the angle-based corner slowdown.
    pub corner_slowdown: f64,
    /// Floor for the corner slowdown factor.
    pub min_corner_factor: f64,
    /// Unprotected segments shorter than this may be dropped.
    pub min_segment_len_mm: f64,
    /// Angle tolerance for merging three collinear moves.
    pub collinear_deg: f64,
    /// Compensation applied when an axis reverses direction.
    pub backlash_x_mm: f64,
    pub backlash_y_mm: f64,
    /// Extra acceleration dampening around corners (0 = off).
    pub s_curve_factor: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            junction_deviation_mm: 0.04,
            lookahead_segments: 48,
            min_segment_time_ms: 8,
            corner_slowdown: 0.8,
            min_corner_factor: 0.05,
            min_segment_len_mm: 0.05,
            collinear_deg: 1.0,
            backlash_x_mm: 0.0,
            backlash_y_mm: 0.0,
            s_curve_factor: 0.0,
        }
    }
}

impl PlannerConfig {
    /// Clamp every knob into its valid range.
    pub fn clamped(mut self) -> Self {
        self.junction_deviation_mm = self.junction_deviation_mm.clamp(0.001, 2.0);
        self.lookahead_segments = self.lookahead_segments.clamp(1, 128);
        self.min_segment_time_ms = self.min_segment_time_ms.clamp(0, 100);
        self.corner_slowdown = self.corner_slowdown.clamp(0.05, 1.0);
        self.min_corner_factor = self.min_corner_factor.clamp(0.05, 1.0);
        self.s_curve_factor = self.s_curve_factor.clamp(0.0, 1.0);
        self.min_segment_len_mm = self.min_segment_len_mm.max(0.0);
        self.backlash_x_mm = self.backlash_x_mm.max(0.0);
        self.backlash_y_mm = self.backlash_y_mm.max(0.0);
        self.collinear_deg = self.collinear_deg.clamp(0.1, 20.0);
        self
    }
}

/// Step-engine tuning: the relative travel used for "infinite" jog moves and
/// the acceleration ramp, both in steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MotionTuning {
    pub infinite_steps: i64,
    pub acceleration: i64,
}

impl Default for MotionTuning {
    fn default() -> Self {
        Self {
            infinite_steps: 999_999_999,
            acceleration: 999_999_999,
        }
    }
}

impl MotionTuning {
    pub fn clamped(mut self) -> Self {
        self.infinite_steps = self.infinite_steps.clamp(1_000, 2_000_000_000);
        self.acceleration = self.acceleration.clamp(1, 2_000_000_000);
        self
    }
}

/// Requested step rates while drawing (pen down) and while travelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Speeds {
    pub print_steps: i32,
    pub move_steps: i32,
}

impl Default for Speeds {
    fn default() -> Self {
        Self {
            print_steps: 1200,
            move_steps: 2000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PenConfig {
    pub up_angle: i32,
    pub down_angle: i32,
    pub slow_speed_deg_per_s: i32,
}

impl Default for PenConfig {
    fn default() -> Self {
        Self {
            up_angle: 20,
            down_angle: 60,
            slow_speed_deg_per_s: 80,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Extra delay after each pen transition, 0-500 ms.
    pub pen_settle_ms: u32,
    /// Command file consumed by `start()`.
    pub commands_path: PathBuf,
    /// Persisted key-value settings document.
    pub settings_path: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            pen_settle_ms: 50,
            commands_path: PathBuf::from("commands.txt"),
            settings_path: PathBuf::from("settings.json"),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config, PlotterError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| PlotterError::ResourceUnavailable(format!("{}: {e}", path.display())))?;
    let config: Config = toml::from_str(&contents)
        .map_err(|e| PlotterError::InvalidArgument(format!("{}: {e}", path.display())))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planner_config_clamps_to_ranges() {
        let cfg = PlannerConfig {
            junction_deviation_mm: 5.0,
            lookahead_segments: 0,
            min_segment_time_ms: 1_000,
            corner_slowdown: 0.0,
            min_corner_factor: 2.0,
            min_segment_len_mm: -1.0,
            collinear_deg: 90.0,
            backlash_x_mm: -0.5,
            backlash_y_mm: 0.2,
            s_curve_factor: 3.0,
        }
        .clamped();

        assert_eq!(cfg.junction_deviation_mm, 2.0);
        assert_eq!(cfg.lookahead_segments, 1);
        assert_eq!(cfg.min_segment_time_ms, 100);
        assert_eq!(cfg.corner_slowdown, 0.05);
        assert_eq!(cfg.min_corner_factor, 1.0);
        assert_eq!(cfg.min_segment_len_mm, 0.0);
        assert_eq!(cfg.collinear_deg, 20.0);
        assert_eq!(cfg.backlash_x_mm, 0.0);
        assert_eq!(cfg.backlash_y_mm, 0.2);
        assert_eq!(cfg.s_curve_factor, 1.0);
    }

    #[test]
    fn tuning_clamps_to_ranges() {
        let tuning = MotionTuning {
            infinite_steps: 1,
            acceleration: 0,
        }
        .clamped();
        assert_eq!(tuning.infinite_steps, 1_000);
        assert_eq!(tuning.acceleration, 1);
    }

    #[test]
    fn step_scale_matches_pulley_choice() {
        let rig = RigConfig::default();
        let legacy = rig.travel_per_rotation_mm();
        assert!((legacy - 12.69 * std::f64::consts::PI).abs() < 1e-12);

        let gt2 = RigConfig {
            use_gt2_pulley: true,
            ..RigConfig::default()
        };
        assert_eq!(gt2.travel_per_rotation_mm(), 40.0);

        // one full rotation round-trips through the step conversion
        let steps = rig.mm_to_steps(legacy);
        assert_eq!(steps, rig.steps_per_rotation);
        assert!((rig.steps_to_mm(steps) - legacy).abs() < 1e-9);
    }
}
