// src/motion/planner.rs - per-segment planning against the hanging-belt kinematics
use std::f64::consts::PI;

use crate::config::{MotionTuning, PlannerConfig, RigConfig, Speeds};
use crate::error::PlotterError;
use crate::motion::kinematics::Kinematics;
use crate::motion::stepper::{Axis, StepperEngine};
use crate::motion::Point;

const DIRECTION_EPSILON: f64 = 1e-6;

/// The motion aggregate: kinematics, step engine, planner knobs and the
/// per-segment pose/backlash state.
///
/// `begin_linear_travel` is the single entry point for committing a segment.
/// It shifts the target for backlash on direction flips (the safe-rectangle
/// clamp wins over the shift), solves the inverse kinematics, derives the
/// per-axis feeds so both belts land together, and scales the acceleration
/// down around corners.
#[derive(Debug)]
pub struct Motion {
    kinematics: Kinematics,
    engine: StepperEngine,
    planner: PlannerConfig,
    tuning: MotionTuning,
    speeds: Speeds,

    homed: bool,
    started_homing: bool,

    x: f64,
    y: f64,
    last_segment_dx: f64,
    last_segment_dy: f64,
    last_dir_x: i32,
    last_dir_y: i32,
}

impl Motion {
    pub fn new(
        rig: RigConfig,
        planner: PlannerConfig,
        tuning: MotionTuning,
        speeds: Speeds,
    ) -> Self {
        let top_distance = rig.top_distance_mm;
        let mut kinematics = Kinematics::new(rig);
        if top_distance > 0 {
            kinematics.set_top_distance(top_distance);
        }
        Self {
            kinematics,
            engine: StepperEngine::new(),
            planner: planner.clamped(),
            tuning: tuning.clamped(),
            speeds,
            homed: false,
            started_homing: false,
            x: -1.0,
            y: -1.0,
            last_segment_dx: 0.0,
            last_segment_dy: 0.0,
            last_dir_x: 0,
            last_dir_y: 0,
        }
    }

    // ---- configuration -------------------------------------------------

    pub fn set_planner_config(&mut self, cfg: PlannerConfig) {
        self.planner = cfg.clamped();
    }

    pub fn planner_config(&self) -> PlannerConfig {
        self.planner.clone()
    }

    pub fn set_motion_tuning(&mut self, infinite_steps: i64, acceleration: i64) {
        self.tuning = MotionTuning {
            infinite_steps,
            acceleration,
        }
        .clamped();
        tracing::info!(
            infinite_steps = self.tuning.infinite_steps,
            acceleration = self.tuning.acceleration,
            "tuning updated"
        );
    }

    pub fn motion_tuning(&self) -> MotionTuning {
        self.tuning
    }

    pub fn set_speeds(&mut self, print_steps: i32, move_steps: i32) -> Result<(), PlotterError> {
        if print_steps <= 0 || move_steps <= 0 {
            return Err(PlotterError::InvalidArgument(format!(
                "speeds must be positive, got print={print_steps} move={move_steps}"
            )));
        }
        self.speeds = Speeds {
            print_steps,
            move_steps,
        };
        tracing::info!(print_steps, move_steps, "speeds updated");
        Ok(())
    }

    pub fn speeds(&self) -> Speeds {
        self.speeds
    }

    pub fn set_pulse_widths(&mut self, left_us: u32, right_us: u32) {
        self.engine.set_pulse_widths(left_us, right_us);
    }

    pub fn set_enable_pins(&mut self, left_pin: i32, right_pin: i32) {
        self.engine.set_enable_pins(left_pin, right_pin);
    }

    pub fn rig(&self) -> &RigConfig {
        self.kinematics.rig()
    }

    pub fn steps_to_mm(&self, steps: i64) -> f64 {
        self.kinematics.rig().steps_to_mm(steps)
    }

    // ---- calibration & homing ------------------------------------------

    pub fn set_top_distance(&mut self, distance: i32) {
        self.kinematics.set_top_distance(distance);
    }

    /// Re-declare a calibrated, homed rig after a restart: the sled is
    /// assumed parked at the home pose, so the belt lengths for that pose are
    /// written straight into the engine.
    pub fn resume_top_distance(&mut self, distance: i32) {
        self.set_top_distance(distance);
        self.homed = true;

        let home = self.kinematics.home();
        self.x = home.x;
        self.y = home.y;
        self.last_segment_dx = 0.0;
        self.last_segment_dy = 0.0;
        self.last_dir_x = 0;
        self.last_dir_y = 0;

        let lengths = self.kinematics.belt_lengths(home.x, home.y);
        self.engine.set_current_position(Axis::Left, lengths.left);
        self.engine.set_current_position(Axis::Right, lengths.right);
    }

    pub fn top_distance(&self) -> i32 {
        self.kinematics.top_distance()
    }

    pub fn width(&self) -> Result<f64, PlotterError> {
        if !self.kinematics.is_calibrated() {
            return Err(PlotterError::NotReady("top distance not set"));
        }
        Ok(self.kinematics.width())
    }

    pub fn home_coordinates(&self) -> Point {
        self.kinematics.home()
    }

    fn set_origin(&mut self) {
        let offset = self
            .kinematics
            .rig()
            .mm_to_steps(self.kinematics.rig().homed_step_offset_mm);
        self.engine.set_current_position(Axis::Left, offset);
        self.engine.set_current_position(Axis::Right, offset);
        self.homed = true;
    }

    /// Declare the homed origin and travel to the parking pose. Returns the
    /// estimated move time in whole seconds.
    pub fn extend_to_home(&mut self) -> Result<u32, PlotterError> {
        self.set_origin();
        let home = self.kinematics.home();
        self.started_homing = true;
        let move_time =
            self.begin_linear_travel(home.x, home.y, self.speeds.move_steps)?;
        Ok(move_time.ceil() as u32)
    }

    /// Pay out a fixed metre of belt on both axes, used while threading the
    /// belts during rig assembly.
    pub fn extend_belts_1000mm(&mut self) {
        let steps = self.kinematics.rig().mm_to_steps(1000.0);
        let feed = self.speeds.move_steps as f64;
        self.engine.enable_outputs();
        self.engine.set_acceleration(self.tuning.acceleration as f64);
        let left = self.engine.current_position(Axis::Left) + steps;
        let right = self.engine.current_position(Axis::Right) + steps;
        self.engine.move_to(left, right, feed, feed, self.tuning.acceleration as f64);
    }

    /// Manual jog of one belt; `dir == 0` stops that belt.
    pub fn jog(&mut self, axis: Axis, dir: i32) {
        if dir == 0 {
            self.engine.set_acceleration(self.tuning.acceleration as f64);
        } else {
            self.engine.enable_outputs();
        }
        self.engine.jog(
            axis,
            dir,
            self.speeds.print_steps as f64,
            self.tuning.infinite_steps,
        );
    }

    pub fn disable_motors(&mut self) {
        self.engine.disable_outputs();
    }

    // ---- state ---------------------------------------------------------

    pub fn is_moving(&self) -> bool {
        self.engine.is_moving()
    }

    pub fn has_started_homing(&self) -> bool {
        self.started_homing
    }

    pub fn is_homed(&self) -> bool {
        self.homed
    }

    /// Settled pose. Errors while unknown or in motion.
    pub fn coordinates(&self) -> Result<Point, PlotterError> {
        if self.x == -1.0 || self.y == -1.0 {
            return Err(PlotterError::NotReady("position unknown"));
        }
        if self.is_moving() {
            return Err(PlotterError::NotReady("in motion"));
        }
        Ok(Point::new(self.x, self.y))
    }

    /// Best-effort pose, usable while moving.
    pub fn coordinates_live(&self) -> Point {
        if self.x == -1.0 || self.y == -1.0 {
            return Point::new(0.0, 0.0);
        }
        Point::new(self.x, self.y)
    }

    pub fn engine(&self) -> &StepperEngine {
        &self.engine
    }

    /// Larger of the two per-axis travel distances, in steps, for a
    /// prospective target. Used by the runner to translate mm/s planning
    /// back into step rates.
    pub fn estimate_max_delta_steps(&mut self, x: f64, y: f64) -> Result<i64, PlotterError> {
        if !self.kinematics.is_calibrated() || !self.homed {
            return Err(PlotterError::NotReady("not homed"));
        }
        let lengths = self.kinematics.belt_lengths(x, y);
        let delta_left = (self.engine.current_position(Axis::Left) - lengths.left).abs();
        let delta_right = (self.engine.current_position(Axis::Right) - lengths.right).abs();
        Ok(delta_left.max(delta_right))
    }

    // ---- segment commit ------------------------------------------------

    fn corner_factor(&self, dx: f64, dy: f64, cfg: &PlannerConfig) -> f64 {
        let len = (dx * dx + dy * dy).sqrt();
        let prev_len =
            (self.last_segment_dx * self.last_segment_dx + self.last_segment_dy * self.last_segment_dy)
                .sqrt();
        if len < DIRECTION_EPSILON || prev_len < DIRECTION_EPSILON {
            return 1.0;
        }

        let dot = ((dx * self.last_segment_dx + dy * self.last_segment_dy) / (len * prev_len))
            .clamp(-1.0, 1.0);
        let angle = dot.acos(); // 0 = straight, pi = reverse
        let sharpness = angle / PI;

        (1.0 - sharpness * cfg.corner_slowdown).clamp(cfg.min_corner_factor, 1.0)
    }

    /// Commit one segment: returns the expected move time in seconds
    /// (0 when the target resolves to the current belt lengths).
    pub fn begin_linear_travel(
        &mut self,
        x: f64,
        y: f64,
        speed_steps: i32,
    ) -> Result<f64, PlotterError> {
        if !self.kinematics.is_calibrated() || !self.homed {
            return Err(PlotterError::NotReady("not homed"));
        }
        let width = self.kinematics.width();
        if x < 0.0 || (x - 1.0) > width {
            return Err(PlotterError::InvalidArgument(format!(
                "x {x:.3} outside [0, {width:.3}]"
            )));
        }
        if y < 0.0 {
            return Err(PlotterError::InvalidArgument(format!(
                "y {y:.3} above the drawing surface"
            )));
        }
        if speed_steps <= 0 {
            return Err(PlotterError::InvalidArgument(format!(
                "speed {speed_steps} must be positive"
            )));
        }

        // config is re-read once per segment
        let cfg = self.planner.clone();

        let mut tx = x;
        let mut ty = y;
        let dx = tx - self.x;
        let dy = ty - self.y;
        let dir_x = if dx > DIRECTION_EPSILON {
            1
        } else if dx < -DIRECTION_EPSILON {
            -1
        } else {
            0
        };
        let dir_y = if dy > DIRECTION_EPSILON {
            1
        } else if dy < -DIRECTION_EPSILON {
            -1
        } else {
            0
        };

        // backlash take-up on direction flips; the bounds clamp wins
        if self.last_dir_x != 0 && dir_x != 0 && dir_x != self.last_dir_x {
            tx += dir_x as f64 * cfg.backlash_x_mm;
        }
        if self.last_dir_y != 0 && dir_y != 0 && dir_y != self.last_dir_y {
            ty += dir_y as f64 * cfg.backlash_y_mm;
        }
        tx = tx.clamp(0.0, width);
        ty = ty.max(0.0);

        let lengths = self.kinematics.belt_lengths(tx, ty);
        let delta_left = (self.engine.current_position(Axis::Left) - lengths.left).abs();
        let delta_right = (self.engine.current_position(Axis::Right) - lengths.right).abs();
        let max_delta = delta_left.max(delta_right);
        if max_delta == 0 {
            self.x = tx;
            self.y = ty;
            return Ok(0.0);
        }

        let corner_factor = self.corner_factor(dx, dy, &cfg);
        let mut target_speed = speed_steps as f64 * corner_factor;

        if cfg.min_segment_time_ms > 0 {
            let min_time_s = cfg.min_segment_time_ms as f64 / 1000.0;
            let max_allowed_by_time = max_delta as f64 / min_time_s;
            if target_speed > max_allowed_by_time {
                target_speed = max_allowed_by_time;
            }
        }
        if target_speed < 1.0 {
            target_speed = 1.0;
        }

        // approximate an S-curve by lowering the ramp around corners
        let accel_scale = (1.0 - (1.0 - corner_factor) * cfg.s_curve_factor).max(0.2);
        let local_accel = (self.tuning.acceleration as f64 * accel_scale).max(1.0);

        let move_time = max_delta as f64 / target_speed;
        let mut left_speed = if delta_left > 0 {
            delta_left as f64 / move_time
        } else {
            0.0
        };
        let mut right_speed = if delta_right > 0 {
            delta_right as f64 / move_time
        } else {
            0.0
        };
        if left_speed > 0.0 && left_speed < 1.0 {
            left_speed = 1.0;
        }
        if right_speed > 0.0 && right_speed < 1.0 {
            right_speed = 1.0;
        }

        self.engine.enable_outputs();
        self.engine
            .move_to(lengths.left, lengths.right, left_speed, right_speed, local_accel);

        self.x = tx;
        self.y = ty;
        self.last_segment_dx = dx;
        self.last_segment_dy = dy;
        self.last_dir_x = dir_x;
        self.last_dir_y = dir_y;

        Ok(move_time)
    }

    /// Advance the step engine by `dt` seconds.
    pub fn tick(&mut self, dt: f64) {
        self.engine.tick(dt);
    }
}
