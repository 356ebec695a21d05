// src/motion/stepper.rs - two-axis synchronized step generation
/// The two belt motors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Left,
    Right,
}

/// Step rate floor so a commanded axis always makes forward progress.
const MIN_STEP_RATE: f64 = 1.0;

#[derive(Debug, Clone, Default)]
struct AxisChannel {
    /// Steps from the declared origin; fractional while a move is in flight.
    position: f64,
    target: i64,
    /// Commanded ceiling for the current profile, steps/s.
    feed: f64,
    /// Current rate magnitude, steps/s.
    speed: f64,
}

impl AxisChannel {
    fn distance_to_go(&self) -> i64 {
        self.target - self.position.round() as i64
    }

    /// Advance one tick of a trapezoidal profile: ramp toward `feed`, start
    /// ramping down once the remaining distance equals the stopping distance,
    /// snap onto the target when the next advance would cross it.
    fn advance(&mut self, accel: f64, dt: f64) {
        let togo = self.target as f64 - self.position;
        if togo.abs() < 0.5 {
            self.position = self.target as f64;
            self.speed = 0.0;
            return;
        }

        let dir = if togo >= 0.0 { 1.0 } else { -1.0 };
        let dist = togo.abs();
        let stopping = (self.speed * self.speed) / (2.0 * accel);
        if dist <= stopping {
            self.speed = (self.speed - accel * dt).max(MIN_STEP_RATE);
        } else {
            self.speed = (self.speed + accel * dt).min(self.feed.max(MIN_STEP_RATE));
        }

        let advance = self.speed * dt;
        if advance >= dist {
            self.position = self.target as f64;
            self.speed = 0.0;
        } else {
            self.position += dir * advance;
        }
    }

    fn halt_target(&mut self, accel: f64) {
        let togo = self.target as f64 - self.position;
        if togo == 0.0 || self.speed == 0.0 {
            self.target = self.position.round() as i64;
            return;
        }
        let dir = if togo >= 0.0 { 1.0 } else { -1.0 };
        let stopping = (self.speed * self.speed) / (2.0 * accel);
        let remaining = togo.abs().min(stopping.ceil());
        self.target = (self.position + dir * remaining).round() as i64;
    }
}

/// Free-running two-axis step engine.
///
/// Both axes are driven toward absolute step targets with a shared
/// acceleration and independent feed ceilings; the caller pre-scales the two
/// feeds so the axes finish together. `tick(dt)` advances the profiles, which
/// keeps the engine deterministic and host-testable; the pulse rate never
/// exceeds the commanded feed and `is_moving()` goes false only once both
/// axes have zero distance to go.
#[derive(Debug)]
pub struct StepperEngine {
    left: AxisChannel,
    right: AxisChannel,
    accel: f64,
    outputs_enabled: bool,
    enable_pins: (i32, i32),
    pulse_widths_us: (u32, u32),
}

impl Default for StepperEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StepperEngine {
    pub fn new() -> Self {
        Self {
            left: AxisChannel::default(),
            right: AxisChannel::default(),
            accel: 999_999_999.0,
            outputs_enabled: false,
            enable_pins: (-1, -1),
            pulse_widths_us: (10, 10),
        }
    }

    fn axis(&self, axis: Axis) -> &AxisChannel {
        match axis {
            Axis::Left => &self.left,
            Axis::Right => &self.right,
        }
    }

    fn axis_mut(&mut self, axis: Axis) -> &mut AxisChannel {
        match axis {
            Axis::Left => &mut self.left,
            Axis::Right => &mut self.right,
        }
    }

    /// Begin or replace the current profile. Feeds are steps/s, acceleration
    /// steps/s^2; both targets are committed in the same call.
    pub fn move_to(
        &mut self,
        left_target: i64,
        right_target: i64,
        feed_left: f64,
        feed_right: f64,
        accel: f64,
    ) {
        self.accel = accel.max(1.0);
        self.left.target = left_target;
        self.left.feed = feed_left.max(0.0);
        self.right.target = right_target;
        self.right.feed = feed_right.max(0.0);
    }

    /// Manual jog: drive one axis toward +/- `infinite_steps` at `feed`.
    /// `dir == 0` decelerates that axis to rest instead.
    pub fn jog(&mut self, axis: Axis, dir: i32, feed: f64, infinite_steps: i64) {
        let accel = self.accel;
        let channel = self.axis_mut(axis);
        if dir > 0 {
            channel.target = channel.position.round() as i64 + infinite_steps;
            channel.feed = feed.max(MIN_STEP_RATE);
        } else if dir < 0 {
            channel.target = channel.position.round() as i64 - infinite_steps;
            channel.feed = feed.max(MIN_STEP_RATE);
        } else {
            channel.halt_target(accel);
        }
    }

    /// Decelerate both axes to rest respecting the current acceleration.
    pub fn stop(&mut self) {
        let accel = self.accel;
        self.left.halt_target(accel);
        self.right.halt_target(accel);
    }

    pub fn set_acceleration(&mut self, accel: f64) {
        self.accel = accel.max(1.0);
    }

    /// Advance both profiles by `dt` seconds.
    pub fn tick(&mut self, dt: f64) {
        if dt <= 0.0 {
            return;
        }
        let accel = self.accel;
        self.left.advance(accel, dt);
        self.right.advance(accel, dt);
    }

    pub fn is_moving(&self) -> bool {
        self.left.distance_to_go() != 0 || self.right.distance_to_go() != 0
    }

    pub fn distance_to_go(&self, axis: Axis) -> i64 {
        self.axis(axis).distance_to_go()
    }

    pub fn current_position(&self, axis: Axis) -> i64 {
        self.axis(axis).position.round() as i64
    }

    pub fn target(&self, axis: Axis) -> i64 {
        self.axis(axis).target
    }

    /// Declare a pose, e.g. after homing. Clears any pending travel.
    pub fn set_current_position(&mut self, axis: Axis, steps: i64) {
        let channel = self.axis_mut(axis);
        channel.position = steps as f64;
        channel.target = steps;
        channel.speed = 0.0;
    }

    pub fn enable_outputs(&mut self) {
        self.outputs_enabled = true;
    }

    pub fn disable_outputs(&mut self) {
        self.outputs_enabled = false;
    }

    pub fn outputs_enabled(&self) -> bool {
        self.outputs_enabled
    }

    pub fn set_enable_pins(&mut self, left_pin: i32, right_pin: i32) {
        self.enable_pins = (left_pin, right_pin);
        tracing::info!(left_pin, right_pin, "enable pins updated");
    }

    pub fn enable_pins(&self) -> (i32, i32) {
        self.enable_pins
    }

    pub fn set_pulse_widths(&mut self, left_us: u32, right_us: u32) {
        self.pulse_widths_us = (left_us.clamp(1, 1000), right_us.clamp(1, 1000));
        tracing::info!(
            left_us = self.pulse_widths_us.0,
            right_us = self.pulse_widths_us.1,
            "pulse widths updated"
        );
    }

    pub fn pulse_widths_us(&self) -> (u32, u32) {
        self.pulse_widths_us
    }
}
