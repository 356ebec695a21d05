// src/pen.rs - staged-angle pen actuator behind a thin servo port
use std::time::Duration;

use crate::config::PenConfig;

/// Safe commanded range of the pen lift mechanism, degrees.
pub const MIN_ANGLE: i32 = 0;
pub const MAX_ANGLE: i32 = 70;

/// Hold time after a slow move so the linkage stops oscillating.
const HOLD_AFTER_MOVE: Duration = Duration::from_millis(20);

/// Seam to the servo hardware. `write` commands an absolute angle, `delay`
/// paces slow moves and settle holds. A test port may record writes and
/// ignore delays; the real port blocks, which is acceptable here because the
/// pen is the only component allowed to hold the loop for one servo move.
pub trait ServoPort {
    fn write(&mut self, angle: i32);
    fn delay(&mut self, duration: Duration);
}

/// Port used when no servo is attached: logs the angle and keeps real-time
/// pacing so the motion timeline stays representative.
#[derive(Debug, Default)]
pub struct IdleServoPort;

impl ServoPort for IdleServoPort {
    fn write(&mut self, angle: i32) {
        tracing::trace!(angle, "servo angle");
    }

    fn delay(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Pen actuator with two staged angles and pending values that are applied
/// on the next transition only.
pub struct Pen {
    port: Box<dyn ServoPort + Send>,
    up_angle: i32,
    down_angle: i32,
    pending_up: Option<i32>,
    pending_down: Option<i32>,
    slow_speed_deg_per_s: i32,
    current: i32,
}

impl std::fmt::Debug for Pen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pen")
            .field("up_angle", &self.up_angle)
            .field("down_angle", &self.down_angle)
            .field("current", &self.current)
            .finish()
    }
}

fn clamp_angle(value: i32) -> i32 {
    value.clamp(MIN_ANGLE, MAX_ANGLE)
}

impl Pen {
    pub fn new(cfg: &PenConfig, port: Box<dyn ServoPort + Send>) -> Self {
        let mut pen = Self {
            port,
            up_angle: clamp_angle(cfg.up_angle),
            down_angle: clamp_angle(cfg.down_angle),
            pending_up: None,
            pending_down: None,
            slow_speed_deg_per_s: cfg.slow_speed_deg_per_s.max(1),
            current: clamp_angle(cfg.up_angle),
        };
        pen.port.write(pen.current);
        pen
    }

    pub fn set_up_angle(&mut self, value: i32) {
        self.up_angle = clamp_angle(value);
    }

    pub fn set_down_angle(&mut self, value: i32) {
        self.down_angle = clamp_angle(value);
    }

    pub fn up_angle(&self) -> i32 {
        self.up_angle
    }

    pub fn down_angle(&self) -> i32 {
        self.down_angle
    }

    /// Stage an up angle that takes effect on the next `slow_up` only.
    pub fn set_pending_up(&mut self, value: i32) {
        self.pending_up = Some(clamp_angle(value));
    }

    /// Stage a down angle that takes effect on the next `slow_down` only.
    pub fn set_pending_down(&mut self, value: i32) {
        self.pending_down = Some(clamp_angle(value));
    }

    pub fn pending_up(&self) -> Option<i32> {
        self.pending_up
    }

    pub fn pending_down(&self) -> Option<i32> {
        self.pending_down
    }

    pub fn slow_up(&mut self) {
        if let Some(value) = self.pending_up.take() {
            self.up_angle = value;
        }
        let target = self.up_angle;
        self.slow_to(target);
    }

    pub fn slow_down(&mut self) {
        if let Some(value) = self.pending_down.take() {
            self.down_angle = value;
        }
        let target = self.down_angle;
        self.slow_to(target);
    }

    fn slow_to(&mut self, target: i32) {
        if self.current == target {
            return;
        }
        let step_delay = Duration::from_millis(1_000 / self.slow_speed_deg_per_s as u64);
        let dir = if target > self.current { 1 } else { -1 };
        while self.current != target {
            self.current += dir;
            self.port.write(self.current);
            self.port.delay(step_delay);
        }
        self.port.delay(HOLD_AFTER_MOVE);
    }

    /// Extra dwell after a transition, commanded by the runner.
    pub fn settle(&mut self, ms: u32) {
        self.port.delay(Duration::from_millis(ms as u64));
    }

    pub fn is_down(&self) -> bool {
        self.current == self.down_angle
    }

    pub fn current_angle(&self) -> i32 {
        self.current
    }
}
