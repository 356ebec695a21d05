// src/job/tasks.rs - the runner's unit of work
use crate::motion::{Motion, Point};
use crate::pen::Pen;

/// Pose agreement required between the live position and the segment target
/// before a move task reports done.
const MOVE_DONE_TOLERANCE_MM: f64 = 0.05;

/// A single unit of runner work: either a pen transition or one planned
/// segment. Tasks own nothing beyond their plan and are dropped on
/// completion.
#[derive(Debug)]
pub enum Task {
    Pen(PenTask),
    Move(MoveTask),
}

#[derive(Debug)]
pub struct PenTask {
    up: bool,
    settle_ms: u32,
    done: bool,
}

#[derive(Debug)]
pub struct MoveTask {
    target: Point,
    speed_steps: i32,
    counts_distance: bool,
    started: bool,
    failed: bool,
}

impl Task {
    pub fn pen(up: bool, settle_ms: u32) -> Self {
        Task::Pen(PenTask {
            up,
            settle_ms,
            done: false,
        })
    }

    pub fn movement(target: Point, speed_steps: i32, counts_distance: bool) -> Self {
        Task::Move(MoveTask {
            target,
            speed_steps,
            counts_distance,
            started: false,
            failed: false,
        })
    }

    /// Kick the task off. Pen transitions complete synchronously; a move
    /// that fails to plan is marked failed-and-done so the runner never
    /// stalls on it.
    pub fn start(&mut self, motion: &mut Motion, pen: &mut Pen) {
        match self {
            Task::Pen(task) => {
                if task.up {
                    pen.slow_up();
                } else {
                    pen.slow_down();
                }
                if task.settle_ms > 0 {
                    pen.settle(task.settle_ms);
                }
                task.done = true;
            }
            Task::Move(task) => {
                match motion.begin_linear_travel(task.target.x, task.target.y, task.speed_steps) {
                    Ok(_) => {
                        // the committed pose may differ from the request by
                        // backlash take-up or the safe-rectangle clamp
                        task.target = motion.coordinates_live();
                    }
                    Err(e) => {
                        tracing::error!(error = %e, x = task.target.x, y = task.target.y, "move task failed to start");
                        task.failed = true;
                    }
                }
                task.started = true;
            }
        }
    }

    pub fn is_done(&self, motion: &Motion) -> bool {
        match self {
            Task::Pen(task) => task.done,
            Task::Move(task) => {
                if !task.started {
                    return false;
                }
                if task.failed {
                    return true;
                }
                if motion.is_moving() {
                    return false;
                }
                motion.coordinates_live().distance_to(task.target) <= MOVE_DONE_TOLERANCE_MM
            }
        }
    }

    pub fn counts_distance(&self) -> bool {
        matches!(
            self,
            Task::Move(MoveTask {
                counts_distance: true,
                failed: false,
                ..
            })
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Task::Pen(_) => "pen",
            Task::Move(_) => "move",
        }
    }
}
