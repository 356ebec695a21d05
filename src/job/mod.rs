// src/job/mod.rs - command-file job runner
pub mod commands;
pub mod lookahead;
pub mod tasks;

use std::collections::VecDeque;
use std::f64::consts::PI;
use std::path::{Path, PathBuf};

use crate::error::PlotterError;
use crate::motion::{angle_deg_between, Motion, Point};
use crate::pen::Pen;
use commands::{CommandFile, CommandLine};
use lookahead::QueuedCommand;
use tasks::Task;

/// Sink for user-facing progress updates (status display, UI push).
pub trait ProgressDisplay: Send {
    fn show_progress(&mut self, percent: i32);
}

/// Default sink: progress changes go to the log.
#[derive(Debug, Default)]
pub struct LogProgress;

impl ProgressDisplay for LogProgress {
    fn show_progress(&mut self, percent: i32) {
        tracing::info!(percent, "job progress");
    }
}

/// GRBL-style junction deviation limit: maximum corner speed in mm/s for the
/// angle between two segments (0 = straight).
fn junction_speed_mm_s(theta_rad: f64, accel_mm_s2: f64, junction_deviation_mm: f64) -> f64 {
    if theta_rad < 1e-6 {
        return 1e9;
    }
    let sin_half = (theta_rad * 0.5).sin();
    if sin_half < 1e-9 {
        return 1e9;
    }
    let denom = 1.0 - sin_half;
    if denom < 1e-9 {
        return 1e9;
    }
    let v2 = (accel_mm_s2 * junction_deviation_mm * sin_half) / denom;
    if v2 <= 0.0 {
        return 0.0;
    }
    v2.sqrt()
}

/// Sequences a persisted command file into pen and move tasks against the
/// motion core.
///
/// The runner is ticked from the main loop and never blocks: at most one
/// task transition happens per tick, and an abort only takes effect once the
/// step engine has quiesced. Progress is the integer percentage of the
/// declared job distance covered by completed move tasks.
pub struct Runner {
    commands_path: PathBuf,
    start_line: usize,
    pen_settle_ms: u32,

    stopped: bool,
    paused: bool,
    abort_requested: bool,
    aborted: bool,

    file: Option<CommandFile>,
    header_total_distance: f64,
    skipped_distance: f64,
    job_total_distance: f64,
    job_distance_so_far: f64,

    start_position: Point,
    target_position: Point,
    progress: i32, // -1 until the first update

    preface: VecDeque<Task>,
    finishing: VecDeque<Task>,
    lookahead: VecDeque<QueuedCommand>,
    eof_reached: bool,
    pen_is_down: bool,

    current_task: Option<Task>,
    display: Box<dyn ProgressDisplay>,
}

impl Runner {
    pub fn new(commands_path: impl Into<PathBuf>) -> Self {
        Self::with_display(commands_path, Box::new(LogProgress))
    }

    pub fn with_display(
        commands_path: impl Into<PathBuf>,
        display: Box<dyn ProgressDisplay>,
    ) -> Self {
        Self {
            commands_path: commands_path.into(),
            start_line: 0,
            pen_settle_ms: 50,
            stopped: true,
            paused: false,
            abort_requested: false,
            aborted: false,
            file: None,
            header_total_distance: 0.0,
            skipped_distance: 0.0,
            job_total_distance: 0.0,
            job_distance_so_far: 0.0,
            start_position: Point::default(),
            target_position: Point::default(),
            progress: -1,
            preface: VecDeque::new(),
            finishing: VecDeque::new(),
            lookahead: VecDeque::new(),
            eof_reached: false,
            pen_is_down: false,
            current_task: None,
            display,
        }
    }

    pub fn commands_path(&self) -> &Path {
        &self.commands_path
    }

    pub fn set_commands_path(&mut self, path: impl Into<PathBuf>) {
        self.commands_path = path.into();
    }

    /// Number of body lines to skip when starting mid-file.
    pub fn set_start_line(&mut self, line_after_header: usize) {
        self.start_line = line_after_header;
    }

    pub fn start_line(&self) -> usize {
        self.start_line
    }

    pub fn set_pen_settle_ms(&mut self, ms: u32) {
        self.pen_settle_ms = ms.min(500);
    }

    pub fn pen_settle_ms(&self) -> u32 {
        self.pen_settle_ms
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_aborting(&self) -> bool {
        self.abort_requested
    }

    pub fn progress(&self) -> i32 {
        self.progress.clamp(0, 100)
    }

    pub fn total_distance(&self) -> f64 {
        self.job_total_distance
    }

    pub fn distance_so_far(&self) -> f64 {
        self.job_distance_so_far
    }

    // ---- lifecycle -----------------------------------------------------

    /// Open the command file and begin executing it. A failed start leaves
    /// the runner stopped with the error surfaced to the caller.
    pub fn start(&mut self, motion: &mut Motion, pen: &mut Pen) -> Result<(), PlotterError> {
        self.paused = false;
        self.abort_requested = false;
        self.aborted = false;

        if let Err(e) = self.init_task_provider(motion) {
            self.stopped = true;
            tracing::error!(error = %e, "runner start failed");
            return Err(e);
        }

        self.current_task = self.next_task(motion);
        match self.current_task.as_mut() {
            Some(task) => {
                task.start(motion, pen);
                self.stopped = false;
                tracing::info!("runner started");
            }
            None => {
                self.stopped = true;
                tracing::warn!("runner start: nothing to do");
            }
        }
        Ok(())
    }

    /// Consume the whole task stream without executing anything, to validate
    /// a file and exercise the planning path.
    pub fn dry_run(&mut self, motion: &mut Motion) -> Result<(), PlotterError> {
        self.paused = false;
        self.abort_requested = false;
        self.aborted = false;

        self.init_task_provider(motion).inspect_err(|e| {
            self.stopped = true;
            tracing::error!(error = %e, "dry run failed");
        })?;

        let mut task_count = 0usize;
        while self.next_task(motion).is_some() {
            task_count += 1;
        }
        self.stopped = true;
        tracing::info!(task_count, "dry run complete");
        Ok(())
    }

    /// Hold the runner between tasks. Idempotent; the current segment still
    /// runs to completion.
    pub fn pause_job(&mut self) {
        if self.stopped {
            return;
        }
        self.paused = true;
        tracing::info!("runner paused");
    }

    pub fn resume_job(&mut self) {
        if self.stopped {
            return;
        }
        self.paused = false;
        tracing::info!("runner resumed");
    }

    /// Drop the rest of the job and substitute the finishing sequence
    /// (pen up, go home) once the step engine has quiesced.
    pub fn abort_and_go_home(&mut self) {
        self.abort_requested = true;
        self.aborted = true;
        self.stopped = false;
        self.paused = false;
        tracing::warn!("abort requested, returning home");
    }

    // ---- task provider -------------------------------------------------

    fn init_task_provider(&mut self, motion: &mut Motion) -> Result<(), PlotterError> {
        self.preface.clear();
        self.finishing.clear();
        self.lookahead.clear();
        self.eof_reached = false;
        self.pen_is_down = false;
        self.file = None;

        let (mut file, header) = CommandFile::open(&self.commands_path)?;
        self.header_total_distance = header.total_distance_mm;

        self.start_position = motion.coordinates()?;
        self.target_position = self.start_position;

        // account for skipped lines so progress is relative to remaining work
        self.skipped_distance = 0.0;
        let mut pen_down = false;
        let mut virtual_pos = self.start_position;
        let mut consumed = 0usize;
        while consumed < self.start_line {
            let Some(line) = file.next_line() else { break };
            match commands::parse_line(&line) {
                Some(CommandLine::PenUp) => pen_down = false,
                Some(CommandLine::PenDown) => pen_down = true,
                Some(CommandLine::MoveTo { x, y }) | Some(CommandLine::Arc { x, y, .. }) => {
                    let next = Point::new(x, y);
                    self.skipped_distance += virtual_pos.distance_to(next);
                    virtual_pos = next;
                }
                None => {}
            }
            consumed += 1;
        }

        self.job_total_distance = (self.header_total_distance - self.skipped_distance).max(0.0);
        self.job_distance_so_far = 0.0;
        self.progress = -1;

        let move_speed = motion.speeds().move_steps;
        if self.start_line > 0 {
            self.preface.push_back(Task::pen(true, self.pen_settle_ms));
            if virtual_pos != self.start_position {
                self.preface
                    .push_back(Task::movement(virtual_pos, move_speed, false));
                self.start_position = virtual_pos;
            }
            if pen_down {
                self.preface.push_back(Task::pen(false, self.pen_settle_ms));
                self.pen_is_down = true;
            }
        }

        let home = motion.home_coordinates();
        self.finishing.push_back(Task::pen(true, self.pen_settle_ms));
        self.finishing
            .push_back(Task::movement(home, move_speed, false));

        self.file = Some(file);
        Ok(())
    }

    /// Stream more commands into the lookahead deque, then run the
    /// filter/merge pass. Returns whether the deque holds anything.
    fn fill_lookahead(&mut self, motion: &Motion) -> bool {
        let Some(file) = self.file.as_mut() else {
            return false;
        };
        let cfg = motion.planner_config();
        let max_segments = cfg.lookahead_segments as usize;

        let mut virtual_pos = self.start_position;
        for cmd in self.lookahead.iter().rev() {
            if let Some(point) = cmd.move_point() {
                virtual_pos = point;
                break;
            }
        }

        while !self.eof_reached && self.lookahead.len() < max_segments {
            let Some(line) = file.next_line() else {
                self.eof_reached = true;
                break;
            };
            match commands::parse_line(&line) {
                Some(CommandLine::PenUp) => {
                    self.lookahead.push_back(QueuedCommand::Pen { down: false });
                }
                Some(CommandLine::PenDown) => {
                    self.lookahead.push_back(QueuedCommand::Pen { down: true });
                }
                Some(CommandLine::MoveTo { x, y }) => {
                    let point = Point::new(x, y);
                    self.lookahead.push_back(QueuedCommand::Move {
                        point,
                        protected: false,
                    });
                    virtual_pos = point;
                }
                Some(CommandLine::Arc { cw, x, y, i, j }) => {
                    virtual_pos = lookahead::tessellate_arc(
                        &mut self.lookahead,
                        virtual_pos,
                        Point::new(x, y),
                        i,
                        j,
                        cw,
                        &cfg,
                    );
                }
                None => {
                    tracing::warn!(line = %line, "skipping malformed command line");
                }
            }
        }

        lookahead::optimize(&mut self.lookahead, self.start_position, &cfg);
        !self.lookahead.is_empty()
    }

    /// Lookahead-based speed planning for one segment: corner slowdown and
    /// the junction cap against the next queued move, translated back into a
    /// step rate for the dominant belt.
    fn plan_segment_speed(&mut self, motion: &mut Motion, target: Point, base_speed: i32) -> i32 {
        let Some(next) = self.lookahead.iter().find_map(|c| c.move_point()) else {
            return base_speed;
        };
        let dist = self.start_position.distance_to(target);
        if dist <= 1e-6 {
            return base_speed;
        }
        let max_delta = match motion.estimate_max_delta_steps(target.x, target.y) {
            Ok(delta) if delta > 0 => delta,
            _ => return base_speed,
        };

        let cfg = motion.planner_config();
        let tuning = motion.motion_tuning();
        let mm_per_step = motion.steps_to_mm(1);
        let accel_mm_s2 = (tuning.acceleration as f64 * mm_per_step).max(1.0);

        // nominal XY speed implied by the requested step rate
        let v_nominal = dist * base_speed as f64 / max_delta as f64;

        let theta = angle_deg_between(self.start_position, target, next).to_radians();
        let sharpness = theta / PI;
        let factor = (1.0 - sharpness * cfg.corner_slowdown).clamp(cfg.min_corner_factor, 1.0);
        let v_angle = v_nominal * factor;

        let v_junction = junction_speed_mm_s(theta, accel_mm_s2, cfg.junction_deviation_mm);

        let mut v_planned = v_nominal.min(v_angle).min(v_junction);
        if v_planned < 1e-3 {
            v_planned = 1e-3;
        }

        let steps = ((v_planned * max_delta as f64) / dist).floor() as i32;
        steps.clamp(1, base_speed)
    }

    /// Next task in preface -> body -> finishing order. Exhaustion closes the
    /// file and latches the finished state.
    fn next_task(&mut self, motion: &mut Motion) -> Option<Task> {
        if let Some(task) = self.preface.pop_front() {
            return Some(task);
        }

        if self.lookahead.is_empty() {
            self.fill_lookahead(motion);
        }

        if self.lookahead.is_empty() && self.eof_reached {
            if let Some(task) = self.finishing.pop_front() {
                return Some(task);
            }

            self.file = None;
            if !self.aborted {
                // 100 only latches after a naturally finished job; an abort
                // keeps the last increment
                if self.progress != 100 {
                    self.progress = 100;
                    self.display.show_progress(100);
                }
            }
            self.stopped = true;
            self.paused = false;
            tracing::info!("runner finished");
            return None;
        }

        let cmd = self.lookahead.pop_front()?;
        match cmd {
            QueuedCommand::Pen { down } => {
                self.pen_is_down = down;
                Some(Task::pen(!down, self.pen_settle_ms))
            }
            QueuedCommand::Move { point, .. } => {
                self.target_position = point;
                let speeds = motion.speeds();
                let base_speed = if self.pen_is_down {
                    speeds.print_steps
                } else {
                    speeds.move_steps
                };
                let planned = self.plan_segment_speed(motion, point, base_speed);
                Some(Task::movement(point, planned, true))
            }
        }
    }

    // ---- main-loop tick ------------------------------------------------

    /// One cooperative tick: service an abort, honor pause, account a
    /// finished task and start the next one. Never blocks on the engine.
    pub fn tick(&mut self, motion: &mut Motion, pen: &mut Pen) {
        if self.stopped {
            return;
        }

        if self.abort_requested {
            if motion.is_moving() {
                return;
            }
            self.abort_requested = false;
            self.paused = false;
            self.file = None;
            self.current_task = None;
            self.preface.clear();
            self.lookahead.clear();
            self.eof_reached = true;

            self.finishing.clear();
            let move_speed = motion.speeds().move_steps;
            self.finishing.push_back(Task::pen(true, self.pen_settle_ms));
            self.finishing
                .push_back(Task::movement(motion.home_coordinates(), move_speed, false));

            self.current_task = self.next_task(motion);
            match self.current_task.as_mut() {
                Some(task) => task.start(motion, pen),
                None => self.stopped = true,
            }
            return;
        }

        if self.paused {
            return;
        }

        let Some(task) = self.current_task.as_ref() else {
            self.stopped = true;
            return;
        };
        if !task.is_done(motion) {
            return;
        }

        if task.counts_distance() {
            let covered = self.start_position.distance_to(self.target_position);
            self.job_distance_so_far += covered;
            self.start_position = self.target_position;

            let mut new_progress = 0;
            if self.job_total_distance > 0.0 {
                new_progress =
                    ((self.job_distance_so_far / self.job_total_distance) * 100.0).floor() as i32;
            }
            new_progress = new_progress.clamp(0, 100);
            if self.progress != new_progress {
                self.progress = new_progress;
                self.display.show_progress(new_progress);
            }
        }

        self.current_task = self.next_task(motion);
        match self.current_task.as_mut() {
            Some(task) => task.start(motion, pen),
            None => self.stopped = true,
        }
    }
}
