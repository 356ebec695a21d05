// src/plotter.rs - top-level aggregate wiring motion, pen and runner together
use crate::api::{Phase, StatusResponse};
use crate::config::{Config, PlannerConfig};
use crate::error::PlotterError;
use crate::job::Runner;
use crate::motion::Motion;
use crate::pen::{Pen, ServoPort};
use crate::settings::{Settings, SettingsStore};

/// The whole motion core as one value.
///
/// Owns the motion aggregate, the pen and the runner, and exposes the
/// control surface as plain methods: whatever transport fronts the plotter
/// calls these and relays `PlotterError::status_code()` on failure. The main
/// loop drives everything through `tick`.
pub struct Plotter {
    config: Config,
    motion: Motion,
    pen: Pen,
    runner: Runner,
    settings_store: SettingsStore,
}

impl Plotter {
    /// Assemble the core from a config plus a servo port. Persisted settings
    /// override the config's planner/tuning sections when present; a broken
    /// settings store logs and falls back to the config.
    pub fn new(config: Config, servo: Box<dyn ServoPort + Send>) -> Self {
        let settings_store = SettingsStore::new(&config.runner.settings_path);
        let settings = if settings_store.exists() {
            match settings_store.load() {
                Ok(settings) => Some(settings),
                Err(e) => {
                    tracing::warn!(error = %e, "settings store unreadable, using config values");
                    None
                }
            }
        } else {
            None
        };

        let (planner, tuning, speeds, pen_settle_ms, pen_up, pen_down) = match &settings {
            Some(s) => (
                s.planner.clone(),
                s.tuning,
                s.speeds,
                s.pen_settle_ms,
                s.pen_up_angle,
                s.pen_down_angle,
            ),
            None => (
                config.planner.clone(),
                config.tuning,
                config.speeds,
                config.runner.pen_settle_ms,
                config.pen.up_angle,
                config.pen.down_angle,
            ),
        };

        let motion = Motion::new(config.rig.clone(), planner, tuning, speeds);

        let mut pen = Pen::new(&config.pen, servo);
        pen.set_up_angle(pen_up);
        pen.set_down_angle(pen_down);

        let mut runner = Runner::new(config.runner.commands_path.clone());
        runner.set_pen_settle_ms(pen_settle_ms);

        Self {
            config,
            motion,
            pen,
            runner,
            settings_store,
        }
    }

    /// One main-loop iteration: step engine first, then the runner.
    pub fn tick(&mut self, dt: f64) {
        self.motion.tick(dt);
        self.runner.tick(&mut self.motion, &mut self.pen);
    }

    // ---- job control ---------------------------------------------------

    pub fn start_job(&mut self, start_line: usize) -> Result<(), PlotterError> {
        if !self.runner.is_stopped() {
            return Err(PlotterError::NotReady("a job is already running"));
        }
        self.runner.set_start_line(start_line);
        self.runner.start(&mut self.motion, &mut self.pen)
    }

    pub fn dry_run(&mut self, start_line: usize) -> Result<(), PlotterError> {
        if !self.runner.is_stopped() {
            return Err(PlotterError::NotReady("a job is already running"));
        }
        self.runner.set_start_line(start_line);
        self.runner.dry_run(&mut self.motion)
    }

    pub fn pause_job(&mut self) {
        self.runner.pause_job();
    }

    pub fn resume_job(&mut self) {
        self.runner.resume_job();
    }

    pub fn abort_job(&mut self) {
        self.runner.abort_and_go_home();
    }

    /// Replace the command file. Refused while a job is active.
    pub fn install_command_file(&mut self, contents: &str) -> Result<(), PlotterError> {
        if !self.runner.is_stopped() {
            return Err(PlotterError::Busy("a job is active"));
        }
        std::fs::write(&self.config.runner.commands_path, contents).map_err(|e| {
            PlotterError::ResourceUnavailable(format!(
                "{}: {e}",
                self.config.runner.commands_path.display()
            ))
        })?;
        Ok(())
    }

    pub fn status(&self) -> StatusResponse {
        let phase = if self.runner.is_aborting() {
            Phase::Aborting
        } else if self.runner.is_stopped() {
            Phase::Idle
        } else if self.runner.is_paused() {
            Phase::Paused
        } else {
            Phase::Running
        };
        let live = self.motion.coordinates_live();
        StatusResponse {
            phase,
            moving: self.motion.is_moving(),
            progress: self.runner.progress(),
            paused: self.runner.is_paused(),
            running: !self.runner.is_stopped(),
            x: live.x,
            y: live.y,
            pen_down: self.pen.is_down(),
            planner: self.motion.planner_config(),
            tuning: self.motion.motion_tuning(),
        }
    }

    // ---- calibration ---------------------------------------------------

    pub fn set_top_distance(&mut self, distance_mm: i32) -> Result<(), PlotterError> {
        if distance_mm <= 0 {
            return Err(PlotterError::InvalidArgument(format!(
                "top distance {distance_mm} must be positive"
            )));
        }
        self.motion.set_top_distance(distance_mm);
        Ok(())
    }

    pub fn resume_top_distance(&mut self, distance_mm: i32) -> Result<(), PlotterError> {
        if distance_mm <= 0 {
            return Err(PlotterError::InvalidArgument(format!(
                "top distance {distance_mm} must be positive"
            )));
        }
        self.motion.resume_top_distance(distance_mm);
        Ok(())
    }

    pub fn extend_to_home(&mut self) -> Result<u32, PlotterError> {
        self.motion.extend_to_home()
    }

    // ---- tunables ------------------------------------------------------

    pub fn set_planner_config(&mut self, cfg: PlannerConfig) -> Result<(), PlotterError> {
        self.motion.set_planner_config(cfg);
        self.persist()
    }

    pub fn planner_config(&self) -> PlannerConfig {
        self.motion.planner_config()
    }

    pub fn set_speeds(&mut self, print_steps: i32, move_steps: i32) -> Result<(), PlotterError> {
        self.motion.set_speeds(print_steps, move_steps)?;
        self.persist()
    }

    pub fn set_motion_tuning(
        &mut self,
        infinite_steps: i64,
        acceleration: i64,
    ) -> Result<(), PlotterError> {
        self.motion.set_motion_tuning(infinite_steps, acceleration);
        self.persist()
    }

    pub fn set_pulse_widths(&mut self, left_us: u32, right_us: u32) {
        self.motion.set_pulse_widths(left_us, right_us);
    }

    pub fn set_enable_pins(&mut self, left_pin: i32, right_pin: i32) {
        self.motion.set_enable_pins(left_pin, right_pin);
    }

    pub fn set_pen_settle_ms(&mut self, ms: u32) -> Result<(), PlotterError> {
        self.runner.set_pen_settle_ms(ms);
        self.persist()
    }

    pub fn set_pen_up_angle(&mut self, angle: i32) -> Result<(), PlotterError> {
        self.pen.set_up_angle(angle);
        self.persist()
    }

    pub fn set_pen_down_angle(&mut self, angle: i32) -> Result<(), PlotterError> {
        self.pen.set_down_angle(angle);
        self.persist()
    }

    fn persist(&self) -> Result<(), PlotterError> {
        let settings = Settings {
            planner: self.motion.planner_config(),
            tuning: self.motion.motion_tuning(),
            speeds: self.motion.speeds(),
            pen_settle_ms: self.runner.pen_settle_ms(),
            pen_up_angle: self.pen.up_angle(),
            pen_down_angle: self.pen.down_angle(),
        };
        self.settings_store.save(&settings)
    }

    // ---- component access ----------------------------------------------

    pub fn motion(&self) -> &Motion {
        &self.motion
    }

    pub fn motion_mut(&mut self) -> &mut Motion {
        &mut self.motion
    }

    pub fn pen(&self) -> &Pen {
        &self.pen
    }

    pub fn pen_mut(&mut self) -> &mut Pen {
        &mut self.pen
    }

    pub fn runner(&self) -> &Runner {
        &self.runner
    }
}
