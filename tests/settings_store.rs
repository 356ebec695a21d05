// Persistence tests: the short-key settings document and its use by the
// plotter aggregate.

use std::time::Duration;

use tempfile::TempDir;
use vplotter_rs::{
    Config, MotionTuning, Plotter, PlannerConfig, RigConfig, ServoPort, Settings, SettingsStore,
    Speeds,
};

struct NullPort;

impl ServoPort for NullPort {
    fn write(&mut self, _angle: i32) {}
    fn delay(&mut self, _duration: Duration) {}
}

fn custom_settings() -> Settings {
    Settings {
        planner: PlannerConfig {
            junction_deviation_mm: 0.123456789,
            lookahead_segments: 17,
            min_segment_time_ms: 3,
            corner_slowdown: 0.55,
            min_corner_factor: 0.3,
            min_segment_len_mm: 0.2,
            collinear_deg: 3.0,
            backlash_x_mm: 0.1,
            backlash_y_mm: 0.05,
            s_curve_factor: 0.35,
        },
        tuning: MotionTuning {
            infinite_steps: 500_000,
            acceleration: 120_000,
        },
        speeds: Speeds {
            print_steps: 1111,
            move_steps: 2222,
        },
        pen_settle_ms: 120,
        pen_up_angle: 15,
        pen_down_angle: 55,
    }
}

#[test]
fn settings_round_trip_preserves_every_field() {
    let dir = TempDir::new().unwrap();
    let store = SettingsStore::new(dir.path().join("settings.json"));

    let saved = custom_settings();
    store.save(&saved).unwrap();
    let loaded = store.load().unwrap();

    let tol = 1e-9;
    assert!((loaded.planner.junction_deviation_mm - saved.planner.junction_deviation_mm).abs() < tol);
    assert!((loaded.planner.corner_slowdown - saved.planner.corner_slowdown).abs() < tol);
    assert!((loaded.planner.min_corner_factor - saved.planner.min_corner_factor).abs() < tol);
    assert!((loaded.planner.min_segment_len_mm - saved.planner.min_segment_len_mm).abs() < tol);
    assert!((loaded.planner.collinear_deg - saved.planner.collinear_deg).abs() < tol);
    assert!((loaded.planner.backlash_x_mm - saved.planner.backlash_x_mm).abs() < tol);
    assert!((loaded.planner.backlash_y_mm - saved.planner.backlash_y_mm).abs() < tol);
    assert!((loaded.planner.s_curve_factor - saved.planner.s_curve_factor).abs() < tol);
    assert_eq!(loaded.planner.lookahead_segments, saved.planner.lookahead_segments);
    assert_eq!(loaded.planner.min_segment_time_ms, saved.planner.min_segment_time_ms);
    assert_eq!(loaded.tuning, saved.tuning);
    assert_eq!(loaded.speeds, saved.speeds);
    assert_eq!(loaded.pen_settle_ms, saved.pen_settle_ms);
    assert_eq!(loaded.pen_up_angle, saved.pen_up_angle);
    assert_eq!(loaded.pen_down_angle, saved.pen_down_angle);
}

#[test]
fn missing_file_yields_defaults() {
    let dir = TempDir::new().unwrap();
    let store = SettingsStore::new(dir.path().join("settings.json"));
    assert!(!store.exists());
    assert_eq!(store.load().unwrap(), Settings::default());
}

#[test]
fn unknown_keys_are_ignored() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, r#"{"jd": 0.5, "zz": 42, "future": "field"}"#).unwrap();

    let loaded = SettingsStore::new(&path).load().unwrap();
    assert!((loaded.planner.junction_deviation_mm - 0.5).abs() < 1e-12);
    // everything absent from the file stays at its default
    assert_eq!(loaded.speeds, Speeds::default());
}

fn plotter_config(dir: &TempDir) -> Config {
    let mut config = Config {
        rig: RigConfig {
            top_distance_mm: 1000,
            ..RigConfig::default()
        },
        ..Config::default()
    };
    config.runner.settings_path = dir.path().join("settings.json");
    config.runner.commands_path = dir.path().join("commands.txt");
    config
}

#[test]
fn plotter_writes_survive_a_restart() {
    let dir = TempDir::new().unwrap();

    let mut plotter = Plotter::new(plotter_config(&dir), Box::new(NullPort));
    let mut cfg = plotter.planner_config();
    cfg.junction_deviation_mm = 0.25;
    cfg.collinear_deg = 5.0;
    plotter.set_planner_config(cfg).unwrap();
    plotter.set_speeds(1500, 2500).unwrap();

    let reborn = Plotter::new(plotter_config(&dir), Box::new(NullPort));
    let cfg = reborn.planner_config();
    assert!((cfg.junction_deviation_mm - 0.25).abs() < 1e-9);
    assert!((cfg.collinear_deg - 5.0).abs() < 1e-9);
    let status = reborn.status();
    assert_eq!(status.tuning, MotionTuning::default());
    assert_eq!(reborn.motion().speeds(), Speeds {
        print_steps: 1500,
        move_steps: 2500
    });
}

#[test]
fn upload_is_refused_while_a_job_is_active() {
    let dir = TempDir::new().unwrap();
    let config = plotter_config(&dir);
    std::fs::write(
        &config.runner.commands_path,
        "d1000.000\nh10\np0\n0 10\n10 10\n",
    )
    .unwrap();

    let mut plotter = Plotter::new(config, Box::new(NullPort));
    plotter.resume_top_distance(1000).unwrap();
    plotter.start_job(0).unwrap();
    assert!(!plotter.runner().is_stopped());

    let err = plotter.install_command_file("d1.0\nh1\n").unwrap_err();
    assert_eq!(err.status_code(), 409);

    // a second start is refused while running
    assert_eq!(plotter.start_job(0).unwrap_err().status_code(), 503);

    plotter.abort_job();
    for _ in 0..500_000 {
        plotter.tick(0.002);
        if plotter.runner().is_stopped() {
            break;
        }
    }
    assert!(plotter.runner().is_stopped());
    plotter.install_command_file("d1.0\nh1\n").unwrap();
}
