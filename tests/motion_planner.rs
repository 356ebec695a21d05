// Integration tests for the motion aggregate: segment commit, backlash,
// corner handling and the safe-rectangle guards.

use vplotter_rs::{Axis, Motion, MotionTuning, PlannerConfig, RigConfig, Speeds};

fn homed_motion(planner: PlannerConfig) -> Motion {
    let rig = RigConfig {
        top_distance_mm: 1000,
        ..RigConfig::default()
    };
    let mut motion = Motion::new(rig, planner, MotionTuning::default(), Speeds::default());
    motion.resume_top_distance(1000);
    motion
}

fn run_to_rest(motion: &mut Motion) {
    for _ in 0..2_000_000 {
        if !motion.is_moving() {
            return;
        }
        motion.tick(0.002);
    }
    panic!("engine never came to rest");
}

#[test]
fn refuses_to_move_before_calibration() {
    let mut motion = Motion::new(
        RigConfig::default(), // top_distance_mm = -1
        PlannerConfig::default(),
        MotionTuning::default(),
        Speeds::default(),
    );
    let err = motion.begin_linear_travel(10.0, 10.0, 1000).unwrap_err();
    assert_eq!(err.status_code(), 503);
    assert!(motion.width().is_err());
    assert!(motion.estimate_max_delta_steps(10.0, 10.0).is_err());
}

#[test]
fn rejects_out_of_range_arguments() {
    let mut motion = homed_motion(PlannerConfig::default());
    assert!(motion.begin_linear_travel(-0.5, 10.0, 1000).is_err());
    assert!(motion.begin_linear_travel(10.0, -0.5, 1000).is_err());
    assert!(motion.begin_linear_travel(10.0, 10.0, 0).is_err());
    let width = motion.width().unwrap();
    assert!(motion.begin_linear_travel(width + 1.5, 10.0, 1000).is_err());
}

#[test]
fn zero_delta_move_completes_instantly() {
    let mut motion = homed_motion(PlannerConfig::default());
    let home = motion.home_coordinates();
    let move_time = motion
        .begin_linear_travel(home.x, home.y, 2000)
        .expect("move to current pose");
    assert_eq!(move_time, 0.0);
    assert!(!motion.is_moving());
}

#[test]
fn segments_complete_and_pose_settles() {
    let mut motion = homed_motion(PlannerConfig::default());
    motion.set_speeds(20_000, 40_000).unwrap();
    motion.begin_linear_travel(100.0, 100.0, 40_000).unwrap();
    assert!(motion.is_moving());
    assert!(motion.coordinates().is_err()); // pose unreadable mid-flight
    run_to_rest(&mut motion);
    let pose = motion.coordinates().unwrap();
    assert_eq!(pose, motion.coordinates_live());
    assert!((pose.x - 100.0).abs() < 1e-9);
    assert!((pose.y - 100.0).abs() < 1e-9);
    assert_eq!(motion.engine().distance_to_go(Axis::Left), 0);
    assert_eq!(motion.engine().distance_to_go(Axis::Right), 0);
}

#[test]
fn direction_flip_applies_backlash_to_the_belt_targets() {
    let planner = PlannerConfig {
        backlash_x_mm: 0.1,
        ..PlannerConfig::default()
    };
    let mut compensated = homed_motion(planner);
    compensated.begin_linear_travel(2.0, 5.0, 2000).unwrap(); // -X approach
    compensated.begin_linear_travel(5.0, 5.0, 2000).unwrap(); // flip to +X: lands at 5.1
    compensated.begin_linear_travel(3.0, 5.0, 2000).unwrap(); // flip to -X: lands at 2.9

    // reference rig without compensation, driven over the shifted poses
    let mut reference = homed_motion(PlannerConfig::default());
    reference.begin_linear_travel(2.0, 5.0, 2000).unwrap();
    reference.begin_linear_travel(5.1, 5.0, 2000).unwrap();
    reference.begin_linear_travel(2.9, 5.0, 2000).unwrap();

    assert_eq!(
        compensated.engine().target(Axis::Left),
        reference.engine().target(Axis::Left)
    );
    assert_eq!(
        compensated.engine().target(Axis::Right),
        reference.engine().target(Axis::Right)
    );
    assert!((compensated.coordinates_live().x - 2.9).abs() < 1e-9);
}

#[test]
fn bounds_clamp_wins_over_backlash() {
    let planner = PlannerConfig {
        backlash_x_mm: 0.5,
        ..PlannerConfig::default()
    };
    let mut motion = homed_motion(planner);
    motion.begin_linear_travel(0.3, 5.0, 2000).unwrap(); // -X
    motion.begin_linear_travel(1.0, 5.0, 2000).unwrap(); // +X flip
    motion.begin_linear_travel(0.0, 5.0, 2000).unwrap(); // -X flip: 0 - 0.5 clamps to 0
    assert_eq!(motion.coordinates_live().x, 0.0);
}

#[test]
fn a_sharp_corner_slows_the_next_segment() {
    let base = PlannerConfig {
        corner_slowdown: 0.8,
        min_corner_factor: 0.05,
        min_segment_time_ms: 0,
        ..PlannerConfig::default()
    };

    // straight continuation in -Y
    let mut straight = homed_motion(base.clone());
    straight.begin_linear_travel(300.0, 150.0, 2000).unwrap();
    run_to_rest(&mut straight);
    let t_straight = straight.begin_linear_travel(300.0, 100.0, 2000).unwrap();

    // right-angle turn into +X after the same approach pose
    let mut cornered = homed_motion(base);
    cornered.begin_linear_travel(300.0, 150.0, 2000).unwrap();
    run_to_rest(&mut cornered);
    cornered.begin_linear_travel(300.0, 100.0, 2000).unwrap();
    run_to_rest(&mut cornered);
    let t_corner = cornered.begin_linear_travel(350.0, 100.0, 2000).unwrap();

    // the cornered segment runs at roughly the 0.6 corner factor
    assert!(
        t_corner > t_straight * 0.8,
        "corner time {t_corner} vs straight {t_straight}"
    );

    // directly comparable: same segment planned straight-on
    let mut rejoin = homed_motion(PlannerConfig {
        corner_slowdown: 0.05,
        ..PlannerConfig::default()
    });
    rejoin.begin_linear_travel(300.0, 150.0, 2000).unwrap();
    run_to_rest(&mut rejoin);
    rejoin.begin_linear_travel(300.0, 100.0, 2000).unwrap();
    run_to_rest(&mut rejoin);
    let t_mild = rejoin.begin_linear_travel(350.0, 100.0, 2000).unwrap();
    assert!(
        t_corner > t_mild * 1.2,
        "corner time {t_corner} vs mild slowdown {t_mild}"
    );
}

#[test]
fn minimum_segment_time_floors_the_duration() {
    let planner = PlannerConfig {
        min_segment_time_ms: 100,
        ..PlannerConfig::default()
    };
    let mut motion = homed_motion(planner);
    let home = motion.home_coordinates();
    let move_time = motion
        .begin_linear_travel(home.x + 0.5, home.y, 100_000)
        .unwrap();
    assert!(move_time >= 0.1 - 1e-9, "move time {move_time}");
}

#[test]
fn extend_to_home_declares_the_origin_and_travels_home() {
    let rig = RigConfig {
        top_distance_mm: 1000,
        ..RigConfig::default()
    };
    let mut motion = Motion::new(
        rig,
        PlannerConfig::default(),
        MotionTuning::default(),
        Speeds {
            print_steps: 20_000,
            move_steps: 40_000,
        },
    );
    // calibrated but not yet homed
    assert!(motion.begin_linear_travel(10.0, 10.0, 1000).is_err());

    let eta_s = motion.extend_to_home().unwrap();
    assert!(eta_s >= 1);
    assert!(motion.has_started_homing());
    assert!(motion.is_homed());
    run_to_rest(&mut motion);

    let home = motion.home_coordinates();
    assert!(motion.coordinates().unwrap().distance_to(home) < 1e-9);
}

#[test]
fn jog_drives_one_belt_and_stops_on_zero() {
    let mut motion = homed_motion(PlannerConfig::default());
    motion.set_motion_tuning(1_000_000, 50_000);

    let before = motion.engine().current_position(Axis::Left);
    motion.jog(Axis::Left, 1);
    for _ in 0..500 {
        motion.tick(0.002);
    }
    assert!(motion.is_moving());
    assert!(motion.engine().current_position(Axis::Left) > before);

    motion.jog(Axis::Left, 0);
    for _ in 0..200_000 {
        if !motion.is_moving() {
            break;
        }
        motion.tick(0.002);
    }
    assert!(!motion.is_moving());

    motion.disable_motors();
    assert!(!motion.engine().outputs_enabled());
}

#[test]
fn belt_extension_pays_out_a_metre_on_both_axes() {
    let mut motion = homed_motion(PlannerConfig::default());
    let steps = motion.rig().mm_to_steps(1000.0);
    let left_before = motion.engine().current_position(Axis::Left);
    let right_before = motion.engine().current_position(Axis::Right);

    motion.extend_belts_1000mm();
    assert_eq!(motion.engine().target(Axis::Left), left_before + steps);
    assert_eq!(motion.engine().target(Axis::Right), right_before + steps);
    assert!(motion.is_moving());
}

#[test]
fn estimate_matches_the_dominant_axis_delta() {
    let mut motion = homed_motion(PlannerConfig::default());
    let estimate = motion.estimate_max_delta_steps(100.0, 100.0).unwrap();
    assert!(estimate > 0);

    motion.begin_linear_travel(100.0, 100.0, 2000).unwrap();
    let left = (motion.engine().target(Axis::Left) - motion.engine().current_position(Axis::Left))
        .abs();
    let right = (motion.engine().target(Axis::Right)
        - motion.engine().current_position(Axis::Right))
    .abs();
    assert_eq!(estimate, left.max(right));
}
