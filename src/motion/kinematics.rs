// src/motion/kinematics.rs - XY to belt-length mapping under sled tilt equilibrium
use std::f64::consts::PI;

use crate::config::RigConfig;
use crate::motion::Point;

/// Commanded belt lengths in motor steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeltLengths {
    pub left: i64,
    pub right: i64,
}

const SOLVER_MAX_ITERATIONS: usize = 20;
const GAMMA_TERMINATION_RAD: f64 = 0.25 * PI / 180.0;
const GAMMA_STEP_RAD: f64 = 0.20 * PI / 180.0;
const GAMMA_LIMIT_RAD: f64 = 90.0 * PI / 180.0;
const GAMMA_SEARCH_WINDOW_RAD: f64 = 2.0 * PI / 180.0;

/// Maps a drawing-surface pose to the two belt lengths.
///
/// The sled hangs at a tilt angle gamma determined by the torque balance
/// between the two belt forces and gravity acting on the offset centre of
/// mass. The solve alternates between recomputing belt angles/forces for the
/// current gamma and a local search for the gamma that minimizes the torque
/// residual; the last gamma is cached as the warm start for the next pose,
/// which keeps the per-segment cost to a handful of passes.
#[derive(Debug, Clone)]
pub struct Kinematics {
    rig: RigConfig,
    top_distance: i32,
    min_safe_y: f64,
    min_safe_x_offset: f64,
    width: f64,
    gamma_last: f64,
}

impl Kinematics {
    pub fn new(rig: RigConfig) -> Self {
        Self {
            rig,
            top_distance: -1,
            min_safe_y: 0.0,
            min_safe_x_offset: 0.0,
            width: 0.0,
            gamma_last: 0.0,
        }
    }

    pub fn rig(&self) -> &RigConfig {
        &self.rig
    }

    pub fn set_top_distance(&mut self, distance: i32) {
        tracing::info!(distance, "top distance set");
        self.top_distance = distance;
        self.min_safe_y = self.rig.safe_y_fraction * distance as f64;
        self.min_safe_x_offset = self.rig.safe_x_fraction * distance as f64;
        self.width = distance as f64 - 2.0 * self.min_safe_x_offset;
    }

    pub fn top_distance(&self) -> i32 {
        self.top_distance
    }

    pub fn is_calibrated(&self) -> bool {
        self.top_distance > 0
    }

    /// Width of the safe drawing rectangle. Only meaningful once calibrated.
    pub fn width(&self) -> f64 {
        self.width
    }

    /// Parking pose: centred horizontally, a fixed distance below the bar.
    pub fn home(&self) -> Point {
        if !self.is_calibrated() {
            return Point::new(0.0, 0.0);
        }
        Point::new(self.width / 2.0, self.rig.home_y_offset_mm)
    }

    pub fn gamma(&self) -> f64 {
        self.gamma_last
    }

    fn left_tangent_point(&self, frame_x: f64, frame_y: f64, gamma: f64) -> (f64, f64) {
        let s = self.rig.pulley_spacing_mm / 2.0;
        let p_lx = s * gamma.cos() - self.rig.pen_offset_mm * gamma.sin();
        let p_ly = s * gamma.sin() + self.rig.pen_offset_mm * gamma.cos();
        (frame_x - p_lx, frame_y - p_ly)
    }

    fn right_tangent_point(&self, frame_x: f64, frame_y: f64, gamma: f64) -> (f64, f64) {
        let s = self.rig.pulley_spacing_mm / 2.0;
        let p_rx = s * gamma.cos() + self.rig.pen_offset_mm * gamma.sin();
        let p_ry = s * gamma.sin() - self.rig.pen_offset_mm * gamma.cos();
        (frame_x + p_rx, frame_y + p_ry)
    }

    fn belt_angles(&self, frame_x: f64, frame_y: f64, gamma: f64) -> (f64, f64) {
        let (x_pl, y_pl) = self.left_tangent_point(frame_x, frame_y, gamma);
        let phi_l = y_pl.atan2(x_pl);

        let (x_pr, y_pr) = self.right_tangent_point(frame_x, frame_y, gamma);
        let phi_r = y_pr.atan2(self.top_distance as f64 - x_pr);
        (phi_l, phi_r)
    }

    fn belt_forces(&self, phi_l: f64, phi_r: f64) -> (f64, f64) {
        let f_g = self.rig.sled_mass_kg * self.rig.gravity;
        let f_r = f_g * phi_l.cos() / (phi_l + phi_r).sin();
        let f_l = f_g * phi_r.cos() / (phi_l + phi_r).sin();
        (f_l, f_r)
    }

    /// Local search within the window around `gamma_init` for the tilt that
    /// minimizes the torque residual. Bails out as soon as the residual stops
    /// improving, so the common case costs a few evaluations.
    fn solve_torque_equilibrium(
        &self,
        phi_l: f64,
        phi_r: f64,
        f_l: f64,
        f_r: f64,
        gamma_init: f64,
    ) -> f64 {
        let s = self.rig.pulley_spacing_mm / 2.0;
        let f_g = self.rig.sled_mass_kg * self.rig.gravity;

        let mut gamma_best = gamma_init;
        let mut t_delta_best = f64::INFINITY;

        let mut gamma = gamma_init - GAMMA_SEARCH_WINDOW_RAD;
        while gamma > -GAMMA_LIMIT_RAD
            && gamma < GAMMA_LIMIT_RAD
            && gamma <= gamma_init + GAMMA_SEARCH_WINDOW_RAD
        {
            let alpha = phi_l - gamma;
            let beta = phi_r + gamma;

            let t_l = s * alpha.sin() * f_l;
            let t_r = s * beta.sin() * f_r;

            let s_m = self.rig.mass_offset_mm * gamma.tan();
            let f_m = f_g * gamma.cos();
            let t_m = s_m * f_m;

            let t_delta = t_r - t_l + t_m;

            if t_delta.abs() < t_delta_best.abs() {
                t_delta_best = t_delta;
                gamma_best = gamma;
            } else {
                return gamma_best;
            }
            gamma += GAMMA_STEP_RAD;
        }
        gamma_best
    }

    fn elongation_corrected(&self, belt_length_mm: f64, belt_force: f64) -> f64 {
        let elongation_factor = 1.0 + self.rig.belt_elongation_coefficient * belt_force;
        belt_length_mm / elongation_factor
    }

    /// Solve the tilt equilibrium for `(x, y)` and return both belt lengths
    /// in motor steps. Never fails; if the refinement budget runs out the
    /// best candidate gamma is used and cached.
    pub fn belt_lengths(&mut self, x: f64, y: f64) -> BeltLengths {
        let frame_x = x + self.min_safe_x_offset;
        let frame_y = y + self.min_safe_y;

        let mut gamma = self.gamma_last;
        let mut f_l = 0.0;
        let mut f_r = 0.0;
        let mut converged = false;

        for _ in 0..SOLVER_MAX_ITERATIONS {
            let (phi_l, phi_r) = self.belt_angles(frame_x, frame_y, gamma);
            let forces = self.belt_forces(phi_l, phi_r);
            f_l = forces.0;
            f_r = forces.1;

            let gamma_prev = gamma;
            gamma = self.solve_torque_equilibrium(phi_l, phi_r, f_l, f_r, gamma);

            if (gamma_prev - gamma).abs() < GAMMA_TERMINATION_RAD {
                converged = true;
                break;
            }
        }
        if !converged {
            tracing::debug!(x, y, gamma, "tilt refinement exhausted its pass budget");
        }

        self.gamma_last = gamma;

        let (left_x, left_y) = self.left_tangent_point(frame_x, frame_y, gamma);
        let (right_x, right_y) = self.right_tangent_point(frame_x, frame_y, gamma);

        let left_leg_flat = (left_x * left_x + left_y * left_y).sqrt();
        let dx_r = self.top_distance as f64 - right_x;
        let right_leg_flat = (dx_r * dx_r + right_y * right_y).sqrt();

        let wall = self.rig.mid_pulley_to_wall_mm;
        let mut left_leg = (left_leg_flat * left_leg_flat + wall * wall).sqrt();
        let mut right_leg = (right_leg_flat * right_leg_flat + wall * wall).sqrt();

        left_leg = self.elongation_corrected(left_leg, f_l);
        right_leg = self.elongation_corrected(right_leg, f_r);

        BeltLengths {
            left: self.rig.mm_to_steps(left_leg),
            right: self.rig.mm_to_steps(right_leg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calibrated(top: i32) -> Kinematics {
        let mut kin = Kinematics::new(RigConfig::default());
        kin.set_top_distance(top);
        kin
    }

    #[test]
    fn centre_pose_is_symmetric() {
        let mut kin = calibrated(1000);
        let home = kin.home();
        let lengths = kin.belt_lengths(home.x, home.y);
        // centred sled: both belts within a couple of steps of each other
        assert!((lengths.left - lengths.right).abs() <= 2, "{lengths:?}");
        // tilt settles near zero at the centre
        assert!(kin.gamma().abs() < 1.0_f64.to_radians());
    }

    #[test]
    fn moving_right_lengthens_the_left_belt() {
        let mut kin = calibrated(1000);
        let near = kin.belt_lengths(100.0, 200.0);
        let far = kin.belt_lengths(400.0, 200.0);
        assert!(far.left > near.left);
        assert!(far.right < near.right);
    }

    #[test]
    fn solve_is_deterministic_for_the_same_seed() {
        let mut a = calibrated(1000);
        let mut b = calibrated(1000);
        for (x, y) in [(10.0, 10.0), (300.0, 150.0), (599.0, 5.0)] {
            assert_eq!(a.belt_lengths(x, y), b.belt_lengths(x, y));
        }
    }

    #[test]
    fn elongation_shortens_the_commanded_length() {
        let mut rigid = calibrated(1000);
        let mut stretchy = Kinematics::new(RigConfig {
            belt_elongation_coefficient: 5e-4,
            ..RigConfig::default()
        });
        stretchy.set_top_distance(1000);

        let a = rigid.belt_lengths(300.0, 200.0);
        let b = stretchy.belt_lengths(300.0, 200.0);
        assert!(b.left < a.left);
        assert!(b.right < a.right);
    }

    #[test]
    fn corner_pose_still_returns_finite_lengths() {
        let mut kin = calibrated(1000);
        let width = kin.width();
        let lengths = kin.belt_lengths(width, 0.0);
        assert!(lengths.left > 0);
        assert!(lengths.right > 0);
        assert!(kin.gamma().is_finite());
    }
}
