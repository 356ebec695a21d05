// src/motion/mod.rs - shared geometry types for the motion core
pub mod kinematics;
pub mod planner;
pub mod stepper;

pub use kinematics::{BeltLengths, Kinematics};
pub use planner::Motion;
pub use stepper::{Axis, StepperEngine};

use serde::{Deserialize, Serialize};

/// An XY pose in millimetres, origin at the upper-left corner of the safe
/// drawing rectangle. Y grows downward (distance below the top bar).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: Point) -> f64 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }
}

/// Angle at `b` between the segments `a -> b` and `b -> c`, in degrees.
/// 0 means the path continues straight on; degenerate legs count as a full
/// reversal so callers treat them as a hard corner.
pub fn angle_deg_between(a: Point, b: Point, c: Point) -> f64 {
    let v1x = b.x - a.x;
    let v1y = b.y - a.y;
    let v2x = c.x - b.x;
    let v2y = c.y - b.y;
    let l1 = (v1x * v1x + v1y * v1y).sqrt();
    let l2 = (v2x * v2x + v2y * v2y).sqrt();
    if l1 < 1e-9 || l2 < 1e-9 {
        return 180.0;
    }
    let dot = ((v1x * v2x + v1y * v2y) / (l1 * l2)).clamp(-1.0, 1.0);
    dot.acos().to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn angle_between_collinear_points_is_zero() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(5.0, 0.0);
        let c = Point::new(10.0, 0.0);
        assert!(angle_deg_between(a, b, c).abs() < 1e-9);
    }

    #[test]
    fn angle_between_right_turn_is_ninety() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(10.0, 0.0);
        let c = Point::new(10.0, 10.0);
        assert!((angle_deg_between(a, b, c) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_leg_counts_as_reversal() {
        let a = Point::new(1.0, 1.0);
        assert_eq!(angle_deg_between(a, a, Point::new(2.0, 2.0)), 180.0);
    }
}
