// src/job/lookahead.rs - buffered command queue: arc expansion, filter, merge
use std::collections::VecDeque;
use std::f64::consts::TAU;

use crate::config::PlannerConfig;
use crate::motion::{angle_deg_between, Point};

/// One buffered command awaiting planning. Moves produced by arc
/// tessellation are `protected`: the filter/merge pass never drops them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QueuedCommand {
    Pen { down: bool },
    Move { point: Point, protected: bool },
}

impl QueuedCommand {
    pub fn move_point(&self) -> Option<Point> {
        match self {
            QueuedCommand::Move { point, .. } => Some(*point),
            QueuedCommand::Pen { .. } => None,
        }
    }
}

/// Start/end radii may differ by at most this much before the arc is
/// rejected and replaced by a straight line to its endpoint.
const ARC_RADIUS_TOLERANCE_MM: f64 = 0.25;
const ARC_MAX_SEGMENTS: usize = 4096;

/// Expand a circular arc into equally spaced protected points, ending
/// exactly (bit-for-bit) at the declared endpoint. Returns the new virtual
/// position.
///
/// Degenerate arcs (zero radius, mismatched radii, zero sweep) degrade to a
/// straight unprotected move to the endpoint.
pub fn tessellate_arc(
    queue: &mut VecDeque<QueuedCommand>,
    start: Point,
    end: Point,
    center_i: f64,
    center_j: f64,
    cw: bool,
    cfg: &PlannerConfig,
) -> Point {
    let cx = start.x + center_i;
    let cy = start.y + center_j;
    let r_start = (start.x - cx).hypot(start.y - cy);
    let r_end = (end.x - cx).hypot(end.y - cy);

    if r_start < 1e-6 || (r_start - r_end).abs() > ARC_RADIUS_TOLERANCE_MM {
        queue.push_back(QueuedCommand::Move {
            point: end,
            protected: false,
        });
        return end;
    }

    let a0 = (start.y - cy).atan2(start.x - cx);
    let a1 = (end.y - cy).atan2(end.x - cx);
    let mut sweep = a1 - a0;
    if cw {
        if sweep >= 0.0 {
            sweep -= TAU;
        }
    } else if sweep <= 0.0 {
        sweep += TAU;
    }
    let sweep_abs = sweep.abs();
    if sweep_abs < 1e-6 {
        queue.push_back(QueuedCommand::Move {
            point: end,
            protected: false,
        });
        return end;
    }

    // chord-error bound on the step angle, raised for very short segments
    let chord_err = (0.5 * cfg.min_segment_len_mm)
        .max(0.5 * cfg.junction_deviation_mm)
        .clamp(0.02, 0.5);
    let mut step = 2.0 * (1.0 - chord_err / r_start).clamp(-1.0, 1.0).acos();
    if step <= 1e-6 {
        step = TAU / 360.0;
    }
    if cfg.min_segment_len_mm > 1e-6 {
        let min_step_by_len = cfg.min_segment_len_mm / r_start;
        if min_step_by_len > step {
            step = min_step_by_len;
        }
    }

    let n = ((sweep_abs / step).ceil() as usize).clamp(1, ARC_MAX_SEGMENTS);
    for k in 1..=n {
        let point = if k == n {
            end
        } else {
            let a = a0 + sweep * (k as f64 / n as f64);
            Point::new(cx + a.cos() * r_start, cy + a.sin() * r_start)
        };
        queue.push_back(QueuedCommand::Move {
            point,
            protected: true,
        });
    }
    end
}

/// Filter/merge pass over a freshly filled queue: drop unprotected moves
/// shorter than the minimum segment length, then merge runs of collinear
/// unprotected moves until a fixpoint.
pub fn optimize(queue: &mut VecDeque<QueuedCommand>, start: Point, cfg: &PlannerConfig) {
    // drop segment noise
    let mut prev = start;
    let mut i = 0;
    while i < queue.len() {
        if let QueuedCommand::Move { point, protected } = queue[i] {
            if !protected && prev.distance_to(point) < cfg.min_segment_len_mm {
                let _ = queue.remove(i);
                continue;
            }
            prev = point;
        }
        i += 1;
    }

    // collinear merge over move triples
    let mut changed = true;
    while changed {
        changed = false;
        let mut anchor = start;
        let mut i = 0;
        while i + 2 < queue.len() {
            if queue[i].move_point().is_none() {
                anchor = start;
                i += 1;
                continue;
            }
            if i > 0 {
                if let Some(point) = queue[i - 1].move_point() {
                    anchor = point;
                }
            }

            let (first_protected, b, b_protected, c, c_protected) =
                match (queue[i], queue[i + 1], queue[i + 2]) {
                    (
                        QueuedCommand::Move { protected: p0, .. },
                        QueuedCommand::Move {
                            point: b,
                            protected: p1,
                        },
                        QueuedCommand::Move {
                            point: c,
                            protected: p2,
                        },
                    ) => (p0, b, p1, c, p2),
                    _ => {
                        i += 1;
                        continue;
                    }
                };
            if first_protected || b_protected || c_protected {
                i += 1;
                continue;
            }

            let angle = angle_deg_between(anchor, b, c);
            if angle <= cfg.collinear_deg {
                let _ = queue.remove(i + 1);
                changed = true;
                break;
            }
            i += 1;
        }
    }
}
