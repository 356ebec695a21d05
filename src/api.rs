// src/api.rs - control-surface request/response models
//! Data models for the control surface. The transport (HTTP, serial
//! console, test harness) lives outside this crate; everything here is plain
//! serde so any of them can relay the same shapes.

use serde::{Deserialize, Serialize};

use crate::config::{MotionTuning, PlannerConfig};
use crate::error::PlotterError;

/// Coarse lifecycle phase reported by `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Running,
    Paused,
    Aborting,
}

/// Snapshot of the whole core for status polling.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub phase: Phase,
    pub moving: bool,
    pub progress: i32,
    pub paused: bool,
    pub running: bool,
    pub x: f64,
    pub y: f64,
    pub pen_down: bool,
    pub planner: PlannerConfig,
    pub tuning: MotionTuning,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub start_line: usize,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SpeedsRequest {
    pub print_steps: i32,
    pub move_steps: i32,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TuningRequest {
    pub infinite_steps: i64,
    pub acceleration: i64,
}

/// Uniform request outcome: an HTTP-style code plus a human-readable message.
#[derive(Debug, Clone, Serialize)]
pub struct ApiReply {
    pub code: u16,
    pub message: String,
}

impl ApiReply {
    pub fn ok() -> Self {
        Self {
            code: 200,
            message: "ok".into(),
        }
    }

    pub fn from_error(error: &PlotterError) -> Self {
        Self {
            code: error.status_code(),
            message: error.to_string(),
        }
    }
}

impl From<Result<(), PlotterError>> for ApiReply {
    fn from(result: Result<(), PlotterError>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(e) => Self::from_error(&e),
        }
    }
}
