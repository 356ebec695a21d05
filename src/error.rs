// src/error.rs - error taxonomy shared across the control surface and job pipeline
use thiserror::Error;

/// Everything a caller of the motion core can be told went wrong.
///
/// Each variant carries a human-readable message and maps to an HTTP-style
/// status code so whichever transport fronts the control surface can relay
/// failures without inspecting the variant.
#[derive(Debug, Error)]
pub enum PlotterError {
    /// Movement requested before homing, or before the rig is calibrated.
    #[error("not ready: {0}")]
    NotReady(&'static str),

    /// Out-of-range coordinates, non-positive speed, malformed config values.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Command file missing, missing its header lines, or truncated.
    #[error("bad command file: {0}")]
    BadFile(String),

    /// The settings store or command-file storage could not be reached.
    #[error("storage unavailable: {0}")]
    ResourceUnavailable(String),

    /// An upload or start collided with an active job.
    #[error("busy: {0}")]
    Busy(&'static str),
}

impl PlotterError {
    /// HTTP-style status code for the control surface.
    pub fn status_code(&self) -> u16 {
        match self {
            PlotterError::NotReady(_) => 503,
            PlotterError::InvalidArgument(_) => 400,
            PlotterError::BadFile(_) => 422,
            PlotterError::ResourceUnavailable(_) => 503,
            PlotterError::Busy(_) => 409,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(PlotterError::NotReady("x").status_code(), 503);
        assert_eq!(
            PlotterError::InvalidArgument("x".into()).status_code(),
            400
        );
        assert_eq!(PlotterError::BadFile("x".into()).status_code(), 422);
        assert_eq!(
            PlotterError::ResourceUnavailable("x".into()).status_code(),
            503
        );
        assert_eq!(PlotterError::Busy("x").status_code(), 409);
    }
}
