//! Obstacle and safety sensing
//!
//! `ObstacleMonitor` counts bumper, drop, sonar and rain triggers.
//! `SafetyMonitor` watches the tilt sensor and the IMU link, whose faults
//! always force the Error state.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod obstacle;
mod params;
mod safety;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

pub use obstacle::*;
pub use params::*;
pub use safety::*;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SensingError {
    #[error("Invalid obstacle parameters: {0}")]
    InvalidParams(crate::params::ParamsError),

    #[error("Sensing used before being initialised")]
    NotInitialised,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Digital inputs are active above half scale.
pub(crate) fn is_high(value: f64) -> bool {
    value > 0.5
}
