//! Perimeter boundary tracking
//!
//! Turns the per side perimeter wire magnitude delivered by the HAL into a
//! debounced inside/outside classification, counts boundary transitions and
//! detects loss of the wire signal.
//!
//! A lost signal is reported as `FaultKind::PerimeterTimeout` in the status
//! report. The engine never changes the operating state itself.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod median;
mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

pub use median::RunningMedian;
pub use params::*;
pub use state::*;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during perimeter tracking.
#[derive(Debug, thiserror::Error)]
pub enum PerimeterError {
    #[error("Invalid perimeter parameters: {0}")]
    InvalidParams(crate::params::ParamsError),

    #[error("Perimeter engine used before being initialised")]
    NotInitialised,
}

/// Which side of the robot a coil is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Side {
    Left,
    Right,
}
