//! Power and charging supervisor
//!
//! Monitors the battery and charger, drives the charging relay and keeps the
//! charging statistics.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

pub use params::*;
pub use state::*;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PowerError {
    #[error("Invalid battery parameters: {0}")]
    InvalidParams(crate::params::ParamsError),

    #[error("Power supervisor used before being initialised")]
    NotInitialised,
}
