//! Parameters structure for the perimeter engine

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::params::{ensure, ParamsError};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for perimeter boundary tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// If false the engine is never scheduled and no timeout is reported.
    pub enabled: bool,

    /// Number of samples in the running median.
    pub median_window: usize,

    /// Dead zone around zero. A smoothed magnitude must be strictly above
    /// this to count as inside.
    pub threshold: f64,

    /// Sign of the magnitude when the robot is inside the wire loop.
    pub inside_polarity: Polarity,

    /// Number of consecutive samples a new classification must hold before
    /// it is accepted.
    pub debounce_samples: u32,

    /// Time without a valid sample after which the signal is lost.
    ///
    /// Units: milliseconds
    pub timeout_ms: u64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Polarity {
    Negative,
    Positive,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            enabled: true,
            median_window: 15,
            threshold: 50.0,
            inside_polarity: Polarity::Negative,
            debounce_samples: 5,
            timeout_ms: 8000,
        }
    }
}

impl Params {
    pub fn are_valid(&self) -> Result<(), ParamsError> {
        ensure(
            self.median_window >= 1 && self.median_window <= 300,
            "perimeter.median_window",
            "must be between 1 and 300"
        )?;
        ensure(
            self.threshold >= 0.0,
            "perimeter.threshold",
            "must be non-negative"
        )?;
        ensure(
            self.debounce_samples >= 1,
            "perimeter.debounce_samples",
            "must be at least 1"
        )?;
        ensure(self.timeout_ms > 0, "perimeter.timeout_ms", "must be positive")
    }
}

impl Polarity {
    /// True if `magnitude` has this polarity. Zero has neither.
    pub fn matches(self, magnitude: f64) -> bool {
        match self {
            Polarity::Negative => magnitude < 0.0,
            Polarity::Positive => magnitude > 0.0,
        }
    }
}
