//! Parameters structure for obstacle and safety sensing

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::params::{ensure, ParamsError};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    pub bumper_use: bool,

    pub drop_use: bool,

    /// Drop sensors are normally closed contacts, active when open
    pub drop_contact_nc: bool,

    pub sonar_use: bool,

    /// Echo distance below which a sonar triggers. A distance of zero means
    /// no echo.
    ///
    /// Units: centimetres
    pub sonar_trigger_below_cm: f64,

    pub rain_use: bool,

    /// On-robot stop button fitted
    pub button_use: bool,

    pub tilt_use: bool,

    pub imu_use: bool,

    /// Time without IMU data after which communication is lost.
    ///
    /// Units: milliseconds
    pub imu_timeout_ms: u64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            bumper_use: true,
            drop_use: false,
            drop_contact_nc: true,
            sonar_use: false,
            sonar_trigger_below_cm: 30.0,
            rain_use: false,
            button_use: true,
            tilt_use: true,
            imu_use: false,
            imu_timeout_ms: 3000,
        }
    }
}

impl Params {
    pub fn are_valid(&self) -> Result<(), ParamsError> {
        ensure(
            self.sonar_trigger_below_cm > 0.0,
            "obstacle.sonar_trigger_below_cm",
            "must be positive"
        )?;
        ensure(
            !self.imu_use || self.imu_timeout_ms > 0,
            "obstacle.imu_timeout_ms",
            "must be positive when the IMU is used"
        )
    }
}
