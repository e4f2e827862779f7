//! # Mower parameters
//!
//! All tunables of the mower, read from `params/mower.toml`. Every section
//! has defaults, so a file only needs the values that differ from them.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Internal
use crate::{
    bridge_mon,
    fault::{FaultKind, FaultThreshold},
    motor_ctrl,
    odometry,
    perimeter,
    power,
    remote,
    sched::SchedParams,
    sensing,
};
use util::logger::LogParams;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the whole mower.
///
/// `fault_thresholds` must stay the last field, TOML arrays of tables have to
/// follow every other table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MowerParams {
    pub log: LogParams,
    pub sched: SchedParams,
    pub state: StateParams,
    pub motor: motor_ctrl::Params,
    pub perimeter: perimeter::Params,
    pub battery: power::Params,
    pub obstacle: sensing::Params,
    pub odometry: odometry::Params,
    pub bridge: bridge_mon::Params,
    pub remote: remote::Params,

    /// Escalation thresholds. Kinds not listed never escalate by count.
    pub fault_thresholds: Vec<FaultThreshold>,
}

/// Parameters of the state machine and its guards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateParams {
    /// Longest time both wheels may drive forwards without a perimeter or
    /// obstacle event. Zero disables the guard.
    ///
    /// Units: milliseconds
    pub forward_time_max_ms: u64,

    /// Main loop rate below which the CPU is too slow
    pub min_loops_per_sec: f64,

    /// Consecutive slow seconds before a `CpuSpeed` fault
    pub cpu_low_count_max: u32,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("{0}: {1}")]
    Invalid(&'static str, &'static str),

    #[error("More than one threshold given for {0}")]
    DuplicateThreshold(FaultKind),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for MowerParams {
    fn default() -> Self {
        use FaultKind::*;

        let threshold = |kind, max_count| FaultThreshold { kind, max_count };

        Self {
            log: LogParams::default(),
            sched: SchedParams::default(),
            state: StateParams::default(),
            motor: motor_ctrl::Params::default(),
            perimeter: perimeter::Params::default(),
            battery: power::Params::default(),
            obstacle: sensing::Params::default(),
            odometry: odometry::Params::default(),
            bridge: bridge_mon::Params::default(),
            remote: remote::Params::default(),
            fault_thresholds: vec![
                threshold(MotorLeft, 10),
                threshold(MotorRight, 10),
                threshold(MotorMow, 10),
                threshold(MotorLeftOvercurrent, 10),
                threshold(MotorRightOvercurrent, 10),
                threshold(MotorMowOvercurrent, 10),
                threshold(PerimeterTimeout, 10),
                threshold(OdometryLeft, 10),
                threshold(OdometryRight, 10),
                threshold(Charger, 3),
                threshold(CpuSpeed, 10),
            ],
        }
    }
}

impl Default for StateParams {
    fn default() -> Self {
        Self {
            forward_time_max_ms: 80_000,
            min_loops_per_sec: 10.0,
            cpu_low_count_max: 10,
        }
    }
}

impl MowerParams {
    /// Check every section.
    pub fn are_valid(&self) -> Result<(), ParamsError> {
        self.sched.are_valid()?;
        self.motor.are_valid()?;
        self.perimeter.are_valid()?;
        self.battery.are_valid()?;
        self.obstacle.are_valid()?;
        self.odometry.are_valid()?;
        self.bridge.are_valid()?;
        self.remote.are_valid()?;

        ensure(
            self.state.min_loops_per_sec >= 0.0,
            "state.min_loops_per_sec",
            "must be non-negative"
        )?;

        for (i, t) in self.fault_thresholds.iter().enumerate() {
            ensure(t.max_count >= 1, "fault_thresholds", "max_count must be at least 1")?;

            if self.fault_thresholds[..i].iter().any(|o| o.kind == t.kind) {
                return Err(ParamsError::DuplicateThreshold(t.kind));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Fail with `ParamsError::Invalid` unless `condition` holds.
pub(crate) fn ensure(
    condition: bool,
    name: &'static str,
    reason: &'static str
) -> Result<(), ParamsError> {
    if condition {
        Ok(())
    }
    else {
        Err(ParamsError::Invalid(name, reason))
    }
}
