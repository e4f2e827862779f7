//! Parameters structure for the power supervisor

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::params::{ensure, ParamsError};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Battery and charging parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// If false low battery is never reported.
    pub monitor: bool,

    /// Operating below this voltage forces the robot off.
    ///
    /// Units: volts
    pub switch_off_if_below: f64,

    /// Minutes idle in Off after which the battery switch is opened. Zero
    /// disables the switch off.
    pub switch_off_if_idle_min: u32,

    /// A single charge current sample above this is a charger fault.
    ///
    /// Units: amperes
    pub charging_current_max: f64,

    /// Charge current below which the battery is considered full.
    ///
    /// Units: amperes
    pub full_current: f64,

    /// How long the charge current must stay below `full_current`.
    ///
    /// Units: milliseconds
    pub full_sustain_ms: u64,

    /// Longest allowed charging session.
    ///
    /// Units: milliseconds
    pub charging_timeout_ms: u64,

    /// Docked robots start charging again below this voltage.
    ///
    /// Units: volts
    pub start_charging_if_below: f64,

    /// Charge voltage above which the charging contacts are closed.
    ///
    /// Units: volts
    pub charge_contact_voltage: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            monitor: true,
            switch_off_if_below: 21.7,
            switch_off_if_idle_min: 1,
            charging_current_max: 1.6,
            full_current: 0.3,
            full_sustain_ms: 60_000,
            charging_timeout_ms: 12_600_000,
            start_charging_if_below: 27.0,
            charge_contact_voltage: 5.0,
        }
    }
}

impl Params {
    pub fn are_valid(&self) -> Result<(), ParamsError> {
        ensure(
            self.switch_off_if_below > 0.0,
            "battery.switch_off_if_below",
            "must be positive"
        )?;
        ensure(
            self.start_charging_if_below > self.switch_off_if_below,
            "battery.start_charging_if_below",
            "must be above switch_off_if_below"
        )?;
        ensure(
            self.full_current >= 0.0 && self.full_current < self.charging_current_max,
            "battery.full_current",
            "must be between zero and charging_current_max"
        )?;
        ensure(
            self.charging_timeout_ms > 0,
            "battery.charging_timeout_ms",
            "must be positive"
        )?;
        ensure(
            self.charge_contact_voltage > 0.0,
            "battery.charge_contact_voltage",
            "must be positive"
        )
    }
}
