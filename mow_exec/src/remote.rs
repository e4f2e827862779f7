//! # R/C remote control
//!
//! Converts the pulse widths of a hobby R/C receiver into slider values and
//! mixes them into wheel and cutter demands for the RemoteControl state.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::debug;
use serde::{Deserialize, Serialize};

// Internal
use crate::params::{ensure, ParamsError};
use util::{maths::clamp, module::State};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Pulse width of a centred stick.
///
/// Units: microseconds
const PULSE_CENTRE_US: f64 = 1500.0;

/// Pulse width change from centre to full deflection.
///
/// Units: microseconds
const PULSE_SPAN_US: f64 = 500.0;

/// Pulses outside this range are not from a receiver.
///
/// Units: microseconds
const PULSE_VALID_US: (f64, f64) = (900.0, 2100.0);

/// Slider value above which the switch channel is on, and below the negative
/// of which it is off.
const SWITCH_THRESHOLD: f64 = 50.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    pub enabled: bool,

    /// Slider values closer to zero than this read as zero.
    pub dead_band: f64,

    /// Mow slider value above which the cutter runs.
    pub mow_threshold: f64,

    /// Cutter demand while the mow slider is on.
    pub mow_demand: f64,

    /// Wheel demand at full speed stick.
    pub max_speed: f64,
}

/// Remote control module state.
#[derive(Debug, Default)]
pub struct Remote {
    params: Option<Params>,
    switch_on: Option<bool>,
}

/// Raw pulse widths, `None` if the channel has no new pulse.
///
/// Units: microseconds
#[derive(Debug, Clone, Copy, Default)]
pub struct InputData {
    pub speed_us: Option<f64>,
    pub steer_us: Option<f64>,
    pub mow_us: Option<f64>,
    pub switch_us: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct OutputData {
    pub left: f64,
    pub right: f64,
    pub mow: f64,

    /// A stick moved outside the dead band
    pub active: bool,

    /// The switch channel changed position this tick
    pub switch_changed: Option<bool>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("Invalid remote parameters: {0}")]
    InvalidParams(ParamsError),

    #[error("Remote used before being initialised")]
    NotInitialised,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            enabled: false,
            dead_band: 5.0,
            mow_threshold: 50.0,
            mow_demand: 255.0,
            max_speed: 255.0,
        }
    }
}

impl Params {
    pub fn are_valid(&self) -> Result<(), ParamsError> {
        ensure(
            self.dead_band >= 0.0 && self.dead_band < 100.0,
            "remote.dead_band",
            "must be between 0 and 100"
        )?;
        ensure(
            self.mow_threshold > 0.0 && self.mow_threshold <= 100.0,
            "remote.mow_threshold",
            "must be between 0 and 100"
        )?;
        ensure(self.max_speed > 0.0, "remote.max_speed", "must be positive")
    }
}

impl State for Remote {
    type InitData = Params;
    type InitError = RemoteError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = ();
    type ProcError = RemoteError;

    fn init(&mut self, init_data: Self::InitData)
        -> Result<(), Self::InitError>
    {
        init_data.are_valid().map_err(RemoteError::InvalidParams)?;
        self.params = Some(init_data);
        Ok(())
    }

    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        let params = self.params
            .as_ref()
            .ok_or(RemoteError::NotInitialised)?;

        let slider = |pulse: Option<f64>| {
            pulse.map(|p| rc_value(p, params.dead_band)).unwrap_or(0.0)
        };

        let speed = slider(input_data.speed_us);
        let steer = slider(input_data.steer_us);
        let mow = slider(input_data.mow_us);

        let (left, right) = mix(speed, steer, params.max_speed);

        let mut output = OutputData {
            left,
            right,
            mow: if mow > params.mow_threshold { params.mow_demand } else { 0.0 },
            active: speed != 0.0 || steer != 0.0 || mow != 0.0,
            switch_changed: None,
        };

        // The switch has hysteresis, between the thresholds it keeps its
        // position
        if let Some(p) = input_data.switch_us {
            let value = rc_value(p, params.dead_band);
            let position = if value > SWITCH_THRESHOLD {
                Some(true)
            }
            else if value < -SWITCH_THRESHOLD {
                Some(false)
            }
            else {
                None
            };

            if let Some(on) = position {
                if self.switch_on.map_or(false, |last| last != on) {
                    debug!("Remote switch {}", if on { "on" } else { "off" });
                    output.switch_changed = Some(on);
                }
                self.switch_on = Some(on);
            }
        }

        Ok((output, ()))
    }
}

impl Remote {
    pub fn new() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Convert a pulse width to a slider value in `[-100, 100]`.
///
/// Invalid pulse widths and values inside the dead band read as zero.
pub fn rc_value(pulse_us: f64, dead_band: f64) -> f64 {
    if !pulse_us.is_finite()
        || pulse_us < PULSE_VALID_US.0
        || pulse_us > PULSE_VALID_US.1
    {
        return 0.0;
    }

    let value = clamp(
        (pulse_us - PULSE_CENTRE_US) / PULSE_SPAN_US * 100.0,
        -100.0,
        100.0
    );

    if value.abs() < dead_band {
        0.0
    }
    else {
        value
    }
}

/// Mix speed and steer sliders into left and right wheel demands.
///
/// Steering gets half the speed range and is mirrored when reversing so that
/// the stick turns the robot the same way in both directions.
fn mix(speed: f64, steer: f64, max_speed: f64) -> (f64, f64) {
    let mut steer = max_speed / 2.0 * steer / 100.0;
    if speed < 0.0 {
        steer = -steer;
    }
    let base = max_speed * speed / 100.0;

    (
        clamp(base + steer, -max_speed, max_speed),
        clamp(base - steer, -max_speed, max_speed)
    )
}

#[cfg(test)]
mod test {
    use super::*;

    fn remote() -> Remote {
        let mut r = Remote::new();
        r.init(Params { enabled: true, max_speed: 200.0, ..Params::default() }).unwrap();
        r
    }

    #[test]
    fn test_rc_value() {
        assert_eq!(rc_value(1500.0, 5.0), 0.0);
        assert_eq!(rc_value(2000.0, 5.0), 100.0);
        assert_eq!(rc_value(1000.0, 5.0), -100.0);
        assert_eq!(rc_value(1750.0, 5.0), 50.0);

        // Beyond full deflection but still a valid pulse
        assert_eq!(rc_value(2050.0, 5.0), 100.0);

        // Dead band
        assert_eq!(rc_value(1520.0, 5.0), 0.0);

        // Invalid
        assert_eq!(rc_value(0.0, 5.0), 0.0);
        assert_eq!(rc_value(2500.0, 5.0), 0.0);
        assert_eq!(rc_value(std::f64::NAN, 5.0), 0.0);
    }

    #[test]
    fn test_mixing() {
        let mut r = remote();

        let (out, _) = r.proc(&InputData {
            speed_us: Some(2000.0),
            steer_us: Some(1500.0),
            ..InputData::default()
        }).unwrap();
        assert_eq!((out.left, out.right), (200.0, 200.0));
        assert!(out.active);

        // Turning right in place
        let (out, _) = r.proc(&InputData {
            speed_us: Some(1500.0),
            steer_us: Some(2000.0),
            ..InputData::default()
        }).unwrap();
        assert_eq!((out.left, out.right), (100.0, -100.0));

        // Same stick while reversing turns the same way
        let (out, _) = r.proc(&InputData {
            speed_us: Some(1250.0),
            steer_us: Some(2000.0),
            ..InputData::default()
        }).unwrap();
        assert_eq!((out.left, out.right), (-200.0, 0.0));
    }

    #[test]
    fn test_mow_threshold_and_idle() {
        let mut r = remote();

        let (out, _) = r.proc(&InputData { mow_us: Some(1900.0), ..InputData::default() }).unwrap();
        assert_eq!(out.mow, 255.0);

        let (out, _) = r.proc(&InputData::default()).unwrap();
        assert_eq!(out.mow, 0.0);
        assert!(!out.active);
    }

    #[test]
    fn test_switch_edges() {
        let mut r = remote();
        let switch = |us| InputData { switch_us: Some(us), ..InputData::default() };

        // First reading only sets the position
        assert_eq!(r.proc(&switch(1000.0)).unwrap().0.switch_changed, None);
        assert_eq!(r.proc(&switch(1500.0)).unwrap().0.switch_changed, None);
        assert_eq!(r.proc(&switch(2000.0)).unwrap().0.switch_changed, Some(true));
        assert_eq!(r.proc(&switch(2000.0)).unwrap().0.switch_changed, None);
        assert_eq!(r.proc(&switch(1000.0)).unwrap().0.switch_changed, Some(false));
    }
}
