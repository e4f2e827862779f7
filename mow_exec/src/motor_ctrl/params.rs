//! Parameters structure for motor control

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::params::{ensure, ParamsError};
use crate::pid::PidParams;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the wheel and cutter channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Invert the left wheel PWM (reversed wiring)
    pub left_swap_dir: bool,

    /// Invert the right wheel PWM (reversed wiring)
    pub right_swap_dir: bool,

    /// Shared by both wheel channels
    pub wheel: ChannelParams,

    /// Cutter channel
    pub mow: ChannelParams,
}

/// Parameters of a single motor channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelParams {
    /// Highest PWM magnitude that may be commanded.
    pub max_pwm: f64,

    /// Ramp rate of the PWM.
    ///
    /// Units: PWM/second
    pub accel: f64,

    /// Below this filtered current a commanded motor is considered not to be
    /// moving. Zero disables stall detection.
    ///
    /// Units: amperes
    pub min_motion_current: f64,

    /// How long a commanded motor may draw less than `min_motion_current`
    /// before it is declared stalled.
    ///
    /// Units: milliseconds
    pub zero_settle_time_ms: u64,

    /// Filtered current above which the PWM is cut.
    ///
    /// Units: amperes
    pub overcurrent: f64,

    /// Weight of a new current sample in the sense filter, in `(0, 1]`.
    pub sense_filter: f64,

    pub mode: ControlMode,

    /// Speed loop gains, only used in `ControlMode::RpmFeedback`. The output
    /// limits are overridden by `max_pwm`.
    pub pid: PidParams,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// How a channel turns its demand into a PWM setpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlMode {
    /// The demand is a PWM value
    OpenLoop,

    /// The demand is a speed in RPM, closed through the channel's PID
    RpmFeedback,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            left_swap_dir: false,
            right_swap_dir: false,
            wheel: ChannelParams::default(),
            mow: ChannelParams {
                max_pwm: 255.0,
                accel: 100.0,
                min_motion_current: 0.0,
                zero_settle_time_ms: 2000,
                overcurrent: 4.0,
                sense_filter: 0.2,
                mode: ControlMode::OpenLoop,
                pid: PidParams {
                    k_p: 0.005,
                    k_i: 0.01,
                    k_d: 0.01,
                    output_min: 0.0,
                    output_max: 255.0,
                },
            },
        }
    }
}

impl Default for ChannelParams {
    fn default() -> Self {
        Self {
            max_pwm: 255.0,
            accel: 1000.0,
            min_motion_current: 0.1,
            zero_settle_time_ms: 2000,
            overcurrent: 1.5,
            sense_filter: 0.2,
            mode: ControlMode::OpenLoop,
            pid: PidParams {
                k_p: 1.5,
                k_i: 0.29,
                k_d: 0.25,
                output_min: -255.0,
                output_max: 255.0,
            },
        }
    }
}

impl Params {
    pub fn are_valid(&self) -> Result<(), ParamsError> {
        self.wheel.are_valid("motor.wheel")?;
        self.mow.are_valid("motor.mow")
    }
}

impl ChannelParams {
    pub fn are_valid(&self, section: &'static str) -> Result<(), ParamsError> {
        ensure(self.max_pwm > 0.0, section, "max_pwm must be positive")?;
        ensure(self.accel > 0.0, section, "accel must be positive")?;
        ensure(
            self.min_motion_current >= 0.0,
            section,
            "min_motion_current must be non-negative"
        )?;
        ensure(
            self.overcurrent > self.min_motion_current,
            section,
            "overcurrent must be above min_motion_current"
        )?;
        ensure(
            self.sense_filter > 0.0 && self.sense_filter <= 1.0,
            section,
            "sense_filter must be in (0, 1]"
        )?;
        ensure(self.pid.is_valid(), section, "pid gains or limits invalid")
    }
}
