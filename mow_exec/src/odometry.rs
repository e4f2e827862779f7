//! # Odometry
//!
//! Turns the wheel encoder and cutter tachometer counters sampled by the HAL
//! into speeds, and checks that driven wheels actually turn.
//!
//! The counters are cumulative. The HAL hands over a consistent snapshot
//! once per tick, so the speed is the counter difference over the time since
//! the previous tick.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::warn;
use serde::{Deserialize, Serialize};

// Internal
use crate::fault::FaultKind;
use crate::params::{ensure, ParamsError};
use util::module::State;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const MS_PER_MINUTE: f64 = 60_000.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    pub enabled: bool,

    /// Encoder ticks per wheel revolution
    pub ticks_per_revolution: f64,

    /// Invert the left encoder count
    pub left_swap_dir: bool,

    pub right_swap_dir: bool,

    /// Tachometer pulses per cutter revolution
    pub mow_pulses_per_revolution: f64,

    /// PWM magnitude above which a wheel is expected to turn
    pub fault_pwm_min: f64,

    /// How long a driven wheel may disagree with its encoder.
    ///
    /// Units: milliseconds
    pub fault_time_ms: u64,
}

/// Odometry module state.
#[derive(Debug, Default)]
pub struct Odometry {
    params: Option<Params>,
    left: Wheel,
    right: Wheel,
    mow: Counter,
    last_tick_ms: Option<u64>,
}

#[derive(Debug, Default)]
struct Counter {
    last: Option<f64>,
    rpm: Option<f64>,
}

#[derive(Debug, Default)]
struct Wheel {
    counter: Counter,
    disagree_since_ms: Option<u64>,
    faulted: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InputData {
    pub now_ms: u64,

    /// Cumulative encoder counts
    pub left_ticks: Option<f64>,
    pub right_ticks: Option<f64>,

    /// Cumulative cutter tachometer pulses
    pub mow_pulses: Option<f64>,

    /// Logical PWM currently applied to each wheel
    pub pwm_left: f64,
    pub pwm_right: f64,
}

/// Measured speeds, `None` until two samples have been received.
///
/// Units: revolutions/minute
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct OutputData {
    pub left_rpm: Option<f64>,
    pub right_rpm: Option<f64>,
    pub mow_rpm: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusReport {
    pub faults: Vec<FaultKind>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum OdometryError {
    #[error("Invalid odometry parameters: {0}")]
    InvalidParams(ParamsError),

    #[error("Odometry used before being initialised")]
    NotInitialised,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            enabled: false,
            ticks_per_revolution: 1060.0,
            left_swap_dir: false,
            right_swap_dir: false,
            mow_pulses_per_revolution: 1.0,
            fault_pwm_min: 60.0,
            fault_time_ms: 3000,
        }
    }
}

impl Params {
    pub fn are_valid(&self) -> Result<(), ParamsError> {
        ensure(
            self.ticks_per_revolution > 0.0,
            "odometry.ticks_per_revolution",
            "must be positive"
        )?;
        ensure(
            self.mow_pulses_per_revolution > 0.0,
            "odometry.mow_pulses_per_revolution",
            "must be positive"
        )?;
        ensure(self.fault_pwm_min >= 0.0, "odometry.fault_pwm_min", "must be non-negative")
    }
}

impl State for Odometry {
    type InitData = Params;
    type InitError = OdometryError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = OdometryError;

    fn init(&mut self, init_data: Self::InitData)
        -> Result<(), Self::InitError>
    {
        init_data.are_valid().map_err(OdometryError::InvalidParams)?;
        self.params = Some(init_data);
        Ok(())
    }

    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        let params = self.params
            .as_ref()
            .ok_or(OdometryError::NotInitialised)?;
        let now_ms = input_data.now_ms;

        let dt_ms = match self.last_tick_ms {
            Some(t) => now_ms.saturating_sub(t),
            None => 0
        };
        self.last_tick_ms = Some(now_ms);

        let sign = |swap: bool| if swap { -1.0 } else { 1.0 };

        self.left.counter.update(
            input_data.left_ticks.map(|t| t * sign(params.left_swap_dir)),
            params.ticks_per_revolution,
            dt_ms
        );
        self.right.counter.update(
            input_data.right_ticks.map(|t| t * sign(params.right_swap_dir)),
            params.ticks_per_revolution,
            dt_ms
        );
        self.mow.update(
            input_data.mow_pulses,
            params.mow_pulses_per_revolution,
            dt_ms
        );

        let mut report = StatusReport::default();

        if self.left.check(params, input_data.pwm_left, now_ms) {
            warn!("Left wheel driven but encoder disagrees");
            report.faults.push(FaultKind::OdometryLeft);
        }
        if self.right.check(params, input_data.pwm_right, now_ms) {
            warn!("Right wheel driven but encoder disagrees");
            report.faults.push(FaultKind::OdometryRight);
        }

        Ok((self.output(), report))
    }
}

impl Odometry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(&self) -> OutputData {
        OutputData {
            left_rpm: self.left.counter.rpm,
            right_rpm: self.right.counter.rpm,
            mow_rpm: self.mow.rpm,
        }
    }
}

impl Counter {
    fn update(&mut self, count: Option<f64>, per_rev: f64, dt_ms: u64) {
        let count = match count.filter(|c| c.is_finite()) {
            Some(c) => c,
            None => return
        };

        if let Some(last) = self.last {
            if dt_ms > 0 {
                self.rpm = Some(
                    (count - last) / per_rev * MS_PER_MINUTE / dt_ms as f64
                );
            }
        }
        self.last = Some(count);
    }
}

impl Wheel {
    /// Returns true when a new fault episode starts.
    fn check(&mut self, params: &Params, pwm: f64, now_ms: u64) -> bool {
        let disagrees = match self.counter.rpm {
            Some(rpm) if pwm.abs() > params.fault_pwm_min => {
                rpm == 0.0 || rpm.signum() != pwm.signum()
            },
            _ => false
        };

        if !disagrees {
            self.disagree_since_ms = None;
            self.faulted = false;
            return false;
        }

        let since = *self.disagree_since_ms.get_or_insert(now_ms);
        if self.faulted || now_ms.saturating_sub(since) <= params.fault_time_ms {
            return false;
        }

        self.faulted = true;
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    fn odometry() -> Odometry {
        let mut o = Odometry::new();
        o.init(Params {
            enabled: true,
            ticks_per_revolution: 100.0,
            right_swap_dir: true,
            fault_time_ms: 1000,
            ..Params::default()
        }).unwrap();
        o
    }

    #[test]
    fn test_rpm() {
        let mut o = odometry();

        let (out, _) = o.proc(&InputData {
            now_ms: 0,
            left_ticks: Some(0.0),
            right_ticks: Some(0.0),
            mow_pulses: Some(0.0),
            ..InputData::default()
        }).unwrap();
        assert_eq!(out.left_rpm, None);

        // 50 ticks in 500 ms at 100 ticks/rev is 60 RPM
        let (out, _) = o.proc(&InputData {
            now_ms: 500,
            left_ticks: Some(50.0),
            right_ticks: Some(50.0),
            mow_pulses: Some(25.0),
            ..InputData::default()
        }).unwrap();

        assert_relative_eq!(out.left_rpm.unwrap(), 60.0);
        assert_relative_eq!(out.right_rpm.unwrap(), -60.0);
        assert_relative_eq!(out.mow_rpm.unwrap(), 3000.0);
    }

    #[test]
    fn test_fault_once_per_episode() {
        let mut o = odometry();
        let mut faults = Vec::new();

        // Left wheel driven forward, encoder not moving
        for i in 0..50 {
            let (_, report) = o.proc(&InputData {
                now_ms: i * 100,
                left_ticks: Some(0.0),
                right_ticks: Some(-(i as f64) * 10.0),
                pwm_left: 100.0,
                pwm_right: 100.0,
                ..InputData::default()
            }).unwrap();
            faults.extend(report.faults);
        }

        assert_eq!(faults, vec![FaultKind::OdometryLeft]);
    }

    #[test]
    fn test_low_pwm_is_not_checked() {
        let mut o = odometry();

        for i in 0..50 {
            let (_, report) = o.proc(&InputData {
                now_ms: i * 100,
                left_ticks: Some(0.0),
                right_ticks: Some(0.0),
                pwm_left: 30.0,
                pwm_right: -30.0,
                ..InputData::default()
            }).unwrap();
            assert!(report.faults.is_empty());
        }
    }
}
