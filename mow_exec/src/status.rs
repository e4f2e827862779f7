//! # Status reporting
//!
//! Point in time copies of the core's state for telemetry. Nothing in here
//! refers back into the live components.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Serialize;

use crate::{
    fault::FaultRecord,
    motor_ctrl::{MotorChannel, MotorId},
    perimeter::PerimeterTrack,
    power::BatteryState,
    sensing::LastTrigger,
    state_machine::OperatingState,
    stats::RobotStats,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Full snapshot of the robot.
#[derive(Debug, Clone, Serialize)]
pub struct RobotStatus {
    pub time_ms: u64,
    pub state: OperatingState,
    pub state_entered_at_ms: u64,
    pub perimeter_left: PerimeterTrack,
    pub perimeter_right: PerimeterTrack,
    pub motors: Vec<MotorChannel>,
    pub faults: Vec<FaultRecord>,
    pub battery: BatteryState,
    pub stats: RobotStats,
    pub last_obstacle: Option<LastTrigger>,

    /// Time since the last sensor activity
    pub idle_ms: u64,
}

/// One flat CSV row of telemetry.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryRow {
    pub time_ms: u64,
    pub state: OperatingState,
    pub perimeter_left_inside: bool,
    pub perimeter_right_inside: bool,
    pub perimeter_left_mag: f64,
    pub perimeter_right_mag: f64,
    pub pwm_left: f64,
    pub pwm_right: f64,
    pub pwm_mow: f64,
    pub current_left: f64,
    pub current_right: f64,
    pub current_mow: f64,
    pub voltage: f64,
    pub charge_current: f64,
    pub is_charging: bool,
    pub faults_since_reset: u32,
    pub loops_per_sec: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl RobotStatus {
    pub fn motor(&self, id: MotorId) -> Option<&MotorChannel> {
        self.motors.iter().find(|m| m.id == id)
    }

    /// Flatten into a telemetry row.
    pub fn row(&self) -> TelemetryRow {
        let pwm = |id| self.motor(id).map_or(0.0, |m| m.pwm_current);
        let current = |id| self.motor(id).map_or(0.0, |m| m.sense_current);

        TelemetryRow {
            time_ms: self.time_ms,
            state: self.state,
            perimeter_left_inside: self.perimeter_left.inside,
            perimeter_right_inside: self.perimeter_right.inside,
            perimeter_left_mag: self.perimeter_left.smoothed_magnitude,
            perimeter_right_mag: self.perimeter_right.smoothed_magnitude,
            pwm_left: pwm(MotorId::Left),
            pwm_right: pwm(MotorId::Right),
            pwm_mow: pwm(MotorId::Mow),
            current_left: current(MotorId::Left),
            current_right: current(MotorId::Right),
            current_mow: current(MotorId::Mow),
            voltage: self.battery.voltage,
            charge_current: self.battery.charge_current,
            is_charging: self.battery.is_charging,
            faults_since_reset: self.faults.iter().map(|f| f.count_since_reset).sum(),
            loops_per_sec: self.stats.loops_per_sec,
        }
    }
}
