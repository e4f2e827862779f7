//! Simulated hardware
//!
//! Sensor values are latched: once set, a sensor returns the same value on
//! every read until it is changed or cleared. Time only moves when the owner
//! calls `advance`.
//!
//! With physics enabled, `advance` also updates the motor currents, encoder
//! counters, battery and perimeter signal from the actuator commands. The
//! robot drives along a straight line and is inside the wire loop while its
//! position is below `boundary_m`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::collections::HashMap;

use super::Hal;
use comms_if::eqpt::{ActuatorId, SensorId};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// PWM at full speed
const FULL_PWM: f64 = 255.0;

/// Wheel ground speed at full PWM.
///
/// Units: meters/second
const FULL_SPEED_MS: f64 = 0.3;

/// Wheel speed at full PWM.
///
/// Units: revolutions/minute
const FULL_WHEEL_RPM: f64 = 30.0;

const TICKS_PER_REVOLUTION: f64 = 1060.0;

/// Cutter speed at full PWM.
///
/// Units: revolutions/minute
const FULL_MOW_RPM: f64 = 3000.0;

const PERIMETER_MAGNITUDE: f64 = 300.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Simulated platform.
#[derive(Debug, Clone, Default)]
pub struct SimHal {
    now_ms: u64,
    sensors: HashMap<SensorId, f64>,
    actuators: HashMap<ActuatorId, f64>,
    physics: Option<SimPhysics>,
}

/// Simple kinematic and electrical model of the robot.
#[derive(Debug, Clone)]
pub struct SimPhysics {
    /// Units: meters
    pub position_m: f64,

    /// Units: meters
    pub boundary_m: f64,

    /// Units: volts
    pub battery_voltage: f64,

    /// Charging contacts touching
    pub on_dock: bool,

    /// Contacts touch while the position is at or below this. Units: meters
    pub dock_m: Option<f64>,

    left_ticks: f64,
    right_ticks: f64,
    mow_pulses: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Hal for SimHal {
    fn millis(&self) -> u64 {
        self.now_ms
    }

    fn read_sensor(&mut self, id: SensorId) -> Option<f64> {
        self.sensors.get(&id).copied()
    }

    fn set_actuator(&mut self, id: ActuatorId, value: f64) {
        self.actuators.insert(id, value);
    }
}

impl SimHal {
    /// A simulated platform with no sensor data at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// A simulated platform with the physics model, starting on a healthy
    /// battery inside the wire loop.
    pub fn with_physics(boundary_m: f64) -> Self {
        let mut hal = Self {
            physics: Some(SimPhysics {
                position_m: 0.0,
                boundary_m,
                battery_voltage: 28.0,
                on_dock: false,
                dock_m: None,
                left_ticks: 0.0,
                right_ticks: 0.0,
                mow_pulses: 0.0,
            }),
            ..Self::default()
        };

        hal.set_sensor(SensorId::ImuComm, 1.0);
        hal.set_sensor(SensorId::Tilt, 0.0);
        hal.set_sensor(SensorId::BumperLeft, 0.0);
        hal.set_sensor(SensorId::BumperRight, 0.0);
        hal.update_physics(0);

        hal
    }

    pub fn set_sensor(&mut self, id: SensorId, value: f64) {
        self.sensors.insert(id, value);
    }

    /// Make a sensor return "no new data".
    pub fn clear_sensor(&mut self, id: SensorId) {
        self.sensors.remove(&id);
    }

    /// Last value commanded to an actuator, zero if never commanded.
    pub fn actuator(&self, id: ActuatorId) -> f64 {
        self.actuators.get(&id).copied().unwrap_or(0.0)
    }

    /// Move time forward, updating the physics model if there is one.
    pub fn advance(&mut self, dt_ms: u64) {
        self.now_ms += dt_ms;
        self.update_physics(dt_ms);
    }

    pub fn physics(&self) -> Option<&SimPhysics> {
        self.physics.as_ref()
    }

    pub fn physics_mut(&mut self) -> Option<&mut SimPhysics> {
        self.physics.as_mut()
    }

    fn update_physics(&mut self, dt_ms: u64) {
        let left = self.actuator(ActuatorId::MotorLeft) / FULL_PWM;
        let right = self.actuator(ActuatorId::MotorRight) / FULL_PWM;
        let mow = self.actuator(ActuatorId::MotorMow) / FULL_PWM;
        let relay = self.actuator(ActuatorId::ChargeRelay) > 0.5;

        let p = match self.physics.as_mut() {
            Some(p) => p,
            None => return
        };
        let dt_s = dt_ms as f64 / 1000.0;

        p.position_m += (left + right) / 2.0 * FULL_SPEED_MS * dt_s;
        p.left_ticks += left * FULL_WHEEL_RPM / 60.0 * TICKS_PER_REVOLUTION * dt_s;
        p.right_ticks += right * FULL_WHEEL_RPM / 60.0 * TICKS_PER_REVOLUTION * dt_s;
        p.mow_pulses += mow * FULL_MOW_RPM / 60.0 * dt_s;

        if let Some(dock_m) = p.dock_m {
            p.on_dock = p.position_m <= dock_m;
        }

        let charge_current = if p.on_dock && relay {
            // Tapers off as the battery fills
            (1.2 * (29.4 - p.battery_voltage) / 2.0).max(0.05).min(1.2)
        }
        else {
            0.0
        };
        let drain = 0.2 + 0.8 * (left.abs() + right.abs()) + 1.5 * mow.abs();
        p.battery_voltage += (charge_current * 0.01 - drain * 0.0005) * dt_s;

        let magnitude = if p.position_m < p.boundary_m {
            -PERIMETER_MAGNITUDE
        }
        else {
            PERIMETER_MAGNITUDE
        };

        let readings = [
            (SensorId::MotorLeftCurrent, left.abs() * 0.8),
            (SensorId::MotorRightCurrent, right.abs() * 0.8),
            (SensorId::MotorMowCurrent, mow.abs() * 1.5),
            (SensorId::OdometryLeft, p.left_ticks.round()),
            (SensorId::OdometryRight, p.right_ticks.round()),
            (SensorId::MowRpm, p.mow_pulses.floor()),
            (SensorId::BatVoltage, p.battery_voltage),
            (SensorId::ChgCurrent, charge_current),
            (SensorId::ChgVoltage, if p.on_dock { 29.4 } else { 0.0 }),
            (SensorId::PerimeterLeft, magnitude),
            (SensorId::PerimeterRight, magnitude),
        ];
        for (id, value) in readings.iter() {
            self.sensors.insert(*id, *value);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_latched_sensors() {
        let mut hal = SimHal::new();
        assert_eq!(hal.read_sensor(SensorId::BatVoltage), None);

        hal.set_sensor(SensorId::BatVoltage, 25.0);
        assert_eq!(hal.read_sensor(SensorId::BatVoltage), Some(25.0));
        assert_eq!(hal.read_sensor(SensorId::BatVoltage), Some(25.0));

        hal.clear_sensor(SensorId::BatVoltage);
        assert_eq!(hal.read_sensor(SensorId::BatVoltage), None);
    }

    #[test]
    fn test_physics_moves_robot_outside() {
        let mut hal = SimHal::with_physics(0.5);
        assert_eq!(hal.read_sensor(SensorId::PerimeterLeft), Some(-PERIMETER_MAGNITUDE));

        hal.set_actuator(ActuatorId::MotorLeft, 255.0);
        hal.set_actuator(ActuatorId::MotorRight, 255.0);
        for _ in 0..20 {
            hal.advance(100);
        }

        assert_eq!(hal.millis(), 2000);
        assert!(hal.read_sensor(SensorId::OdometryLeft).unwrap() > 0.0);
        assert_eq!(hal.read_sensor(SensorId::PerimeterLeft), Some(PERIMETER_MAGNITUDE));
    }

    #[test]
    fn test_dock_contacts_follow_position() {
        let mut hal = SimHal::with_physics(3.0);
        if let Some(p) = hal.physics_mut() {
            p.dock_m = Some(0.1);
        }
        hal.advance(10);
        assert_eq!(hal.read_sensor(SensorId::ChgVoltage), Some(29.4));

        // 0.3 m/s for a second leaves the dock
        hal.set_actuator(ActuatorId::MotorLeft, 255.0);
        hal.set_actuator(ActuatorId::MotorRight, 255.0);
        for _ in 0..10 {
            hal.advance(100);
        }
        assert_eq!(hal.read_sensor(SensorId::ChgVoltage), Some(0.0));

        hal.set_actuator(ActuatorId::MotorLeft, -255.0);
        hal.set_actuator(ActuatorId::MotorRight, -255.0);
        for _ in 0..10 {
            hal.advance(100);
        }
        hal.set_actuator(ActuatorId::MotorLeft, 0.0);
        hal.set_actuator(ActuatorId::MotorRight, 0.0);
        hal.set_actuator(ActuatorId::ChargeRelay, 1.0);
        hal.advance(100);

        assert!(hal.physics().unwrap().on_dock);
        assert!(hal.read_sensor(SensorId::ChgCurrent).unwrap() > 0.0);
    }
}
