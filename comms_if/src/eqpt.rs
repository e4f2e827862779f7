//! # Equipment identifiers
//!
//! Every sensor read and actuator write that crosses the hardware abstraction
//! layer is addressed by one of these identifiers.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// IDs of all sensors the core can read.
///
/// Units are those of the value returned by the HAL.
#[derive(Serialize, Deserialize, Debug, Hash, Eq, PartialEq, Copy, Clone)]
pub enum SensorId {
    /// Signed perimeter signal magnitude, left coil
    PerimeterLeft,
    /// Signed perimeter signal magnitude, right coil
    PerimeterRight,
    /// Battery voltage (V)
    BatVoltage,
    /// Charge current (A)
    ChgCurrent,
    /// Charge contact voltage (V)
    ChgVoltage,
    /// Left wheel motor current (A)
    MotorLeftCurrent,
    /// Right wheel motor current (A)
    MotorRightCurrent,
    /// Cutter motor current (A)
    MotorMowCurrent,
    /// Non-zero when pressed
    BumperLeft,
    BumperRight,
    /// Raw drop contact level, polarity given by parameters
    DropLeft,
    DropRight,
    /// Sonar distance (cm), zero when nothing in range
    SonarCenter,
    SonarLeft,
    SonarRight,
    /// Non-zero when pressed
    Button,
    /// Non-zero while the orientation sensor is communicating
    ImuComm,
    /// Non-zero when the tilt switch is active
    Tilt,
    /// Accumulated encoder ticks since start
    OdometryLeft,
    OdometryRight,
    /// Accumulated cutter tachometer pulses since start
    MowRpm,
    /// Non-zero when rain is detected
    Rain,
    /// Remote control pulse width (us)
    RemoteSteer,
    RemoteSpeed,
    RemoteMow,
    RemoteSwitch,
}

/// IDs of all actuators the core can command.
#[derive(Serialize, Deserialize, Debug, Hash, Eq, PartialEq, Copy, Clone)]
pub enum ActuatorId {
    /// Physical PWM, sign gives direction
    MotorLeft,
    MotorRight,
    /// Physical PWM, never negative
    MotorMow,
    /// Buzzer frequency (Hz), zero for silence
    Buzzer,
    /// Non-zero to light
    Led,
    /// Non-zero to close the charging relay
    ChargeRelay,
    /// Zero to switch the battery off
    BatterySwitch,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SensorId {
    /// Every sensor, in declaration order.
    pub const ALL: [SensorId; 26] = [
        SensorId::PerimeterLeft,
        SensorId::PerimeterRight,
        SensorId::BatVoltage,
        SensorId::ChgCurrent,
        SensorId::ChgVoltage,
        SensorId::MotorLeftCurrent,
        SensorId::MotorRightCurrent,
        SensorId::MotorMowCurrent,
        SensorId::BumperLeft,
        SensorId::BumperRight,
        SensorId::DropLeft,
        SensorId::DropRight,
        SensorId::SonarCenter,
        SensorId::SonarLeft,
        SensorId::SonarRight,
        SensorId::Button,
        SensorId::ImuComm,
        SensorId::Tilt,
        SensorId::OdometryLeft,
        SensorId::OdometryRight,
        SensorId::MowRpm,
        SensorId::Rain,
        SensorId::RemoteSteer,
        SensorId::RemoteSpeed,
        SensorId::RemoteMow,
        SensorId::RemoteSwitch,
    ];
}

impl ActuatorId {
    /// Every actuator, in declaration order.
    pub const ALL: [ActuatorId; 7] = [
        ActuatorId::MotorLeft,
        ActuatorId::MotorRight,
        ActuatorId::MotorMow,
        ActuatorId::Buzzer,
        ActuatorId::Led,
        ActuatorId::ChargeRelay,
        ActuatorId::BatterySwitch,
    ];
}
