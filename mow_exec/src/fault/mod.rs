//! Fault registry module
//!
//! Subsystems report faults into the registry, which only counts them. The
//! decision on whether a count is high enough to enter the Error state is made
//! by the state machine, see `state_machine::check_fault_thresholds`.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod registry;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

pub use registry::*;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Every kind of fault the core can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaultKind {
    /// Left wheel stalled (commanded but no current draw)
    MotorLeft,
    MotorRight,
    MotorMow,

    MotorLeftOvercurrent,
    MotorRightOvercurrent,
    MotorMowOvercurrent,

    /// Orientation sensor stopped communicating
    ImuComm,

    /// Tilt sensor triggered
    ImuTilt,

    PerimeterTimeout,

    /// Wheel driven but the encoder disagrees
    OdometryLeft,
    OdometryRight,

    /// Battery below the switch off voltage while operating
    Battery,

    /// Charging overcurrent or charging took too long
    Charger,

    /// No message from the command bridge within the silence timeout
    BridgeTimeout,

    /// Stored settings were invalid, defaults in use
    EepromData,

    /// Main loop running too slowly
    CpuSpeed,
}

/// How the core reacts to a fault kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    /// Recorded, escalates only through its threshold
    Transient,

    /// Recorded, and the affected channel is zeroed at once
    Control,

    /// Always forces the Error state
    Safety,

    /// Detected at startup, defaults used instead
    Config,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl FaultKind {
    /// Number of fault kinds.
    pub const COUNT: usize = 16;

    /// All fault kinds, in index order.
    pub const ALL: [FaultKind; FaultKind::COUNT] = [
        FaultKind::MotorLeft,
        FaultKind::MotorRight,
        FaultKind::MotorMow,
        FaultKind::MotorLeftOvercurrent,
        FaultKind::MotorRightOvercurrent,
        FaultKind::MotorMowOvercurrent,
        FaultKind::ImuComm,
        FaultKind::ImuTilt,
        FaultKind::PerimeterTimeout,
        FaultKind::OdometryLeft,
        FaultKind::OdometryRight,
        FaultKind::Battery,
        FaultKind::Charger,
        FaultKind::BridgeTimeout,
        FaultKind::EepromData,
        FaultKind::CpuSpeed,
    ];

    /// Position of this kind in `ALL`.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn class(self) -> FaultClass {
        use FaultKind::*;

        match self {
            MotorLeft | MotorRight | MotorMow => FaultClass::Control,
            ImuComm | ImuTilt => FaultClass::Safety,
            EepromData => FaultClass::Config,
            MotorLeftOvercurrent
            | MotorRightOvercurrent
            | MotorMowOvercurrent
            | PerimeterTimeout
            | OdometryLeft
            | OdometryRight
            | Battery
            | Charger
            | BridgeTimeout
            | CpuSpeed => FaultClass::Transient,
        }
    }
}

impl std::fmt::Display for FaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
