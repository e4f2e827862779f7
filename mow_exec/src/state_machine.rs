//! # Operating state machine
//!
//! Holds the top level operating state and decides which transitions are
//! allowed. Side effects of a transition (zeroing motors, switching the
//! charger) are applied by the robot in the same call that changes the state.
//!
//! The Error state is sticky: the only way out is `Acknowledge`, which is
//! only ever issued by an operator.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{error, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Internal
use crate::fault::{FaultKind, FaultRegistry, FaultThreshold};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize)]
pub struct StateMachine {
    current: OperatingState,
    last: OperatingState,
    entered_at_ms: u64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatingState {
    Off,
    ExternalControl,
    RemoteControl,
    Error,
    DockCharging,
    Docked,
}

/// Why a transition was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransitionCause {
    /// Explicit activation command
    Activate,

    /// Explicit switch off command
    Deactivate,

    /// Safety fault or fault count over its threshold
    Fault(FaultKind),

    /// Operator acknowledged the error
    Acknowledge,

    /// Charging contacts closed
    DockContact,

    /// Charge current stayed below the full threshold
    FullyCharged,

    /// Charging stopped by a charger fault
    ChargeFault,

    /// Docked battery fell below the start charging voltage
    ChargeRequired,

    /// Explicit or scheduled resume from the dock
    Resume,

    LowBattery,

    /// No message from the command bridge
    BridgeSilence,

    /// Driving forwards for too long without a perimeter or obstacle event
    ForwardTimeout,

    /// On-robot stop button pressed
    Button,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("Transition {from:?} -> {to:?} not allowed on {cause:?}")]
    NotAllowed {
        from: OperatingState,
        to: OperatingState,
        cause: TransitionCause,
    },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl OperatingState {
    /// States in which the robot is driven by a controller.
    pub fn is_active(self) -> bool {
        matches!(self, OperatingState::ExternalControl | OperatingState::RemoteControl)
    }

    pub fn is_docked(self) -> bool {
        matches!(self, OperatingState::DockCharging | OperatingState::Docked)
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new(0)
    }
}

impl StateMachine {
    pub fn new(now_ms: u64) -> Self {
        Self {
            current: OperatingState::Off,
            last: OperatingState::Off,
            entered_at_ms: now_ms,
        }
    }

    pub fn current(&self) -> OperatingState {
        self.current
    }

    pub fn last(&self) -> OperatingState {
        self.last
    }

    pub fn entered_at_ms(&self) -> u64 {
        self.entered_at_ms
    }

    /// Time spent in the current state.
    pub fn time_in_state_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.entered_at_ms)
    }

    /// True if `cause` may move the machine from `from` to `to`.
    pub fn is_allowed(
        from: OperatingState,
        to: OperatingState,
        cause: TransitionCause
    ) -> bool {
        use OperatingState::*;
        use TransitionCause::*;

        match (from, to, cause) {
            (Off, ExternalControl, Activate) | (Off, RemoteControl, Activate) => true,

            (Error, _, _) => to == Off && cause == Acknowledge,
            (_, Error, Fault(_)) => true,

            (ExternalControl, DockCharging, DockContact)
            | (RemoteControl, DockCharging, DockContact) => true,

            (DockCharging, Docked, FullyCharged)
            | (DockCharging, Docked, ChargeFault) => true,

            (Docked, DockCharging, ChargeRequired) => true,

            (Docked, ExternalControl, Resume) | (Docked, RemoteControl, Resume) => true,

            (ExternalControl, Off, Deactivate)
            | (RemoteControl, Off, Deactivate)
            | (DockCharging, Off, Deactivate)
            | (Docked, Off, Deactivate) => true,

            (ExternalControl, Off, LowBattery)
            | (RemoteControl, Off, LowBattery) => true,

            (ExternalControl, Off, BridgeSilence) => true,

            (ExternalControl, Off, ForwardTimeout)
            | (RemoteControl, Off, ForwardTimeout) => true,

            (ExternalControl, Off, Button)
            | (RemoteControl, Off, Button)
            | (DockCharging, Off, Button)
            | (Docked, Off, Button) => true,

            _ => false,
        }
    }

    /// Request a transition, stamping the entry time if it is allowed.
    ///
    /// Requesting the current state is not a transition and is refused.
    pub fn request(
        &mut self,
        to: OperatingState,
        cause: TransitionCause,
        now_ms: u64
    ) -> Result<(), StateError> {
        let from = self.current;

        if from == to || !Self::is_allowed(from, to, cause) {
            return Err(StateError::NotAllowed { from, to, cause });
        }

        if to == OperatingState::Error {
            error!("Entering Error from {:?} ({:?})", from, cause);
        }
        else {
            info!("State {:?} -> {:?} ({:?})", from, to, cause);
        }

        self.last = from;
        self.current = to;
        self.entered_at_ms = now_ms;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// First fault kind whose `max_count_seen` has reached its threshold, in
/// threshold order.
///
/// Uses the peak rather than the count since the last reset so that the
/// order of the periodic reset and this check does not matter: a burst which
/// reached the threshold is never lost to a reset before it was checked.
pub fn check_fault_thresholds(
    registry: &FaultRegistry,
    thresholds: &[FaultThreshold]
) -> Option<FaultKind> {
    thresholds
        .iter()
        .find(|t| t.max_count > 0 && registry.get(t.kind).max_count_seen >= t.max_count)
        .map(|t| t.kind)
}

#[cfg(test)]
mod test {
    use super::*;
    use OperatingState::*;

    #[test]
    fn test_activation() {
        let mut sm = StateMachine::new(0);

        assert!(sm.request(ExternalControl, TransitionCause::Activate, 100).is_ok());
        assert_eq!(sm.current(), ExternalControl);
        assert_eq!(sm.last(), Off);
        assert_eq!(sm.entered_at_ms(), 100);
        assert_eq!(sm.time_in_state_ms(350), 250);

        // Already active
        assert!(sm.request(RemoteControl, TransitionCause::Activate, 200).is_err());
    }

    #[test]
    fn test_error_is_sticky() {
        let mut sm = StateMachine::new(0);
        sm.request(RemoteControl, TransitionCause::Activate, 0).unwrap();
        sm.request(Error, TransitionCause::Fault(FaultKind::ImuTilt), 10).unwrap();

        // Nothing but acknowledgement leaves Error
        let causes = [
            TransitionCause::Activate,
            TransitionCause::Deactivate,
            TransitionCause::Resume,
            TransitionCause::DockContact,
            TransitionCause::FullyCharged,
            TransitionCause::ChargeRequired,
            TransitionCause::LowBattery,
            TransitionCause::BridgeSilence,
            TransitionCause::ForwardTimeout,
            TransitionCause::Button,
            TransitionCause::Fault(FaultKind::Battery),
        ];
        let states = [Off, ExternalControl, RemoteControl, Error, DockCharging, Docked];
        for cause in causes.iter() {
            for to in states.iter() {
                assert!(sm.request(*to, *cause, 20).is_err());
            }
        }
        assert_eq!(sm.current(), Error);

        // Only to Off
        assert!(sm.request(RemoteControl, TransitionCause::Acknowledge, 30).is_err());
        assert!(sm.request(Off, TransitionCause::Acknowledge, 30).is_ok());
    }

    #[test]
    fn test_fault_from_any_state() {
        for from in [Off, ExternalControl, RemoteControl, DockCharging, Docked].iter() {
            assert!(StateMachine::is_allowed(
                *from, Error, TransitionCause::Fault(FaultKind::CpuSpeed)
            ));
        }
    }

    #[test]
    fn test_dock_cycle() {
        let mut sm = StateMachine::new(0);
        sm.request(ExternalControl, TransitionCause::Activate, 0).unwrap();
        sm.request(DockCharging, TransitionCause::DockContact, 1).unwrap();

        // Cannot skip charging
        assert!(sm.request(ExternalControl, TransitionCause::Resume, 2).is_err());

        sm.request(Docked, TransitionCause::FullyCharged, 3).unwrap();
        sm.request(DockCharging, TransitionCause::ChargeRequired, 4).unwrap();
        sm.request(Docked, TransitionCause::ChargeFault, 5).unwrap();
        sm.request(RemoteControl, TransitionCause::Resume, 6).unwrap();
        assert_eq!(sm.current(), RemoteControl);
    }

    #[test]
    fn test_timeouts_go_to_off() {
        assert!(StateMachine::is_allowed(ExternalControl, Off, TransitionCause::BridgeSilence));
        assert!(StateMachine::is_allowed(RemoteControl, Off, TransitionCause::ForwardTimeout));
        assert!(StateMachine::is_allowed(ExternalControl, Off, TransitionCause::LowBattery));
        assert!(!StateMachine::is_allowed(Docked, Off, TransitionCause::LowBattery));
        assert!(!StateMachine::is_allowed(RemoteControl, Off, TransitionCause::BridgeSilence));
    }

    #[test]
    fn test_button_stops() {
        for from in [ExternalControl, RemoteControl, DockCharging, Docked].iter() {
            assert!(StateMachine::is_allowed(*from, Off, TransitionCause::Button));
        }
        assert!(!StateMachine::is_allowed(Error, Off, TransitionCause::Button));
        assert!(!StateMachine::is_allowed(Off, RemoteControl, TransitionCause::Button));
    }

    #[test]
    fn test_thresholds() {
        let mut reg = FaultRegistry::new();
        let thresholds = [
            FaultThreshold { kind: FaultKind::MotorLeft, max_count: 3 },
            FaultThreshold { kind: FaultKind::Charger, max_count: 0 },
        ];

        reg.record(FaultKind::MotorLeft);
        reg.record(FaultKind::MotorLeft);
        reg.record(FaultKind::Charger);
        assert_eq!(check_fault_thresholds(&reg, &thresholds), None);

        reg.record(FaultKind::MotorLeft);
        reg.periodic_reset();

        // The peak still escalates after a reset
        assert_eq!(check_fault_thresholds(&reg, &thresholds), Some(FaultKind::MotorLeft));

        // Unlisted kinds never escalate by count
        for _ in 0..100 {
            reg.record(FaultKind::PerimeterTimeout);
        }
        reg.clear_all();
        assert_eq!(check_fault_thresholds(&reg, &thresholds), None);
    }
}
