//! Implementations for the power supervisor state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

// Internal
use super::{Params, PowerError};
use crate::fault::FaultKind;
use util::module::State;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const MS_PER_HOUR: f64 = 3_600_000.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Battery and charger state.
///
/// `trip_capacity_mah` is zeroed when a charging session ends,
/// `total_capacity_mah` never decreases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BatteryState {
    /// Units: volts
    pub voltage: f64,

    /// Units: amperes
    pub charge_current: f64,

    /// Units: volts
    pub charge_voltage: f64,

    pub is_charging: bool,
    pub charge_start_ms: Option<u64>,

    /// Charge delivered in the current session
    pub trip_capacity_mah: f64,

    /// Charge delivered over the robot's lifetime
    pub total_capacity_mah: f64,

    /// Charge delivered in the last completed session
    pub last_trip_capacity_mah: f64,

    pub charging_sessions: u32,

    /// Charging contacts closed
    pub contacts: bool,

    pub relay_on: bool,

    /// Charging refused after a charger fault until re-enabled
    pub charge_lockout: bool,
}

/// Power supervisor module state.
#[derive(Debug, Default)]
pub struct PowerSupervisor {
    params: Option<Params>,
    battery: BatteryState,

    /// True once a valid battery voltage has been read
    voltage_valid: bool,

    /// Set by the state machine while the robot is in DockCharging
    charging_enabled: bool,

    full_since_ms: Option<u64>,
    last_tick_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InputData {
    pub now_ms: u64,
    pub voltage: Option<f64>,
    pub charge_current: Option<f64>,
    pub charge_voltage: Option<f64>,
}

/// Conditions for the state machine and the relay command.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct OutputData {
    /// Charging relay command
    pub relay_on: bool,

    /// Battery below the switch off voltage
    pub low_battery: bool,

    /// Charging contacts closed
    pub contacts: bool,

    /// Charge current has stayed below the full threshold
    pub fully_charged: bool,

    /// Charging stopped by a charger fault
    pub charge_fault: bool,

    /// Battery below the start charging voltage
    pub charge_required: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusReport {
    pub faults: Vec<FaultKind>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl State for PowerSupervisor {
    type InitData = Params;
    type InitError = PowerError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = PowerError;

    fn init(&mut self, init_data: Self::InitData)
        -> Result<(), Self::InitError>
    {
        init_data.are_valid().map_err(PowerError::InvalidParams)?;
        self.params = Some(init_data);
        Ok(())
    }

    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        let params = match self.params {
            Some(ref p) => p.clone(),
            None => return Err(PowerError::NotInitialised)
        };

        let now_ms = input_data.now_ms;
        let dt_ms = match self.last_tick_ms {
            Some(t) => now_ms.saturating_sub(t),
            None => 0
        };
        self.last_tick_ms = Some(now_ms);

        let mut output = OutputData::default();
        let mut report = StatusReport::default();

        if let Some(v) = input_data.voltage.filter(|v| v.is_finite()) {
            self.battery.voltage = v;
            self.voltage_valid = true;
        }
        if let Some(c) = input_data.charge_current.filter(|c| c.is_finite()) {
            self.battery.charge_current = c;
        }
        if let Some(v) = input_data.charge_voltage.filter(|v| v.is_finite()) {
            self.battery.charge_voltage = v;
        }

        self.battery.contacts =
            self.battery.charge_voltage > params.charge_contact_voltage;
        output.contacts = self.battery.contacts;

        if params.monitor && self.voltage_valid {
            output.low_battery = self.battery.voltage < params.switch_off_if_below;
            output.charge_required = !self.battery.charge_lockout
                && self.battery.voltage < params.start_charging_if_below;
        }

        self.battery.relay_on = self.charging_enabled
            && self.battery.contacts
            && !self.battery.charge_lockout;

        if self.battery.relay_on {
            let start_ms = *self.battery.charge_start_ms.get_or_insert(now_ms);
            if !self.battery.is_charging {
                info!("Charging started at {:.2} V", self.battery.voltage);
                self.battery.is_charging = true;
            }

            // Only positive current charges the battery
            let delivered_mah = self.battery.charge_current.max(0.0)
                * dt_ms as f64 / MS_PER_HOUR * 1000.0;
            self.battery.trip_capacity_mah += delivered_mah;
            self.battery.total_capacity_mah += delivered_mah;

            if self.battery.charge_current > params.charging_current_max {
                warn!(
                    "Charge current {:.2} A above limit, charging stopped",
                    self.battery.charge_current
                );
                self.charge_fault(&mut output, &mut report);
            }
            else if now_ms.saturating_sub(start_ms) > params.charging_timeout_ms {
                warn!("Charging timed out after {} ms", now_ms - start_ms);
                self.charge_fault(&mut output, &mut report);
            }
            else if self.battery.charge_current < params.full_current {
                let since = *self.full_since_ms.get_or_insert(now_ms);
                output.fully_charged =
                    now_ms.saturating_sub(since) >= params.full_sustain_ms;
            }
            else {
                self.full_since_ms = None;
            }
        }

        if !self.battery.relay_on && self.battery.is_charging {
            self.end_session();
        }

        output.relay_on = self.battery.relay_on;

        Ok((output, report))
    }
}

impl PowerSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow the relay to close while the contacts are closed and no charger
    /// fault lockout is set.
    pub fn enable_charging(&mut self) {
        debug!("Charging enabled");
        self.charging_enabled = true;
        self.full_since_ms = None;
    }

    /// Operator action only, a charger fault is never retried automatically.
    pub fn clear_charge_lockout(&mut self) {
        if self.battery.charge_lockout {
            info!("Charger lockout cleared");
            self.battery.charge_lockout = false;
        }
    }

    /// Open the relay on the next tick.
    pub fn disable_charging(&mut self) {
        debug!("Charging disabled");
        self.charging_enabled = false;
    }

    /// Point in time copy of the battery state.
    pub fn battery(&self) -> BatteryState {
        self.battery
    }

    /// Restore the lifetime statistics, e.g. after a restart.
    pub fn restore_stats(&mut self, total_capacity_mah: f64, charging_sessions: u32) {
        if total_capacity_mah.is_finite() && total_capacity_mah > 0.0 {
            self.battery.total_capacity_mah = total_capacity_mah;
        }
        self.battery.charging_sessions = charging_sessions;
    }

    fn charge_fault(&mut self, output: &mut OutputData, report: &mut StatusReport) {
        self.battery.relay_on = false;
        self.battery.charge_lockout = true;
        output.charge_fault = true;
        report.faults.push(FaultKind::Charger);
    }

    fn end_session(&mut self) {
        info!(
            "Charging session ended, {:.0} mAh delivered",
            self.battery.trip_capacity_mah
        );
        self.battery.is_charging = false;
        self.battery.charge_start_ms = None;
        self.battery.last_trip_capacity_mah = self.battery.trip_capacity_mah;
        self.battery.trip_capacity_mah = 0.0;
        self.battery.charging_sessions = self.battery.charging_sessions.saturating_add(1);
        self.full_since_ms = None;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    fn supervisor() -> PowerSupervisor {
        let mut s = PowerSupervisor::new();
        s.init(Params {
            full_sustain_ms: 1000,
            charging_timeout_ms: 10_000,
            ..Params::default()
        }).unwrap();
        s
    }

    fn docked(now_ms: u64, voltage: f64, current: f64) -> InputData {
        InputData {
            now_ms,
            voltage: Some(voltage),
            charge_current: Some(current),
            charge_voltage: Some(29.0),
        }
    }

    #[test]
    fn test_low_battery() {
        let mut s = supervisor();

        // No reading yet
        let (out, _) = s.proc(&InputData::default()).unwrap();
        assert!(!out.low_battery);

        let (out, _) = s.proc(&InputData {
            now_ms: 100,
            voltage: Some(21.0),
            ..InputData::default()
        }).unwrap();
        assert!(out.low_battery);
        assert!(out.charge_required);
        assert!(!out.contacts);
    }

    #[test]
    fn test_relay_needs_enable_and_contacts() {
        let mut s = supervisor();

        let (out, _) = s.proc(&docked(0, 25.0, 1.0)).unwrap();
        assert!(out.contacts);
        assert!(!out.relay_on);

        s.enable_charging();
        let (out, _) = s.proc(&docked(100, 25.0, 1.0)).unwrap();
        assert!(out.relay_on);
        assert!(s.battery().is_charging);

        // Contacts open
        let (out, _) = s.proc(&InputData {
            now_ms: 200,
            charge_voltage: Some(0.0),
            ..InputData::default()
        }).unwrap();
        assert!(!out.relay_on);
        assert!(!s.battery().is_charging);
    }

    #[test]
    fn test_overcurrent_single_sample_is_fault() {
        let mut s = supervisor();
        s.enable_charging();

        s.proc(&docked(0, 25.0, 1.0)).unwrap();
        let (out, report) = s.proc(&docked(100, 25.0, 2.0)).unwrap();

        assert!(out.charge_fault);
        assert!(!out.relay_on);
        assert_eq!(report.faults, vec![FaultKind::Charger]);

        // Stays off while locked out
        let (out, report) = s.proc(&docked(200, 25.0, 1.0)).unwrap();
        assert!(!out.relay_on);
        assert!(report.faults.is_empty());
        assert!(s.battery().charge_lockout);
    }

    #[test]
    fn test_lockout_survives_reenable() {
        let mut s = supervisor();
        s.enable_charging();
        s.proc(&docked(0, 25.0, 3.0)).unwrap();
        assert!(s.battery().charge_lockout);

        // Re-entering charging does not retry a faulty charger
        s.disable_charging();
        s.enable_charging();
        let (out, report) = s.proc(&docked(100, 25.0, 3.0)).unwrap();
        assert!(!out.relay_on);
        assert!(!out.charge_required);
        assert!(report.faults.is_empty());

        s.clear_charge_lockout();
        let (out, _) = s.proc(&docked(200, 25.0, 1.0)).unwrap();
        assert!(out.relay_on);
        assert!(out.charge_required);
    }

    #[test]
    fn test_charging_timeout() {
        let mut s = supervisor();
        s.enable_charging();

        let mut faults = 0;
        for i in 0..200 {
            let (_, report) = s.proc(&docked(i * 100, 25.0, 1.0)).unwrap();
            faults += report.faults.len();
        }

        assert_eq!(faults, 1);
        assert!(!s.battery().relay_on);
    }

    #[test]
    fn test_fully_charged_after_sustain() {
        let mut s = supervisor();
        s.enable_charging();

        s.proc(&docked(0, 28.0, 1.0)).unwrap();
        let (out, _) = s.proc(&docked(100, 29.0, 0.1)).unwrap();
        assert!(!out.fully_charged);

        let (out, _) = s.proc(&docked(1100, 29.0, 0.1)).unwrap();
        assert!(out.fully_charged);
    }

    #[test]
    fn test_capacity_accounting() {
        let mut s = supervisor();
        s.enable_charging();

        // One amp for 3.6 s is 1 mAh
        for i in 0..=36 {
            s.proc(&docked(i * 100, 25.0, 1.0)).unwrap();
        }
        assert_relative_eq!(s.battery().trip_capacity_mah, 1.0, epsilon = 1e-9);

        s.disable_charging();
        s.proc(&docked(3700, 25.0, 1.0)).unwrap();

        let b = s.battery();
        assert_eq!(b.trip_capacity_mah, 0.0);
        assert_relative_eq!(b.last_trip_capacity_mah, 1.0, epsilon = 1e-9);
        assert_relative_eq!(b.total_capacity_mah, 1.0, epsilon = 1e-9);
        assert_eq!(b.charging_sessions, 1);
    }
}
