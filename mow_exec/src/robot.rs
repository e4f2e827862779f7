//! # Robot
//!
//! Owns every component of the core and drives them from the scheduler.
//! Nothing outside this module mutates the components directly, so the
//! side effects of a state transition (zeroed motors, charger switching,
//! bridge supervision) are always applied in the same call that changes the
//! state.
//!
//! One call to `loop_once` is one main loop iteration: the time is read once
//! and every due task runs in priority order against that time.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, error, info, warn};
use thiserror::Error;

// Internal
use crate::{
    bridge_mon::BridgeMonitor,
    fault::{FaultClass, FaultKind, FaultRecord, FaultRegistry},
    hal::Hal,
    motor_ctrl::{self, MotorCtrl, MotorCtrlError, MotorId},
    odometry::{self, Odometry, OdometryError},
    params::MowerParams,
    perimeter::{self, PerimeterEngine, PerimeterError},
    persist::RobotTotals,
    power::{self, PowerError, PowerSupervisor},
    remote::{self, Remote, RemoteError},
    sched::{Scheduler, Task},
    sensing::{self, ObstacleMonitor, SafetyMonitor, SensingError},
    state_machine::{
        check_fault_thresholds,
        OperatingState,
        StateError,
        StateMachine,
        TransitionCause
    },
    stats::RobotStats,
    status::RobotStatus,
};
use comms_if::{
    bridge::{BridgeCmd, BridgeCmdBody, BridgeResponse, StateRequest},
    eqpt::{ActuatorId, SensorId},
};
use util::module::State;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const MS_PER_MINUTE: u64 = 60_000;

/// Buzzer tone while in Error.
///
/// Units: hertz
const ERROR_TONE_HZ: f64 = 1000.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The mower core.
pub struct Robot<H: Hal> {
    hal: H,
    params: MowerParams,

    sched: Scheduler,
    state: StateMachine,
    faults: FaultRegistry,
    stats: RobotStats,

    safety: SafetyMonitor,
    power: PowerSupervisor,
    perimeter: PerimeterEngine,
    obstacle: ObstacleMonitor,
    bridge: BridgeMonitor,
    remote: Remote,
    odometry: Odometry,
    motors: MotorCtrl,

    odometry_out: odometry::OutputData,

    /// Last sensor, stick or command activity, for the idle switch off
    last_activity_ms: u64,

    battery_switched_off: bool,

    /// Charging contacts closed at the last battery check
    dock_contacts: bool,

    /// Start of the current stretch of forward driving
    forward_since_ms: Option<u64>,

    /// Pending scheduled resume from the dock
    resume_at: Option<(u64, OperatingState)>,

    led_on: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RobotError {
    #[error("Perimeter error: {0}")]
    Perimeter(#[from] PerimeterError),

    #[error("Motor control error: {0}")]
    Motor(#[from] MotorCtrlError),

    #[error("Power supervision error: {0}")]
    Power(#[from] PowerError),

    #[error("Sensing error: {0}")]
    Sensing(#[from] SensingError),

    #[error("Odometry error: {0}")]
    Odometry(#[from] OdometryError),

    #[error("Remote control error: {0}")]
    Remote(#[from] RemoteError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<H: Hal> Robot<H> {
    /// Build the core on top of `hal`.
    ///
    /// Invalid parameters are replaced by the defaults and recorded as an
    /// `EepromData` fault, the robot still starts in Off.
    pub fn new(mut hal: H, params: MowerParams) -> Result<Self, RobotError> {
        let now_ms = hal.millis();
        let mut faults = FaultRegistry::new();

        let params = match params.are_valid() {
            Ok(()) => params,
            Err(e) => {
                error!("Invalid parameters ({}), using the defaults", e);
                faults.record(FaultKind::EepromData);
                MowerParams::default()
            }
        };

        let mut sched = Scheduler::new(&params.sched, now_ms);
        sched.set_enabled(Task::Perimeter, params.perimeter.enabled);
        sched.set_enabled(Task::Odometry, params.odometry.enabled);
        sched.set_enabled(Task::Remote, params.remote.enabled);

        let mut safety = SafetyMonitor::new();
        safety.init(params.obstacle.clone())?;
        let mut power = PowerSupervisor::new();
        power.init(params.battery.clone())?;
        let mut perimeter = PerimeterEngine::new();
        perimeter.init(params.perimeter.clone())?;
        let mut obstacle = ObstacleMonitor::new();
        obstacle.init(params.obstacle.clone())?;
        let mut remote = Remote::new();
        remote.init(params.remote.clone())?;
        let mut odometry = Odometry::new();
        odometry.init(params.odometry.clone())?;
        let mut motors = MotorCtrl::new();
        motors.init(params.motor.clone())?;

        hal.set_actuator(ActuatorId::BatterySwitch, 1.0);
        hal.set_actuator(ActuatorId::ChargeRelay, 0.0);

        info!("Robot initialised in {:?}", OperatingState::Off);

        Ok(Self {
            hal,
            bridge: BridgeMonitor::new(params.bridge.clone()),
            params,
            sched,
            state: StateMachine::new(now_ms),
            faults,
            stats: RobotStats::default(),
            safety,
            power,
            perimeter,
            obstacle,
            remote,
            odometry,
            motors,
            odometry_out: odometry::OutputData::default(),
            last_activity_ms: now_ms,
            battery_switched_off: false,
            dock_contacts: false,
            forward_since_ms: None,
            resume_at: None,
            led_on: false,
        })
    }

    /// Run one main loop iteration.
    pub fn loop_once(&mut self) -> Result<(), RobotError> {
        let now_ms = self.hal.millis();
        self.stats.count_loop();

        for task in self.sched.due(now_ms) {
            match task {
                Task::Safety => self.task_safety(now_ms)?,
                Task::Battery => self.task_battery(now_ms)?,
                Task::Perimeter => self.task_perimeter(now_ms)?,
                Task::Obstacle => self.task_obstacle(now_ms)?,
                Task::Bridge => self.task_bridge(now_ms),
                Task::Remote => self.task_remote(now_ms)?,
                Task::Odometry => self.task_odometry(now_ms)?,
                Task::Timeouts => self.task_timeouts(now_ms),
                Task::ErrorCheck => self.task_error_check(now_ms),
                Task::ErrorReset => self.faults.periodic_reset(),
                Task::MotorControl => self.task_motor_control(now_ms)?,
                Task::Indicators => self.task_indicators(),
                Task::Stats => self.task_stats(now_ms),
            }
        }

        Ok(())
    }

    // ---- COMMANDS ----

    /// Start driving under external or remote control.
    pub fn activate(&mut self, mode: OperatingState) -> Result<(), StateError> {
        let now_ms = self.hal.millis();
        self.transition(mode, TransitionCause::Activate, now_ms)?;
        self.note_activity(now_ms);
        Ok(())
    }

    pub fn deactivate(&mut self) -> Result<(), StateError> {
        let now_ms = self.hal.millis();
        self.transition(OperatingState::Off, TransitionCause::Deactivate, now_ms)
    }

    /// Operator acknowledgement of the Error state. Clears every fault
    /// counter and moves to Off.
    pub fn acknowledge_error(&mut self) -> Result<(), StateError> {
        let now_ms = self.hal.millis();
        let from = self.state.current();
        let to = OperatingState::Off;
        let cause = TransitionCause::Acknowledge;

        if !StateMachine::is_allowed(from, to, cause) {
            return Err(StateError::NotAllowed { from, to, cause });
        }

        self.faults.clear_all();
        self.power.clear_charge_lockout();
        self.transition(to, cause, now_ms)?;
        self.note_activity(now_ms);
        Ok(())
    }

    /// Leave the dock in the given control mode. Charging is allowed again on
    /// the next docking even after a charger fault.
    pub fn resume(&mut self, mode: OperatingState) -> Result<(), StateError> {
        let now_ms = self.hal.millis();
        self.transition(mode, TransitionCause::Resume, now_ms)?;
        self.power.clear_charge_lockout();
        self.note_activity(now_ms);
        Ok(())
    }

    /// Resume from the dock once `at_ms` is reached, if still docked then.
    pub fn schedule_resume(&mut self, at_ms: u64, mode: OperatingState) {
        info!("Resume in {:?} scheduled at {} ms", mode, at_ms);
        self.resume_at = Some((at_ms, mode));
    }

    /// Handle one command from the bridge.
    pub fn handle_bridge_cmd(&mut self, cmd: &BridgeCmd) -> BridgeResponse {
        let now_ms = self.hal.millis();

        if self.bridge.accept(cmd, now_ms) == BridgeResponse::Stale {
            return BridgeResponse::Stale;
        }

        match cmd.body {
            BridgeCmdBody::Heartbeat => BridgeResponse::Accepted,
            BridgeCmdBody::Motor(dems) => {
                if self.state.current() != OperatingState::ExternalControl {
                    debug!("Motor command ignored in {:?}", self.state.current());
                    return BridgeResponse::CannotExecute;
                }

                self.bridge.note_motor(now_ms);
                self.motors.set_wheel_demands(dems.left, dems.right);
                self.motors.set_mow_demand(dems.mow.max(0.0));
                if dems.left != 0.0 || dems.right != 0.0 || dems.mow != 0.0 {
                    self.note_activity(now_ms);
                }
                BridgeResponse::Accepted
            },
            BridgeCmdBody::State(req) => {
                let result = match req {
                    StateRequest::Off => self.deactivate(),
                    StateRequest::External => self.activate(OperatingState::ExternalControl),
                    StateRequest::Remote => self.activate(OperatingState::RemoteControl),
                    StateRequest::Resume => self.resume(OperatingState::ExternalControl),
                };

                match result {
                    Ok(()) => BridgeResponse::Accepted,
                    Err(e) => {
                        warn!("Bridge state request refused: {}", e);
                        BridgeResponse::CannotExecute
                    }
                }
            }
        }
    }

    // ---- ACCESSORS ----

    pub fn state(&self) -> OperatingState {
        self.state.current()
    }

    pub fn faults(&self) -> &FaultRegistry {
        &self.faults
    }

    pub fn motors(&self) -> &MotorCtrl {
        &self.motors
    }

    pub fn params(&self) -> &MowerParams {
        &self.params
    }

    pub fn hal(&self) -> &H {
        &self.hal
    }

    pub fn hal_mut(&mut self) -> &mut H {
        &mut self.hal
    }

    /// Point in time copy of the whole robot.
    pub fn status(&self) -> RobotStatus {
        let now_ms = self.hal.millis();
        let perimeter = self.perimeter.snapshot();

        RobotStatus {
            time_ms: now_ms,
            state: self.state.current(),
            state_entered_at_ms: self.state.entered_at_ms(),
            perimeter_left: perimeter.left,
            perimeter_right: perimeter.right,
            motors: self.motors.snapshots(),
            faults: self.faults.to_records(),
            battery: self.power.battery(),
            stats: self.stats,
            last_obstacle: self.obstacle.last_triggered(),
            idle_ms: now_ms.saturating_sub(self.last_activity_ms),
        }
    }

    /// Record a fault detected outside the core, e.g. unreadable settings.
    pub fn report_fault(&mut self, kind: FaultKind) {
        let now_ms = self.hal.millis();
        self.record_faults(&[kind], now_ms);
    }

    pub fn fault_records(&self) -> Vec<FaultRecord> {
        self.faults.to_records()
    }

    /// Replace the fault counters with persisted ones.
    ///
    /// Counters over their threshold put the robot in Error on the next
    /// error check.
    pub fn restore_fault_records(&mut self, records: &[FaultRecord]) {
        self.faults = FaultRegistry::from_records(records);
        info!("Restored {} fault counters", records.len());
    }

    pub fn totals(&self) -> RobotTotals {
        let battery = self.power.battery();
        RobotTotals {
            mow_time_total_min: self.stats.mow_time_total_min,
            total_capacity_mah: battery.total_capacity_mah,
            charging_sessions: battery.charging_sessions,
        }
    }

    pub fn restore_totals(&mut self, totals: &RobotTotals) {
        self.stats.restore_total(totals.mow_time_total_min);
        self.power.restore_stats(totals.total_capacity_mah, totals.charging_sessions);
    }

    // ---- TASKS ----

    fn task_safety(&mut self, now_ms: u64) -> Result<(), RobotError> {
        let input = sensing::SafetyInput {
            now_ms,
            tilt: self.hal.read_sensor(SensorId::Tilt),
            imu_comm: self.hal.read_sensor(SensorId::ImuComm),
        };
        let (out, report) = self.safety.proc(&input)?;
        self.record_faults(&report.faults, now_ms);

        // A condition still present after an acknowledgement is a new fault
        if self.state.current() != OperatingState::Error {
            let mut held = Vec::new();
            if out.tilted {
                held.push(FaultKind::ImuTilt);
            }
            if out.imu_lost {
                held.push(FaultKind::ImuComm);
            }
            self.record_faults(&held, now_ms);
        }
        Ok(())
    }

    fn task_battery(&mut self, now_ms: u64) -> Result<(), RobotError> {
        let input = power::InputData {
            now_ms,
            voltage: self.hal.read_sensor(SensorId::BatVoltage),
            charge_current: self.hal.read_sensor(SensorId::ChgCurrent),
            charge_voltage: self.hal.read_sensor(SensorId::ChgVoltage),
        };
        let (out, report) = self.power.proc(&input)?;
        self.hal.set_actuator(ActuatorId::ChargeRelay, if out.relay_on { 1.0 } else { 0.0 });
        self.record_faults(&report.faults, now_ms);

        // Docking needs the contacts to close, a robot leaving the dock
        // still touches them for a while
        let contacts_closed = out.contacts && !self.dock_contacts;
        self.dock_contacts = out.contacts;

        match self.state.current() {
            OperatingState::ExternalControl | OperatingState::RemoteControl => {
                if contacts_closed {
                    info!("Charging contacts closed");
                    self.try_transition(
                        OperatingState::DockCharging,
                        TransitionCause::DockContact,
                        now_ms
                    );
                }
                else if out.low_battery {
                    error!(
                        "Battery low ({:.2} V), switching off",
                        self.power.battery().voltage
                    );
                    self.faults.record(FaultKind::Battery);
                    self.try_transition(
                        OperatingState::Off,
                        TransitionCause::LowBattery,
                        now_ms
                    );
                }
            },
            OperatingState::DockCharging => {
                if out.charge_fault {
                    self.try_transition(
                        OperatingState::Docked,
                        TransitionCause::ChargeFault,
                        now_ms
                    );
                }
                else if out.fully_charged {
                    info!("Battery fully charged");
                    self.try_transition(
                        OperatingState::Docked,
                        TransitionCause::FullyCharged,
                        now_ms
                    );
                }
            },
            OperatingState::Docked => {
                if out.charge_required {
                    self.try_transition(
                        OperatingState::DockCharging,
                        TransitionCause::ChargeRequired,
                        now_ms
                    );
                }
            },
            OperatingState::Off | OperatingState::Error => ()
        }

        Ok(())
    }

    fn task_perimeter(&mut self, now_ms: u64) -> Result<(), RobotError> {
        let input = perimeter::InputData {
            now_ms,
            left: self.hal.read_sensor(SensorId::PerimeterLeft),
            right: self.hal.read_sensor(SensorId::PerimeterRight),
        };
        let (_, report) = self.perimeter.proc(&input)?;
        self.record_faults(&report.faults, now_ms);

        if !report.transitions.is_empty() {
            self.forward_since_ms = None;
            self.note_activity(now_ms);
        }
        Ok(())
    }

    fn task_obstacle(&mut self, now_ms: u64) -> Result<(), RobotError> {
        let readings = self.obstacle
            .sensors()
            .into_iter()
            .map(|id| (id, self.hal.read_sensor(id)))
            .collect();

        let input = sensing::ObstacleInput { now_ms, readings };
        let (out, _) = self.obstacle.proc(&input)?;

        if out.obstacle {
            self.forward_since_ms = None;
            self.note_activity(now_ms);
        }

        // Never leaves Error, that needs an acknowledgement
        if out.button {
            self.note_activity(now_ms);
            let state = self.state.current();
            if state.is_active() || state.is_docked() {
                self.try_transition(OperatingState::Off, TransitionCause::Button, now_ms);
            }
        }
        Ok(())
    }

    fn task_bridge(&mut self, now_ms: u64) {
        let check = self.bridge.check(now_ms);
        if self.state.current() != OperatingState::ExternalControl {
            return;
        }

        if check.silence {
            error!("Bridge silent, switching off");
            self.faults.record(FaultKind::BridgeTimeout);
            self.try_transition(OperatingState::Off, TransitionCause::BridgeSilence, now_ms);
        }
        else if check.motor_timeout {
            warn!("No motor command from the bridge, stopping");
            self.motors.zero_all();
        }
    }

    fn task_remote(&mut self, now_ms: u64) -> Result<(), RobotError> {
        let input = remote::InputData {
            speed_us: self.hal.read_sensor(SensorId::RemoteSpeed),
            steer_us: self.hal.read_sensor(SensorId::RemoteSteer),
            mow_us: self.hal.read_sensor(SensorId::RemoteMow),
            switch_us: self.hal.read_sensor(SensorId::RemoteSwitch),
        };
        let (out, _) = self.remote.proc(&input)?;

        if out.active {
            self.note_activity(now_ms);
        }

        match (out.switch_changed, self.state.current()) {
            (Some(true), OperatingState::Off) => {
                info!("Remote switch on");
                self.try_transition(
                    OperatingState::RemoteControl,
                    TransitionCause::Activate,
                    now_ms
                );
                self.note_activity(now_ms);
            },
            (Some(false), OperatingState::RemoteControl) => {
                info!("Remote switch off");
                self.try_transition(OperatingState::Off, TransitionCause::Deactivate, now_ms);
            },
            _ => ()
        }

        if self.state.current() == OperatingState::RemoteControl {
            self.motors.set_wheel_demands(out.left, out.right);
            self.motors.set_mow_demand(out.mow);
        }
        Ok(())
    }

    fn task_odometry(&mut self, now_ms: u64) -> Result<(), RobotError> {
        let pwm_left = self.motors.channel(MotorId::Left).map_or(0.0, |c| c.pwm_current);
        let pwm_right = self.motors.channel(MotorId::Right).map_or(0.0, |c| c.pwm_current);

        let input = odometry::InputData {
            now_ms,
            left_ticks: self.hal.read_sensor(SensorId::OdometryLeft),
            right_ticks: self.hal.read_sensor(SensorId::OdometryRight),
            mow_pulses: self.hal.read_sensor(SensorId::MowRpm),
            pwm_left,
            pwm_right,
        };
        let (out, report) = self.odometry.proc(&input)?;
        self.odometry_out = out;
        self.record_faults(&report.faults, now_ms);
        Ok(())
    }

    fn task_timeouts(&mut self, now_ms: u64) {
        let state = self.state.current();

        // Forward motion guard
        let max_ms = self.params.state.forward_time_max_ms;
        let forward = self.motors.channel(MotorId::Left).map_or(false, |c| c.pwm_current > 0.0)
            && self.motors.channel(MotorId::Right).map_or(false, |c| c.pwm_current > 0.0);

        if state.is_active() && max_ms > 0 && forward {
            let since_ms = *self.forward_since_ms.get_or_insert(now_ms);
            if now_ms.saturating_sub(since_ms) > max_ms {
                error!("Driving forwards for more than {} ms, switching off", max_ms);
                self.try_transition(OperatingState::Off, TransitionCause::ForwardTimeout, now_ms);
            }
        }
        else {
            self.forward_since_ms = None;
        }

        // Scheduled resume
        if let Some((at_ms, mode)) = self.resume_at {
            if now_ms >= at_ms {
                self.resume_at = None;
                if state == OperatingState::Docked {
                    info!("Scheduled resume");
                    if let Err(e) = self.resume(mode) {
                        warn!("Scheduled resume failed: {}", e);
                    }
                }
                else {
                    warn!("Scheduled resume dropped, robot in {:?}", state);
                }
            }
        }

        // Idle switch off
        let idle_max_ms = self.params.battery.switch_off_if_idle_min as u64 * MS_PER_MINUTE;
        if state == OperatingState::Off
            && idle_max_ms > 0
            && !self.battery_switched_off
            && now_ms.saturating_sub(self.last_activity_ms) >= idle_max_ms
        {
            warn!("Idle for {} ms, switching the battery off", idle_max_ms);
            self.hal.set_actuator(ActuatorId::BatterySwitch, 0.0);
            self.battery_switched_off = true;
        }
    }

    fn task_error_check(&mut self, now_ms: u64) {
        if self.state.current() == OperatingState::Error {
            return;
        }

        if let Some(kind) =
            check_fault_thresholds(&self.faults, &self.params.fault_thresholds)
        {
            self.enter_error(kind, now_ms);
        }
    }

    fn task_motor_control(&mut self, now_ms: u64) -> Result<(), RobotError> {
        let input = motor_ctrl::InputData {
            now_ms,
            currents: [
                self.hal.read_sensor(SensorId::MotorLeftCurrent),
                self.hal.read_sensor(SensorId::MotorRightCurrent),
                self.hal.read_sensor(SensorId::MotorMowCurrent),
            ],
            rpms: [
                self.odometry_out.left_rpm,
                self.odometry_out.right_rpm,
                self.odometry_out.mow_rpm,
            ],
        };
        let (out, report) = self.motors.proc(&input)?;

        self.hal.set_actuator(ActuatorId::MotorLeft, out.left);
        self.hal.set_actuator(ActuatorId::MotorRight, out.right);
        self.hal.set_actuator(ActuatorId::MotorMow, out.mow);

        self.record_faults(&report.faults, now_ms);
        Ok(())
    }

    fn task_indicators(&mut self) {
        let state = self.state.current();

        // Blinks in Error
        self.led_on = match state {
            OperatingState::Off => false,
            OperatingState::Error => !self.led_on,
            _ => true
        };
        self.hal.set_actuator(ActuatorId::Led, if self.led_on { 1.0 } else { 0.0 });

        let tone = if state == OperatingState::Error { ERROR_TONE_HZ } else { 0.0 };
        self.hal.set_actuator(ActuatorId::Buzzer, tone);
    }

    fn task_stats(&mut self, now_ms: u64) {
        let mowing = self.motors.channel(MotorId::Mow).map_or(false, |c| c.pwm_current > 0.0);

        if let Some(kind) = self.stats.tick(
            now_ms,
            mowing,
            self.params.state.min_loops_per_sec,
            self.params.state.cpu_low_count_max
        ) {
            self.record_faults(&[kind], now_ms);
        }
    }

    // ---- TRANSITIONS ----

    /// Change state and apply the side effects of entering the new state.
    fn transition(
        &mut self,
        to: OperatingState,
        cause: TransitionCause,
        now_ms: u64
    ) -> Result<(), StateError> {
        self.state.request(to, cause, now_ms)?;

        self.motors.zero_all();
        self.forward_since_ms = None;

        if to == OperatingState::DockCharging {
            self.power.enable_charging();
        }
        else {
            self.power.disable_charging();
        }

        if to == OperatingState::ExternalControl {
            self.bridge.arm(now_ms);
        }
        else {
            self.bridge.disarm();
        }

        if to.is_active() {
            self.stats.reset_trip();
        }

        Ok(())
    }

    /// Transition requested by the core itself, refusals are only logged.
    fn try_transition(&mut self, to: OperatingState, cause: TransitionCause, now_ms: u64) {
        if let Err(e) = self.transition(to, cause, now_ms) {
            debug!("{}", e);
        }
    }

    fn enter_error(&mut self, kind: FaultKind, now_ms: u64) {
        if self.state.current() != OperatingState::Error {
            self.try_transition(OperatingState::Error, TransitionCause::Fault(kind), now_ms);
        }
    }

    /// Count faults reported by a component. Safety faults force Error at
    /// once, the rest escalate through the thresholds.
    fn record_faults(&mut self, faults: &[FaultKind], now_ms: u64) {
        for kind in faults.iter() {
            self.faults.record(*kind);
            if kind.class() == FaultClass::Safety {
                self.enter_error(*kind, now_ms);
            }
        }
    }

    fn note_activity(&mut self, now_ms: u64) {
        self.last_activity_ms = now_ms;
        if self.battery_switched_off {
            self.hal.set_actuator(ActuatorId::BatterySwitch, 1.0);
            self.battery_switched_off = false;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hal::sim::SimHal;
    use comms_if::bridge::MotorDems;

    const STEP_MS: u64 = 10;

    fn healthy_hal() -> SimHal {
        let mut hal = SimHal::new();
        hal.set_sensor(SensorId::BatVoltage, 28.0);
        hal.set_sensor(SensorId::ChgVoltage, 0.0);
        hal.set_sensor(SensorId::ChgCurrent, 0.0);
        hal.set_sensor(SensorId::PerimeterLeft, -300.0);
        hal.set_sensor(SensorId::PerimeterRight, -300.0);
        hal.set_sensor(SensorId::Tilt, 0.0);
        hal
    }

    fn robot_with(params: MowerParams) -> Robot<SimHal> {
        Robot::new(healthy_hal(), params).unwrap()
    }

    fn run(robot: &mut Robot<SimHal>, duration_ms: u64) {
        let end_ms = robot.hal().millis() + duration_ms;
        while robot.hal().millis() < end_ms {
            robot.loop_once().unwrap();
            robot.hal_mut().advance(STEP_MS);
        }
    }

    fn cmd(seq: u64, body: BridgeCmdBody) -> BridgeCmd {
        BridgeCmd { seq, body }
    }

    fn motor(left: f64, right: f64, mow: f64) -> BridgeCmdBody {
        BridgeCmdBody::Motor(MotorDems { left, right, mow })
    }

    #[test]
    fn test_starts_off() {
        let mut robot = robot_with(MowerParams::default());
        run(&mut robot, 500);

        assert_eq!(robot.state(), OperatingState::Off);
        assert!(!robot.faults().any_seen());
        assert_eq!(robot.hal().actuator(ActuatorId::BatterySwitch), 1.0);
    }

    #[test]
    fn test_invalid_params_fall_back() {
        let mut params = MowerParams::default();
        params.perimeter.median_window = 0;

        let robot = robot_with(params);
        assert_eq!(robot.state(), OperatingState::Off);
        assert_eq!(robot.faults().get(FaultKind::EepromData).count_since_reset, 1);
        assert_eq!(
            robot.params().perimeter.median_window,
            perimeter::Params::default().median_window
        );
    }

    #[test]
    fn test_low_battery_switches_off() {
        let mut robot = robot_with(MowerParams::default());
        robot.activate(OperatingState::ExternalControl).unwrap();
        assert_eq!(
            robot.handle_bridge_cmd(&cmd(1, motor(100.0, 100.0, 200.0))),
            BridgeResponse::Accepted
        );
        run(&mut robot, 300);
        assert!(!robot.motors().all_setpoints_zero());

        robot.hal_mut().set_sensor(SensorId::BatVoltage, 21.0);

        // Next battery task, all in the same iteration
        let mut iterations = 0;
        while robot.state() == OperatingState::ExternalControl {
            robot.loop_once().unwrap();
            robot.hal_mut().advance(STEP_MS);
            iterations += 1;
            assert!(iterations <= 10);
        }

        assert_eq!(robot.state(), OperatingState::Off);
        assert!(robot.motors().all_setpoints_zero());
        assert_eq!(robot.faults().get(FaultKind::Battery).count_since_reset, 1);
    }

    #[test]
    fn test_tilt_is_sticky_error() {
        let mut robot = robot_with(MowerParams::default());
        robot.activate(OperatingState::RemoteControl).unwrap();
        run(&mut robot, 100);

        robot.hal_mut().set_sensor(SensorId::Tilt, 1.0);
        run(&mut robot, 100);
        assert_eq!(robot.state(), OperatingState::Error);
        assert!(robot.motors().all_setpoints_zero());

        // Sensors returning to normal do not leave Error
        robot.hal_mut().set_sensor(SensorId::Tilt, 0.0);
        run(&mut robot, 1000);
        assert_eq!(robot.state(), OperatingState::Error);

        // Nor does any other command
        assert!(robot.activate(OperatingState::ExternalControl).is_err());
        assert!(robot.deactivate().is_err());

        robot.acknowledge_error().unwrap();
        assert_eq!(robot.state(), OperatingState::Off);
        assert!(!robot.faults().any_seen());
    }

    #[test]
    fn test_tilt_held_through_acknowledge() {
        let mut robot = robot_with(MowerParams::default());
        robot.hal_mut().set_sensor(SensorId::Tilt, 1.0);
        run(&mut robot, 100);
        assert_eq!(robot.state(), OperatingState::Error);

        // Still tilted when the operator acknowledges and drives off
        robot.acknowledge_error().unwrap();
        robot.activate(OperatingState::RemoteControl).unwrap();
        run(&mut robot, 5000);

        assert_eq!(robot.state(), OperatingState::Error);
        assert!(robot.motors().all_setpoints_zero());
        assert_eq!(robot.faults().get(FaultKind::ImuTilt).count_since_reset, 1);
    }

    #[test]
    fn test_imu_loss_held_through_acknowledge() {
        let mut params = MowerParams::default();
        params.obstacle.imu_use = true;

        let mut robot = robot_with(params);
        robot.hal_mut().set_sensor(SensorId::ImuComm, 0.0);
        run(&mut robot, 100);
        assert_eq!(robot.state(), OperatingState::Error);

        robot.acknowledge_error().unwrap();
        robot.activate(OperatingState::ExternalControl).unwrap();
        run(&mut robot, 5000);
        assert_eq!(robot.state(), OperatingState::Error);
        assert_eq!(robot.faults().get(FaultKind::ImuComm).count_since_reset, 1);

        // Once the link is back an acknowledgement sticks
        robot.hal_mut().set_sensor(SensorId::ImuComm, 1.0);
        run(&mut robot, 100);
        robot.acknowledge_error().unwrap();
        run(&mut robot, 1000);
        assert_eq!(robot.state(), OperatingState::Off);
    }

    #[test]
    fn test_button_stops_robot() {
        let mut robot = robot_with(MowerParams::default());
        robot.hal_mut().set_sensor(SensorId::Button, 0.0);
        robot.activate(OperatingState::RemoteControl).unwrap();
        run(&mut robot, 100);

        robot.hal_mut().set_sensor(SensorId::Button, 1.0);
        run(&mut robot, 100);
        assert_eq!(robot.state(), OperatingState::Off);
        assert!(robot.motors().all_setpoints_zero());

        // A press in Error does nothing
        robot.hal_mut().set_sensor(SensorId::Button, 0.0);
        robot.hal_mut().set_sensor(SensorId::Tilt, 1.0);
        run(&mut robot, 100);
        assert_eq!(robot.state(), OperatingState::Error);

        robot.hal_mut().set_sensor(SensorId::Tilt, 0.0);
        robot.hal_mut().set_sensor(SensorId::Button, 1.0);
        run(&mut robot, 500);
        assert_eq!(robot.state(), OperatingState::Error);
    }

    #[test]
    fn test_acknowledge_only_in_error() {
        let mut robot = robot_with(MowerParams::default());
        assert!(robot.acknowledge_error().is_err());
    }

    #[test]
    fn test_stall_recorded_once() {
        let mut params = MowerParams::default();
        params.bridge.silence_timeout_ms = 60_000;
        params.bridge.motor_cmd_timeout_ms = 60_000;

        let mut robot = robot_with(params);
        robot.hal_mut().set_sensor(SensorId::MotorLeftCurrent, 0.0);
        robot.hal_mut().set_sensor(SensorId::MotorRightCurrent, 0.5);
        robot.activate(OperatingState::ExternalControl).unwrap();
        robot.handle_bridge_cmd(&cmd(1, motor(50.0, 50.0, 0.0)));

        run(&mut robot, 5000);

        let c = robot.faults().get(FaultKind::MotorLeft);
        assert_eq!(c.count_since_reset, 1);
        assert_eq!(robot.faults().get(FaultKind::MotorRight).count_since_reset, 0);
        assert_eq!(
            robot.motors().channel(MotorId::Left).map(|c| c.speed_setpoint),
            Some(0.0)
        );
        assert_eq!(robot.state(), OperatingState::ExternalControl);
    }

    #[test]
    fn test_threshold_escalates_to_error() {
        let mut params = MowerParams::default();
        params.fault_thresholds = vec![crate::fault::FaultThreshold {
            kind: FaultKind::MotorLeft,
            max_count: 2,
        }];

        let mut robot = robot_with(params);
        robot.activate(OperatingState::RemoteControl).unwrap();
        run(&mut robot, 100);

        robot.faults.record(FaultKind::MotorLeft);
        run(&mut robot, 200);
        assert_eq!(robot.state(), OperatingState::RemoteControl);

        robot.faults.record(FaultKind::MotorLeft);
        run(&mut robot, 200);
        assert_eq!(robot.state(), OperatingState::Error);
    }

    #[test]
    fn test_restored_counters_force_error() {
        let mut robot = robot_with(MowerParams::default());
        robot.restore_fault_records(&[FaultRecord {
            kind: FaultKind::Charger,
            count_since_reset: 0,
            max_count_seen: 3,
        }]);

        run(&mut robot, 200);
        assert_eq!(robot.state(), OperatingState::Error);
    }

    #[test]
    fn test_bridge_commands() {
        let mut robot = robot_with(MowerParams::default());

        // Motor commands need ExternalControl
        assert_eq!(
            robot.handle_bridge_cmd(&cmd(1, motor(10.0, 10.0, 0.0))),
            BridgeResponse::CannotExecute
        );

        assert_eq!(
            robot.handle_bridge_cmd(&cmd(2, BridgeCmdBody::State(StateRequest::External))),
            BridgeResponse::Accepted
        );
        assert_eq!(robot.state(), OperatingState::ExternalControl);

        // Replays and reordering are rejected
        assert_eq!(
            robot.handle_bridge_cmd(&cmd(2, motor(10.0, 10.0, 0.0))),
            BridgeResponse::Stale
        );
        assert!(robot.motors().all_setpoints_zero());

        assert_eq!(
            robot.handle_bridge_cmd(&cmd(3, motor(10.0, 10.0, 0.0))),
            BridgeResponse::Accepted
        );
        assert!(!robot.motors().all_setpoints_zero());
    }

    #[test]
    fn test_bridge_silence_switches_off() {
        let mut robot = robot_with(MowerParams::default());
        robot.handle_bridge_cmd(&cmd(1, BridgeCmdBody::State(StateRequest::External)));
        robot.handle_bridge_cmd(&cmd(2, motor(50.0, 50.0, 0.0)));

        run(&mut robot, 2000);
        assert_eq!(robot.state(), OperatingState::ExternalControl);

        run(&mut robot, 1500);
        assert_eq!(robot.state(), OperatingState::Off);
        assert!(robot.motors().all_setpoints_zero());
        assert_eq!(robot.faults().get(FaultKind::BridgeTimeout).count_since_reset, 1);
    }

    #[test]
    fn test_bridge_motor_timeout_stops() {
        let mut robot = robot_with(MowerParams::default());
        robot.handle_bridge_cmd(&cmd(1, BridgeCmdBody::State(StateRequest::External)));
        robot.handle_bridge_cmd(&cmd(2, motor(50.0, 50.0, 0.0)));

        // Heartbeats keep the link alive but carry no motor demands
        let mut seq = 3;
        for _ in 0..15 {
            run(&mut robot, 100);
            robot.handle_bridge_cmd(&cmd(seq, BridgeCmdBody::Heartbeat));
            seq += 1;
        }

        assert_eq!(robot.state(), OperatingState::ExternalControl);
        assert!(robot.motors().all_setpoints_zero());
    }

    #[test]
    fn test_docking_and_charge_fault() {
        let mut robot = robot_with(MowerParams::default());
        robot.activate(OperatingState::RemoteControl).unwrap();
        run(&mut robot, 100);

        // Drive onto the dock
        robot.hal_mut().set_sensor(SensorId::ChgVoltage, 29.0);
        run(&mut robot, 200);
        assert_eq!(robot.state(), OperatingState::DockCharging);
        assert_eq!(robot.hal().actuator(ActuatorId::ChargeRelay), 1.0);

        // Charger overcurrent opens the relay and stops charging
        robot.hal_mut().set_sensor(SensorId::ChgCurrent, 3.0);
        run(&mut robot, 200);
        assert_eq!(robot.state(), OperatingState::Docked);
        assert_eq!(robot.hal().actuator(ActuatorId::ChargeRelay), 0.0);
        assert_eq!(robot.faults().get(FaultKind::Charger).count_since_reset, 1);
    }

    #[test]
    fn test_charger_fault_not_retried() {
        let mut params = MowerParams::default();
        params.fault_thresholds.clear();

        let mut robot = robot_with(params);
        robot.hal_mut().set_sensor(SensorId::BatVoltage, 25.0);
        robot.activate(OperatingState::RemoteControl).unwrap();
        run(&mut robot, 100);

        // Docked with a charger delivering too much current
        robot.hal_mut().set_sensor(SensorId::ChgVoltage, 29.0);
        robot.hal_mut().set_sensor(SensorId::ChgCurrent, 3.0);
        run(&mut robot, 10_000);

        assert_eq!(robot.state(), OperatingState::Docked);
        assert_eq!(robot.hal().actuator(ActuatorId::ChargeRelay), 0.0);
        assert_eq!(robot.faults().get(FaultKind::Charger).count_since_reset, 1);
        assert!(robot.status().battery.charge_lockout);

        robot.resume(OperatingState::ExternalControl).unwrap();
        assert!(!robot.status().battery.charge_lockout);
    }

    #[test]
    fn test_docked_recharges_and_resumes() {
        let mut robot = robot_with(MowerParams::default());
        robot.activate(OperatingState::RemoteControl).unwrap();
        robot.hal_mut().set_sensor(SensorId::ChgVoltage, 29.0);
        robot.hal_mut().set_sensor(SensorId::ChgCurrent, 0.1);
        run(&mut robot, 200);
        assert_eq!(robot.state(), OperatingState::DockCharging);

        // Current below the full threshold for long enough
        run(&mut robot, 61_000);
        assert_eq!(robot.state(), OperatingState::Docked);
        assert_eq!(robot.hal().actuator(ActuatorId::ChargeRelay), 0.0);

        // Battery sags while docked
        robot.hal_mut().set_sensor(SensorId::BatVoltage, 26.0);
        run(&mut robot, 200);
        assert_eq!(robot.state(), OperatingState::DockCharging);

        robot.hal_mut().set_sensor(SensorId::BatVoltage, 28.0);
        run(&mut robot, 61_000);
        assert_eq!(robot.state(), OperatingState::Docked);

        let at_ms = robot.hal().millis() + 1000;
        robot.schedule_resume(at_ms, OperatingState::ExternalControl);
        run(&mut robot, 500);
        assert_eq!(robot.state(), OperatingState::Docked);
        run(&mut robot, 700);
        assert_eq!(robot.state(), OperatingState::ExternalControl);
    }

    #[test]
    fn test_forward_timeout() {
        let mut params = MowerParams::default();
        params.state.forward_time_max_ms = 2000;
        params.bridge.silence_timeout_ms = 60_000;
        params.bridge.motor_cmd_timeout_ms = 60_000;

        let mut robot = robot_with(params);
        robot.hal_mut().set_sensor(SensorId::MotorLeftCurrent, 0.5);
        robot.hal_mut().set_sensor(SensorId::MotorRightCurrent, 0.5);
        robot.activate(OperatingState::ExternalControl).unwrap();
        robot.handle_bridge_cmd(&cmd(1, motor(100.0, 100.0, 0.0)));

        run(&mut robot, 1500);
        assert_eq!(robot.state(), OperatingState::ExternalControl);

        run(&mut robot, 1500);
        assert_eq!(robot.state(), OperatingState::Off);
        assert!(robot.motors().all_setpoints_zero());
    }

    #[test]
    fn test_idle_switch_off() {
        let mut robot = robot_with(MowerParams::default());
        run(&mut robot, 59_000);
        assert_eq!(robot.hal().actuator(ActuatorId::BatterySwitch), 1.0);

        run(&mut robot, 2000);
        assert_eq!(robot.hal().actuator(ActuatorId::BatterySwitch), 0.0);
    }

    #[test]
    fn test_indicators() {
        let mut robot = robot_with(MowerParams::default());
        run(&mut robot, 100);
        assert_eq!(robot.hal().actuator(ActuatorId::Led), 0.0);

        robot.activate(OperatingState::RemoteControl).unwrap();
        run(&mut robot, 600);
        assert_eq!(robot.hal().actuator(ActuatorId::Led), 1.0);
        assert_eq!(robot.hal().actuator(ActuatorId::Buzzer), 0.0);

        robot.hal_mut().set_sensor(SensorId::Tilt, 1.0);
        run(&mut robot, 600);
        assert_eq!(robot.hal().actuator(ActuatorId::Buzzer), ERROR_TONE_HZ);
    }

    #[test]
    fn test_totals_round_trip() {
        let mut robot = robot_with(MowerParams::default());
        let totals = RobotTotals {
            mow_time_total_min: 120.0,
            total_capacity_mah: 5000.0,
            charging_sessions: 4,
        };
        robot.restore_totals(&totals);
        assert_eq!(robot.totals(), totals);
    }
}
