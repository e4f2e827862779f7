//! A single motor channel: demand, ramp, current sensing and speed loop

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, trace, warn};
use serde::Serialize;

// Internal
use super::{ChannelParams, ControlMode};
use crate::fault::FaultKind;
use crate::pid::{PidController, PidParams};
use util::maths::{clamp, low_pass, step_towards};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Point in time copy of a channel.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct MotorChannel {
    pub id: MotorId,

    /// PWM currently applied, before any direction inversion
    pub pwm_current: f64,

    /// PWM the ramp is moving towards
    pub speed_setpoint: f64,

    /// Demand from the active controller (PWM or RPM depending on mode)
    pub demand: f64,

    /// Filtered motor current
    ///
    /// Units: amperes
    pub sense_current: f64,

    /// Number of stall and overcurrent events on this channel
    pub sense_fault_counter: u32,

    /// Since when a commanded motor has drawn no current
    pub zero_since_ms: Option<u64>,

    pub measured_rpm: Option<f64>,

    pub mode: ControlMode,
}

/// The control loop of one channel. Owns its PID.
#[derive(Debug, Clone)]
pub struct MotorLoop {
    params: ChannelParams,
    swap_dir: bool,
    pid: PidController,
    state: MotorChannel,
    last_tick_ms: Option<u64>,
}

/// Samples for one tick of a channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelInput {
    pub now_ms: u64,

    /// Raw motor current, `None` if there is no new sample
    pub current: Option<f64>,

    /// Measured speed, `None` if unavailable
    pub rpm: Option<f64>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MotorId {
    Left,
    Right,
    Mow,
}

/// Event raised by a channel tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Commanded but not drawing current, demand has been zeroed
    Stall,

    /// Current above the limit, PWM has been cut
    Overcurrent,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MotorId {
    pub fn stall_fault(self) -> FaultKind {
        match self {
            MotorId::Left => FaultKind::MotorLeft,
            MotorId::Right => FaultKind::MotorRight,
            MotorId::Mow => FaultKind::MotorMow,
        }
    }

    pub fn overcurrent_fault(self) -> FaultKind {
        match self {
            MotorId::Left => FaultKind::MotorLeftOvercurrent,
            MotorId::Right => FaultKind::MotorRightOvercurrent,
            MotorId::Mow => FaultKind::MotorMowOvercurrent,
        }
    }
}

impl ChannelEvent {
    pub fn fault(self, id: MotorId) -> FaultKind {
        match self {
            ChannelEvent::Stall => id.stall_fault(),
            ChannelEvent::Overcurrent => id.overcurrent_fault(),
        }
    }
}

impl MotorLoop {
    pub fn new(id: MotorId, params: ChannelParams, swap_dir: bool) -> Self {
        let pid = PidController::new(&PidParams {
            output_min: -params.max_pwm,
            output_max: params.max_pwm,
            ..params.pid
        });

        Self {
            state: MotorChannel {
                id,
                pwm_current: 0.0,
                speed_setpoint: 0.0,
                demand: 0.0,
                sense_current: 0.0,
                sense_fault_counter: 0,
                zero_since_ms: None,
                measured_rpm: None,
                mode: params.mode,
            },
            params,
            swap_dir,
            pid,
            last_tick_ms: None,
        }
    }

    /// Set the demand, interpreted according to the current mode.
    pub fn set_demand(&mut self, demand: f64) {
        if demand.is_finite() {
            self.state.demand = demand;
        }
    }

    /// Zero the demand and setpoint and reset the speed loop. The PWM keeps
    /// ramping down.
    pub fn zero_setpoint(&mut self) {
        self.state.demand = 0.0;
        self.state.speed_setpoint = 0.0;
        self.state.zero_since_ms = None;
        self.pid.reset();
    }

    /// Change the control mode. Resets the PID if the mode changes.
    pub fn set_mode(&mut self, mode: ControlMode) {
        if mode != self.state.mode {
            debug!("Motor {:?} mode {:?} -> {:?}", self.state.id, self.state.mode, mode);
            self.state.mode = mode;
            self.pid.reset();
        }
    }

    /// Run one tick of the channel.
    pub fn tick(&mut self, input: &ChannelInput) -> Option<ChannelEvent> {
        let now_ms = input.now_ms;
        let dt = match self.last_tick_ms {
            Some(t) => now_ms.saturating_sub(t) as f64 / 1000.0,
            None => 0.0
        };
        self.last_tick_ms = Some(now_ms);

        if let Some(c) = input.current.filter(|c| c.is_finite()) {
            self.state.sense_current = low_pass(
                self.state.sense_current,
                c.abs(),
                self.params.sense_filter
            );
        }
        if let Some(rpm) = input.rpm.filter(|r| r.is_finite()) {
            self.state.measured_rpm = Some(rpm);
        }

        // Overcurrent bypasses the ramp
        if self.state.sense_current > self.params.overcurrent {
            warn!(
                "Motor {:?} overcurrent ({:.2} A), PWM cut",
                self.state.id, self.state.sense_current
            );
            self.state.pwm_current = 0.0;
            self.state.speed_setpoint = 0.0;
            self.state.sense_fault_counter =
                self.state.sense_fault_counter.saturating_add(1);
            self.pid.reset();
            return Some(ChannelEvent::Overcurrent);
        }

        let event = self.check_stall(now_ms);

        self.state.speed_setpoint = match self.state.mode {
            ControlMode::OpenLoop => self.state.demand,
            ControlMode::RpmFeedback if self.state.demand == 0.0 => {
                self.pid.reset();
                0.0
            },
            ControlMode::RpmFeedback => {
                self.pid.setpoint = self.state.demand;
                match self.state.measured_rpm {
                    Some(rpm) => self.pid.update(rpm, dt),
                    None => self.pid.output()
                }
            }
        };
        self.state.speed_setpoint = self.limit(self.state.speed_setpoint);

        self.state.pwm_current = self.limit(step_towards(
            self.state.pwm_current,
            self.state.speed_setpoint,
            self.params.accel * dt
        ));

        trace!(
            "Motor {:?} pwm {:.1} -> {:.1}",
            self.state.id, self.state.pwm_current, self.state.speed_setpoint
        );

        event
    }

    /// The PWM to send to the actuator.
    ///
    /// Reversed wiring is compensated here and nowhere else.
    pub fn physical_pwm(&self) -> f64 {
        if self.swap_dir {
            -self.state.pwm_current
        }
        else {
            self.state.pwm_current
        }
    }

    pub fn snapshot(&self) -> MotorChannel {
        self.state
    }

    pub fn pwm(&self) -> f64 {
        self.state.pwm_current
    }

    pub fn id(&self) -> MotorId {
        self.state.id
    }

    /// A commanded motor drawing no current for longer than the settle time
    /// stalls once, then its demand is zeroed.
    fn check_stall(&mut self, now_ms: u64) -> Option<ChannelEvent> {
        let commanded = self.state.demand != 0.0;

        if !commanded || self.state.sense_current >= self.params.min_motion_current {
            self.state.zero_since_ms = None;
            return None;
        }

        let since = *self.state.zero_since_ms.get_or_insert(now_ms);
        if now_ms.saturating_sub(since) <= self.params.zero_settle_time_ms {
            return None;
        }

        warn!(
            "Motor {:?} stalled: no current for {} ms",
            self.state.id,
            now_ms - since
        );
        self.state.sense_fault_counter =
            self.state.sense_fault_counter.saturating_add(1);
        self.zero_setpoint();

        Some(ChannelEvent::Stall)
    }

    /// The cutter only turns one way.
    fn limit(&self, pwm: f64) -> f64 {
        let max = self.params.max_pwm;
        match self.state.id {
            MotorId::Mow => clamp(pwm, 0.0, max),
            _ => clamp(pwm, -max, max),
        }
    }
}
