//! Motor and cutter control
//!
//! Three channels (left wheel, right wheel, cutter), each ramping its PWM
//! towards a setpoint, sensing its current for stalls and overcurrent, and
//! optionally closing a speed loop on the measured RPM.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod channel;
mod params;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Serialize;

// Internal
pub use channel::*;
pub use params::*;
use crate::fault::FaultKind;
use util::module::State;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Motor control module state.
#[derive(Debug, Default)]
pub struct MotorCtrl {
    channels: Option<[MotorLoop; 3]>,
}

/// Samples for one tick of all channels, in `MotorId` order.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputData {
    pub now_ms: u64,
    pub currents: [Option<f64>; 3],
    pub rpms: [Option<f64>; 3],
}

/// PWM values to write to the actuators, direction inversion applied.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct OutputData {
    pub left: f64,
    pub right: f64,
    pub mow: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusReport {
    /// Channels whose demand was zeroed by a stall this tick
    pub stalled: Vec<MotorId>,

    /// Channels whose PWM was cut this tick
    pub overcurrent: Vec<MotorId>,

    pub faults: Vec<FaultKind>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum MotorCtrlError {
    #[error("Invalid motor parameters: {0}")]
    InvalidParams(crate::params::ParamsError),

    #[error("Motor control used before being initialised")]
    NotInitialised,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MotorId {
    pub const ALL: [MotorId; 3] = [MotorId::Left, MotorId::Right, MotorId::Mow];

    fn index(self) -> usize {
        self as usize
    }
}

impl State for MotorCtrl {
    type InitData = Params;
    type InitError = MotorCtrlError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = MotorCtrlError;

    fn init(&mut self, init_data: Self::InitData)
        -> Result<(), Self::InitError>
    {
        init_data.are_valid().map_err(MotorCtrlError::InvalidParams)?;

        self.channels = Some([
            MotorLoop::new(MotorId::Left, init_data.wheel.clone(), init_data.left_swap_dir),
            MotorLoop::new(MotorId::Right, init_data.wheel.clone(), init_data.right_swap_dir),
            MotorLoop::new(MotorId::Mow, init_data.mow, false),
        ]);

        Ok(())
    }

    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        let channels = self.channels
            .as_mut()
            .ok_or(MotorCtrlError::NotInitialised)?;

        let mut report = StatusReport::default();

        for (i, ch) in channels.iter_mut().enumerate() {
            let event = ch.tick(&ChannelInput {
                now_ms: input_data.now_ms,
                current: input_data.currents[i],
                rpm: input_data.rpms[i],
            });

            match event {
                Some(ChannelEvent::Stall) => report.stalled.push(ch.id()),
                Some(ChannelEvent::Overcurrent) => report.overcurrent.push(ch.id()),
                None => ()
            }
            if let Some(e) = event {
                report.faults.push(e.fault(ch.id()));
            }
        }

        Ok((self.output(), report))
    }
}

impl MotorCtrl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the wheel demands. Ignored before initialisation.
    pub fn set_wheel_demands(&mut self, left: f64, right: f64) {
        if let Some(ch) = self.channels.as_mut() {
            ch[MotorId::Left.index()].set_demand(left);
            ch[MotorId::Right.index()].set_demand(right);
        }
    }

    pub fn set_mow_demand(&mut self, mow: f64) {
        if let Some(ch) = self.channels.as_mut() {
            ch[MotorId::Mow.index()].set_demand(mow);
        }
    }

    /// Zero the setpoints of every channel and reset their speed loops.
    pub fn zero_all(&mut self) {
        if let Some(ch) = self.channels.as_mut() {
            ch.iter_mut().for_each(MotorLoop::zero_setpoint);
        }
    }

    pub fn zero_wheels(&mut self) {
        if let Some(ch) = self.channels.as_mut() {
            ch[MotorId::Left.index()].zero_setpoint();
            ch[MotorId::Right.index()].zero_setpoint();
        }
    }

    pub fn set_mode(&mut self, id: MotorId, mode: ControlMode) {
        if let Some(ch) = self.channels.as_mut() {
            ch[id.index()].set_mode(mode);
        }
    }

    /// Physical PWM of every channel.
    pub fn output(&self) -> OutputData {
        match self.channels {
            Some(ref ch) => OutputData {
                left: ch[MotorId::Left.index()].physical_pwm(),
                right: ch[MotorId::Right.index()].physical_pwm(),
                mow: ch[MotorId::Mow.index()].physical_pwm(),
            },
            None => OutputData::default()
        }
    }

    pub fn channel(&self, id: MotorId) -> Option<MotorChannel> {
        self.channels.as_ref().map(|ch| ch[id.index()].snapshot())
    }

    /// Snapshots of every channel, empty before initialisation.
    pub fn snapshots(&self) -> Vec<MotorChannel> {
        match self.channels {
            Some(ref ch) => ch.iter().map(MotorLoop::snapshot).collect(),
            None => Vec::new()
        }
    }

    /// True if every channel's setpoint is zero.
    pub fn all_setpoints_zero(&self) -> bool {
        self.snapshots()
            .iter()
            .all(|c| c.speed_setpoint == 0.0 && c.demand == 0.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ctrl() -> MotorCtrl {
        let mut m = MotorCtrl::new();
        m.init(Params {
            right_swap_dir: true,
            ..Params::default()
        }).unwrap();
        m
    }

    #[test]
    fn test_not_initialised() {
        let mut m = MotorCtrl::new();
        assert!(m.proc(&InputData::default()).is_err());
        assert_eq!(m.output(), OutputData::default());
    }

    #[test]
    fn test_invalid_params() {
        let mut m = MotorCtrl::new();
        let mut p = Params::default();
        p.wheel.accel = 0.0;
        assert!(m.init(p).is_err());
    }

    #[test]
    fn test_wheel_demands_and_inversion() {
        let mut m = ctrl();
        m.set_wheel_demands(100.0, 100.0);

        let current = [Some(0.5), Some(0.5), Some(0.5)];
        m.proc(&InputData { now_ms: 0, currents: current, rpms: [None; 3] }).unwrap();
        let (out, report) = m
            .proc(&InputData { now_ms: 1000, currents: current, rpms: [None; 3] })
            .unwrap();

        assert!(report.faults.is_empty());
        assert_eq!(out.left, 100.0);
        assert_eq!(out.right, -100.0);
        assert_eq!(out.mow, 0.0);
    }

    #[test]
    fn test_overcurrent_reported() {
        let mut m = ctrl();
        m.set_mow_demand(200.0);

        let (_, report) = m.proc(&InputData {
            now_ms: 0,
            currents: [Some(0.5), Some(0.5), Some(100.0)],
            rpms: [None; 3],
        }).unwrap();

        assert_eq!(report.overcurrent, vec![MotorId::Mow]);
        assert_eq!(report.faults, vec![FaultKind::MotorMowOvercurrent]);
    }

    #[test]
    fn test_zero_all() {
        let mut m = ctrl();
        m.set_wheel_demands(100.0, -100.0);
        m.set_mow_demand(200.0);
        assert!(!m.all_setpoints_zero());

        m.zero_all();
        assert!(m.all_setpoints_zero());
    }
}
