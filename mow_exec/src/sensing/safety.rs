//! Tilt and IMU link supervision

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{error, info};
use serde::Serialize;

// Internal
use super::{is_high, Params, SensingError};
use crate::fault::FaultKind;
use util::module::State;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Safety monitor module state.
#[derive(Debug, Default)]
pub struct SafetyMonitor {
    params: Option<Params>,
    tilted: bool,
    imu_lost: bool,
    last_imu_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SafetyInput {
    pub now_ms: u64,
    pub tilt: Option<f64>,

    /// IMU link flag, high while the IMU answers
    pub imu_comm: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct SafetyOutput {
    pub tilted: bool,
    pub imu_lost: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SafetyReport {
    /// New safety faults, each reported once per episode
    pub faults: Vec<FaultKind>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl State for SafetyMonitor {
    type InitData = Params;
    type InitError = SensingError;

    type InputData = SafetyInput;
    type OutputData = SafetyOutput;
    type StatusReport = SafetyReport;
    type ProcError = SensingError;

    fn init(&mut self, init_data: Self::InitData)
        -> Result<(), Self::InitError>
    {
        init_data.are_valid().map_err(SensingError::InvalidParams)?;
        self.params = Some(init_data);
        Ok(())
    }

    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        let params = self.params
            .as_ref()
            .ok_or(SensingError::NotInitialised)?;
        let now_ms = input_data.now_ms;

        let mut report = SafetyReport::default();

        if params.tilt_use {
            if let Some(t) = input_data.tilt.filter(|t| t.is_finite()) {
                let tilted = is_high(t);
                if tilted && !self.tilted {
                    error!("Tilt detected");
                    report.faults.push(FaultKind::ImuTilt);
                }
                self.tilted = tilted;
            }
        }

        if params.imu_use {
            let last_ms = *self.last_imu_ms.get_or_insert(now_ms);

            let lost = match input_data.imu_comm.filter(|v| v.is_finite()) {
                Some(v) if is_high(v) => {
                    self.last_imu_ms = Some(now_ms);
                    false
                },
                Some(_) => true,
                None => now_ms.saturating_sub(last_ms) > params.imu_timeout_ms
            };

            if lost && !self.imu_lost {
                error!("IMU communication lost");
                report.faults.push(FaultKind::ImuComm);
            }
            else if !lost && self.imu_lost {
                info!("IMU communication restored");
            }
            self.imu_lost = lost;
        }

        Ok((
            SafetyOutput { tilted: self.tilted, imu_lost: self.imu_lost },
            report
        ))
    }
}

impl SafetyMonitor {
    pub fn new() -> Self {
        Self::default()
    }
}
