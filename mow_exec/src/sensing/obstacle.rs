//! Bumper, drop, sonar, rain and button trigger counting

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info};
use serde::Serialize;

// Internal
use super::{is_high, Params, SensingError};
use comms_if::eqpt::SensorId;
use util::module::State;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Obstacle monitor module state.
#[derive(Debug, Default)]
pub struct ObstacleMonitor {
    params: Option<Params>,
    inputs: Vec<TriggerInput>,
    last_triggered: Option<LastTrigger>,
}

/// One polled trigger input.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct TriggerInput {
    pub id: SensorId,
    pub active: bool,
    pub count: u32,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct LastTrigger {
    pub id: SensorId,
    pub time_ms: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ObstacleInput {
    pub now_ms: u64,

    /// Raw value of each polled sensor, see `ObstacleMonitor::sensors`
    pub readings: Vec<(SensorId, Option<f64>)>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct ObstacleOutput {
    /// A bumper, drop or sonar input became active this tick
    pub obstacle: bool,

    /// The rain sensor became active this tick
    pub rain: bool,

    /// The stop button was pressed this tick
    pub button: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ObstacleReport {
    pub triggered: Vec<SensorId>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl State for ObstacleMonitor {
    type InitData = Params;
    type InitError = SensingError;

    type InputData = ObstacleInput;
    type OutputData = ObstacleOutput;
    type StatusReport = ObstacleReport;
    type ProcError = SensingError;

    fn init(&mut self, init_data: Self::InitData)
        -> Result<(), Self::InitError>
    {
        init_data.are_valid().map_err(SensingError::InvalidParams)?;

        let mut ids = Vec::new();
        if init_data.bumper_use {
            ids.extend_from_slice(&[SensorId::BumperLeft, SensorId::BumperRight]);
        }
        if init_data.drop_use {
            ids.extend_from_slice(&[SensorId::DropLeft, SensorId::DropRight]);
        }
        if init_data.sonar_use {
            ids.extend_from_slice(&[
                SensorId::SonarLeft,
                SensorId::SonarCenter,
                SensorId::SonarRight
            ]);
        }
        if init_data.rain_use {
            ids.push(SensorId::Rain);
        }
        if init_data.button_use {
            ids.push(SensorId::Button);
        }

        self.inputs = ids
            .into_iter()
            .map(|id| TriggerInput { id, active: false, count: 0 })
            .collect();
        self.params = Some(init_data);

        Ok(())
    }

    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        let params = self.params
            .as_ref()
            .ok_or(SensingError::NotInitialised)?;

        let mut output = ObstacleOutput::default();
        let mut report = ObstacleReport::default();

        for (id, reading) in input_data.readings.iter() {
            let value = match reading.filter(|v| v.is_finite()) {
                Some(v) => v,
                None => continue
            };

            let input = match self.inputs.iter_mut().find(|i| i.id == *id) {
                Some(i) => i,
                None => continue
            };

            let active = is_active(params, *id, value);
            let rising = active && !input.active;
            input.active = active;

            if !rising {
                continue;
            }

            input.count = input.count.saturating_add(1);
            report.triggered.push(*id);

            if *id == SensorId::Rain {
                info!("Rain detected");
                output.rain = true;
            }
            else if *id == SensorId::Button {
                info!("Button pressed");
                output.button = true;
            }
            else {
                debug!("Obstacle sensor {:?} triggered", id);
                output.obstacle = true;
                self.last_triggered = Some(LastTrigger {
                    id: *id,
                    time_ms: input_data.now_ms,
                });
            }
        }

        Ok((output, report))
    }
}

impl ObstacleMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sensors to poll each tick.
    pub fn sensors(&self) -> Vec<SensorId> {
        self.inputs.iter().map(|i| i.id).collect()
    }

    pub fn count(&self, id: SensorId) -> u32 {
        self.inputs
            .iter()
            .find(|i| i.id == id)
            .map(|i| i.count)
            .unwrap_or(0)
    }

    pub fn inputs(&self) -> &[TriggerInput] {
        &self.inputs
    }

    pub fn last_triggered(&self) -> Option<LastTrigger> {
        self.last_triggered
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn is_active(params: &Params, id: SensorId, value: f64) -> bool {
    match id {
        SensorId::DropLeft | SensorId::DropRight => {
            if params.drop_contact_nc {
                !is_high(value)
            }
            else {
                is_high(value)
            }
        },
        SensorId::SonarLeft | SensorId::SonarCenter | SensorId::SonarRight => {
            value > 0.0 && value < params.sonar_trigger_below_cm
        },
        _ => is_high(value)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn monitor() -> ObstacleMonitor {
        let mut m = ObstacleMonitor::new();
        m.init(Params {
            bumper_use: true,
            drop_use: true,
            drop_contact_nc: true,
            sonar_use: true,
            rain_use: true,
            ..Params::default()
        }).unwrap();
        m
    }

    fn input(now_ms: u64, readings: &[(SensorId, f64)]) -> ObstacleInput {
        ObstacleInput {
            now_ms,
            readings: readings.iter().map(|(id, v)| (*id, Some(*v))).collect(),
        }
    }

    #[test]
    fn test_counts_rising_edges() {
        let mut m = monitor();

        let (out, _) = m.proc(&input(0, &[(SensorId::BumperLeft, 1.0)])).unwrap();
        assert!(out.obstacle);

        // Held down is not a new trigger
        let (out, _) = m.proc(&input(10, &[(SensorId::BumperLeft, 1.0)])).unwrap();
        assert!(!out.obstacle);

        m.proc(&input(20, &[(SensorId::BumperLeft, 0.0)])).unwrap();
        m.proc(&input(30, &[(SensorId::BumperLeft, 1.0)])).unwrap();

        assert_eq!(m.count(SensorId::BumperLeft), 2);
        assert_eq!(
            m.last_triggered(),
            Some(LastTrigger { id: SensorId::BumperLeft, time_ms: 30 })
        );
    }

    #[test]
    fn test_drop_polarity_and_sonar() {
        let mut m = monitor();

        // Normally closed contact reads high when nothing is wrong
        let (out, _) = m.proc(&input(0, &[
            (SensorId::DropLeft, 1.0),
            (SensorId::SonarCenter, 0.0),
            (SensorId::SonarLeft, 120.0),
        ])).unwrap();
        assert!(!out.obstacle);

        let (out, report) = m.proc(&input(10, &[
            (SensorId::DropLeft, 0.0),
            (SensorId::SonarCenter, 12.0),
        ])).unwrap();
        assert!(out.obstacle);
        assert_eq!(report.triggered, vec![SensorId::DropLeft, SensorId::SonarCenter]);
    }

    #[test]
    fn test_rain_is_not_an_obstacle() {
        let mut m = monitor();
        let (out, _) = m.proc(&input(0, &[(SensorId::Rain, 1.0)])).unwrap();

        assert!(out.rain);
        assert!(!out.obstacle);
        assert_eq!(m.last_triggered(), None);
    }

    #[test]
    fn test_button_press() {
        let mut m = ObstacleMonitor::new();
        m.init(Params::default()).unwrap();

        let (out, _) = m.proc(&input(0, &[(SensorId::Button, 1.0)])).unwrap();
        assert!(out.button);
        assert!(!out.obstacle);
        assert_eq!(m.last_triggered(), None);

        // Held down is one press
        let (out, _) = m.proc(&input(50, &[(SensorId::Button, 1.0)])).unwrap();
        assert!(!out.button);
        assert_eq!(m.count(SensorId::Button), 1);
    }

    #[test]
    fn test_disabled_sensors_ignored() {
        let mut m = ObstacleMonitor::new();
        m.init(Params::default()).unwrap();

        assert!(!m.sensors().contains(&SensorId::SonarCenter));
        let (out, _) = m.proc(&input(0, &[(SensorId::SonarCenter, 5.0)])).unwrap();
        assert!(!out.obstacle);
    }
}
