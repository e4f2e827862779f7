//! Implementations for the perimeter engine state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, trace};
use serde::Serialize;

// Internal
use super::{Params, PerimeterError, RunningMedian, Side};
use crate::fault::FaultKind;
use util::module::State;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Perimeter tracking state for one side.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct PerimeterTrack {
    /// Last valid magnitude received from the HAL
    pub filtered_magnitude: f64,

    /// Running median of the received magnitudes
    pub smoothed_magnitude: f64,

    pub inside: bool,

    /// Number of accepted inside/outside changes
    pub transition_count: u32,

    pub last_transition_ms: Option<u64>,

    pub signal_present: bool,

    /// Start of the current loss episode
    pub signal_lost_since_ms: Option<u64>,
}

/// Perimeter engine.
#[derive(Debug, Default)]
pub struct PerimeterEngine {
    params: Option<Params>,
    left: SideTracker,
    right: SideTracker,
}

#[derive(Debug, Default)]
struct SideTracker {
    track: PerimeterTrack,
    median: Option<RunningMedian>,

    /// Candidate classification and for how many consecutive samples it has
    /// held
    pending: Option<(bool, u32)>,

    /// False until the first classification has been debounced
    settled: bool,

    last_sample_ms: Option<u64>,
}

/// Input data to the perimeter engine, sampled once per tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputData {
    pub now_ms: u64,

    /// Signed magnitude of the left coil, `None` if there is no new sample.
    pub left: Option<f64>,

    pub right: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct OutputData {
    pub left: PerimeterTrack,
    pub right: PerimeterTrack,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusReport {
    /// Sides which changed classification this tick
    pub transitions: Vec<Side>,

    /// Faults to forward to the registry
    pub faults: Vec<FaultKind>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Combined view of one side. A lost signal takes priority over the last
/// known classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SideStatus {
    Inside,
    Outside,
    SignalLost,
}

enum SideEvent {
    None,
    Transition,
    SignalLost,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl State for PerimeterEngine {
    type InitData = Params;
    type InitError = PerimeterError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = PerimeterError;

    fn init(&mut self, init_data: Self::InitData)
        -> Result<(), Self::InitError>
    {
        init_data.are_valid().map_err(PerimeterError::InvalidParams)?;

        self.left = SideTracker::new(init_data.median_window);
        self.right = SideTracker::new(init_data.median_window);
        self.params = Some(init_data);

        Ok(())
    }

    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        let params = match self.params {
            Some(ref p) => p,
            None => return Err(PerimeterError::NotInitialised)
        };

        let mut report = StatusReport::default();

        let now_ms = input_data.now_ms;
        let events = [
            (Side::Left, self.left.update(params, now_ms, input_data.left)),
            (Side::Right, self.right.update(params, now_ms, input_data.right)),
        ];

        for (side, event) in events.iter() {
            match event {
                SideEvent::Transition => {
                    debug!(
                        "Perimeter {:?} now {}",
                        side,
                        if self.track(*side).inside { "inside" } else { "outside" }
                    );
                    report.transitions.push(*side);
                },
                SideEvent::SignalLost => {
                    info!("Perimeter {:?} signal lost", side);
                    report.faults.push(FaultKind::PerimeterTimeout);
                },
                SideEvent::None => ()
            }
        }

        Ok((self.snapshot(), report))
    }
}

impl PerimeterEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point in time copy of both tracks.
    pub fn snapshot(&self) -> OutputData {
        OutputData {
            left: self.left.track,
            right: self.right.track,
        }
    }

    pub fn track(&self, side: Side) -> &PerimeterTrack {
        match side {
            Side::Left => &self.left.track,
            Side::Right => &self.right.track,
        }
    }
}

impl PerimeterTrack {
    pub fn status(&self) -> SideStatus {
        if !self.signal_present {
            SideStatus::SignalLost
        }
        else if self.inside {
            SideStatus::Inside
        }
        else {
            SideStatus::Outside
        }
    }
}

impl SideTracker {
    fn new(window: usize) -> Self {
        Self {
            median: Some(RunningMedian::new(window)),
            ..Self::default()
        }
    }

    fn update(&mut self, params: &Params, now_ms: u64, sample: Option<f64>)
        -> SideEvent
    {
        // The timeout counts from the first tick if no sample ever arrives
        let last_sample_ms = *self.last_sample_ms.get_or_insert(now_ms);

        let sample = match sample.filter(|s| s.is_finite()) {
            Some(s) => s,
            None => {
                let silent_ms = now_ms.saturating_sub(last_sample_ms);

                if silent_ms > params.timeout_ms
                    && self.track.signal_lost_since_ms.is_none()
                {
                    self.track.signal_present = false;
                    self.track.signal_lost_since_ms = Some(now_ms);
                    return SideEvent::SignalLost;
                }

                return SideEvent::None;
            }
        };

        self.last_sample_ms = Some(now_ms);
        if self.track.signal_lost_since_ms.take().is_some() {
            info!("Perimeter signal restored");
        }
        self.track.signal_present = true;
        self.track.filtered_magnitude = sample;

        let smoothed = match self.median {
            Some(ref mut m) => {
                m.add(sample);
                m.median().unwrap_or(sample)
            },
            None => sample
        };
        self.track.smoothed_magnitude = smoothed;

        let class = classify(params, smoothed);
        trace!("Perimeter sample {:.1} (median {:.1})", sample, smoothed);

        if self.settled && class == self.track.inside {
            self.pending = None;
            return SideEvent::None;
        }

        let held = match self.pending {
            Some((c, n)) if c == class => n + 1,
            _ => 1
        };

        if held < params.debounce_samples {
            self.pending = Some((class, held));
            return SideEvent::None;
        }

        self.pending = None;
        self.track.inside = class;

        // The first accepted classification is not a boundary crossing
        if !self.settled {
            self.settled = true;
            return SideEvent::None;
        }

        self.track.transition_count = self.track.transition_count.saturating_add(1);
        self.track.last_transition_ms = Some(now_ms);

        SideEvent::Transition
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Inside only if the polarity matches and the magnitude is strictly above
/// the dead zone.
fn classify(params: &Params, magnitude: f64) -> bool {
    params.inside_polarity.matches(magnitude) && magnitude.abs() > params.threshold
}
