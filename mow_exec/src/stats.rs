//! # Robot statistics
//!
//! Mowing time and main loop rate.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{trace, warn};
use serde::{Deserialize, Serialize};

use crate::fault::FaultKind;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const MS_PER_MINUTE: f64 = 60_000.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RobotStats {
    /// Minutes with the cutter running since the robot was last activated
    pub mow_time_trip_min: f64,

    /// Minutes with the cutter running over the robot's lifetime
    pub mow_time_total_min: f64,

    /// Main loop iterations in the last measured interval, per second
    pub loops_per_sec: f64,

    /// Consecutive intervals below the minimum loop rate
    pub cpu_low_count: u32,

    #[serde(skip)]
    loop_count: u32,

    #[serde(skip)]
    last_tick_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl RobotStats {
    /// Count one main loop iteration.
    pub fn count_loop(&mut self) {
        self.loop_count = self.loop_count.saturating_add(1);
    }

    /// Start a new mowing trip.
    pub fn reset_trip(&mut self) {
        self.mow_time_trip_min = 0.0;
    }

    /// Update the statistics. Returns `CpuSpeed` once every
    /// `cpu_low_count_max` consecutive slow intervals.
    pub fn tick(
        &mut self,
        now_ms: u64,
        mowing: bool,
        min_loops_per_sec: f64,
        cpu_low_count_max: u32
    ) -> Option<FaultKind> {
        let last_ms = match self.last_tick_ms.replace(now_ms) {
            Some(t) => t,
            None => {
                self.loop_count = 0;
                return None;
            }
        };

        let dt_ms = now_ms.saturating_sub(last_ms);
        if dt_ms == 0 {
            return None;
        }

        if mowing {
            let minutes = dt_ms as f64 / MS_PER_MINUTE;
            self.mow_time_trip_min += minutes;
            self.mow_time_total_min += minutes;
        }

        self.loops_per_sec = self.loop_count as f64 * 1000.0 / dt_ms as f64;
        self.loop_count = 0;
        trace!("Loops per second: {:.1}", self.loops_per_sec);

        if self.loops_per_sec >= min_loops_per_sec {
            self.cpu_low_count = 0;
            return None;
        }

        self.cpu_low_count += 1;
        if cpu_low_count_max > 0 && self.cpu_low_count >= cpu_low_count_max {
            warn!("Main loop too slow ({:.1} loops/s)", self.loops_per_sec);
            self.cpu_low_count = 0;
            return Some(FaultKind::CpuSpeed);
        }

        None
    }

    /// Restore the lifetime mowing time.
    pub fn restore_total(&mut self, mow_time_total_min: f64) {
        if mow_time_total_min.is_finite() && mow_time_total_min > 0.0 {
            self.mow_time_total_min = mow_time_total_min;
        }
    }
}
