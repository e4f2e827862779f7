//! # Cooperative scheduler
//!
//! A table of periodic tasks gated by due timestamps. The robot reads the
//! time once per loop iteration, asks the scheduler which tasks are due and
//! runs them in the order returned, which is the fixed priority order of
//! `Task::ALL` (safety checks before actuation).
//!
//! A task's next due time advances by its period rather than being set to
//! `now + period`, so jitter does not accumulate into drift. A task that has
//! fallen more than `max_catch_up` periods behind is resynchronised instead
//! of being run back to back to clear the backlog.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::debug;
use serde::{Deserialize, Serialize};

// Internal
use crate::params::{ensure, ParamsError};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Task periods.
///
/// Units: milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedParams {
    pub safety_period_ms: u64,
    pub battery_period_ms: u64,
    pub perimeter_period_ms: u64,
    pub obstacle_period_ms: u64,
    pub bridge_period_ms: u64,
    pub remote_period_ms: u64,
    pub odometry_period_ms: u64,
    pub timeouts_period_ms: u64,
    pub error_check_period_ms: u64,

    /// Interval of the periodic fault counter reset
    pub error_reset_period_ms: u64,

    pub motor_control_period_ms: u64,

    /// LED and buzzer
    pub indicators_period_ms: u64,

    pub stats_period_ms: u64,

    /// Number of periods a task may fall behind before it is resynchronised
    pub max_catch_up: u32,
}

/// Due time of one periodic task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScheduleEntry {
    pub period_ms: u64,
    pub next_due_ms: u64,
    pub enabled: bool,
}

/// The schedule table, one entry per task in `Task::ALL` order.
#[derive(Debug, Clone)]
pub struct Scheduler {
    entries: [ScheduleEntry; Task::COUNT],
    max_catch_up: u64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Periodic tasks, declared in execution priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Task {
    Safety,
    Battery,
    Perimeter,
    Obstacle,
    Bridge,
    Remote,
    Odometry,
    Timeouts,
    ErrorCheck,
    ErrorReset,
    MotorControl,
    Indicators,
    Stats,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for SchedParams {
    fn default() -> Self {
        Self {
            safety_period_ms: 50,
            battery_period_ms: 100,
            perimeter_period_ms: 50,
            obstacle_period_ms: 50,
            bridge_period_ms: 100,
            remote_period_ms: 100,
            odometry_period_ms: 100,
            timeouts_period_ms: 100,
            error_check_period_ms: 100,
            error_reset_period_ms: 300_000,
            motor_control_period_ms: 50,
            indicators_period_ms: 500,
            stats_period_ms: 1000,
            max_catch_up: 3,
        }
    }
}

impl SchedParams {
    pub fn period_ms(&self, task: Task) -> u64 {
        match task {
            Task::Safety => self.safety_period_ms,
            Task::Battery => self.battery_period_ms,
            Task::Perimeter => self.perimeter_period_ms,
            Task::Obstacle => self.obstacle_period_ms,
            Task::Bridge => self.bridge_period_ms,
            Task::Remote => self.remote_period_ms,
            Task::Odometry => self.odometry_period_ms,
            Task::Timeouts => self.timeouts_period_ms,
            Task::ErrorCheck => self.error_check_period_ms,
            Task::ErrorReset => self.error_reset_period_ms,
            Task::MotorControl => self.motor_control_period_ms,
            Task::Indicators => self.indicators_period_ms,
            Task::Stats => self.stats_period_ms,
        }
    }

    pub fn are_valid(&self) -> Result<(), ParamsError> {
        ensure(
            Task::ALL.iter().all(|t| self.period_ms(*t) > 0),
            "sched",
            "every period must be positive"
        )?;
        ensure(
            self.error_reset_period_ms >= self.error_check_period_ms,
            "sched.error_reset_period_ms",
            "must not be shorter than error_check_period_ms"
        )?;
        ensure(self.max_catch_up >= 1, "sched.max_catch_up", "must be at least 1")
    }
}

impl Task {
    pub const COUNT: usize = 13;

    pub const ALL: [Task; Task::COUNT] = [
        Task::Safety,
        Task::Battery,
        Task::Perimeter,
        Task::Obstacle,
        Task::Bridge,
        Task::Remote,
        Task::Odometry,
        Task::Timeouts,
        Task::ErrorCheck,
        Task::ErrorReset,
        Task::MotorControl,
        Task::Indicators,
        Task::Stats,
    ];
}

impl ScheduleEntry {
    fn is_due(&self, now_ms: u64) -> bool {
        self.enabled && now_ms >= self.next_due_ms
    }

    fn advance(&mut self, now_ms: u64, max_catch_up: u64) {
        self.next_due_ms += self.period_ms;

        let behind_ms = now_ms.saturating_sub(self.next_due_ms);
        if behind_ms >= self.period_ms.saturating_mul(max_catch_up) {
            self.next_due_ms = now_ms + self.period_ms;
        }
    }
}

impl Scheduler {
    /// Create the table with every task due at `start_ms`.
    ///
    /// The periodic error reset is first due one period after the start.
    pub fn new(params: &SchedParams, start_ms: u64) -> Self {
        let mut entries = [ScheduleEntry {
            period_ms: 1,
            next_due_ms: start_ms,
            enabled: true,
        }; Task::COUNT];

        for (i, task) in Task::ALL.iter().enumerate() {
            entries[i].period_ms = params.period_ms(*task).max(1);
            if *task == Task::ErrorReset {
                entries[i].next_due_ms = start_ms + entries[i].period_ms;
            }
        }

        Self {
            entries,
            max_catch_up: params.max_catch_up.max(1) as u64,
        }
    }

    /// Tasks due at `now_ms`, in priority order. Their due times are advanced.
    pub fn due(&mut self, now_ms: u64) -> Vec<Task> {
        let mut due = Vec::with_capacity(Task::COUNT);

        for (i, entry) in self.entries.iter_mut().enumerate() {
            if entry.is_due(now_ms) {
                entry.advance(now_ms, self.max_catch_up);
                due.push(Task::ALL[i]);
            }
        }

        due
    }

    pub fn set_enabled(&mut self, task: Task, enabled: bool) {
        debug!("Task {:?} {}", task, if enabled { "enabled" } else { "disabled" });
        self.entries[task as usize].enabled = enabled;
    }

    pub fn entry(&self, task: Task) -> ScheduleEntry {
        self.entries[task as usize]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn params() -> SchedParams {
        SchedParams {
            safety_period_ms: 10,
            battery_period_ms: 100,
            stats_period_ms: 1000,
            ..SchedParams::default()
        }
    }

    #[test]
    fn test_priority_order() {
        let mut s = Scheduler::new(&params(), 0);
        let due = s.due(0);

        // Everything but the periodic reset runs on the first iteration
        assert_eq!(due.len(), Task::COUNT - 1);
        assert_eq!(due[0], Task::Safety);
        assert!(!due.contains(&Task::ErrorReset));

        let pos = |t| due.iter().position(|d| *d == t);
        assert!(pos(Task::ErrorCheck) < pos(Task::MotorControl));
        assert!(pos(Task::Perimeter) < pos(Task::MotorControl));
    }

    #[test]
    fn test_only_due_tasks_run() {
        let mut s = Scheduler::new(&params(), 0);
        s.due(0);

        assert!(s.due(5).is_empty());
        assert_eq!(s.due(10), vec![Task::Safety]);
        assert_eq!(s.entry(Task::Safety).next_due_ms, 20);
    }

    #[test]
    fn test_no_drift_under_jitter() {
        let mut s = Scheduler::new(&params(), 0);
        s.due(0);

        // Loop iterations arrive late by varying amounts
        let mut runs = 0;
        let mut now = 0;
        while now < 10_000 {
            now += 7;
            if s.due(now).contains(&Task::Battery) {
                runs += 1;
            }
        }

        // 100 ms period over 10 s, plus or minus the one in progress
        assert!(runs >= 99 && runs <= 100, "runs = {}", runs);
        assert_eq!(s.entry(Task::Battery).next_due_ms % 100, 0);
    }

    #[test]
    fn test_bounded_catch_up() {
        let mut s = Scheduler::new(&params(), 0);
        s.due(0);

        // Long stall, 100 safety periods missed
        let due = s.due(1000);
        assert!(due.contains(&Task::Safety));
        assert_eq!(s.entry(Task::Safety).next_due_ms, 1010);

        // Not run again until its next period
        assert!(!s.due(1005).contains(&Task::Safety));
    }

    #[test]
    fn test_small_lag_catches_up() {
        let mut s = Scheduler::new(&params(), 0);
        s.due(0);

        // Two periods late, within the catch up bound
        assert!(s.due(25).contains(&Task::Safety));
        assert_eq!(s.entry(Task::Safety).next_due_ms, 20);
        assert!(s.due(25).contains(&Task::Safety));
        assert_eq!(s.entry(Task::Safety).next_due_ms, 30);
    }

    #[test]
    fn test_disabled_task() {
        let mut s = Scheduler::new(&params(), 0);
        s.set_enabled(Task::Remote, false);
        assert!(!s.due(0).contains(&Task::Remote));
    }

    #[test]
    fn test_params_validity() {
        assert!(SchedParams::default().are_valid().is_ok());
        let p = SchedParams { safety_period_ms: 0, ..SchedParams::default() };
        assert!(p.are_valid().is_err());
    }
}
