//! # Mower library.
//!
//! The control core of the mower, usable from the executable, the benches
//! and any other host that provides a `hal::Hal` implementation.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

/// Command bridge supervision - sequence ids and link timeouts
pub mod bridge_mon;

/// Fault kinds and the fault counter registry
pub mod fault;

/// Hardware abstraction layer and the simulated platform
pub mod hal;

/// Wheel and cutter motor control - ramps, stall and overcurrent detection
pub mod motor_ctrl;

/// Wheel encoder and cutter tachometer processing
pub mod odometry;

/// Parameters of the whole mower
pub mod params;

/// Perimeter wire signal tracking
pub mod perimeter;

/// Persistence of settings, fault counters and lifetime statistics
pub mod persist;

/// PID controller
pub mod pid;

/// Battery supervision and charging
pub mod power;

/// R/C remote control input
pub mod remote;

/// The robot, tying every other module together
pub mod robot;

/// Cooperative task scheduler
pub mod sched;

/// Obstacle and safety sensors
pub mod sensing;

/// Operating state machine
pub mod state_machine;

/// Loop rate and mowing time statistics
pub mod stats;

/// Status snapshots for telemetry
pub mod status;
