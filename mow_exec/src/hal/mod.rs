//! Hardware abstraction layer
//!
//! The core talks to sensors and actuators only through the `Hal` trait. A
//! platform provides one implementation, injected into `Robot` at
//! construction. `sim::SimHal` is the implementation used by the tests and
//! the demo executable.
//!
//! Implementations must never block. Interrupt driven inputs (encoder and
//! tachometer edges, R/C pulses) are aggregated by the implementation and
//! read as counters or widths, sampled once per loop iteration.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod sim;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::eqpt::{ActuatorId, SensorId};

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Sensor and actuator access for one hardware platform.
pub trait Hal {
    /// Monotonic time since startup.
    ///
    /// Units: milliseconds
    fn millis(&self) -> u64;

    /// Latest sample of a sensor, or `None` if there is no new data.
    fn read_sensor(&mut self, id: SensorId) -> Option<f64>;

    /// Command an actuator. Fire and forget.
    fn set_actuator(&mut self, id: ActuatorId, value: f64);
}
