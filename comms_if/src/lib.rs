//! # Communications interface crate.
//!
//! Provides the interfaces between the mower control core and its external
//! collaborators.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Command bridge messages, sent by an external autonomous controller
pub mod bridge;

/// Sensor and actuator identifiers for the hardware abstraction layer
pub mod eqpt;
