//! # PID controller module
//!
//! A PID controller with output clamping, used by the wheel and cutter speed
//! loops. Each loop owns its own controller.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};

// Internal
use util::maths::clamp;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Gains and output limits of a PID controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PidParams {
    /// Proportional gain
    pub k_p: f64,

    /// Integral gain
    pub k_i: f64,

    /// Derivative gain
    pub k_d: f64,

    /// Lowest output the controller may produce
    pub output_min: f64,

    /// Highest output the controller may produce
    pub output_max: f64,
}

/// A PID controller
#[derive(Debug, Clone, Serialize)]
pub struct PidController {
    /// The value the controller is driving the measurement towards
    pub setpoint: f64,

    /// Proportional gain
    k_p: f64,

    /// Integral gain
    k_i: f64,

    /// Derivative gain
    k_d: f64,

    /// The integral accumulation
    integral: f64,

    /// Previous error, `None` after a reset so that the first update after it
    /// has no derivative kick
    prev_error: Option<f64>,

    output_min: f64,
    output_max: f64,

    /// Last output produced
    output: f64,

    /// Timestamp of the last update made through `update_at`
    last_update_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for PidParams {
    fn default() -> Self {
        Self {
            k_p: 1.0,
            k_i: 0.0,
            k_d: 0.0,
            output_min: -255.0,
            output_max: 255.0,
        }
    }
}

impl PidParams {
    /// True if the limits are ordered and all gains are finite.
    pub fn is_valid(&self) -> bool {
        [self.k_p, self.k_i, self.k_d, self.output_min, self.output_max]
            .iter()
            .all(|v| v.is_finite())
            && self.output_min <= self.output_max
    }
}

impl Default for PidController {
    fn default() -> Self {
        Self::new(&PidParams::default())
    }
}

impl PidController {

    /// Create a new controller with the given gains and limits.
    pub fn new(params: &PidParams) -> Self {
        Self {
            setpoint: 0.0,
            k_p: params.k_p,
            k_i: params.k_i,
            k_d: params.k_d,
            integral: 0.0,
            prev_error: None,
            output_min: params.output_min,
            output_max: params.output_max,
            output: 0.0,
            last_update_ms: None,
        }
    }

    /// Update the controller with a new measurement taken `dt` seconds after
    /// the previous one, returning the new output.
    ///
    /// A `dt` that is not strictly positive is rejected: nothing is updated
    /// and the previous output is returned.
    pub fn update(&mut self, measured_value: f64, dt: f64) -> f64 {
        // Also catches NaN
        if !(dt > 0.0) {
            return self.output;
        }

        let error = self.setpoint - measured_value;

        let deriv = match self.prev_error {
            Some(e) => (error - e) / dt,
            None => 0.0
        };

        let p_term = self.k_p * error;
        let d_term = self.k_d * deriv;

        // Accumulate the integral, then clamp it so that P + I + D stays
        // within the output limits. The bound on the integral term never
        // crosses zero, the integral is not made to fight the P term when P
        // alone is saturated.
        let mut integral = self.integral + error * dt;
        if self.k_i != 0.0 {
            let i_min = (self.output_min - p_term - d_term).min(0.0);
            let i_max = (self.output_max - p_term - d_term).max(0.0);
            let i_term = clamp(self.k_i * integral, i_min, i_max);
            integral = i_term / self.k_i;
        }
        self.integral = integral;

        self.output = clamp(
            p_term + self.k_i * self.integral + d_term,
            self.output_min,
            self.output_max
        );
        self.prev_error = Some(error);

        self.output
    }

    /// Update the controller using the time elapsed since the last call to
    /// this function.
    ///
    /// The first call after creation or a reset only records the time.
    pub fn update_at(&mut self, measured_value: f64, now_ms: u64) -> f64 {
        let dt = match self.last_update_ms {
            Some(t) if now_ms > t => (now_ms - t) as f64 / 1000.0,
            Some(_) => return self.output,
            None => 0.0
        };
        self.last_update_ms = Some(now_ms);

        self.update(measured_value, dt)
    }

    /// Clear the integral, the previous error and the output.
    ///
    /// Used whenever the loop's context changes (state transition, mode
    /// switch) so that stale control action is not carried over.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = None;
        self.output = 0.0;
        self.last_update_ms = None;
    }

    /// Last output produced.
    pub fn output(&self) -> f64 {
        self.output
    }

    /// Current integral accumulation.
    pub fn integral(&self) -> f64 {
        self.integral
    }
}
