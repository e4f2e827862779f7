//! # Command bridge monitor
//!
//! Sequence checking and timeout supervision of the external command
//! bridge. Applying the commands is left to the robot, which knows the
//! operating state.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, warn};
use serde::{Deserialize, Serialize};

// Internal
use crate::params::{ensure, ParamsError};
use comms_if::bridge::{BridgeCmd, BridgeResponse};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Time without any message after which the bridge is considered gone
    /// and the robot is switched off.
    ///
    /// Units: milliseconds
    pub silence_timeout_ms: u64,

    /// Time without a motor command after which the motor setpoints are
    /// zeroed. The state is kept.
    ///
    /// Units: milliseconds
    pub motor_cmd_timeout_ms: u64,
}

/// Bridge supervision state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BridgeMonitor {
    params: Params,

    /// Last accepted sequence id
    pub last_seq: Option<u64>,

    pub last_msg_ms: Option<u64>,
    pub last_motor_ms: Option<u64>,

    /// Number of commands rejected as stale
    pub rejected: u32,

    /// Timeouts are only supervised while armed (in ExternalControl)
    armed: bool,
    silent: bool,
    motor_timed_out: bool,
}

/// Timeouts which started with this check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeCheck {
    pub silence: bool,
    pub motor_timeout: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            silence_timeout_ms: 3000,
            motor_cmd_timeout_ms: 1000,
        }
    }
}

impl Params {
    pub fn are_valid(&self) -> Result<(), ParamsError> {
        ensure(
            self.motor_cmd_timeout_ms > 0,
            "bridge.motor_cmd_timeout_ms",
            "must be positive"
        )?;
        ensure(
            self.silence_timeout_ms >= self.motor_cmd_timeout_ms,
            "bridge.silence_timeout_ms",
            "must not be shorter than motor_cmd_timeout_ms"
        )
    }
}

impl BridgeMonitor {
    pub fn new(params: Params) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    /// Check a command's sequence id and stamp the message time.
    ///
    /// Returns `Stale` for an id not greater than the last accepted one, the
    /// command must then be ignored.
    pub fn accept(&mut self, cmd: &BridgeCmd, now_ms: u64) -> BridgeResponse {
        if let Some(last) = self.last_seq {
            if cmd.seq <= last {
                warn!("Stale bridge command {} (last {}) rejected", cmd.seq, last);
                self.rejected = self.rejected.saturating_add(1);
                return BridgeResponse::Stale;
            }
        }

        self.last_seq = Some(cmd.seq);
        self.last_msg_ms = Some(now_ms);
        if self.silent {
            debug!("Bridge message after silence");
            self.silent = false;
        }

        BridgeResponse::Accepted
    }

    /// Stamp the arrival of a motor command.
    pub fn note_motor(&mut self, now_ms: u64) {
        self.last_motor_ms = Some(now_ms);
        self.motor_timed_out = false;
    }

    /// Start supervising, timeouts count from `now_ms`.
    pub fn arm(&mut self, now_ms: u64) {
        self.armed = true;
        self.silent = false;
        self.motor_timed_out = false;
        self.last_msg_ms = Some(now_ms);
        self.last_motor_ms = Some(now_ms);
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    /// Report timeouts that started since the last check. Each is reported
    /// once until traffic resumes.
    pub fn check(&mut self, now_ms: u64) -> BridgeCheck {
        let mut check = BridgeCheck::default();
        if !self.armed {
            return check;
        }

        let elapsed = |t: Option<u64>| t.map_or(0, |t| now_ms.saturating_sub(t));

        if !self.silent && elapsed(self.last_msg_ms) > self.params.silence_timeout_ms {
            warn!("Command bridge silent for {} ms", elapsed(self.last_msg_ms));
            self.silent = true;
            check.silence = true;
        }

        if !self.motor_timed_out
            && elapsed(self.last_motor_ms) > self.params.motor_cmd_timeout_ms
        {
            debug!("No motor command for {} ms", elapsed(self.last_motor_ms));
            self.motor_timed_out = true;
            check.motor_timeout = true;
        }

        check
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::bridge::BridgeCmdBody;

    fn heartbeat(seq: u64) -> BridgeCmd {
        BridgeCmd { seq, body: BridgeCmdBody::Heartbeat }
    }

    #[test]
    fn test_stale_rejected() {
        let mut m = BridgeMonitor::new(Params::default());

        assert_eq!(m.accept(&heartbeat(5), 0), BridgeResponse::Accepted);
        assert_eq!(m.accept(&heartbeat(5), 10), BridgeResponse::Stale);
        assert_eq!(m.accept(&heartbeat(3), 20), BridgeResponse::Stale);
        assert_eq!(m.accept(&heartbeat(6), 30), BridgeResponse::Accepted);

        assert_eq!(m.rejected, 2);
        assert_eq!(m.last_seq, Some(6));
        assert_eq!(m.last_msg_ms, Some(30));
    }

    #[test]
    fn test_not_armed_never_times_out() {
        let mut m = BridgeMonitor::new(Params::default());
        assert_eq!(m.check(1_000_000), BridgeCheck::default());
    }

    #[test]
    fn test_timeouts_reported_once() {
        let mut m = BridgeMonitor::new(Params {
            silence_timeout_ms: 2000,
            motor_cmd_timeout_ms: 500,
        });
        m.arm(0);

        // Heartbeats keep the link alive but are not motor commands
        let mut motor = 0;
        let mut silence = 0;
        for i in 1..40u64 {
            let now = i * 100;
            if now < 1500 {
                m.accept(&heartbeat(i), now);
            }
            let c = m.check(now);
            motor += c.motor_timeout as u32;
            silence += c.silence as u32;
        }

        assert_eq!(motor, 1);
        assert_eq!(silence, 1);

        // A new motor command re-arms the motor timeout
        m.note_motor(4000);
        assert!(!m.check(4100).motor_timeout);
        assert!(m.check(4600).motor_timeout);
    }
}
