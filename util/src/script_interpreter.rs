//! # Bridge script interpreter module
//!
//! This module provides an interpreter for mower bridge scripts, allowing
//! command-bridge messages to be replayed at fixed times without a host
//! computer attached.
//!
//! A script is a list of `time_s: json;` entries, for example:
//!
//! ```text
//! 0.5: {"seq": 1, "type": "STATE", "payload": {"state": "EXTERNAL"}};
//! 1.0: {"seq": 2, "type": "MOTOR", "payload": {"left": 80, "right": 80, "mow": 0}};
//! ```

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::collections::VecDeque;
use std::path::Path;
use std::fs;
use regex::RegexBuilder;
use thiserror::Error;

// Internal
use comms_if::bridge::{BridgeCmd, BridgeParseError};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A command which is scripted to occur at a specific time.
struct Command {
    /// The time the command is supposed to execute at
    exec_time_s: f64,

    /// The bridge command to run
    cmd: BridgeCmd
}

/// A script interpreter.
///
/// After initialising with the path to the script to run use
/// `.get_pending_cmds` to acquire a list of commands that need executing.
pub struct ScriptInterpreter {
    cmds: VecDeque<Command>
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Could not load the script: {0}")]
    ScriptLoadError(std::io::Error),

    #[error("The script is empty (or is so bad it can't be read)")]
    ScriptEmpty,

    #[error(
        "Script contains an invalid timestamp: {0}. \
        Should be a float (like 1.0)")]
    InvalidTimestamp(String),

    #[error("Script contains an invalid command at {0} s: {1}")]
    InvalidCmd(f64, BridgeParseError)
}

pub enum PendingCmds {
    None,
    Some(Vec<BridgeCmd>),
    EndOfScript
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ScriptInterpreter {

    /// Create a new interpreter from the given script path.
    pub fn new<P: AsRef<Path>>(script_path: P) -> Result<Self, ScriptError> {
        let script = fs::read_to_string(script_path)
            .map_err(ScriptError::ScriptLoadError)?;

        Self::parse(&script)
    }

    /// Create a new interpreter from the text of a script.
    pub fn parse(script: &str) -> Result<Self, ScriptError> {
        // Empty queue of commands
        let mut cmd_queue: VecDeque<Command> = VecDeque::new();

        // Go through the script executing __the magic regex__.
        let re = match RegexBuilder::
            new(r"^\s*(\d+(\.\d+)?)\s*:\s*([^;]*);")
            .multi_line(true)
            .build()
        {
            Ok(r) => r,
            Err(_) => return Err(ScriptError::ScriptEmpty)
        };

        for cap in re.captures_iter(script) {
            let time_str = cap.get(1).map(|m| m.as_str()).unwrap_or("");
            let json_str = cap.get(3).map(|m| m.as_str()).unwrap_or("");

            // Parse the exec time
            let exec_time_s: f64 = match time_str.parse() {
                Ok(t) => t,
                Err(e) => return Err(
                    ScriptError::InvalidTimestamp(format!("{}", e)))
            };

            // Parse the command from the payload. The scripts contain JSON only.
            let cmd = match BridgeCmd::from_json(json_str) {
                Ok(c) => c,
                Err(e) => return Err(ScriptError::InvalidCmd(
                    exec_time_s, e
                ))
            };

            cmd_queue.push_back(Command {
                exec_time_s,
                cmd
            });
        }

        if cmd_queue.is_empty() {
            return Err(ScriptError::ScriptEmpty)
        }

        Ok(ScriptInterpreter {
            cmds: cmd_queue
        })
    }

    /// Return the commands due at `current_time_s`.
    pub fn get_pending_cmds(&mut self, current_time_s: f64) -> PendingCmds {

        // If the queue is empty the script is over and we return the end of
        // script variant
        if self.cmds.is_empty() {
            return PendingCmds::EndOfScript
        }

        let mut cmd_vec: Vec<BridgeCmd> = vec![];

        // Pop items from the queue while the head's exec time has passed
        while let Some(c) = self.cmds.front() {
            if c.exec_time_s > current_time_s {
                break;
            }
            if let Some(c) = self.cmds.pop_front() {
                cmd_vec.push(c.cmd);
            }
        }

        if cmd_vec.is_empty() {
            PendingCmds::None
        }
        else {
            PendingCmds::Some(cmd_vec)
        }
    }

    /// Get the number of commands remaining in the script
    pub fn get_num_cmds(&self) -> usize {
        self.cmds.len()
    }

    /// Get the length of the script in seconds
    pub fn get_duration(&self) -> f64 {
        match self.cmds.back() {
            Some(c) => c.exec_time_s,
            None => 0f64
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::bridge::{BridgeCmdBody, StateRequest};

    const SCRIPT: &str = r#"
0.5: {"seq": 1, "type": "STATE", "payload": {"state": "EXTERNAL"}};
1.0: {"seq": 2, "type": "MOTOR", "payload": {"left": 80, "right": 80, "mow": 0}};
1.0: {"seq": 3, "type": "HEARTBEAT"};
"#;

    #[test]
    fn test_pending_cmds() {
        let mut si = ScriptInterpreter::parse(SCRIPT).unwrap();
        assert_eq!(si.get_num_cmds(), 3);
        assert_eq!(si.get_duration(), 1.0);

        assert!(matches!(si.get_pending_cmds(0.1), PendingCmds::None));

        match si.get_pending_cmds(0.6) {
            PendingCmds::Some(v) => {
                assert_eq!(v.len(), 1);
                assert_eq!(v[0].body, BridgeCmdBody::State(StateRequest::External));
            }
            _ => panic!("Expected one pending command"),
        }

        match si.get_pending_cmds(2.0) {
            PendingCmds::Some(v) => assert_eq!(v.len(), 2),
            _ => panic!("Expected two pending commands"),
        }

        assert!(matches!(si.get_pending_cmds(3.0), PendingCmds::EndOfScript));
    }

    #[test]
    fn test_bad_scripts() {
        assert!(matches!(
            ScriptInterpreter::parse("nothing here"),
            Err(ScriptError::ScriptEmpty)
        ));
        assert!(matches!(
            ScriptInterpreter::parse(r#"1.0: {"seq": 1, "type": "JUMP"};"#),
            Err(ScriptError::InvalidCmd(_, _))
        ));
    }
}
