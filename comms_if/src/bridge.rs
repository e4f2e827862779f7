//! # Command bridge module
//!
//! Messages sent to the mower by an external autonomous controller over a
//! serial link. Every message carries a sequence id which the core uses to
//! reject duplicated or reordered commands.
//!
//! Messages are JSON objects of the form:
//!
//! ```json
//! {"seq": 12, "type": "MOTOR", "payload": {"left": 50.0, "right": 50.0, "mow": 0.0}}
//! {"seq": 13, "type": "STATE", "payload": {"state": "OFF"}}
//! {"seq": 14, "type": "HEARTBEAT"}
//! ```

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Serialize, Deserialize};
use serde_json::{self, Value};
use thiserror::Error;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A command from the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeCmd {
    /// Sequence id, strictly increasing for each new command
    pub seq: u64,

    /// What the command asks for
    pub body: BridgeCmdBody,
}

/// Motor demands from the bridge.
///
/// Wheel demands are in `[-max_pwm, max_pwm]` (or RPM if the wheels run in
/// closed loop), the cutter demand is never negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotorDems {
    pub left: f64,
    pub right: f64,
    pub mow: f64,
}

/// Payload of a `STATE` command.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct StatePayload {
    state: StateRequest,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The body of a bridge command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BridgeCmdBody {
    /// Keep-alive, resets the bridge silence timer only
    Heartbeat,

    /// New motor and cutter demands
    Motor(MotorDems),

    /// Request a change of operating state
    State(StateRequest),
}

/// State changes the bridge may request.
///
/// The bridge cannot acknowledge an error, that is reserved to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StateRequest {
    Off,
    External,
    Remote,
    Resume,
}

/// Bridge command types, as written in the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeCmdType {
    Heartbeat,
    Motor,
    State,
}

/// How the core handled a bridge command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BridgeResponse {
    /// The command was accepted and applied
    Accepted,

    /// The sequence id was not newer than the last accepted one
    Stale,

    /// The command is valid but cannot be executed in the current state
    CannotExecute,
}

/// Possible parsing errors.
#[derive(Debug, Error)]
pub enum BridgeParseError {
    #[error("Command contains invalid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("Command has an invalid type ({0})")]
    InvalidType(String),

    #[error("Command has no valid \"seq\" field")]
    MissingSeq,

    #[error("Command of type {0:?} is expected to have a payload but it doesn't")]
    MissingPayload(BridgeCmdType),

    #[error("Command of type {0:?} has an invalid payload: {1}")]
    InvalidPayload(BridgeCmdType, serde_json::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl BridgeCmd {

    /// Parse a new command from a JSON packet
    pub fn from_json(json_str: &str) -> Result<Self, BridgeParseError> {
        // Parse the JSON string into a value
        let val: Value = match serde_json::from_str(json_str) {
            Ok(v) => v,
            Err(e) => return Err(BridgeParseError::InvalidJson(e))
        };

        let seq = match val["seq"].as_u64() {
            Some(s) => s,
            None => return Err(BridgeParseError::MissingSeq)
        };

        // Get the type of the command
        let type_str = match val["type"].as_str() {
            Some(s) => s,
            None => return Err(BridgeParseError::InvalidType(String::from(
                "Expected \"type\" to be a string"
            )))
        };
        let cmd_type = match BridgeCmdType::from_str(type_str) {
            Some(t) => t,
            None => return Err(BridgeParseError::InvalidType(
                format!("{} is not a recognised command type", type_str)
            ))
        };

        // Heartbeats carry no payload, everything else must have one
        let payload = &val["payload"];
        if payload.is_null() && cmd_type != BridgeCmdType::Heartbeat {
            return Err(BridgeParseError::MissingPayload(cmd_type))
        }

        let body = match cmd_type {
            BridgeCmdType::Heartbeat => BridgeCmdBody::Heartbeat,
            BridgeCmdType::Motor => BridgeCmdBody::Motor(
                serde_json::from_value(payload.clone())
                    .map_err(|e| BridgeParseError::InvalidPayload(cmd_type, e))?
            ),
            BridgeCmdType::State => {
                let p: StatePayload = serde_json::from_value(payload.clone())
                    .map_err(|e| BridgeParseError::InvalidPayload(cmd_type, e))?;
                BridgeCmdBody::State(p.state)
            }
        };

        Ok(BridgeCmd { seq, body })
    }
}

impl BridgeCmdType {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "HEARTBEAT" => Some(BridgeCmdType::Heartbeat),
            "MOTOR" => Some(BridgeCmdType::Motor),
            "STATE" => Some(BridgeCmdType::State),
            _ => None
        }
    }
}
