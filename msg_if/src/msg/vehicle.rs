//! # Vehicle supervision messages
//!
//! Operating mode reporting, external commands, and entity health
//! aggregation consumed and produced by the vehicle supervisor.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fmt::Display;

use super::Payload;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// VehicleState flag: the current maneuver has completed.
pub const VFLG_MANEUVER_DONE: u8 = 0x01;

/// PlanControl flag: only entities named in the supervisor's safe entity
/// list abort execution of this plan.
pub const PC_FLG_IGNORE_ERRORS: u8 = 0x01;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The vehicle's operating state, owned by the vehicle supervisor.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VehicleState {
    /// Current operating mode.
    pub op_mode: OpMode,

    /// Kind id of the executing maneuver, `MANEUVER_TYPE_NONE` when none.
    pub maneuver_type: u16,

    /// Wall clock start time of the executing maneuver, -1 when none.
    pub maneuver_stime: f64,

    /// Estimated seconds to maneuver completion, `MANEUVER_ETA_UNKNOWN`
    /// when unknown.
    pub maneuver_eta: u16,

    /// Comma separated names of entities currently in error.
    pub error_ents: String,

    /// Number of entities currently in error.
    pub error_count: u8,

    /// Bitfield of `VFLG_*` flags.
    pub flags: u8,

    /// Description of the last error.
    pub last_error: String,

    /// Wall clock time of the last error, -1 when none.
    pub last_error_time: f64,

    /// Bitfield of currently enabled control loops (`CL_*` bits).
    pub control_loops: u32,
}

/// A command to the vehicle supervisor, or its reply.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VehicleCommand {
    /// Whether this message is a request or a reply.
    pub kind: CommandKind,

    /// The commanded operation.
    pub command: CommandOp,

    /// Request id echoed in the reply.
    pub request_id: u16,

    /// Maneuver payload for `CommandOp::ExecManeuver` requests.
    pub maneuver: Option<Box<Payload>>,

    /// Human readable information about a reply.
    pub info: String,
}

/// A request to calibrate the vehicle.
#[derive(Serialize, Deserialize, Debug, Copy, Clone)]
pub struct Calibration {
    /// Duration of the calibration in seconds.
    pub duration: u16,
}

/// Plan executor control message. The supervisor only inspects start
/// requests for the safe-plan flag.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PlanControl {
    /// Whether this message is a request or a reply.
    pub kind: CommandKind,

    /// The plan operation.
    pub op: PlanOp,

    /// Bitfield of `PC_FLG_*` flags.
    pub flags: u8,
}

/// Aggregated entity health state, produced by the entity monitor.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct EntityMonitoringState {
    /// Number of entities in a critical error state.
    pub ccount: u8,

    /// Comma separated names of entities in a critical error state.
    pub cnames: String,

    /// Number of entities in a non-critical error state.
    pub ecount: u8,

    /// Comma separated names of entities in a non-critical error state.
    pub enames: String,

    /// Description of the most recent error.
    pub last_error: String,

    /// Wall clock time of the most recent error, -1 when none.
    pub last_error_time: f64,
}

/// Unconditional request to stop all activity.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Default)]
pub struct Abort;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The vehicle operating mode.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq)]
pub enum OpMode {
    Service,
    Calibration,
    Error,
    Maneuver,
    External,
}

/// Request/reply discriminant shared by command style messages.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq)]
pub enum CommandKind {
    Request,
    Success,
    Failure,
}

/// Operations commanded through [`VehicleCommand`].
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq)]
pub enum CommandOp {
    ExecManeuver,
    StopManeuver,
    Calibrate,
}

/// Operations commanded through [`PlanControl`].
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq)]
pub enum PlanOp {
    Start,
    Stop,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Display for OpMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpMode::Service => write!(f, "SERVICE"),
            OpMode::Calibration => write!(f, "CALIBRATION"),
            OpMode::Error => write!(f, "ERROR"),
            OpMode::Maneuver => write!(f, "MANEUVERING"),
            OpMode::External => write!(f, "EXTERNAL CONTROL"),
        }
    }
}

impl Display for CommandOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandOp::ExecManeuver => write!(f, "maneuver start"),
            CommandOp::StopManeuver => write!(f, "maneuver stop"),
            CommandOp::Calibrate => write!(f, "vehicle calibration"),
        }
    }
}
