//! # Maneuver messages
//!
//! Maneuver payloads dispatched by the supervisor and the progress reports
//! maneuver executors publish back.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use super::guidance::{SpeedUnits, Waypoint, ZUnits};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Progress report from the executing maneuver.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ManeuverControlState {
    /// Execution state of the maneuver.
    pub state: McsState,

    /// Estimated seconds to completion, `MANEUVER_ETA_UNKNOWN` when
    /// unknown.
    pub eta: u16,

    /// Human readable information, filled on error.
    pub info: String,
}

/// Stop the executing maneuver.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Default)]
pub struct StopManeuver;

/// Keep the vehicle at rest.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Default)]
pub struct IdleManeuver {
    /// Duration of the idle period in seconds, zero for unbounded.
    pub duration: u16,
}

/// Go to a waypoint at a given speed and vertical reference.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Goto {
    /// The target waypoint.
    pub end: Waypoint,

    /// Transit speed.
    pub speed: f64,

    /// Units of `speed`.
    pub speed_units: SpeedUnits,

    /// Vertical reference during transit.
    pub z: f64,

    /// Units of `z`.
    pub z_units: ZUnits,
}

/// Hand direct actuator control to a remote operator.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Default)]
pub struct Teleoperation;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Execution state reported in [`ManeuverControlState`].
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq)]
pub enum McsState {
    Executing,
    Done,
    Error,
}
