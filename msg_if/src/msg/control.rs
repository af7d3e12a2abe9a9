//! # Control messages
//!
//! Control loop arbitration and path control state reporting.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use super::guidance::Waypoint;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Control loop bit: path control.
pub const CL_PATH: u32 = 0x0000_0001;

/// Control loop bit: heading (yaw) control.
pub const CL_YAW: u32 = 0x0000_0002;

/// Control loop bit: speed control.
pub const CL_SPEED: u32 = 0x0000_0004;

/// Control loop bit: depth control.
pub const CL_DEPTH: u32 = 0x0000_0008;

/// Control loop bit: altitude control.
pub const CL_ALTITUDE: u32 = 0x0000_0010;

/// Control loop bit: teleoperation.
pub const CL_TELEOPERATION: u32 = 0x0000_0020;

/// Control loop bit: the claiming producer must not be overridden by a
/// transition back to service mode.
pub const CL_NO_OVERRIDE: u32 = 0x8000_0000;

/// All control loop bits.
pub const CL_ALL: u32 = 0xFFFF_FFFF;

/// PathControlState flag: near the end waypoint.
pub const PCS_FL_NEAR: u8 = 0x01;

/// PathControlState flag: loitering.
pub const PCS_FL_LOITERING: u8 = 0x02;

/// PathControlState flag: along-track monitor has detected divergence.
pub const PCS_FL_DIVERGING_AT: u8 = 0x04;

/// PathControlState flag: cross-track monitor has detected divergence.
pub const PCS_FL_DIVERGING_CT: u8 = 0x08;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Enable or disable a set of control loops.
#[derive(Serialize, Deserialize, Debug, Copy, Clone)]
pub struct ControlLoops {
    /// Whether the loops in `mask` are being claimed or released.
    pub enable: LoopToggle,

    /// Bitfield of `CL_*` loop bits.
    pub mask: u32,
}

/// Periodic report of the path controller's tracking state.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct PathControlState {
    /// Start waypoint of the current track.
    pub start: Waypoint,

    /// End waypoint of the current track.
    pub end: Waypoint,

    /// Loiter radius in meters, zero for a straight track.
    pub lradius: f64,

    /// Bitfield of `PCS_FL_*` flags.
    pub flags: u8,

    /// Along-track position in meters.
    pub x: f64,

    /// Cross-track position in meters.
    pub y: f64,

    /// Along-track velocity in meters/second.
    pub vx: f64,

    /// Cross-track velocity in meters/second.
    pub vy: f64,

    /// Course error relative to the track bearing in radians.
    pub course_error: f64,

    /// Estimated time to reach the end waypoint in seconds.
    pub eta: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Claim or release selector for [`ControlLoops`].
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq)]
pub enum LoopToggle {
    Enable,
    Disable,
}
