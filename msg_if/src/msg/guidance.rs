//! # Guidance messages
//!
//! Desired path and setpoint references exchanged between guidance
//! requesters, the path controller, and the inner control loops.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// DesiredPath flag: the start waypoint is valid. If unset the path starts
/// at the vehicle's current position.
pub const DP_FL_START: u8 = 0x01;

/// DesiredPath flag: skip the approach phase and track directly.
pub const DP_FL_DIRECT: u8 = 0x02;

/// DesiredPath flag: loiter counter-clockwise rather than clockwise.
pub const DP_FL_CCLOCKW: u8 = 0x04;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A 3D waypoint in the local NED frame.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Default, PartialEq)]
pub struct Waypoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// A path for the path controller to follow.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DesiredPath {
    /// Start waypoint, only meaningful if `DP_FL_START` is set in `flags`.
    pub start: Waypoint,

    /// End waypoint.
    pub end: Waypoint,

    /// Desired speed along the path.
    pub speed: f64,

    /// Units of `speed`.
    pub speed_units: SpeedUnits,

    /// Desired z reference at the end of the path.
    pub end_z: f64,

    /// Units of `end_z`.
    pub end_z_units: ZUnits,

    /// Loiter radius in meters, zero for a straight track.
    pub lradius: f64,

    /// Bitfield of `DP_FL_*` flags.
    pub flags: u8,
}

/// A vertical reference for the depth/altitude controller.
#[derive(Serialize, Deserialize, Debug, Copy, Clone)]
pub struct DesiredZ {
    /// The reference value in meters.
    pub value: f64,

    /// Units of `value`.
    pub z_units: ZUnits,
}

/// A speed reference for the speed controller.
#[derive(Serialize, Deserialize, Debug, Copy, Clone)]
pub struct DesiredSpeed {
    /// The reference value.
    pub value: f64,

    /// Units of `value`.
    pub speed_units: SpeedUnits,
}

/// A heading reference for the heading controller.
#[derive(Serialize, Deserialize, Debug, Copy, Clone)]
pub struct DesiredHeading {
    /// The reference heading in radians.
    pub value: f64,
}

/// Brake actuation request.
#[derive(Serialize, Deserialize, Debug, Copy, Clone)]
pub struct Brake {
    /// True to start braking, false to stop.
    pub start: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Units of a vertical reference.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq)]
pub enum ZUnits {
    /// Depth below the surface, positive down.
    Depth,

    /// Altitude above the bottom, positive up.
    Altitude,

    /// Height above the reference ellipsoid, positive up.
    Height,
}

/// Units of a speed reference.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq)]
pub enum SpeedUnits {
    /// Meters per second.
    MetersPs,

    /// Propeller revolutions per minute.
    Rpm,

    /// Percentage of the actuator range.
    Percentage,
}
