//! # Navigation messages
//!
//! Messages produced by the navigation filter and ranging drivers.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The navigation filter's estimate of the vehicle state.
///
/// Positions are in the local NED frame (x north, y east, z down), attitudes
/// are Euler angles in radians, velocities in meters/second.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct EstimatedState {
    /// Position along the north axis.
    pub x: f64,

    /// Position along the east axis.
    pub y: f64,

    /// Position along the down axis.
    pub z: f64,

    /// Roll angle.
    pub phi: f64,

    /// Pitch angle.
    pub theta: f64,

    /// Yaw angle.
    pub psi: f64,

    /// Body-fixed frame surge velocity.
    pub u: f64,

    /// Body-fixed frame sway velocity.
    pub v: f64,

    /// Body-fixed frame heave velocity.
    pub w: f64,

    /// Ground velocity along the north axis.
    pub vx: f64,

    /// Ground velocity along the east axis.
    pub vy: f64,
}

/// The navigation filter's uncertainty about its own position estimate.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct NavigationUncertainty {
    /// Standard deviation of the north position estimate in meters.
    pub x: f64,

    /// Standard deviation of the east position estimate in meters.
    pub y: f64,
}

/// A distance measurement from a ranging device.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Distance {
    /// The measured distance in meters.
    pub value: f64,

    /// True if the measurement is valid.
    pub validity: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl EstimatedState {
    /// Ground speed over the horizontal plane.
    pub fn ground_speed(&self) -> f64 {
        self.vx.hypot(self.vy)
    }

    /// Ground course over the horizontal plane.
    pub fn ground_course(&self) -> f64 {
        self.vy.atan2(self.vx)
    }
}
