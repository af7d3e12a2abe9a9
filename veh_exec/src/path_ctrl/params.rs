//! Path controller parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters of the path controller base framework.
#[derive(Debug, Clone, Deserialize)]
pub struct PathCtrlParams {
    /// Period of the control step in seconds.
    pub control_period: f64,

    /// Period of path control state reports in seconds.
    pub state_report_period: f64,

    /// If true the controller steers ground course rather than yaw.
    pub course_control: bool,

    /// Range to the end waypoint below which the vehicle is "nearby", in
    /// meters.
    pub nearby_distance: f64,

    /// Along-track monitor parameters.
    pub atm: AtmParams,

    /// Cross-track monitor parameters.
    pub ctm: CtmParams,

    /// Bottom track parameters, forwarded to the guidance law.
    pub bottom_track: BottomTrackParams,
}

/// Along-track monitor parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct AtmParams {
    /// Enable the monitor.
    pub enabled: bool,

    /// Monitoring period in seconds.
    pub period: f64,

    /// Speed below which progress is not checked, in meters/second.
    pub min_speed: f64,

    /// Minimum reduction in course error over one period expected of a
    /// vehicle facing away from the waypoint, in radians.
    pub min_yaw: f64,
}

/// Cross-track monitor parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct CtmParams {
    /// Enable the monitor.
    pub enabled: bool,

    /// Admissible cross-track distance in meters.
    pub distance_limit: f64,

    /// Admissible time outside the distance limit in seconds.
    pub time_limit: f64,

    /// Scale factor applied to the navigation uncertainty when widening the
    /// distance limit.
    pub nav_unc_factor: f64,
}

/// Bottom track parameters.
///
/// The ranger producing the distance measurements is driver-side equipment;
/// these arguments define the envelope the controller holds against it.
#[derive(Debug, Copy, Clone, Deserialize)]
pub struct BottomTrackParams {
    /// Enable bottom tracking.
    pub enabled: bool,

    /// Minimum admissible distance to the bottom in meters.
    pub minimum_distance: f64,

    /// Depth below which bottom tracking engages, in meters.
    pub depth_limit: f64,
}
