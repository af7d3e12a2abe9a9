//! Path divergence monitors.
//!
//! Two monitors watch the vehicle's progress while tracking a straight
//! path. The along-track monitor detects stalled or reversing progress
//! towards the end waypoint, the cross-track monitor detects sustained
//! lateral divergence beyond an uncertainty-widened corridor.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use super::params::{AtmParams, CtmParams};
use super::tracking::TrackingState;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Slack on along-track comparisons so that noise around a stationary
/// reading does not read as regression.
const ALONG_TRACK_EPS_M: f64 = 1e-3;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Along-track monitor state.
#[derive(Debug, Clone)]
pub struct AtmData {
    /// Enabled or disabled along track monitoring.
    pub enabled: bool,

    /// True if diverging.
    pub diverging: bool,

    /// Monitoring period in seconds.
    period: f64,

    /// Speed below which progress is not checked.
    min_speed: f64,

    /// Minimum course error reduction expected when facing backwards.
    min_yaw: f64,

    /// Monotonic time of the last check.
    time: f64,

    /// Along-track position at the last check.
    last_along: f64,

    /// Distance remaining to the end waypoint at the last check.
    last_remaining: f64,

    /// Course error magnitude at the last check.
    last_course_err: f64,
}

/// Cross-track monitor state.
#[derive(Debug, Clone)]
pub struct CtmData {
    /// Enabled or disabled cross track monitoring.
    pub enabled: bool,

    /// True if diverging.
    pub diverging: bool,

    /// Cross track limit in meters.
    distance_limit: f64,

    /// Time admissible outside the limit in seconds.
    time_limit: f64,

    /// Navigation uncertainty factor.
    nav_unc_factor: f64,

    /// Current navigation uncertainty in meters.
    pub nav_uncertainty: f64,

    /// Monotonic time divergence started, -1 when inside the corridor.
    divergence_started: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl AtmData {
    pub fn new(params: &AtmParams) -> Self {
        Self {
            enabled: params.enabled,
            diverging: false,
            period: params.period,
            min_speed: params.min_speed,
            min_yaw: params.min_yaw,
            time: -1.0,
            last_along: 0.0,
            last_remaining: 0.0,
            last_course_err: 0.0,
        }
    }

    /// Restart monitoring for a new path.
    pub fn reset(&mut self, now: f64, ts: &TrackingState) {
        self.diverging = false;
        self.time = now;
        self.snapshot(ts);
    }

    /// Check progress towards the end waypoint.
    ///
    /// Runs at most once per monitoring period. Returns true when the check
    /// newly detects divergence.
    pub fn check(&mut self, now: f64, ts: &TrackingState) -> bool {
        if !self.enabled || now - self.time < self.period {
            return false;
        }

        let remaining = ts.track_length - ts.track_pos.x;

        // Below the minimum speed the vehicle may legitimately hold
        // position, restart the window
        if ts.speed <= self.min_speed {
            self.time = now;
            self.snapshot(ts);
            return false;
        }

        let no_progress = ts.track_pos.x <= self.last_along + ALONG_TRACK_EPS_M;
        let error_grew = remaining > self.last_remaining + ALONG_TRACK_EPS_M;

        // A vehicle facing away from the waypoint is tolerated only while
        // it is visibly yawing back towards it
        let facing_away = ts.course_error.abs() > std::f64::consts::FRAC_PI_2
            && self.last_course_err - ts.course_error.abs() < self.min_yaw;

        let was_diverging = self.diverging;
        self.diverging = no_progress && (error_grew || facing_away);

        self.time = now;
        self.snapshot(ts);

        self.diverging && !was_diverging
    }

    fn snapshot(&mut self, ts: &TrackingState) {
        self.last_along = ts.track_pos.x;
        self.last_remaining = ts.track_length - ts.track_pos.x;
        self.last_course_err = ts.course_error.abs();
    }
}

impl CtmData {
    pub fn new(params: &CtmParams) -> Self {
        Self {
            enabled: params.enabled,
            diverging: false,
            distance_limit: params.distance_limit,
            time_limit: params.time_limit,
            nav_unc_factor: params.nav_unc_factor,
            nav_uncertainty: 0.0,
            divergence_started: -1.0,
        }
    }

    /// Restart monitoring for a new path. The navigation uncertainty is
    /// retained, it describes the filter rather than the path.
    pub fn reset(&mut self) {
        self.diverging = false;
        self.divergence_started = -1.0;
    }

    /// The cross-track corridor half-width currently in force.
    pub fn limit(&self) -> f64 {
        self.distance_limit + self.nav_unc_factor * self.nav_uncertainty
    }

    /// Check the cross-track excursion.
    ///
    /// Returns true when the excursion has newly outlasted the time limit.
    pub fn check(&mut self, now: f64, ts: &TrackingState) -> bool {
        if !self.enabled {
            return false;
        }

        if ts.track_pos.y.abs() <= self.limit() {
            self.divergence_started = -1.0;
            self.diverging = false;
            return false;
        }

        if self.divergence_started < 0.0 {
            self.divergence_started = now;
            return false;
        }

        if !self.diverging && now - self.divergence_started > self.time_limit {
            self.diverging = true;
            return true;
        }

        false
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
