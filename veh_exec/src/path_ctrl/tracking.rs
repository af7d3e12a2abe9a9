//! Tracking state of the path controller.
//!
//! The tracking state is the geometric and temporal snapshot maintained per
//! control period while a path is active. It is created on activation,
//! reset for each new desired path, and never leaves the path controller.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Serialize;

// Internal
use msg_if::msg::{EstimatedState, Waypoint};
use util::maths::{bearing_and_range, track_position, wrap_pi};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// All data regarding the vehicle's state while tracking the path.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrackingState {
    /// Current monotonic time in seconds.
    pub now: f64,

    /// Time since the last control step in seconds.
    pub delta: f64,

    /// Monotonic time the current path started.
    pub start_time: f64,

    /// Expected monotonic time of path completion, -1 if unknown.
    pub end_time: f64,

    /// Estimated seconds to reach the end waypoint.
    pub eta: f64,

    /// Start waypoint of the track.
    pub start: Waypoint,

    /// End waypoint of the track.
    pub end: Waypoint,

    /// Bearing from start to end.
    pub track_bearing: f64,

    /// Distance from start to end.
    pub track_length: f64,

    /// Range from the current position to the end waypoint.
    pub range: f64,

    /// Line of sight angle from the current position to the end waypoint.
    pub los_angle: f64,

    /// Ground course if course control is enabled, yaw otherwise.
    pub course: f64,

    /// Ground speed if course control is enabled, body surge speed
    /// otherwise.
    pub speed: f64,

    /// Course error relative to the track bearing, in (-pi, pi].
    pub course_error: f64,

    /// Position in the track frame.
    pub track_pos: TrackCoord,

    /// Velocity in the track frame.
    pub track_vel: TrackCoord,

    /// Loiter geometry.
    pub loiter: LoiterData,

    /// Set if a vertical reference is being controlled for this path.
    pub z_control: bool,

    /// Set if loitering.
    pub loitering: bool,

    /// Set if near the end waypoint.
    pub nearby: bool,

    /// Set if course control is enabled.
    pub course_control: bool,
}

/// A coordinate in the track frame.
#[derive(Debug, Copy, Clone, Default, Serialize)]
pub struct TrackCoord {
    /// Along track.
    pub x: f64,

    /// Cross track.
    pub y: f64,

    /// Vertical track.
    pub z: f64,
}

/// Loiter geometry.
#[derive(Debug, Copy, Clone, Default, Serialize)]
pub struct LoiterData {
    /// Center of the loiter circle.
    pub center: Waypoint,

    /// Radius of the loiter circle in meters.
    pub radius: f64,

    /// True to circle clockwise (increasing bearing in the NED frame).
    pub clockwise: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TrackingState {
    /// Reset for a new path starting at `start` and ending at `end`.
    pub fn reset(&mut self, now: f64, start: Waypoint, end: Waypoint, course_control: bool) {
        *self = TrackingState {
            now,
            start_time: now,
            end_time: -1.0,
            eta: std::f64::INFINITY,
            start,
            end,
            course_control,
            ..TrackingState::default()
        };

        let (bearing, length) = bearing_and_range((start.x, start.y), (end.x, end.y));
        self.track_bearing = bearing;
        self.track_length = length;
    }

    /// Update the snapshot from a navigation estimate.
    ///
    /// `now` is the current monotonic time, `nearby_distance` the range at
    /// which the `nearby` flag raises.
    pub fn update(&mut self, now: f64, state: &EstimatedState, nearby_distance: f64) {
        self.delta = now - self.now;
        self.now = now;

        // Body course and speed, or their ground equivalents under course
        // control
        if self.course_control {
            self.course = state.ground_course();
            self.speed = state.ground_speed();
        } else {
            self.course = state.psi;
            self.speed = state.u;
        }

        // Track geometry
        let (bearing, length) =
            bearing_and_range((self.start.x, self.start.y), (self.end.x, self.end.y));
        self.track_bearing = bearing;
        self.track_length = length;

        let (los, range) = bearing_and_range((state.x, state.y), (self.end.x, self.end.y));
        self.los_angle = los;
        self.range = range;

        // Rotate the position into the track frame and differentiate for
        // the track velocity
        let (along, cross) = track_position(
            (self.start.x, self.start.y),
            self.track_bearing,
            (state.x, state.y),
        );
        let vertical = state.z - self.end.z;

        if self.delta > 0.0 {
            self.track_vel = TrackCoord {
                x: (along - self.track_pos.x) / self.delta,
                y: (cross - self.track_pos.y) / self.delta,
                z: (vertical - self.track_pos.z) / self.delta,
            };
        }

        self.track_pos = TrackCoord {
            x: along,
            y: cross,
            z: vertical,
        };

        self.course_error = wrap_pi(self.course - self.track_bearing);

        self.nearby = self.range <= nearby_distance;

        // Eta from range at current speed
        if self.speed > 1e-3 {
            self.eta = self.range / self.speed;
            self.end_time = self.now + self.eta;
        } else {
            self.eta = std::f64::INFINITY;
            self.end_time = -1.0;
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    const PI: f64 = std::f64::consts::PI;

    fn waypoint(x: f64, y: f64, z: f64) -> Waypoint {
        Waypoint { x, y, z }
    }

    fn state_at(x: f64, y: f64) -> EstimatedState {
        EstimatedState {
            x,
            y,
            u: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_reset_geometry() {
        let mut ts = TrackingState::default();
        ts.reset(0.0, waypoint(0.0, 0.0, 0.0), waypoint(100.0, 0.0, -5.0), false);

        assert!((ts.track_length - 100.0).abs() < 1e-9);
        assert!(ts.track_bearing.abs() < 1e-9);
        assert_eq!(ts.end, waypoint(100.0, 0.0, -5.0));
    }

    #[test]
    fn test_update_track_frame() {
        let mut ts = TrackingState::default();
        ts.reset(0.0, waypoint(0.0, 0.0, 0.0), waypoint(100.0, 0.0, 0.0), false);

        // 30 m along, 4 m to the right of the track
        let state = state_at(30.0, 4.0);
        ts.update(1.0, &state, 10.0);

        assert!((ts.track_pos.x - 30.0).abs() < 1e-9);
        assert!((ts.track_pos.y - 4.0).abs() < 1e-9);
        assert!((ts.range - (70.0f64.powi(2) + 16.0).sqrt()).abs() < 1e-9);
        assert!(!ts.nearby);
    }

    #[test]
    fn test_update_course_error_wraps() {
        let mut ts = TrackingState::default();
        ts.reset(0.0, waypoint(0.0, 0.0, 0.0), waypoint(100.0, 0.0, 0.0), false);

        let mut state = state_at(0.0, 0.0);
        state.psi = PI - 0.1;
        ts.update(1.0, &state, 10.0);
        assert!((ts.course_error - (PI - 0.1)).abs() < 1e-9);

        // An angle just past pi wraps to just above -pi
        state.psi = PI + 0.1;
        ts.update(2.0, &state, 10.0);
        assert!((ts.course_error - (-PI + 0.1)).abs() < 1e-9);
    }

    #[test]
    fn test_update_track_velocity() {
        let mut ts = TrackingState::default();
        ts.reset(0.0, waypoint(0.0, 0.0, 0.0), waypoint(100.0, 0.0, 0.0), false);

        ts.update(1.0, &state_at(10.0, 0.0), 10.0);
        ts.update(2.0, &state_at(12.0, 1.0), 10.0);

        assert!((ts.track_vel.x - 2.0).abs() < 1e-9);
        assert!((ts.track_vel.y - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_nearby_flag() {
        let mut ts = TrackingState::default();
        ts.reset(0.0, waypoint(0.0, 0.0, 0.0), waypoint(100.0, 0.0, 0.0), false);

        ts.update(1.0, &state_at(95.0, 0.0), 10.0);
        assert!(ts.nearby);

        ts.update(2.0, &state_at(50.0, 0.0), 10.0);
        assert!(!ts.nearby);
    }
}
