//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Wrap an angle into the range (-pi, pi].
///
/// The upper bound is inclusive so that an angle of exactly pi is preserved
/// rather than mapped to -pi.
pub fn wrap_pi<T>(angle: T) -> T
where
    T: Float + std::ops::Rem,
{
    let pi_t: T = T::from(std::f64::consts::PI).unwrap();
    let tau_t: T = T::from(std::f64::consts::TAU).unwrap();

    pi_t - rem_euclid(pi_t - angle, tau_t)
}

/// Get the bearing and range from an origin point to a target point.
///
/// Bearing is measured from the positive x axis towards the positive y axis,
/// matching the NED convention of x north, y east used throughout the
/// software.
pub fn bearing_and_range(origin: (f64, f64), point: (f64, f64)) -> (f64, f64) {
    let dx = point.0 - origin.0;
    let dy = point.1 - origin.1;

    (dy.atan2(dx), dx.hypot(dy))
}

/// Rotate a point into the frame of a track.
///
/// The track is defined by its origin and its orientation (bearing). The
/// returned pair is the along-track and cross-track coordinate of `point`.
pub fn track_position(origin: (f64, f64), orientation: f64, point: (f64, f64)) -> (f64, f64) {
    let (bearing, range) = bearing_and_range(origin, point);
    let relative = bearing - orientation;

    (range * relative.cos(), range * relative.sin())
}

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
///
/// This function is taken from the std library as num is missing it.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float + std::ops::Rem,
{
    let r = lhs % rhs;
    if r < T::from(0.0).unwrap() {
        r + rhs.abs()
    } else {
        r
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
