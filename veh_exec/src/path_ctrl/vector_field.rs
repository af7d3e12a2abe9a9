//! Vector field guidance law.
//!
//! Steers the vehicle onto the track by commanding a heading whose angle of
//! attack grows with the cross-track error, saturating at the configured
//! entry angle outside the corridor.
//!
//! Reference:
//!  "Vector Field Path Following for Miniature Air Vehicles",
//!  Nelson, Barber, McLain and Beard,
//!  Proc. American Control Conference, 2006 (ACC'06)

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

// Internal
use super::tracking::TrackingState;
use super::{LawContext, PathLaw};
use msg_if::msg::{DesiredHeading, EstimatedState, Payload, CL_YAW};
use util::maths::wrap_pi;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters of the vector field law.
#[derive(Debug, Clone, Deserialize)]
pub struct VectorFieldParams {
    /// Width of the corridor for attack entry angle, in meters.
    pub corridor: f64,

    /// Attack angle when the cross-track error equals the corridor width,
    /// in degrees.
    pub entry_angle: f64,

    /// Enable extended (refined) corridor control.
    pub ext_control: bool,

    /// Gain for extended control.
    pub ext_gain: f64,

    /// Turn rate gain for extended control.
    pub ext_trgain: f64,
}

/// The vector field guidance law.
pub struct VectorFieldLaw {
    params: VectorFieldParams,

    /// Attack angle in radians.
    entry_angle: f64,

    /// Field gain, tan(entry_angle) / corridor.
    gain: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl VectorFieldLaw {
    /// Build the law from its parameters.
    pub fn new(params: VectorFieldParams) -> Self {
        let entry_angle = params.entry_angle.to_radians();
        let gain = entry_angle.tan() / params.corridor;

        Self {
            params,
            entry_angle,
            gain,
        }
    }

    fn dispatch_heading(&self, ctx: &LawContext, value: f64) {
        ctx.dispatch(Payload::DesiredHeading(DesiredHeading {
            value: wrap_pi(value),
        }));
    }
}

impl PathLaw for VectorFieldLaw {
    fn on_path_activation(&mut self, ctx: &mut LawContext) {
        // Claim the heading controller
        ctx.enable_control_loops(CL_YAW);
    }

    fn step(&mut self, state: &EstimatedState, ts: &TrackingState, ctx: &mut LawContext) {
        let kcorr = ts.track_pos.y / self.params.corridor;
        let akcorr = kcorr.abs();

        let mut reference;

        if ts.track_pos.x > ts.track_length {
            // Past the track goal: this should never happen but ...
            reference = ts.los_angle;
        } else if akcorr > 1.0 || !self.params.ext_control {
            // Outside corridor
            reference = ts.track_bearing - (self.gain * ts.track_pos.y).atan();
        } else if akcorr > 0.05 {
            // Inside corridor
            reference = ts.track_bearing
                - kcorr.powf(self.params.ext_gain)
                    * self.entry_angle
                    * (1.0
                        + (self.gain * ts.speed * (ts.course - ts.track_bearing).sin())
                            / (self.params.ext_trgain * ts.track_pos.y));
        } else {
            // Over track (avoid singularities)
            reference = ts.track_bearing;
        }

        if ts.course_control {
            // Course control rather than yaw control
            reference += state.psi - ts.course;
        }

        self.dispatch_heading(ctx, reference);
    }

    fn loiter(&mut self, state: &EstimatedState, ts: &TrackingState, ctx: &mut LawContext) {
        let mut reference =
            std::f64::consts::FRAC_PI_2 + (2.0 * self.gain * (ts.range - ts.loiter.radius)).atan();

        if !ts.loiter.clockwise {
            reference = -reference;
        }

        reference += std::f64::consts::PI + ts.los_angle;

        if ts.course_control {
            reference += state.psi - ts.course;
        }

        self.dispatch_heading(ctx, reference);
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
