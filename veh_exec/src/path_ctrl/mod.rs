//! # Path controller module
//!
//! This module implements the base framework for path-following control.
//! The [`PathCtrl`] task ingests navigation state, desired paths, braking
//! and ranging messages, maintains the [`TrackingState`] snapshot, monitors
//! along-track and cross-track divergence, and drives a [`PathLaw`] which
//! implements the vehicle-specific guidance law.
//!
//! The controller activates when a path executor claims the path control
//! loop, after which each received [`DesiredPath`] starts a new track.
//! Every control period the law's `step` (or `loiter`) hook is invoked with
//! a coherent navigation snapshot and must dispatch its setpoints on the
//! bus.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod monitors;
pub mod params;
pub mod tracking;
pub mod vector_field;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, error, info, warn};
use std::time::Instant;

// Internal
use crate::task::{EntityState, Task, TaskCtx};
use monitors::{AtmData, CtmData};
use msg_if::msg::{
    Brake, ControlLoops, DesiredPath, DesiredSpeed, DesiredZ, Distance, EstimatedState, Kind,
    LoopToggle, Message, NavigationUncertainty, PathControlState, Payload, Waypoint, ZUnits,
    CL_PATH, DP_FL_CCLOCKW, DP_FL_START, PCS_FL_DIVERGING_AT, PCS_FL_DIVERGING_CT,
    PCS_FL_LOITERING, PCS_FL_NEAR,
};
use params::{BottomTrackParams, PathCtrlParams};
use tracking::{LoiterData, TrackingState};
use util::maths::{bearing_and_range, wrap_pi};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Name of the path controller task.
const TASK_NAME: &str = "Path Control";

/// Minimum interval between divergence error prints, in seconds.
const FAULT_PRINT_PERIOD_S: f64 = 2.0;

/// Angle ahead of the vehicle's radial at which the default loiter places
/// its virtual target, in radians.
const LOITER_ADVANCE_RAD: f64 = std::f64::consts::FRAC_PI_6;

/// A bottom-track hold releases only once the measured distance exceeds the
/// minimum by this factor, so the hold does not flap at the boundary.
const BT_CLEAR_FACTOR: f64 = 1.5;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Interface handed to a [`PathLaw`] hook.
///
/// Exposes setpoint dispatch, control loop configuration, and error
/// signalling without giving the law access to the controller's own state.
pub struct LawContext<'a> {
    pub(crate) task: &'a TaskCtx,
    pub(crate) aloops: &'a mut u32,
    pub(crate) error: &'a mut Option<String>,

    /// Last valid bottom distance measurement, if any.
    pub bottom_distance: Option<f64>,

    /// Bottom track envelope, for laws which own their vertical control.
    pub bottom_track: BottomTrackParams,
}

/// The path controller base task.
pub struct PathCtrl {
    params: PathCtrlParams,

    /// The vehicle-specific guidance law.
    law: Box<dyn PathLaw>,

    /// Monotonic time origin.
    epoch: Instant,

    /// Tracking state, valid while a path is being tracked.
    ts: TrackingState,

    /// Most recent navigation estimate.
    estate: Option<EstimatedState>,

    /// Along-track monitor.
    atm: AtmData,

    /// Cross-track monitor.
    ctm: CtmData,

    /// True while the path control loop is claimed.
    active: bool,

    /// True while a desired path is being tracked.
    tracking: bool,

    /// True while braking, freezing the control step.
    braking: bool,

    /// Control loops claimed by the law.
    aloops: u32,

    /// Error signalled by the law during the last hook invocation.
    pending_error: Option<String>,

    /// Speed reference for the current path, re-dispatched when a brake
    /// releases.
    speed_ref: Option<DesiredSpeed>,

    /// Vertical reference in force for the current path, restored when a
    /// bottom-track hold clears.
    z_ref: Option<DesiredZ>,

    /// Last valid bottom distance measurement.
    bottom_distance: Option<f64>,

    /// True while the bottom-track envelope is overriding the vertical
    /// reference with a safe altitude hold.
    bt_holding: bool,

    /// Monotonic time of the last path control state report, -1 for never.
    last_report: f64,

    /// Monotonic time of the last divergence error print, -1 for never.
    last_fault_print: f64,
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A vehicle-specific path-following law driven by [`PathCtrl`].
///
/// The controller owns the lifecycle: laws only implement the control
/// computation and dispatch their setpoints through the [`LawContext`].
pub trait PathLaw: Send {
    /// Execute one control step towards the end waypoint.
    fn step(&mut self, state: &EstimatedState, ts: &TrackingState, ctx: &mut LawContext);

    /// Execute one loiter step around `ts.loiter`.
    ///
    /// The default implementation holds the circle by retargeting the track
    /// at a point ahead on the circumference and reusing [`PathLaw::step`].
    fn loiter(&mut self, state: &EstimatedState, ts: &TrackingState, ctx: &mut LawContext) {
        let center = ts.loiter.center;
        let radius = ts.loiter.radius;

        // Clockwise in the NED frame is increasing bearing
        let dir = if ts.loiter.clockwise { 1.0 } else { -1.0 };

        let (radial, _) = bearing_and_range((center.x, center.y), (state.x, state.y));
        let target_angle = radial + dir * LOITER_ADVANCE_RAD;

        let target = Waypoint {
            x: center.x + radius * target_angle.cos(),
            y: center.y + radius * target_angle.sin(),
            z: ts.end.z,
        };

        let mut vts = ts.clone();
        vts.start = Waypoint {
            x: state.x,
            y: state.y,
            z: state.z,
        };
        vts.end = target;

        let (bearing, range) = bearing_and_range((state.x, state.y), (target.x, target.y));
        vts.track_bearing = bearing;
        vts.track_length = range;
        vts.los_angle = bearing;
        vts.range = range;
        vts.track_pos = tracking::TrackCoord::default();
        vts.course_error = wrap_pi(ts.course - bearing);
        vts.loitering = false;

        self.step(state, &vts, ctx);
    }

    /// Called when a new path begins. Several paths may be tracked between
    /// activation and deactivation.
    fn on_path_startup(
        &mut self,
        _state: &EstimatedState,
        _ts: &TrackingState,
        _ctx: &mut LawContext,
    ) {
    }

    /// Called when path control activates.
    fn on_path_activation(&mut self, _ctx: &mut LawContext) {}

    /// Called when path control deactivates.
    fn on_path_deactivation(&mut self, _ctx: &mut LawContext) {}

    /// If false (the default) the controller fires the vertical reference
    /// at the start of each path; if true the law owns vertical control.
    fn has_specific_z_control(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<'a> LawContext<'a> {
    /// Dispatch a setpoint or any other message on the bus.
    pub fn dispatch(&self, payload: Payload) {
        self.task.dispatch(payload);
    }

    /// Claim control loops for the law.
    pub fn enable_control_loops(&mut self, mask: u32) {
        *self.aloops |= mask;
        self.task.dispatch(Payload::ControlLoops(ControlLoops {
            enable: LoopToggle::Enable,
            mask,
        }));
    }

    /// Release control loops claimed by the law. Only needed if the control
    /// mode changes during path control, not on deactivation.
    pub fn disable_control_loops(&mut self, mask: u32) {
        *self.aloops &= !mask;
        self.task.dispatch(Payload::ControlLoops(ControlLoops {
            enable: LoopToggle::Disable,
            mask,
        }));
    }

    /// Report an unrecoverable error. The controller will fault its entity
    /// and disengage after the current hook returns.
    pub fn signal_error(&mut self, desc: &str) {
        *self.error = Some(String::from(desc));
    }
}

impl PathCtrl {
    /// Build a new path controller around the given law.
    pub fn new(params: PathCtrlParams, law: Box<dyn PathLaw>) -> Self {
        let atm = AtmData::new(&params.atm);
        let ctm = CtmData::new(&params.ctm);

        Self {
            params,
            law,
            epoch: Instant::now(),
            ts: TrackingState::default(),
            estate: None,
            atm,
            ctm,
            active: false,
            tracking: false,
            braking: false,
            aloops: 0,
            pending_error: None,
            speed_ref: None,
            z_ref: None,
            bottom_distance: None,
            bt_holding: false,
            last_report: -1.0,
            last_fault_print: -1.0,
        }
    }

    /// Monotonic seconds since construction.
    fn mono(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// True if this message was published by this task.
    fn is_own(&self, ctx: &TaskCtx, msg: &Message) -> bool {
        msg.header.source == ctx.system && msg.header.source_entity == ctx.entity
    }

    // ---- Consume handlers ----

    fn handle_control_loops(&mut self, ctx: &mut TaskCtx, cl: &ControlLoops) {
        if cl.mask & CL_PATH == 0 {
            return;
        }

        match cl.enable {
            LoopToggle::Enable => {
                if !self.active {
                    self.activate(ctx);
                }
            }
            LoopToggle::Disable => {
                if self.active {
                    self.deactivate(ctx);
                }
            }
        }
    }

    fn handle_desired_path(&mut self, ctx: &mut TaskCtx, dp: &DesiredPath) {
        if !self.active {
            warn!("desired path received while path control is inactive");
            return;
        }

        let state = match &self.estate {
            Some(s) => s.clone(),
            None => {
                ctx.set_entity_state(EntityState::Fault, "no navigation data for path startup");
                return;
            }
        };

        let now = self.mono();

        // Paths without a valid start waypoint begin at the vehicle
        let start = if dp.flags & DP_FL_START != 0 {
            dp.start
        } else {
            Waypoint {
                x: state.x,
                y: state.y,
                z: state.z,
            }
        };

        self.ts.reset(now, start, dp.end, self.params.course_control);

        if dp.lradius > 0.0 {
            self.ts.loitering = true;
            self.ts.loiter = LoiterData {
                center: dp.end,
                radius: dp.lradius,
                clockwise: dp.flags & DP_FL_CCLOCKW == 0,
            };
        }

        // Fire the vertical reference unless the law owns vertical control
        self.bt_holding = false;
        if !self.law.has_specific_z_control() {
            let zref = DesiredZ {
                value: dp.end_z,
                z_units: dp.end_z_units,
            };
            self.z_ref = Some(zref);
            ctx.dispatch(Payload::DesiredZ(zref));
            self.ts.z_control = true;
        } else {
            self.z_ref = None;
        }

        let speed = DesiredSpeed {
            value: dp.speed,
            speed_units: dp.speed_units,
        };
        self.speed_ref = Some(speed);
        if !self.braking {
            ctx.dispatch(Payload::DesiredSpeed(speed));
        }

        self.ts.update(now, &state, self.params.nearby_distance);
        self.atm.reset(now, &self.ts);
        self.ctm.reset();

        let mut law_ctx = LawContext {
            task: ctx,
            aloops: &mut self.aloops,
            error: &mut self.pending_error,
            bottom_distance: self.bottom_distance,
            bottom_track: self.params.bottom_track,
        };
        self.law.on_path_startup(&state, &self.ts, &mut law_ctx);

        self.tracking = true;

        info!(
            "tracking new path to ({:.1}, {:.1}, {:.1}), length {:.1} m{}",
            dp.end.x,
            dp.end.y,
            dp.end.z,
            self.ts.track_length,
            if self.ts.loitering { ", loitering" } else { "" }
        );

        self.report(ctx, now, true);

        if let Some(desc) = self.pending_error.take() {
            self.fault(ctx, now, &desc);
        }
    }

    fn handle_brake(&mut self, ctx: &mut TaskCtx, brake: &Brake) {
        if brake.start {
            if !self.braking {
                debug!("braking, freezing control step");
                self.braking = true;
                ctx.dispatch(Payload::DesiredSpeed(DesiredSpeed {
                    value: 0.0,
                    speed_units: msg_if::msg::SpeedUnits::MetersPs,
                }));
            }
        } else if self.braking {
            debug!("brake released, resuming control step");
            self.braking = false;

            // Restore the path's speed reference
            if let Some(speed) = self.speed_ref {
                ctx.dispatch(Payload::DesiredSpeed(speed));
            }
        }
    }

    // ---- Periodic processing ----

    fn step(&mut self, ctx: &mut TaskCtx) {
        let now = self.mono();

        if !self.active {
            return;
        }

        if self.tracking && !self.braking {
            if let Some(state) = self.estate.clone() {
                self.ts.update(now, &state, self.params.nearby_distance);

                // Monitors only make sense on straight tracks
                if !self.ts.loitering {
                    if self.atm.check(now, &self.ts) {
                        self.fault(ctx, now, "along-track divergence detected");
                        return;
                    }
                    if self.ctm.check(now, &self.ts) {
                        self.fault(ctx, now, "cross-track divergence detected");
                        return;
                    }
                }

                self.check_bottom_track(ctx, &state);

                let mut law_ctx = LawContext {
                    task: ctx,
                    aloops: &mut self.aloops,
                    error: &mut self.pending_error,
                    bottom_distance: self.bottom_distance,
                    bottom_track: self.params.bottom_track,
                };

                if self.ts.loitering && self.ts.loiter.radius > 0.0 {
                    self.law.loiter(&state, &self.ts, &mut law_ctx);
                } else {
                    self.law.step(&state, &self.ts, &mut law_ctx);
                }

                if let Some(desc) = self.pending_error.take() {
                    self.fault(ctx, now, &desc);
                    return;
                }
            }
        }

        self.report(ctx, now, false);
    }

    /// Hold the bottom-track envelope when the base owns vertical control.
    ///
    /// When the measured bottom distance falls below the minimum while the
    /// vehicle is deeper than the depth limit, the vertical reference is
    /// overridden with a safe altitude hold; the path's own reference is
    /// restored once the bottom clears.
    fn check_bottom_track(&mut self, ctx: &TaskCtx, state: &EstimatedState) {
        let bt = self.params.bottom_track;

        if !bt.enabled || !self.ts.z_control {
            return;
        }

        let dist = match self.bottom_distance {
            Some(d) => d,
            None => return,
        };

        if !self.bt_holding {
            if state.z > bt.depth_limit && dist < bt.minimum_distance {
                warn!(
                    "bottom at {:.1} m, holding {:.1} m altitude",
                    dist, bt.minimum_distance
                );
                self.bt_holding = true;
                ctx.dispatch(Payload::DesiredZ(DesiredZ {
                    value: bt.minimum_distance,
                    z_units: ZUnits::Altitude,
                }));
            }
        } else if dist > bt.minimum_distance * BT_CLEAR_FACTOR {
            debug!("bottom clear, restoring path vertical reference");
            self.bt_holding = false;

            if let Some(zref) = self.z_ref {
                ctx.dispatch(Payload::DesiredZ(zref));
            }
        }
    }

    // ---- State transitions ----

    fn activate(&mut self, ctx: &mut TaskCtx) {
        self.active = true;
        self.tracking = false;
        self.braking = false;
        self.pending_error = None;
        self.z_ref = None;
        self.bt_holding = false;
        self.ts = TrackingState::default();

        ctx.set_entity_state(EntityState::Normal, "path control active");

        let mut law_ctx = LawContext {
            task: ctx,
            aloops: &mut self.aloops,
            error: &mut self.pending_error,
            bottom_distance: self.bottom_distance,
            bottom_track: self.params.bottom_track,
        };
        self.law.on_path_activation(&mut law_ctx);

        info!("path control activated");
    }

    fn deactivate(&mut self, ctx: &mut TaskCtx) {
        self.active = false;
        self.tracking = false;

        let mut law_ctx = LawContext {
            task: ctx,
            aloops: &mut self.aloops,
            error: &mut self.pending_error,
            bottom_distance: self.bottom_distance,
            bottom_track: self.params.bottom_track,
        };
        self.law.on_path_deactivation(&mut law_ctx);

        // Release whatever the law still holds
        if self.aloops != 0 {
            ctx.dispatch(Payload::ControlLoops(ControlLoops {
                enable: LoopToggle::Disable,
                mask: self.aloops,
            }));
            self.aloops = 0;
        }

        info!("path control deactivated");
    }

    /// Fault the entity, report the divergence, and disengage the path.
    fn fault(&mut self, ctx: &mut TaskCtx, now: f64, desc: &str) {
        if self.last_fault_print < 0.0 || now - self.last_fault_print >= FAULT_PRINT_PERIOD_S {
            error!("{}", desc);
            self.last_fault_print = now;
        }

        ctx.set_entity_state(EntityState::Fault, desc);

        self.report(ctx, now, true);

        self.tracking = false;
        if self.aloops != 0 {
            ctx.dispatch(Payload::ControlLoops(ControlLoops {
                enable: LoopToggle::Disable,
                mask: self.aloops,
            }));
            self.aloops = 0;
        }
    }

    /// Report the current path control state.
    ///
    /// Reports are emitted at the configured period, or immediately when
    /// `force` is set for state transitions.
    fn report(&mut self, ctx: &TaskCtx, now: f64, force: bool) {
        if !force
            && self.last_report >= 0.0
            && now - self.last_report < self.params.state_report_period
        {
            return;
        }

        let mut flags = 0u8;
        if self.ts.nearby {
            flags |= PCS_FL_NEAR;
        }
        if self.ts.loitering {
            flags |= PCS_FL_LOITERING;
        }
        if self.atm.diverging {
            flags |= PCS_FL_DIVERGING_AT;
        }
        if self.ctm.diverging {
            flags |= PCS_FL_DIVERGING_CT;
        }

        ctx.dispatch(Payload::PathControlState(PathControlState {
            start: self.ts.start,
            end: self.ts.end,
            lradius: self.ts.loiter.radius,
            flags,
            x: self.ts.track_pos.x,
            y: self.ts.track_pos.y,
            vx: self.ts.track_vel.x,
            vy: self.ts.track_vel.y,
            course_error: self.ts.course_error,
            eta: self.ts.eta,
        }));

        self.last_report = now;
    }
}

impl Task for PathCtrl {
    fn name(&self) -> &str {
        TASK_NAME
    }

    fn subscriptions(&self) -> Vec<Kind> {
        vec![
            Kind::EstimatedState,
            Kind::DesiredPath,
            Kind::DesiredZ,
            Kind::DesiredSpeed,
            Kind::Brake,
            Kind::ControlLoops,
            Kind::NavigationUncertainty,
            Kind::Distance,
        ]
    }

    fn tick_period(&self) -> Option<f64> {
        Some(self.params.control_period)
    }

    fn on_deactivation(&mut self, ctx: &mut TaskCtx) {
        if self.active {
            self.deactivate(ctx);
        }
    }

    fn consume(&mut self, ctx: &mut TaskCtx, msg: &Message) {
        match &msg.payload {
            Payload::EstimatedState(es) => self.estate = Some(es.clone()),
            Payload::DesiredPath(dp) => self.handle_desired_path(ctx, dp),
            Payload::Brake(brake) => self.handle_brake(ctx, brake),
            Payload::ControlLoops(cl) => self.handle_control_loops(ctx, cl),
            Payload::NavigationUncertainty(NavigationUncertainty { x, y }) => {
                self.ctm.nav_uncertainty = x.max(*y);
            }
            Payload::Distance(Distance { value, validity }) => {
                if *validity {
                    self.bottom_distance = Some(*value);
                }
            }
            Payload::DesiredSpeed(speed) => {
                // Track references set by others, ignoring our own echoes so
                // a brake's zero demand does not clobber the path reference
                if !self.is_own(ctx, msg) {
                    self.speed_ref = Some(*speed);
                }
            }
            Payload::DesiredZ(zref) => {
                // The latest externally set reference is what a cleared
                // bottom-track hold restores
                if !self.is_own(ctx, msg) {
                    self.z_ref = Some(*zref);
                    self.ts.z_control = true;
                }
            }
            _ => (),
        }
    }

    fn tick(&mut self, ctx: &mut TaskCtx) {
        self.step(ctx);
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::params::*;
    use super::vector_field::{VectorFieldLaw, VectorFieldParams};
    use super::*;
    use msg_if::bus::{Bus, Mailbox};
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::time::Duration;

    fn params() -> PathCtrlParams {
        PathCtrlParams {
            control_period: 0.1,
            state_report_period: 1.0,
            course_control: false,
            nearby_distance: 10.0,
            atm: AtmParams {
                enabled: true,
                period: 5.0,
                min_speed: 0.2,
                min_yaw: 0.1,
            },
            ctm: CtmParams {
                enabled: true,
                distance_limit: 5.0,
                time_limit: 3.0,
                nav_unc_factor: 0.0,
            },
            bottom_track: BottomTrackParams {
                enabled: false,
                minimum_distance: 2.0,
                depth_limit: 1.0,
            },
        }
    }

    fn law() -> Box<dyn PathLaw> {
        Box::new(VectorFieldLaw::new(VectorFieldParams {
            corridor: 5.0,
            entry_angle: 15.0,
            ext_control: false,
            ext_gain: 1.0,
            ext_trgain: 1.0,
        }))
    }

    fn harness(params: PathCtrlParams) -> (PathCtrl, TaskCtx, Mailbox) {
        let bus = Bus::new();
        let observer = bus.subscribe(
            "observer",
            &[
                Kind::DesiredZ,
                Kind::DesiredSpeed,
                Kind::DesiredHeading,
                Kind::ControlLoops,
                Kind::PathControlState,
            ],
            128,
        );
        let ctx = TaskCtx::new(bus, 1, 3, TASK_NAME, Arc::new(AtomicBool::new(false)));

        (PathCtrl::new(params, law()), ctx, observer)
    }

    fn drain(observer: &Mailbox) -> Vec<Payload> {
        let mut out = Vec::new();
        while let Some(msg) = observer.try_recv() {
            out.push(msg.payload.clone());
        }
        out
    }

    fn msg_from(system: u16, payload: Payload) -> Message {
        Message::new(system, 0, payload)
    }

    fn estimated_state(x: f64, y: f64, u: f64) -> Payload {
        Payload::EstimatedState(EstimatedState {
            x,
            y,
            u,
            ..Default::default()
        })
    }

    fn desired_path(end: Waypoint, end_z: f64) -> Payload {
        Payload::DesiredPath(DesiredPath {
            start: Waypoint::default(),
            end,
            speed: 1.5,
            speed_units: msg_if::msg::SpeedUnits::MetersPs,
            end_z,
            end_z_units: msg_if::msg::ZUnits::Depth,
            lradius: 0.0,
            flags: DP_FL_START,
        })
    }

    fn activate(pc: &mut PathCtrl, ctx: &mut TaskCtx) {
        let cl = msg_from(
            2,
            Payload::ControlLoops(ControlLoops {
                enable: LoopToggle::Enable,
                mask: CL_PATH,
            }),
        );
        pc.consume(ctx, &cl);
    }

    #[test]
    fn test_path_startup() {
        let (mut pc, mut ctx, observer) = harness(params());

        activate(&mut pc, &mut ctx);
        pc.consume(&mut ctx, &msg_from(1, estimated_state(0.0, 0.0, 1.0)));
        pc.consume(
            &mut ctx,
            &msg_from(
                2,
                desired_path(
                    Waypoint {
                        x: 100.0,
                        y: 0.0,
                        z: -5.0,
                    },
                    -5.0,
                ),
            ),
        );

        let traffic = drain(&observer);

        // Activation claimed the heading loop
        assert!(traffic.iter().any(|p| matches!(
            p,
            Payload::ControlLoops(ControlLoops {
                enable: LoopToggle::Enable,
                mask: msg_if::msg::CL_YAW,
            })
        )));

        // Default z control fired the vertical reference
        assert!(traffic
            .iter()
            .any(|p| matches!(p, Payload::DesiredZ(z) if (z.value - -5.0).abs() < 1e-9)));

        // Speed reference dispatched
        assert!(traffic
            .iter()
            .any(|p| matches!(p, Payload::DesiredSpeed(s) if (s.value - 1.5).abs() < 1e-9)));

        // Forced state report on path start
        assert!(traffic
            .iter()
            .any(|p| matches!(p, Payload::PathControlState(_))));

        // The first step comes within one control period
        pc.tick(&mut ctx);
        assert!(drain(&observer)
            .iter()
            .any(|p| matches!(p, Payload::DesiredHeading(_))));
    }

    #[test]
    fn test_desired_path_requires_activation() {
        let (mut pc, mut ctx, observer) = harness(params());

        pc.consume(&mut ctx, &msg_from(1, estimated_state(0.0, 0.0, 1.0)));
        pc.consume(
            &mut ctx,
            &msg_from(
                2,
                desired_path(
                    Waypoint {
                        x: 100.0,
                        y: 0.0,
                        z: 0.0,
                    },
                    0.0,
                ),
            ),
        );

        assert!(drain(&observer).is_empty());
        assert!(!pc.tracking);
    }

    #[test]
    fn test_brake_freezes_and_resumes() {
        let (mut pc, mut ctx, observer) = harness(params());

        activate(&mut pc, &mut ctx);
        pc.consume(&mut ctx, &msg_from(1, estimated_state(0.0, 0.0, 1.0)));
        pc.consume(
            &mut ctx,
            &msg_from(
                2,
                desired_path(
                    Waypoint {
                        x: 100.0,
                        y: 0.0,
                        z: 0.0,
                    },
                    0.0,
                ),
            ),
        );
        drain(&observer);

        // Braking: zero speed demand and no step
        pc.consume(&mut ctx, &msg_from(2, Payload::Brake(Brake { start: true })));
        pc.tick(&mut ctx);

        let traffic = drain(&observer);
        assert!(traffic
            .iter()
            .any(|p| matches!(p, Payload::DesiredSpeed(s) if s.value == 0.0)));
        assert!(!traffic
            .iter()
            .any(|p| matches!(p, Payload::DesiredHeading(_))));

        // Releasing the brake restores the path speed and resumes stepping
        pc.consume(
            &mut ctx,
            &msg_from(2, Payload::Brake(Brake { start: false })),
        );
        pc.tick(&mut ctx);

        let traffic = drain(&observer);
        assert!(traffic
            .iter()
            .any(|p| matches!(p, Payload::DesiredSpeed(s) if (s.value - 1.5).abs() < 1e-9)));
        assert!(traffic
            .iter()
            .any(|p| matches!(p, Payload::DesiredHeading(_))));
    }

    #[test]
    fn test_cross_track_divergence_faults() {
        let mut p = params();
        p.ctm.time_limit = 0.05;
        let (mut pc, mut ctx, observer) = harness(p);

        activate(&mut pc, &mut ctx);
        pc.consume(&mut ctx, &msg_from(1, estimated_state(0.0, 0.0, 1.0)));
        pc.consume(
            &mut ctx,
            &msg_from(
                2,
                desired_path(
                    Waypoint {
                        x: 100.0,
                        y: 0.0,
                        z: 0.0,
                    },
                    0.0,
                ),
            ),
        );
        drain(&observer);

        // 6 m cross-track excursion with a 5 m limit
        pc.consume(&mut ctx, &msg_from(1, estimated_state(20.0, 6.0, 1.0)));

        // First check starts the divergence timer
        pc.tick(&mut ctx);
        assert_eq!(ctx.entity_state(), EntityState::Normal);

        std::thread::sleep(Duration::from_millis(100));
        pc.tick(&mut ctx);

        assert_eq!(ctx.entity_state(), EntityState::Fault);
        assert!(!pc.tracking);

        // The divergence is visible in the forced state report
        let traffic = drain(&observer);
        assert!(traffic.iter().any(|p| matches!(
            p,
            Payload::PathControlState(pcs) if pcs.flags & PCS_FL_DIVERGING_CT != 0
        )));

        // The heading loop was released on disengage
        assert!(traffic.iter().any(|p| matches!(
            p,
            Payload::ControlLoops(ControlLoops {
                enable: LoopToggle::Disable,
                ..
            })
        )));
    }

    #[test]
    fn test_state_report_cadence() {
        let mut p = params();
        p.state_report_period = 0.05;
        let (mut pc, mut ctx, observer) = harness(p);

        activate(&mut pc, &mut ctx);
        pc.consume(&mut ctx, &msg_from(1, estimated_state(0.0, 0.0, 1.0)));
        pc.consume(
            &mut ctx,
            &msg_from(
                2,
                desired_path(
                    Waypoint {
                        x: 100.0,
                        y: 0.0,
                        z: 0.0,
                    },
                    0.0,
                ),
            ),
        );
        drain(&observer);

        std::thread::sleep(Duration::from_millis(60));
        pc.tick(&mut ctx);
        std::thread::sleep(Duration::from_millis(60));
        pc.tick(&mut ctx);

        let reports = drain(&observer)
            .iter()
            .filter(|p| matches!(p, Payload::PathControlState(_)))
            .count();
        assert!(reports >= 2);
    }

    #[test]
    fn test_loiter_path_steps_loiter() {
        let (mut pc, mut ctx, observer) = harness(params());

        activate(&mut pc, &mut ctx);
        pc.consume(&mut ctx, &msg_from(1, estimated_state(0.0, 0.0, 1.0)));

        let mut dp = match desired_path(
            Waypoint {
                x: 50.0,
                y: 0.0,
                z: 0.0,
            },
            0.0,
        ) {
            Payload::DesiredPath(dp) => dp,
            _ => unreachable!(),
        };
        dp.lradius = 20.0;
        pc.consume(&mut ctx, &msg_from(2, Payload::DesiredPath(dp)));
        drain(&observer);

        pc.tick(&mut ctx);

        let traffic = drain(&observer);

        // A heading step was produced by the loiter hook
        assert!(traffic
            .iter()
            .any(|p| matches!(p, Payload::DesiredHeading(_))));

        // And the loitering flag is reported
        pc.report(&ctx, pc.mono(), true);
        assert!(drain(&observer).iter().any(|p| matches!(
            p,
            Payload::PathControlState(pcs) if pcs.flags & PCS_FL_LOITERING != 0
        )));
    }

    #[test]
    fn test_bottom_track_holds_and_restores() {
        let mut p = params();
        p.bottom_track.enabled = true;
        let (mut pc, mut ctx, observer) = harness(p);

        activate(&mut pc, &mut ctx);

        // Deep enough for the envelope to apply
        let deep = Payload::EstimatedState(EstimatedState {
            z: 5.0,
            u: 1.0,
            ..Default::default()
        });
        pc.consume(&mut ctx, &msg_from(1, deep));
        pc.consume(
            &mut ctx,
            &msg_from(
                2,
                desired_path(
                    Waypoint {
                        x: 100.0,
                        y: 0.0,
                        z: 5.0,
                    },
                    5.0,
                ),
            ),
        );
        drain(&observer);

        // Bottom closer than the 2 m minimum: the step overrides the
        // vertical reference with a safe altitude hold
        pc.consume(
            &mut ctx,
            &msg_from(
                1,
                Payload::Distance(Distance {
                    value: 1.5,
                    validity: true,
                }),
            ),
        );
        pc.tick(&mut ctx);

        assert!(pc.bt_holding);
        assert!(drain(&observer).iter().any(|p| matches!(
            p,
            Payload::DesiredZ(z)
                if z.z_units == ZUnits::Altitude && (z.value - 2.0).abs() < 1e-9
        )));

        // Bottom falls away well past the minimum: the path's own depth
        // reference comes back
        pc.consume(
            &mut ctx,
            &msg_from(
                1,
                Payload::Distance(Distance {
                    value: 4.0,
                    validity: true,
                }),
            ),
        );
        pc.tick(&mut ctx);

        assert!(!pc.bt_holding);
        assert!(drain(&observer).iter().any(|p| matches!(
            p,
            Payload::DesiredZ(z)
                if z.z_units == ZUnits::Depth && (z.value - 5.0).abs() < 1e-9
        )));
    }

    #[test]
    fn test_nav_uncertainty_widens_corridor() {
        let mut p = params();
        p.ctm.time_limit = 0.05;
        p.ctm.nav_unc_factor = 2.0;
        let (mut pc, mut ctx, observer) = harness(p);

        activate(&mut pc, &mut ctx);
        pc.consume(&mut ctx, &msg_from(1, estimated_state(0.0, 0.0, 1.0)));
        pc.consume(
            &mut ctx,
            &msg_from(
                2,
                desired_path(
                    Waypoint {
                        x: 100.0,
                        y: 0.0,
                        z: 0.0,
                    },
                    0.0,
                ),
            ),
        );
        drain(&observer);

        // With sigma = 1 m the corridor is 5 + 2 * 1 = 7 m, so a 6 m
        // excursion never trips the monitor
        pc.consume(
            &mut ctx,
            &msg_from(
                1,
                Payload::NavigationUncertainty(NavigationUncertainty { x: 1.0, y: 0.5 }),
            ),
        );
        pc.consume(&mut ctx, &msg_from(1, estimated_state(20.0, 6.0, 1.0)));

        pc.tick(&mut ctx);
        std::thread::sleep(Duration::from_millis(100));
        pc.tick(&mut ctx);

        assert_eq!(ctx.entity_state(), EntityState::Normal);
        assert!(pc.tracking);
    }
}
