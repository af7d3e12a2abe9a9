//! # Vehicle supervisor module
//!
//! This module implements the [`VehSup`] task, which owns the vehicle's
//! operating mode and arbitrates between the producers trying to drive the
//! vehicle: plan executors commanding maneuvers and calibrations, external
//! controllers claiming control loops, and the entity monitor reporting
//! subsystem health.
//!
//! The supervisor is the single writer of [`VehicleState`]. Every mode
//! transition re-publishes it, and the periodic tick re-publishes it
//! unconditionally so consumers can treat it as a heartbeat.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod params;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, error, info, trace, warn};
use std::time::Instant;

// Internal
use crate::task::{Task, TaskCtx};
use msg_if::msg::{
    wall_clock_seconds, Calibration, CommandKind, CommandOp, ControlLoops, EntityMonitoringState,
    IdleManeuver, Kind, LoopToggle, ManeuverControlState, McsState, Message, OpMode, Payload,
    PlanControl, PlanOp, StopManeuver, VehicleCommand, VehicleState, CL_NO_OVERRIDE,
    CL_TELEOPERATION, MANEUVER_ETA_UNKNOWN, MANEUVER_TYPE_NONE, PC_FLG_IGNORE_ERRORS,
    VFLG_MANEUVER_DONE,
};
use params::VehSupParams;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Name of the vehicle supervisor task.
const TASK_NAME: &str = "Vehicle Supervisor";

/// Minimum interval between entity error prints, in seconds.
const ERROR_PRINT_PERIOD_S: f64 = 2.0;

/// A commanded maneuver must report execution within this long, in seconds.
const MANEUVER_REQUEST_TIMEOUT_S: f64 = 1.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The vehicle supervisor task.
pub struct VehSup {
    /// Task parameters.
    params: VehSupParams,

    /// Monotonic time origin.
    epoch: Instant,

    /// The vehicle state, owned exclusively by this task.
    vs: VehicleState,

    /// Currently performing a safe plan.
    in_safe_plan: bool,

    /// Monotonic time a switch timer was armed: waiting for a calibration
    /// to finish, a maneuver to be accepted, or a completed maneuver to
    /// hand back to service. -1 when disarmed.
    switch_time: f64,

    /// Monotonic time entity errors were last printed, -1 for never.
    last_err_print: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl VehSup {
    /// Build a new supervisor in the initial service state.
    pub fn new(params: VehSupParams) -> Self {
        Self {
            params,
            epoch: Instant::now(),
            vs: initial_vehicle_state(),
            in_safe_plan: false,
            switch_time: -1.0,
            last_err_print: -1.0,
        }
    }

    /// Monotonic seconds since construction.
    fn mono(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    // ---- Consume handlers ----

    fn handle_abort(&mut self, ctx: &mut TaskCtx) {
        error!("got abort request");
        self.vs.last_error = String::from("got abort request");
        self.vs.last_error_time = wall_clock_seconds();

        if !self.error_mode() {
            self.reset(ctx);

            if !self.external_mode() || !self.non_overridable_loops() {
                self.change_mode(ctx, OpMode::Service, None);
            }
        }
    }

    fn handle_control_loops(&mut self, ctx: &mut TaskCtx, cl: &ControlLoops) {
        let was = self.vs.control_loops;

        match cl.enable {
            LoopToggle::Enable => {
                self.vs.control_loops |= cl.mask;

                if was == 0 && self.vs.control_loops != 0 {
                    self.on_enabled_control_loops(ctx);
                }
            }
            LoopToggle::Disable => {
                self.vs.control_loops &= !cl.mask;

                if was != 0 && self.vs.control_loops == 0 {
                    self.on_disabled_control_loops(ctx);
                }
            }
        }
    }

    fn on_enabled_control_loops(&mut self, ctx: &mut TaskCtx) {
        debug!("some control loops are enabled now");

        match self.vs.op_mode {
            OpMode::Service => self.change_mode(ctx, OpMode::External, None),
            OpMode::Error => {
                if self.non_overridable_loops() {
                    self.change_mode(ctx, OpMode::External, None);
                } else {
                    // Try to disable the control loops
                    self.reset(ctx);
                }
            }
            _ => (),
        }
    }

    fn on_disabled_control_loops(&mut self, ctx: &mut TaskCtx) {
        debug!("no control loops are enabled now");

        if self.external_mode() {
            self.change_mode(ctx, OpMode::Service, None);
        }
    }

    fn handle_entity_monitoring_state(&mut self, ctx: &mut TaskCtx, ems: &EntityMonitoringState) {
        let prev_count = self.vs.error_count;

        self.vs.error_count = ems.ccount.saturating_add(ems.ecount);

        if self.vs.error_count > 0 && ems.last_error_time > self.vs.last_error_time {
            self.vs.last_error = ems.last_error.clone();
            self.vs.last_error_time = ems.last_error_time;
        }

        self.vs.error_ents = String::new();
        if ems.ccount > 0 {
            self.vs.error_ents = ems.cnames.clone();
        }
        if ems.ecount > 0 {
            if ems.ccount > 0 {
                self.vs.error_ents.push(',');
            }
            self.vs.error_ents.push_str(&ems.enames);
        }

        if prev_count > 0 && self.vs.error_count == 0 {
            warn!("entity errors cleared");
        } else if prev_count != self.vs.error_count && self.err_print_due() {
            warn!("vehicle errors: {}", self.vs.error_ents);
            self.last_err_print = self.mono();
        }

        if self.error_mode() {
            if self.vs.error_count == 0 {
                self.change_mode(ctx, OpMode::Service, None);
            }
            return;
        }

        // External/maneuver mode
        if self.external_mode() || self.maneuver_mode() {
            if self.entity_error() && !self.non_overridable_loops() && !self.teleoperation_on() {
                self.reset(ctx);
                self.change_mode(ctx, OpMode::Error, None);
            }
            return;
        }

        // Otherwise (SERVICE, CALIBRATION modes): calibration defers the
        // transition until it ends
        if self.entity_error() && !self.calibration_mode() {
            self.reset(ctx);
            self.change_mode(ctx, OpMode::Error, None);
        }
    }

    fn handle_maneuver_control_state(
        &mut self,
        ctx: &mut TaskCtx,
        msg: &Message,
        mcs: &ManeuverControlState,
    ) {
        // Only maneuvers of this vehicle are of interest
        if msg.header.source != ctx.system {
            return;
        }

        if !self.maneuver_mode() {
            return;
        }

        match mcs.state {
            McsState::Executing => {
                // The maneuver has been accepted
                self.switch_time = -1.0;

                if mcs.eta != self.vs.maneuver_eta {
                    self.vs.maneuver_eta = mcs.eta;
                    ctx.dispatch(Payload::VehicleState(self.vs.clone()));
                }
            }
            McsState::Done => {
                debug!("maneuver done");
                self.vs.maneuver_eta = 0;
                self.vs.flags |= VFLG_MANEUVER_DONE;
                ctx.dispatch(Payload::VehicleState(self.vs.clone()));

                // Hand back to service on the next tick
                self.switch_time = self.mono();
            }
            McsState::Error => {
                self.vs.last_error = format!("maneuver error: {}", mcs.info);
                self.vs.last_error_time = msg.header.timestamp;
                debug!("{}", self.vs.last_error);

                self.change_mode(ctx, OpMode::Service, None);
                self.reset(ctx);
            }
        }
    }

    fn handle_plan_control(&mut self, pc: &PlanControl) {
        if pc.kind == CommandKind::Request && pc.op == PlanOp::Start {
            // Check if the plan is supposed to ignore some errors
            self.in_safe_plan = pc.flags & PC_FLG_IGNORE_ERRORS != 0;
        }
    }

    fn handle_vehicle_command(&mut self, ctx: &mut TaskCtx, msg: &Message, cmd: &VehicleCommand) {
        if cmd.kind != CommandKind::Request {
            return;
        }

        trace!(
            "{} request ({}/{}/{})",
            cmd.command,
            msg.header.source,
            msg.header.source_entity,
            cmd.request_id
        );

        match cmd.command {
            CommandOp::ExecManeuver => self.start_maneuver(ctx, msg, cmd),
            CommandOp::StopManeuver => self.stop_maneuver(ctx, msg, cmd),
            CommandOp::Calibrate => self.start_calibration(ctx, msg, cmd),
        }
    }

    // ---- Command execution ----

    fn start_maneuver(&mut self, ctx: &mut TaskCtx, msg: &Message, cmd: &VehicleCommand) {
        let maneuver = match &cmd.maneuver {
            Some(m) => m.as_ref().clone(),
            None => {
                self.request_failed(ctx, msg, cmd, "no maneuver specified");
                return;
            }
        };

        let mtype = maneuver.kind().name();

        if self.external_mode() {
            self.request_failed(
                ctx,
                msg,
                cmd,
                &format!("{} maneuver cannot be started in current mode", mtype),
            );
            return;
        }

        ctx.dispatch(Payload::StopManeuver(StopManeuver));
        self.change_mode(ctx, OpMode::Maneuver, Some(&maneuver));

        // The maneuver must confirm execution before the request times out
        self.switch_time = self.mono();

        self.request_ok(ctx, msg, cmd, &format!("{} maneuver started", mtype));
    }

    fn stop_maneuver(&mut self, ctx: &mut TaskCtx, msg: &Message, cmd: &VehicleCommand) {
        // A stop with nothing running is answered without side effects
        let idle = self.service_mode()
            && self.vs.control_loops == 0
            && self.vs.maneuver_type == MANEUVER_TYPE_NONE;

        if !self.error_mode() && !idle {
            self.reset(ctx);

            if !self.external_mode() || !self.non_overridable_loops() {
                self.change_mode(ctx, OpMode::Service, None);
            }
        }

        self.request_ok(ctx, msg, cmd, "OK");
    }

    fn start_calibration(&mut self, ctx: &mut TaskCtx, msg: &Message, cmd: &VehicleCommand) {
        if self.external_mode() {
            self.request_failed(ctx, msg, cmd, "cannot calibrate: vehicle is in external mode");
            return;
        }

        if self.maneuver_mode() {
            self.reset(ctx);
        }

        self.change_mode(ctx, OpMode::Calibration, None);

        ctx.dispatch(Payload::Calibration(Calibration {
            duration: self.params.calibration_time as u16,
        }));
        self.switch_time = self.mono();

        self.request_ok(ctx, msg, cmd, "calibrating vehicle");
    }

    // ---- Replies ----

    fn answer(
        &mut self,
        ctx: &mut TaskCtx,
        msg: &Message,
        cmd: &VehicleCommand,
        kind: CommandKind,
        desc: &str,
    ) {
        let reply = VehicleCommand {
            kind,
            command: cmd.command,
            request_id: cmd.request_id,
            maneuver: None,
            info: String::from(desc),
        };

        ctx.dispatch_to(
            Payload::VehicleCommand(reply),
            msg.header.source,
            msg.header.source_entity,
        );

        if kind == CommandKind::Failure {
            error!("{}", desc);
        } else {
            trace!("{}", desc);
        }
    }

    fn request_ok(&mut self, ctx: &mut TaskCtx, msg: &Message, cmd: &VehicleCommand, desc: &str) {
        self.answer(ctx, msg, cmd, CommandKind::Success, desc);
    }

    fn request_failed(
        &mut self,
        ctx: &mut TaskCtx,
        msg: &Message,
        cmd: &VehicleCommand,
        desc: &str,
    ) {
        self.answer(ctx, msg, cmd, CommandKind::Failure, desc);
    }

    // ---- Mode machinery ----

    /// Change the operating mode, dispatching `maneuver` when entering
    /// maneuver mode.
    ///
    /// A request for service mode while entities are in error lands in
    /// error mode instead. Every call re-publishes the vehicle state.
    fn change_mode(&mut self, ctx: &mut TaskCtx, mode: OpMode, maneuver: Option<&Payload>) {
        if self.vs.op_mode != mode {
            let mut target = mode;

            if target == OpMode::Service && self.entity_error() {
                target = OpMode::Error;
            }

            self.vs.op_mode = target;

            warn!("now in '{}' mode", target);

            if !self.maneuver_mode() {
                self.vs.maneuver_type = MANEUVER_TYPE_NONE;
                self.vs.maneuver_stime = -1.0;
                self.vs.maneuver_eta = MANEUVER_ETA_UNKNOWN;
            }
        }

        if self.maneuver_mode() {
            if let Some(m) = maneuver {
                ctx.dispatch(m.clone());

                self.vs.maneuver_stime = wall_clock_seconds();
                self.vs.maneuver_type = m.kind().id();
                self.vs.maneuver_eta = MANEUVER_ETA_UNKNOWN;
                self.vs.last_error.clear();
                self.vs.last_error_time = -1.0;
                self.vs.flags &= !VFLG_MANEUVER_DONE;
            }
        }

        self.switch_time = -1.0;
        ctx.dispatch(Payload::VehicleState(self.vs.clone()));
    }

    /// Stop whatever the vehicle is doing and return it to rest.
    fn reset(&mut self, ctx: &mut TaskCtx) {
        if self.maneuver_mode() {
            ctx.dispatch(Payload::StopManeuver(StopManeuver));
        }

        self.in_safe_plan = false;
        self.last_err_print = self.mono();
        self.vs.control_loops = 0;

        ctx.dispatch(Payload::IdleManeuver(IdleManeuver { duration: 0 }));
    }

    /// Check if the entities in error are relevant for the current plan.
    ///
    /// During a safe plan with a configured safe entity list, only errors
    /// on listed entities count; otherwise any error counts.
    fn entity_error(&self) -> bool {
        if self.vs.error_count == 0 {
            return false;
        }

        if !self.params.safe_ents.is_empty() && self.in_safe_plan {
            self.vs
                .error_ents
                .split(',')
                .any(|ent| self.params.safe_ents.iter().any(|safe| safe == ent.trim()))
        } else {
            true
        }
    }

    fn err_print_due(&self) -> bool {
        self.last_err_print < 0.0 || self.mono() - self.last_err_print >= ERROR_PRINT_PERIOD_S
    }

    fn service_mode(&self) -> bool {
        self.vs.op_mode == OpMode::Service
    }

    fn maneuver_mode(&self) -> bool {
        self.vs.op_mode == OpMode::Maneuver
    }

    fn error_mode(&self) -> bool {
        self.vs.op_mode == OpMode::Error
    }

    fn external_mode(&self) -> bool {
        self.vs.op_mode == OpMode::External
    }

    fn calibration_mode(&self) -> bool {
        self.vs.op_mode == OpMode::Calibration
    }

    fn teleoperation_on(&self) -> bool {
        self.vs.maneuver_type == Kind::Teleoperation.id()
    }

    fn non_overridable_loops(&self) -> bool {
        self.vs.control_loops & (CL_TELEOPERATION | CL_NO_OVERRIDE) != 0
    }
}

impl Task for VehSup {
    fn name(&self) -> &str {
        TASK_NAME
    }

    fn subscriptions(&self) -> Vec<Kind> {
        vec![
            Kind::Abort,
            Kind::ControlLoops,
            Kind::EntityMonitoringState,
            Kind::ManeuverControlState,
            Kind::VehicleCommand,
            Kind::PlanControl,
        ]
    }

    fn tick_period(&self) -> Option<f64> {
        Some(self.params.tick_period)
    }

    fn on_resource_initialisation(
        &mut self,
        _ctx: &mut TaskCtx,
    ) -> Result<(), crate::task::TaskError> {
        self.vs = initial_vehicle_state();
        self.switch_time = -1.0;
        self.in_safe_plan = false;
        Ok(())
    }

    fn on_activation(&mut self, ctx: &mut TaskCtx) {
        info!("supervising in '{}' mode", self.vs.op_mode);
        ctx.dispatch(Payload::VehicleState(self.vs.clone()));
    }

    fn consume(&mut self, ctx: &mut TaskCtx, msg: &Message) {
        match &msg.payload {
            Payload::Abort(_) => self.handle_abort(ctx),
            Payload::ControlLoops(cl) => self.handle_control_loops(ctx, cl),
            Payload::EntityMonitoringState(ems) => self.handle_entity_monitoring_state(ctx, ems),
            Payload::ManeuverControlState(mcs) => {
                self.handle_maneuver_control_state(ctx, msg, mcs)
            }
            Payload::PlanControl(pc) => self.handle_plan_control(pc),
            Payload::VehicleCommand(cmd) => self.handle_vehicle_command(ctx, msg, cmd),
            _ => (),
        }
    }

    fn tick(&mut self, ctx: &mut TaskCtx) {
        ctx.dispatch(Payload::VehicleState(self.vs.clone()));

        if self.switch_time < 0.0 {
            return;
        }

        let delta = self.mono() - self.switch_time;

        if self.calibration_mode() && delta > self.params.calibration_time {
            debug!("calibration over");
            self.change_mode(ctx, OpMode::Service, None);
        } else if self.maneuver_mode() {
            if self.vs.flags & VFLG_MANEUVER_DONE != 0 {
                debug!("maneuver complete, returning to service");
                self.change_mode(ctx, OpMode::Service, None);
            } else if delta > MANEUVER_REQUEST_TIMEOUT_S {
                info!("maneuver request timeout");
                self.reset(ctx);
                self.change_mode(ctx, OpMode::Service, None);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// The vehicle state at boot: service mode, no maneuver, no errors.
fn initial_vehicle_state() -> VehicleState {
    VehicleState {
        op_mode: OpMode::Service,
        maneuver_type: MANEUVER_TYPE_NONE,
        maneuver_stime: -1.0,
        maneuver_eta: MANEUVER_ETA_UNKNOWN,
        error_ents: String::new(),
        error_count: 0,
        flags: 0,
        last_error: String::new(),
        last_error_time: -1.0,
        control_loops: 0,
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use msg_if::bus::{Bus, Mailbox};
    use msg_if::msg::{Abort, Goto, SpeedUnits, Waypoint, ZUnits};
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    const OWN_SYSTEM: u16 = 1;
    const EXECUTOR_SYSTEM: u16 = 5;

    fn params() -> VehSupParams {
        VehSupParams {
            calibration_time: 10.0,
            safe_ents: Vec::new(),
            tick_period: 0.5,
        }
    }

    fn harness(params: VehSupParams) -> (VehSup, TaskCtx, Mailbox) {
        let bus = Bus::new();
        let observer = bus.subscribe(
            "observer",
            &[
                Kind::VehicleState,
                Kind::VehicleCommand,
                Kind::StopManeuver,
                Kind::IdleManeuver,
                Kind::Calibration,
                Kind::Goto,
            ],
            128,
        );
        let ctx = TaskCtx::new(bus, OWN_SYSTEM, 0, TASK_NAME, Arc::new(AtomicBool::new(false)));

        (VehSup::new(params), ctx, observer)
    }

    fn drain(observer: &Mailbox) -> Vec<Payload> {
        let mut out = Vec::new();
        while let Some(msg) = observer.try_recv() {
            out.push(msg.payload.clone());
        }
        out
    }

    fn goto_payload() -> Payload {
        Payload::Goto(Goto {
            end: Waypoint {
                x: 100.0,
                y: 0.0,
                z: 0.0,
            },
            speed: 1.5,
            speed_units: SpeedUnits::MetersPs,
            z: 0.0,
            z_units: ZUnits::Depth,
        })
    }

    fn command(op: CommandOp, request_id: u16, maneuver: Option<Payload>) -> Message {
        Message::new(
            EXECUTOR_SYSTEM,
            2,
            Payload::VehicleCommand(VehicleCommand {
                kind: CommandKind::Request,
                command: op,
                request_id,
                maneuver: maneuver.map(Box::new),
                info: String::new(),
            }),
        )
    }

    fn mcs(state: McsState, eta: u16) -> Message {
        Message::new(
            OWN_SYSTEM,
            4,
            Payload::ManeuverControlState(ManeuverControlState {
                state,
                eta,
                info: String::new(),
            }),
        )
    }

    fn ems(ccount: u8, cnames: &str) -> Message {
        Message::new(
            OWN_SYSTEM,
            6,
            Payload::EntityMonitoringState(EntityMonitoringState {
                ccount,
                cnames: String::from(cnames),
                ecount: 0,
                enames: String::new(),
                last_error: if ccount > 0 {
                    format!("{} failure", cnames)
                } else {
                    String::new()
                },
                last_error_time: wall_clock_seconds(),
            }),
        )
    }

    fn cl(enable: LoopToggle, mask: u32) -> Message {
        Message::new(
            OWN_SYSTEM,
            4,
            Payload::ControlLoops(ControlLoops { enable, mask }),
        )
    }

    /// Find the reply to `request_id`, returning its kind and info.
    fn reply(traffic: &[Payload], request_id: u16) -> Option<(CommandKind, String)> {
        traffic.iter().find_map(|p| match p {
            Payload::VehicleCommand(vc)
                if vc.kind != CommandKind::Request && vc.request_id == request_id =>
            {
                Some((vc.kind, vc.info.clone()))
            }
            _ => None,
        })
    }

    fn count_kind(traffic: &[Payload], kind: Kind) -> usize {
        traffic.iter().filter(|p| p.kind() == kind).count()
    }

    #[test]
    fn test_clean_maneuver() {
        let (mut sup, mut ctx, observer) = harness(params());

        sup.consume(&mut ctx, &command(CommandOp::ExecManeuver, 7, Some(goto_payload())));

        assert_eq!(sup.vs.op_mode, OpMode::Maneuver);
        assert_eq!(sup.vs.maneuver_type, Kind::Goto.id());
        assert!(sup.vs.maneuver_stime >= 0.0);

        let traffic = drain(&observer);
        assert_eq!(count_kind(&traffic, Kind::StopManeuver), 1);
        assert_eq!(count_kind(&traffic, Kind::Goto), 1);
        assert_eq!(count_kind(&traffic, Kind::VehicleState), 1);
        assert_eq!(
            reply(&traffic, 7).map(|r| r.0),
            Some(CommandKind::Success)
        );

        // Maneuver completes
        sup.consume(&mut ctx, &mcs(McsState::Done, 0));
        assert_eq!(sup.vs.op_mode, OpMode::Maneuver);
        assert!(sup.vs.flags & VFLG_MANEUVER_DONE != 0);
        assert_eq!(sup.vs.maneuver_eta, 0);

        // One tick later the vehicle is back in service, completion flag
        // still visible
        sup.tick(&mut ctx);
        assert_eq!(sup.vs.op_mode, OpMode::Service);
        assert!(sup.vs.flags & VFLG_MANEUVER_DONE != 0);
        assert_eq!(sup.vs.maneuver_type, MANEUVER_TYPE_NONE);
        assert!(sup.vs.maneuver_stime < 0.0);
    }

    #[test]
    fn test_maneuver_eta_updates_are_reactive() {
        let (mut sup, mut ctx, observer) = harness(params());

        sup.consume(&mut ctx, &command(CommandOp::ExecManeuver, 1, Some(goto_payload())));
        drain(&observer);

        sup.consume(&mut ctx, &mcs(McsState::Executing, 42));
        assert_eq!(sup.vs.maneuver_eta, 42);
        assert_eq!(count_kind(&drain(&observer), Kind::VehicleState), 1);

        // Eta decreasing then increasing is taken verbatim
        sup.consume(&mut ctx, &mcs(McsState::Executing, 10));
        sup.consume(&mut ctx, &mcs(McsState::Executing, 30));
        assert_eq!(sup.vs.maneuver_eta, 30);

        // An unchanged eta is not re-published
        sup.consume(&mut ctx, &mcs(McsState::Executing, 30));
        assert_eq!(count_kind(&drain(&observer), Kind::VehicleState), 2);
    }

    #[test]
    fn test_foreign_maneuver_state_ignored() {
        let (mut sup, mut ctx, _observer) = harness(params());

        sup.consume(&mut ctx, &command(CommandOp::ExecManeuver, 1, Some(goto_payload())));

        let foreign = Message::new(
            9,
            4,
            Payload::ManeuverControlState(ManeuverControlState {
                state: McsState::Done,
                eta: 0,
                info: String::new(),
            }),
        );
        sup.consume(&mut ctx, &foreign);

        assert_eq!(sup.vs.flags & VFLG_MANEUVER_DONE, 0);
    }

    #[test]
    fn test_maneuver_error_returns_to_service() {
        let (mut sup, mut ctx, observer) = harness(params());

        sup.consume(&mut ctx, &command(CommandOp::ExecManeuver, 1, Some(goto_payload())));
        drain(&observer);

        let error = Message::new(
            OWN_SYSTEM,
            4,
            Payload::ManeuverControlState(ManeuverControlState {
                state: McsState::Error,
                eta: 0,
                info: String::from("obstacle ahead"),
            }),
        );
        sup.consume(&mut ctx, &error);

        assert_eq!(sup.vs.op_mode, OpMode::Service);
        assert!(sup.vs.last_error.contains("obstacle ahead"));

        // The reset dispatched an idle maneuver
        let traffic = drain(&observer);
        assert_eq!(count_kind(&traffic, Kind::IdleManeuver), 1);
    }

    #[test]
    fn test_abort_in_maneuver() {
        let (mut sup, mut ctx, observer) = harness(params());

        sup.consume(&mut ctx, &command(CommandOp::ExecManeuver, 1, Some(goto_payload())));
        drain(&observer);

        sup.consume(&mut ctx, &Message::new(EXECUTOR_SYSTEM, 0, Payload::Abort(Abort)));

        assert_eq!(sup.vs.op_mode, OpMode::Service);
        assert_eq!(sup.vs.last_error, "got abort request");

        let traffic = drain(&observer);
        assert_eq!(count_kind(&traffic, Kind::StopManeuver), 1);
        assert_eq!(count_kind(&traffic, Kind::IdleManeuver), 1);
    }

    #[test]
    fn test_control_loop_external_round_trip() {
        let (mut sup, mut ctx, observer) = harness(params());

        sup.consume(&mut ctx, &cl(LoopToggle::Enable, CL_TELEOPERATION));
        assert_eq!(sup.vs.op_mode, OpMode::External);
        assert_eq!(sup.vs.control_loops, CL_TELEOPERATION);

        sup.consume(&mut ctx, &cl(LoopToggle::Disable, CL_TELEOPERATION));
        assert_eq!(sup.vs.op_mode, OpMode::Service);
        assert_eq!(sup.vs.control_loops, 0);

        // Both transitions published the vehicle state
        assert_eq!(count_kind(&drain(&observer), Kind::VehicleState), 2);
    }

    #[test]
    fn test_exec_maneuver_rejected_in_external() {
        let (mut sup, mut ctx, observer) = harness(params());

        sup.consume(&mut ctx, &cl(LoopToggle::Enable, CL_TELEOPERATION));
        drain(&observer);

        sup.consume(&mut ctx, &command(CommandOp::ExecManeuver, 9, Some(goto_payload())));

        assert_eq!(sup.vs.op_mode, OpMode::External);

        let traffic = drain(&observer);
        assert_eq!(
            reply(&traffic, 9).map(|r| r.0),
            Some(CommandKind::Failure)
        );
        assert_eq!(count_kind(&traffic, Kind::Goto), 0);
    }

    #[test]
    fn test_exec_maneuver_without_payload_fails() {
        let (mut sup, mut ctx, observer) = harness(params());

        sup.consume(&mut ctx, &command(CommandOp::ExecManeuver, 3, None));

        assert_eq!(sup.vs.op_mode, OpMode::Service);

        let (kind, info) = reply(&drain(&observer), 3).unwrap();
        assert_eq!(kind, CommandKind::Failure);
        assert!(info.contains("no maneuver specified"));
    }

    #[test]
    fn test_safe_plan_filtering() {
        let mut p = params();
        p.safe_ents = vec![String::from("GPS")];
        let (mut sup, mut ctx, _observer) = harness(p);

        // Start a safe plan
        let plan = Message::new(
            EXECUTOR_SYSTEM,
            2,
            Payload::PlanControl(PlanControl {
                kind: CommandKind::Request,
                op: PlanOp::Start,
                flags: PC_FLG_IGNORE_ERRORS,
            }),
        );
        sup.consume(&mut ctx, &plan);
        assert!(sup.in_safe_plan);

        // An IMU error is not in the safe entity list: recorded, no mode
        // change
        sup.consume(&mut ctx, &ems(1, "IMU"));
        assert_eq!(sup.vs.op_mode, OpMode::Service);
        assert_eq!(sup.vs.error_count, 1);

        // A GPS error is critical for the safe plan
        sup.consume(&mut ctx, &ems(1, "GPS"));
        assert_eq!(sup.vs.op_mode, OpMode::Error);
    }

    #[test]
    fn test_entity_error_and_recovery() {
        let (mut sup, mut ctx, _observer) = harness(params());

        sup.consume(&mut ctx, &ems(1, "GPS"));
        assert_eq!(sup.vs.op_mode, OpMode::Error);
        assert_eq!(sup.vs.error_ents, "GPS");

        // Errors clearing leaves error mode
        sup.consume(&mut ctx, &ems(0, ""));
        assert_eq!(sup.vs.op_mode, OpMode::Service);
        assert_eq!(sup.vs.error_count, 0);
    }

    #[test]
    fn test_calibration_defers_entity_error() {
        let (mut sup, mut ctx, observer) = harness(params());

        sup.consume(&mut ctx, &command(CommandOp::Calibrate, 11, None));
        assert_eq!(sup.vs.op_mode, OpMode::Calibration);

        let traffic = drain(&observer);
        assert_eq!(
            reply(&traffic, 11).map(|r| r.0),
            Some(CommandKind::Success)
        );
        assert!(traffic
            .iter()
            .any(|p| matches!(p, Payload::Calibration(c) if c.duration == 10)));

        // An entity error during calibration is recorded but does not force
        // a transition
        sup.consume(&mut ctx, &ems(1, "IMU"));
        assert_eq!(sup.vs.op_mode, OpMode::Calibration);
        assert_eq!(sup.vs.error_count, 1);

        // Once the calibration time elapses, the pending error surfaces
        sup.switch_time = sup.mono() - 11.0;
        sup.tick(&mut ctx);
        assert_eq!(sup.vs.op_mode, OpMode::Error);
    }

    #[test]
    fn test_calibration_ends_in_service_when_healthy() {
        let (mut sup, mut ctx, _observer) = harness(params());

        sup.consume(&mut ctx, &command(CommandOp::Calibrate, 1, None));
        assert_eq!(sup.vs.op_mode, OpMode::Calibration);

        sup.switch_time = sup.mono() - 11.0;
        sup.tick(&mut ctx);
        assert_eq!(sup.vs.op_mode, OpMode::Service);
    }

    #[test]
    fn test_calibrate_rejected_in_external() {
        let (mut sup, mut ctx, observer) = harness(params());

        sup.consume(&mut ctx, &cl(LoopToggle::Enable, CL_TELEOPERATION));
        drain(&observer);

        sup.consume(&mut ctx, &command(CommandOp::Calibrate, 4, None));

        assert_eq!(sup.vs.op_mode, OpMode::External);
        assert_eq!(
            reply(&drain(&observer), 4).map(|r| r.0),
            Some(CommandKind::Failure)
        );
    }

    #[test]
    fn test_duplicate_stop_maneuver_is_idempotent() {
        let (mut sup, mut ctx, observer) = harness(params());

        sup.consume(&mut ctx, &command(CommandOp::ExecManeuver, 1, Some(goto_payload())));
        drain(&observer);

        // First stop tears the maneuver down
        sup.consume(&mut ctx, &command(CommandOp::StopManeuver, 2, None));
        assert_eq!(sup.vs.op_mode, OpMode::Service);

        let traffic = drain(&observer);
        assert_eq!(reply(&traffic, 2).map(|r| r.0), Some(CommandKind::Success));
        assert_eq!(count_kind(&traffic, Kind::StopManeuver), 1);
        assert_eq!(count_kind(&traffic, Kind::IdleManeuver), 1);

        // Second stop only replies
        sup.consume(&mut ctx, &command(CommandOp::StopManeuver, 3, None));

        let traffic = drain(&observer);
        assert_eq!(reply(&traffic, 3).map(|r| r.0), Some(CommandKind::Success));
        assert_eq!(traffic.len(), 1);
    }

    #[test]
    fn test_maneuver_request_timeout() {
        let (mut sup, mut ctx, observer) = harness(params());

        sup.consume(&mut ctx, &command(CommandOp::ExecManeuver, 1, Some(goto_payload())));
        drain(&observer);

        // No ManeuverControlState arrives before the request timeout
        sup.switch_time = sup.mono() - 2.0;
        sup.tick(&mut ctx);

        assert_eq!(sup.vs.op_mode, OpMode::Service);

        let traffic = drain(&observer);
        assert_eq!(count_kind(&traffic, Kind::StopManeuver), 1);
        assert_eq!(count_kind(&traffic, Kind::IdleManeuver), 1);
    }

    #[test]
    fn test_mcs_executing_disarms_request_timeout() {
        let (mut sup, mut ctx, _observer) = harness(params());

        sup.consume(&mut ctx, &command(CommandOp::ExecManeuver, 1, Some(goto_payload())));
        sup.consume(&mut ctx, &mcs(McsState::Executing, 60));

        assert!(sup.switch_time < 0.0);

        // Ticks no longer time the maneuver out
        sup.tick(&mut ctx);
        assert_eq!(sup.vs.op_mode, OpMode::Maneuver);
    }

    #[test]
    fn test_tick_heartbeats_vehicle_state() {
        let (mut sup, mut ctx, observer) = harness(params());

        sup.tick(&mut ctx);
        sup.tick(&mut ctx);

        assert_eq!(count_kind(&drain(&observer), Kind::VehicleState), 2);
    }

    #[test]
    fn test_abort_in_error_mode_stays_in_error() {
        let (mut sup, mut ctx, observer) = harness(params());

        sup.consume(&mut ctx, &ems(1, "GPS"));
        assert_eq!(sup.vs.op_mode, OpMode::Error);
        drain(&observer);

        sup.consume(&mut ctx, &Message::new(EXECUTOR_SYSTEM, 0, Payload::Abort(Abort)));

        assert_eq!(sup.vs.op_mode, OpMode::Error);
        assert_eq!(count_kind(&drain(&observer), Kind::IdleManeuver), 0);
    }

    #[test]
    fn test_entity_error_in_maneuver_resets_to_error() {
        let (mut sup, mut ctx, observer) = harness(params());

        sup.consume(&mut ctx, &command(CommandOp::ExecManeuver, 1, Some(goto_payload())));
        drain(&observer);

        sup.consume(&mut ctx, &ems(1, "DVL"));

        assert_eq!(sup.vs.op_mode, OpMode::Error);

        // The running maneuver was stopped by the reset
        let traffic = drain(&observer);
        assert_eq!(count_kind(&traffic, Kind::StopManeuver), 1);
    }

    #[test]
    fn test_teleoperation_survives_entity_error() {
        let (mut sup, mut ctx, _observer) = harness(params());

        // Teleoperation claims a non-overridable loop
        sup.consume(&mut ctx, &cl(LoopToggle::Enable, CL_TELEOPERATION));
        assert_eq!(sup.vs.op_mode, OpMode::External);

        sup.consume(&mut ctx, &ems(1, "GPS"));

        // The operator keeps control
        assert_eq!(sup.vs.op_mode, OpMode::External);
        assert_eq!(sup.vs.control_loops, CL_TELEOPERATION);
    }
}
