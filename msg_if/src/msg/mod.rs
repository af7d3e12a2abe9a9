//! # Message set
//!
//! Definitions of every message kind carried by the bus, grouped by the
//! domain of their producer.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod control;
pub mod guidance;
pub mod maneuver;
pub mod nav;
pub mod vehicle;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::Utc;
use serde::{Deserialize, Serialize};

pub use control::*;
pub use guidance::*;
pub use maneuver::*;
pub use nav::*;
pub use vehicle::*;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Sentinel maneuver type id meaning "no maneuver".
pub const MANEUVER_TYPE_NONE: u16 = 0xFFFF;

/// Sentinel maneuver eta meaning "unknown".
pub const MANEUVER_ETA_UNKNOWN: u16 = 0xFFFF;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Identification and timing data common to every message.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Header {
    /// Id of the system which produced the message.
    pub source: u16,

    /// Id of the entity within the source system which produced the message.
    pub source_entity: u8,

    /// Id of the destination system, `None` for broadcast.
    pub destination: Option<u16>,

    /// Id of the destination entity, `None` for broadcast.
    pub destination_entity: Option<u8>,

    /// Wall clock time of dispatch in seconds since the Unix epoch.
    pub timestamp: f64,
}

/// A complete message: header plus typed payload.
///
/// Messages are treated as immutable once dispatched, consumers receive a
/// shared handle and must clone before mutating.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Message {
    pub header: Header,
    pub payload: Payload,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The payload of a message, one variant per kind.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum Payload {
    EstimatedState(EstimatedState),
    NavigationUncertainty(NavigationUncertainty),
    Distance(Distance),
    DesiredPath(DesiredPath),
    DesiredZ(DesiredZ),
    DesiredSpeed(DesiredSpeed),
    DesiredHeading(DesiredHeading),
    Brake(Brake),
    ControlLoops(ControlLoops),
    PathControlState(PathControlState),
    VehicleCommand(VehicleCommand),
    VehicleState(VehicleState),
    Calibration(Calibration),
    ManeuverControlState(ManeuverControlState),
    PlanControl(PlanControl),
    EntityMonitoringState(EntityMonitoringState),
    Abort(Abort),
    StopManeuver(StopManeuver),
    IdleManeuver(IdleManeuver),
    Goto(Goto),
    Teleoperation(Teleoperation),
}

/// Discriminant of a message kind, used for bus subscriptions.
#[derive(Serialize, Deserialize, Debug, Hash, Eq, PartialEq, Copy, Clone)]
pub enum Kind {
    EstimatedState,
    NavigationUncertainty,
    Distance,
    DesiredPath,
    DesiredZ,
    DesiredSpeed,
    DesiredHeading,
    Brake,
    ControlLoops,
    PathControlState,
    VehicleCommand,
    VehicleState,
    Calibration,
    ManeuverControlState,
    PlanControl,
    EntityMonitoringState,
    Abort,
    StopManeuver,
    IdleManeuver,
    Goto,
    Teleoperation,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

/// Current wall clock time in seconds since the Unix epoch.
///
/// This is the timestamp reference for messages; intervals should be
/// measured on a monotonic clock instead.
pub fn wall_clock_seconds() -> f64 {
    let now = Utc::now();
    now.timestamp() as f64 + now.timestamp_subsec_nanos() as f64 * 1e-9
}

impl Message {
    /// Build a new broadcast message, timestamped with the current wall
    /// clock time.
    pub fn new(source: u16, source_entity: u8, payload: Payload) -> Self {
        Self {
            header: Header {
                source,
                source_entity,
                destination: None,
                destination_entity: None,
                timestamp: wall_clock_seconds(),
            },
            payload,
        }
    }

    /// Address this message to a specific system and entity, for example
    /// when replying to a request.
    pub fn to(mut self, destination: u16, destination_entity: u8) -> Self {
        self.header.destination = Some(destination);
        self.header.destination_entity = Some(destination_entity);
        self
    }

    /// Get the kind of this message's payload.
    pub fn kind(&self) -> Kind {
        self.payload.kind()
    }
}

impl Payload {
    /// Get the kind discriminant of this payload.
    pub fn kind(&self) -> Kind {
        match self {
            Payload::EstimatedState(_) => Kind::EstimatedState,
            Payload::NavigationUncertainty(_) => Kind::NavigationUncertainty,
            Payload::Distance(_) => Kind::Distance,
            Payload::DesiredPath(_) => Kind::DesiredPath,
            Payload::DesiredZ(_) => Kind::DesiredZ,
            Payload::DesiredSpeed(_) => Kind::DesiredSpeed,
            Payload::DesiredHeading(_) => Kind::DesiredHeading,
            Payload::Brake(_) => Kind::Brake,
            Payload::ControlLoops(_) => Kind::ControlLoops,
            Payload::PathControlState(_) => Kind::PathControlState,
            Payload::VehicleCommand(_) => Kind::VehicleCommand,
            Payload::VehicleState(_) => Kind::VehicleState,
            Payload::Calibration(_) => Kind::Calibration,
            Payload::ManeuverControlState(_) => Kind::ManeuverControlState,
            Payload::PlanControl(_) => Kind::PlanControl,
            Payload::EntityMonitoringState(_) => Kind::EntityMonitoringState,
            Payload::Abort(_) => Kind::Abort,
            Payload::StopManeuver(_) => Kind::StopManeuver,
            Payload::IdleManeuver(_) => Kind::IdleManeuver,
            Payload::Goto(_) => Kind::Goto,
            Payload::Teleoperation(_) => Kind::Teleoperation,
        }
    }
}

impl Kind {
    /// Get the numeric id of this kind.
    ///
    /// Used where a message kind has to travel inside another message, such
    /// as `VehicleState::maneuver_type`.
    pub fn id(&self) -> u16 {
        match self {
            Kind::EstimatedState => 350,
            Kind::NavigationUncertainty => 354,
            Kind::Distance => 262,
            Kind::DesiredHeading => 400,
            Kind::DesiredZ => 401,
            Kind::DesiredSpeed => 402,
            Kind::DesiredPath => 406,
            Kind::PathControlState => 410,
            Kind::Brake => 413,
            Kind::Goto => 450,
            Kind::Teleoperation => 452,
            Kind::IdleManeuver => 454,
            Kind::StopManeuver => 468,
            Kind::ManeuverControlState => 470,
            Kind::VehicleState => 500,
            Kind::VehicleCommand => 501,
            Kind::EntityMonitoringState => 503,
            Kind::Calibration => 506,
            Kind::ControlLoops => 507,
            Kind::Abort => 550,
            Kind::PlanControl => 559,
        }
    }

    /// Get a human readable name for this kind.
    pub fn name(&self) -> &'static str {
        match self {
            Kind::EstimatedState => "EstimatedState",
            Kind::NavigationUncertainty => "NavigationUncertainty",
            Kind::Distance => "Distance",
            Kind::DesiredPath => "DesiredPath",
            Kind::DesiredZ => "DesiredZ",
            Kind::DesiredSpeed => "DesiredSpeed",
            Kind::DesiredHeading => "DesiredHeading",
            Kind::Brake => "Brake",
            Kind::ControlLoops => "ControlLoops",
            Kind::PathControlState => "PathControlState",
            Kind::VehicleCommand => "VehicleCommand",
            Kind::VehicleState => "VehicleState",
            Kind::Calibration => "Calibration",
            Kind::ManeuverControlState => "ManeuverControlState",
            Kind::PlanControl => "PlanControl",
            Kind::EntityMonitoringState => "EntityMonitoringState",
            Kind::Abort => "Abort",
            Kind::StopManeuver => "StopManeuver",
            Kind::IdleManeuver => "IdleManeuver",
            Kind::Goto => "Goto",
            Kind::Teleoperation => "Teleoperation",
        }
    }
}
