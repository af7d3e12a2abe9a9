//! # Task runtime
//!
//! Long-lived tasks are the unit of isolation in the software: each runs on
//! its own thread, owns a bus mailbox, and communicates with other tasks
//! only through messages. The runtime drives each task through its
//! lifecycle, drains its mailbox, and invokes its periodic tick.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod ctx;
mod runner;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use ctx::{EntityRegistry, TaskCtx};
pub use runner::TaskRunner;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use msg_if::msg::{Kind, Message};
use thiserror::Error;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Health state of a task's entity.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum EntityState {
    /// The task is booting and not yet servicing messages.
    Boot,

    /// The task is operating normally.
    Normal,

    /// The task has suffered an unrecoverable error.
    Fault,
}

/// Errors a task can surface to the runtime.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Communications error: {0}")]
    Comms(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Not ready: {0}")]
    NotReady(String),

    #[error("Invalid request: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A long-lived task scheduled by the [`TaskRunner`].
///
/// Lifecycle hooks are invoked in order on boot (entity reservation,
/// resource acquisition, resource initialisation, parameter update,
/// activation) and in reverse on shutdown (deactivation, resource release).
/// Between activation and deactivation the runtime calls [`Task::consume`]
/// for every message matching the task's subscriptions, and [`Task::tick`]
/// at the task's periodic rate if it has one.
///
/// Handlers and the tick of one task are serialised on its thread, there is
/// no reentrancy within a task.
pub trait Task: Send {
    /// Human readable name of the task, also its entity name.
    fn name(&self) -> &str;

    /// Message kinds this task consumes.
    fn subscriptions(&self) -> Vec<Kind>;

    /// Period of the task's tick in seconds, `None` for event-driven tasks.
    fn tick_period(&self) -> Option<f64> {
        None
    }

    fn on_entity_reservation(&mut self, _ctx: &mut TaskCtx) {}

    fn on_resource_acquisition(&mut self, _ctx: &mut TaskCtx) -> Result<(), TaskError> {
        Ok(())
    }

    fn on_resource_initialisation(&mut self, _ctx: &mut TaskCtx) -> Result<(), TaskError> {
        Ok(())
    }

    fn on_update_parameters(&mut self, _ctx: &mut TaskCtx) {}

    fn on_activation(&mut self, _ctx: &mut TaskCtx) {}

    fn on_deactivation(&mut self, _ctx: &mut TaskCtx) {}

    fn on_resource_release(&mut self, _ctx: &mut TaskCtx) {}

    /// Handle one message from the task's mailbox.
    fn consume(&mut self, ctx: &mut TaskCtx, msg: &Message);

    /// Periodic processing, called at [`Task::tick_period`].
    fn tick(&mut self, _ctx: &mut TaskCtx) {}
}
