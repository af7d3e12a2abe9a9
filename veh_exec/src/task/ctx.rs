//! Task context and entity registry.
//!
//! There is no global state in the software: everything a task needs to
//! talk to the rest of the system is handed to it in a [`TaskCtx`] built by
//! the runner.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

// Internal
use super::EntityState;
use msg_if::bus::Bus;
use msg_if::msg::{Message, Payload};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Everything a task needs to interact with the rest of the system.
pub struct TaskCtx {
    /// Handle to the message bus.
    pub bus: Bus,

    /// Id of this system.
    pub system: u16,

    /// Id of the task's entity.
    pub entity: u8,

    /// Name of the task.
    pub name: String,

    /// Shared stop flag, set by the runner on shutdown.
    stopping: Arc<AtomicBool>,

    /// Current health state of the task's entity.
    entity_state: EntityState,
}

/// Process-wide registry mapping entity names to numeric ids.
///
/// Tasks reserve their entities during boot; reservation is idempotent by
/// name so a task restarted within the same process keeps its id.
#[derive(Clone)]
pub struct EntityRegistry {
    names: Arc<Mutex<Vec<String>>>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TaskCtx {
    /// Build a new context.
    pub fn new(bus: Bus, system: u16, entity: u8, name: &str, stopping: Arc<AtomicBool>) -> Self {
        Self {
            bus,
            system,
            entity,
            name: String::from(name),
            stopping,
            entity_state: EntityState::Boot,
        }
    }

    /// Dispatch a broadcast message sourced from this task.
    pub fn dispatch(&self, payload: Payload) {
        self.bus
            .dispatch(Message::new(self.system, self.entity, payload));
    }

    /// Dispatch a message addressed to a specific system and entity.
    pub fn dispatch_to(&self, payload: Payload, destination: u16, destination_entity: u8) {
        self.bus.dispatch(
            Message::new(self.system, self.entity, payload).to(destination, destination_entity),
        );
    }

    /// True once shutdown has been requested. Tasks must observe this at
    /// every suspension point.
    pub fn stopping(&self) -> bool {
        self.stopping.load(Ordering::Relaxed)
    }

    /// Current health state of the task's entity.
    pub fn entity_state(&self) -> EntityState {
        self.entity_state
    }

    /// Change the health state of the task's entity.
    ///
    /// Transitions are logged; entering `Fault` is logged as an error with
    /// the given description.
    pub fn set_entity_state(&mut self, state: EntityState, desc: &str) {
        if state == self.entity_state {
            return;
        }

        match state {
            EntityState::Fault => error!("[{}] entity fault: {}", self.name, desc),
            EntityState::Normal => info!("[{}] entity normal: {}", self.name, desc),
            EntityState::Boot => warn!("[{}] entity rebooting: {}", self.name, desc),
        }

        self.entity_state = state;
    }
}

impl EntityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            names: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Reserve an entity id for the given name, returning the existing id
    /// if the name is already reserved.
    pub fn reserve(&self, name: &str) -> u8 {
        let mut names = self.names.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(id) = names.iter().position(|n| n == name) {
            return id as u8;
        }

        names.push(String::from(name));
        (names.len() - 1) as u8
    }

    /// Get the id reserved for a name, if any.
    pub fn resolve(&self, name: &str) -> Option<u8> {
        self.names
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .position(|n| n == name)
            .map(|id| id as u8)
    }

    /// Get the name an id was reserved for, if any.
    pub fn name_of(&self, id: u8) -> Option<String> {
        self.names
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id as usize)
            .cloned()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_entity_registry() {
        let reg = EntityRegistry::new();

        let a = reg.reserve("Vehicle Supervisor");
        let b = reg.reserve("Path Control");

        assert_ne!(a, b);

        // Reservation is idempotent by name
        assert_eq!(reg.reserve("Vehicle Supervisor"), a);

        assert_eq!(reg.resolve("Path Control"), Some(b));
        assert_eq!(reg.resolve("unknown"), None);
        assert_eq!(reg.name_of(a).as_deref(), Some("Vehicle Supervisor"));
    }
}
