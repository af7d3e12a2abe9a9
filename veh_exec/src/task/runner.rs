//! Task scheduling.
//!
//! The runner owns one thread per task. Each thread walks the task through
//! its boot sequence, then loops draining the mailbox and firing the
//! periodic tick until the shared stop flag is raised, and finally runs the
//! teardown hooks. A panicking task is contained at its thread boundary.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{error, info, warn};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

// Internal
use super::{EntityRegistry, EntityState, Task, TaskCtx};
use msg_if::bus::{Bus, Mailbox};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of messages a task mailbox holds before dropping its oldest.
const MAILBOX_CAPACITY: usize = 128;

/// Longest a task will sleep waiting for messages, bounding how stale the
/// stop flag can get for event-driven tasks.
const MAX_WAIT_S: f64 = 0.5;

/// Shortest wait for messages when a tick is imminent.
const MIN_WAIT_S: f64 = 0.001;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Spawns and supervises the process's tasks.
pub struct TaskRunner {
    bus: Bus,
    system: u16,
    entities: EntityRegistry,
    stopping: Arc<AtomicBool>,
    handles: Vec<(String, JoinHandle<()>)>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TaskRunner {
    /// Create a new runner for the given system.
    pub fn new(bus: Bus, system: u16, entities: EntityRegistry) -> Self {
        Self {
            bus,
            system,
            entities,
            stopping: Arc::new(AtomicBool::new(false)),
            handles: Vec::new(),
        }
    }

    /// The stop flag shared with every spawned task.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stopping.clone()
    }

    /// Spawn a task on its own thread.
    pub fn spawn(&mut self, task: Box<dyn Task>) {
        let name = String::from(task.name());

        let entity = self.entities.reserve(&name);
        let mailbox = self
            .bus
            .subscribe(&name, &task.subscriptions(), MAILBOX_CAPACITY);
        let mut ctx = TaskCtx::new(
            self.bus.clone(),
            self.system,
            entity,
            &name,
            self.stopping.clone(),
        );

        info!("Spawning task \"{}\" (entity {})", name, entity);

        let thread_name = name.clone();
        let handle = thread::spawn(move || {
            let mut task = task;

            let outcome = catch_unwind(AssertUnwindSafe(|| {
                run_task(task.as_mut(), &mut ctx, &mailbox)
            }));

            if outcome.is_err() {
                ctx.set_entity_state(EntityState::Fault, "task panicked");
                error!("Task \"{}\" panicked and has been stopped", thread_name);
            }
        });

        self.handles.push((name, handle));
    }

    /// Raise the stop flag and join every task thread.
    pub fn join(self) {
        self.stopping.store(true, Ordering::Relaxed);

        for (name, handle) in self.handles {
            if handle.join().is_err() {
                error!("Task \"{}\" thread terminated abnormally", name);
            } else {
                info!("Task \"{}\" stopped", name);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Drive one task from boot to teardown.
fn run_task(task: &mut dyn Task, ctx: &mut TaskCtx, mailbox: &Mailbox) {
    // Boot sequence
    task.on_entity_reservation(ctx);

    if let Err(e) = task.on_resource_acquisition(ctx) {
        ctx.set_entity_state(EntityState::Fault, &format!("resource acquisition: {}", e));
        return;
    }

    if let Err(e) = task.on_resource_initialisation(ctx) {
        ctx.set_entity_state(
            EntityState::Fault,
            &format!("resource initialisation: {}", e),
        );
        task.on_resource_release(ctx);
        return;
    }

    task.on_update_parameters(ctx);

    ctx.set_entity_state(EntityState::Normal, "boot complete");
    task.on_activation(ctx);

    // Main loop
    let period = task.tick_period().map(Duration::from_secs_f64);
    let mut next_tick = period.map(|p| Instant::now() + p);

    while !ctx.stopping() {
        // Wait for messages up to the next tick deadline
        let timeout = match next_tick {
            Some(t) => t
                .saturating_duration_since(Instant::now())
                .max(Duration::from_secs_f64(MIN_WAIT_S))
                .min(Duration::from_secs_f64(MAX_WAIT_S)),
            None => Duration::from_secs_f64(MAX_WAIT_S),
        };

        if let Some(msg) = mailbox.recv(timeout) {
            task.consume(ctx, &msg);

            // Drain whatever else is pending without blocking, so a burst
            // does not cost one wait per message
            while let Some(msg) = mailbox.try_recv() {
                if ctx.stopping() {
                    break;
                }
                task.consume(ctx, &msg);
            }
        }

        // Fire the tick if it is due
        if let (Some(t), Some(p)) = (next_tick, period) {
            let now = Instant::now();
            if now >= t {
                task.tick(ctx);

                let mut next = t + p;

                // Catch up at most one period of backlog, folding the rest
                if now > next + p {
                    warn!(
                        "Task \"{}\" overran its tick period by {:.3} s",
                        ctx.name,
                        (now - t).as_secs_f64()
                    );
                    next = now;
                }

                next_tick = Some(next);
            }
        }
    }

    // Teardown in reverse order of boot
    task.on_deactivation(ctx);
    task.on_resource_release(ctx);
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
