//! # Message bus
//!
//! A process-wide typed publish/subscribe bus. Subscribers register a
//! bounded [`Mailbox`] for a set of message kinds; publishers dispatch
//! without knowing who is listening.
//!
//! # Guarantees
//!
//! - Fan-out is performed under a single registry lock, so a dispatch is
//!   observed by either all subscribers of the kind or none of them, and
//!   messages from a single publisher arrive at a given subscriber in
//!   publication order.
//! - Publishers never block. A full mailbox drops its oldest message and
//!   increments the mailbox's overflow counter.
//! - A panicking subscriber cannot poison the bus for others: poisoned
//!   locks are recovered and servicing continues.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::warn;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::msg::{Kind, Message};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Handle to the process-wide message bus. Cheap to clone, all clones share
/// the same subscriber registry.
#[derive(Clone)]
pub struct Bus {
    registry: Arc<Mutex<HashMap<Kind, Vec<Arc<MailboxInner>>>>>,
}

/// The receiving end of a bus subscription.
///
/// A mailbox holds an ordered, bounded queue of messages of the kinds it was
/// subscribed to.
pub struct Mailbox {
    inner: Arc<MailboxInner>,
}

/// State shared between a mailbox and the bus registry.
struct MailboxInner {
    /// Name of the owning task, used in overflow diagnostics.
    name: String,

    /// Maximum number of queued messages.
    capacity: usize,

    /// Pending messages, oldest first.
    queue: Mutex<VecDeque<Arc<Message>>>,

    /// Signalled when a message is queued.
    available: Condvar,

    /// Number of messages dropped due to overflow.
    overflows: AtomicU64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Bus {
    /// Create a new bus with no subscribers.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a new mailbox subscribed to the given kinds.
    ///
    /// `capacity` bounds the number of messages the mailbox will hold before
    /// dropping its oldest.
    pub fn subscribe(&self, name: &str, kinds: &[Kind], capacity: usize) -> Mailbox {
        let inner = Arc::new(MailboxInner {
            name: String::from(name),
            capacity,
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            available: Condvar::new(),
            overflows: AtomicU64::new(0),
        });

        let mailbox = Mailbox {
            inner: inner.clone(),
        };

        for kind in kinds {
            self.attach(&mailbox, *kind);
        }

        mailbox
    }

    /// Subscribe an existing mailbox to an additional kind. Idempotent.
    pub fn attach(&self, mailbox: &Mailbox, kind: Kind) {
        let mut registry = lock_recover(&self.registry);

        let subs = registry.entry(kind).or_insert_with(Vec::new);

        if !subs.iter().any(|s| Arc::ptr_eq(s, &mailbox.inner)) {
            subs.push(mailbox.inner.clone());
        }
    }

    /// Dispatch a message to every mailbox subscribed to its kind.
    ///
    /// The message is wrapped in a shared handle once and fanned out under
    /// the registry lock. Never blocks the caller.
    pub fn dispatch(&self, msg: Message) {
        let kind = msg.kind();
        let msg = Arc::new(msg);

        let registry = lock_recover(&self.registry);

        if let Some(subs) = registry.get(&kind) {
            for sub in subs {
                sub.push(msg.clone());
            }
        }
    }
}

impl Mailbox {
    /// Pop the oldest pending message, blocking for up to `timeout`.
    ///
    /// Returns `None` if the timeout expires with no message available.
    pub fn recv(&self, timeout: Duration) -> Option<Arc<Message>> {
        let deadline = Instant::now() + timeout;

        let mut queue = lock_recover(&self.inner.queue);

        loop {
            if let Some(msg) = queue.pop_front() {
                return Some(msg);
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }

            let (q, _) = self
                .inner
                .available
                .wait_timeout(queue, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            queue = q;
        }
    }

    /// Pop the oldest pending message without blocking.
    pub fn try_recv(&self) -> Option<Arc<Message>> {
        lock_recover(&self.inner.queue).pop_front()
    }

    /// Number of messages currently queued.
    pub fn len(&self) -> usize {
        lock_recover(&self.inner.queue).len()
    }

    /// Number of messages dropped due to overflow since subscription.
    pub fn overflow_count(&self) -> u64 {
        self.inner.overflows.load(Ordering::Relaxed)
    }

    /// Name of the owning task.
    pub fn name(&self) -> &str {
        &self.inner.name
    }
}

impl MailboxInner {
    /// Queue a message, dropping the oldest pending one on overflow.
    fn push(&self, msg: Arc<Message>) {
        let mut queue = lock_recover(&self.queue);

        if queue.len() >= self.capacity {
            queue.pop_front();

            let dropped = self.overflows.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(
                "Mailbox of \"{}\" overflowed, {} message(s) dropped so far",
                self.name, dropped
            );
        }

        queue.push_back(msg);
        self.available.notify_one();
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Lock a mutex, recovering the guard if a panicking holder poisoned it.
fn lock_recover<T>(mutex: &Mutex<T>) -> MutexGuard<T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
