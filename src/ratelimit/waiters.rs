//! Registry of callers suspended on the limiter.

use std::collections::BTreeMap;
use tokio::sync::oneshot;

/// Opaque identity handed to a caller for the duration of one suspension.
///
/// Tickets are issued from a monotonic counter, so ordering tickets orders
/// waiters by when they suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);

impl std::fmt::Display for Ticket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Pending wake handles keyed by ticket, in suspension order.
///
/// An entry holds `None` once it has been woken but before its owner has
/// resumed and removed it.
#[derive(Debug, Default)]
pub struct WaiterRegistry {
    waiters: BTreeMap<Ticket, Option<oneshot::Sender<()>>>,
    next_ticket: u64,
}

impl WaiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new waiter at the back of the queue.
    pub fn register(&mut self) -> (Ticket, oneshot::Receiver<()>) {
        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;

        let (tx, rx) = oneshot::channel();
        self.waiters.insert(ticket, Some(tx));
        (ticket, rx)
    }

    /// Wake the earliest waiter that has not been woken yet.
    ///
    /// Returns the ticket that was woken, if any.
    pub fn wake_first(&mut self) -> Option<Ticket> {
        for (ticket, slot) in self.waiters.iter_mut() {
            let Some(tx) = slot.take() else {
                continue;
            };
            // A closed receiver means the owner went away without cleaning up.
            if tx.send(()).is_ok() {
                return Some(*ticket);
            }
        }
        None
    }

    /// Remove a waiter by ticket.
    ///
    /// Returns `false` when the ticket was already removed.
    pub fn remove(&mut self, ticket: Ticket) -> bool {
        self.waiters.remove(&ticket).is_some()
    }

    /// Number of registered waiters, woken or not.
    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}
