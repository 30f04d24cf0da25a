//! Commit-order event delivery.
//!
//! A mutation takes a ticket while it still holds the store's write lock, so
//! tickets follow commit order. Delivery then waits for its ticket's turn with
//! the store lock released, which keeps observers free to read the store.
//!
//! A mutation made from inside an observer callback is delivered inline on
//! the delivering thread instead of waiting, otherwise it would wait on
//! itself.

use std::collections::BTreeSet;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

#[derive(Debug, Default)]
struct Turns {
    issued: u64,
    next: u64,
    /// Tickets finished ahead of `next` (nested deliveries).
    finished: BTreeSet<u64>,
    delivering: Option<ThreadId>,
}

impl Turns {
    fn finish(&mut self, ticket: u64) {
        if ticket != self.next {
            self.finished.insert(ticket);
            return;
        }
        self.next += 1;
        while self.finished.remove(&self.next) {
            self.next += 1;
        }
    }
}

/// Position of a committed mutation in the delivery order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Ticket(u64);

/// Serializes event delivery in ticket order.
#[derive(Debug, Default)]
pub(crate) struct DeliveryOrder {
    turns: Mutex<Turns>,
    turn_changed: Condvar,
}

impl DeliveryOrder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Reserve the next delivery slot. Call while holding the store's write lock.
    pub(crate) fn issue(&self) -> Ticket {
        let mut turns = self.lock();
        let ticket = Ticket(turns.issued);
        turns.issued += 1;
        ticket
    }

    /// Run `deliver` once every earlier ticket has been delivered.
    pub(crate) fn deliver<T>(&self, ticket: Ticket, deliver: impl FnOnce() -> T) -> T {
        let me = thread::current().id();
        let mut turns = self.lock();

        if turns.delivering == Some(me) {
            // Nested: raised by an observer of an earlier ticket.
            drop(turns);
            let _done = Finish {
                order: self,
                ticket,
                owns_turn: false,
            };
            return deliver();
        }

        while turns.next != ticket.0 {
            turns = self
                .turn_changed
                .wait(turns)
                .unwrap_or_else(PoisonError::into_inner);
        }
        turns.delivering = Some(me);
        drop(turns);

        let _done = Finish {
            order: self,
            ticket,
            owns_turn: true,
        };
        deliver()
    }

    fn lock(&self) -> MutexGuard<'_, Turns> {
        self.turns.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Marks a ticket delivered on drop, even if delivery unwinds.
struct Finish<'a> {
    order: &'a DeliveryOrder,
    ticket: Ticket,
    owns_turn: bool,
}

impl Drop for Finish<'_> {
    fn drop(&mut self) {
        let mut turns = self.order.lock();
        if self.owns_turn {
            turns.delivering = None;
        }
        turns.finish(self.ticket.0);
        drop(turns);
        self.order.turn_changed.notify_all();
    }
}
