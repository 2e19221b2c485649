//! The change batch coordinator.
//!
//! Every write is wrapped in a reentrant batch scope: a depth counter
//! increments on entry, and nested writes (from mutators or observer
//! callbacks) join the outer scope instead of flushing on their own. When
//! the outermost scope completes, every accumulated subscriber is notified
//! exactly once and the accumulator is cleared, so observers never see a
//! transient intermediate state of a multi-path write.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::debug;

use crate::observer::{Subscriber, SubscriberSet};

#[derive(Default)]
pub(crate) struct Batch {
    depth: Cell<usize>,
    pending: RefCell<Vec<Rc<dyn Subscriber>>>,
}

impl Batch {
    /// Enter a batch scope. Paired with [`leave`](Self::leave).
    pub fn enter(&self) {
        self.depth.set(self.depth.get() + 1);
    }

    /// Queue a subscriber for the next flush. Duplicates are dropped, so a
    /// subscriber touched through several paths in one operation fires once.
    pub fn queue(&self, subscriber: &Rc<dyn Subscriber>) {
        let mut pending = self.pending.borrow_mut();
        if !pending.iter().any(|s| Rc::ptr_eq(s, subscriber)) {
            pending.push(subscriber.clone());
        }
    }

    /// Queue every subscriber in a set.
    pub fn queue_set(&self, set: &SubscriberSet) {
        for subscriber in set.iter() {
            self.queue(subscriber);
        }
    }

    /// Leave a batch scope, flushing if this closes the outermost one.
    ///
    /// The flush drains repeatedly: notified observers may write back into
    /// the store, and those writes enqueue into this still-open batch and
    /// are delivered before the flush returns.
    pub fn leave(&self) {
        if self.depth.get() == 1 {
            loop {
                let drained = std::mem::take(&mut *self.pending.borrow_mut());
                if drained.is_empty() {
                    break;
                }
                debug!(count = drained.len(), "flushing change batch");
                for subscriber in drained {
                    subscriber.invalidate();
                }
            }
        }
        self.depth.set(self.depth.get() - 1);
    }
}
