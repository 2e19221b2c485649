//! The boundary to the ambient reactive-computation runtime.
//!
//! The store never owns reactive computations. It asks an
//! [`ObserverContext`] whether a computation is currently tracking reads,
//! registers the subscriber it hands back, and calls
//! [`Subscriber::invalidate`] from the batch flush when a tracked path
//! actually changed. The context is an explicit handle given to the store
//! at construction, never an implicit global, so reactivity is opt-in and
//! testable.

use std::cell::RefCell;
use std::rc::Rc;

/// A registered interest owned by the ambient reactive runtime.
///
/// The store calls [`invalidate`](Subscriber::invalidate) exactly once per
/// batch for every subscription whose observed value (or equality verdict,
/// or existence) changed.
pub trait Subscriber {
    /// Notify the owning computation that an observed value changed.
    fn invalidate(&self);
}

/// The ambient "is a reactive computation active?" query.
///
/// Consulted synchronously at the start of every read; the returned
/// subscriber is registered on the dependency node the read touched.
pub trait ObserverContext {
    /// The subscriber for the currently running computation, if any.
    fn active(&self) -> Option<Rc<dyn Subscriber>>;
}

/// A context with no reactive runtime: reads never register subscriptions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullContext;

impl ObserverContext for NullContext {
    fn active(&self) -> Option<Rc<dyn Subscriber>> {
        None
    }
}

/// A minimal stack-based observer context.
///
/// Embeddings (and this crate's tests) push a subscriber for the duration
/// of a computation; reads performed inside [`observe`](Self::observe) are
/// registered against it. Nested computations shadow outer ones.
#[derive(Default)]
pub struct TrackingScope {
    stack: RefCell<Vec<Rc<dyn Subscriber>>>,
}

impl TrackingScope {
    /// Create a new scope with no active computation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with `subscriber` as the active computation. The subscriber
    /// is popped even if `f` panics, so an unwound computation never stays
    /// active.
    pub fn observe<R>(&self, subscriber: Rc<dyn Subscriber>, f: impl FnOnce() -> R) -> R {
        self.stack.borrow_mut().push(subscriber);
        let _pop = PopOnDrop { stack: &self.stack };
        f()
    }
}

struct PopOnDrop<'a> {
    stack: &'a RefCell<Vec<Rc<dyn Subscriber>>>,
}

impl Drop for PopOnDrop<'_> {
    fn drop(&mut self) {
        self.stack.borrow_mut().pop();
    }
}

impl ObserverContext for TrackingScope {
    fn active(&self) -> Option<Rc<dyn Subscriber>> {
        self.stack.borrow().last().cloned()
    }
}

/// A set of subscribers, deduplicated by identity.
#[derive(Default)]
pub(crate) struct SubscriberSet {
    subs: Vec<Rc<dyn Subscriber>>,
}

impl SubscriberSet {
    pub fn add(&mut self, subscriber: &Rc<dyn Subscriber>) {
        if !self.subs.iter().any(|s| Rc::ptr_eq(s, subscriber)) {
            self.subs.push(subscriber.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<dyn Subscriber>> {
        self.subs.iter()
    }
}
