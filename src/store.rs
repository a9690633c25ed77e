//! Immutable snapshot store
//!
//! Exactly one snapshot is current at any instant. Mutation happens only by
//! applying a transform `&Rc<S> -> Rc<S>`; a transform that returns the same
//! `Rc` (e.g. `Rc::clone(s)`) is a no-op and notifies nobody. Change
//! detection is pointer identity, never deep equality.

use std::cell::RefCell;
use std::rc::Rc;

/// Subscriber invoked with the new snapshot after every effective change
pub type Subscriber<S> = Rc<dyn Fn(&Rc<S>)>;

pub struct StateStore<S> {
    current: RefCell<Rc<S>>,
    initial: Box<dyn Fn() -> S>,
    subscribers: RefCell<Vec<Subscriber<S>>>,
}

impl<S> StateStore<S> {
    /// Create a store whose first snapshot comes from `initial`.
    ///
    /// `initial` is kept and called again on every [`reset_state`](Self::reset_state).
    pub fn new(initial: impl Fn() -> S + 'static) -> Self {
        let first = Rc::new(initial());
        Self {
            current: RefCell::new(first),
            initial: Box::new(initial),
            subscribers: RefCell::new(Vec::new()),
        }
    }

    /// Read a projection of the current snapshot
    pub fn get_state<R>(&self, selector: impl FnOnce(&S) -> R) -> R {
        let current = self.snapshot();
        selector(&current)
    }

    /// Handle to the current snapshot
    pub fn snapshot(&self) -> Rc<S> {
        Rc::clone(&self.current.borrow())
    }

    /// Replace the current snapshot with `transform(current)`.
    ///
    /// Returns true if the snapshot changed. Subscribers run synchronously
    /// before this returns; there is no batching across calls.
    pub fn set_state(&self, transform: impl FnOnce(&Rc<S>) -> Rc<S>) -> bool {
        let previous = self.snapshot();
        let next = transform(&previous);
        if Rc::ptr_eq(&previous, &next) {
            return false;
        }
        *self.current.borrow_mut() = Rc::clone(&next);
        self.notify(&next);
        true
    }

    /// Install a freshly computed initial snapshot.
    ///
    /// Registrations held by other components are untouched.
    pub fn reset_state(&self) {
        let fresh = Rc::new((self.initial)());
        *self.current.borrow_mut() = Rc::clone(&fresh);
        self.notify(&fresh);
    }

    /// Register a callback for every effective change
    pub fn on_state_change(&self, subscriber: impl Fn(&Rc<S>) + 'static) {
        self.subscribers.borrow_mut().push(Rc::new(subscriber));
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }

    fn notify(&self, snapshot: &Rc<S>) {
        // Subscribers may themselves call set_state or on_state_change.
        let subscribers: Vec<Subscriber<S>> = self.subscribers.borrow().clone();
        for subscriber in subscribers {
            subscriber(snapshot);
        }
    }
}

impl<S: std::fmt::Debug> std::fmt::Debug for StateStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("current", &self.current.borrow())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
