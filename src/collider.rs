//! Collision/response dispatch
//!
//! Colliders attach consequences to animations: after the scheduler advances,
//! every collider watching at least one animation that fired runs its
//! responder once, in registration order. Responders read the snapshot as it
//! stands after all animations for the tick have fired.

use std::rc::Rc;

use crate::scheduler::FiredSet;

/// Responder invoked when a watched animation fires
pub type Responder = Rc<dyn Fn()>;

pub struct Collider {
    watched: Vec<String>,
    responder: Responder,
}

impl Collider {
    pub fn new<I, T>(watched: I, responder: impl Fn() + 'static) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut ids: Vec<String> = Vec::new();
        for id in watched {
            let id = id.into();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Self {
            watched: ids,
            responder: Rc::new(responder),
        }
    }

    pub fn watched(&self) -> &[String] {
        &self.watched
    }

    fn is_triggered_by(&self, fired: &FiredSet) -> bool {
        self.watched.iter().any(|id| fired.contains(id))
    }
}

impl std::fmt::Debug for Collider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collider")
            .field("watched", &self.watched)
            .finish()
    }
}

/// Append-only collider registry
#[derive(Debug, Default)]
pub struct ColliderDispatch {
    colliders: Vec<Collider>,
}

impl ColliderDispatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a collider. One with an empty watch set never fires.
    pub fn add(&mut self, collider: Collider) {
        if collider.watched.is_empty() {
            log::warn!("Collider registered with no watched animations; it will never fire");
        }
        self.colliders.push(collider);
    }

    pub fn len(&self) -> usize {
        self.colliders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colliders.is_empty()
    }

    /// Run every collider triggered by `fired`, each at most once.
    ///
    /// Returns the number of responders invoked.
    pub fn dispatch(&self, fired: &FiredSet) -> usize {
        if fired.is_empty() {
            return 0;
        }
        let due: Vec<Responder> = self
            .colliders
            .iter()
            .filter(|c| c.is_triggered_by(fired))
            .map(|c| Rc::clone(&c.responder))
            .collect();
        for responder in &due {
            responder();
        }
        due.len()
    }
}
