//! Polling input batcher
//!
//! Raw press/release events only maintain the set of held keys. Bound
//! actions run once per frame from [`InputBatcher::apply_key_bindings`], so a
//! key held across N frames fires its listeners N times.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Action bound to a key
pub type KeyListener = Rc<dyn Fn()>;

/// Held keys and their bindings.
///
/// Methods take `&self` so that key listeners and host event glue can share
/// one batcher through an `Rc` while a frame is in progress.
#[derive(Default)]
pub struct InputBatcher {
    held: RefCell<Vec<String>>,
    bindings: RefCell<HashMap<String, Vec<KeyListener>>>,
}

impl InputBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `listener` to `key`; listeners on one key fire in bind order
    pub fn bind(&self, key: impl Into<String>, listener: impl Fn() + 'static) {
        self.bindings
            .borrow_mut()
            .entry(key.into())
            .or_default()
            .push(Rc::new(listener));
    }

    /// Raw press event. Pressing a held key is a no-op.
    pub fn press(&self, key: &str) {
        let mut held = self.held.borrow_mut();
        if !held.iter().any(|k| k == key) {
            held.push(key.to_string());
        }
    }

    /// Raw release event. Releasing a key that is not held is a no-op.
    pub fn release(&self, key: &str) {
        let mut held = self.held.borrow_mut();
        if let Some(index) = held.iter().position(|k| k == key) {
            held.remove(index);
        }
    }

    /// Drop every held key (menu transitions, focus loss)
    pub fn reset(&self) {
        self.held.borrow_mut().clear();
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.held.borrow().iter().any(|k| k == key)
    }

    /// Held keys in press order
    pub fn held_keys(&self) -> Vec<String> {
        self.held.borrow().clone()
    }

    /// Fire the listeners of every held key, keys in press order.
    ///
    /// Returns the number of listeners invoked.
    pub fn apply_key_bindings(&self) -> usize {
        // Listeners may press, release or reset; iterate a copy.
        let held = self.held_keys();
        let mut fired = 0;
        for key in &held {
            let listeners = match self.bindings.borrow().get(key) {
                Some(listeners) => listeners.clone(),
                None => continue,
            };
            for listener in listeners {
                listener();
                fired += 1;
            }
        }
        fired
    }
}

impl std::fmt::Debug for InputBatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputBatcher")
            .field("held", &self.held.borrow())
            .field("bound_keys", &self.bindings.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counter() -> (Rc<Cell<u32>>, impl Fn() + 'static) {
        let count = Rc::new(Cell::new(0));
        let inner = count.clone();
        (count, move || inner.set(inner.get() + 1))
    }

    #[test]
    fn test_held_key_fires_every_frame() {
        let input = InputBatcher::new();
        let (count, listener) = counter();
        input.bind("Space", listener);

        input.press("Space");
        for _ in 0..3 {
            input.apply_key_bindings();
        }
        assert_eq!(count.get(), 3);
    }

    #[test]
    fn test_duplicate_press_is_idempotent() {
        let input = InputBatcher::new();
        let (count, listener) = counter();
        input.bind("ArrowLeft", listener);

        input.press("ArrowLeft");
        input.press("ArrowLeft");
        assert_eq!(input.held_keys().len(), 1);
        input.apply_key_bindings();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_release_unheld_key_is_noop() {
        let input = InputBatcher::new();
        input.press("KeyA");
        input.release("KeyB");
        assert_eq!(input.held_keys(), vec!["KeyA".to_string()]);

        input.release("KeyA");
        assert!(!input.is_held("KeyA"));
    }

    #[test]
    fn test_firing_order_follows_press_then_bind_order() {
        let input = InputBatcher::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for (key, tag) in [("KeyA", "a1"), ("KeyB", "b1"), ("KeyA", "a2")] {
            let sink = log.clone();
            input.bind(key, move || sink.borrow_mut().push(tag));
        }

        input.press("KeyB");
        input.press("KeyA");
        input.apply_key_bindings();
        assert_eq!(*log.borrow(), vec!["b1", "a1", "a2"]);
    }

    #[test]
    fn test_unbound_held_key_is_ignored() {
        let input = InputBatcher::new();
        input.press("Escape");
        assert_eq!(input.apply_key_bindings(), 0);
    }

    #[test]
    fn test_reset_clears_held_keys() {
        let input = Rc::new(InputBatcher::new());
        let (count, listener) = counter();
        input.bind("ArrowRight", listener);

        input.press("ArrowRight");
        input.reset();
        input.apply_key_bindings();
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn test_listener_may_reset_mid_frame() {
        let input = Rc::new(InputBatcher::new());
        let weak = Rc::downgrade(&input);
        input.bind("Enter", move || {
            if let Some(input) = weak.upgrade() {
                input.reset();
            }
        });
        let (count, listener) = counter();
        input.bind("KeyX", listener);

        input.press("Enter");
        input.press("KeyX");
        input.apply_key_bindings();
        // KeyX was held when the frame began, so it still fires once.
        assert_eq!(count.get(), 1);
        assert!(input.held_keys().is_empty());
    }
}
