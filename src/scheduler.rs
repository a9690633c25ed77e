//! Multi-rate animation scheduler
//!
//! Each registered animation owns a countdown timer. Advancing the scheduler
//! subtracts elapsed wall time from every timer; a timer at or below zero
//! fires its update and is reloaded with `+= velocity(state)`. Reloading by
//! accumulation keeps the overshoot, so the long-run firing rate matches the
//! velocity however the elapsed time is chunked.

use std::rc::Rc;

use crate::error::{EngineError, Result};
use crate::store::StateStore;

/// Milliseconds, matching the host's repaint timestamps
pub type Millis = f64;

/// Shortest accepted interval. Bounds the catch-up loop of one advance to
/// `elapsed / MIN_VELOCITY_MS` fires per animation.
pub const MIN_VELOCITY_MS: Millis = 1.0;

/// Interval between fires, recomputed from the live snapshot on every reload
pub type Velocity<S> = Rc<dyn Fn(&S) -> Millis>;

/// Velocity that ignores state
pub fn constant<S>(interval: Millis) -> impl Fn(&S) -> Millis + 'static {
    move |_| interval
}

/// A named, independently rated update
pub struct Animation<S> {
    pub id: String,
    pub velocity: Velocity<S>,
    pub update: Rc<dyn Fn()>,
}

impl<S> Animation<S> {
    pub fn new(
        id: impl Into<String>,
        velocity: impl Fn(&S) -> Millis + 'static,
        update: impl Fn() + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            velocity: Rc::new(velocity),
            update: Rc::new(update),
        }
    }
}

impl<S> Clone for Animation<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            velocity: Rc::clone(&self.velocity),
            update: Rc::clone(&self.update),
        }
    }
}

impl<S> std::fmt::Debug for Animation<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Animation").field("id", &self.id).finish()
    }
}

struct TimerEntry<S> {
    animation: Animation<S>,
    time_remaining: Millis,
}

/// Ids of the animations that fired during one advance, in firing order.
/// An animation that fired several times appears once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FiredSet {
    ids: Vec<String>,
}

impl FiredSet {
    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|fired| fired == id)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    fn insert(&mut self, id: &str) {
        if !self.contains(id) {
            self.ids.push(id.to_string());
        }
    }
}

/// Timer set, append-only for the lifetime of a session
pub struct AnimationScheduler<S> {
    store: Rc<StateStore<S>>,
    entries: Vec<TimerEntry<S>>,
    running: bool,
    max_fires_per_tick: Option<u32>,
}

impl<S> AnimationScheduler<S> {
    pub fn new(store: Rc<StateStore<S>>) -> Self {
        Self {
            store,
            entries: Vec::new(),
            running: true,
            max_fires_per_tick: None,
        }
    }

    /// Cap how many times one entry may fire inside a single advance.
    /// Unpaid overshoot stays in the timer and fires on later advances.
    pub fn set_max_fires_per_tick(&mut self, cap: Option<u32>) {
        self.max_fires_per_tick = cap;
    }

    /// Register an animation; its timer starts at `velocity(current)`
    pub fn add(&mut self, animation: Animation<S>) -> Result<()> {
        if self.contains(&animation.id) {
            return Err(EngineError::DuplicateAnimation(animation.id));
        }
        let time_remaining = self.interval(&animation)?;
        log::debug!(
            "Animation {} registered ({:.1} ms)",
            animation.id,
            time_remaining
        );
        self.entries.push(TimerEntry {
            animation,
            time_remaining,
        });
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.animation.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remaining time of an entry, if registered
    pub fn time_remaining(&self, id: &str) -> Option<Millis> {
        self.entries
            .iter()
            .find(|e| e.animation.id == id)
            .map(|e| e.time_remaining)
    }

    /// Entry ids ordered by their current velocity, ascending.
    /// Ties keep registration order. Diagnostic only: firing ignores it.
    pub fn by_velocity(&self) -> Vec<(String, Millis)> {
        let state = self.store.snapshot();
        let mut rated: Vec<(String, Millis)> = self
            .entries
            .iter()
            .map(|e| (e.animation.id.clone(), (e.animation.velocity)(&state)))
            .collect();
        rated.sort_by(|a, b| a.1.total_cmp(&b.1));
        rated
    }

    /// Advance every timer by `elapsed` and fire the due ones.
    ///
    /// Entries are processed in registration order. A due entry runs its
    /// update, then reloads from the post-update snapshot, repeating until
    /// its timer is positive again.
    pub fn apply_animations(&mut self, elapsed: Millis) -> Result<FiredSet> {
        let mut fired = FiredSet::default();
        let cap = self.max_fires_per_tick;

        for index in 0..self.entries.len() {
            self.entries[index].time_remaining -= elapsed;

            let mut fires = 0u32;
            while self.entries[index].time_remaining <= 0.0 {
                if cap.is_some_and(|cap| fires >= cap) {
                    break;
                }
                let animation = self.entries[index].animation.clone();
                (animation.update)();
                let reload = self.interval(&animation)?;
                self.entries[index].time_remaining += reload;
                fires += 1;
                fired.insert(&animation.id);
            }
        }

        Ok(fired)
    }

    /// Reload every timer from the current snapshot; registrations stay
    pub fn reset(&mut self) -> Result<()> {
        for index in 0..self.entries.len() {
            let interval = self.interval(&self.entries[index].animation)?;
            self.entries[index].time_remaining = interval;
        }
        Ok(())
    }

    pub fn run(&mut self) {
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    fn interval(&self, animation: &Animation<S>) -> Result<Millis> {
        let value = self.store.get_state(|s| (animation.velocity)(s));
        if value.is_finite() && value >= MIN_VELOCITY_MS {
            Ok(value)
        } else {
            Err(EngineError::InvalidVelocity {
                id: animation.id.clone(),
                value,
            })
        }
    }
}

impl<S> std::fmt::Debug for AnimationScheduler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let timers: Vec<(&str, Millis)> = self
            .entries
            .iter()
            .map(|e| (e.animation.id.as_str(), e.time_remaining))
            .collect();
        f.debug_struct("AnimationScheduler")
            .field("timers", &timers)
            .field("running", &self.running)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cell::Cell;

    #[derive(Debug)]
    struct World {
        targets: u32,
    }

    fn world(targets: u32) -> Rc<StateStore<World>> {
        Rc::new(StateStore::new(move || World { targets }))
    }

    fn counting(id: &str, interval: Millis) -> (Rc<Cell<u32>>, Animation<World>) {
        let count = Rc::new(Cell::new(0));
        let inner = count.clone();
        let animation = Animation::new(id, constant(interval), move || inner.set(inner.get() + 1));
        (count, animation)
    }

    #[test]
    fn test_overshoot_is_kept() {
        let mut scheduler = AnimationScheduler::new(world(0));
        let (count, animation) = counting("march", 100.0);
        scheduler.add(animation).unwrap();

        let fired = scheduler.apply_animations(250.0).unwrap();
        assert_eq!(count.get(), 2);
        assert_eq!(scheduler.time_remaining("march"), Some(50.0));
        assert!(fired.contains("march"));
        assert_eq!(fired.len(), 1);
    }

    #[test]
    fn test_not_due_does_not_fire() {
        let mut scheduler = AnimationScheduler::new(world(0));
        let (count, animation) = counting("slow", 100.0);
        scheduler.add(animation).unwrap();

        let fired = scheduler.apply_animations(99.0).unwrap();
        assert!(fired.is_empty());
        assert_eq!(count.get(), 0);

        // Exactly zero remaining is due.
        scheduler.apply_animations(1.0).unwrap();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_reload_uses_post_update_state() {
        let store = world(10);
        let mut scheduler = AnimationScheduler::new(store.clone());
        let updater = store.clone();
        scheduler
            .add(Animation::new(
                "invaders",
                |w: &World| 10.0 * w.targets as f64,
                move || {
                    updater.set_state(|w| {
                        Rc::new(World {
                            targets: w.targets - 1,
                        })
                    });
                },
            ))
            .unwrap();
        assert_eq!(scheduler.time_remaining("invaders"), Some(100.0));

        scheduler.apply_animations(100.0).unwrap();
        // Fired once; 9 targets remain, so the reload is 90 ms.
        assert_eq!(scheduler.time_remaining("invaders"), Some(90.0));
    }

    #[test]
    fn test_same_tick_fires_in_registration_order() {
        let store = world(0);
        let mut scheduler = AnimationScheduler::new(store);
        let log = Rc::new(std::cell::RefCell::new(Vec::new()));
        for (id, interval) in [("slow", 50.0), ("fast", 10.0)] {
            let sink = log.clone();
            scheduler
                .add(Animation::new(id, constant(interval), move || {
                    sink.borrow_mut().push(id)
                }))
                .unwrap();
        }

        scheduler.apply_animations(50.0).unwrap();
        let log = log.borrow();
        assert_eq!(log[0], "slow");
        assert!(log[1..].iter().all(|id| *id == "fast"));
        assert_eq!(
            scheduler
                .by_velocity()
                .iter()
                .map(|(id, _)| id.as_str())
                .collect::<Vec<_>>(),
            vec!["fast", "slow"]
        );
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut scheduler = AnimationScheduler::new(world(0));
        scheduler.add(counting("a", 10.0).1).unwrap();
        assert_eq!(
            scheduler.add(counting("a", 20.0).1),
            Err(EngineError::DuplicateAnimation("a".into()))
        );
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn test_invalid_velocity_rejected() {
        let mut scheduler = AnimationScheduler::new(world(0));
        let result = scheduler.add(counting("zero", 0.0).1);
        assert!(matches!(result, Err(EngineError::InvalidVelocity { .. })));
        let result = scheduler.add(counting("nan", f64::NAN).1);
        assert!(matches!(result, Err(EngineError::InvalidVelocity { .. })));
    }

    #[test]
    fn test_sub_millisecond_velocity_rejected() {
        let mut scheduler = AnimationScheduler::new(world(0));
        assert_eq!(
            scheduler.add(counting("blur", 1e-9).1),
            Err(EngineError::InvalidVelocity {
                id: "blur".into(),
                value: 1e-9,
            })
        );
        scheduler.add(counting("fastest", MIN_VELOCITY_MS).1).unwrap();
        scheduler.apply_animations(10.0).unwrap();
        assert_eq!(scheduler.time_remaining("fastest"), Some(1.0));
    }

    #[test]
    fn test_reload_below_minimum_fails_advance() {
        let store = world(1);
        let mut scheduler = AnimationScheduler::new(store.clone());
        let updater = store.clone();
        scheduler
            .add(Animation::new(
                "shrink",
                |w: &World| if w.targets > 0 { 100.0 } else { 0.5 },
                move || {
                    updater.set_state(|_| Rc::new(World { targets: 0 }));
                },
            ))
            .unwrap();

        assert_eq!(
            scheduler.apply_animations(100.0),
            Err(EngineError::InvalidVelocity {
                id: "shrink".into(),
                value: 0.5,
            })
        );
    }

    #[test]
    fn test_reset_reloads_timers() {
        let mut scheduler = AnimationScheduler::new(world(0));
        scheduler.add(counting("a", 100.0).1).unwrap();
        scheduler.apply_animations(70.0).unwrap();
        assert_eq!(scheduler.time_remaining("a"), Some(30.0));

        scheduler.reset().unwrap();
        assert_eq!(scheduler.time_remaining("a"), Some(100.0));
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn test_fire_cap_defers_overshoot() {
        let mut scheduler = AnimationScheduler::new(world(0));
        let (count, animation) = counting("a", 10.0);
        scheduler.add(animation).unwrap();
        scheduler.set_max_fires_per_tick(Some(2));

        scheduler.apply_animations(50.0).unwrap();
        assert_eq!(count.get(), 2);
        assert_eq!(scheduler.time_remaining("a"), Some(-20.0));

        scheduler.apply_animations(0.0).unwrap();
        scheduler.apply_animations(0.0).unwrap();
        assert_eq!(count.get(), 5);
        assert_eq!(scheduler.time_remaining("a"), Some(10.0));
    }

    #[test]
    fn test_run_stop_flag() {
        let mut scheduler = AnimationScheduler::new(world(0));
        assert!(scheduler.is_running());
        scheduler.stop();
        assert!(!scheduler.is_running());
        scheduler.run();
        assert!(scheduler.is_running());
    }

    proptest! {
        #[test]
        fn prop_fire_count_independent_of_chunking(
            interval in 5u32..200,
            chunks in prop::collection::vec(0u32..500, 1..60),
        ) {
            let mut scheduler = AnimationScheduler::new(world(0));
            let (count, animation) = counting("a", interval as f64);
            scheduler.add(animation).unwrap();

            let total: u32 = chunks.iter().sum();
            for chunk in &chunks {
                scheduler.apply_animations(*chunk as f64).unwrap();
            }

            let expected = (total / interval) as i64;
            let actual = count.get() as i64;
            prop_assert!((actual - expected).abs() <= 1,
                "fired {} times, expected about {}", actual, expected);
        }
    }
}
