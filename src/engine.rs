//! Per-session engine context
//!
//! [`Engine`] owns every registry of one simulation: the store, the input
//! batcher, the animation timers, the colliders, lifecycle hooks and the
//! optional sound board. Domain code registers against it, then
//! [`Engine::mount`] turns it into a [`FrameDriver`] bound to an output tree
//! and a repaint host. Nothing is global, so sessions never share state.

use std::rc::Rc;

use crate::audio::SoundBoard;
use crate::collider::{Collider, ColliderDispatch};
use crate::config::EngineConfig;
use crate::driver::{DriverParts, FrameDriver, Lifecycle, LifecycleHooks, RepaintHost};
use crate::error::{EngineError, Result};
use crate::input::InputBatcher;
use crate::scheduler::{Animation, AnimationScheduler};
use crate::store::StateStore;
use crate::vdom::{Backend, Reconciler, VNode};

pub struct Engine<S> {
    config: EngineConfig,
    store: Rc<StateStore<S>>,
    input: Rc<InputBatcher>,
    scheduler: AnimationScheduler<S>,
    colliders: ColliderDispatch,
    hooks: LifecycleHooks,
    sound: Option<Rc<dyn SoundBoard>>,
    lifecycle: Lifecycle,
}

impl<S: 'static> Engine<S> {
    pub fn new(initial: impl Fn() -> S + 'static) -> Self {
        Self::with_config(initial, EngineConfig::default())
    }

    pub fn with_config(initial: impl Fn() -> S + 'static, config: EngineConfig) -> Self {
        let store = Rc::new(StateStore::new(initial));
        Self {
            scheduler: AnimationScheduler::new(Rc::clone(&store)),
            store,
            config,
            input: Rc::new(InputBatcher::new()),
            colliders: ColliderDispatch::new(),
            hooks: LifecycleHooks::default(),
            sound: None,
            lifecycle: Lifecycle::new(),
        }
    }

    /// Shared store; clone it into update functions and responders
    pub fn store(&self) -> &Rc<StateStore<S>> {
        &self.store
    }

    pub fn input(&self) -> &Rc<InputBatcher> {
        &self.input
    }

    /// Command handle. Sends fail with `NotMounted` until [`mount`](Self::mount).
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &AnimationScheduler<S> {
        &self.scheduler
    }

    pub fn add_animation(&mut self, animation: Animation<S>) -> Result<()> {
        self.scheduler.add(animation)
    }

    /// Register a collider. Every watched id must already name an animation.
    pub fn add_collider(&mut self, collider: Collider) -> Result<()> {
        if let Some(missing) = collider
            .watched()
            .iter()
            .find(|id| !self.scheduler.contains(id))
        {
            return Err(EngineError::UnknownAnimation(missing.clone()));
        }
        self.colliders.add(collider);
        Ok(())
    }

    pub fn bind_key(&self, key: impl Into<String>, listener: impl Fn() + 'static) {
        self.input.bind(key, listener);
    }

    pub fn on_state_change(&self, subscriber: impl Fn(&Rc<S>) + 'static) {
        self.store.on_state_change(subscriber);
    }

    pub fn on_start(&mut self, hook: impl FnMut() + 'static) {
        self.hooks.on_start = Some(Box::new(hook));
    }

    pub fn on_stop(&mut self, hook: impl FnMut() + 'static) {
        self.hooks.on_stop = Some(Box::new(hook));
    }

    pub fn with_sound(&mut self, sound: Rc<dyn SoundBoard>) {
        self.sound = Some(sound);
    }

    /// Bind the session to an output tree and a repaint host.
    ///
    /// Renders the initial snapshot into `mount`; the driver starts idle.
    pub fn mount<B, H>(
        self,
        backend: B,
        mount: B::Node,
        host: H,
        render: impl Fn(&S) -> VNode + 'static,
    ) -> FrameDriver<S, B, H>
    where
        B: Backend,
        H: RepaintHost,
    {
        log::info!(
            "Mounting engine: {} animations, {} colliders",
            self.scheduler.len(),
            self.colliders.len()
        );
        FrameDriver::new(DriverParts {
            store: self.store,
            input: self.input,
            scheduler: self.scheduler,
            colliders: self.colliders,
            reconciler: Reconciler::new(backend, mount),
            render: Box::new(render),
            hooks: self.hooks,
            host,
            sound: self.sound,
            lifecycle: self.lifecycle,
            config: self.config,
        })
    }
}
