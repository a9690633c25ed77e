//! Frame driver
//!
//! One host repaint callback is one tick:
//! input bindings -> animations -> colliders -> render -> reconcile -> next repaint.
//! That order is load-bearing: responders see post-movement state and the
//! render sees post-response state.
//!
//! Lifecycle: `Idle -> Running -> Stopped -> Running -> ...`, with `reset`
//! valid from anywhere. Domain code never calls the driver directly while a
//! tick is in progress; it sends [`Command`]s through a [`Lifecycle`] handle
//! and the driver drains them once the tick has rendered.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use crate::audio::SoundBoard;
use crate::collider::ColliderDispatch;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::input::InputBatcher;
use crate::scheduler::{AnimationScheduler, FiredSet, Millis};
use crate::store::StateStore;
use crate::vdom::{Backend, PatchStats, Reconciler, VNode};

/// Lifecycle command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Start,
    Stop,
    Reset,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Command::Start => "start",
            Command::Stop => "stop",
            Command::Reset => "reset",
        })
    }
}

impl FromStr for Command {
    type Err = EngineError;

    fn from_str(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "start" => Ok(Command::Start),
            "stop" | "pause" => Ok(Command::Stop),
            "reset" => Ok(Command::Reset),
            _ => Err(EngineError::UnknownCommand(name.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriverStatus {
    #[default]
    Idle,
    Running,
    Stopped,
}

#[derive(Debug, Default)]
struct LifecycleInner {
    queue: RefCell<VecDeque<Command>>,
    status: Cell<DriverStatus>,
    mounted: Cell<bool>,
}

/// Cloneable handle for sending lifecycle commands and reading status.
///
/// Safe to use from render-tree listeners, state subscribers, responders
/// and host event glue.
#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
    inner: Rc<LifecycleInner>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a command for the driver. Before mount this is reported and
    /// dropped.
    pub fn send(&self, command: Command) -> Result<()> {
        if !self.inner.mounted.get() {
            log::warn!("Not initialized: {command} ignored");
            return Err(EngineError::NotMounted(command));
        }
        self.inner.queue.borrow_mut().push_back(command);
        Ok(())
    }

    /// Queue a command by name
    pub fn task(&self, name: &str) -> Result<()> {
        let command = name.parse::<Command>().inspect_err(|err| {
            log::warn!("{err}");
        })?;
        self.send(command)
    }

    pub fn status(&self) -> DriverStatus {
        self.inner.status.get()
    }

    pub fn is_running(&self) -> bool {
        self.status() == DriverStatus::Running
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.mounted.get()
    }

    pub fn pending(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    fn take(&self) -> Option<Command> {
        self.inner.queue.borrow_mut().pop_front()
    }

    fn set_status(&self, status: DriverStatus) {
        self.inner.status.set(status);
    }

    pub(crate) fn set_mounted(&self) {
        self.inner.mounted.set(true);
    }
}

/// Handle of one requested repaint callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle(pub u64);

/// Host "call me before the next repaint" primitive.
///
/// When a requested frame comes due the host calls
/// [`FrameTarget::on_repaint`] with the handle and a monotonically
/// increasing timestamp in milliseconds. A cancelled handle must never be
/// delivered.
pub trait RepaintHost {
    fn request_frame(&mut self) -> FrameHandle;
    fn cancel_frame(&mut self, handle: FrameHandle);
}

/// Something a repaint host can deliver frames to
pub trait FrameTarget {
    fn on_repaint(&mut self, handle: FrameHandle, timestamp: f64) -> Result<FrameOutcome>;
}

#[derive(Debug, Default)]
struct ManualState {
    next_id: u64,
    pending: VecDeque<FrameHandle>,
    requested: Vec<FrameHandle>,
    cancelled: Vec<FrameHandle>,
}

/// Repaint host driven by hand: frames come due only when [`fire`](Self::fire)
/// is called. Clones share state, so a test can keep one as a spy while the
/// driver owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualRepaintHost {
    state: Rc<RefCell<ManualState>>,
}

impl ManualRepaintHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver the oldest pending frame to `target`.
    /// Returns `None` if nothing is pending.
    pub fn fire(
        &self,
        target: &mut impl FrameTarget,
        timestamp: f64,
    ) -> Option<Result<FrameOutcome>> {
        let handle = self.state.borrow_mut().pending.pop_front()?;
        Some(target.on_repaint(handle, timestamp))
    }

    pub fn pending(&self) -> Vec<FrameHandle> {
        self.state.borrow().pending.iter().copied().collect()
    }

    pub fn requested(&self) -> Vec<FrameHandle> {
        self.state.borrow().requested.clone()
    }

    pub fn cancelled(&self) -> Vec<FrameHandle> {
        self.state.borrow().cancelled.clone()
    }
}

impl RepaintHost for ManualRepaintHost {
    fn request_frame(&mut self) -> FrameHandle {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let handle = FrameHandle(state.next_id);
        state.pending.push_back(handle);
        state.requested.push(handle);
        handle
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        let mut state = self.state.borrow_mut();
        state.pending.retain(|pending| *pending != handle);
        state.cancelled.push(handle);
    }
}

/// What happened during one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub elapsed: Millis,
    /// Key listeners invoked
    pub inputs: usize,
    pub fired: FiredSet,
    /// Collider responders invoked
    pub responders: usize,
    pub patch: PatchStats,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// Stale handle, or the driver is not running
    Ignored,
    /// First frame after start: timestamp recorded, nothing applied
    Baseline,
    Ticked(TickReport),
}

/// Domain hooks run on lifecycle transitions
#[derive(Default)]
pub struct LifecycleHooks {
    pub on_start: Option<Box<dyn FnMut()>>,
    pub on_stop: Option<Box<dyn FnMut()>>,
}

/// Pure render function of the domain
pub type RenderFn<S> = Box<dyn Fn(&S) -> VNode>;

/// Orchestrates ticks over the session's components
pub struct FrameDriver<S, B: Backend, H: RepaintHost> {
    store: Rc<StateStore<S>>,
    input: Rc<InputBatcher>,
    scheduler: AnimationScheduler<S>,
    colliders: ColliderDispatch,
    reconciler: Reconciler<B>,
    render: RenderFn<S>,
    hooks: LifecycleHooks,
    host: H,
    sound: Option<Rc<dyn SoundBoard>>,
    lifecycle: Lifecycle,
    config: EngineConfig,
    pending: Option<FrameHandle>,
    last_timestamp: Option<f64>,
}

/// Everything a driver is assembled from
pub struct DriverParts<S, B: Backend, H: RepaintHost> {
    pub store: Rc<StateStore<S>>,
    pub input: Rc<InputBatcher>,
    pub scheduler: AnimationScheduler<S>,
    pub colliders: ColliderDispatch,
    pub reconciler: Reconciler<B>,
    pub render: RenderFn<S>,
    pub hooks: LifecycleHooks,
    pub host: H,
    pub sound: Option<Rc<dyn SoundBoard>>,
    pub lifecycle: Lifecycle,
    pub config: EngineConfig,
}

impl<S, B: Backend, H: RepaintHost> FrameDriver<S, B, H> {
    /// Assemble a driver and render the initial snapshot
    pub fn new(parts: DriverParts<S, B, H>) -> Self {
        let mut scheduler = parts.scheduler;
        scheduler.set_max_fires_per_tick(parts.config.max_fires_per_tick);
        parts.lifecycle.set_mounted();
        parts.lifecycle.set_status(DriverStatus::Idle);

        let mut driver = Self {
            store: parts.store,
            input: parts.input,
            scheduler,
            colliders: parts.colliders,
            reconciler: parts.reconciler,
            render: parts.render,
            hooks: parts.hooks,
            host: parts.host,
            sound: parts.sound,
            lifecycle: parts.lifecycle,
            config: parts.config,
            pending: None,
            last_timestamp: None,
        };
        driver.render();
        driver
    }

    pub fn status(&self) -> DriverStatus {
        self.lifecycle.status()
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    /// Begin ticking. No-op if already running.
    pub fn start(&mut self) -> Result<bool> {
        if self.is_running() {
            return Ok(false);
        }
        self.lifecycle.set_status(DriverStatus::Running);
        self.scheduler.run();
        if let Some(sound) = self.sounds_to_follow() {
            sound.resume(&[])?;
        }
        if let Some(on_start) = self.hooks.on_start.as_mut() {
            on_start();
        }
        self.render();
        self.last_timestamp = None;
        self.pending = Some(self.host.request_frame());
        log::info!("Engine started");
        Ok(true)
    }

    /// Stop ticking, cancel the pending repaint and render once more.
    /// No-op unless running.
    pub fn stop(&mut self) -> Result<bool> {
        if !self.is_running() {
            return Ok(false);
        }
        self.lifecycle.set_status(DriverStatus::Stopped);
        self.scheduler.stop();
        if let Some(sound) = self.sounds_to_follow() {
            sound.pause(&[])?;
        }
        if let Some(on_stop) = self.hooks.on_stop.as_mut() {
            on_stop();
        }
        if let Some(handle) = self.pending.take() {
            self.host.cancel_frame(handle);
        }
        self.render();
        log::info!("Engine stopped");
        Ok(true)
    }

    /// Stop if running, then restore the initial snapshot, rewind timers,
    /// drop held keys and render. Registrations survive.
    pub fn reset(&mut self) -> Result<()> {
        self.stop()?;
        self.store.reset_state();
        self.scheduler.reset()?;
        self.input.reset();
        if let Some(sound) = self.sounds_to_follow() {
            sound.reset();
        }
        self.lifecycle.set_status(DriverStatus::Idle);
        self.last_timestamp = None;
        self.render();
        log::info!("Engine reset");
        Ok(())
    }

    /// Apply one command; returns whether it changed anything
    pub fn dispatch(&mut self, command: Command) -> Result<bool> {
        match command {
            Command::Start => self.start(),
            Command::Stop => self.stop(),
            Command::Reset => self.reset().map(|_| true),
        }
    }

    /// Apply every queued command in send order
    pub fn pump_commands(&mut self) -> Result<usize> {
        let mut applied = 0;
        while let Some(command) = self.lifecycle.take() {
            self.dispatch(command)?;
            applied += 1;
        }
        Ok(applied)
    }

    /// Render the current snapshot and reconcile the output tree
    pub fn render(&mut self) -> PatchStats {
        let snapshot = self.store.snapshot();
        let tree = (self.render)(&snapshot);
        self.reconciler.patch(&tree)
    }

    /// One full tick with the given elapsed time, independent of the host.
    ///
    /// Does not look at the lifecycle status and does not schedule anything.
    pub fn tick(&mut self, elapsed: Millis) -> Result<TickReport> {
        let inputs = self.input.apply_key_bindings();
        let fired = if self.scheduler.is_running() {
            self.scheduler.apply_animations(elapsed)?
        } else {
            FiredSet::default()
        };
        let responders = self.colliders.dispatch(&fired);
        let patch = self.render();

        let report = TickReport {
            elapsed,
            inputs,
            fired,
            responders,
            patch,
        };
        log::debug!(
            "Tick {:.1} ms: {} inputs, fired {:?}, {} responders, {} mutations",
            report.elapsed,
            report.inputs,
            report.fired.iter().collect::<Vec<_>>(),
            report.responders,
            report.patch.mutations()
        );
        Ok(report)
    }

    pub fn store(&self) -> &Rc<StateStore<S>> {
        &self.store
    }

    pub fn input(&self) -> &Rc<InputBatcher> {
        &self.input
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn scheduler(&self) -> &AnimationScheduler<S> {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut AnimationScheduler<S> {
        &mut self.scheduler
    }

    pub fn colliders(&self) -> &ColliderDispatch {
        &self.colliders
    }

    pub fn reconciler(&self) -> &Reconciler<B> {
        &self.reconciler
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Handle of the repaint currently awaited, if any
    pub fn pending_frame(&self) -> Option<FrameHandle> {
        self.pending
    }

    fn sounds_to_follow(&self) -> Option<&Rc<dyn SoundBoard>> {
        if self.config.pause_sounds_on_stop {
            self.sound.as_ref()
        } else {
            None
        }
    }
}

impl<S, B: Backend, H: RepaintHost> FrameTarget for FrameDriver<S, B, H> {
    fn on_repaint(&mut self, handle: FrameHandle, timestamp: f64) -> Result<FrameOutcome> {
        if self.pending != Some(handle) {
            log::warn!("Stale repaint {:?} ignored", handle);
            return Ok(FrameOutcome::Ignored);
        }
        self.pending = None;
        if !self.is_running() {
            return Ok(FrameOutcome::Ignored);
        }

        let outcome = match self.last_timestamp.replace(timestamp) {
            None => FrameOutcome::Baseline,
            Some(last) => {
                let elapsed = self.config.clamp_elapsed(timestamp - last);
                match self.tick(elapsed) {
                    Ok(report) => FrameOutcome::Ticked(report),
                    Err(err) => {
                        log::error!("Tick failed, run halted: {err}");
                        self.lifecycle.set_status(DriverStatus::Stopped);
                        return Err(err);
                    }
                }
            }
        };

        // Commands raised by the tick, or by start hooks before the baseline.
        self.pump_commands()?;
        if self.is_running() && self.pending.is_none() {
            self.pending = Some(self.host.request_frame());
        }
        Ok(outcome)
    }
}

impl<S, B: Backend, H: RepaintHost> fmt::Debug for FrameDriver<S, B, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameDriver")
            .field("status", &self.status())
            .field("scheduler", &self.scheduler)
            .field("colliders", &self.colliders.len())
            .field("pending", &self.pending)
            .field("last_timestamp", &self.last_timestamp)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_names() {
        assert_eq!("start".parse::<Command>(), Ok(Command::Start));
        assert_eq!("Pause".parse::<Command>(), Ok(Command::Stop));
        assert_eq!(Command::Reset.to_string(), "reset");
        assert_eq!(
            "launch".parse::<Command>(),
            Err(EngineError::UnknownCommand("launch".into()))
        );
    }

    #[test]
    fn test_send_before_mount_is_reported() {
        let lifecycle = Lifecycle::new();
        assert_eq!(
            lifecycle.send(Command::Start),
            Err(EngineError::NotMounted(Command::Start))
        );
        assert_eq!(lifecycle.pending(), 0);

        lifecycle.set_mounted();
        lifecycle.send(Command::Start).unwrap();
        assert!(matches!(lifecycle.task("jump"), Err(EngineError::UnknownCommand(_))));
        assert_eq!(lifecycle.pending(), 1);
    }

    #[test]
    fn test_manual_host_never_delivers_cancelled() {
        let mut host = ManualRepaintHost::new();
        let spy = host.clone();
        let first = host.request_frame();
        let second = host.request_frame();
        host.cancel_frame(first);

        assert_eq!(spy.pending(), vec![second]);
        assert_eq!(spy.cancelled(), vec![first]);
        assert_eq!(spy.requested().len(), 2);
    }
}
