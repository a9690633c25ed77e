//! Arcade Engine - frame-driven simulation with a diffed render tree
//!
//! Core modules:
//! - `store`: Immutable snapshot store with transform-based updates
//! - `input`: Held-key tracking, bindings polled once per frame
//! - `scheduler`: Named timers, each with its own state-dependent rate
//! - `collider`: Responders run after watched animations fire
//! - `vdom`: Declarative tree, reconciler and output backends
//! - `driver`: Tick orchestration and start/stop/reset lifecycle
//! - `engine`: Per-session context that mounts into a driver
//! - `audio`: Sound contract addressed by id
//! - `platform`: Browser glue (requestAnimationFrame, DOM, keyboard, audio)

pub mod audio;
pub mod collider;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod input;
pub mod platform;
pub mod scheduler;
pub mod store;
pub mod vdom;

pub use audio::{MemorySoundBoard, SoundBoard, SoundSettings};
pub use collider::{Collider, ColliderDispatch};
pub use config::EngineConfig;
pub use driver::{
    Command, DriverStatus, FrameDriver, FrameHandle, FrameOutcome, FrameTarget, Lifecycle,
    ManualRepaintHost, RepaintHost, TickReport,
};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use input::InputBatcher;
pub use scheduler::{Animation, AnimationScheduler, FiredSet, Millis, constant};
pub use store::StateStore;
pub use vdom::{Backend, Element, MemoryBackend, VNode, h, text};
