//! Platform abstraction layer
//!
//! Browser glue lives in [`web`] (`wasm32` only):
//! - requestAnimationFrame repaint host
//! - DOM output backend
//! - Keyboard listener feeding the input batcher
//! - `HtmlAudioElement` sound board
//!
//! Native builds drive the engine with
//! [`ManualRepaintHost`](crate::driver::ManualRepaintHost) and
//! [`MemoryBackend`](crate::vdom::MemoryBackend) instead.

#[cfg(target_arch = "wasm32")]
pub mod web;
