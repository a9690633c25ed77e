//! Browser host: requestAnimationFrame, DOM, keyboard and audio

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{Document, Element, HtmlAudioElement, HtmlElement, KeyboardEvent, Node};

use crate::audio::{SoundBoard, SoundSettings};
use crate::driver::{FrameHandle, FrameTarget, RepaintHost};
use crate::error::{EngineError, Result};
use crate::input::InputBatcher;
use crate::vdom::{Backend, Listener};

type TargetSlot = Rc<RefCell<Option<Weak<RefCell<dyn FrameTarget>>>>>;

/// Repaint host backed by `window.requestAnimationFrame`.
///
/// The driver owns the host, so the host only keeps a weak handle back to
/// the driver; call [`bind`](Self::bind) once the driver is shared.
#[derive(Clone, Default)]
pub struct WebRepaintHost {
    target: TargetSlot,
}

impl WebRepaintHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, target: Weak<RefCell<dyn FrameTarget>>) {
        *self.target.borrow_mut() = Some(target);
    }
}

fn deliver(slot: &TargetSlot, handle: FrameHandle, timestamp: f64) {
    let Some(target) = slot.borrow().as_ref().and_then(Weak::upgrade) else {
        log::warn!("Repaint {:?} has no driver bound", handle);
        return;
    };
    let Ok(mut driver) = target.try_borrow_mut() else {
        log::warn!("{}", EngineError::Busy);
        return;
    };
    if let Err(err) = driver.on_repaint(handle, timestamp) {
        log::error!("Frame failed: {err}");
    }
}

impl RepaintHost for WebRepaintHost {
    fn request_frame(&mut self) -> FrameHandle {
        let slot = Rc::clone(&self.target);
        let id = Rc::new(Cell::new(0u64));
        let callback_id = Rc::clone(&id);
        // Frees itself after the single call; a cancelled one is never called.
        let callback = Closure::once_into_js(move |timestamp: f64| {
            deliver(&slot, FrameHandle(callback_id.get()), timestamp);
        });

        let requested = web_sys::window()
            .ok_or_else(|| JsValue::from_str("no window"))
            .and_then(|w| w.request_animation_frame(callback.unchecked_ref::<js_sys::Function>()));
        match requested {
            Ok(raf) => id.set(raf as u64),
            Err(err) => log::error!("requestAnimationFrame failed: {:?}", err),
        }
        FrameHandle(id.get())
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        if let Some(window) = web_sys::window() {
            let _ = window.cancel_animation_frame(handle.0 as i32);
        }
    }
}

/// Hook run after every DOM event handled by a render-tree listener.
///
/// Set it once the driver exists, typically to drain queued lifecycle
/// commands.
#[derive(Clone, Default)]
pub struct EventPump {
    hook: Rc<RefCell<Option<Rc<dyn Fn()>>>>,
}

impl EventPump {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, hook: impl Fn() + 'static) {
        *self.hook.borrow_mut() = Some(Rc::new(hook));
    }

    fn run(&self) {
        let hook = self.hook.borrow().clone();
        if let Some(hook) = hook {
            hook();
        }
    }
}

struct DomListener {
    node: Node,
    event: String,
    closure: Closure<dyn FnMut(web_sys::Event)>,
}

/// Output backend writing to the live DOM
pub struct DomBackend {
    document: Document,
    listeners: Vec<DomListener>,
    pump: EventPump,
}

impl DomBackend {
    pub fn new(document: Document, pump: EventPump) -> Self {
        Self {
            document,
            listeners: Vec::new(),
            pump,
        }
    }

    /// Drop listener closures attached anywhere inside `subtree`
    fn forget_listeners(&mut self, subtree: &Node) {
        self.listeners.retain(|l| {
            let inside = subtree.contains(Some(&l.node));
            if inside {
                let _ = l
                    .node
                    .remove_event_listener_with_callback(&l.event, l.closure.as_ref().unchecked_ref());
            }
            !inside
        });
    }
}

impl Backend for DomBackend {
    type Node = Node;

    fn create_element(&mut self, tag: &str) -> Node {
        match self.document.create_element(tag) {
            Ok(element) => element.into(),
            Err(err) => {
                log::error!("Cannot create <{tag}>: {:?}", err);
                self.document.create_comment(tag).into()
            }
        }
    }

    fn create_text(&mut self, content: &str) -> Node {
        self.document.create_text_node(content).into()
    }

    fn set_text(&mut self, node: &Node, content: &str) {
        node.set_text_content(Some(content));
    }

    fn set_attribute(&mut self, node: &Node, name: &str, value: &str) {
        if let Some(element) = node.dyn_ref::<Element>() {
            if let Err(err) = element.set_attribute(name, value) {
                log::warn!("Cannot set attribute {name}: {:?}", err);
            }
        }
    }

    fn remove_attribute(&mut self, node: &Node, name: &str) {
        if let Some(element) = node.dyn_ref::<Element>() {
            let _ = element.remove_attribute(name);
        }
    }

    fn set_style(&mut self, node: &Node, name: &str, value: &str) {
        if let Some(element) = node.dyn_ref::<HtmlElement>() {
            let _ = element.style().set_property(name, value);
        }
    }

    fn remove_style(&mut self, node: &Node, name: &str) {
        if let Some(element) = node.dyn_ref::<HtmlElement>() {
            let _ = element.style().remove_property(name);
        }
    }

    fn add_listener(&mut self, node: &Node, event: &str, listener: &Listener) {
        self.remove_listener(node, event);

        let listener = Rc::clone(listener);
        let pump = self.pump.clone();
        let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::Event| {
            listener();
            pump.run();
        });
        if let Err(err) =
            node.add_event_listener_with_callback(event, closure.as_ref().unchecked_ref())
        {
            log::warn!("Cannot listen for {event}: {:?}", err);
            return;
        }
        self.listeners.push(DomListener {
            node: node.clone(),
            event: event.to_string(),
            closure,
        });
    }

    fn remove_listener(&mut self, node: &Node, event: &str) {
        let Some(index) = self
            .listeners
            .iter()
            .position(|l| l.event == event && l.node.is_same_node(Some(node)))
        else {
            return;
        };
        let removed = self.listeners.remove(index);
        let _ = node
            .remove_event_listener_with_callback(event, removed.closure.as_ref().unchecked_ref());
    }

    fn append_child(&mut self, parent: &Node, child: &Node) {
        if let Err(err) = parent.append_child(child) {
            log::error!("append_child failed: {:?}", err);
        }
    }

    fn remove_child(&mut self, parent: &Node, child: &Node) {
        self.forget_listeners(child);
        let _ = parent.remove_child(child);
    }

    fn replace_child(&mut self, parent: &Node, old: &Node, new: &Node) {
        self.forget_listeners(old);
        if old.parent_node().is_some_and(|p| p.is_same_node(Some(parent))) {
            let _ = parent.replace_child(new, old);
        } else {
            let _ = parent.append_child(new);
        }
    }

    fn child_nodes(&self, node: &Node) -> Vec<Node> {
        let list = node.child_nodes();
        (0..list.length()).filter_map(|i| list.get(i)).collect()
    }
}

/// Feed window key events into `input`, keyed by `KeyboardEvent.code`.
/// Losing focus releases every key.
pub fn listen_keyboard(input: Rc<InputBatcher>) -> std::result::Result<(), JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;

    {
        let input = Rc::clone(&input);
        let closure = Closure::<dyn FnMut(_)>::new(move |event: KeyboardEvent| {
            input.press(&event.code());
        });
        window.add_event_listener_with_callback("keydown", closure.as_ref().unchecked_ref())?;
        closure.forget();
    }

    {
        let input = Rc::clone(&input);
        let closure = Closure::<dyn FnMut(_)>::new(move |event: KeyboardEvent| {
            input.release(&event.code());
        });
        window.add_event_listener_with_callback("keyup", closure.as_ref().unchecked_ref())?;
        closure.forget();
    }

    {
        let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::Event| {
            input.reset();
        });
        window.add_event_listener_with_callback("blur", closure.as_ref().unchecked_ref())?;
        closure.forget();
    }

    Ok(())
}

struct WebSound {
    element: HtmlAudioElement,
    settings: SoundSettings,
}

/// Sound board playing `HtmlAudioElement`s
pub struct AudioManager {
    sounds: RefCell<HashMap<String, WebSound>>,
    master_volume: Cell<f32>,
    muted: Cell<bool>,
}

impl Default for AudioManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioManager {
    pub fn new() -> Self {
        Self {
            sounds: RefCell::new(HashMap::new()),
            master_volume: Cell::new(0.8),
            muted: Cell::new(false),
        }
    }

    /// Set master volume (0.0 - 1.0)
    pub fn set_master_volume(&self, volume: f32) {
        self.master_volume.set(volume.clamp(0.0, 1.0));
        self.apply_volumes();
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.set(muted);
        self.apply_volumes();
    }

    fn effective_volume(&self, settings: &SoundSettings) -> f64 {
        if self.muted.get() {
            0.0
        } else {
            f64::from(self.master_volume.get() * settings.volume.clamp(0.0, 1.0))
        }
    }

    fn apply_volumes(&self) {
        for sound in self.sounds.borrow().values() {
            sound.element.set_volume(self.effective_volume(&sound.settings));
        }
    }

    fn with_sounds(&self, ids: &[&str], mut f: impl FnMut(&HtmlAudioElement)) -> Result<()> {
        let sounds = self.sounds.borrow();
        if ids.is_empty() {
            sounds.values().for_each(|s| f(&s.element));
            return Ok(());
        }
        for id in ids {
            let sound = sounds
                .get(*id)
                .ok_or_else(|| EngineError::UnknownSound(id.to_string()))?;
            f(&sound.element);
        }
        Ok(())
    }
}

impl SoundBoard for AudioManager {
    fn add(&self, id: &str, url: &str, settings: SoundSettings) {
        let element = match HtmlAudioElement::new_with_src(url) {
            Ok(element) => element,
            Err(err) => {
                log::warn!("Cannot load sound {id} from {url}: {:?}", err);
                return;
            }
        };
        element.set_loop(settings.looping);
        element.set_volume(self.effective_volume(&settings));
        self.sounds
            .borrow_mut()
            .insert(id.to_string(), WebSound { element, settings });
    }

    fn play(&self, id: &str) -> Result<()> {
        self.with_sounds(&[id], |element| {
            element.set_current_time(0.0);
            // Autoplay may be refused until a user gesture; not an engine error.
            let _ = element.play();
        })
    }

    fn pause(&self, ids: &[&str]) -> Result<()> {
        self.with_sounds(ids, |element| {
            let _ = element.pause();
        })
    }

    fn resume(&self, ids: &[&str]) -> Result<()> {
        self.with_sounds(ids, |element| {
            let started = element.current_time() > 0.0;
            if started && element.paused() && !element.ended() {
                let _ = element.play();
            }
        })
    }

    fn reset(&self) {
        for sound in self.sounds.borrow().values() {
            let _ = sound.element.pause();
            sound.element.set_current_time(0.0);
        }
    }
}
