//! Arcade Engine entry point
//!
//! Runs a small marching-invader demo: in the browser against the DOM, on
//! native headless against the in-memory backend.

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

mod demo {
    use std::rc::Rc;

    use arcade_engine::{
        Animation, Collider, Command, Engine, EngineConfig, Lifecycle, Result, StateStore, VNode,
        h, text,
    };

    pub const WIDTH: i32 = 12;
    pub const ROWS: u32 = 6;
    pub const CELL_PX: i32 = 24;

    #[derive(Debug, Clone)]
    pub struct Field {
        pub player: i32,
        pub invader: i32,
        pub direction: i32,
        pub row: u32,
        pub landed: bool,
    }

    pub fn initial() -> Field {
        Field {
            player: WIDTH / 2,
            invader: 0,
            direction: 1,
            row: 0,
            landed: false,
        }
    }

    fn transform(store: &Rc<StateStore<Field>>, f: impl Fn(&mut Field) + 'static) -> impl Fn() + 'static {
        let store = Rc::clone(store);
        move || {
            store.set_state(|s| {
                let mut next = (**s).clone();
                f(&mut next);
                Rc::new(next)
            });
        }
    }

    /// Register the demo's animations, colliders, bindings and effects
    pub fn build(config: EngineConfig) -> Result<Engine<Field>> {
        let mut engine = Engine::with_config(initial, config);
        let store = Rc::clone(engine.store());

        // Marches faster the lower it gets.
        let march = transform(&store, |f| f.invader += f.direction);
        engine.add_animation(Animation::new(
            "march",
            |f: &Field| (400.0 - f64::from(f.row) * 50.0).max(100.0),
            march,
        ))?;

        let at_edge = Rc::clone(&store);
        let descend = transform(&store, |f| {
            f.direction = -f.direction;
            f.row += 1;
            f.landed = f.row >= ROWS;
        });
        engine.add_collider(Collider::new(["march"], move || {
            let (x, dir) = at_edge.get_state(|f| (f.invader, f.direction));
            if (dir > 0 && x >= WIDTH - 1) || (dir < 0 && x <= 0) {
                descend();
            }
        }))?;

        engine.bind_key("ArrowLeft", transform(&store, |f| f.player = (f.player - 1).max(0)));
        engine.bind_key(
            "ArrowRight",
            transform(&store, |f| f.player = (f.player + 1).min(WIDTH - 1)),
        );

        let lifecycle = engine.lifecycle().clone();
        engine.on_state_change(move |field| {
            if field.landed {
                let _ = lifecycle.send(Command::Stop);
            }
        });

        Ok(engine)
    }

    fn sprite(class: &str, x: i32, y: u32) -> VNode {
        h("div")
            .class("sprite")
            .class(class)
            .style("left", format!("{}px", x * CELL_PX))
            .style("top", format!("{}px", y as i32 * CELL_PX))
            .into()
    }

    /// Pure view of one snapshot
    pub fn render(field: &Field, lifecycle: &Lifecycle) -> VNode {
        let toggle = {
            let lifecycle = lifecycle.clone();
            move || {
                let command = if lifecycle.is_running() {
                    Command::Stop
                } else {
                    Command::Start
                };
                let _ = lifecycle.send(command);
            }
        };
        let reset = {
            let lifecycle = lifecycle.clone();
            move || {
                let _ = lifecycle.send(Command::Reset);
            }
        };

        h("div")
            .class("arena")
            .child(sprite("invader", field.invader, field.row))
            .child(sprite("player", field.player, ROWS + 1))
            .child_opt(field.landed.then(|| h("p").class("game-over").child("Game Over")))
            .child(
                h("div")
                    .class("controls")
                    .child(
                        h("button")
                            .class("toggle")
                            .child(if lifecycle.is_running() { "Pause" } else { "Start" })
                            .on("click", toggle),
                    )
                    .child(h("button").class("reset").child("Reset").on("click", reset)),
            )
            .child(text(format!("Row {} / {}", field.row, ROWS)))
            .into()
    }
}

#[cfg(target_arch = "wasm32")]
mod wasm_demo {
    use std::cell::RefCell;
    use std::rc::Rc;

    use wasm_bindgen::prelude::*;

    use arcade_engine::platform::web::{
        AudioManager, DomBackend, EventPump, WebRepaintHost, listen_keyboard,
    };
    use arcade_engine::{EngineConfig, FrameTarget, SoundBoard, SoundSettings};

    use super::demo;

    pub fn run() -> Result<(), JsValue> {
        console_error_panic_hook::set_once();
        let config = EngineConfig::load();
        let level = config
            .level_filter()
            .and_then(|filter| filter.to_level())
            .unwrap_or(log::Level::Info);
        let _ = console_log::init_with_level(level);

        log::info!("Arcade Engine demo starting...");

        let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
        let document = window
            .document()
            .ok_or_else(|| JsValue::from_str("no document"))?;
        let mount: web_sys::Node = match document.get_element_by_id("app") {
            Some(app) => app.into(),
            None => document
                .body()
                .ok_or_else(|| JsValue::from_str("no body"))?
                .into(),
        };

        let mut engine = demo::build(config).map_err(|err| JsValue::from_str(&err.to_string()))?;

        let sounds = Rc::new(AudioManager::new());
        sounds.add("march", "sounds/march.wav", SoundSettings::default());
        engine.with_sound(sounds);

        let input = Rc::clone(engine.input());
        let lifecycle = engine.lifecycle().clone();
        let pump = EventPump::new();
        let host = WebRepaintHost::new();

        let driver = engine.mount(
            DomBackend::new(document, pump.clone()),
            mount,
            host.clone(),
            move |field: &demo::Field| demo::render(field, &lifecycle),
        );
        let driver = Rc::new(RefCell::new(driver));

        let target: Rc<RefCell<dyn FrameTarget>> = driver.clone();
        host.bind(Rc::downgrade(&target));

        let weak = Rc::downgrade(&driver);
        pump.set(move || {
            let Some(driver) = weak.upgrade() else { return };
            let Ok(mut driver) = driver.try_borrow_mut() else {
                log::warn!("Event arrived mid-tick; commands wait for the next frame");
                return;
            };
            if let Err(err) = driver.pump_commands() {
                log::error!("{err}");
            }
        });

        listen_keyboard(input)?;

        log::info!("Arcade Engine demo mounted");
        Ok(())
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn wasm_main() {
    if let Err(err) = wasm_demo::run() {
        log::error!("Startup failed: {:?}", err);
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    use arcade_engine::{EngineConfig, FrameOutcome, ManualRepaintHost, MemoryBackend};

    let config = EngineConfig::load();
    env_logger::Builder::new()
        .filter_level(config.level_filter().unwrap_or(log::LevelFilter::Info))
        .parse_default_env()
        .init();
    log::info!("Arcade Engine (native) starting headless demo...");

    let engine = match demo::build(config) {
        Ok(engine) => engine,
        Err(err) => {
            log::error!("{err}");
            std::process::exit(1);
        }
    };
    let input = std::rc::Rc::clone(engine.input());
    let lifecycle = engine.lifecycle().clone();

    let host = ManualRepaintHost::new();
    let mut backend = MemoryBackend::new();
    let root = backend.create_root("main");
    let mut driver = engine.mount(backend, root, host.clone(), move |field: &demo::Field| {
        demo::render(field, &lifecycle)
    });

    if let Err(err) = driver.start() {
        log::error!("{err}");
        std::process::exit(1);
    }
    input.press("ArrowRight");

    // 60 Hz frames until the invader lands or a minute of game time passes.
    let mut frames = 0u32;
    let mut timestamp = 0.0;
    while let Some(outcome) = host.fire(&mut driver, timestamp) {
        match outcome {
            Ok(FrameOutcome::Ticked(_)) => frames += 1,
            Ok(_) => {}
            Err(err) => {
                log::error!("{err}");
                break;
            }
        }
        if frames >= 3600 {
            let _ = driver.stop();
            break;
        }
        timestamp += 1000.0 / 60.0;
    }

    let field = driver.store().snapshot();
    log::info!(
        "Stopped after {} frames: row {}, landed {}, player at {}",
        frames,
        field.row,
        field.landed,
        field.player
    );

    match serde_json::to_string_pretty(&driver.reconciler().backend().snapshot(root)) {
        Ok(json) => println!("{json}"),
        Err(err) => log::error!("Cannot serialize output tree: {err}"),
    }
}
