//! Browser glue: canvas presenter, page-level result sink, input listeners
//! and the animation-frame loop that lets the session clock run.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, error, info, warn};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::{CanvasRenderingContext2d, Document, Element, HtmlCanvasElement, window};

use crate::config::GameConfig;
use crate::driver::{GameDriver, Presenter, Snapshot};
use crate::error::SinkError;
use crate::logging::init_logging;
use crate::machine::{Command, Phase};
use crate::record::{ResultDocument, ResultSink};
use crate::stones::{LAYOUT_STORAGE_KEY, StoneId, StoneLayout};

const CANVAS_ID: &str = "rp-river-canvas";
const CANVAS_W: u32 = 720;
const CANVAS_H: u32 = 540;

const OVERLAY_STYLE: &str = "position:fixed; font-family:'Fira Code', monospace; font-size:16px; padding:4px 10px; background:rgba(0,0,0,0.42); border:1px solid #333; border-radius:6px; color:#ffd166; z-index:45;";
const BUTTON_STYLE: &str = "margin:0 6px; padding:8px 16px; font-size:16px; border-radius:8px; border:1px solid #333; background:#ffd166; color:#222; cursor:pointer;";
const HIDDEN_STYLE: &str = "display:none;";

type PageGame = GameDriver<CanvasPresenter, JsCallbackSink, StdRng>;

thread_local! {
    static GAME: RefCell<Option<PageGame>> = const { RefCell::new(None) };
    static LOOP_STARTED: Cell<bool> = const { Cell::new(false) };
}

/// Hands finished documents to a page-supplied JS function
/// `(docId, json)`. A returned Promise is awaited in the
/// background and only its rejection is logged.
pub struct JsCallbackSink {
    callback: Option<js_sys::Function>,
}

impl JsCallbackSink {
    pub fn new(callback: Option<js_sys::Function>) -> Self {
        Self { callback }
    }
}

impl ResultSink for JsCallbackSink {
    fn save(&self, doc_id: &str, document: &ResultDocument) -> Result<(), SinkError> {
        let json = document.to_json()?;
        let Some(callback) = &self.callback else {
            info!(doc_id, %json, "No save callback registered, result only logged");
            return Ok(());
        };
        let returned = callback
            .call2(
                &JsValue::NULL,
                &JsValue::from_str(doc_id),
                &JsValue::from_str(&json),
            )
            .map_err(|e| SinkError::Store {
                message: format!("{e:?}"),
            })?;
        if let Ok(promise) = returned.dyn_into::<js_sys::Promise>() {
            let doc_id = doc_id.to_owned();
            wasm_bindgen_futures::spawn_local(async move {
                if let Err(e) = JsFuture::from(promise).await {
                    error!(%doc_id, error = ?e, "Result store rejected the write");
                }
            });
        }
        Ok(())
    }
}

/// Draws the river scene on a 2D canvas and keeps the DOM overlays in sync.
pub struct CanvasPresenter {
    doc: Document,
    canvas: HtmlCanvasElement,
    ctx: CanvasRenderingContext2d,
    layout: StoneLayout,
}

impl CanvasPresenter {
    fn draw_scene(&self, snapshot: &Snapshot) {
        let ctx = &self.ctx;
        let w = self.canvas.width() as f64;
        let h = self.canvas.height() as f64;

        // water, far bank, near bank
        ctx.set_fill_style_str("#2b6f8f");
        ctx.fill_rect(0.0, 0.0, w, h);
        ctx.set_fill_style_str("#3d6b35");
        ctx.fill_rect(0.0, 0.0, w, h * 0.42);
        ctx.set_fill_style_str("#4f7d3a");
        ctx.fill_rect(0.0, h * 0.86, w, h * 0.14);

        let state = &snapshot.state;
        for stone in self.layout.stones() {
            let fill = if state.active_stone == Some(stone.id) {
                "#ffd166"
            } else if stone.is_sentinel() {
                "#6b8e4e"
            } else if state.phase == Phase::Input && state.player_input.contains(&stone.id) {
                "#a0d8ef"
            } else {
                "#8a8f98"
            };
            circle(
                ctx,
                stone.x_pct / 100.0 * w,
                stone.y_pct / 100.0 * h,
                stone.r_pct / 100.0 * w,
                fill,
            );
        }

        if let Some(stone) = self.layout.get(snapshot.avatar) {
            let scale = stone.rabbit_scale.unwrap_or(1.0);
            if scale > 0.0 {
                ctx.set_font(&format!("{}px serif", (18.0 * scale).round()));
                ctx.set_text_align("center");
                ctx.set_text_baseline("bottom");
                let _ = ctx.fill_text(
                    "🐇",
                    stone.x_pct / 100.0 * w,
                    stone.y_pct / 100.0 * h,
                );
            }
        }
    }

    fn sync_overlays(&self, snapshot: &Snapshot) {
        let state = &snapshot.state;
        set_text(&self.doc, "rp-label", snapshot.label);

        let round = if state.is_trial {
            format!("Practice {}", state.trial_round_index + 1)
        } else {
            format!(
                "Round {} / {}  Score {}",
                (state.round_index + 1).min(snapshot.total_rounds),
                snapshot.total_rounds,
                state.score
            )
        };
        set_text(&self.doc, "rp-score", &round);

        let timer = if state.is_trial || state.phase == Phase::Ready {
            String::new()
        } else {
            format!("{}s", (state.total_time_remaining_ms / 1000.0).ceil())
        };
        set_text(&self.doc, "rp-timer", &timer);

        let phase = state.phase;
        for (id, visible) in [
            ("rp-btn-start", phase == Phase::Ready),
            ("rp-btn-continue", phase == Phase::Paused),
            ("rp-btn-practice", phase == Phase::TrialDone),
            ("rp-btn-game", phase == Phase::TrialDone),
            ("rp-btn-restart", phase != Phase::Ready),
        ] {
            if let Some(el) = self.doc.get_element_by_id(id) {
                el.set_attribute("style", if visible { BUTTON_STYLE } else { HIDDEN_STYLE })
                    .ok();
            }
        }
    }
}

impl Presenter for CanvasPresenter {
    fn render(&mut self, snapshot: &Snapshot) {
        self.draw_scene(snapshot);
        self.sync_overlays(snapshot);
    }
}

fn circle(ctx: &CanvasRenderingContext2d, x: f64, y: f64, r: f64, fill: &str) {
    ctx.begin_path();
    if ctx.arc(x, y, r, 0.0, std::f64::consts::TAU).is_ok() {
        ctx.set_fill_style_str(fill);
        ctx.fill();
        ctx.set_stroke_style_str("#222");
        ctx.set_line_width(2.0);
        ctx.stroke();
    }
}

fn set_text(doc: &Document, id: &str, text: &str) {
    if let Some(el) = doc.get_element_by_id(id) {
        el.set_text_content(Some(text));
    }
}

fn performance_now() -> f64 {
    window()
        .and_then(|w| w.performance())
        .map(|p| p.now())
        .unwrap_or(0.0)
}

/// Stored layout from the editor, or the default river.
fn load_layout() -> StoneLayout {
    let stored = window()
        .and_then(|w| w.local_storage().ok().flatten())
        .and_then(|s| s.get_item(LAYOUT_STORAGE_KEY).ok().flatten());
    match stored {
        Some(json) => StoneLayout::from_json(&json).unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring stored stone layout");
            StoneLayout::default_river()
        }),
        None => StoneLayout::default_river(),
    }
}

/// Run `f` against the live session. Errors if there is none or it is busy
/// (a save callback calling back into the game synchronously).
fn with_game<T>(f: impl FnOnce(&mut PageGame) -> T) -> Result<T, JsValue> {
    GAME.with(|cell| {
        let mut guard = cell
            .try_borrow_mut()
            .map_err(|_| JsValue::from_str("game is busy"))?;
        let game = guard
            .as_mut()
            .ok_or_else(|| JsValue::from_str("game not started"))?;
        Ok(f(game))
    })
}

fn dispatch(command: Command) -> Result<(), JsValue> {
    let now = performance_now();
    with_game(|game| game.handle(now, command))
}

fn ensure_overlay(doc: &Document, id: &str, position: &str) -> Result<(), JsValue> {
    if doc.get_element_by_id(id).is_none() {
        if let Some(body) = doc.body() {
            let div = doc.create_element("div")?;
            div.set_id(id);
            div.set_attribute("style", &format!("{OVERLAY_STYLE} {position}"))
                .ok();
            body.append_child(&div)?;
        }
    }
    Ok(())
}

fn add_button(doc: &Document, bar: &Element, id: &str, text: &str, command: Command) -> Result<(), JsValue> {
    let button = doc.create_element("button")?;
    button.set_id(id);
    button.set_text_content(Some(text));
    button.set_attribute("style", HIDDEN_STYLE).ok();
    let closure = Closure::wrap(Box::new(move |_evt: web_sys::MouseEvent| {
        if let Err(e) = dispatch(command) {
            warn!(error = ?e, ?command, "Button press dropped");
        }
    }) as Box<dyn FnMut(_)>);
    button.add_event_listener_with_callback("click", closure.as_ref().unchecked_ref())?;
    closure.forget();
    bar.append_child(&button)?;
    Ok(())
}

/// Create the canvas, overlays and listeners once per page.
fn mount(doc: &Document, layout: &StoneLayout) -> Result<HtmlCanvasElement, JsValue> {
    if let Some(el) = doc.get_element_by_id(CANVAS_ID) {
        return el.dyn_into().map_err(JsValue::from);
    }
    let body = doc
        .body()
        .ok_or_else(|| JsValue::from_str("no body"))?;

    let canvas: HtmlCanvasElement = doc.create_element("canvas")?.dyn_into()?;
    canvas.set_id(CANVAS_ID);
    canvas.set_width(CANVAS_W);
    canvas.set_height(CANVAS_H);
    canvas.set_attribute("style", "position:fixed; left:50%; top:46%; transform:translate(-50%,-50%); box-shadow:0 0 32px 0 rgba(0,0,0,0.18); border-radius:18px; border:2px solid #222; z-index:20;").ok();
    body.append_child(&canvas)?;

    ensure_overlay(doc, "rp-label", "top:10px; left:50%; transform:translateX(-50%);")?;
    ensure_overlay(doc, "rp-score", "top:10px; left:12px;")?;
    ensure_overlay(doc, "rp-timer", "top:10px; right:12px;")?;

    let bar = doc.create_element("div")?;
    bar.set_id("rp-controls");
    bar.set_attribute("style", "position:fixed; bottom:24px; left:50%; transform:translateX(-50%); z-index:46;")
        .ok();
    body.append_child(&bar)?;
    add_button(doc, &bar, "rp-btn-start", "Start", Command::Start)?;
    add_button(doc, &bar, "rp-btn-continue", "Continue", Command::Continue)?;
    add_button(doc, &bar, "rp-btn-practice", "Practice again", Command::RestartTrial)?;
    add_button(doc, &bar, "rp-btn-game", "Start game", Command::StartGame)?;
    add_button(doc, &bar, "rp-btn-restart", "Restart", Command::Restart)?;

    // Taps on stones
    {
        let canvas_click = canvas.clone();
        let layout = layout.clone();
        let closure = Closure::wrap(Box::new(move |evt: web_sys::MouseEvent| {
            let hit = layout.hit_test(
                evt.offset_x() as f64,
                evt.offset_y() as f64,
                canvas_click.width() as f64,
                canvas_click.height() as f64,
            );
            if let Some(stone) = hit {
                if let Err(e) = dispatch(Command::Tap(stone)) {
                    warn!(error = ?e, stone, "Tap dropped");
                }
            }
        }) as Box<dyn FnMut(_)>);
        canvas.add_event_listener_with_callback("click", closure.as_ref().unchecked_ref())?;
        closure.forget();
    }

    Ok(canvas)
}

type FrameCallback = Rc<RefCell<Option<Closure<dyn FnMut(f64)>>>>;

fn request_frame(cb: &FrameCallback) {
    if let (Some(w), Some(closure)) = (window(), cb.borrow().as_ref()) {
        let _ = w.request_animation_frame(closure.as_ref().unchecked_ref());
    }
}

fn start_loop() {
    if LOOP_STARTED.with(|started| started.replace(true)) {
        return;
    }
    let f: FrameCallback = Rc::new(RefCell::new(None));
    let g = f.clone();
    *g.borrow_mut() = Some(Closure::wrap(Box::new(move |ts: f64| {
        GAME.with(|cell| {
            if let Ok(mut guard) = cell.try_borrow_mut() {
                if let Some(game) = guard.as_mut() {
                    game.tick(ts);
                }
            }
        });
        request_frame(&f);
    }) as Box<dyn FnMut(f64)>));
    request_frame(&g);
}

/// Mount the game and start a fresh session.
///
/// `config_json` is a camelCase [`GameConfig`]; `on_save` receives
/// `(docId, json)` when the session ends. Calling this again
/// replaces the running session.
#[wasm_bindgen]
pub fn start_rabbit_path(config_json: &str, on_save: Option<js_sys::Function>) -> Result<(), JsValue> {
    let config =
        GameConfig::from_json(config_json).map_err(|e| JsValue::from_str(&e.to_string()))?;
    init_logging(&config.log_level);

    let win = window().ok_or_else(|| JsValue::from_str("no window"))?;
    let doc = win
        .document()
        .ok_or_else(|| JsValue::from_str("no document"))?;

    let layout = load_layout();
    let canvas = mount(&doc, &layout)?;
    let ctx: CanvasRenderingContext2d = canvas
        .get_context("2d")?
        .ok_or_else(|| JsValue::from_str("no 2d context"))?
        .dyn_into()?;

    let presenter = CanvasPresenter {
        doc,
        canvas,
        ctx,
        layout: layout.clone(),
    };
    let driver = GameDriver::new(
        &config,
        &layout,
        presenter,
        JsCallbackSink::new(on_save),
        StdRng::from_entropy(),
    )
    .map_err(|e| JsValue::from_str(&e.to_string()))?;

    GAME.with(|cell| {
        cell.try_borrow_mut()
            .map(|mut slot| *slot = Some(driver))
            .map_err(|_| JsValue::from_str("game is busy"))
    })?;
    info!(
        student = %config.student_name,
        rounds = config.total_rounds,
        trials = config.trial_rounds,
        "Rabbit's Path mounted"
    );
    start_loop();
    Ok(())
}

#[wasm_bindgen]
pub fn rabbit_start() -> Result<(), JsValue> {
    dispatch(Command::Start)
}

/// Tap command for a stone id coming from JS. Ids outside the stone range
/// map to nothing rather than wrapping onto a real stone.
fn tap_command(stone: u32) -> Option<Command> {
    StoneId::try_from(stone).ok().map(Command::Tap)
}

#[wasm_bindgen]
pub fn rabbit_tap(stone: u32) -> Result<(), JsValue> {
    match tap_command(stone) {
        Some(command) => dispatch(command),
        None => {
            debug!(stone, "Ignoring tap on unknown stone");
            Ok(())
        }
    }
}

#[wasm_bindgen]
pub fn rabbit_continue() -> Result<(), JsValue> {
    dispatch(Command::Continue)
}

#[wasm_bindgen]
pub fn rabbit_restart_trial() -> Result<(), JsValue> {
    dispatch(Command::RestartTrial)
}

#[wasm_bindgen]
pub fn rabbit_start_game() -> Result<(), JsValue> {
    dispatch(Command::StartGame)
}

#[wasm_bindgen]
pub fn rabbit_restart() -> Result<(), JsValue> {
    dispatch(Command::Restart)
}

/// Current session snapshot as JSON, for page-side debugging and tests.
#[wasm_bindgen]
pub fn rabbit_snapshot() -> Result<String, JsValue> {
    with_game(|game| serde_json::to_string(&game.snapshot()))?
        .map_err(|e| JsValue::from_str(&e.to_string()))
}
