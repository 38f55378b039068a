#![cfg(target_arch = "wasm32")]

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::HtmlCanvasElement;

use crate::app::AppContext;
use crate::assets::HttpSource;
use crate::config::{Variant, ViewerConfig};
use crate::shell::{find_canvas_with, spawn_web};

#[wasm_bindgen(start)]
pub fn bootstrap() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

/// Starts the viewer on the page's `canvas.webgl`, or its first canvas.
///
/// `variant` is `helmet` (default) or `skybox`; asset paths are fetched
/// relative to `asset_base_url`, which defaults to the page's directory.
#[wasm_bindgen]
pub fn start(variant: Option<String>, asset_base_url: Option<String>) -> Result<(), JsValue> {
    let variant = match variant.as_deref() {
        Some(name) => name.parse::<Variant>().map_err(to_js)?,
        None => Variant::default(),
    };
    let config = ViewerConfig::for_variant(variant);

    let window = web_sys::window().ok_or_else(|| JsValue::from_str("missing window"))?;
    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("missing document"))?;
    let canvas = find_canvas(&document)?;

    let width = canvas.client_width().max(1) as u32;
    let height = canvas.client_height().max(1) as u32;
    log::info!("starting {variant} viewer at {width}x{height}");
    let app = AppContext::new(config, width, height, window.device_pixel_ratio());
    let source = HttpSource::new(asset_base_url.unwrap_or_default());
    spawn_web(app, source, canvas).map_err(|err| JsValue::from_str(&format!("{err:#}")))
}

fn find_canvas(document: &web_sys::Document) -> Result<HtmlCanvasElement, JsValue> {
    let (selector, element) = find_canvas_with(|selector| document.query_selector(selector))?
        .ok_or_else(|| JsValue::from_str("no canvas element found"))?;
    element
        .dyn_into()
        .map_err(|_| JsValue::from_str(&format!("{selector} is not a canvas")))
}

fn to_js(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}
