use std::cell::RefCell;

use catalog::{Basemap, ViewerConfig};
use console_error_panic_hook::set_once;
use foundation::SourceLocation;
use js_sys::{Function, Reflect};
use serde::Serialize;
use streaming::{ControlState, Session};
use tracing::{info, warn};
use wasm_bindgen::prelude::*;

mod control;
mod view;

use control::{JsPointCloudControl, WasmSpawner, control_state_from_js, js_error_message};
use view::{ControlOptions, MapOptions, catalog_location, dataset_rows, switch_basemap};

type ViewerSession = Session<JsPointCloudControl, WasmSpawner>;

struct ViewerState {
    config: ViewerConfig,
    basemap: Basemap,
    session: ViewerSession,
}

thread_local! {
    static STATE: RefCell<Option<ViewerState>> = const { RefCell::new(None) };
}

fn to_json<T: Serialize>(value: &T) -> Result<String, JsValue> {
    serde_json::to_string(value).map_err(|e| JsValue::from_str(&e.to_string()))
}

fn with_viewer<R>(f: impl FnOnce(&mut ViewerState) -> Result<R, JsValue>) -> Result<R, JsValue> {
    STATE.with(|state| {
        let mut s = state.borrow_mut();
        let viewer = s
            .as_mut()
            .ok_or_else(|| JsValue::from_str("viewer not initialized; call init_viewer first"))?;
        f(viewer)
    })
}

/// Clones the session handle out of `STATE`.
///
/// Session calls reach into the JS control, which may call back into these
/// exports, so `STATE` must not stay borrowed across them.
fn session() -> Result<ViewerSession, JsValue> {
    with_viewer(|v| Ok(v.session.clone()))
}

#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    set_once();
    tracing_wasm::set_as_global_default();
    Ok(())
}

/// Builds the viewer from an optional JSON config (defaults to Cologne).
#[wasm_bindgen]
pub fn init_viewer(config_json: Option<String>) -> Result<(), JsValue> {
    let config = match config_json.as_deref() {
        Some(raw) if !raw.trim().is_empty() => {
            ViewerConfig::from_json(raw).map_err(|e| JsValue::from_str(&e.to_string()))?
        }
        _ => ViewerConfig::default(),
    };
    let session = Session::from_config(&config, WasmSpawner)
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    info!(datasets = config.catalog.len(), "viewer initialized");

    let basemap = config.basemap;
    STATE.with(|state| {
        *state.borrow_mut() = Some(ViewerState {
            config,
            basemap,
            session,
        });
    });
    Ok(())
}

#[wasm_bindgen]
pub fn viewer_title() -> Result<String, JsValue> {
    with_viewer(|v| Ok(v.config.title.clone()))
}

/// JSON options for constructing the MapLibre map.
#[wasm_bindgen]
pub fn map_options() -> Result<String, JsValue> {
    with_viewer(|v| to_json(&MapOptions::new(v.config.map_view, v.basemap)))
}

/// JSON options for constructing the `LidarControl`.
#[wasm_bindgen]
pub fn control_options() -> Result<String, JsValue> {
    with_viewer(|v| {
        to_json(&ControlOptions::new(
            &v.config.control_title,
            v.config.display,
        ))
    })
}

/// JSON list of `{ id, name, url, active, status }`, in catalog order.
#[wasm_bindgen]
pub fn datasets() -> Result<String, JsValue> {
    let session = session()?;
    let selection = session.selection();
    with_viewer(|v| {
        to_json(&dataset_rows(&v.config.catalog, &selection, |l| {
            session.residency(l)
        }))
    })
}

#[wasm_bindgen]
pub fn selection() -> Result<String, JsValue> {
    to_json(&session()?.selection())
}

#[wasm_bindgen]
pub fn is_active(url: &str) -> Result<bool, JsValue> {
    Ok(session()?.is_selected(&SourceLocation::from(url)))
}

/// Flips a dataset on or off. Only catalog locations are accepted.
#[wasm_bindgen]
pub fn toggle_dataset(url: &str) -> Result<bool, JsValue> {
    let location = with_viewer(|v| Ok(catalog_location(&v.config.catalog, url)))?;
    let Some(location) = location else {
        warn!(location = url, "toggle for a location outside the catalog ignored");
        return Err(JsValue::from_str(&format!("unknown dataset location: {url}")));
    };
    Ok(session()?.toggle(&location))
}

/// Called by the page once the `LidarControl` is attached to the map.
#[wasm_bindgen]
pub fn control_ready(control: JsValue) -> Result<bool, JsValue> {
    Ok(session()?.attach_control(JsPointCloudControl::new(control)))
}

/// JSON `LoadingView`. Pass the control's state object to push it directly,
/// or nothing to read it from the attached control.
#[wasm_bindgen]
pub fn loading_view(state: Option<JsValue>) -> Result<String, JsValue> {
    let session = session()?;
    let view = match state {
        Some(s) if !s.is_undefined() && !s.is_null() => {
            let control_state: ControlState = control_state_from_js(&s)?;
            session.observe(&control_state)
        }
        _ => session.loading_view(),
    };
    to_json(&view)
}

/// Switches the map style between the dark and light basemaps.
#[wasm_bindgen]
pub fn set_basemap(map: &JsValue, name: &str) -> Result<(), JsValue> {
    let basemap: Basemap = name
        .parse()
        .map_err(|e: catalog::UnknownBasemap| JsValue::from_str(&e.to_string()))?;
    let mut current = with_viewer(|v| Ok(v.basemap))?;
    let switched = switch_basemap(&mut current, basemap, |style_url| {
        let set_style: Function = Reflect::get(map, &JsValue::from_str("setStyle"))?
            .dyn_into()
            .map_err(|_| JsValue::from_str("map has no setStyle method"))?;
        set_style
            .call1(map, &JsValue::from_str(style_url))
            .map(|_| ())
            .map_err(|e| JsValue::from_str(&js_error_message(&e)))
    })?;
    if switched {
        with_viewer(|v| {
            v.basemap = current;
            Ok(())
        })?;
        info!(basemap = basemap.name(), "basemap switched");
    }
    Ok(())
}

#[wasm_bindgen]
pub fn current_basemap() -> Result<String, JsValue> {
    with_viewer(|v| Ok(v.basemap.name().to_string()))
}

/// Diagnostics: JSON `{ ledger, in_flight, events, metrics }`.
#[wasm_bindgen]
pub fn ledger() -> Result<String, JsValue> {
    #[derive(Serialize)]
    struct Diagnostics {
        ledger: Vec<(String, String)>,
        in_flight: usize,
        events: Vec<runtime::Event>,
        metrics: runtime::MetricsSnapshot,
    }

    let session = session()?;
    let ledger = session
        .ledger()
        .iter()
        .map(|(l, id)| (l.to_string(), id.to_string()))
        .collect();
    to_json(&Diagnostics {
        ledger,
        in_flight: session.in_flight_len(),
        events: session.events(),
        metrics: session.metrics(),
    })
}
