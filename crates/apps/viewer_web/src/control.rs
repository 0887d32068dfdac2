//! Bridge to the JavaScript point-cloud control (maplibre-gl-lidar).

use foundation::{ResourceId, SourceLocation};
use js_sys::{Function, JSON, Promise, Reflect};
use runtime::{LocalBoxFuture, Spawner};
use streaming::{ControlState, LoadError, PointCloudControl, PointCloudInfo, UnloadError};
use tracing::debug;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;

/// Runs viewer tasks on the browser event loop.
#[derive(Debug, Default, Clone, Copy)]
pub struct WasmSpawner;

impl Spawner for WasmSpawner {
    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>) {
        wasm_bindgen_futures::spawn_local(task);
    }
}

/// A `LidarControl` instance handed over by the page once it is attached to the map.
#[derive(Debug, Clone)]
pub struct JsPointCloudControl {
    inner: JsValue,
}

impl JsPointCloudControl {
    pub fn new(inner: JsValue) -> Self {
        Self { inner }
    }

    fn call1(&self, method: &str, arg: &JsValue) -> Result<JsValue, JsValue> {
        let f: Function = Reflect::get(&self.inner, &JsValue::from_str(method))?
            .dyn_into()
            .map_err(|_| JsValue::from_str(&format!("control has no method {method}")))?;
        f.call1(&self.inner, arg)
    }

    fn call0(&self, method: &str) -> Result<JsValue, JsValue> {
        let f: Function = Reflect::get(&self.inner, &JsValue::from_str(method))?
            .dyn_into()
            .map_err(|_| JsValue::from_str(&format!("control has no method {method}")))?;
        f.call0(&self.inner)
    }
}

impl PointCloudControl for JsPointCloudControl {
    fn load_point_cloud(
        &self,
        location: &SourceLocation,
    ) -> LocalBoxFuture<'static, Result<PointCloudInfo, LoadError>> {
        // The call itself happens now; only the returned promise is awaited later.
        let started = self
            .call1("loadPointCloud", &JsValue::from_str(location.as_str()))
            .map(|ret| Promise::resolve(&ret));
        Box::pin(async move {
            let promise = started.map_err(|e| LoadError::new(js_error_message(&e)))?;
            let value = JsFuture::from(promise)
                .await
                .map_err(|e| LoadError::new(js_error_message(&e)))?;
            info_from_js(&value)
        })
    }

    fn unload_point_cloud(&self, id: &ResourceId) -> Result<(), UnloadError> {
        self.call1("unloadPointCloud", &JsValue::from_str(id.as_str()))
            .map(|_| ())
            .map_err(|e| UnloadError::new(js_error_message(&e)))
    }

    fn state(&self) -> ControlState {
        match self.call0("getState").and_then(|s| control_state_from_js(&s)) {
            Ok(state) => state,
            Err(err) => {
                debug!(error = %js_error_message(&err), "control state unavailable");
                ControlState::default()
            }
        }
    }
}

pub(crate) fn control_state_from_js(value: &JsValue) -> Result<ControlState, JsValue> {
    let raw: String = JSON::stringify(value)?.into();
    serde_json::from_str(&raw).map_err(|e| JsValue::from_str(&e.to_string()))
}

fn info_from_js(value: &JsValue) -> Result<PointCloudInfo, LoadError> {
    // The id is handed back verbatim on unload, so only string ids survive the trip.
    let raw = Reflect::get(value, &JsValue::from_str("id")).unwrap_or(JsValue::UNDEFINED);
    let id = match raw.as_string() {
        Some(id) => id,
        None if raw.is_undefined() || raw.is_null() => {
            return Err(LoadError::new("control returned no point cloud id"));
        }
        None => {
            return Err(LoadError::new(format!(
                "control returned a non-string point cloud id: {raw:?}"
            )));
        }
    };
    let mut info = PointCloudInfo::new(id);
    info.name = Reflect::get(value, &JsValue::from_str("name"))
        .ok()
        .and_then(|v| v.as_string());
    info.point_count = Reflect::get(value, &JsValue::from_str("pointCount"))
        .ok()
        .and_then(|v| v.as_f64())
        .filter(|n| n.is_finite() && *n >= 0.0)
        .map(|n| n as u64);
    Ok(info)
}

pub(crate) fn js_error_message(err: &JsValue) -> String {
    if let Some(s) = err.as_string() {
        return s;
    }
    Reflect::get(err, &JsValue::from_str("message"))
        .ok()
        .and_then(|m| m.as_string())
        .unwrap_or_else(|| format!("{err:?}"))
}
