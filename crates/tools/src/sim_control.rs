use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use std::time::Duration;

use foundation::{ResourceId, SourceLocation};
use runtime::LocalBoxFuture;
use streaming::{
    ControlState, LoadError, PointCloudControl, PointCloudInfo, StreamingProgress, UnloadError,
};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct SimulatedControlConfig {
    pub latency: Duration,
    pub points_per_load: u64,
    /// Locations whose loads are rejected.
    pub failing: BTreeSet<SourceLocation>,
}

impl Default for SimulatedControlConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(20),
            points_per_load: 2_500_000,
            failing: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    next_id: Cell<u64>,
    active_loads: Cell<u32>,
    loaded_points: Cell<u64>,
    load_calls: Cell<u64>,
    unload_calls: Cell<u64>,
    resident: RefCell<BTreeMap<ResourceId, SourceLocation>>,
}

/// In-process stand-in for the browser point-cloud control.
///
/// Loads resolve after a fixed latency on the tokio timer. The control keeps
/// its own record of resident clouds so callers can check for orphans.
#[derive(Debug, Clone)]
pub struct SimulatedControl {
    config: Rc<SimulatedControlConfig>,
    shared: Rc<Shared>,
}

impl SimulatedControl {
    pub fn new(config: SimulatedControlConfig) -> Self {
        Self {
            config: Rc::new(config),
            shared: Rc::new(Shared::default()),
        }
    }

    pub fn resident(&self) -> BTreeMap<ResourceId, SourceLocation> {
        self.shared.resident.borrow().clone()
    }

    pub fn load_calls(&self) -> u64 {
        self.shared.load_calls.get()
    }

    pub fn unload_calls(&self) -> u64 {
        self.shared.unload_calls.get()
    }
}

impl PointCloudControl for SimulatedControl {
    fn load_point_cloud(
        &self,
        location: &SourceLocation,
    ) -> LocalBoxFuture<'static, Result<PointCloudInfo, LoadError>> {
        let shared = Rc::clone(&self.shared);
        let config = Rc::clone(&self.config);
        let location = location.clone();
        shared.load_calls.set(shared.load_calls.get() + 1);
        shared.active_loads.set(shared.active_loads.get() + 1);

        Box::pin(async move {
            tokio::time::sleep(config.latency).await;
            shared.active_loads.set(shared.active_loads.get() - 1);

            if config.failing.contains(&location) {
                return Err(LoadError::new(format!("{location}: 404 Not Found")));
            }

            let n = shared.next_id.get() + 1;
            shared.next_id.set(n);
            let id = ResourceId::new(format!("pc-{n}"));
            shared
                .loaded_points
                .set(shared.loaded_points.get() + config.points_per_load);
            shared
                .resident
                .borrow_mut()
                .insert(id.clone(), location.clone());
            debug!(%location, %id, "simulated load complete");

            let mut info = PointCloudInfo::new(id);
            info.name = Some(location.to_string());
            info.point_count = Some(config.points_per_load);
            Ok(info)
        })
    }

    fn unload_point_cloud(&self, id: &ResourceId) -> Result<(), UnloadError> {
        self.shared
            .unload_calls
            .set(self.shared.unload_calls.get() + 1);
        match self.shared.resident.borrow_mut().remove(id) {
            Some(_) => Ok(()),
            None => Err(UnloadError::new(format!("no point cloud {id}"))),
        }
    }

    fn state(&self) -> ControlState {
        let active = self.shared.active_loads.get() > 0;
        ControlState {
            loading: active,
            streaming_active: active,
            streaming_progress: Some(StreamingProgress {
                loaded_points: self.shared.loaded_points.get(),
                is_loading: active,
            }),
        }
    }
}
