//! Contract of the external point-cloud control.
//!
//! The control performs decoding, streaming and GPU upload. The viewer core
//! only asks it to load or unload whole datasets and reads its loading state.

use foundation::{ResourceId, SourceLocation};
use runtime::LocalBoxFuture;
use serde::{Deserialize, Serialize};

use crate::progress::ControlState;

/// What the control hands back once a point cloud is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointCloudInfo {
    pub id: ResourceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point_count: Option<u64>,
}

impl PointCloudInfo {
    pub fn new(id: impl Into<ResourceId>) -> Self {
        Self {
            id: id.into(),
            name: None,
            point_count: None,
        }
    }
}

/// A load was rejected (unreachable source, malformed data, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadError {
    pub message: String,
}

impl LoadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "point cloud load failed: {}", self.message)
    }
}

impl std::error::Error for LoadError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnloadError {
    pub message: String,
}

impl UnloadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for UnloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "point cloud unload failed: {}", self.message)
    }
}

impl std::error::Error for UnloadError {}

/// The rendering control that owns the loaded point clouds.
///
/// Loads are the only suspension point. Unloads are immediate from the
/// caller's perspective and treated as best-effort.
pub trait PointCloudControl {
    fn load_point_cloud(
        &self,
        location: &SourceLocation,
    ) -> LocalBoxFuture<'static, Result<PointCloudInfo, LoadError>>;

    fn unload_point_cloud(&self, id: &ResourceId) -> Result<(), UnloadError>;

    /// Latest loading state as reported by the control.
    fn state(&self) -> ControlState;
}
