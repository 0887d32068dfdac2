use std::env;

use foundation::{DatasetId, SourceLocation};
use serde::{Deserialize, Serialize};

use crate::basemap::{Basemap, MapView};
use crate::dataset::DatasetCatalog;
use crate::display::DisplayOptions;

/// Heuristic point count the progress bar is scaled against.
///
/// The real total is unknown until a dataset has fully streamed, so the bar
/// saturates at 100% once this many points have arrived.
pub const ASSUMED_TOTAL_POINTS: u64 = 5_000_000;

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Json(String),
    UnknownDefaultDataset(DatasetId),
    ZeroAssumedTotal,
    InvalidEnv { var: &'static str, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Json(msg) => write!(f, "invalid viewer config: {msg}"),
            ConfigError::UnknownDefaultDataset(id) => {
                write!(f, "default_active names unknown dataset {id}")
            }
            ConfigError::ZeroAssumedTotal => write!(f, "assumed_total_points must be > 0"),
            ConfigError::InvalidEnv { var, value } => write!(f, "invalid {var}={value:?}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub title: String,
    /// Heading of the point-cloud control panel.
    pub control_title: String,
    pub catalog: DatasetCatalog,
    /// Datasets active at startup. `None` selects the first catalog entry.
    pub default_active: Option<Vec<DatasetId>>,
    pub basemap: Basemap,
    pub map_view: MapView,
    pub display: DisplayOptions,
    pub assumed_total_points: u64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            title: "Cologne LidarData MapViewer".to_string(),
            control_title: "Cologne Lidar Control".to_string(),
            catalog: DatasetCatalog::cologne(),
            default_active: None,
            basemap: Basemap::default(),
            map_view: MapView::default(),
            display: DisplayOptions::default(),
            assumed_total_points: ASSUMED_TOTAL_POINTS,
        }
    }
}

impl ViewerConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let cfg: ViewerConfig =
            serde_json::from_str(raw).map_err(|e| ConfigError::Json(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.assumed_total_points == 0 {
            return Err(ConfigError::ZeroAssumedTotal);
        }
        self.default_selection().map(|_| ())
    }

    /// Source locations that start out selected, in catalog order of the ids given.
    pub fn default_selection(&self) -> Result<Vec<SourceLocation>, ConfigError> {
        match &self.default_active {
            None => Ok(self
                .catalog
                .first()
                .map(|d| d.source_location.clone())
                .into_iter()
                .collect()),
            Some(ids) => ids
                .iter()
                .map(|id| {
                    self.catalog
                        .get(id)
                        .map(|d| d.source_location.clone())
                        .ok_or_else(|| ConfigError::UnknownDefaultDataset(id.clone()))
                })
                .collect(),
        }
    }

    /// Applies `LIDAR_BASEMAP`, `LIDAR_POINT_SIZE` and `LIDAR_ASSUMED_TOTAL_POINTS`.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|var| env::var(var).ok())
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup("LIDAR_BASEMAP") {
            self.basemap = v.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "LIDAR_BASEMAP",
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup("LIDAR_POINT_SIZE") {
            self.display.point_size = v
                .trim()
                .parse::<f32>()
                .ok()
                .filter(|s| s.is_finite() && *s > 0.0)
                .ok_or_else(|| ConfigError::InvalidEnv {
                    var: "LIDAR_POINT_SIZE",
                    value: v.clone(),
                })?;
        }
        if let Some(v) = lookup("LIDAR_ASSUMED_TOTAL_POINTS") {
            self.assumed_total_points =
                v.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                    var: "LIDAR_ASSUMED_TOTAL_POINTS",
                    value: v.clone(),
                })?;
        }
        self.validate()
    }
}
