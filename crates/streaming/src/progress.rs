//! Loading aggregation: one progress signal from the control's loading state.

use catalog::ASSUMED_TOTAL_POINTS;
use serde::{Deserialize, Serialize};

/// Fine-grained progress of a streaming load.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamingProgress {
    pub loaded_points: u64,
    pub is_loading: bool,
}

/// Loading state as the control reports it.
///
/// `loading` is coarse busy-ness; streaming progress is reported separately.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControlState {
    pub loading: bool,
    pub streaming_active: bool,
    pub streaming_progress: Option<StreamingProgress>,
}

/// What the loading overlay renders.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadingView {
    pub is_loading: bool,
    /// In `[0, 100]`.
    pub progress_percent: f64,
    pub points_loaded: Option<u64>,
    pub points_loaded_label: Option<String>,
}

/// Pure projection of a control state onto a [`LoadingView`].
///
/// Progress is scaled against `assumed_total` rather than the (unknown)
/// real total, and saturates at 100 once it is reached.
pub fn aggregate(state: &ControlState, assumed_total: u64) -> LoadingView {
    let streaming_busy = state.streaming_active
        && state
            .streaming_progress
            .map(|p| p.is_loading)
            .unwrap_or(false);

    let points_loaded = state.streaming_progress.map(|p| p.loaded_points);
    let progress_percent = points_loaded
        .map(|n| progress_percent(n, assumed_total))
        .unwrap_or(0.0);

    LoadingView {
        is_loading: state.loading || streaming_busy,
        progress_percent,
        points_loaded,
        points_loaded_label: points_loaded.and_then(points_label),
    }
}

pub fn progress_percent(loaded_points: u64, assumed_total: u64) -> f64 {
    let total = assumed_total.max(1) as f64;
    ((loaded_points as f64 / total) * 100.0).clamp(0.0, 100.0)
}

/// `2.35M`-style abbreviation. No label for zero points.
pub fn points_label(loaded_points: u64) -> Option<String> {
    if loaded_points == 0 {
        return None;
    }
    Some(format!("{:.2}M", loaded_points as f64 / 1_000_000.0))
}

/// Keeps the view derived from the most recently observed control state.
#[derive(Debug, Clone)]
pub struct LoadingAggregator {
    assumed_total: u64,
    latest: LoadingView,
}

impl Default for LoadingAggregator {
    fn default() -> Self {
        Self::new(ASSUMED_TOTAL_POINTS)
    }
}

impl LoadingAggregator {
    pub fn new(assumed_total: u64) -> Self {
        Self {
            assumed_total,
            latest: LoadingView::default(),
        }
    }

    pub fn observe(&mut self, state: &ControlState) -> &LoadingView {
        self.latest = aggregate(state, self.assumed_total);
        &self.latest
    }

    pub fn latest(&self) -> &LoadingView {
        &self.latest
    }
}
