use std::collections::BTreeMap;
use std::time::Duration;

use catalog::{ConfigError, ViewerConfig};
use foundation::{DatasetId, SourceLocation};
use runtime::{Event, MetricsSnapshot, TokioLocalSpawner};
use serde::Serialize;
use streaming::{LoadingView, PointCloudControl, Session};
use tracing::info;

use crate::sim_control::SimulatedControl;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Toggle(DatasetId),
    Wait(Duration),
}

#[derive(Debug)]
pub enum SimulateError {
    Config(ConfigError),
    UnknownDataset(DatasetId),
    Timeout(Duration),
}

impl std::fmt::Display for SimulateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimulateError::Config(e) => write!(f, "{e}"),
            SimulateError::UnknownDataset(id) => write!(f, "unknown dataset id: {id}"),
            SimulateError::Timeout(t) => write!(f, "loads still pending after {t:?}"),
        }
    }
}

impl std::error::Error for SimulateError {}

impl From<ConfigError> for SimulateError {
    fn from(e: ConfigError) -> Self {
        SimulateError::Config(e)
    }
}

#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub selection: Vec<SourceLocation>,
    pub ledger: BTreeMap<String, String>,
    /// What the control itself still holds; equal to `ledger` when nothing leaked.
    pub control_resident: BTreeMap<String, String>,
    pub converged: bool,
    pub load_calls: u64,
    pub unload_calls: u64,
    pub loading: LoadingView,
    pub metrics: MetricsSnapshot,
    pub events: Vec<Event>,
}

/// Drives a session through `steps` against `control`, then waits for all
/// loads to settle.
///
/// Must run inside a `tokio::task::LocalSet`.
pub async fn simulate(
    config: &ViewerConfig,
    steps: &[Step],
    control: SimulatedControl,
    settle_timeout: Duration,
) -> Result<SimulationReport, SimulateError> {
    let session: Session<SimulatedControl, TokioLocalSpawner> =
        Session::from_config(config, TokioLocalSpawner)?;
    session.attach_control(control.clone());

    for step in steps {
        match step {
            Step::Toggle(id) => {
                let dataset = config
                    .catalog
                    .get(id)
                    .ok_or_else(|| SimulateError::UnknownDataset(id.clone()))?;
                let on = session.toggle(&dataset.source_location);
                info!(dataset = %id, on, "toggled");
            }
            Step::Wait(d) => tokio::time::sleep(*d).await,
        }
        tokio::task::yield_now().await;
    }

    let settle = async {
        while !session.is_settled() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    };
    tokio::time::timeout(settle_timeout, settle)
        .await
        .map_err(|_| SimulateError::Timeout(settle_timeout))?;

    let ledger = session
        .ledger()
        .iter()
        .map(|(l, id)| (l.to_string(), id.to_string()))
        .collect();
    let control_resident = control
        .resident()
        .into_iter()
        .map(|(id, l)| (l.to_string(), id.to_string()))
        .collect();

    Ok(SimulationReport {
        selection: session.selection().iter().cloned().collect(),
        ledger,
        control_resident,
        converged: session.is_converged(),
        load_calls: control.load_calls(),
        unload_calls: control.unload_calls(),
        loading: streaming::aggregate(&control.state(), config.assumed_total_points),
        metrics: session.metrics(),
        events: session.events(),
    })
}
