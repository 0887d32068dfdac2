use catalog::{ATTRIBUTION, Basemap, DatasetCatalog, DisplayOptions, MapView};
use foundation::SourceLocation;
use serde::Serialize;
use streaming::{Residency, SelectionSet};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RowStatus {
    Idle,
    Loading,
    Loaded,
}

impl From<Option<&Residency>> for RowStatus {
    fn from(residency: Option<&Residency>) -> Self {
        match residency {
            None => RowStatus::Idle,
            Some(Residency::Loading(_)) => RowStatus::Loading,
            Some(Residency::Resident(_)) => RowStatus::Loaded,
        }
    }
}

/// One checkbox in the dataset list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetRow {
    pub id: String,
    pub name: String,
    pub url: String,
    pub active: bool,
    pub status: RowStatus,
}

pub fn dataset_rows(
    catalog: &DatasetCatalog,
    selection: &SelectionSet,
    residency: impl Fn(&SourceLocation) -> Option<Residency>,
) -> Vec<DatasetRow> {
    catalog
        .iter()
        .map(|d| DatasetRow {
            id: d.id.to_string(),
            name: d.display_name.clone(),
            url: d.source_location.to_string(),
            active: selection.contains(&d.source_location),
            status: RowStatus::from(residency(&d.source_location).as_ref()),
        })
        .collect()
}

/// Resolves a checkbox URL to a catalog location. Anything else is refused.
pub fn catalog_location(catalog: &DatasetCatalog, url: &str) -> Option<SourceLocation> {
    let location = SourceLocation::from(url);
    catalog.contains_location(&location).then_some(location)
}

/// Applies `requested` through `apply_style` and records it in `current`.
///
/// `current` only changes once `apply_style` succeeds. Returns `false`
/// without calling it when the basemap is already shown.
pub fn switch_basemap<E>(
    current: &mut Basemap,
    requested: Basemap,
    apply_style: impl FnOnce(&str) -> Result<(), E>,
) -> Result<bool, E> {
    if *current == requested {
        return Ok(false);
    }
    apply_style(requested.style_url())?;
    *current = requested;
    Ok(true)
}

/// Options for `new maplibregl.Map(...)`, minus the container.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapOptions {
    pub style: &'static str,
    pub center: [f64; 2],
    pub zoom: f64,
    pub pitch: f64,
    pub max_pitch: f64,
    pub attribution_control: bool,
    pub custom_attribution: &'static str,
}

impl MapOptions {
    pub fn new(view: MapView, basemap: Basemap) -> Self {
        Self {
            style: basemap.style_url(),
            center: view.center,
            zoom: view.zoom,
            pitch: view.pitch,
            max_pitch: view.max_pitch,
            attribution_control: false,
            custom_attribution: ATTRIBUTION,
        }
    }
}

/// Options for the `LidarControl` constructor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlOptions {
    pub title: String,
    pub position: &'static str,
    pub auto_zoom: bool,
    #[serde(flatten)]
    pub display: DisplayOptions,
}

impl ControlOptions {
    pub fn new(title: &str, display: DisplayOptions) -> Self {
        Self {
            title: title.to_string(),
            position: "top-right",
            auto_zoom: true,
            display,
        }
    }
}
