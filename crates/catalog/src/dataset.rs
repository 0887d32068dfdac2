use std::collections::BTreeSet;

use foundation::{DatasetId, SourceLocation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: DatasetId,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(rename = "url")]
    pub source_location: SourceLocation,
}

impl Dataset {
    pub fn new(
        id: impl Into<DatasetId>,
        display_name: impl Into<String>,
        source_location: impl Into<SourceLocation>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            source_location: source_location.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    DuplicateId(DatasetId),
    DuplicateLocation(SourceLocation),
    Corrupt(String),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::DuplicateId(id) => write!(f, "duplicate dataset id: {id}"),
            CatalogError::DuplicateLocation(loc) => {
                write!(f, "two datasets share the source location {loc}")
            }
            CatalogError::Corrupt(msg) => write!(f, "catalog json invalid: {msg}"),
        }
    }
}

impl std::error::Error for CatalogError {}

/// Immutable, ordered list of the datasets a viewer can show.
///
/// Order is the order entries were supplied in and is what the dataset
/// checkboxes render in. Both ids and source locations are unique.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct DatasetCatalog {
    datasets: Vec<Dataset>,
}

impl DatasetCatalog {
    pub fn new(datasets: Vec<Dataset>) -> Result<Self, CatalogError> {
        let mut ids = BTreeSet::new();
        let mut locations = BTreeSet::new();
        for d in &datasets {
            if !ids.insert(&d.id) {
                return Err(CatalogError::DuplicateId(d.id.clone()));
            }
            if !locations.insert(&d.source_location) {
                return Err(CatalogError::DuplicateLocation(d.source_location.clone()));
            }
        }
        Ok(Self { datasets })
    }

    /// The two Cologne tiles from opengeodata.nrw shipped with the viewer.
    pub fn cologne() -> Self {
        Self {
            datasets: vec![
                Dataset::new(
                    "dataset-1",
                    "West-Teil (Dataset 1)",
                    "./data/3dm_32_356_5644_1_nw.laz",
                ),
                Dataset::new(
                    "dataset-2",
                    "Ost-Teil (Dataset 2)",
                    "./data/3dm_32_356_5645_1_nw.laz",
                ),
            ],
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let datasets: Vec<Dataset> =
            serde_json::from_str(raw).map_err(|e| CatalogError::Corrupt(e.to_string()))?;
        Self::new(datasets)
    }

    pub fn datasets(&self) -> &[Dataset] {
        &self.datasets
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dataset> {
        self.datasets.iter()
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    pub fn first(&self) -> Option<&Dataset> {
        self.datasets.first()
    }

    pub fn get(&self, id: &DatasetId) -> Option<&Dataset> {
        self.datasets.iter().find(|d| &d.id == id)
    }

    pub fn by_location(&self, location: &SourceLocation) -> Option<&Dataset> {
        self.datasets
            .iter()
            .find(|d| &d.source_location == location)
    }

    pub fn contains_location(&self, location: &SourceLocation) -> bool {
        self.by_location(location).is_some()
    }
}

impl<'de> Deserialize<'de> for DatasetCatalog {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let datasets = Vec::<Dataset>::deserialize(deserializer)?;
        DatasetCatalog::new(datasets).map_err(serde::de::Error::custom)
    }
}
