use serde::{Deserialize, Serialize};

pub const ATTRIBUTION: &str = "Created by Ertan Özcan | Based on maplibre-gl-lidar by Qiusheng Wu | Data: <a href=\"https://www.opengeodata.nrw\" target=\"_blank\">opengeodata.nrw</a>";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Basemap {
    #[default]
    Dark,
    Light,
}

impl Basemap {
    pub fn style_url(self) -> &'static str {
        match self {
            Basemap::Dark => "https://basemaps.cartocdn.com/gl/dark-matter-gl-style/style.json",
            Basemap::Light => "https://basemaps.cartocdn.com/gl/positron-gl-style/style.json",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Basemap::Dark => "dark",
            Basemap::Light => "light",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownBasemap(pub String);

impl std::fmt::Display for UnknownBasemap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown basemap {:?} (expected \"dark\" or \"light\")", self.0)
    }
}

impl std::error::Error for UnknownBasemap {}

impl std::str::FromStr for Basemap {
    type Err = UnknownBasemap;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dark" => Ok(Basemap::Dark),
            "light" => Ok(Basemap::Light),
            _ => Err(UnknownBasemap(s.to_string())),
        }
    }
}

/// Initial camera of the map, in MapLibre terms.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MapView {
    /// `[lon, lat]`
    pub center: [f64; 2],
    pub zoom: f64,
    pub pitch: f64,
    pub max_pitch: f64,
}

impl Default for MapView {
    /// Cologne city centre, tilted for 3D viewing.
    fn default() -> Self {
        Self {
            center: [6.9531, 50.9352],
            zoom: 12.0,
            pitch: 60.0,
            max_pitch: 85.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Basemap, MapView};

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("dark".parse::<Basemap>(), Ok(Basemap::Dark));
        assert_eq!(" Light ".parse::<Basemap>(), Ok(Basemap::Light));
        assert!("satellite".parse::<Basemap>().is_err());
    }

    #[test]
    fn style_urls_are_distinct() {
        assert_ne!(Basemap::Dark.style_url(), Basemap::Light.style_url());
        assert!(Basemap::default().style_url().contains("dark-matter"));
    }

    #[test]
    fn map_view_serializes_camel_case() {
        let json = serde_json::to_value(MapView::default()).unwrap();
        assert_eq!(json["maxPitch"], 85.0);
        assert_eq!(json["center"][0], 6.9531);
    }
}
