use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorScheme {
    #[default]
    Elevation,
    Intensity,
    Classification,
    Rgb,
}

/// Static rendering options handed to the point-cloud control.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DisplayOptions {
    pub point_size: f32,
    pub color_scheme: ColorScheme,
    /// Normalize colors over a percentile range instead of min/max.
    pub use_percentile: bool,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            point_size: 3.0,
            color_scheme: ColorScheme::Elevation,
            use_percentile: true,
        }
    }
}
