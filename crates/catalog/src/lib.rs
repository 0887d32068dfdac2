pub mod basemap;
pub mod config;
pub mod dataset;
pub mod display;

pub use basemap::*;
pub use config::*;
pub use dataset::*;
pub use display::*;
