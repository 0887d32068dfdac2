pub mod event_bus;
pub mod metrics;
pub mod pass;
pub mod spawn;

pub use event_bus::*;
pub use metrics::{Metrics, MetricsSnapshot};
pub use pass::*;
pub use spawn::*;
