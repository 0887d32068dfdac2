pub mod control;
pub mod ledger;
pub mod progress;
pub mod reconciler;
pub mod request;
pub mod residency;
pub mod selection;
pub mod session;

pub use control::*;
pub use ledger::*;
pub use progress::*;
pub use reconciler::*;
pub use request::*;
pub use residency::*;
pub use selection::*;
pub use session::*;
