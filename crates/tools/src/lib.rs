pub mod sim_control;
pub mod simulate;

pub use sim_control::*;
pub use simulate::*;
