pub mod calculator;
pub mod snapshot;

pub use calculator::LagCalculator;
pub use snapshot::{LagSnapshot, PartitionLag};
