pub mod reader;

pub use reader::{OffsetReader, PartitionOffsetRange};
