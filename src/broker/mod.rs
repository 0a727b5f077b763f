pub mod client;
pub mod provider;
pub mod memory;
#[cfg(feature = "kafka")]
pub mod kafka;

pub use client::*;
pub use provider::{Connection, ConnectionProvider};
