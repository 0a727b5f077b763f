pub mod error;
pub mod handlers;
pub mod server;
pub mod sse;
pub mod ws;

pub use server::{router, serve};
