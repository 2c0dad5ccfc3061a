#[macro_use]
extern crate tracing;

pub mod config;
pub mod server;
pub mod zookeeper;

pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
