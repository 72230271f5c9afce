mod client;
pub mod types;

pub use client::{Client, Config, ConfigBuilder, ServerRx, connect, connect_with_config};
