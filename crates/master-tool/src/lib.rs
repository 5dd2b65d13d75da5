//! Configuration and wiring for the `master-tool` command line.
//!
//! [`GatewayConfig`] describes how to reach a master; [`Gateway::open`]
//! turns it into a link and a [`master_memory::MemoryController`].

pub mod config;
mod gateway;

pub use config::{ChannelConfig, ConfigError, GatewayConfig};
pub use gateway::*;
