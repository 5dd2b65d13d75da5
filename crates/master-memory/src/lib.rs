//! Typed memory models for master controllers.
//!
//! The master keeps its configuration in paged eeprom (and, on core
//! hardware, fram). This crate maps those bytes to named fields:
//!
//! - [`FieldKind`], [`CompositeDefinition`] and [`EnumDefinition`] describe
//!   how a value is encoded
//! - [`ModelDefinition`] places fields per record, the shipped tables live in
//!   [`schema`]
//! - [`MemoryController`] reads pages through a [`MemoryBackend`], caches them
//!   in a [`PageCache`] and hands out [`ModelInstance`]s
//! - [`ExtensionStore`] keeps gateway-side values next to device memory
//!
//! # Example
//!
//! ```rust,ignore
//! use master_memory::{MemoryConfig, MemoryController};
//! use master_link::{SimulatedMaster, Transport, TransportConfig};
//! use master_protocol::HardwareFamily;
//! use parking_lot::Mutex;
//!
//! let (sim, _handle) = SimulatedMaster::new(HardwareFamily::Core);
//! let link = Mutex::new(Transport::new(sim, TransportConfig::for_family(HardwareFamily::Core)));
//! let controller = MemoryController::for_link(HardwareFamily::Core, link, MemoryConfig::default());
//!
//! let mut output = controller.load("OutputConfiguration", 3)?;
//! output.set("timer_type", "ABSOLUTE")?;
//! output.save()?;
//! ```

mod address;
mod backend;
mod cache;
mod composite;
mod controller;
mod enums;
mod error;
mod extension;
mod field;
mod instance;
mod model;
pub mod schema;
mod value;

pub use address::*;
pub use backend::*;
pub use cache::*;
pub use composite::*;
pub use controller::*;
pub use enums::*;
pub use error::*;
pub use extension::*;
pub use field::*;
pub use instance::*;
pub use model::*;
pub use value::*;
