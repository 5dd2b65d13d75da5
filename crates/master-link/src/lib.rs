//! Link layer between the gateway and its master controller.
//!
//! - [`Channel`]: a byte stream with timed reads (TCP bridge, serial device)
//! - [`Transport`]: frames requests, matches replies on tag and command,
//!   retries, and forwards event frames
//! - [`Link`]: the serialized request path used by the layers above, either a
//!   mutex-guarded transport or a handle to a [`LinkWorker`] thread
//! - [`sim`]: a simulated master for tests and offline use
//!
//! # Example
//!
//! ```rust,ignore
//! use master_link::{Link, Request, SimulatedMaster, Transport, TransportConfig};
//! use master_protocol::{CoreCommand, HardwareFamily};
//! use parking_lot::Mutex;
//!
//! let (sim, _handle) = SimulatedMaster::new(HardwareFamily::Core);
//! let link = Mutex::new(Transport::new(sim, TransportConfig::for_family(HardwareFamily::Core)));
//! let reply = link.send(Request::core(&CoreCommand::FirmwareVersion))?;
//! ```

mod channel;
mod error;
mod link;
pub mod sim;
mod transport;

pub use channel::*;
pub use error::*;
pub use link::*;
pub use sim::{FaultPlan, SimHandle, SimWrite, SimulatedMaster};
pub use transport::*;
