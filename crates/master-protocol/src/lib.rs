//! Serial protocol spoken between a building-automation gateway and its master
//! controller.
//!
//! Two hardware families exist. Classic masters use fixed-size requests and
//! replies whose length is implied by the instruction. Core masters carry an
//! explicit payload length and send unsolicited events. Both share the same
//! envelope shape, described by a [`FrameFormat`].
//!
//! # Example
//!
//! ```rust,ignore
//! use master_protocol::{CoreCommand, Frame, FrameCodec, FrameFormat, MemoryType};
//!
//! let codec = FrameCodec::new(FrameFormat::core());
//! let cmd = CoreCommand::MemoryRead { memory: MemoryType::Eeprom, page: 1, start: 0, length: 32 };
//! let bytes = codec.encode_request(&Frame::new(3, cmd.code(), cmd.encode()))?;
//! ```

pub mod classic;
mod constants;
pub mod core;
mod error;
mod family;
mod frame;

pub use crate::classic::{ClassicCommand, ClassicResponse};
pub use crate::core::{CoreCommand, CoreEvent, CoreResponse, MemoryType, SystemEvent};
pub use constants::*;
pub use error::*;
pub use family::*;
pub use frame::*;
