//! Protocol constants
//!
//! Instruction codes, marker bytes and fixed sizes used by the classic and
//! core master protocols.

// ============================================================================
// Frame markers
// ============================================================================

/// Start marker of every request written to the master.
pub const REQUEST_START: &[u8] = b"STR";
/// Start marker of a core reply.
pub const CORE_REPLY_START: &[u8] = b"RTR";
/// End marker of a core request.
pub const CORE_REQUEST_END: &[u8] = b"\r\n\r\n";
/// End marker of replies (both families) and classic requests.
pub const LINE_END: &[u8] = b"\r\n";
/// Byte announcing the checksum in a frame.
pub const CHECKSUM_MARKER: u8 = b'C';

// ============================================================================
// Sizes
// ============================================================================

/// Default maximum payload of a core frame.
pub const CORE_MAX_PAYLOAD: usize = 1024;
/// Default maximum payload of a classic frame.
pub const CLASSIC_MAX_PAYLOAD: usize = 512;
/// Fixed payload size of a classic request.
pub const CLASSIC_REQUEST_PAYLOAD: usize = 13;
/// Size of one classic eeprom bank.
pub const CLASSIC_BANK_SIZE: usize = 256;
/// Maximum number of bytes a single classic write may carry.
pub const CLASSIC_WRITE_WINDOW: usize = 10;

// ============================================================================
// Classic instruction codes
// ============================================================================

/// Read a full eeprom bank.
pub const CLASSIC_READ_EEPROM: [u8; 2] = *b"EL";
/// Write up to [`CLASSIC_WRITE_WINDOW`] bytes into a bank.
pub const CLASSIC_WRITE_EEPROM: [u8; 2] = *b"WE";
/// Activate the written eeprom content.
pub const CLASSIC_ACTIVATE_EEPROM: [u8; 2] = *b"AE";
/// Query the firmware version.
pub const CLASSIC_FIRMWARE_VERSION: [u8; 2] = *b"FV";
/// Execute a basic action.
pub const CLASSIC_BASIC_ACTION: [u8; 2] = *b"BA";

// ============================================================================
// Core instruction codes
// ============================================================================

/// Read a memory range.
pub const CORE_MEMORY_READ: [u8; 2] = *b"MR";
/// Write a memory range.
pub const CORE_MEMORY_WRITE: [u8; 2] = *b"MW";
/// Execute a basic action.
pub const CORE_BASIC_ACTION: [u8; 2] = *b"BA";
/// Status information (firmware version, modes).
pub const CORE_STATUS: [u8; 2] = *b"ST";
/// Unsolicited event.
pub const CORE_EVENT: [u8; 2] = *b"EV";

// ============================================================================
// Core values
// ============================================================================

/// Memory type character for eeprom.
pub const CORE_MEMORY_EEPROM: u8 = b'E';
/// Memory type character for fram.
pub const CORE_MEMORY_FRAM: u8 = b'F';
/// Result character of an accepted memory write.
pub const CORE_WRITE_OK: u8 = b'O';
/// Status info type carrying the firmware version.
pub const CORE_STATUS_FIRMWARE_VERSION: u8 = 1;
/// Basic action type of system actions.
pub const CORE_ACTION_TYPE_SYSTEM: u8 = 200;
/// System action that activates the eeprom.
pub const CORE_ACTION_ACTIVATE_EEPROM: u8 = 1;
/// Event type of system events.
pub const CORE_EVENT_TYPE_SYSTEM: u8 = 248;
/// System event action reporting an eeprom activation or a completed startup.
pub const CORE_EVENT_ACTION_EEPROM: u8 = 0;
/// Tag used by the core for unsolicited frames.
pub const CORE_EVENT_TAG: u8 = 0;
