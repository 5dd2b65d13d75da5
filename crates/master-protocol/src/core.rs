//! Command set of core masters.
//!
//! Core frames carry a length field, so replies decode without knowing the
//! request. Tag 0 is used by the master for unsolicited [`CoreEvent`]s.

use crate::constants::*;
use crate::error::{CommandCode, ProtocolError, ProtocolResult};

/// Memory type addressed by a memory command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemoryType {
    /// Persistent eeprom, needs activation after a write.
    Eeprom,
    /// Fram holding volatile state.
    Fram,
}

impl MemoryType {
    /// Type character used on the wire.
    pub const fn as_byte(&self) -> u8 {
        match self {
            MemoryType::Eeprom => CORE_MEMORY_EEPROM,
            MemoryType::Fram => CORE_MEMORY_FRAM,
        }
    }

    /// Parse a type character.
    pub fn from_byte(command: [u8; 2], value: u8) -> ProtocolResult<Self> {
        match value {
            CORE_MEMORY_EEPROM => Ok(MemoryType::Eeprom),
            CORE_MEMORY_FRAM => Ok(MemoryType::Fram),
            _ => Err(ProtocolError::InvalidField {
                command: CommandCode(command),
                field: "type",
                value,
            }),
        }
    }
}

/// Commands that can be sent to a core master.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCommand {
    /// Read `length` bytes of a page starting at `start`.
    MemoryRead {
        /// Memory type.
        memory: MemoryType,
        /// Page number.
        page: u16,
        /// First byte.
        start: u8,
        /// Number of bytes.
        length: u8,
    },

    /// Write bytes into a page starting at `start`.
    MemoryWrite {
        /// Memory type.
        memory: MemoryType,
        /// Page number.
        page: u16,
        /// First byte.
        start: u8,
        /// Bytes to write.
        data: Vec<u8>,
    },

    /// Execute a basic action.
    BasicAction {
        /// Action type.
        action_type: u8,
        /// Action.
        action: u8,
        /// Target device.
        device_nr: u16,
        /// Extra parameter.
        extra_parameter: u16,
    },

    /// Query the firmware version.
    FirmwareVersion,
}

impl CoreCommand {
    /// The basic action that activates the eeprom.
    pub fn activate_eeprom() -> Self {
        CoreCommand::BasicAction {
            action_type: CORE_ACTION_TYPE_SYSTEM,
            action: CORE_ACTION_ACTIVATE_EEPROM,
            device_nr: 0,
            extra_parameter: 0,
        }
    }

    /// Instruction code of the command.
    pub fn code(&self) -> [u8; 2] {
        match self {
            CoreCommand::MemoryRead { .. } => CORE_MEMORY_READ,
            CoreCommand::MemoryWrite { .. } => CORE_MEMORY_WRITE,
            CoreCommand::BasicAction { .. } => CORE_BASIC_ACTION,
            CoreCommand::FirmwareVersion => CORE_STATUS,
        }
    }

    /// Encode the command payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            CoreCommand::MemoryRead {
                memory,
                page,
                start,
                length,
            } => {
                buf.push(memory.as_byte());
                buf.extend_from_slice(&page.to_be_bytes());
                buf.push(*start);
                buf.push(*length);
            }
            CoreCommand::MemoryWrite {
                memory,
                page,
                start,
                data,
            } => {
                buf.push(memory.as_byte());
                buf.extend_from_slice(&page.to_be_bytes());
                buf.push(*start);
                buf.extend_from_slice(data);
            }
            CoreCommand::BasicAction {
                action_type,
                action,
                device_nr,
                extra_parameter,
            } => {
                buf.push(*action_type);
                buf.push(*action);
                buf.extend_from_slice(&device_nr.to_be_bytes());
                buf.extend_from_slice(&extra_parameter.to_be_bytes());
            }
            CoreCommand::FirmwareVersion => buf.push(CORE_STATUS_FIRMWARE_VERSION),
        }
        buf
    }

    /// Decode a request payload (master side).
    pub fn decode(code: [u8; 2], payload: &[u8]) -> ProtocolResult<Self> {
        let need = |n: usize| {
            if payload.len() < n {
                Err(ProtocolError::FrameTooShort {
                    expected: n,
                    actual: payload.len(),
                })
            } else {
                Ok(())
            }
        };
        match code {
            CORE_MEMORY_READ => {
                need(5)?;
                Ok(CoreCommand::MemoryRead {
                    memory: MemoryType::from_byte(code, payload[0])?,
                    page: u16::from_be_bytes([payload[1], payload[2]]),
                    start: payload[3],
                    length: payload[4],
                })
            }
            CORE_MEMORY_WRITE => {
                need(5)?;
                Ok(CoreCommand::MemoryWrite {
                    memory: MemoryType::from_byte(code, payload[0])?,
                    page: u16::from_be_bytes([payload[1], payload[2]]),
                    start: payload[3],
                    data: payload[4..].to_vec(),
                })
            }
            CORE_BASIC_ACTION => {
                need(6)?;
                Ok(CoreCommand::BasicAction {
                    action_type: payload[0],
                    action: payload[1],
                    device_nr: u16::from_be_bytes([payload[2], payload[3]]),
                    extra_parameter: u16::from_be_bytes([payload[4], payload[5]]),
                })
            }
            CORE_STATUS => {
                need(1)?;
                if payload[0] != CORE_STATUS_FIRMWARE_VERSION {
                    return Err(ProtocolError::InvalidField {
                        command: CommandCode(code),
                        field: "info_type",
                        value: payload[0],
                    });
                }
                Ok(CoreCommand::FirmwareVersion)
            }
            _ => Err(ProtocolError::UnknownCommand(CommandCode(code))),
        }
    }
}

/// Replies and unsolicited messages sent by a core master.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreResponse {
    /// Result of a memory read.
    MemoryRead {
        /// Memory type.
        memory: MemoryType,
        /// Page number.
        page: u16,
        /// First byte.
        start: u8,
        /// Bytes read.
        data: Vec<u8>,
    },
    /// Result of a memory write.
    MemoryWrite {
        /// Memory type.
        memory: MemoryType,
        /// Page number.
        page: u16,
        /// First byte.
        start: u8,
        /// Number of bytes written.
        length: u8,
        /// Result character, [`CORE_WRITE_OK`] on success.
        result: u8,
    },
    /// Echo of an executed basic action.
    BasicAction {
        /// Action type.
        action_type: u8,
        /// Action.
        action: u8,
        /// Target device.
        device_nr: u16,
        /// Extra parameter.
        extra_parameter: u16,
    },
    /// Firmware version.
    FirmwareVersion {
        /// Major.
        major: u8,
        /// Minor.
        minor: u8,
        /// Patch.
        patch: u8,
    },
    /// Unsolicited event.
    Event(CoreEvent),
}

impl CoreResponse {
    /// Decode a reply payload.
    pub fn decode(code: [u8; 2], payload: &[u8]) -> ProtocolResult<Self> {
        let need = |n: usize| {
            if payload.len() < n {
                Err(ProtocolError::FrameTooShort {
                    expected: n,
                    actual: payload.len(),
                })
            } else {
                Ok(())
            }
        };
        let exact = |n: usize| {
            if payload.len() != n {
                Err(ProtocolError::LengthMismatch {
                    command: CommandCode(code),
                    expected: n,
                    actual: payload.len(),
                })
            } else {
                Ok(())
            }
        };
        match code {
            CORE_MEMORY_READ => {
                need(4)?;
                Ok(CoreResponse::MemoryRead {
                    memory: MemoryType::from_byte(code, payload[0])?,
                    page: u16::from_be_bytes([payload[1], payload[2]]),
                    start: payload[3],
                    data: payload[4..].to_vec(),
                })
            }
            CORE_MEMORY_WRITE => {
                exact(6)?;
                Ok(CoreResponse::MemoryWrite {
                    memory: MemoryType::from_byte(code, payload[0])?,
                    page: u16::from_be_bytes([payload[1], payload[2]]),
                    start: payload[3],
                    length: payload[4],
                    result: payload[5],
                })
            }
            CORE_BASIC_ACTION => {
                exact(6)?;
                Ok(CoreResponse::BasicAction {
                    action_type: payload[0],
                    action: payload[1],
                    device_nr: u16::from_be_bytes([payload[2], payload[3]]),
                    extra_parameter: u16::from_be_bytes([payload[4], payload[5]]),
                })
            }
            CORE_STATUS => {
                exact(4)?;
                if payload[0] != CORE_STATUS_FIRMWARE_VERSION {
                    return Err(ProtocolError::InvalidField {
                        command: CommandCode(code),
                        field: "info_type",
                        value: payload[0],
                    });
                }
                Ok(CoreResponse::FirmwareVersion {
                    major: payload[1],
                    minor: payload[2],
                    patch: payload[3],
                })
            }
            CORE_EVENT => {
                exact(8)?;
                Ok(CoreResponse::Event(CoreEvent {
                    event_type: payload[0],
                    action: payload[1],
                    device_nr: u16::from_be_bytes([payload[2], payload[3]]),
                    data: [payload[4], payload[5], payload[6], payload[7]],
                }))
            }
            _ => Err(ProtocolError::UnknownCommand(CommandCode(code))),
        }
    }

    /// Instruction code the reply belongs to.
    pub fn code(&self) -> [u8; 2] {
        match self {
            CoreResponse::MemoryRead { .. } => CORE_MEMORY_READ,
            CoreResponse::MemoryWrite { .. } => CORE_MEMORY_WRITE,
            CoreResponse::BasicAction { .. } => CORE_BASIC_ACTION,
            CoreResponse::FirmwareVersion { .. } => CORE_STATUS,
            CoreResponse::Event(_) => CORE_EVENT,
        }
    }

    /// Encode the reply payload (master side).
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            CoreResponse::MemoryRead {
                memory,
                page,
                start,
                data,
            } => {
                buf.push(memory.as_byte());
                buf.extend_from_slice(&page.to_be_bytes());
                buf.push(*start);
                buf.extend_from_slice(data);
            }
            CoreResponse::MemoryWrite {
                memory,
                page,
                start,
                length,
                result,
            } => {
                buf.push(memory.as_byte());
                buf.extend_from_slice(&page.to_be_bytes());
                buf.extend_from_slice(&[*start, *length, *result]);
            }
            CoreResponse::BasicAction {
                action_type,
                action,
                device_nr,
                extra_parameter,
            } => {
                buf.push(*action_type);
                buf.push(*action);
                buf.extend_from_slice(&device_nr.to_be_bytes());
                buf.extend_from_slice(&extra_parameter.to_be_bytes());
            }
            CoreResponse::FirmwareVersion { major, minor, patch } => {
                buf.extend_from_slice(&[CORE_STATUS_FIRMWARE_VERSION, *major, *minor, *patch]);
            }
            CoreResponse::Event(event) => {
                buf.push(event.event_type);
                buf.push(event.action);
                buf.extend_from_slice(&event.device_nr.to_be_bytes());
                buf.extend_from_slice(&event.data);
            }
        }
        buf
    }
}

/// An unsolicited event frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreEvent {
    /// Event type.
    pub event_type: u8,
    /// Action within the type.
    pub action: u8,
    /// Device the event is about.
    pub device_nr: u16,
    /// Event specific data.
    pub data: [u8; 4],
}

/// System events that matter to the memory layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEvent {
    /// The eeprom content was (re)activated.
    EepromActivated,
    /// The master finished its startup.
    StartupCompleted,
}

impl CoreEvent {
    /// The event the master sends after an eeprom activation.
    pub fn eeprom_activated() -> Self {
        CoreEvent {
            event_type: CORE_EVENT_TYPE_SYSTEM,
            action: CORE_EVENT_ACTION_EEPROM,
            device_nr: 0,
            data: [1, 0, 0, 0],
        }
    }

    /// Classify a system event.
    pub fn system(&self) -> Option<SystemEvent> {
        if self.event_type != CORE_EVENT_TYPE_SYSTEM || self.action != CORE_EVENT_ACTION_EEPROM {
            return None;
        }
        if self.data[0] == 0 {
            Some(SystemEvent::StartupCompleted)
        } else {
            Some(SystemEvent::EepromActivated)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_read_layout() {
        let cmd = CoreCommand::MemoryRead {
            memory: MemoryType::Eeprom,
            page: 257,
            start: 32,
            length: 32,
        };
        assert_eq!(cmd.encode(), vec![b'E', 1, 1, 32, 32]);
        assert_eq!(CoreCommand::decode(CORE_MEMORY_READ, &cmd.encode()).expect("decode"), cmd);
    }

    #[test]
    fn test_activate_is_system_basic_action() {
        assert_eq!(CoreCommand::activate_eeprom().encode(), vec![200, 1, 0, 0, 0, 0]);
        assert_eq!(CoreCommand::activate_eeprom().code(), *b"BA");
    }

    #[test]
    fn test_memory_write_reply() {
        let payload = [b'F', 0, 3, 9, 2, CORE_WRITE_OK];
        let response = CoreResponse::decode(CORE_MEMORY_WRITE, &payload).expect("decode");
        assert_eq!(
            response,
            CoreResponse::MemoryWrite {
                memory: MemoryType::Fram,
                page: 3,
                start: 9,
                length: 2,
                result: CORE_WRITE_OK,
            }
        );
        assert_eq!(response.encode(), payload.to_vec());
    }

    #[test]
    fn test_invalid_memory_type() {
        let err = CoreResponse::decode(CORE_MEMORY_READ, &[b'X', 0, 0, 0, 1]).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidField { field: "type", value: b'X', .. }));
    }

    #[test]
    fn test_firmware_version_reply() {
        let response = CoreResponse::decode(CORE_STATUS, &[1, 1, 12, 104]).expect("decode");
        assert_eq!(
            response,
            CoreResponse::FirmwareVersion {
                major: 1,
                minor: 12,
                patch: 104
            }
        );
        assert!(CoreResponse::decode(CORE_STATUS, &[0, 1, 12, 104]).is_err());
        assert!(CoreResponse::decode(CORE_STATUS, &[1, 1]).is_err());
    }

    #[test]
    fn test_system_events() {
        let payload = CoreResponse::Event(CoreEvent::eeprom_activated()).encode();
        match CoreResponse::decode(CORE_EVENT, &payload).expect("decode") {
            CoreResponse::Event(event) => assert_eq!(event.system(), Some(SystemEvent::EepromActivated)),
            other => panic!("unexpected {:?}", other),
        }

        let startup = CoreEvent {
            data: [0; 4],
            ..CoreEvent::eeprom_activated()
        };
        assert_eq!(startup.system(), Some(SystemEvent::StartupCompleted));

        let output = CoreEvent {
            event_type: 0,
            action: 1,
            device_nr: 5,
            data: [0; 4],
        };
        assert_eq!(output.system(), None);
    }
}
