//! Command set of classic masters.
//!
//! Classic requests always carry a fixed 13 byte payload and classic replies
//! carry no length field, so every command knows the size of its reply.

use crate::constants::*;
use crate::error::{CommandCode, ProtocolError, ProtocolResult};

/// Commands that can be sent to a classic master.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassicCommand {
    /// Read one full eeprom bank.
    ReadEeprom {
        /// Bank number.
        bank: u8,
    },

    /// Write at most [`CLASSIC_WRITE_WINDOW`] bytes into a bank.
    WriteEeprom {
        /// Bank number.
        bank: u8,
        /// Offset inside the bank.
        address: u8,
        /// Bytes to write.
        data: Vec<u8>,
    },

    /// Make the master load the written eeprom content.
    ActivateEeprom,

    /// Query the firmware version.
    FirmwareVersion,

    /// Execute a basic action.
    BasicAction {
        /// Action type.
        action_type: u8,
        /// Action.
        action: u8,
        /// Target device.
        device_nr: u8,
        /// Extra parameter.
        extra_parameter: u8,
    },
}

impl ClassicCommand {
    /// Instruction code of the command.
    pub fn code(&self) -> [u8; 2] {
        match self {
            ClassicCommand::ReadEeprom { .. } => CLASSIC_READ_EEPROM,
            ClassicCommand::WriteEeprom { .. } => CLASSIC_WRITE_EEPROM,
            ClassicCommand::ActivateEeprom => CLASSIC_ACTIVATE_EEPROM,
            ClassicCommand::FirmwareVersion => CLASSIC_FIRMWARE_VERSION,
            ClassicCommand::BasicAction { .. } => CLASSIC_BASIC_ACTION,
        }
    }

    /// Payload length of the reply to this command.
    pub fn reply_len(&self) -> usize {
        reply_len(self.code()).unwrap_or(0)
    }

    /// Encode the command payload (without padding).
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(CLASSIC_REQUEST_PAYLOAD);
        match self {
            ClassicCommand::ReadEeprom { bank } => buf.push(*bank),
            ClassicCommand::WriteEeprom { bank, address, data } => {
                if data.is_empty() || data.len() > CLASSIC_WRITE_WINDOW {
                    return Err(ProtocolError::FrameTooLong {
                        max: CLASSIC_WRITE_WINDOW,
                        actual: data.len(),
                    });
                }
                if *address as usize + data.len() > CLASSIC_BANK_SIZE {
                    return Err(ProtocolError::FrameTooLong {
                        max: CLASSIC_BANK_SIZE - *address as usize,
                        actual: data.len(),
                    });
                }
                buf.push(*bank);
                buf.push(*address);
                buf.push(data.len() as u8);
                buf.extend_from_slice(data);
            }
            ClassicCommand::ActivateEeprom | ClassicCommand::FirmwareVersion => {}
            ClassicCommand::BasicAction {
                action_type,
                action,
                device_nr,
                extra_parameter,
            } => {
                buf.extend_from_slice(&[*action_type, *action, *device_nr, *extra_parameter]);
            }
        }
        Ok(buf)
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
            CLASSIC_READ_EEPROM => {
                need(1)?;
                Ok(ClassicCommand::ReadEeprom { bank: payload[0] })
            }
            CLASSIC_WRITE_EEPROM => {
                need(3)?;
                let length = payload[2] as usize;
                if length == 0 || length > CLASSIC_WRITE_WINDOW {
                    return Err(ProtocolError::InvalidField {
                        command: CommandCode(code),
                        field: "length",
                        value: payload[2],
                    });
                }
                need(3 + length)?;
                Ok(ClassicCommand::WriteEeprom {
                    bank: payload[0],
                    address: payload[1],
                    data: payload[3..3 + length].to_vec(),
                })
            }
            CLASSIC_ACTIVATE_EEPROM => Ok(ClassicCommand::ActivateEeprom),
            CLASSIC_FIRMWARE_VERSION => Ok(ClassicCommand::FirmwareVersion),
            CLASSIC_BASIC_ACTION => {
                need(4)?;
                Ok(ClassicCommand::BasicAction {
                    action_type: payload[0],
                    action: payload[1],
                    device_nr: payload[2],
                    extra_parameter: payload[3],
                })
            }
            _ => Err(ProtocolError::UnknownCommand(CommandCode(code))),
        }
    }
}

/// Reply payload length of a classic instruction.
pub fn reply_len(code: [u8; 2]) -> Option<usize> {
    match code {
        CLASSIC_READ_EEPROM => Some(1 + CLASSIC_BANK_SIZE),
        CLASSIC_WRITE_EEPROM => Some(3),
        CLASSIC_ACTIVATE_EEPROM => Some(1),
        CLASSIC_FIRMWARE_VERSION => Some(3),
        CLASSIC_BASIC_ACTION => Some(4),
        _ => None,
    }
}

/// Replies sent by a classic master.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassicResponse {
    /// Content of a bank.
    Eeprom {
        /// Bank number.
        bank: u8,
        /// The 256 bank bytes.
        data: Vec<u8>,
    },
    /// Acknowledgment of a write.
    WriteAck {
        /// Bank number.
        bank: u8,
        /// Offset inside the bank.
        address: u8,
        /// Number of bytes written.
        length: u8,
    },
    /// Result of an activation, 0 means success.
    Activated {
        /// Status byte.
        status: u8,
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
    /// Echo of an executed basic action.
    BasicAction {
        /// Action type.
        action_type: u8,
        /// Action.
        action: u8,
        /// Target device.
        device_nr: u8,
        /// Extra parameter.
        extra_parameter: u8,
    },
}

impl ClassicResponse {
    /// Decode a reply payload for the given instruction.
    pub fn decode(code: [u8; 2], payload: &[u8]) -> ProtocolResult<Self> {
        let expected = reply_len(code).ok_or(ProtocolError::UnknownCommand(CommandCode(code)))?;
        if payload.len() != expected {
            return Err(ProtocolError::LengthMismatch {
                command: CommandCode(code),
                expected,
                actual: payload.len(),
            });
        }
        let response = match code {
            CLASSIC_READ_EEPROM => ClassicResponse::Eeprom {
                bank: payload[0],
                data: payload[1..].to_vec(),
            },
            CLASSIC_WRITE_EEPROM => ClassicResponse::WriteAck {
                bank: payload[0],
                address: payload[1],
                length: payload[2],
            },
            CLASSIC_ACTIVATE_EEPROM => ClassicResponse::Activated { status: payload[0] },
            CLASSIC_FIRMWARE_VERSION => ClassicResponse::FirmwareVersion {
                major: payload[0],
                minor: payload[1],
                patch: payload[2],
            },
            _ => ClassicResponse::BasicAction {
                action_type: payload[0],
                action: payload[1],
                device_nr: payload[2],
                extra_parameter: payload[3],
            },
        };
        Ok(response)
    }

    /// Instruction code the reply belongs to.
    pub fn code(&self) -> [u8; 2] {
        match self {
            ClassicResponse::Eeprom { .. } => CLASSIC_READ_EEPROM,
            ClassicResponse::WriteAck { .. } => CLASSIC_WRITE_EEPROM,
            ClassicResponse::Activated { .. } => CLASSIC_ACTIVATE_EEPROM,
            ClassicResponse::FirmwareVersion { .. } => CLASSIC_FIRMWARE_VERSION,
            ClassicResponse::BasicAction { .. } => CLASSIC_BASIC_ACTION,
        }
    }

    /// Encode the reply payload (master side).
    pub fn encode(&self) -> Vec<u8> {
        match self {
            ClassicResponse::Eeprom { bank, data } => {
                let mut buf = Vec::with_capacity(1 + CLASSIC_BANK_SIZE);
                buf.push(*bank);
                buf.extend_from_slice(data);
                buf.resize(1 + CLASSIC_BANK_SIZE, 0xFF);
                buf
            }
            ClassicResponse::WriteAck { bank, address, length } => vec![*bank, *address, *length],
            ClassicResponse::Activated { status } => vec![*status],
            ClassicResponse::FirmwareVersion { major, minor, patch } => vec![*major, *minor, *patch],
            ClassicResponse::BasicAction {
                action_type,
                action,
                device_nr,
                extra_parameter,
            } => vec![*action_type, *action, *device_nr, *extra_parameter],
        }
    }
}
