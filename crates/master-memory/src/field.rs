//! Field kinds and their byte encodings.
//!
//! [`FieldKind`] is the closed set of encodings found in master memory. Every
//! kind knows its size, how to decode bytes into a [`FieldValue`], how to
//! encode a value (validating it first) and how to parse one from text.
//!
//! ```rust
//! use master_memory::{ByteOrder, FieldKind, FieldValue};
//!
//! let word = FieldKind::Word(ByteOrder::Little);
//! assert_eq!(word.encode(&FieldValue::Int(0x1234), &[0, 0], 0).unwrap(), vec![0x34, 0x12]);
//! assert_eq!(word.decode(&[0x34, 0x12], 0).unwrap(), FieldValue::Int(0x1234));
//! ```

use crate::composite::{parse_bool, parse_int, CompositeDefinition};
use crate::enums::EnumDefinition;
use crate::error::ValidationError;
use crate::value::{BasicAction, FieldValue};

/// Byte order of a word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Most significant byte first (core).
    Big,
    /// Least significant byte first (classic).
    Little,
}

/// Lowest temperature a temperature byte can hold.
pub const TEMPERATURE_MIN: f64 = -32.0;
/// Highest temperature a temperature byte can hold.
pub const TEMPERATURE_MAX: f64 = 95.0;

/// Encoding of a field.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    /// One unsigned byte.
    Byte,
    /// Two byte unsigned integer.
    Word(ByteOrder),
    /// Three byte big-endian unsigned integer.
    Word3,
    /// A byte with distinct true and false values.
    Boolean {
        /// Raw value of true.
        true_value: u8,
        /// Raw value of false.
        false_value: u8,
        /// Decoded value of any other byte.
        fallback: bool,
    },
    /// Half degrees offset by -32, 255 when unset.
    Temperature,
    /// Ten minute steps since midnight, shown as `HH:MM`.
    Time,
    /// Text padded with 255.
    Text {
        /// Length in bytes.
        length: u16,
    },
    /// Raw bytes.
    Bytes {
        /// Length in bytes.
        length: u16,
    },
    /// Comma separated numbers, padded with 255.
    List {
        /// Length in bytes.
        length: u16,
        /// Bytes per item, trailing all-255 items are padding.
        unit: u8,
    },
    /// Module address, zero padded octets joined by dots.
    Address {
        /// Number of octets.
        length: u16,
    },
    /// Three byte version, shown as `a.b.c`.
    Version,
    /// Six byte basic action.
    BasicAction,
    /// One byte named through an enum definition.
    Enum(&'static EnumDefinition),
    /// Bit-level members in a byte or word.
    Composite(&'static CompositeDefinition),
}

impl FieldKind {
    /// Core boolean: 255 true, 0 false.
    pub const CORE_BOOLEAN: FieldKind = FieldKind::Boolean {
        true_value: 255,
        false_value: 0,
        fallback: true,
    };

    /// Classic inverted boolean: any byte below 255 is true.
    pub const CLASSIC_BOOLEAN: FieldKind = FieldKind::Boolean {
        true_value: 0,
        false_value: 255,
        fallback: true,
    };

    /// Size in bytes.
    pub const fn size(&self) -> usize {
        match self {
            FieldKind::Byte
            | FieldKind::Boolean { .. }
            | FieldKind::Temperature
            | FieldKind::Time
            | FieldKind::Enum(_) => 1,
            FieldKind::Word(_) => 2,
            FieldKind::Word3 | FieldKind::Version => 3,
            FieldKind::BasicAction => 6,
            FieldKind::Text { length }
            | FieldKind::Bytes { length }
            | FieldKind::List { length, .. }
            | FieldKind::Address { length } => *length as usize,
            FieldKind::Composite(definition) => definition.size(),
        }
    }

    /// Short name of the kind.
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Byte => "byte",
            FieldKind::Word(_) => "word",
            FieldKind::Word3 => "word3",
            FieldKind::Boolean { .. } => "boolean",
            FieldKind::Temperature => "temperature",
            FieldKind::Time => "time",
            FieldKind::Text { .. } => "text",
            FieldKind::Bytes { .. } => "bytes",
            FieldKind::List { .. } => "list",
            FieldKind::Address { .. } => "address",
            FieldKind::Version => "version",
            FieldKind::BasicAction => "basic_action",
            FieldKind::Enum(definition) => definition.name,
            FieldKind::Composite(definition) => definition.name,
        }
    }

    /// Value of an extension field nothing was stored for.
    pub fn default_value(&self) -> FieldValue {
        match self {
            FieldKind::Byte => FieldValue::Int(255),
            FieldKind::Word(_) => FieldValue::Int(65535),
            FieldKind::Word3 => FieldValue::Int(0xFF_FFFF),
            FieldKind::Boolean { .. } => FieldValue::Bool(false),
            FieldKind::Text { .. } | FieldKind::List { .. } => FieldValue::Text(String::new()),
            FieldKind::Bytes { length } => FieldValue::Bytes(vec![255; *length as usize]),
            FieldKind::BasicAction => FieldValue::BasicAction(BasicAction::EMPTY),
            FieldKind::Enum(definition) => definition
                .default_name()
                .map(|name| FieldValue::Enum(name.to_string()))
                .unwrap_or(FieldValue::Empty),
            FieldKind::Temperature
            | FieldKind::Time
            | FieldKind::Address { .. }
            | FieldKind::Version
            | FieldKind::Composite(_) => FieldValue::Empty,
        }
    }

    /// Decode field bytes. `bytes` holds exactly [`size`](FieldKind::size) bytes.
    pub fn decode(&self, bytes: &[u8], index: u16) -> Result<FieldValue, ValidationError> {
        if bytes.len() != self.size() {
            return Err(ValidationError::BadLength {
                expected: self.size(),
                actual: bytes.len(),
            });
        }
        let value = match self {
            FieldKind::Byte => FieldValue::Int(bytes[0] as i64),
            FieldKind::Word(ByteOrder::Big) => FieldValue::Int(u16::from_be_bytes([bytes[0], bytes[1]]) as i64),
            FieldKind::Word(ByteOrder::Little) => FieldValue::Int(u16::from_le_bytes([bytes[0], bytes[1]]) as i64),
            FieldKind::Word3 => {
                FieldValue::Int(((bytes[0] as i64) << 16) | ((bytes[1] as i64) << 8) | bytes[2] as i64)
            }
            FieldKind::Boolean {
                true_value,
                false_value,
                fallback,
            } => FieldValue::Bool(match bytes[0] {
                b if b == *true_value => true,
                b if b == *false_value => false,
                _ => *fallback,
            }),
            FieldKind::Temperature => match bytes[0] {
                255 => FieldValue::Empty,
                raw => FieldValue::Float(raw as f64 / 2.0 + TEMPERATURE_MIN),
            },
            FieldKind::Time => {
                let raw = bytes[0];
                FieldValue::Text(format!("{:02}:{:02}", raw / 6, (raw % 6) * 10))
            }
            FieldKind::Text { .. } => {
                let end = bytes
                    .iter()
                    .rposition(|b| *b != 0 && *b != 255)
                    .map(|i| i + 1)
                    .unwrap_or(0);
                let text = bytes[..end]
                    .iter()
                    .map(|b| if (32..=126).contains(b) { *b as char } else { ' ' })
                    .collect();
                FieldValue::Text(text)
            }
            FieldKind::Bytes { .. } => FieldValue::Bytes(bytes.to_vec()),
            FieldKind::List { unit, .. } => {
                let unit = (*unit).max(1) as usize;
                let mut end = bytes.len();
                while end >= unit && bytes[end - unit..end].iter().all(|b| *b == 255) {
                    end -= unit;
                }
                let items: Vec<String> = bytes[..end].iter().map(|b| b.to_string()).collect();
                FieldValue::Text(items.join(","))
            }
            FieldKind::Address { .. } => {
                let octets: Vec<String> = bytes.iter().map(|b| format!("{:03}", b)).collect();
                FieldValue::Text(octets.join("."))
            }
            FieldKind::Version => FieldValue::Text(format!("{}.{}.{}", bytes[0], bytes[1], bytes[2])),
            FieldKind::BasicAction => FieldValue::BasicAction(BasicAction {
                action_type: bytes[0],
                action: bytes[1],
                device_nr: u16::from_be_bytes([bytes[2], bytes[3]]),
                extra_parameter: u16::from_be_bytes([bytes[4], bytes[5]]),
            }),
            FieldKind::Enum(definition) => FieldValue::Enum(definition.decode(bytes[0] as u32)?.to_string()),
            FieldKind::Composite(definition) => definition.decode(bytes, index)?,
        };
        Ok(value)
    }

    /// Encode a value into field bytes.
    ///
    /// `current` holds the bytes in memory now; composites only replace the
    /// members present in the value.
    pub fn encode(&self, value: &FieldValue, current: &[u8], index: u16) -> Result<Vec<u8>, ValidationError> {
        let bytes = match self {
            FieldKind::Byte => vec![ranged(value, 0, 255)? as u8],
            FieldKind::Word(order) => {
                let v = ranged(value, 0, 65535)? as u16;
                match order {
                    ByteOrder::Big => v.to_be_bytes().to_vec(),
                    ByteOrder::Little => v.to_le_bytes().to_vec(),
                }
            }
            FieldKind::Word3 => {
                let v = ranged(value, 0, 0xFF_FFFF)? as u32;
                v.to_be_bytes()[1..].to_vec()
            }
            FieldKind::Boolean {
                true_value,
                false_value,
                ..
            } => match value {
                FieldValue::Bool(true) => vec![*true_value],
                FieldValue::Bool(false) => vec![*false_value],
                other => return Err(wrong_type("boolean", other)),
            },
            FieldKind::Temperature => match value {
                FieldValue::Empty => vec![255],
                other => {
                    let v = other.as_float().ok_or_else(|| wrong_type("temperature", other))?;
                    if !(TEMPERATURE_MIN..=TEMPERATURE_MAX).contains(&v) {
                        return Err(ValidationError::OutOfRange {
                            value: v.to_string(),
                            min: TEMPERATURE_MIN as i64,
                            max: TEMPERATURE_MAX as i64,
                        });
                    }
                    vec![((v - TEMPERATURE_MIN) * 2.0) as u8]
                }
            },
            FieldKind::Time => match value {
                FieldValue::Empty => vec![255],
                other => vec![parse_time(other.expect_str("time")?)?],
            },
            FieldKind::Text { length } => {
                let text = value.expect_str("text")?;
                if !text.is_ascii() {
                    return Err(ValidationError::InvalidText {
                        text: text.to_string(),
                        expected: "ascii text",
                    });
                }
                padded(text.as_bytes().to_vec(), *length as usize)?
            }
            FieldKind::Bytes { length } => match value {
                FieldValue::Bytes(bytes) if bytes.len() == *length as usize => bytes.clone(),
                FieldValue::Bytes(bytes) => {
                    return Err(ValidationError::BadLength {
                        expected: *length as usize,
                        actual: bytes.len(),
                    })
                }
                other => return Err(wrong_type("bytes", other)),
            },
            FieldKind::List { length, .. } => {
                let items = match value {
                    FieldValue::Bytes(bytes) => bytes.clone(),
                    FieldValue::Empty => Vec::new(),
                    other => parse_octets(other.expect_str("list")?, ',')?,
                };
                padded(items, *length as usize)?
            }
            FieldKind::Address { length } => {
                let octets = parse_octets(value.expect_str("address")?, '.')?;
                if octets.len() != *length as usize {
                    return Err(ValidationError::BadLength {
                        expected: *length as usize,
                        actual: octets.len(),
                    });
                }
                octets
            }
            FieldKind::Version => {
                let parts = parse_octets(value.expect_str("version")?, '.')?;
                if parts.len() != 3 {
                    return Err(ValidationError::BadLength {
                        expected: 3,
                        actual: parts.len(),
                    });
                }
                parts
            }
            FieldKind::BasicAction => match value {
                FieldValue::BasicAction(action) => {
                    let mut bytes = vec![action.action_type, action.action];
                    bytes.extend_from_slice(&action.device_nr.to_be_bytes());
                    bytes.extend_from_slice(&action.extra_parameter.to_be_bytes());
                    bytes
                }
                other => return Err(wrong_type("basic action", other)),
            },
            FieldKind::Enum(definition) => {
                let name = match value {
                    FieldValue::Enum(s) | FieldValue::Text(s) => s.as_str(),
                    other => return Err(wrong_type("enum", other)),
                };
                let raw = definition.encode(name)?;
                if raw > 255 {
                    return Err(ValidationError::OutOfRange {
                        value: raw.to_string(),
                        min: 0,
                        max: 255,
                    });
                }
                vec![raw as u8]
            }
            FieldKind::Composite(definition) => definition.encode(value, current, index)?,
        };
        Ok(bytes)
    }

    /// Parse a value from text.
    pub fn parse(&self, text: &str) -> Result<FieldValue, ValidationError> {
        let trimmed = text.trim();
        match self {
            FieldKind::Byte | FieldKind::Word(_) | FieldKind::Word3 => {
                parse_int(trimmed, "integer").map(FieldValue::Int)
            }
            FieldKind::Boolean { .. } => parse_bool(trimmed).map(FieldValue::Bool),
            FieldKind::Temperature => {
                if trimmed.is_empty() {
                    return Ok(FieldValue::Empty);
                }
                trimmed
                    .parse::<f64>()
                    .map(FieldValue::Float)
                    .map_err(|_| ValidationError::InvalidText {
                        text: text.to_string(),
                        expected: "temperature",
                    })
            }
            FieldKind::Time if trimmed.is_empty() => Ok(FieldValue::Empty),
            FieldKind::Text { .. } => Ok(FieldValue::Text(text.to_string())),
            FieldKind::Time | FieldKind::List { .. } | FieldKind::Address { .. } | FieldKind::Version => {
                Ok(FieldValue::Text(trimmed.to_string()))
            }
            FieldKind::Bytes { .. } => parse_octets(trimmed, ',').map(FieldValue::Bytes),
            FieldKind::BasicAction => {
                let parts: Vec<i64> = trimmed
                    .split(',')
                    .map(|p| parse_int(p, "basic action"))
                    .collect::<Result<_, _>>()?;
                let [action_type, action, device_nr, extra_parameter] = parts[..] else {
                    return Err(ValidationError::InvalidText {
                        text: text.to_string(),
                        expected: "type,action,device,extra",
                    });
                };
                Ok(FieldValue::BasicAction(BasicAction {
                    action_type: in_range(action_type, 255)? as u8,
                    action: in_range(action, 255)? as u8,
                    device_nr: in_range(device_nr, 65535)? as u16,
                    extra_parameter: in_range(extra_parameter, 65535)? as u16,
                }))
            }
            FieldKind::Enum(_) => Ok(FieldValue::Enum(trimmed.to_string())),
            FieldKind::Composite(definition) => definition.parse(trimmed),
        }
    }
}

fn wrong_type(expected: &'static str, value: &FieldValue) -> ValidationError {
    ValidationError::WrongType {
        expected,
        actual: value.type_name(),
    }
}

fn in_range(v: i64, max: i64) -> Result<i64, ValidationError> {
    if (0..=max).contains(&v) {
        Ok(v)
    } else {
        Err(ValidationError::OutOfRange {
            value: v.to_string(),
            min: 0,
            max,
        })
    }
}

fn ranged(value: &FieldValue, min: i64, max: i64) -> Result<i64, ValidationError> {
    let v = value.expect_int("integer")?;
    if v < min || v > max {
        return Err(ValidationError::OutOfRange {
            value: v.to_string(),
            min,
            max,
        });
    }
    Ok(v)
}

/// Pad with 255 up to `length`.
fn padded(mut bytes: Vec<u8>, length: usize) -> Result<Vec<u8>, ValidationError> {
    if bytes.len() > length {
        return Err(ValidationError::BadLength {
            expected: length,
            actual: bytes.len(),
        });
    }
    bytes.resize(length, 255);
    Ok(bytes)
}

fn parse_octets(text: &str, separator: char) -> Result<Vec<u8>, ValidationError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    text.split(separator)
        .map(|part| {
            let v = parse_int(part, "number list")?;
            in_range(v, 255).map(|v| v as u8)
        })
        .collect()
}

fn parse_time(text: &str) -> Result<u8, ValidationError> {
    let invalid = || ValidationError::InvalidText {
        text: text.to_string(),
        expected: "HH:MM",
    };
    let (hours, minutes) = text.trim().split_once(':').ok_or_else(invalid)?;
    let hours: u8 = hours.parse().map_err(|_| invalid())?;
    let minutes: u8 = minutes.parse().map_err(|_| invalid())?;
    if hours > 24 || minutes > 59 || (hours == 24 && minutes > 0) {
        return Err(invalid());
    }
    Ok(hours * 6 + minutes / 10)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composite::CompositeMember;
    use crate::enums::EnumEntry;

    static TIMER: EnumDefinition = EnumDefinition {
        name: "TimerType",
        entries: &[
            EnumEntry::new("INACTIVE", &[0, 255]),
            EnumEntry::new("PER_100_MS", &[1]),
            EnumEntry::new("PER_1_S", &[2]),
            EnumEntry::new("ABSOLUTE", &[3]),
        ],
    };

    static DEBUG: CompositeDefinition = CompositeDefinition {
        name: "Debug",
        width: 8,
        members: &[
            CompositeMember::bit("disable_ba_events", 0),
            CompositeMember::bit("enable_health_check", 3),
        ],
    };

    fn round_trip(kind: FieldKind, value: FieldValue) {
        let current = vec![0xFF; kind.size()];
        let bytes = kind.encode(&value, &current, 0).expect("encode");
        assert_eq!(bytes.len(), kind.size());
        assert_eq!(kind.decode(&bytes, 0).expect("decode"), value, "{}", kind.name());
    }

    #[test]
    fn test_scalar_round_trips() {
        round_trip(FieldKind::Byte, FieldValue::Int(17));
        round_trip(FieldKind::Word(ByteOrder::Big), FieldValue::Int(0xBEEF));
        round_trip(FieldKind::Word(ByteOrder::Little), FieldValue::Int(300));
        round_trip(FieldKind::Word3, FieldValue::Int(0x01_0203));
        round_trip(FieldKind::CORE_BOOLEAN, FieldValue::Bool(false));
        round_trip(FieldKind::CLASSIC_BOOLEAN, FieldValue::Bool(true));
        round_trip(FieldKind::Temperature, FieldValue::Float(21.5));
        round_trip(FieldKind::Temperature, FieldValue::Empty);
        round_trip(FieldKind::Time, FieldValue::Text("07:30".into()));
        round_trip(FieldKind::Text { length: 16 }, FieldValue::Text("Kitchen".into()));
        round_trip(FieldKind::Version, FieldValue::Text("1.0.160".into()));
        round_trip(FieldKind::Address { length: 4 }, FieldValue::Text("079.000.012.003".into()));
        round_trip(FieldKind::List { length: 32, unit: 1 }, FieldValue::Text("3,5,8".into()));
        round_trip(
            FieldKind::BasicAction,
            FieldValue::BasicAction(BasicAction {
                action_type: 0,
                action: 1,
                device_nr: 300,
                extra_parameter: 2,
            }),
        );
        round_trip(FieldKind::Enum(&TIMER), FieldValue::Enum("ABSOLUTE".into()));
    }

    #[test]
    fn test_word_orders() {
        let value = FieldValue::Int(0x1234);
        assert_eq!(
            FieldKind::Word(ByteOrder::Big).encode(&value, &[0, 0], 0).expect("be"),
            vec![0x12, 0x34]
        );
        assert_eq!(
            FieldKind::Word(ByteOrder::Little).encode(&value, &[0, 0], 0).expect("le"),
            vec![0x34, 0x12]
        );
    }

    #[test]
    fn test_range_checks() {
        assert!(matches!(
            FieldKind::Byte.encode(&FieldValue::Int(256), &[0], 0),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(matches!(
            FieldKind::Word(ByteOrder::Big).encode(&FieldValue::Int(-1), &[0, 0], 0),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(matches!(
            FieldKind::Temperature.encode(&FieldValue::Float(96.0), &[0], 0),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(matches!(
            FieldKind::Byte.encode(&FieldValue::Text("x".into()), &[0], 0),
            Err(ValidationError::WrongType { .. })
        ));
    }

    #[test]
    fn test_temperature_encoding() {
        assert_eq!(FieldKind::Temperature.encode(&FieldValue::Float(-32.0), &[0], 0).expect("min"), vec![0]);
        assert_eq!(FieldKind::Temperature.encode(&FieldValue::Float(95.0), &[0], 0).expect("max"), vec![254]);
        assert_eq!(FieldKind::Temperature.encode(&FieldValue::Int(20), &[0], 0).expect("int"), vec![104]);
        assert_eq!(FieldKind::Temperature.decode(&[255], 0).expect("empty"), FieldValue::Empty);
    }

    #[test]
    fn test_text_rules() {
        let kind = FieldKind::Text { length: 8 };
        let bytes = kind.encode(&FieldValue::Text("Hall".into()), &[], 0).expect("encode");
        assert_eq!(bytes, b"Hall\xFF\xFF\xFF\xFF".to_vec());
        assert_eq!(
            kind.decode(b"A\x01B\0\0\xFF\0\xFF", 0).expect("decode"),
            FieldValue::Text("A B".into())
        );
        assert!(matches!(
            kind.encode(&FieldValue::Text("far too long".into()), &[], 0),
            Err(ValidationError::BadLength { expected: 8, actual: 12 })
        ));
    }

    #[test]
    fn test_action_list_padding() {
        let kind = FieldKind::List { length: 8, unit: 2 };
        let bytes = kind.encode(&FieldValue::Text("1,2,255".into()), &[], 0).expect("encode");
        assert_eq!(bytes, vec![1, 2, 255, 255, 255, 255, 255, 255]);
        assert_eq!(kind.decode(&bytes, 0).expect("decode"), FieldValue::Text("1,2".into()));
        assert_eq!(
            kind.decode(&[1, 2, 255, 7, 255, 255, 255, 255], 0).expect("decode"),
            FieldValue::Text("1,2,255,7".into())
        );
    }

    #[test]
    fn test_booleans() {
        assert_eq!(FieldKind::CORE_BOOLEAN.decode(&[17], 0).expect("fallback"), FieldValue::Bool(true));
        assert_eq!(FieldKind::CLASSIC_BOOLEAN.decode(&[12], 0).expect("below"), FieldValue::Bool(true));
        assert_eq!(FieldKind::CLASSIC_BOOLEAN.decode(&[255], 0).expect("unset"), FieldValue::Bool(false));
    }

    #[test]
    fn test_time() {
        assert_eq!(FieldKind::Time.decode(&[45], 0).expect("time"), FieldValue::Text("07:30".into()));
        assert!(FieldKind::Time.encode(&FieldValue::Text("7h30".into()), &[0], 0).is_err());
        assert_eq!(FieldKind::Time.encode(&FieldValue::Text("24:00".into()), &[0], 0).expect("end"), vec![144]);
    }

    #[test]
    fn test_unknown_enum_value() {
        assert!(matches!(
            FieldKind::Enum(&TIMER).decode(&[9], 0),
            Err(ValidationError::UnknownEnumValue { value: 9, .. })
        ));
        assert_eq!(
            FieldKind::Enum(&TIMER).decode(&[255], 0).expect("inactive"),
            FieldValue::Enum("INACTIVE".into())
        );
    }

    #[test]
    fn test_composite_partial_encode() {
        let kind = FieldKind::Composite(&DEBUG);
        let value = kind.parse("enable_health_check=true").expect("parse");
        let bytes = kind.encode(&value, &[0b0000_0001], 0).expect("encode");
        assert_eq!(bytes, vec![0b0000_1001]);
        let decoded = kind.decode(&bytes, 0).expect("decode");
        assert_eq!(decoded.member("disable_ba_events"), Some(&FieldValue::Bool(true)));
    }

    #[test]
    fn test_parse() {
        assert_eq!(FieldKind::Byte.parse(" 12 ").expect("int"), FieldValue::Int(12));
        assert_eq!(FieldKind::CORE_BOOLEAN.parse("on").expect("bool"), FieldValue::Bool(true));
        assert_eq!(
            FieldKind::BasicAction.parse("0,1,300,2").expect("action"),
            FieldValue::BasicAction(BasicAction {
                action_type: 0,
                action: 1,
                device_nr: 300,
                extra_parameter: 2
            })
        );
        assert!(FieldKind::BasicAction.parse("0,1").is_err());
        assert_eq!(FieldKind::Temperature.parse("").expect("empty"), FieldValue::Empty);
    }

    #[test]
    fn test_defaults() {
        assert_eq!(FieldKind::Byte.default_value(), FieldValue::Int(255));
        assert_eq!(FieldKind::Word(ByteOrder::Little).default_value(), FieldValue::Int(65535));
        assert_eq!(FieldKind::Text { length: 16 }.default_value(), FieldValue::Text(String::new()));
        assert_eq!(FieldKind::CLASSIC_BOOLEAN.default_value(), FieldValue::Bool(false));
    }
}
