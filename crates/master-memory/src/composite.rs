//! Bit-level members packed into a byte or word.
//!
//! A composite field stores several members in one container. The container
//! is one byte or a big-endian word. Writing a member is read-modify-write:
//! the current container bytes are decoded, the member's bits replaced and
//! the container encoded again, so sibling members keep their bits.

use std::collections::BTreeMap;

use crate::address::BitRange;
use crate::enums::EnumDefinition;
use crate::error::ValidationError;
use crate::value::FieldValue;

/// Position of a single bit member.
#[derive(Debug, Clone, Copy)]
pub enum BitPosition {
    /// Same bit for every record.
    Fixed(u8),
    /// Bit chosen from the record index.
    PerRecord(fn(u16) -> u8),
}

impl BitPosition {
    /// Bit used by a record.
    pub fn resolve(&self, index: u16) -> u8 {
        match self {
            BitPosition::Fixed(bit) => *bit,
            BitPosition::PerRecord(f) => f(index),
        }
    }
}

/// Kind of a composite member.
#[derive(Debug, Clone, Copy)]
pub enum MemberKind {
    /// One bit read as a boolean.
    Bit {
        /// Bit position.
        position: BitPosition,
        /// A cleared bit reads as true.
        inverted: bool,
    },
    /// An unsigned bit range scaled to `raw * factor - offset`.
    Number {
        /// Bits of the raw value.
        bits: BitRange,
        /// Subtracted after scaling.
        offset: i32,
        /// Scale factor.
        factor: i32,
        /// Largest valid raw value, defaults to all bits set.
        max: Option<u32>,
    },
    /// A bit range read through an enum definition.
    Enum {
        /// Bits of the raw value.
        bits: BitRange,
        /// Named values.
        definition: &'static EnumDefinition,
    },
}

/// A named member of a composite.
#[derive(Debug, Clone, Copy)]
pub struct CompositeMember {
    /// Member name.
    pub name: &'static str,
    /// Kind and bits.
    pub kind: MemberKind,
}

impl CompositeMember {
    /// A fixed bit.
    pub const fn bit(name: &'static str, position: u8) -> Self {
        CompositeMember {
            name,
            kind: MemberKind::Bit {
                position: BitPosition::Fixed(position),
                inverted: false,
            },
        }
    }

    /// A fixed bit that reads true when cleared.
    pub const fn inverted_bit(name: &'static str, position: u8) -> Self {
        CompositeMember {
            name,
            kind: MemberKind::Bit {
                position: BitPosition::Fixed(position),
                inverted: true,
            },
        }
    }

    /// A bit whose position depends on the record.
    pub const fn record_bit(name: &'static str, position: fn(u16) -> u8) -> Self {
        CompositeMember {
            name,
            kind: MemberKind::Bit {
                position: BitPosition::PerRecord(position),
                inverted: false,
            },
        }
    }

    /// An unscaled number.
    pub const fn number(name: &'static str, start: u8, width: u8) -> Self {
        CompositeMember {
            name,
            kind: MemberKind::Number {
                bits: BitRange::new(start, width),
                offset: 0,
                factor: 1,
                max: None,
            },
        }
    }

    /// An enum stored in a bit range.
    pub const fn enumeration(name: &'static str, start: u8, width: u8, definition: &'static EnumDefinition) -> Self {
        CompositeMember {
            name,
            kind: MemberKind::Enum {
                bits: BitRange::new(start, width),
                definition,
            },
        }
    }

    /// Set the offset of a number member.
    pub const fn with_offset(self, value: i32) -> Self {
        match self.kind {
            MemberKind::Number { bits, factor, max, .. } => CompositeMember {
                name: self.name,
                kind: MemberKind::Number {
                    bits,
                    offset: value,
                    factor,
                    max,
                },
            },
            _ => self,
        }
    }

    /// Set the factor of a number member.
    pub const fn with_factor(self, value: i32) -> Self {
        match self.kind {
            MemberKind::Number { bits, offset, max, .. } => CompositeMember {
                name: self.name,
                kind: MemberKind::Number {
                    bits,
                    offset,
                    factor: value,
                    max,
                },
            },
            _ => self,
        }
    }

    /// Set the largest valid raw value of a number member.
    pub const fn with_max(self, value: u32) -> Self {
        match self.kind {
            MemberKind::Number { bits, offset, factor, .. } => CompositeMember {
                name: self.name,
                kind: MemberKind::Number {
                    bits,
                    offset,
                    factor,
                    max: Some(value),
                },
            },
            _ => self,
        }
    }

    /// Bits used by a record.
    pub fn bits(&self, index: u16) -> BitRange {
        match &self.kind {
            MemberKind::Bit { position, .. } => BitRange::bit(position.resolve(index)),
            MemberKind::Number { bits, .. } | MemberKind::Enum { bits, .. } => *bits,
        }
    }

    /// Decode the member from a container value.
    pub fn decode(&self, container: u32, index: u16) -> Result<FieldValue, ValidationError> {
        let raw = self.bits(index).extract(container);
        match &self.kind {
            MemberKind::Bit { inverted, .. } => Ok(FieldValue::Bool((raw == 1) != *inverted)),
            MemberKind::Number {
                bits,
                offset,
                factor,
                max,
            } => {
                let max = max.unwrap_or(bits.value_mask());
                if raw > max {
                    return Ok(FieldValue::Empty);
                }
                Ok(FieldValue::Int(raw as i64 * *factor as i64 - *offset as i64))
            }
            MemberKind::Enum { definition, .. } => definition.decode(raw).map(|name| FieldValue::Enum(name.to_string())),
        }
    }

    /// Replace the member's bits in a container value.
    pub fn encode(&self, value: &FieldValue, container: u32, index: u16) -> Result<u32, ValidationError> {
        let bits = self.bits(index);
        let raw = match &self.kind {
            MemberKind::Bit { inverted, .. } => match value {
                FieldValue::Bool(v) => u32::from(*v != *inverted),
                other => {
                    return Err(ValidationError::WrongType {
                        expected: "boolean",
                        actual: other.type_name(),
                    })
                }
            },
            MemberKind::Number {
                offset, factor, max, ..
            } => {
                if *value == self.decode(container, index)? {
                    return Ok(container);
                }
                let max = max.unwrap_or(bits.value_mask());
                if value.is_empty() {
                    bits.value_mask()
                } else {
                    let v = value.expect_int("integer")?;
                    let factor = (*factor as i64).max(1);
                    let processed = (v + *offset as i64).div_euclid(factor);
                    if processed < 0 || processed > max as i64 {
                        return Err(ValidationError::OutOfRange {
                            value: v.to_string(),
                            min: -(*offset as i64),
                            max: max as i64 * factor - *offset as i64,
                        });
                    }
                    processed as u32
                }
            }
            MemberKind::Enum { bits, definition } => {
                let name = match value {
                    FieldValue::Enum(s) | FieldValue::Text(s) => s.as_str(),
                    other => {
                        return Err(ValidationError::WrongType {
                            expected: "enum",
                            actual: other.type_name(),
                        })
                    }
                };
                let raw = definition.encode(name)?;
                if raw > bits.value_mask() {
                    return Err(ValidationError::OutOfRange {
                        value: raw.to_string(),
                        min: 0,
                        max: bits.value_mask() as i64,
                    });
                }
                raw
            }
        };
        Ok(bits.insert(container, raw))
    }

    /// Parse text for this member.
    pub fn parse(&self, text: &str) -> Result<FieldValue, ValidationError> {
        match &self.kind {
            MemberKind::Bit { .. } => parse_bool(text).map(FieldValue::Bool),
            MemberKind::Number { .. } => parse_int(text, "integer").map(FieldValue::Int),
            MemberKind::Enum { .. } => Ok(FieldValue::Enum(text.trim().to_string())),
        }
    }
}

/// A named set of members sharing one container.
#[derive(Debug)]
pub struct CompositeDefinition {
    /// Definition name.
    pub name: &'static str,
    /// Container width in bits, 8 or 16.
    pub width: u8,
    /// Members in declaration order.
    pub members: &'static [CompositeMember],
}

impl CompositeDefinition {
    /// Container size in bytes.
    pub const fn size(&self) -> usize {
        if self.width > 8 {
            2
        } else {
            1
        }
    }

    /// Member by name.
    pub fn member(&self, name: &str) -> Option<&CompositeMember> {
        self.members.iter().find(|m| m.name == name)
    }

    /// Read the container value from bytes.
    pub fn container(&self, bytes: &[u8]) -> u32 {
        bytes
            .iter()
            .take(self.size())
            .fold(0u32, |acc, b| (acc << 8) | *b as u32)
    }

    /// Encode a container value as bytes.
    pub fn container_bytes(&self, container: u32) -> Vec<u8> {
        match self.size() {
            1 => vec![container as u8],
            _ => (container as u16).to_be_bytes().to_vec(),
        }
    }

    /// Decode every member.
    pub fn decode(&self, bytes: &[u8], index: u16) -> Result<FieldValue, ValidationError> {
        let container = self.container(bytes);
        let mut members = BTreeMap::new();
        for member in self.members {
            members.insert(member.name.to_string(), member.decode(container, index)?);
        }
        Ok(FieldValue::Composite(members))
    }

    /// Apply the members present in `value` to the current bytes.
    pub fn encode(&self, value: &FieldValue, current: &[u8], index: u16) -> Result<Vec<u8>, ValidationError> {
        let FieldValue::Composite(updates) = value else {
            return Err(ValidationError::WrongType {
                expected: "composite",
                actual: value.type_name(),
            });
        };
        let mut container = self.container(current);
        for (name, update) in updates {
            let member = self.member(name).ok_or_else(|| ValidationError::UnknownField {
                model: self.name,
                field: name.clone(),
            })?;
            container = member.encode(update, container, index)?;
        }
        Ok(self.container_bytes(container))
    }

    /// Apply one member to the current bytes.
    pub fn encode_member(
        &self,
        member: &CompositeMember,
        value: &FieldValue,
        current: &[u8],
        index: u16,
    ) -> Result<Vec<u8>, ValidationError> {
        let container = member.encode(value, self.container(current), index)?;
        Ok(self.container_bytes(container))
    }

    /// Find a member overlapping another or exceeding the width.
    pub fn find_bad_member(&self, index: u16) -> Option<&'static str> {
        for (i, member) in self.members.iter().enumerate() {
            let bits = member.bits(index);
            if bits.width == 0 || bits.end() > self.width as u16 {
                return Some(member.name);
            }
            for other in &self.members[..i] {
                if other.bits(index).overlaps(&bits) {
                    return Some(member.name);
                }
            }
        }
        None
    }

    /// Parse `member=value` pairs separated by commas.
    pub fn parse(&self, text: &str) -> Result<FieldValue, ValidationError> {
        let mut members = BTreeMap::new();
        for pair in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, value) = pair.split_once('=').ok_or_else(|| ValidationError::InvalidText {
                text: pair.to_string(),
                expected: "member=value",
            })?;
            let member = self.member(name.trim()).ok_or_else(|| ValidationError::UnknownField {
                model: self.name,
                field: name.trim().to_string(),
            })?;
            members.insert(member.name.to_string(), member.parse(value)?);
        }
        Ok(FieldValue::Composite(members))
    }
}

pub(crate) fn parse_bool(text: &str) -> Result<bool, ValidationError> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Ok(true),
        "false" | "0" | "off" | "no" => Ok(false),
        _ => Err(ValidationError::InvalidText {
            text: text.to_string(),
            expected: "boolean",
        }),
    }
}

pub(crate) fn parse_int(text: &str, expected: &'static str) -> Result<i64, ValidationError> {
    text.trim().parse::<i64>().map_err(|_| ValidationError::InvalidText {
        text: text.to_string(),
        expected,
    })
}
