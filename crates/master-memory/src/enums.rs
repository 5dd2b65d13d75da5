//! Named values of enum fields.

use crate::error::ValidationError;

/// One entry of an enum definition.
#[derive(Debug, Clone, Copy)]
pub struct EnumEntry {
    /// Entry name.
    pub name: &'static str,
    /// Raw values decoding to this entry. The first one is written on encode.
    pub values: &'static [u32],
}

impl EnumEntry {
    /// Creates an entry.
    pub const fn new(name: &'static str, values: &'static [u32]) -> Self {
        EnumEntry { name, values }
    }
}

/// A closed set of named raw values.
#[derive(Debug)]
pub struct EnumDefinition {
    /// Definition name.
    pub name: &'static str,
    /// Entries in declaration order.
    pub entries: &'static [EnumEntry],
}

impl EnumDefinition {
    /// Entry name of a raw value.
    pub fn decode(&self, raw: u32) -> Result<&'static str, ValidationError> {
        self.entries
            .iter()
            .find(|entry| entry.values.contains(&raw))
            .map(|entry| entry.name)
            .ok_or(ValidationError::UnknownEnumValue {
                definition: self.name,
                value: raw,
            })
    }

    /// Raw value written for an entry name.
    pub fn encode(&self, name: &str) -> Result<u32, ValidationError> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .and_then(|entry| entry.values.first().copied())
            .ok_or_else(|| ValidationError::UnknownEnumName {
                definition: self.name,
                name: name.to_string(),
            })
    }

    /// Entry names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|entry| entry.name)
    }

    /// Name of the first entry.
    pub fn default_name(&self) -> Option<&'static str> {
        self.entries.first().map(|entry| entry.name)
    }
}
