//! Model definitions: named fields and where each record keeps them.

use std::collections::{BTreeSet, HashSet};

use crate::address::{AddressSpec, MemoryAddress, MemoryBank, MemoryMap, PageId};
use crate::composite::CompositeMember;
use crate::error::{SchemaError, ValidationError};
use crate::field::FieldKind;

/// Where a field's value lives.
#[derive(Debug, Clone, Copy)]
pub enum FieldLocation {
    /// Bytes in device memory.
    Memory {
        /// Bank.
        bank: MemoryBank,
        /// Per-record address.
        address: AddressSpec,
    },
    /// A value kept by the gateway, never sent to the device.
    Extension,
}

/// One field of a model.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    /// Field name.
    pub name: &'static str,
    /// Encoding.
    pub kind: FieldKind,
    /// Location.
    pub location: FieldLocation,
    /// Writes are refused.
    pub read_only: bool,
    /// Other read-only shared fields may alias these bytes.
    pub shared: bool,
}

impl FieldDescriptor {
    /// A field in eeprom.
    pub const fn eeprom(name: &'static str, kind: FieldKind, address: AddressSpec) -> Self {
        FieldDescriptor::memory(name, kind, MemoryBank::Eeprom, address)
    }

    /// A field in fram.
    pub const fn fram(name: &'static str, kind: FieldKind, address: AddressSpec) -> Self {
        FieldDescriptor::memory(name, kind, MemoryBank::Fram, address)
    }

    /// A gateway-side extension field.
    pub const fn extension(name: &'static str, kind: FieldKind) -> Self {
        FieldDescriptor {
            name,
            kind,
            location: FieldLocation::Extension,
            read_only: false,
            shared: false,
        }
    }

    const fn memory(name: &'static str, kind: FieldKind, bank: MemoryBank, address: AddressSpec) -> Self {
        FieldDescriptor {
            name,
            kind,
            location: FieldLocation::Memory { bank, address },
            read_only: false,
            shared: false,
        }
    }

    /// Refuse writes.
    pub const fn read_only(self) -> Self {
        FieldDescriptor { read_only: true, ..self }
    }

    /// Allow aliasing by other shared read-only fields.
    pub const fn shared(self) -> Self {
        FieldDescriptor { shared: true, ..self }
    }

    /// Check if the field lives in the extension store.
    pub const fn is_extension(&self) -> bool {
        matches!(self.location, FieldLocation::Extension)
    }

    /// Bytes of a record's value, `None` for extension fields.
    pub fn address(
        &self,
        model: &'static str,
        index: u16,
        map: &MemoryMap,
    ) -> Result<Option<MemoryAddress>, SchemaError> {
        let FieldLocation::Memory { bank, address } = self.location else {
            return Ok(None);
        };
        let layout = map.layout(bank).ok_or(SchemaError::MissingBank {
            model,
            field: self.name,
            bank: bank.as_str(),
        })?;
        let (page, offset) = address.resolve(index, layout.page_size);
        if page >= layout.page_count as u32 {
            return Err(SchemaError::PageOutOfBank {
                model,
                field: self.name,
                index,
                page: page.min(u16::MAX as u32) as u16,
                page_count: layout.page_count,
            });
        }
        let length = self.kind.size();
        if offset + length > layout.page_size {
            return Err(SchemaError::CrossesPage {
                model,
                field: self.name,
                index,
                offset,
                end: offset + length,
                page_size: layout.page_size,
            });
        }
        Ok(Some(MemoryAddress {
            page: PageId::new(bank, page as u16),
            offset,
            length,
        }))
    }
}

/// How many records a model has.
#[derive(Debug, Clone, Copy)]
pub enum RecordCount {
    /// Exactly one record, index 0.
    Global,
    /// A fixed number of records.
    Fixed(u16),
    /// `byte * multiplier` records, the byte read from device memory.
    Dynamic {
        /// Bank of the count byte.
        bank: MemoryBank,
        /// Page of the count byte.
        page: u16,
        /// Offset of the count byte.
        offset: u16,
        /// Records per counted unit.
        multiplier: u16,
        /// Upper bound.
        max: u16,
    },
}

impl RecordCount {
    /// Records per counted module.
    pub const fn per_module(page: u16, offset: u16, multiplier: u16, max: u16) -> Self {
        RecordCount::Dynamic {
            bank: MemoryBank::Eeprom,
            page,
            offset,
            multiplier,
            max,
        }
    }

    /// Largest possible record count.
    pub const fn max(&self) -> u16 {
        match self {
            RecordCount::Global => 1,
            RecordCount::Fixed(n) => *n,
            RecordCount::Dynamic { max, .. } => *max,
        }
    }

    /// Record count given the count byte.
    pub fn from_raw(&self, raw: u8) -> u16 {
        match self {
            RecordCount::Dynamic { multiplier, max, .. } => (raw as u32 * *multiplier as u32).min(*max as u32) as u16,
            other => other.max(),
        }
    }

    /// Location of the count byte.
    pub fn count_address(&self) -> Option<MemoryAddress> {
        match *self {
            RecordCount::Dynamic {
                bank, page, offset, ..
            } => Some(MemoryAddress {
                page: PageId::new(bank, page),
                offset: offset as usize,
                length: 1,
            }),
            _ => None,
        }
    }
}

/// A named set of fields repeated per record.
#[derive(Debug)]
pub struct ModelDefinition {
    /// Model name.
    pub name: &'static str,
    /// Record count.
    pub records: RecordCount,
    /// Fields in declaration order.
    pub fields: &'static [FieldDescriptor],
}

impl ModelDefinition {
    /// Field by name.
    pub fn field(&self, name: &str) -> Option<&'static FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Resolve `"field"` or `"composite.member"`.
    pub fn resolve(
        &self,
        path: &str,
    ) -> Result<(&'static FieldDescriptor, Option<&'static CompositeMember>), ValidationError> {
        let unknown = || ValidationError::UnknownField {
            model: self.name,
            field: path.to_string(),
        };
        let (name, member) = match path.split_once('.') {
            Some((name, member)) => (name, Some(member)),
            None => (path, None),
        };
        let field = self.field(name).ok_or_else(unknown)?;
        match (member, field.kind) {
            (None, _) => Ok((field, None)),
            (Some(member), FieldKind::Composite(definition)) => {
                let member = definition.member(member).ok_or_else(unknown)?;
                Ok((field, Some(member)))
            }
            (Some(_), _) => Err(unknown()),
        }
    }

    /// Every field path, composite members expanded.
    pub fn paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        for field in self.fields {
            match field.kind {
                FieldKind::Composite(definition) => {
                    paths.extend(definition.members.iter().map(|m| format!("{}.{}", field.name, m.name)));
                }
                _ => paths.push(field.name.to_string()),
            }
        }
        paths
    }

    /// Pages a record spans.
    pub fn pages(&self, index: u16, map: &MemoryMap) -> Result<BTreeSet<PageId>, SchemaError> {
        let mut pages = BTreeSet::new();
        for field in self.fields {
            if let Some(address) = field.address(self.name, index, map)? {
                pages.insert(address.page);
            }
        }
        Ok(pages)
    }

    /// Check if the model has extension fields.
    pub fn has_extensions(&self) -> bool {
        self.fields.iter().any(|f| f.is_extension())
    }

    /// Check the table for duplicate names, bad composites and overlaps.
    pub fn validate(&self, map: &MemoryMap) -> Result<(), SchemaError> {
        let mut names = HashSet::new();
        for field in self.fields {
            if !names.insert(field.name) {
                return Err(SchemaError::DuplicateField {
                    model: self.name,
                    field: field.name,
                });
            }
        }

        if let Some(address) = self.records.count_address() {
            if !map.contains(address.page) {
                return Err(SchemaError::MissingBank {
                    model: self.name,
                    field: "records",
                    bank: address.page.bank.as_str(),
                });
            }
        }

        let last = self.records.max().saturating_sub(1);
        let indices: BTreeSet<u16> = [0, last].into_iter().collect();
        for index in indices {
            let mut placed: Vec<(&FieldDescriptor, MemoryAddress)> = Vec::new();
            for field in self.fields {
                if let FieldKind::Composite(definition) = field.kind {
                    if let Some(member) = definition.find_bad_member(index) {
                        return Err(SchemaError::BadMember {
                            model: self.name,
                            field: field.name,
                            member,
                        });
                    }
                }
                let Some(address) = field.address(self.name, index, map)? else {
                    continue;
                };
                for (other, other_address) in &placed {
                    let aliased = field.read_only && field.shared && other.read_only && other.shared;
                    if address.overlaps(other_address) && !aliased {
                        return Err(SchemaError::Overlap {
                            model: self.name,
                            index,
                            first: other.name,
                            second: field.name,
                        });
                    }
                }
                placed.push((field, address));
            }
        }
        Ok(())
    }
}
