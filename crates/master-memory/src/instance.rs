//! One loaded record of a model.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::address::PageId;
use crate::cache::StagedPage;
use crate::composite::CompositeMember;
use crate::controller::{ControllerState, MemoryController};
use crate::error::{MemoryError, MemoryResult, ValidationError};
use crate::field::FieldKind;
use crate::model::{FieldDescriptor, ModelDefinition};
use crate::value::FieldValue;

/// A record loaded through a [`MemoryController`].
///
/// Reads go through the controller's cache. Writes are validated and staged
/// in the instance itself, then sent by [`save`](ModelInstance::save). Other
/// instances never see staged values, and dropping an instance discards them.
pub struct ModelInstance<'c> {
    controller: &'c MemoryController,
    model: &'static ModelDefinition,
    index: u16,
    pub(crate) epochs: BTreeMap<PageId, u64>,
    pub(crate) staged: BTreeMap<PageId, StagedPage>,
    pub(crate) extensions: BTreeMap<&'static str, FieldValue>,
}

impl<'c> ModelInstance<'c> {
    pub(crate) fn new(
        controller: &'c MemoryController,
        model: &'static ModelDefinition,
        index: u16,
        epochs: BTreeMap<PageId, u64>,
    ) -> Self {
        ModelInstance {
            controller,
            model,
            index,
            epochs,
            staged: BTreeMap::new(),
            extensions: BTreeMap::new(),
        }
    }

    /// Model of the record.
    pub fn model(&self) -> &'static ModelDefinition {
        self.model
    }

    /// Record index.
    pub fn index(&self) -> u16 {
        self.index
    }

    /// Check if changes are waiting for a save.
    pub fn is_dirty(&self) -> bool {
        !self.staged.is_empty() || !self.extensions.is_empty()
    }

    /// Pages the record spans.
    pub fn pages(&self) -> impl Iterator<Item = PageId> + '_ {
        self.epochs.keys().copied()
    }

    /// Value of a field or composite member.
    ///
    /// Staged extension values come first, then the extension store, then
    /// device memory. Extension fields nothing was stored for read as their
    /// kind's default.
    pub fn get(&self, path: &str) -> MemoryResult<FieldValue> {
        let (field, member) = self.model.resolve(path)?;
        if let Some(value) = self.extensions.get(field.name).and_then(|v| project(v, member)) {
            return Ok(value);
        }

        let (mut inner, _session) = self.controller.begin(ControllerState::Reading, None)?;
        if let Some(text) = inner.extension_text(self.model, self.index, field.name) {
            if let Some(value) = project(&parse(field, None, &text)?, member) {
                return Ok(value);
            }
        }

        let Some(address) = field.address(self.model.name, self.index, self.controller.map())? else {
            return Ok(field.kind.default_value());
        };
        inner.ensure_fresh(address.page)?;
        let mut bytes = inner
            .cache
            .read(address.page, address.range())
            .ok_or(MemoryError::PageOutOfRange { page: address.page })?
            .to_vec();
        if let Some(staged) = self.staged.get(&address.page) {
            staged.apply(address.offset, &mut bytes);
        }
        let value = match (member, field.kind) {
            (Some(member), FieldKind::Composite(definition)) => member.decode(definition.container(&bytes), self.index),
            _ => field.kind.decode(&bytes, self.index),
        };
        value.map_err(|e| {
            warn!(model = self.model.name, index = self.index, path, error = %e, "field does not decode");
            e.into()
        })
    }

    /// Validate and stage a value.
    pub fn set(&mut self, path: &str, value: impl Into<FieldValue>) -> MemoryResult<()> {
        let value = value.into();
        let (field, member) = self.model.resolve(path)?;
        if field.read_only {
            return Err(ValidationError::ReadOnly { field: path.to_string() }.into());
        }

        if field.is_extension() {
            if member.is_some() {
                return Err(ValidationError::UnknownField {
                    model: self.model.name,
                    field: path.to_string(),
                }
                .into());
            }
            if !self.controller.has_extension_store() {
                return Err(MemoryError::NoExtensionStore);
            }
            field.kind.encode(&value, &vec![255; field.kind.size()], self.index)?;
            debug!(model = self.model.name, index = self.index, field = field.name, "extension staged");
            self.extensions.insert(field.name, value);
            return Ok(());
        }

        let Some(address) = field.address(self.model.name, self.index, self.controller.map())? else {
            return Ok(());
        };
        let page = address.page;
        let (mut inner, _session) = self.controller.begin(ControllerState::Reading, None)?;
        if self.epochs.get(&page) != Some(&inner.cache.epoch(page)) {
            warn!(model = self.model.name, index = self.index, %page, "page changed since load");
            return Err(MemoryError::StaleWrite { page });
        }
        inner.ensure_fresh(page)?;
        let device = inner
            .cache
            .read(page, address.range())
            .ok_or(MemoryError::PageOutOfRange { page })?
            .to_vec();
        let staged = self.staged.entry(page).or_default();
        let mut current = device.clone();
        staged.apply(address.offset, &mut current);
        let encoded = match (member, field.kind) {
            (Some(member), FieldKind::Composite(definition)) => {
                definition.encode_member(member, &value, &current, self.index)
            }
            _ => field.kind.encode(&value, &current, self.index),
        };
        let bytes = match encoded {
            Ok(bytes) => bytes,
            Err(e) => {
                if staged.is_empty() {
                    self.staged.remove(&page);
                }
                return Err(e.into());
            }
        };
        let masks = owned_bits(field, member, &value, self.index, bytes.len());
        staged.stage(address.offset, &bytes, &masks, &device);
        if staged.is_empty() {
            self.staged.remove(&page);
        }
        debug!(model = self.model.name, index = self.index, path, %page, "field staged");
        Ok(())
    }

    /// Parse text for a field and stage it.
    pub fn set_text(&mut self, path: &str, text: &str) -> MemoryResult<()> {
        let (field, member) = self.model.resolve(path)?;
        let value = parse(field, member, text)?;
        self.set(path, value)
    }

    /// Every field path with its value, composite members expanded.
    pub fn values(&self) -> MemoryResult<Vec<(String, FieldValue)>> {
        self.model
            .paths()
            .into_iter()
            .map(|path| {
                let value = self.get(&path)?;
                Ok((path, value))
            })
            .collect()
    }

    /// Write staged changes through the controller.
    pub fn save(&mut self) -> MemoryResult<()> {
        let controller = self.controller;
        controller.save(self)
    }

    /// Re-read the record's pages from the device.
    pub fn refresh(&mut self) -> MemoryResult<()> {
        let controller = self.controller;
        controller.refresh(self)
    }
}

impl std::fmt::Debug for ModelInstance<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelInstance")
            .field("model", &self.model.name)
            .field("index", &self.index)
            .field("staged", &self.staged)
            .field("extensions", &self.extensions)
            .finish()
    }
}

fn parse(field: &FieldDescriptor, member: Option<&CompositeMember>, text: &str) -> MemoryResult<FieldValue> {
    let value = match member {
        Some(member) => member.parse(text),
        None => field.kind.parse(text),
    };
    Ok(value?)
}

/// Bits of the field's bytes a set of `value` takes ownership of.
fn owned_bits(
    field: &FieldDescriptor,
    member: Option<&CompositeMember>,
    value: &FieldValue,
    index: u16,
    len: usize,
) -> Vec<u8> {
    let FieldKind::Composite(definition) = field.kind else {
        return vec![0xff; len];
    };
    let mask = match (member, value) {
        (Some(member), _) => member.bits(index).mask(),
        (None, FieldValue::Composite(members)) => definition
            .members
            .iter()
            .filter(|m| members.contains_key(m.name))
            .fold(0, |mask, m| mask | m.bits(index).mask()),
        (None, _) => return vec![0xff; len],
    };
    definition.container_bytes(mask)
}

/// The member of a composite value, or the value itself.
fn project(value: &FieldValue, member: Option<&CompositeMember>) -> Option<FieldValue> {
    match member {
        Some(member) => value.member(member.name).cloned(),
        None => Some(value.clone()),
    }
}
