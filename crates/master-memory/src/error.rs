//! Memory error types.

use master_link::{CommunicationError, LinkError};
use master_protocol::ProtocolError;
use thiserror::Error;

use crate::address::PageId;

/// A value that does not fit the field it is written to.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Numeric value outside the field's domain.
    #[error("value {value} out of range {min}..={max}")]
    OutOfRange {
        /// Offending value, as text.
        value: String,
        /// Smallest accepted value.
        min: i64,
        /// Largest accepted value.
        max: i64,
    },

    /// Too many or too few bytes for the field.
    #[error("expected {expected} bytes, got {actual}")]
    BadLength {
        /// Length the field accepts.
        expected: usize,
        /// Length supplied.
        actual: usize,
    },

    /// An enum entry name that the definition does not list.
    #[error("{definition} has no entry named {name:?}")]
    UnknownEnumName {
        /// Enum definition.
        definition: &'static str,
        /// Offending name.
        name: String,
    },

    /// A raw byte that no enum entry decodes.
    #[error("{definition} has no entry for raw value {value}")]
    UnknownEnumValue {
        /// Enum definition.
        definition: &'static str,
        /// Raw value read from memory.
        value: u32,
    },

    /// The value has the wrong shape for the field kind.
    #[error("expected {expected}, got {actual}")]
    WrongType {
        /// What the field kind accepts.
        expected: &'static str,
        /// What was supplied.
        actual: &'static str,
    },

    /// The field cannot be written.
    #[error("field {field} is read-only")]
    ReadOnly {
        /// Field path.
        field: String,
    },

    /// The model has no field with this path.
    #[error("{model} has no field {field:?}")]
    UnknownField {
        /// Model name.
        model: &'static str,
        /// Field path.
        field: String,
    },

    /// Text that does not parse for the field kind.
    #[error("cannot read {text:?} as {expected}")]
    InvalidText {
        /// Offending text.
        text: String,
        /// Expected format.
        expected: &'static str,
    },
}

/// A model table that is internally inconsistent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// Two fields share a name.
    #[error("{model}: duplicate field {field}")]
    DuplicateField {
        /// Model name.
        model: &'static str,
        /// Field name.
        field: &'static str,
    },

    /// Two composite members share bits, or a member exceeds the width.
    #[error("{model}.{field}: member {member} overlaps or exceeds the container")]
    BadMember {
        /// Model name.
        model: &'static str,
        /// Composite field.
        field: &'static str,
        /// Member name.
        member: &'static str,
    },

    /// A field does not fit inside its page.
    #[error("{model}.{field} record {index}: bytes {offset}..{end} exceed page size {page_size}")]
    CrossesPage {
        /// Model name.
        model: &'static str,
        /// Field name.
        field: &'static str,
        /// Record index.
        index: u16,
        /// First byte.
        offset: usize,
        /// One past the last byte.
        end: usize,
        /// Page size of the bank.
        page_size: usize,
    },

    /// A page number beyond the bank.
    #[error("{model}.{field} record {index}: page {page} beyond bank size {page_count}")]
    PageOutOfBank {
        /// Model name.
        model: &'static str,
        /// Field name.
        field: &'static str,
        /// Record index.
        index: u16,
        /// Page number.
        page: u16,
        /// Pages in the bank.
        page_count: u16,
    },

    /// Two writable fields of one record share memory.
    #[error("{model} record {index}: {first} overlaps {second}")]
    Overlap {
        /// Model name.
        model: &'static str,
        /// Record index.
        index: u16,
        /// First field.
        first: &'static str,
        /// Second field.
        second: &'static str,
    },

    /// The family has no such bank.
    #[error("{model}.{field}: bank {bank} not available")]
    MissingBank {
        /// Model name.
        model: &'static str,
        /// Field name.
        field: &'static str,
        /// Bank name.
        bank: &'static str,
    },
}

/// Errors returned by the memory controller.
#[derive(Error, Debug)]
pub enum MemoryError {
    /// The link failed.
    #[error(transparent)]
    Communication(#[from] CommunicationError),

    /// A reply did not decode or answer the request.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A value was rejected before anything was staged.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The page changed since the instance was loaded.
    #[error("page {page} changed since it was loaded")]
    StaleWrite {
        /// Page whose epoch moved.
        page: PageId,
    },

    /// The page does not exist on this master.
    #[error("page {page} does not exist")]
    PageOutOfRange {
        /// Requested page.
        page: PageId,
    },

    /// The record index is beyond the model's record count.
    #[error("{model} has no record {index} ({count} records)")]
    RecordNotFound {
        /// Model name.
        model: &'static str,
        /// Requested index.
        index: u16,
        /// Current record count.
        count: u16,
    },

    /// No model with this name exists for the family.
    #[error("unknown model {0:?}")]
    UnknownModel(String),

    /// The model table is inconsistent.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// The operation was cancelled before it was dispatched.
    #[error("operation cancelled")]
    Cancelled,

    /// An extension field was written without an extension store.
    #[error("no extension store configured")]
    NoExtensionStore,

    /// The extension store could not be persisted.
    #[error("extension store: {0}")]
    Extension(#[from] std::io::Error),
}

impl From<LinkError> for MemoryError {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::Communication(e) => MemoryError::Communication(e),
            LinkError::Protocol(e) => MemoryError::Protocol(e),
        }
    }
}

/// Result type for memory operations.
pub type MemoryResult<T> = Result<T, MemoryError>;
