//! Memory banks, pages and field addresses.

use std::fmt;
use std::ops::Range;
use std::time::Duration;

use master_protocol::MemoryType;
use serde::{Deserialize, Serialize};

/// A memory bank of the master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryBank {
    /// Persistent configuration memory.
    Eeprom,
    /// Volatile state memory (core only).
    Fram,
}

impl MemoryBank {
    /// Returns the bank name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MemoryBank::Eeprom => "eeprom",
            MemoryBank::Fram => "fram",
        }
    }

    /// Parse a bank name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "eeprom" | "e" => Some(MemoryBank::Eeprom),
            "fram" | "f" => Some(MemoryBank::Fram),
            _ => None,
        }
    }

    /// The memory type used on the wire.
    pub const fn memory_type(&self) -> MemoryType {
        match self {
            MemoryBank::Eeprom => MemoryType::Eeprom,
            MemoryBank::Fram => MemoryType::Fram,
        }
    }
}

impl fmt::Display for MemoryBank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One page of a bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId {
    /// Bank.
    pub bank: MemoryBank,
    /// Page number inside the bank.
    pub page: u16,
}

impl PageId {
    /// Creates a page id.
    pub const fn new(bank: MemoryBank, page: u16) -> Self {
        PageId { bank, page }
    }

    /// An eeprom page.
    pub const fn eeprom(page: u16) -> Self {
        PageId::new(MemoryBank::Eeprom, page)
    }

    /// A fram page.
    pub const fn fram(page: u16) -> Self {
        PageId::new(MemoryBank::Fram, page)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.bank, self.page)
    }
}

/// Bytes of a field inside one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryAddress {
    /// Page holding the field.
    pub page: PageId,
    /// First byte inside the page.
    pub offset: usize,
    /// Number of bytes.
    pub length: usize,
}

impl MemoryAddress {
    /// Byte range inside the page.
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.length
    }

    /// Check if two addresses share a byte.
    pub fn overlaps(&self, other: &MemoryAddress) -> bool {
        self.page == other.page
            && self.offset < other.offset + other.length
            && other.offset < self.offset + self.length
    }
}

impl fmt::Display for MemoryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}..{}]", self.page, self.offset, self.offset + self.length)
    }
}

/// Bits of a component inside a byte or big-endian word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitRange {
    /// Lowest bit.
    pub start: u8,
    /// Number of bits.
    pub width: u8,
}

impl BitRange {
    /// Creates a bit range.
    pub const fn new(start: u8, width: u8) -> Self {
        BitRange { start, width }
    }

    /// A single bit.
    pub const fn bit(position: u8) -> Self {
        BitRange::new(position, 1)
    }

    /// One past the highest bit.
    pub const fn end(&self) -> u16 {
        self.start as u16 + self.width as u16
    }

    /// Mask of the range, unshifted.
    pub const fn value_mask(&self) -> u32 {
        if self.width >= 32 {
            u32::MAX
        } else {
            (1u32 << self.width) - 1
        }
    }

    /// Mask of the range inside its container.
    pub const fn mask(&self) -> u32 {
        self.value_mask() << self.start
    }

    /// Extract the range from a container value.
    pub const fn extract(&self, container: u32) -> u32 {
        (container >> self.start) & self.value_mask()
    }

    /// Replace the range in a container value.
    pub const fn insert(&self, container: u32, value: u32) -> u32 {
        (container & !self.mask()) | ((value & self.value_mask()) << self.start)
    }

    /// Check if two ranges share a bit.
    pub const fn overlaps(&self, other: &BitRange) -> bool {
        (self.start as u16) < other.end() && (other.start as u16) < self.end()
    }
}

/// How a record index maps to a page and offset.
#[derive(Debug, Clone, Copy)]
pub enum AddressSpec {
    /// Same location for every record.
    Fixed {
        /// Page.
        page: u16,
        /// Offset inside the page.
        offset: u16,
    },
    /// `per_page` records per page run, `page_stride` pages apart.
    Paged {
        /// First page.
        page: u16,
        /// Page distance between runs.
        page_stride: u16,
        /// Records per run.
        per_page: u16,
        /// Offset of record 0 inside its page.
        offset: u16,
        /// Byte distance between records of one run.
        stride: u16,
    },
    /// Absolute byte address `base + stride * index`.
    Linear {
        /// Absolute address of record 0.
        base: u32,
        /// Byte distance between records.
        stride: u32,
    },
    /// Arbitrary per-record formula returning `(page, offset)`.
    Computed(fn(u16) -> (u16, u16)),
}

impl AddressSpec {
    /// A fixed location.
    pub const fn fixed(page: u16, offset: u16) -> Self {
        AddressSpec::Fixed { page, offset }
    }

    /// `per_page` records per page starting at `page`.
    pub const fn paged(page: u16, per_page: u16, offset: u16, stride: u16) -> Self {
        AddressSpec::Paged {
            page,
            page_stride: 1,
            per_page,
            offset,
            stride,
        }
    }

    /// Records laid out along one page.
    pub const fn row(page: u16, offset: u16, stride: u16) -> Self {
        AddressSpec::paged(page, u16::MAX, offset, stride)
    }

    /// Spread consecutive page runs `page_stride` pages apart.
    pub const fn with_page_stride(self, stride: u16) -> Self {
        match self {
            AddressSpec::Paged {
                page,
                per_page,
                offset,
                stride: byte_stride,
                ..
            } => AddressSpec::Paged {
                page,
                page_stride: stride,
                per_page,
                offset,
                stride: byte_stride,
            },
            other => other,
        }
    }

    /// Page and offset of a record.
    pub fn resolve(&self, index: u16, page_size: usize) -> (u32, usize) {
        match *self {
            AddressSpec::Fixed { page, offset } => (page as u32, offset as usize),
            AddressSpec::Paged {
                page,
                page_stride,
                per_page,
                offset,
                stride,
            } => {
                let per_page = per_page.max(1);
                let run = (index / per_page) as u32;
                let slot = (index % per_page) as usize;
                (
                    page as u32 + run * page_stride as u32,
                    offset as usize + stride as usize * slot,
                )
            }
            AddressSpec::Linear { base, stride } => {
                let absolute = base as usize + stride as usize * index as usize;
                ((absolute / page_size) as u32, absolute % page_size)
            }
            AddressSpec::Computed(f) => {
                let (page, offset) = f(index);
                (page as u32, offset as usize)
            }
        }
    }
}

/// Geometry of a bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankLayout {
    /// Number of pages.
    pub page_count: u16,
    /// Bytes per page.
    pub page_size: usize,
    /// Cached content expires after this long.
    pub stale_after: Option<Duration>,
}

impl BankLayout {
    /// A layout whose pages never expire.
    pub const fn new(page_count: u16, page_size: usize) -> Self {
        BankLayout {
            page_count,
            page_size,
            stale_after: None,
        }
    }

    /// Expire cached pages after `after`.
    pub const fn with_stale_after(mut self, after: Duration) -> Self {
        self.stale_after = Some(after);
        self
    }
}

/// Bank layouts of one master.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryMap {
    /// Eeprom layout.
    pub eeprom: Option<BankLayout>,
    /// Fram layout, absent on classic masters.
    pub fram: Option<BankLayout>,
}

impl MemoryMap {
    /// Classic masters: 256 eeprom banks of 256 bytes.
    pub const CLASSIC: MemoryMap = MemoryMap {
        eeprom: Some(BankLayout::new(256, 256)),
        fram: None,
    };

    /// Core masters: 512 eeprom pages and 128 fram pages of 256 bytes.
    pub const CORE: MemoryMap = MemoryMap {
        eeprom: Some(BankLayout::new(512, 256)),
        fram: Some(BankLayout::new(128, 256).with_stale_after(Duration::from_secs(5))),
    };

    /// Layout of a bank.
    pub fn layout(&self, bank: MemoryBank) -> Option<BankLayout> {
        match bank {
            MemoryBank::Eeprom => self.eeprom,
            MemoryBank::Fram => self.fram,
        }
    }

    /// Check if a page exists.
    pub fn contains(&self, page: PageId) -> bool {
        self.layout(page.bank).is_some_and(|layout| page.page < layout.page_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paged_resolution() {
        // eight records per module page, 16 bytes apart from offset 20
        let spec = AddressSpec::paged(33, 8, 20, 16);
        assert_eq!(spec.resolve(0, 256), (33, 20));
        assert_eq!(spec.resolve(7, 256), (33, 132));
        assert_eq!(spec.resolve(8, 256), (34, 20));
    }

    #[test]
    fn test_page_stride() {
        let spec = AddressSpec::paged(82, 8, 16, 6).with_page_stride(2);
        assert_eq!(spec.resolve(9, 256), (84, 22));
    }

    #[test]
    fn test_row_and_linear() {
        assert_eq!(AddressSpec::row(142, 32, 1).resolve(5, 256), (142, 37));
        let linear = AddressSpec::Linear { base: 0x0210, stride: 32 };
        assert_eq!(linear.resolve(0, 256), (2, 16));
        assert_eq!(linear.resolve(8, 256), (3, 16));
    }

    #[test]
    fn test_computed() {
        fn status(id: u16) -> (u16, u16) {
            (id / 64 + 1, (id / 8 * 32) & 255)
        }
        let spec = AddressSpec::Computed(status);
        assert_eq!(spec.resolve(3, 256), (1, 0));
        assert_eq!(spec.resolve(70, 256), (2, 0));
        assert_eq!(spec.resolve(17, 256), (1, 64));
    }

    #[test]
    fn test_bit_range() {
        let range = BitRange::new(4, 3);
        assert_eq!(range.mask(), 0b0111_0000);
        assert_eq!(range.extract(0b1101_0110), 0b101);
        assert_eq!(range.insert(0b1111_1111, 0), 0b1000_1111);
        assert!(range.overlaps(&BitRange::bit(6)));
        assert!(!range.overlaps(&BitRange::bit(7)));
    }

    #[test]
    fn test_memory_maps() {
        assert!(MemoryMap::CLASSIC.contains(PageId::eeprom(255)));
        assert!(!MemoryMap::CLASSIC.contains(PageId::eeprom(256)));
        assert!(!MemoryMap::CLASSIC.contains(PageId::fram(0)));
        let fram = MemoryMap::CORE.layout(MemoryBank::Fram).expect("fram");
        assert_eq!(fram.stale_after, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_address_overlap() {
        let a = MemoryAddress {
            page: PageId::eeprom(1),
            offset: 4,
            length: 3,
        };
        let b = MemoryAddress { offset: 6, ..a };
        let c = MemoryAddress { offset: 7, ..a };
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }
}
