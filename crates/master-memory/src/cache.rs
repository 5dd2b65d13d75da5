//! Page cache and per-instance staging.
//!
//! The cache holds only what the device holds: the last bytes read from it or
//! acknowledged by it. Staged writes belong to the instance that made them and
//! live in a [`StagedPage`] overlay until the device acknowledges them. Every
//! page carries an epoch that only grows; it moves whenever cached content is
//! thrown away, which lets a save detect that the bytes it was built on are gone.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Range;
use std::time::{Duration, Instant};

use crate::address::{MemoryBank, PageId};

/// Pages affected by an invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidateScope {
    /// One page.
    Page(PageId),
    /// Every page of a bank.
    Bank(MemoryBank),
    /// Everything.
    All,
}

impl InvalidateScope {
    /// Check if the scope covers a page.
    pub fn covers(&self, page: PageId) -> bool {
        match self {
            InvalidateScope::Page(p) => *p == page,
            InvalidateScope::Bank(bank) => page.bank == *bank,
            InvalidateScope::All => true,
        }
    }
}

impl fmt::Display for InvalidateScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidateScope::Page(page) => write!(f, "page {}", page),
            InvalidateScope::Bank(bank) => write!(f, "bank {}", bank),
            InvalidateScope::All => f.write_str("all"),
        }
    }
}

struct CachedPage {
    device: Vec<u8>,
    loaded_at: Instant,
    stale: bool,
}

/// Cached device content of every bank.
#[derive(Default)]
pub struct PageCache {
    pages: BTreeMap<PageId, CachedPage>,
    epochs: HashMap<PageId, u64>,
}

impl PageCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached pages.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Check if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Check if a page is cached, fresh or not.
    pub fn contains(&self, page: PageId) -> bool {
        self.pages.contains_key(&page)
    }

    /// Current epoch of a page.
    pub fn epoch(&self, page: PageId) -> u64 {
        self.epochs.get(&page).copied().unwrap_or(0)
    }

    /// Check if a page is cached, not marked stale and younger than `stale_after`.
    pub fn is_fresh(&self, page: PageId, stale_after: Option<Duration>, now: Instant) -> bool {
        match self.pages.get(&page) {
            Some(cached) if !cached.stale => {
                stale_after.map_or(true, |limit| now.saturating_duration_since(cached.loaded_at) < limit)
            }
            _ => false,
        }
    }

    /// Store bytes read from the device, replacing the cached copy.
    pub fn fill(&mut self, page: PageId, bytes: Vec<u8>, now: Instant) {
        self.epochs.entry(page).or_insert(0);
        self.pages.insert(
            page,
            CachedPage {
                device: bytes,
                loaded_at: now,
                stale: false,
            },
        );
    }

    /// Last bytes read from or acknowledged by the device.
    pub fn device(&self, page: PageId) -> Option<&[u8]> {
        self.pages.get(&page).map(|cached| cached.device.as_slice())
    }

    /// Device bytes of a range.
    pub fn read(&self, page: PageId, range: Range<usize>) -> Option<&[u8]> {
        self.device(page).and_then(|data| data.get(range))
    }

    /// The device acknowledged `bytes` written at `offset`.
    pub fn acknowledge(&mut self, page: PageId, offset: usize, bytes: &[u8]) {
        if let Some(cached) = self.pages.get_mut(&page) {
            if let Some(target) = cached.device.get_mut(offset..offset + bytes.len()) {
                target.copy_from_slice(bytes);
            }
        }
    }

    /// Force the next access to re-read the page.
    pub fn mark_stale(&mut self, page: PageId) {
        if let Some(cached) = self.pages.get_mut(&page) {
            cached.stale = true;
        }
    }

    /// Drop pages, moving their epochs.
    ///
    /// Returns the pages that were cached.
    pub fn invalidate(&mut self, scope: InvalidateScope) -> Vec<PageId> {
        if let InvalidateScope::Page(page) = scope {
            *self.epochs.entry(page).or_insert(0) += 1;
        } else {
            for (page, epoch) in self.epochs.iter_mut() {
                if scope.covers(*page) {
                    *epoch += 1;
                }
            }
        }
        let dropped = self.cached_pages(scope);
        for page in &dropped {
            self.pages.remove(page);
        }
        dropped
    }

    /// Cached pages covered by the scope, in page order.
    pub fn cached_pages(&self, scope: InvalidateScope) -> Vec<PageId> {
        self.pages.keys().copied().filter(|page| scope.covers(*page)).collect()
    }
}

// ============================================================================
// Staging
// ============================================================================

/// Bits one instance staged on one page.
///
/// Each staged byte carries the value and the mask of bits the instance owns.
/// Reading through the overlay takes owned bits from it and every other bit
/// from the device copy, so siblings staged elsewhere never leak in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedPage {
    bytes: BTreeMap<usize, (u8, u8)>,
}

impl StagedPage {
    /// Creates an empty overlay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Overlay staged bits on `bytes`, which start at page offset `start`.
    pub fn apply(&self, start: usize, bytes: &mut [u8]) {
        for (&at, &(value, mask)) in self.bytes.range(start..start + bytes.len()) {
            let byte = &mut bytes[at - start];
            *byte = (*byte & !mask) | (value & mask);
        }
    }

    /// Stage `bytes` at `offset`, taking ownership of the bits in `masks`.
    ///
    /// `device` is the device copy of the same range. Bytes whose owned bits
    /// match it are not kept.
    pub fn stage(&mut self, offset: usize, bytes: &[u8], masks: &[u8], device: &[u8]) {
        for (i, (&byte, &mask)) in bytes.iter().zip(masks).enumerate() {
            let at = offset + i;
            let (value, owned) = self.bytes.get(&at).copied().unwrap_or((0, 0));
            let owned = owned | mask;
            let value = (value & !mask) | (byte & mask);
            if value & owned == device.get(i).copied().unwrap_or(0) & owned {
                self.bytes.remove(&at);
            } else {
                self.bytes.insert(at, (value, owned));
            }
        }
    }

    /// Forget staged bytes the device now holds.
    pub fn prune(&mut self, device: &[u8]) {
        self.bytes
            .retain(|at, (value, mask)| device.get(*at).map_or(true, |byte| *value & *mask != *byte & *mask));
    }

    /// From the first to the last staged byte.
    pub fn span(&self) -> Option<Range<usize>> {
        let first = *self.bytes.keys().next()?;
        let last = *self.bytes.keys().next_back()?;
        Some(first..last + 1)
    }

    /// Forget everything inside `range`.
    pub fn clear(&mut self, range: Range<usize>) {
        self.bytes.retain(|at, _| !range.contains(at));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: PageId = PageId::eeprom(4);

    fn cache_with(bytes: &[u8]) -> PageCache {
        let mut cache = PageCache::new();
        cache.fill(PAGE, bytes.to_vec(), Instant::now());
        cache
    }

    #[test]
    fn test_fill_replaces_device_copy() {
        let mut cache = cache_with(&[1, 2, 3, 4]);
        cache.fill(PAGE, vec![5, 6, 7, 8], Instant::now());
        assert_eq!(cache.device(PAGE), Some(&[5, 6, 7, 8][..]));
        cache.acknowledge(PAGE, 2, &[9, 9]);
        assert_eq!(cache.read(PAGE, 1..4), Some(&[6, 9, 9][..]));
        // out of page writes are ignored
        cache.acknowledge(PAGE, 3, &[1, 1]);
        assert_eq!(cache.device(PAGE), Some(&[5, 6, 9, 9][..]));
    }

    #[test]
    fn test_staged_page_owns_only_its_bits() {
        let device = [0b0000_0001u8, 0, 0, 0];
        let mut staged = StagedPage::new();
        staged.stage(0, &[0b0001_0001], &[0b1111_0000], &device[0..1]);
        staged.stage(2, &[7, 8], &[0xff, 0xff], &device[2..4]);
        assert_eq!(staged.span(), Some(0..4));

        // another caller changed a bit this overlay does not own
        let mut bytes = [0b0000_0011u8, 5, 0, 0];
        staged.apply(0, &mut bytes);
        assert_eq!(bytes, [0b0001_0011, 5, 7, 8]);

        // staging the device value back drops the byte
        staged.stage(2, &[0], &[0xff], &device[2..3]);
        assert_eq!(staged.span(), Some(0..4));
        staged.clear(3..4);
        assert_eq!(staged.span(), Some(0..1));
        staged.prune(&[0b0001_0000, 0, 0, 0]);
        assert!(staged.is_empty());
    }

    #[test]
    fn test_invalidate_moves_epochs() {
        let mut cache = cache_with(&[0; 4]);
        cache.fill(PageId::fram(1), vec![0; 4], Instant::now());
        assert_eq!(cache.epoch(PAGE), 0);
        assert_eq!(cache.invalidate(InvalidateScope::Bank(MemoryBank::Eeprom)), vec![PAGE]);
        assert_eq!(cache.epoch(PAGE), 1);
        assert_eq!(cache.epoch(PageId::fram(1)), 0);
        assert!(cache.contains(PageId::fram(1)));

        // pages that were never cached still move on a page invalidation
        cache.invalidate(InvalidateScope::Page(PageId::eeprom(9)));
        assert_eq!(cache.epoch(PageId::eeprom(9)), 1);

        assert_eq!(cache.invalidate(InvalidateScope::All), vec![PageId::fram(1)]);
        assert_eq!(cache.epoch(PAGE), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_freshness() {
        let now = Instant::now();
        let mut cache = PageCache::new();
        cache.fill(PAGE, vec![0; 4], now);
        assert!(cache.is_fresh(PAGE, None, now + Duration::from_secs(3600)));
        assert!(cache.is_fresh(PAGE, Some(Duration::from_secs(5)), now + Duration::from_secs(4)));
        assert!(!cache.is_fresh(PAGE, Some(Duration::from_secs(5)), now + Duration::from_secs(5)));
        cache.mark_stale(PAGE);
        assert!(!cache.is_fresh(PAGE, None, now));
        cache.fill(PAGE, vec![0; 4], now);
        assert!(cache.is_fresh(PAGE, None, now));
    }
}
