//! The memory controller.
//!
//! [`MemoryController`] owns the backend, the page cache and the optional
//! extension store behind one `parking_lot::Mutex`. Every operation takes the
//! lock for its whole duration, so device access is serialized end to end and
//! an operation never observes another one half done. Invalidations surfaced by
//! the backend are applied right after the lock is taken.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use master_link::Link;
use master_metrics::{metric_defs, MetricLabels};
use master_protocol::HardwareFamily;
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::address::{MemoryMap, PageId};
use crate::backend::{backend_for, MemoryBackend, MemoryConfig};
use crate::cache::{InvalidateScope, PageCache};
use crate::error::{MemoryError, MemoryResult, SchemaError};
use crate::extension::{ExtensionKey, ExtensionStore};
use crate::instance::ModelInstance;
use crate::model::ModelDefinition;
use crate::schema;

// ============================================================================
// State, statistics and cancellation
// ============================================================================

/// What the controller is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerState {
    /// No operation running.
    Idle,
    /// Loading pages.
    Reading,
    /// Writing spans.
    Writing,
    /// Re-reading after an invalidation.
    Syncing,
}

/// Counters kept by a controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ControllerStats {
    /// Pages read from the device.
    pub page_reads: u64,
    /// Write spans sent to the device.
    pub page_writes: u64,
    /// Page lookups answered from the cache.
    pub cache_hits: u64,
    /// Cached pages dropped.
    pub invalidations: u64,
}

/// Cancels operations that have not dispatched anything yet.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel every operation using this token from now on.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check if the token was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Resets the state to idle when an operation ends.
pub(crate) struct Session<'a> {
    state: &'a Mutex<ControllerState>,
}

impl<'a> Session<'a> {
    fn enter(state: &'a Mutex<ControllerState>, initial: ControllerState) -> Self {
        *state.lock() = initial;
        Session { state }
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        *self.state.lock() = ControllerState::Idle;
    }
}

/// Outcome of one record in [`MemoryController::save_many`].
#[derive(Debug)]
pub struct BatchEntry {
    /// Model name.
    pub model: &'static str,
    /// Record index.
    pub index: u16,
    /// Result of writing the record's spans.
    pub result: MemoryResult<()>,
}

/// Outcome of [`MemoryController::save_many`].
#[derive(Debug)]
pub struct BatchReport {
    /// One entry per instance, in input order.
    pub entries: Vec<BatchEntry>,
    /// Result of the single commit.
    pub commit: MemoryResult<()>,
}

impl BatchReport {
    /// Check if every record and the commit succeeded.
    pub fn is_success(&self) -> bool {
        self.commit.is_ok() && self.entries.iter().all(|e| e.result.is_ok())
    }

    /// Entries that failed.
    pub fn failures(&self) -> impl Iterator<Item = &BatchEntry> {
        self.entries.iter().filter(|e| e.result.is_err())
    }
}

// ============================================================================
// Locked state
// ============================================================================

pub(crate) struct Inner {
    family: HardwareFamily,
    map: MemoryMap,
    backend: Box<dyn MemoryBackend>,
    pub(crate) cache: PageCache,
    extensions: Option<Box<dyn ExtensionStore>>,
    stats: ControllerStats,
}

impl Inner {
    fn labels(&self, page: PageId) -> Vec<(&'static str, String)> {
        MetricLabels::new(self.family.as_str())
            .with_bank(page.bank.as_str())
            .to_labels()
    }

    fn record_cache_size(&self) {
        metrics::gauge!(metric_defs::MEMORY_CACHED_PAGES.name, "family" => self.family.as_str())
            .set(self.cache.len() as f64);
    }

    /// Read a page from the device into the cache.
    pub(crate) fn read_page(&mut self, page: PageId) -> MemoryResult<()> {
        let bytes = self.backend.read_page(page).map_err(|e| {
            warn!(%page, error = %e, "page read failed");
            e
        })?;
        self.cache.fill(page, bytes, Instant::now());
        self.stats.page_reads += 1;
        metrics::counter!(metric_defs::MEMORY_PAGE_READS.name, &self.labels(page)).increment(1);
        self.record_cache_size();
        Ok(())
    }

    /// Read a page unless the cached copy is fresh.
    pub(crate) fn ensure_fresh(&mut self, page: PageId) -> MemoryResult<()> {
        let layout = self.map.layout(page.bank).ok_or(MemoryError::PageOutOfRange { page })?;
        if self.cache.is_fresh(page, layout.stale_after, Instant::now()) {
            self.stats.cache_hits += 1;
            metrics::counter!(metric_defs::MEMORY_CACHE_HITS.name, &self.labels(page)).increment(1);
            return Ok(());
        }
        self.read_page(page)
    }

    fn invalidate(&mut self, scope: InvalidateScope) -> Vec<PageId> {
        let dropped = self.cache.invalidate(scope);
        self.stats.invalidations += dropped.len() as u64;
        metrics::counter!(metric_defs::MEMORY_INVALIDATIONS.name, "family" => self.family.as_str())
            .increment(dropped.len() as u64);
        self.record_cache_size();
        info!(%scope, pages = dropped.len(), "cache invalidated");
        dropped
    }

    fn apply_invalidations(&mut self) {
        for scope in self.backend.take_invalidations() {
            self.invalidate(scope);
        }
    }

    /// Current record count of a model.
    fn record_count(&mut self, model: &ModelDefinition) -> MemoryResult<u16> {
        let Some(address) = model.records.count_address() else {
            return Ok(model.records.max());
        };
        self.ensure_fresh(address.page)?;
        let raw = self
            .cache
            .read(address.page, address.range())
            .and_then(|bytes| bytes.first().copied())
            .ok_or(MemoryError::PageOutOfRange { page: address.page })?;
        Ok(model.records.from_raw(raw))
    }

    fn check_record(&mut self, model: &'static ModelDefinition, index: u16) -> MemoryResult<()> {
        let count = self.record_count(model)?;
        if index >= count {
            warn!(model = model.name, index, count, "record not found");
            return Err(MemoryError::RecordNotFound {
                model: model.name,
                index,
                count,
            });
        }
        Ok(())
    }

    /// Stored extension text of a field.
    pub(crate) fn extension_text(&self, model: &ModelDefinition, index: u16, field: &str) -> Option<String> {
        self.extensions
            .as_ref()?
            .get(&ExtensionKey::new(model.name, index, field))
    }

    /// Write the instance's spans, one per page in page order.
    ///
    /// Returns whether anything reached the device along with the result.
    fn write_spans(&mut self, instance: &mut ModelInstance<'_>) -> (bool, MemoryResult<()>) {
        let model = instance.model();
        let index = instance.index();
        for page in instance.staged.keys() {
            let current = self.cache.epoch(*page);
            if instance.epochs.get(page) != Some(&current) {
                warn!(model = model.name, index, %page, "page changed since load");
                return (false, Err(MemoryError::StaleWrite { page: *page }));
            }
        }

        let mut written = false;
        let mut result = Ok(());
        let pages: Vec<PageId> = instance.staged.keys().copied().collect();
        for page in pages {
            if let Err(e) = self.ensure_fresh(page) {
                result = Err(e);
                break;
            }
            let Some(device) = self.cache.device(page).map(<[u8]>::to_vec) else {
                result = Err(MemoryError::PageOutOfRange { page });
                break;
            };
            let Some(staged) = instance.staged.get_mut(&page) else {
                continue;
            };
            staged.prune(&device);
            let Some(span) = staged.span().filter(|span| span.end <= device.len()) else {
                instance.staged.remove(&page);
                continue;
            };
            let mut bytes = device[span.clone()].to_vec();
            staged.apply(span.start, &mut bytes);
            match self.backend.write(page, span.start, &bytes) {
                Ok(()) => {
                    self.cache.acknowledge(page, span.start, &bytes);
                    staged.clear(span);
                    if staged.is_empty() {
                        instance.staged.remove(&page);
                    }
                    self.stats.page_writes += 1;
                    metrics::counter!(metric_defs::MEMORY_PAGE_WRITES.name, &self.labels(page)).increment(1);
                    written = true;
                }
                Err(e) => {
                    warn!(model = model.name, index, %page, error = %e, "save failed");
                    self.cache.mark_stale(page);
                    metrics::counter!(metric_defs::MEMORY_SAVE_FAILURES.name, "family" => self.family.as_str())
                        .increment(1);
                    result = Err(e);
                    break;
                }
            }
        }
        (written, result)
    }

    fn commit(&mut self) -> MemoryResult<()> {
        self.backend.commit().map_err(|e| {
            warn!(error = %e, "commit failed");
            e
        })
    }

    /// Hand staged extension values to the store.
    fn apply_extensions(&mut self, instance: &mut ModelInstance<'_>) -> MemoryResult<()> {
        if instance.extensions.is_empty() {
            return Ok(());
        }
        let store = self.extensions.as_mut().ok_or(MemoryError::NoExtensionStore)?;
        let model = instance.model();
        let fields: Vec<&'static str> = instance.extensions.keys().copied().collect();
        for field in fields {
            if let Some(value) = instance.extensions.get(field) {
                store
                    .set(ExtensionKey::new(model.name, instance.index(), field), value.to_string())
                    .map_err(|e| {
                        warn!(model = model.name, field, error = %e, "extension write failed");
                        e
                    })?;
            }
            instance.extensions.remove(field);
        }
        Ok(())
    }
}

// ============================================================================
// Controller
// ============================================================================

/// Typed access to the memory of one master.
pub struct MemoryController {
    family: HardwareFamily,
    models: &'static [&'static ModelDefinition],
    map: MemoryMap,
    has_extension_store: bool,
    inner: Mutex<Inner>,
    state: Mutex<ControllerState>,
}

impl MemoryController {
    /// A controller with the family's model table.
    pub fn new(backend: Box<dyn MemoryBackend>) -> Self {
        let models = schema::models(backend.family());
        Self::with_models(backend, models)
    }

    /// A controller for a family on top of a link.
    pub fn for_link<L: Link + 'static>(family: HardwareFamily, link: L, config: MemoryConfig) -> Self {
        Self::new(backend_for(family, link, config))
    }

    /// A controller with a custom model table.
    pub fn with_models(backend: Box<dyn MemoryBackend>, models: &'static [&'static ModelDefinition]) -> Self {
        let family = backend.family();
        let map = backend.map();
        MemoryController {
            family,
            models,
            map,
            has_extension_store: false,
            inner: Mutex::new(Inner {
                family,
                map,
                backend,
                cache: PageCache::new(),
                extensions: None,
                stats: ControllerStats::default(),
            }),
            state: Mutex::new(ControllerState::Idle),
        }
    }

    /// Attach an extension store.
    pub fn with_extension_store(mut self, store: Box<dyn ExtensionStore>) -> Self {
        self.inner.get_mut().extensions = Some(store);
        self.has_extension_store = true;
        self
    }

    /// Hardware family.
    pub fn family(&self) -> HardwareFamily {
        self.family
    }

    /// Bank layouts.
    pub fn map(&self) -> &MemoryMap {
        &self.map
    }

    /// Model table.
    pub fn models(&self) -> &'static [&'static ModelDefinition] {
        self.models
    }

    /// Model by name.
    pub fn model(&self, name: &str) -> MemoryResult<&'static ModelDefinition> {
        self.models
            .iter()
            .copied()
            .find(|m| m.name == name)
            .ok_or_else(|| MemoryError::UnknownModel(name.to_string()))
    }

    /// Check if extension values can be stored.
    pub fn has_extension_store(&self) -> bool {
        self.has_extension_store
    }

    /// Current state.
    pub fn state(&self) -> ControllerState {
        *self.state.lock()
    }

    /// Counters so far.
    pub fn stats(&self) -> ControllerStats {
        self.inner.lock().stats
    }

    /// Validate every model of the table against the bank layouts.
    pub fn validate_schema(&self) -> Result<(), SchemaError> {
        self.models.iter().try_for_each(|m| m.validate(&self.map))
    }

    /// Take the lock for an operation.
    pub(crate) fn begin(
        &self,
        state: ControllerState,
        cancel: Option<&CancelToken>,
    ) -> MemoryResult<(MutexGuard<'_, Inner>, Session<'_>)> {
        let mut inner = self.inner.lock();
        if cancel.is_some_and(CancelToken::is_cancelled) {
            debug!("operation cancelled before dispatch");
            return Err(MemoryError::Cancelled);
        }
        let session = Session::enter(&self.state, state);
        inner.apply_invalidations();
        Ok((inner, session))
    }

    // ------------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------------

    /// Load one record.
    pub fn load(&self, model: &str, index: u16) -> MemoryResult<ModelInstance<'_>> {
        self.load_inner(model, index, None)
    }

    /// [`load`](Self::load) with cancellation.
    pub fn load_with(&self, model: &str, index: u16, cancel: &CancelToken) -> MemoryResult<ModelInstance<'_>> {
        self.load_inner(model, index, Some(cancel))
    }

    fn load_inner(&self, model: &str, index: u16, cancel: Option<&CancelToken>) -> MemoryResult<ModelInstance<'_>> {
        let model = self.model(model)?;
        let (mut inner, _session) = self.begin(ControllerState::Reading, cancel)?;
        let mut instances = self.load_records(&mut inner, model, &[index])?;
        instances.pop().ok_or(MemoryError::RecordNotFound {
            model: model.name,
            index,
            count: 0,
        })
    }

    /// Load several records of one model, reading each shared page once.
    pub fn load_many(&self, model: &str, indices: &[u16]) -> MemoryResult<Vec<ModelInstance<'_>>> {
        self.load_many_inner(model, indices, None)
    }

    /// [`load_many`](Self::load_many) with cancellation.
    pub fn load_many_with(
        &self,
        model: &str,
        indices: &[u16],
        cancel: &CancelToken,
    ) -> MemoryResult<Vec<ModelInstance<'_>>> {
        self.load_many_inner(model, indices, Some(cancel))
    }

    fn load_many_inner(
        &self,
        model: &str,
        indices: &[u16],
        cancel: Option<&CancelToken>,
    ) -> MemoryResult<Vec<ModelInstance<'_>>> {
        let model = self.model(model)?;
        let (mut inner, _session) = self.begin(ControllerState::Reading, cancel)?;
        self.load_records(&mut inner, model, indices)
    }

    fn load_records(
        &self,
        inner: &mut Inner,
        model: &'static ModelDefinition,
        indices: &[u16],
    ) -> MemoryResult<Vec<ModelInstance<'_>>> {
        let mut records = Vec::with_capacity(indices.len());
        for &index in indices {
            inner.check_record(model, index)?;
            records.push((index, model.pages(index, &self.map)?));
        }
        for (_, pages) in &records {
            for page in pages {
                inner.ensure_fresh(*page)?;
            }
        }
        debug!(model = model.name, records = records.len(), "records loaded");
        Ok(records
            .into_iter()
            .map(|(index, pages)| {
                let epochs = pages.into_iter().map(|p| (p, inner.cache.epoch(p))).collect();
                ModelInstance::new(self, model, index, epochs)
            })
            .collect())
    }

    /// Current record count of a model.
    pub fn record_count(&self, model: &str) -> MemoryResult<u16> {
        let model = self.model(model)?;
        let (mut inner, _session) = self.begin(ControllerState::Reading, None)?;
        inner.record_count(model)
    }

    // ------------------------------------------------------------------------
    // Saving
    // ------------------------------------------------------------------------

    /// Write an instance's staged changes and commit them.
    ///
    /// Spans written before a failure are still committed. The failed page is
    /// re-read on next access and the instance stays dirty.
    pub fn save(&self, instance: &mut ModelInstance<'_>) -> MemoryResult<()> {
        self.save_inner(instance, None)
    }

    /// [`save`](Self::save) with cancellation.
    pub fn save_with(&self, instance: &mut ModelInstance<'_>, cancel: &CancelToken) -> MemoryResult<()> {
        self.save_inner(instance, Some(cancel))
    }

    fn save_inner(&self, instance: &mut ModelInstance<'_>, cancel: Option<&CancelToken>) -> MemoryResult<()> {
        let (mut inner, _session) = self.begin(ControllerState::Writing, cancel)?;
        let (written, result) = inner.write_spans(instance);
        let commit = if written { inner.commit() } else { Ok(()) };
        result?;
        commit?;
        inner.apply_extensions(instance)
    }

    /// Save several instances with a single commit.
    pub fn save_many(&self, instances: &mut [ModelInstance<'_>]) -> MemoryResult<BatchReport> {
        self.save_many_inner(instances, None)
    }

    /// [`save_many`](Self::save_many) with cancellation.
    pub fn save_many_with(
        &self,
        instances: &mut [ModelInstance<'_>],
        cancel: &CancelToken,
    ) -> MemoryResult<BatchReport> {
        self.save_many_inner(instances, Some(cancel))
    }

    fn save_many_inner(
        &self,
        instances: &mut [ModelInstance<'_>],
        cancel: Option<&CancelToken>,
    ) -> MemoryResult<BatchReport> {
        let (mut inner, _session) = self.begin(ControllerState::Writing, cancel)?;
        let mut written = false;
        let mut results = Vec::with_capacity(instances.len());
        for instance in instances.iter_mut() {
            let (wrote, result) = inner.write_spans(instance);
            written |= wrote;
            results.push(result);
        }
        let commit = if written { inner.commit() } else { Ok(()) };
        let mut entries = Vec::with_capacity(instances.len());
        for (instance, mut result) in instances.iter_mut().zip(results) {
            if result.is_ok() && commit.is_ok() {
                result = inner.apply_extensions(instance);
            }
            entries.push(BatchEntry {
                model: instance.model().name,
                index: instance.index(),
                result,
            });
        }
        Ok(BatchReport { entries, commit })
    }

    // ------------------------------------------------------------------------
    // Refresh, invalidation and raw access
    // ------------------------------------------------------------------------

    /// Re-read an instance's pages, fresh or not. The instance's own staged
    /// bytes that still differ from the device stay staged.
    pub fn refresh(&self, instance: &mut ModelInstance<'_>) -> MemoryResult<()> {
        self.refresh_inner(instance, None)
    }

    /// [`refresh`](Self::refresh) with cancellation.
    pub fn refresh_with(&self, instance: &mut ModelInstance<'_>, cancel: &CancelToken) -> MemoryResult<()> {
        self.refresh_inner(instance, Some(cancel))
    }

    fn refresh_inner(&self, instance: &mut ModelInstance<'_>, cancel: Option<&CancelToken>) -> MemoryResult<()> {
        let (mut inner, _session) = self.begin(ControllerState::Reading, cancel)?;
        let pages: Vec<PageId> = instance.epochs.keys().copied().collect();
        for page in pages {
            inner.read_page(page)?;
            instance.epochs.insert(page, inner.cache.epoch(page));
            if let (Some(staged), Some(device)) = (instance.staged.get_mut(&page), inner.cache.device(page)) {
                staged.prune(device);
                if staged.is_empty() {
                    instance.staged.remove(&page);
                }
            }
        }
        Ok(())
    }

    /// Drop cached pages. Returns the pages that were cached.
    pub fn invalidate(&self, scope: InvalidateScope) -> MemoryResult<Vec<PageId>> {
        self.invalidate_inner(scope, None)
    }

    /// [`invalidate`](Self::invalidate) with cancellation.
    pub fn invalidate_with(&self, scope: InvalidateScope, cancel: &CancelToken) -> MemoryResult<Vec<PageId>> {
        self.invalidate_inner(scope, Some(cancel))
    }

    fn invalidate_inner(&self, scope: InvalidateScope, cancel: Option<&CancelToken>) -> MemoryResult<Vec<PageId>> {
        let (mut inner, _session) = self.begin(ControllerState::Idle, cancel)?;
        Ok(inner.invalidate(scope))
    }

    /// Drop cached pages and read them again.
    pub fn resync(&self, scope: InvalidateScope) -> MemoryResult<Vec<PageId>> {
        self.resync_inner(scope, None)
    }

    /// [`resync`](Self::resync) with cancellation.
    pub fn resync_with(&self, scope: InvalidateScope, cancel: &CancelToken) -> MemoryResult<Vec<PageId>> {
        self.resync_inner(scope, Some(cancel))
    }

    fn resync_inner(&self, scope: InvalidateScope, cancel: Option<&CancelToken>) -> MemoryResult<Vec<PageId>> {
        let (mut inner, _session) = self.begin(ControllerState::Syncing, cancel)?;
        let pages = inner.invalidate(scope);
        for page in &pages {
            inner.read_page(*page)?;
        }
        info!(%scope, pages = pages.len(), "cache resynced");
        Ok(pages)
    }

    /// Read a page from the device, bypassing the cache.
    pub fn read_raw(&self, page: PageId) -> MemoryResult<Vec<u8>> {
        self.read_raw_inner(page, None)
    }

    /// [`read_raw`](Self::read_raw) with cancellation.
    pub fn read_raw_with(&self, page: PageId, cancel: &CancelToken) -> MemoryResult<Vec<u8>> {
        self.read_raw_inner(page, Some(cancel))
    }

    fn read_raw_inner(&self, page: PageId, cancel: Option<&CancelToken>) -> MemoryResult<Vec<u8>> {
        if !self.map.contains(page) {
            return Err(MemoryError::PageOutOfRange { page });
        }
        let (mut inner, _session) = self.begin(ControllerState::Reading, cancel)?;
        inner.read_page(page)?;
        Ok(inner.cache.device(page).map(<[u8]>::to_vec).unwrap_or_default())
    }

    /// Write bytes to a page, commit, and drop the cached copy.
    pub fn write_raw(&self, page: PageId, start: usize, data: &[u8]) -> MemoryResult<()> {
        self.write_raw_inner(page, start, data, None)
    }

    /// [`write_raw`](Self::write_raw) with cancellation.
    pub fn write_raw_with(&self, page: PageId, start: usize, data: &[u8], cancel: &CancelToken) -> MemoryResult<()> {
        self.write_raw_inner(page, start, data, Some(cancel))
    }

    fn write_raw_inner(
        &self,
        page: PageId,
        start: usize,
        data: &[u8],
        cancel: Option<&CancelToken>,
    ) -> MemoryResult<()> {
        if !self.map.contains(page) {
            return Err(MemoryError::PageOutOfRange { page });
        }
        let (mut inner, _session) = self.begin(ControllerState::Writing, cancel)?;
        let result = inner.backend.write(page, start, data);
        if let Err(e) = &result {
            warn!(%page, start, error = %e, "raw write failed");
        }
        let commit = inner.commit();
        inner.invalidate(InvalidateScope::Page(page));
        result?;
        commit
    }

    /// Pages currently cached, by bank.
    pub fn cached_pages(&self) -> BTreeMap<&'static str, usize> {
        let inner = self.inner.lock();
        let mut counts = BTreeMap::new();
        for page in inner.cache.cached_pages(InvalidateScope::All) {
            *counts.entry(page.bank.as_str()).or_insert(0) += 1;
        }
        counts
    }
}
