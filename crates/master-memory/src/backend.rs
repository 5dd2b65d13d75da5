//! Device access strategies.
//!
//! A [`MemoryBackend`] moves whole pages and byte spans between the cache and
//! the master. The controller never builds commands itself; it picks a backend
//! for the hardware family at startup and talks to it through the trait.

use std::time::Duration;

use crossbeam_channel::Receiver;
use master_link::{Link, Request};
use master_protocol::{
    ClassicCommand, ClassicResponse, CommandCode, CoreCommand, CoreResponse, Frame, HardwareFamily, ProtocolError,
    SystemEvent, CLASSIC_ACTIVATE_EEPROM, CLASSIC_BANK_SIZE, CLASSIC_READ_EEPROM, CLASSIC_WRITE_EEPROM,
    CLASSIC_WRITE_WINDOW, CORE_ACTION_ACTIVATE_EEPROM, CORE_ACTION_TYPE_SYSTEM, CORE_BASIC_ACTION, CORE_EVENT,
    CORE_MEMORY_READ, CORE_MEMORY_WRITE, CORE_WRITE_OK,
};
use tracing::{debug, info, warn};

use crate::address::{BankLayout, MemoryBank, MemoryMap, PageId};
use crate::cache::InvalidateScope;
use crate::error::{MemoryError, MemoryResult};

// ============================================================================
// Configuration
// ============================================================================

/// Tuning of device access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryConfig {
    /// Bytes per core memory read.
    pub read_chunk: usize,
    /// Largest core memory write.
    pub max_write_length: usize,
    /// Core writes never cross a multiple of this offset.
    pub write_boundary: Option<usize>,
    /// Cached core fram pages expire after this long.
    pub fram_stale_after: Option<Duration>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig {
            read_chunk: 32,
            max_write_length: CLASSIC_BANK_SIZE,
            write_boundary: None,
            fram_stale_after: Some(Duration::from_secs(5)),
        }
    }
}

// ============================================================================
// Backend trait
// ============================================================================

/// Page-level access to one master.
pub trait MemoryBackend: Send {
    /// Hardware family.
    fn family(&self) -> HardwareFamily;

    /// Geometry of a bank, `None` if the family lacks it.
    fn layout(&self, bank: MemoryBank) -> Option<BankLayout>;

    /// Read a full page.
    fn read_page(&mut self, page: PageId) -> MemoryResult<Vec<u8>>;

    /// Write bytes into a page starting at `start`.
    fn write(&mut self, page: PageId, start: usize, data: &[u8]) -> MemoryResult<()>;

    /// Make written content take effect.
    fn commit(&mut self) -> MemoryResult<()>;

    /// Cache invalidations caused by the device since the last call.
    fn take_invalidations(&mut self) -> Vec<InvalidateScope>;

    /// All bank layouts.
    fn map(&self) -> MemoryMap {
        MemoryMap {
            eeprom: self.layout(MemoryBank::Eeprom),
            fram: self.layout(MemoryBank::Fram),
        }
    }
}

/// The backend for a family on top of a link.
pub fn backend_for<L: Link + 'static>(
    family: HardwareFamily,
    link: L,
    config: MemoryConfig,
) -> Box<dyn MemoryBackend> {
    match family {
        HardwareFamily::Classic => Box::new(ClassicBackend::new(link)),
        HardwareFamily::Core => Box::new(CoreBackend::new(link, config)),
    }
}

fn unexpected(command: [u8; 2], reason: String) -> MemoryError {
    let err = ProtocolError::UnexpectedResponse {
        command: CommandCode(command),
        reason,
    };
    warn!(error = %err, "reply does not match request");
    err.into()
}

fn check_page(map: &MemoryMap, page: PageId, start: usize, len: usize) -> MemoryResult<BankLayout> {
    match map.layout(page.bank) {
        Some(layout) if page.page < layout.page_count && start + len <= layout.page_size => Ok(layout),
        _ => Err(MemoryError::PageOutOfRange { page }),
    }
}

// ============================================================================
// Classic
// ============================================================================

/// Classic masters: whole-bank reads, windowed writes, explicit activation.
pub struct ClassicBackend<L> {
    link: L,
    map: MemoryMap,
    written: bool,
}

impl<L: Link> ClassicBackend<L> {
    /// Creates a backend.
    pub fn new(link: L) -> Self {
        ClassicBackend {
            link,
            map: MemoryMap::CLASSIC,
            written: false,
        }
    }

    fn bank(&self, page: PageId, start: usize, len: usize) -> MemoryResult<u8> {
        check_page(&self.map, page, start, len)?;
        u8::try_from(page.page).map_err(|_| MemoryError::PageOutOfRange { page })
    }

    fn request(&self, command: &ClassicCommand) -> MemoryResult<ClassicResponse> {
        let code = command.code();
        let payload = self.link.send(Request::classic(command)?)?;
        Ok(ClassicResponse::decode(code, &payload)?)
    }
}

impl<L: Link> MemoryBackend for ClassicBackend<L> {
    fn family(&self) -> HardwareFamily {
        HardwareFamily::Classic
    }

    fn layout(&self, bank: MemoryBank) -> Option<BankLayout> {
        self.map.layout(bank)
    }

    fn read_page(&mut self, page: PageId) -> MemoryResult<Vec<u8>> {
        let bank = self.bank(page, 0, 0)?;
        debug!(bank, "reading eeprom bank");
        match self.request(&ClassicCommand::ReadEeprom { bank })? {
            ClassicResponse::Eeprom { bank: got, data } if got == bank => Ok(data),
            other => Err(unexpected(CLASSIC_READ_EEPROM, format!("bank {} answered with {:?}", bank, other))),
        }
    }

    fn write(&mut self, page: PageId, start: usize, data: &[u8]) -> MemoryResult<()> {
        let bank = self.bank(page, start, data.len())?;
        for (i, window) in data.chunks(CLASSIC_WRITE_WINDOW).enumerate() {
            let address = (start + i * CLASSIC_WRITE_WINDOW) as u8;
            debug!(bank, address, len = window.len(), "writing eeprom");
            let command = ClassicCommand::WriteEeprom {
                bank,
                address,
                data: window.to_vec(),
            };
            match self.request(&command)? {
                ClassicResponse::WriteAck {
                    bank: b,
                    address: a,
                    length,
                } if b == bank && a == address && length as usize == window.len() => {
                    self.written = true;
                }
                other => {
                    return Err(unexpected(
                        CLASSIC_WRITE_EEPROM,
                        format!("write to {}@{} answered with {:?}", bank, address, other),
                    ))
                }
            }
        }
        Ok(())
    }

    fn commit(&mut self) -> MemoryResult<()> {
        if !self.written {
            return Ok(());
        }
        match self.request(&ClassicCommand::ActivateEeprom)? {
            ClassicResponse::Activated { status: 0 } => {
                self.written = false;
                info!("eeprom activated");
                Ok(())
            }
            ClassicResponse::Activated { status } => {
                warn!(status, "eeprom activation refused");
                Err(ProtocolError::WriteRejected(status).into())
            }
            other => Err(unexpected(CLASSIC_ACTIVATE_EEPROM, format!("answered with {:?}", other))),
        }
    }

    fn take_invalidations(&mut self) -> Vec<InvalidateScope> {
        Vec::new()
    }
}

// ============================================================================
// Core
// ============================================================================

/// Core masters: chunked reads, spanned writes, activation by basic action.
pub struct CoreBackend<L> {
    link: L,
    config: MemoryConfig,
    map: MemoryMap,
    events: Receiver<Frame>,
    eeprom_written: bool,
    pending_activations: usize,
}

impl<L: Link> CoreBackend<L> {
    /// Creates a backend and subscribes to the master's events.
    pub fn new(link: L, config: MemoryConfig) -> Self {
        let events = link.subscribe_events();
        let mut map = MemoryMap::CORE;
        if let Some(fram) = map.fram.as_mut() {
            fram.stale_after = config.fram_stale_after;
        }
        CoreBackend {
            link,
            config,
            map,
            events,
            eeprom_written: false,
            pending_activations: 0,
        }
    }

    fn request(&self, command: &CoreCommand) -> MemoryResult<CoreResponse> {
        let payload = self.link.send(Request::core(command))?;
        Ok(CoreResponse::decode(command.code(), &payload)?)
    }

    /// Where the write starting at `cursor` has to stop.
    fn span_end(&self, cursor: usize, end: usize) -> usize {
        let mut stop = end.min(cursor + self.config.max_write_length.max(1));
        if let Some(boundary) = self.config.write_boundary.filter(|b| *b > 0) {
            stop = stop.min((cursor / boundary + 1) * boundary);
        }
        stop
    }
}

impl<L: Link> MemoryBackend for CoreBackend<L> {
    fn family(&self) -> HardwareFamily {
        HardwareFamily::Core
    }

    fn layout(&self, bank: MemoryBank) -> Option<BankLayout> {
        self.map.layout(bank)
    }

    fn read_page(&mut self, page: PageId) -> MemoryResult<Vec<u8>> {
        let layout = check_page(&self.map, page, 0, 0)?;
        let memory = page.bank.memory_type();
        let chunk = self.config.read_chunk.clamp(1, u8::MAX as usize);
        let mut bytes = Vec::with_capacity(layout.page_size);
        while bytes.len() < layout.page_size {
            let start = u8::try_from(bytes.len()).map_err(|_| MemoryError::PageOutOfRange { page })?;
            let length = chunk.min(layout.page_size - bytes.len()) as u8;
            debug!(%page, start, length, "reading memory");
            let command = CoreCommand::MemoryRead {
                memory,
                page: page.page,
                start,
                length,
            };
            match self.request(&command)? {
                CoreResponse::MemoryRead {
                    memory: m,
                    page: p,
                    start: s,
                    data,
                } if m == memory && p == page.page && s == start && data.len() == length as usize => {
                    bytes.extend_from_slice(&data);
                }
                other => {
                    return Err(unexpected(
                        CORE_MEMORY_READ,
                        format!("read of {}@{} answered with {:?}", page, start, other),
                    ))
                }
            }
        }
        Ok(bytes)
    }

    fn write(&mut self, page: PageId, start: usize, data: &[u8]) -> MemoryResult<()> {
        check_page(&self.map, page, start, data.len())?;
        let memory = page.bank.memory_type();
        let end = start + data.len();
        let mut cursor = start;
        while cursor < end {
            let stop = self.span_end(cursor, end);
            let offset = u8::try_from(cursor).map_err(|_| MemoryError::PageOutOfRange { page })?;
            debug!(%page, start = offset, len = stop - cursor, "writing memory");
            let command = CoreCommand::MemoryWrite {
                memory,
                page: page.page,
                start: offset,
                data: data[cursor - start..stop - start].to_vec(),
            };
            match self.request(&command)? {
                CoreResponse::MemoryWrite { result, .. } if result != CORE_WRITE_OK => {
                    warn!(%page, start = offset, result, "write refused");
                    return Err(ProtocolError::WriteRejected(result).into());
                }
                // The length byte wraps for full-page writes, so only the location is checked.
                CoreResponse::MemoryWrite {
                    memory: m,
                    page: p,
                    start: s,
                    ..
                } if m == memory && p == page.page && s == offset => {}
                other => {
                    return Err(unexpected(
                        CORE_MEMORY_WRITE,
                        format!("write to {}@{} answered with {:?}", page, offset, other),
                    ))
                }
            }
            if page.bank == MemoryBank::Eeprom {
                self.eeprom_written = true;
            }
            cursor = stop;
        }
        Ok(())
    }

    fn commit(&mut self) -> MemoryResult<()> {
        if !self.eeprom_written {
            return Ok(());
        }
        match self.request(&CoreCommand::activate_eeprom())? {
            CoreResponse::BasicAction {
                action_type, action, ..
            } if action_type == CORE_ACTION_TYPE_SYSTEM && action == CORE_ACTION_ACTIVATE_EEPROM => {
                self.eeprom_written = false;
                self.pending_activations += 1;
                info!("eeprom activated");
                Ok(())
            }
            other => Err(unexpected(CORE_BASIC_ACTION, format!("activation answered with {:?}", other))),
        }
    }

    fn take_invalidations(&mut self) -> Vec<InvalidateScope> {
        if let Err(e) = self.link.poll_events() {
            warn!(error = %e, "polling events failed");
        }
        let mut scopes = Vec::new();
        while let Ok(frame) = self.events.try_recv() {
            if frame.command != CORE_EVENT {
                continue;
            }
            let event = match CoreResponse::decode(frame.command, &frame.payload) {
                Ok(CoreResponse::Event(event)) => event,
                Ok(_) => continue,
                Err(e) => {
                    warn!(error = %e, "undecodable event");
                    continue;
                }
            };
            match event.system() {
                Some(SystemEvent::EepromActivated) if self.pending_activations > 0 => {
                    self.pending_activations -= 1;
                    debug!("own eeprom activation confirmed");
                }
                Some(SystemEvent::EepromActivated) => {
                    info!("eeprom activated externally, invalidating cache");
                    scopes.push(InvalidateScope::All);
                }
                Some(SystemEvent::StartupCompleted) => {
                    info!("master restarted, invalidating cache");
                    self.pending_activations = 0;
                    scopes.push(InvalidateScope::All);
                }
                None => {}
            }
        }
        scopes
    }
}
