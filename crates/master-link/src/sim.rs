//! In-process simulated master.
//!
//! [`SimulatedMaster`] is a [`Channel`] that decodes the requests written to
//! it, executes them against an in-memory image and queues the framed replies
//! for reading. Replies are produced synchronously, so an empty queue means
//! the reply was lost and reads return immediately with `Ok(0)`.
//!
//! A [`SimHandle`] shares the simulator state with the test or tool that
//! created it: it inspects and seeds memory, counts commands, schedules faults
//! and injects unsolicited events.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::Arc;
use std::time::Duration;

use master_protocol::{
    ClassicCommand, ClassicResponse, CoreCommand, CoreEvent, CoreResponse, Frame, FrameCodec, HardwareFamily,
    MemoryType, CLASSIC_BANK_SIZE, CORE_ACTION_ACTIVATE_EEPROM, CORE_ACTION_TYPE_SYSTEM, CORE_EVENT, CORE_EVENT_TAG,
    CORE_WRITE_OK,
};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::channel::Channel;

/// Number of classic eeprom banks.
pub const CLASSIC_BANKS: usize = 256;
/// Number of core eeprom pages.
pub const CORE_EEPROM_PAGES: usize = 512;
/// Number of core fram pages.
pub const CORE_FRAM_PAGES: usize = 128;
/// Bytes per page on both families.
pub const PAGE_SIZE: usize = CLASSIC_BANK_SIZE;

/// Result code the simulator uses for a refused core write.
const WRITE_REFUSED: u8 = b'E';

// ============================================================================
// Faults
// ============================================================================

/// Reply faults applied by the simulator.
///
/// The counted faults are consumed first: the next `drop_replies` replies are
/// swallowed, then the next `corrupt_replies` replies get a broken checksum.
/// After that every reply is dropped with `drop_rate` and corrupted with
/// `corrupt_rate` probability, drawn from a generator seeded with `seed`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FaultPlan {
    /// Replies to drop.
    pub drop_replies: u32,
    /// Replies to corrupt.
    pub corrupt_replies: u32,
    /// Probability of dropping any further reply.
    pub drop_rate: f64,
    /// Probability of corrupting any further reply.
    pub corrupt_rate: f64,
    /// Seed of the random faults.
    pub seed: u64,
}

impl Default for FaultPlan {
    fn default() -> Self {
        FaultPlan {
            drop_replies: 0,
            corrupt_replies: 0,
            drop_rate: 0.0,
            corrupt_rate: 0.0,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    None,
    Drop,
    Corrupt,
}

/// A memory write the simulator executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimWrite {
    /// Memory type.
    pub memory: MemoryType,
    /// Page (classic: bank).
    pub page: u16,
    /// First byte.
    pub start: u8,
    /// Number of bytes.
    pub length: usize,
}

// ============================================================================
// State
// ============================================================================

struct SimState {
    family: HardwareFamily,
    eeprom: Vec<u8>,
    fram: Vec<u8>,
    outbound: VecDeque<u8>,
    faults: FaultPlan,
    rng: ChaCha8Rng,
    counts: HashMap<[u8; 2], usize>,
    writes: Vec<SimWrite>,
    refused: HashSet<(MemoryType, u16)>,
    activations: usize,
    version: (u8, u8, u8),
}

impl SimState {
    fn new(family: HardwareFamily) -> Self {
        let (eeprom_pages, fram_pages) = match family {
            HardwareFamily::Classic => (CLASSIC_BANKS, 0),
            HardwareFamily::Core => (CORE_EEPROM_PAGES, CORE_FRAM_PAGES),
        };
        let version = match family {
            HardwareFamily::Classic => (3, 143, 103),
            HardwareFamily::Core => (1, 0, 160),
        };
        SimState {
            family,
            eeprom: vec![0xFF; eeprom_pages * PAGE_SIZE],
            fram: vec![0x00; fram_pages * PAGE_SIZE],
            outbound: VecDeque::new(),
            faults: FaultPlan::default(),
            rng: ChaCha8Rng::seed_from_u64(0),
            counts: HashMap::new(),
            writes: Vec::new(),
            refused: HashSet::new(),
            activations: 0,
            version,
        }
    }

    fn image(&mut self, memory: MemoryType) -> &mut Vec<u8> {
        match memory {
            MemoryType::Eeprom => &mut self.eeprom,
            MemoryType::Fram => &mut self.fram,
        }
    }

    /// Byte range of a page, if it exists.
    fn span(&mut self, memory: MemoryType, page: u16, start: usize, len: usize) -> Option<std::ops::Range<usize>> {
        let image_len = self.image(memory).len();
        let from = page as usize * PAGE_SIZE + start;
        let to = from + len;
        if start + len > PAGE_SIZE || to > image_len {
            None
        } else {
            Some(from..to)
        }
    }

    fn next_fault(&mut self) -> Fault {
        if self.faults.drop_replies > 0 {
            self.faults.drop_replies -= 1;
            return Fault::Drop;
        }
        if self.faults.corrupt_replies > 0 {
            self.faults.corrupt_replies -= 1;
            return Fault::Corrupt;
        }
        if self.faults.drop_rate > 0.0 && self.rng.gen_bool(self.faults.drop_rate.min(1.0)) {
            return Fault::Drop;
        }
        if self.faults.corrupt_rate > 0.0 && self.rng.gen_bool(self.faults.corrupt_rate.min(1.0)) {
            return Fault::Corrupt;
        }
        Fault::None
    }

    /// Queue a reply frame, subject to the fault plan.
    fn reply(&mut self, codec: &FrameCodec, frame: Frame) {
        let mut bytes = match codec.encode_reply(&frame) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(error = %e, "simulator could not frame reply");
                return;
            }
        };
        match self.next_fault() {
            Fault::Drop => {
                debug!(command = %frame.code(), "simulator dropping reply");
                return;
            }
            Fault::Corrupt => {
                let at = bytes.len() - codec.format().reply_end.len() - 1;
                bytes[at] ^= 0x5A;
                debug!(command = %frame.code(), "simulator corrupting reply");
            }
            Fault::None => {}
        }
        self.outbound.extend(bytes);
    }

    /// Queue an event frame. Events are never faulted.
    fn event(&mut self, codec: &FrameCodec, event: CoreEvent) {
        let frame = Frame::new(CORE_EVENT_TAG, CORE_EVENT, CoreResponse::Event(event).encode());
        if let Ok(bytes) = codec.encode_reply(&frame) {
            self.outbound.extend(bytes);
        }
    }

    fn handle(&mut self, codec: &FrameCodec, frame: Frame) {
        *self.counts.entry(frame.command).or_insert(0) += 1;
        match self.family {
            HardwareFamily::Classic => self.handle_classic(codec, frame),
            HardwareFamily::Core => self.handle_core(codec, frame),
        }
    }

    fn handle_classic(&mut self, codec: &FrameCodec, frame: Frame) {
        let command = match ClassicCommand::decode(frame.command, &frame.payload) {
            Ok(command) => command,
            Err(e) => {
                debug!(error = %e, "simulator ignoring request");
                return;
            }
        };
        let response = match command {
            ClassicCommand::ReadEeprom { bank } => {
                let Some(range) = self.span(MemoryType::Eeprom, bank as u16, 0, PAGE_SIZE) else {
                    return;
                };
                ClassicResponse::Eeprom {
                    bank,
                    data: self.eeprom[range].to_vec(),
                }
            }
            ClassicCommand::WriteEeprom { bank, address, data } => {
                if self.refused.contains(&(MemoryType::Eeprom, bank as u16)) {
                    // Classic masters do not answer a write they could not perform.
                    return;
                }
                let Some(range) = self.span(MemoryType::Eeprom, bank as u16, address as usize, data.len()) else {
                    return;
                };
                self.eeprom[range].copy_from_slice(&data);
                self.writes.push(SimWrite {
                    memory: MemoryType::Eeprom,
                    page: bank as u16,
                    start: address,
                    length: data.len(),
                });
                ClassicResponse::WriteAck {
                    bank,
                    address,
                    length: data.len() as u8,
                }
            }
            ClassicCommand::ActivateEeprom => {
                self.activations += 1;
                ClassicResponse::Activated { status: 0 }
            }
            ClassicCommand::FirmwareVersion => {
                let (major, minor, patch) = self.version;
                ClassicResponse::FirmwareVersion { major, minor, patch }
            }
            ClassicCommand::BasicAction {
                action_type,
                action,
                device_nr,
                extra_parameter,
            } => ClassicResponse::BasicAction {
                action_type,
                action,
                device_nr,
                extra_parameter,
            },
        };
        self.reply(codec, Frame::new(frame.tag, frame.command, response.encode()));
    }

    fn handle_core(&mut self, codec: &FrameCodec, frame: Frame) {
        let command = match CoreCommand::decode(frame.command, &frame.payload) {
            Ok(command) => command,
            Err(e) => {
                debug!(error = %e, "simulator ignoring request");
                return;
            }
        };
        let mut activated = false;
        let response = match command {
            CoreCommand::MemoryRead {
                memory,
                page,
                start,
                length,
            } => {
                let Some(range) = self.span(memory, page, start as usize, length as usize) else {
                    return;
                };
                CoreResponse::MemoryRead {
                    memory,
                    page,
                    start,
                    data: self.image(memory)[range].to_vec(),
                }
            }
            CoreCommand::MemoryWrite {
                memory,
                page,
                start,
                data,
            } => {
                let result = match self.span(memory, page, start as usize, data.len()) {
                    Some(_) if self.refused.contains(&(memory, page)) => WRITE_REFUSED,
                    Some(range) => {
                        self.image(memory)[range].copy_from_slice(&data);
                        self.writes.push(SimWrite {
                            memory,
                            page,
                            start,
                            length: data.len(),
                        });
                        CORE_WRITE_OK
                    }
                    None => WRITE_REFUSED,
                };
                CoreResponse::MemoryWrite {
                    memory,
                    page,
                    start,
                    length: data.len() as u8,
                    result,
                }
            }
            CoreCommand::BasicAction {
                action_type,
                action,
                device_nr,
                extra_parameter,
            } => {
                if action_type == CORE_ACTION_TYPE_SYSTEM && action == CORE_ACTION_ACTIVATE_EEPROM {
                    self.activations += 1;
                    activated = true;
                }
                CoreResponse::BasicAction {
                    action_type,
                    action,
                    device_nr,
                    extra_parameter,
                }
            }
            CoreCommand::FirmwareVersion => {
                let (major, minor, patch) = self.version;
                CoreResponse::FirmwareVersion { major, minor, patch }
            }
        };
        self.reply(codec, Frame::new(frame.tag, frame.command, response.encode()));
        if activated {
            self.event(codec, CoreEvent::eeprom_activated());
        }
    }
}

// ============================================================================
// Channel
// ============================================================================

/// A simulated master reachable as a [`Channel`].
pub struct SimulatedMaster {
    state: Arc<Mutex<SimState>>,
    codec: FrameCodec,
}

impl SimulatedMaster {
    /// Create a simulator and the handle that controls it.
    pub fn new(family: HardwareFamily) -> (Self, SimHandle) {
        let state = Arc::new(Mutex::new(SimState::new(family)));
        let master = SimulatedMaster {
            state: Arc::clone(&state),
            codec: FrameCodec::new(family.frame_format()),
        };
        let handle = SimHandle {
            state,
            codec: Arc::new(FrameCodec::new(family.frame_format())),
        };
        (master, handle)
    }
}

impl Channel for SimulatedMaster {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.codec.push(data);
        let mut state = self.state.lock();
        while let Some(result) = self.codec.decode_request() {
            match result {
                Ok(frame) => state.handle(&self.codec, frame),
                Err(e) => debug!(error = %e, "simulator rejected request frame"),
            }
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
        let mut state = self.state.lock();
        let n = buf.len().min(state.outbound.len());
        for (slot, byte) in buf.iter_mut().zip(state.outbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Inspection and control of a [`SimulatedMaster`].
#[derive(Clone)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
    codec: Arc<FrameCodec>,
}

impl SimHandle {
    /// Family being simulated.
    pub fn family(&self) -> HardwareFamily {
        self.state.lock().family
    }

    /// Number of requests received with the given instruction code.
    pub fn command_count(&self, command: [u8; 2]) -> usize {
        self.state.lock().counts.get(&command).copied().unwrap_or(0)
    }

    /// Number of requests received in total.
    pub fn total_commands(&self) -> usize {
        self.state.lock().counts.values().sum()
    }

    /// Forget command counts and the write log.
    pub fn reset_counts(&self) {
        let mut state = self.state.lock();
        state.counts.clear();
        state.writes.clear();
    }

    /// Memory writes executed so far.
    pub fn writes(&self) -> Vec<SimWrite> {
        self.state.lock().writes.clone()
    }

    /// Eeprom activations executed so far.
    pub fn activations(&self) -> usize {
        self.state.lock().activations
    }

    /// Content of a page (classic: bank), empty if it does not exist.
    pub fn memory(&self, memory: MemoryType, page: u16) -> Vec<u8> {
        let mut state = self.state.lock();
        match state.span(memory, page, 0, PAGE_SIZE) {
            Some(range) => state.image(memory)[range].to_vec(),
            None => Vec::new(),
        }
    }

    /// Overwrite bytes of a page directly, as if changed by another party.
    pub fn set_memory(&self, memory: MemoryType, page: u16, offset: u8, data: &[u8]) {
        let mut state = self.state.lock();
        if let Some(range) = state.span(memory, page, offset as usize, data.len()) {
            state.image(memory)[range].copy_from_slice(data);
        }
    }

    /// Replace the fault plan and reseed the random faults.
    pub fn set_faults(&self, faults: FaultPlan) {
        let mut state = self.state.lock();
        state.rng = ChaCha8Rng::seed_from_u64(faults.seed);
        state.faults = faults;
    }

    /// Refuse every write to a page from now on.
    pub fn refuse_writes(&self, memory: MemoryType, page: u16) {
        self.state.lock().refused.insert((memory, page));
    }

    /// Accept writes to every page again.
    pub fn accept_writes(&self) {
        self.state.lock().refused.clear();
    }

    /// Firmware version reported by the simulator.
    pub fn set_firmware_version(&self, major: u8, minor: u8, patch: u8) {
        self.state.lock().version = (major, minor, patch);
    }

    /// Queue an eeprom activation event nobody asked for. Only core masters
    /// send events, so this does nothing on classic.
    pub fn inject_eeprom_activation(&self) {
        let mut state = self.state.lock();
        if state.family == HardwareFamily::Core {
            state.activations += 1;
            state.event(&self.codec, CoreEvent::eeprom_activated());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use master_protocol::{FrameFormat, CORE_MEMORY_READ, CORE_MEMORY_WRITE};

    fn exchange(sim: &mut SimulatedMaster, codec: &mut FrameCodec, frame: Frame) -> Option<Frame> {
        sim.write_all(&codec.encode_request(&frame).expect("encode")).expect("write");
        let mut buf = [0u8; 2048];
        let n = sim.read(&mut buf, Duration::ZERO).expect("read");
        codec.push(&buf[..n]);
        codec.decode_reply(None).map(|r| r.expect("valid"))
    }

    #[test]
    fn test_core_write_then_read() {
        let (mut sim, handle) = SimulatedMaster::new(HardwareFamily::Core);
        let mut codec = FrameCodec::new(FrameFormat::core());

        let write = CoreCommand::MemoryWrite {
            memory: MemoryType::Fram,
            page: 2,
            start: 10,
            data: vec![1, 2, 3],
        };
        let reply = exchange(&mut sim, &mut codec, Frame::new(3, CORE_MEMORY_WRITE, write.encode())).expect("reply");
        assert_eq!(reply.payload.last(), Some(&CORE_WRITE_OK));

        let read = CoreCommand::MemoryRead {
            memory: MemoryType::Fram,
            page: 2,
            start: 8,
            length: 6,
        };
        let reply = exchange(&mut sim, &mut codec, Frame::new(4, CORE_MEMORY_READ, read.encode())).expect("reply");
        assert_eq!(&reply.payload[4..], &[0, 0, 1, 2, 3, 0]);
        assert_eq!(handle.writes().len(), 1);
        assert_eq!(handle.command_count(CORE_MEMORY_READ), 1);
    }

    #[test]
    fn test_refused_core_write() {
        let (mut sim, handle) = SimulatedMaster::new(HardwareFamily::Core);
        let mut codec = FrameCodec::new(FrameFormat::core());
        handle.refuse_writes(MemoryType::Eeprom, 5);

        let write = CoreCommand::MemoryWrite {
            memory: MemoryType::Eeprom,
            page: 5,
            start: 0,
            data: vec![9],
        };
        let reply = exchange(&mut sim, &mut codec, Frame::new(3, CORE_MEMORY_WRITE, write.encode())).expect("reply");
        assert_eq!(reply.payload.last(), Some(&WRITE_REFUSED));
        assert_eq!(handle.memory(MemoryType::Eeprom, 5)[0], 0xFF);
    }

    #[test]
    fn test_activation_emits_event() {
        let (mut sim, handle) = SimulatedMaster::new(HardwareFamily::Core);
        let mut codec = FrameCodec::new(FrameFormat::core());
        let activate = CoreCommand::activate_eeprom();
        let reply = exchange(&mut sim, &mut codec, Frame::new(3, activate.code(), activate.encode())).expect("reply");
        assert_eq!(&reply.command, b"BA");

        let event = codec.decode_reply(None).expect("event").expect("valid");
        assert_eq!(event.tag, CORE_EVENT_TAG);
        assert_eq!(handle.activations(), 1);
    }

    #[test]
    fn test_counted_faults() {
        let (mut sim, handle) = SimulatedMaster::new(HardwareFamily::Core);
        let mut codec = FrameCodec::new(FrameFormat::core());
        handle.set_faults(FaultPlan {
            drop_replies: 1,
            corrupt_replies: 1,
            ..FaultPlan::default()
        });
        let status = CoreCommand::FirmwareVersion;
        let frame = Frame::new(3, status.code(), status.encode());

        assert!(exchange(&mut sim, &mut codec, frame.clone()).is_none());

        sim.write_all(&codec.encode_request(&frame).expect("encode")).expect("write");
        let mut buf = [0u8; 64];
        let n = sim.read(&mut buf, Duration::ZERO).expect("read");
        codec.push(&buf[..n]);
        assert!(matches!(codec.decode_reply(None), Some(Err(_))));

        assert!(exchange(&mut sim, &mut codec, frame).is_some());
    }

    #[test]
    fn test_random_faults_are_reproducible() {
        let run = || {
            let (mut sim, handle) = SimulatedMaster::new(HardwareFamily::Core);
            let mut codec = FrameCodec::new(FrameFormat::core());
            handle.set_faults(FaultPlan {
                drop_rate: 0.5,
                seed: 42,
                ..FaultPlan::default()
            });
            let status = CoreCommand::FirmwareVersion;
            (0..32)
                .map(|tag| exchange(&mut sim, &mut codec, Frame::new(tag + 3, status.code(), status.encode())).is_some())
                .collect::<Vec<_>>()
        };
        let first = run();
        assert_eq!(first, run());
        assert!(first.iter().any(|delivered| *delivered));
        assert!(first.iter().any(|delivered| !*delivered));
    }

    #[test]
    fn test_classic_bank_bounds() {
        let (_, handle) = SimulatedMaster::new(HardwareFamily::Classic);
        assert_eq!(handle.memory(MemoryType::Eeprom, 255).len(), PAGE_SIZE);
        assert!(handle.memory(MemoryType::Eeprom, 256).is_empty());
        assert!(handle.memory(MemoryType::Fram, 0).is_empty());
    }
}
