//! Request/reply transport with retry.
//!
//! A [`Transport`] owns a [`Channel`] and a [`FrameCodec`]. It sends one
//! request at a time, waits for the reply carrying the same tag and command,
//! and repeats the identical bytes when an attempt times out or the reply is
//! corrupt. Frames on the event tag are handed to subscribers.

use std::ops::RangeInclusive;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use master_metrics::{metric_defs, MetricLabels};
use master_protocol::{
    ClassicCommand, CommandCode, CoreCommand, Frame, FrameCodec, FrameFormat, HardwareFamily, ProtocolResult,
    ReplyExpectation,
};
use tracing::{debug, warn};

use crate::channel::Channel;
use crate::error::{AttemptFailure, CommunicationError, LinkResult};

const READ_BUFFER: usize = 1024;

// ============================================================================
// Configuration
// ============================================================================

/// How a [`Transport`] frames, tags and retries requests.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    /// Family label used in logs and metrics.
    pub family: HardwareFamily,
    /// Frame format.
    pub format: FrameFormat,
    /// Deadline of one attempt.
    pub timeout: Duration,
    /// Extra attempts after the first one.
    pub retries: u32,
    /// Tags handed out to requests, in order.
    pub tags: RangeInclusive<u8>,
    /// Tag of unsolicited frames, if the family sends any.
    pub event_tag: Option<u8>,
}

impl TransportConfig {
    /// Defaults for a hardware family.
    pub fn for_family(family: HardwareFamily) -> Self {
        TransportConfig {
            family,
            format: family.frame_format(),
            timeout: Duration::from_secs(2),
            retries: 2,
            tags: family.request_tags(),
            event_tag: family.event_tag(),
        }
    }

    /// Set the attempt deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the number of extra attempts.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

// ============================================================================
// Requests and statistics
// ============================================================================

/// A request waiting to be framed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Instruction code.
    pub command: [u8; 2],
    /// Payload bytes.
    pub payload: Vec<u8>,
    /// Reply payload length, needed by formats without a length field.
    pub reply_len: Option<usize>,
}

impl Request {
    /// A request whose reply carries its own length.
    pub fn new(command: [u8; 2], payload: Vec<u8>) -> Self {
        Request {
            command,
            payload,
            reply_len: None,
        }
    }

    /// Frame a classic command.
    pub fn classic(command: &ClassicCommand) -> ProtocolResult<Self> {
        Ok(Request {
            command: command.code(),
            payload: command.encode()?,
            reply_len: Some(command.reply_len()),
        })
    }

    /// Frame a core command.
    pub fn core(command: &CoreCommand) -> Self {
        Request::new(command.code(), command.encode())
    }

    /// Instruction code in printable form.
    pub fn code(&self) -> CommandCode {
        CommandCode(self.command)
    }
}

/// Counters kept by a transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinkStats {
    /// Requests issued.
    pub requests: u64,
    /// Attempts repeated.
    pub retries: u64,
    /// Attempts without a reply.
    pub timeouts: u64,
    /// Frames rejected by the codec.
    pub checksum_failures: u64,
    /// Requests that failed.
    pub failures: u64,
    /// Event frames forwarded.
    pub events: u64,
    /// Valid frames that matched nothing.
    pub dropped_frames: u64,
    /// Bytes written to the channel.
    pub bytes_written: u64,
    /// Bytes read from the channel.
    pub bytes_read: u64,
}

// ============================================================================
// Transport
// ============================================================================

/// Blocking request/reply transport over a [`Channel`].
pub struct Transport<C> {
    channel: C,
    codec: FrameCodec,
    config: TransportConfig,
    next_tag: u8,
    subscribers: Vec<Sender<Frame>>,
    stats: LinkStats,
    read_buf: Vec<u8>,
}

impl<C: Channel> Transport<C> {
    /// Create a transport.
    pub fn new(channel: C, config: TransportConfig) -> Self {
        let next_tag = *config.tags.start();
        Transport {
            channel,
            codec: FrameCodec::new(config.format.clone()),
            config,
            next_tag,
            subscribers: Vec::new(),
            stats: LinkStats::default(),
            read_buf: vec![0; READ_BUFFER],
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Counters so far.
    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Underlying channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Receive every event frame from now on.
    pub fn subscribe_events(&mut self) -> Receiver<Frame> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Send a request and wait for its reply payload.
    pub fn send(&mut self, request: &Request) -> LinkResult<Vec<u8>> {
        let tag = self.allocate_tag();
        let frame = Frame::new(tag, request.command, request.payload.clone());
        let bytes = self.codec.encode_request(&frame)?;
        let expect = ReplyExpectation {
            command: request.command,
            payload_len: request.reply_len,
        };
        let labels = MetricLabels::new(self.config.family.as_str())
            .with_command(request.code().to_string())
            .to_labels();

        self.stats.requests += 1;
        metrics::counter!(metric_defs::LINK_REQUESTS.name, &labels).increment(1);
        debug!(command = %request.code(), tag, len = request.payload.len(), "sending request");

        let started = Instant::now();
        let attempts = self.config.retries + 1;
        let mut last = AttemptFailure::Timeout(self.config.timeout);
        for attempt in 1..=attempts {
            if attempt > 1 {
                self.stats.retries += 1;
                metrics::counter!(metric_defs::LINK_RETRIES.name, &labels).increment(1);
                warn!(command = %request.code(), tag, attempt, cause = %last, "retrying request");
            }

            self.discard_stale()?;
            self.write(&bytes)?;
            match self.await_reply(tag, &expect)? {
                Ok(payload) => {
                    metrics::histogram!(metric_defs::LINK_REQUEST_DURATION.name, &labels)
                        .record(started.elapsed().as_secs_f64() * 1000.0);
                    return Ok(payload);
                }
                Err(failure) => {
                    if matches!(failure, AttemptFailure::Timeout(_)) {
                        self.stats.timeouts += 1;
                        metrics::counter!(metric_defs::LINK_TIMEOUTS.name, &labels).increment(1);
                    }
                    last = failure;
                }
            }
        }

        self.stats.failures += 1;
        metrics::counter!(metric_defs::LINK_FAILURES.name, &labels).increment(1);
        warn!(command = %request.code(), attempts, cause = %last, "request failed");
        let err = match last {
            AttemptFailure::Timeout(timeout) if attempts == 1 => CommunicationError::Timeout {
                command: request.code(),
                timeout,
            },
            last => CommunicationError::RetriesExhausted {
                command: request.code(),
                attempts,
                last,
            },
        };
        Err(err.into())
    }

    /// Read whatever is pending and forward the event frames in it.
    pub fn poll_events(&mut self) -> LinkResult<()> {
        self.pump()?;
        while let Some(result) = self.codec.decode_reply(None) {
            if let Ok(frame) = result {
                self.route(frame);
            } else {
                self.count_corrupt();
            }
        }
        Ok(())
    }

    fn allocate_tag(&mut self) -> u8 {
        let tag = self.next_tag;
        self.next_tag = if tag >= *self.config.tags.end() {
            *self.config.tags.start()
        } else {
            tag + 1
        };
        tag
    }

    /// Drop stale input. Complete event frames in it are still delivered.
    fn discard_stale(&mut self) -> LinkResult<()> {
        self.poll_events()?;
        if self.codec.buffered_len() > 0 {
            debug!(bytes = self.codec.buffered_len(), "discarding stale input");
            self.codec.clear();
        }
        Ok(())
    }

    /// Move everything the channel has right now into the codec.
    fn pump(&mut self) -> Result<(), CommunicationError> {
        loop {
            let n = self.read_into_codec(Duration::ZERO)?;
            if n == 0 {
                return Ok(());
            }
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), CommunicationError> {
        self.channel.write_all(bytes).map_err(map_io)?;
        self.stats.bytes_written += bytes.len() as u64;
        metrics::counter!(metric_defs::LINK_BYTES_WRITTEN.name, "family" => self.config.family.as_str())
            .increment(bytes.len() as u64);
        Ok(())
    }

    fn read_into_codec(&mut self, timeout: Duration) -> Result<usize, CommunicationError> {
        let n = self.channel.read(&mut self.read_buf, timeout).map_err(map_io)?;
        if n > 0 {
            self.codec.push(&self.read_buf[..n]);
            self.stats.bytes_read += n as u64;
            metrics::counter!(metric_defs::LINK_BYTES_READ.name, "family" => self.config.family.as_str())
                .increment(n as u64);
        }
        Ok(n)
    }

    /// Wait for the reply of one attempt. The outer error ends the request,
    /// the inner one only the attempt.
    fn await_reply(
        &mut self,
        tag: u8,
        expect: &ReplyExpectation,
    ) -> Result<Result<Vec<u8>, AttemptFailure>, CommunicationError> {
        let deadline = Instant::now() + self.config.timeout;
        let mut corrupt = None;
        loop {
            while let Some(result) = self.codec.decode_reply(Some(expect)) {
                match result {
                    Ok(frame) if frame.tag == tag && frame.command == expect.command => {
                        return Ok(Ok(frame.payload));
                    }
                    Ok(frame) => self.route(frame),
                    Err(e) => {
                        self.count_corrupt();
                        debug!(error = %e, "rejected frame");
                        corrupt = Some(e);
                    }
                }
            }
            if let Some(e) = corrupt.take() {
                return Ok(Err(AttemptFailure::Corrupt(e)));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || self.read_into_codec(remaining)? == 0 {
                return Ok(Err(AttemptFailure::Timeout(self.config.timeout)));
            }
        }
    }

    /// Deliver an unsolicited or unmatched frame.
    fn route(&mut self, frame: Frame) {
        if Some(frame.tag) == self.config.event_tag {
            self.stats.events += 1;
            metrics::counter!(metric_defs::LINK_EVENTS.name, "family" => self.config.family.as_str()).increment(1);
            debug!(command = %frame.code(), "event frame");
            self.subscribers.retain(|tx| tx.send(frame.clone()).is_ok());
        } else {
            self.stats.dropped_frames += 1;
            debug!(command = %frame.code(), tag = frame.tag, "dropping unmatched frame");
        }
    }

    fn count_corrupt(&mut self) {
        self.stats.checksum_failures += 1;
        metrics::counter!(metric_defs::LINK_CHECKSUM_FAILURES.name, "family" => self.config.family.as_str())
            .increment(1);
    }
}

fn map_io(e: std::io::Error) -> CommunicationError {
    match e.kind() {
        std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::BrokenPipe => CommunicationError::ChannelClosed,
        _ => CommunicationError::Io(e),
    }
}
