//! Frame encoding/decoding utilities.
//!
//! Both master families wrap a command in the same kind of envelope, but the
//! marker bytes, the header order and the integrity code differ. A
//! [`FrameFormat`] carries those details so the codec itself stays generic.
//!
//! ```text
//! core:    | start | tag | cmd[2] | len_hi | len_lo | payload | 'C' | sum8   | end |
//! classic: | start | cmd[2] | tag  | payload (fixed size)    | 'C' | sum16  | end |
//! ```
//!
//! The checksum covers the header and the payload, never the markers.

use bytes::{Buf, BytesMut};

use crate::constants::*;
use crate::error::{CommandCode, ProtocolError, ProtocolResult};

/// Integrity code appended to every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Checksum {
    /// Byte sum modulo 256, one byte.
    Sum8,
    /// Byte sum modulo 65536, two bytes big-endian.
    Sum16,
}

impl Checksum {
    /// Number of bytes the checksum occupies.
    pub const fn width(&self) -> usize {
        match self {
            Checksum::Sum8 => 1,
            Checksum::Sum16 => 2,
        }
    }

    /// Compute the checksum over `data`.
    pub fn compute(&self, data: &[u8]) -> u16 {
        let sum = data.iter().fold(0u32, |acc, b| acc.wrapping_add(*b as u32));
        match self {
            Checksum::Sum8 => (sum & 0xFF) as u16,
            Checksum::Sum16 => (sum & 0xFFFF) as u16,
        }
    }

    fn write(&self, value: u16, buf: &mut Vec<u8>) {
        match self {
            Checksum::Sum8 => buf.push(value as u8),
            Checksum::Sum16 => buf.extend_from_slice(&value.to_be_bytes()),
        }
    }

    fn read(&self, bytes: &[u8]) -> u16 {
        match self {
            Checksum::Sum8 => bytes[0] as u16,
            Checksum::Sum16 => u16::from_be_bytes([bytes[0], bytes[1]]),
        }
    }
}

/// Order and content of the header that follows the start marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum HeaderLayout {
    /// Tag, command code, 2-byte big-endian payload length.
    TagCommandLength,
    /// Command code, tag. Requests are padded to `request_payload` bytes,
    /// reply lengths are known from the command that is waited for.
    CommandTag {
        /// Fixed payload size of every request.
        request_payload: usize,
    },
}

impl HeaderLayout {
    /// Number of header bytes.
    pub const fn len(&self) -> usize {
        match self {
            HeaderLayout::TagCommandLength => 5,
            HeaderLayout::CommandTag { .. } => 3,
        }
    }
}

/// Marker bytes, header layout and integrity code of one hardware family.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrameFormat {
    /// Marker starting a request.
    pub request_start: Vec<u8>,
    /// Marker ending a request.
    pub request_end: Vec<u8>,
    /// Marker starting a reply (may be empty).
    pub reply_start: Vec<u8>,
    /// Marker ending a reply.
    pub reply_end: Vec<u8>,
    /// Header layout.
    pub header: HeaderLayout,
    /// Integrity code.
    pub checksum: Checksum,
    /// Byte written right before the checksum, if any.
    pub checksum_marker: Option<u8>,
    /// Largest payload a frame may carry.
    pub max_payload: usize,
}

impl FrameFormat {
    /// Format spoken by core masters.
    pub fn core() -> Self {
        FrameFormat {
            request_start: REQUEST_START.to_vec(),
            request_end: CORE_REQUEST_END.to_vec(),
            reply_start: CORE_REPLY_START.to_vec(),
            reply_end: LINE_END.to_vec(),
            header: HeaderLayout::TagCommandLength,
            checksum: Checksum::Sum8,
            checksum_marker: Some(CHECKSUM_MARKER),
            max_payload: CORE_MAX_PAYLOAD,
        }
    }

    /// Format spoken by classic masters.
    pub fn classic() -> Self {
        FrameFormat {
            request_start: REQUEST_START.to_vec(),
            request_end: LINE_END.to_vec(),
            reply_start: Vec::new(),
            reply_end: LINE_END.to_vec(),
            header: HeaderLayout::CommandTag {
                request_payload: CLASSIC_REQUEST_PAYLOAD,
            },
            checksum: Checksum::Sum16,
            checksum_marker: Some(CHECKSUM_MARKER),
            max_payload: CLASSIC_MAX_PAYLOAD,
        }
    }

    /// Total encoded size of a frame with the given payload length.
    pub fn framed_len(&self, direction: Direction, payload_len: usize) -> usize {
        let (start, end) = self.markers(direction);
        let payload_len = match (self.header, direction) {
            (HeaderLayout::CommandTag { request_payload }, Direction::Request) => request_payload,
            _ => payload_len,
        };
        start.len()
            + self.header.len()
            + payload_len
            + self.checksum_marker.map_or(0, |_| 1)
            + self.checksum.width()
            + end.len()
    }

    fn markers(&self, direction: Direction) -> (&[u8], &[u8]) {
        match direction {
            Direction::Request => (&self.request_start, &self.request_end),
            Direction::Reply => (&self.reply_start, &self.reply_end),
        }
    }
}

/// Which way a frame travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Gateway to master.
    Request,
    /// Master to gateway.
    Reply,
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Sequence tag echoed by the master.
    pub tag: u8,
    /// Instruction code.
    pub command: [u8; 2],
    /// Payload bytes.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a frame.
    pub fn new(tag: u8, command: [u8; 2], payload: Vec<u8>) -> Self {
        Frame {
            tag,
            command,
            payload,
        }
    }

    /// Instruction code in printable form.
    pub fn code(&self) -> CommandCode {
        CommandCode(self.command)
    }
}

/// What a pending request waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyExpectation {
    /// Instruction code of the reply.
    pub command: [u8; 2],
    /// Payload length, required by formats without a length field.
    pub payload_len: Option<usize>,
}

/// A codec for reading and writing framed messages.
#[derive(Debug)]
pub struct FrameCodec {
    format: FrameFormat,
    /// Buffer for accumulating incoming data.
    buffer: BytesMut,
}

impl FrameCodec {
    /// Create a new frame codec for the given format.
    pub fn new(format: FrameFormat) -> Self {
        let capacity = format.framed_len(Direction::Reply, format.max_payload);
        FrameCodec {
            format,
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// The format this codec speaks.
    pub fn format(&self) -> &FrameFormat {
        &self.format
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Encode a gateway to master frame.
    pub fn encode_request(&self, frame: &Frame) -> ProtocolResult<Vec<u8>> {
        self.encode(Direction::Request, frame)
    }

    /// Encode a master to gateway frame.
    pub fn encode_reply(&self, frame: &Frame) -> ProtocolResult<Vec<u8>> {
        self.encode(Direction::Reply, frame)
    }

    /// Try to decode a reply from the buffer.
    ///
    /// Returns `None` when more data is needed, `Some(Err(_))` when a
    /// corrupt frame was skipped, and `Some(Ok(frame))` otherwise.
    pub fn decode_reply(&mut self, expect: Option<&ReplyExpectation>) -> Option<ProtocolResult<Frame>> {
        self.decode(Direction::Reply, expect)
    }

    /// Try to decode a request from the buffer (master side).
    pub fn decode_request(&mut self) -> Option<ProtocolResult<Frame>> {
        self.decode(Direction::Request, None)
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    fn encode(&self, direction: Direction, frame: &Frame) -> ProtocolResult<Vec<u8>> {
        let format = &self.format;
        let len = frame.payload.len();
        if len > format.max_payload || len > u16::MAX as usize {
            return Err(ProtocolError::FrameTooLong {
                max: format.max_payload,
                actual: len,
            });
        }

        let mut body = Vec::with_capacity(format.header.len() + len);
        match format.header {
            HeaderLayout::TagCommandLength => {
                body.push(frame.tag);
                body.extend_from_slice(&frame.command);
                body.extend_from_slice(&(len as u16).to_be_bytes());
                body.extend_from_slice(&frame.payload);
            }
            HeaderLayout::CommandTag { request_payload } => {
                body.extend_from_slice(&frame.command);
                body.push(frame.tag);
                body.extend_from_slice(&frame.payload);
                if direction == Direction::Request {
                    if len > request_payload {
                        return Err(ProtocolError::FrameTooLong {
                            max: request_payload,
                            actual: len,
                        });
                    }
                    body.resize(format.header.len() + request_payload, 0);
                }
            }
        }

        let (start, end) = format.markers(direction);
        let mut buf = Vec::with_capacity(format.framed_len(direction, len));
        buf.extend_from_slice(start);
        buf.extend_from_slice(&body);
        if let Some(marker) = format.checksum_marker {
            buf.push(marker);
        }
        format.checksum.write(format.checksum.compute(&body), &mut buf);
        buf.extend_from_slice(end);
        log::trace!("encoded {} frame: {:02X?}", frame.code(), buf);
        Ok(buf)
    }

    fn decode(&mut self, direction: Direction, expect: Option<&ReplyExpectation>) -> Option<ProtocolResult<Frame>> {
        let (start, end) = self.format.markers(direction);
        let header = self.format.header;

        // Without a start marker the expected command code is the sync pattern.
        let (sync, header_at) = if !start.is_empty() {
            (start.to_vec(), start.len())
        } else {
            (expect?.command.to_vec(), 0)
        };
        let skip = if header_at == 0 { 1 } else { sync.len() };

        match find(&self.buffer, &sync) {
            Some(0) => {}
            Some(pos) => {
                log::debug!("discarding {} bytes before frame start", pos);
                self.buffer.advance(pos);
            }
            None => {
                let keep = sync.len() - 1;
                if self.buffer.len() > keep {
                    let drop = self.buffer.len() - keep;
                    log::debug!("discarding {} bytes without frame start", drop);
                    self.buffer.advance(drop);
                }
                return None;
            }
        }

        if self.buffer.len() < header_at + header.len() {
            return None;
        }
        let h = &self.buffer[header_at..header_at + header.len()];
        let (tag, command, payload_len) = match header {
            HeaderLayout::TagCommandLength => (h[0], [h[1], h[2]], u16::from_be_bytes([h[3], h[4]]) as usize),
            HeaderLayout::CommandTag { request_payload } => {
                let len = match direction {
                    Direction::Request => request_payload,
                    Direction::Reply => expect.and_then(|e| e.payload_len).unwrap_or(0),
                };
                (h[2], [h[0], h[1]], len)
            }
        };

        if payload_len > self.format.max_payload {
            self.buffer.advance(skip);
            return Some(Err(ProtocolError::FrameTooLong {
                max: self.format.max_payload,
                actual: payload_len,
            }));
        }

        let body_end = header_at + header.len() + payload_len;
        let marker_len = self.format.checksum_marker.map_or(0, |_| 1);
        let total = body_end + marker_len + self.format.checksum.width() + end.len();
        if self.buffer.len() < total {
            return None;
        }

        let mut cursor = body_end;
        if let Some(marker) = self.format.checksum_marker {
            if self.buffer[cursor] != marker {
                self.buffer.advance(skip);
                return Some(Err(ProtocolError::MissingMarker("checksum")));
            }
            cursor += 1;
        }
        let received = self.format.checksum.read(&self.buffer[cursor..]);
        cursor += self.format.checksum.width();
        if &self.buffer[cursor..cursor + end.len()] != end {
            self.buffer.advance(skip);
            return Some(Err(ProtocolError::MissingMarker("end")));
        }

        let computed = self.format.checksum.compute(&self.buffer[header_at..body_end]);
        if computed != received {
            self.buffer.advance(skip);
            return Some(Err(ProtocolError::ChecksumMismatch { computed, received }));
        }

        let payload = self.buffer[header_at + header.len()..body_end].to_vec();
        self.buffer.advance(total);
        let frame = Frame::new(tag, command, payload);
        log::trace!("decoded {} frame with tag {}", frame.code(), frame.tag);
        Some(Ok(frame))
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mr_frame() -> Frame {
        Frame::new(3, CORE_MEMORY_READ, vec![b'E', 0, 1, 0, 32])
    }

    #[test]
    fn test_core_request_layout() {
        let codec = FrameCodec::new(FrameFormat::core());
        let encoded = codec.encode_request(&mr_frame()).expect("encode");

        let mut expected = b"STR".to_vec();
        expected.extend_from_slice(&[3, b'M', b'R', 0, 5, b'E', 0, 1, 0, 32]);
        // 3 + 77 + 82 + 5 + 69 + 1 + 32 = 269
        expected.extend_from_slice(&[b'C', 13]);
        expected.extend_from_slice(b"\r\n\r\n");
        assert_eq!(encoded, expected);
        assert_eq!(encoded.len(), FrameFormat::core().framed_len(Direction::Request, 5));
    }

    #[test]
    fn test_core_reply_decode() {
        let mut codec = FrameCodec::new(FrameFormat::core());
        let reply = Frame::new(3, CORE_MEMORY_READ, vec![b'E', 0, 1, 0, 0xAA, 0xBB]);
        let encoded = codec.encode_reply(&reply).expect("encode");
        assert!(encoded.starts_with(b"RTR"));
        assert!(encoded.ends_with(b"\r\n"));

        codec.push(&encoded);
        let decoded = codec.decode_reply(None).expect("complete").expect("valid");
        assert_eq!(decoded, reply);
        assert_eq!(codec.buffered_len(), 0);
    }

    #[test]
    fn test_frame_codec_partial() {
        let mut codec = FrameCodec::new(FrameFormat::core());
        let encoded = codec.encode_reply(&mr_frame()).expect("encode");

        codec.push(&encoded[..7]);
        assert!(codec.decode_reply(None).is_none());

        codec.push(&encoded[7..]);
        let decoded = codec.decode_reply(None).expect("complete").expect("valid");
        assert_eq!(decoded, mr_frame());
    }

    #[test]
    fn test_resync_after_garbage() {
        let mut codec = FrameCodec::new(FrameFormat::core());
        let encoded = codec.encode_reply(&mr_frame()).expect("encode");

        codec.push(b"\x00\xFFnoise\r\n");
        codec.push(&encoded);
        let decoded = codec.decode_reply(None).expect("complete").expect("valid");
        assert_eq!(decoded, mr_frame());
    }

    #[test]
    fn test_checksum_mismatch_skips_frame() {
        let mut codec = FrameCodec::new(FrameFormat::core());
        let mut corrupt = codec.encode_reply(&mr_frame()).expect("encode");
        corrupt[9] ^= 0x40;
        let good = codec.encode_reply(&Frame::new(4, CORE_STATUS, vec![1, 2, 0, 7])).expect("encode");

        codec.push(&corrupt);
        codec.push(&good);
        match codec.decode_reply(None) {
            Some(Err(ProtocolError::ChecksumMismatch { .. })) => {}
            other => panic!("expected checksum mismatch, got {:?}", other),
        }
        let decoded = codec.decode_reply(None).expect("complete").expect("valid");
        assert_eq!(decoded.tag, 4);
        assert_eq!(decoded.command, CORE_STATUS);
    }

    #[test]
    fn test_bad_end_marker() {
        let mut codec = FrameCodec::new(FrameFormat::core());
        let mut encoded = codec.encode_reply(&mr_frame()).expect("encode");
        let last = encoded.len() - 1;
        encoded[last] = b'X';
        codec.push(&encoded);
        assert_eq!(codec.decode_reply(None), Some(Err(ProtocolError::MissingMarker("end"))));
    }

    #[test]
    fn test_oversized_length_rejected() {
        let mut format = FrameFormat::core();
        format.max_payload = 8;
        let mut codec = FrameCodec::new(format);
        codec.push(b"RTR\x03MR\x01\x00");
        assert!(matches!(
            codec.decode_reply(None),
            Some(Err(ProtocolError::FrameTooLong { max: 8, actual: 256 }))
        ));
    }

    #[test]
    fn test_encode_too_long() {
        let codec = FrameCodec::new(FrameFormat::classic());
        let frame = Frame::new(1, CLASSIC_WRITE_EEPROM, vec![0; 14]);
        assert_eq!(
            codec.encode_request(&frame),
            Err(ProtocolError::FrameTooLong { max: 13, actual: 14 })
        );
    }

    #[test]
    fn test_classic_request_padding() {
        let codec = FrameCodec::new(FrameFormat::classic());
        let encoded = codec
            .encode_request(&Frame::new(7, CLASSIC_READ_EEPROM, vec![12]))
            .expect("encode");

        assert_eq!(&encoded[..6], b"STREL\x07");
        assert_eq!(encoded[6], 12);
        assert!(encoded[7..19].iter().all(|b| *b == 0));
        assert_eq!(encoded[19], b'C');
        // E(69) + L(76) + 7 + 12 = 164
        assert_eq!(&encoded[20..22], &[0, 164]);
        assert_eq!(&encoded[22..], b"\r\n");
    }

    #[test]
    fn test_classic_request_roundtrip_on_master_side() {
        let mut codec = FrameCodec::new(FrameFormat::classic());
        let encoded = codec
            .encode_request(&Frame::new(9, CLASSIC_ACTIVATE_EEPROM, vec![]))
            .expect("encode");
        codec.push(&encoded);
        let decoded = codec.decode_request().expect("complete").expect("valid");
        assert_eq!(decoded.command, CLASSIC_ACTIVATE_EEPROM);
        assert_eq!(decoded.tag, 9);
        assert_eq!(decoded.payload, vec![0; CLASSIC_REQUEST_PAYLOAD]);
    }

    #[test]
    fn test_classic_reply_needs_expectation() {
        let mut codec = FrameCodec::new(FrameFormat::classic());
        let reply = Frame::new(5, CLASSIC_FIRMWARE_VERSION, vec![3, 143, 103]);
        let encoded = codec.encode_reply(&reply).expect("encode");
        codec.push(b"junk");
        codec.push(&encoded);

        assert!(codec.decode_reply(None).is_none());
        let expect = ReplyExpectation {
            command: CLASSIC_FIRMWARE_VERSION,
            payload_len: Some(3),
        };
        let decoded = codec.decode_reply(Some(&expect)).expect("complete").expect("valid");
        assert_eq!(decoded, reply);
    }

    #[test]
    fn test_checksum_widths() {
        assert_eq!(Checksum::Sum8.compute(&[200, 100]), 44);
        assert_eq!(Checksum::Sum16.compute(&[200, 100]), 300);
        assert_eq!(Checksum::Sum8.width(), 1);
        assert_eq!(Checksum::Sum16.width(), 2);
    }
}
