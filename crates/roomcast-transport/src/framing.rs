//! Message framing over a byte stream.
//!
//! TCP delivers bytes, not messages: one `read` may return half a
//! message, or three and a half. A [`Framing`] turns that stream back into
//! discrete messages and wraps outgoing messages so the peer can do the
//! same. It is a pure state machine (no I/O), so the socket task drives
//! it and tests can feed it arbitrary splits.
//!
//! Two framings exist:
//!
//! - [`LengthPrefixed`]: a `u16` big-endian length before every message.
//! - [`WebSocketCodec`](crate::WebSocketCodec): RFC 6455 frames, behind
//!   the `websocket` feature.

use crate::TransportError;

/// Largest message the length-prefixed framing can carry.
pub const MAX_FRAME_PAYLOAD: usize = u16::MAX as usize;

/// What a framing wants the socket task to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// The framing is ready to carry application messages.
    Opened,
    /// One complete application message arrived.
    Message(Vec<u8>),
    /// Bytes the framing itself needs written (handshake, pong, close).
    Write(Vec<u8>),
    /// The framing is done; close the socket after pending writes.
    Closed,
}

/// A sans-I/O message framing, one instance per socket.
pub trait Framing: Send + 'static {
    /// Called once when the socket is connected.
    fn start(&mut self, out: &mut Vec<FrameEvent>);

    /// Consumes bytes read from the stream.
    fn decode(&mut self, data: &[u8], out: &mut Vec<FrameEvent>);

    /// Wraps one outgoing application message.
    fn encode(&mut self, payload: &[u8]) -> Result<Vec<u8>, TransportError>;

    /// Bytes to write before a locally initiated close, if any.
    /// Calling it more than once returns `None` after the first time.
    fn close(&mut self) -> Option<Vec<u8>>;
}

impl Framing for Box<dyn Framing> {
    fn start(&mut self, out: &mut Vec<FrameEvent>) {
        (**self).start(out)
    }

    fn decode(&mut self, data: &[u8], out: &mut Vec<FrameEvent>) {
        (**self).decode(data, out)
    }

    fn encode(&mut self, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        (**self).encode(payload)
    }

    fn close(&mut self) -> Option<Vec<u8>> {
        (**self).close()
    }
}

// ---------------------------------------------------------------------------
// LengthPrefixed
// ---------------------------------------------------------------------------

/// `u16` big-endian length, then that many payload bytes.
///
/// ```text
/// +--------+--------+-------------------+
/// | len hi | len lo | payload (len)     |
/// +--------+--------+-------------------+
/// ```
///
/// The decoder tolerates every split: header and payload in one read,
/// header now and payload later, or the header itself split across two
/// reads. Zero-length messages are swallowed and never delivered.
#[derive(Debug, Default)]
pub struct LengthPrefixed {
    header: [u8; 2],
    header_len: usize,
    expected: Option<usize>,
    partial: Vec<u8>,
}

impl LengthPrefixed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds stream bytes and appends every completed payload to `out`.
    pub fn feed(&mut self, data: &[u8], out: &mut Vec<Vec<u8>>) {
        let mut rest = data;
        while !rest.is_empty() {
            match self.expected {
                None => {
                    let take = (2 - self.header_len).min(rest.len());
                    self.header[self.header_len..self.header_len + take]
                        .copy_from_slice(&rest[..take]);
                    self.header_len += take;
                    rest = &rest[take..];
                    if self.header_len < 2 {
                        continue;
                    }
                    self.header_len = 0;
                    let len = u16::from_be_bytes(self.header) as usize;
                    if len == 0 {
                        tracing::trace!("skipping zero-length frame");
                        continue;
                    }
                    self.expected = Some(len);
                }
                Some(len) => {
                    let take = (len - self.partial.len()).min(rest.len());
                    if self.partial.is_empty() && take == len {
                        // Fast path: the whole payload is in this read.
                        out.push(rest[..len].to_vec());
                    } else {
                        self.partial.extend_from_slice(&rest[..take]);
                    }
                    rest = &rest[take..];
                    if self.partial.len() == len {
                        out.push(std::mem::take(&mut self.partial));
                        self.expected = None;
                    } else if self.partial.is_empty() {
                        self.expected = None;
                    }
                }
            }
        }
    }

    /// True when no partial header or payload is buffered.
    pub fn is_idle(&self) -> bool {
        self.expected.is_none() && self.header_len == 0
    }
}

impl Framing for LengthPrefixed {
    fn start(&mut self, out: &mut Vec<FrameEvent>) {
        out.push(FrameEvent::Opened);
    }

    fn decode(&mut self, data: &[u8], out: &mut Vec<FrameEvent>) {
        let mut messages = Vec::new();
        self.feed(data, &mut messages);
        out.extend(messages.into_iter().map(FrameEvent::Message));
    }

    fn encode(&mut self, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        let len = u16::try_from(payload.len()).map_err(|_| TransportError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_FRAME_PAYLOAD,
        })?;
        let mut frame = Vec::with_capacity(payload.len() + 2);
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(payload);
        Ok(frame)
    }

    fn close(&mut self) -> Option<Vec<u8>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(payload: &[u8]) -> Vec<u8> {
        LengthPrefixed::new().encode(payload).unwrap()
    }

    fn stream() -> (Vec<u8>, Vec<Vec<u8>>) {
        let payloads = vec![b"hello".to_vec(), vec![0xab; 300], b"x".to_vec()];
        let mut bytes = Vec::new();
        for p in &payloads {
            bytes.extend(frame(p));
        }
        (bytes, payloads)
    }

    #[test]
    fn test_whole_stream_in_one_read() {
        let (bytes, payloads) = stream();
        let mut out = Vec::new();
        LengthPrefixed::new().feed(&bytes, &mut out);
        assert_eq!(out, payloads);
    }

    #[test]
    fn test_split_at_every_boundary() {
        let (bytes, payloads) = stream();
        for cut in 0..=bytes.len() {
            let mut framer = LengthPrefixed::new();
            let mut out = Vec::new();
            framer.feed(&bytes[..cut], &mut out);
            framer.feed(&bytes[cut..], &mut out);
            assert_eq!(out, payloads, "split at {cut}");
            assert!(framer.is_idle());
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let (bytes, payloads) = stream();
        let mut framer = LengthPrefixed::new();
        let mut out = Vec::new();
        for b in &bytes {
            framer.feed(std::slice::from_ref(b), &mut out);
        }
        assert_eq!(out, payloads);
    }

    #[test]
    fn test_zero_length_frame_is_never_delivered() {
        let mut bytes = vec![0, 0];
        bytes.extend(frame(b"ok"));
        bytes.extend([0, 0, 0, 0]);
        let mut out = Vec::new();
        let mut framer = LengthPrefixed::new();
        framer.feed(&bytes, &mut out);
        assert_eq!(out, vec![b"ok".to_vec()]);
        assert!(framer.is_idle());
    }

    #[test]
    fn test_header_layout_is_big_endian() {
        assert_eq!(frame(&[7; 258])[..2], [0x01, 0x02]);
    }

    #[test]
    fn test_oversized_payload_is_refused() {
        let err = LengthPrefixed::new()
            .encode(&vec![0; MAX_FRAME_PAYLOAD + 1])
            .unwrap_err();
        assert!(matches!(err, TransportError::PayloadTooLarge { .. }));
        assert!(LengthPrefixed::new().encode(&vec![0; MAX_FRAME_PAYLOAD]).is_ok());
    }

    #[test]
    fn test_framing_events() {
        let mut framer = LengthPrefixed::new();
        let mut events = Vec::new();
        framer.start(&mut events);
        framer.decode(&frame(b"ab"), &mut events);
        assert_eq!(events, vec![FrameEvent::Opened, FrameEvent::Message(b"ab".to_vec())]);
        assert_eq!(framer.close(), None);
    }
}
