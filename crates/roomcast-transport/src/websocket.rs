//! RFC 6455 WebSocket framing, server and client roles.
//!
//! Browser builds of the game can only open WebSockets, so the relay
//! speaks WebSocket natively on a second listener. The same packets
//! travel in binary messages; WebSocket frames replace the `u16` length
//! prefix.
//!
//! # Frame layout
//!
//! ```text
//!  0                   1                   2                   3
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| payload len |   extended payload length     |
//! |I|S|S|S|  (4)  |A|     (7)     |         (16/64 bits)          |
//! |N|V|V|V|       |S|             |                               |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |  masking key (0 or 4 bytes)   |          payload ...          |
//! +-------------------------------+-------------------------------+
//! ```
//!
//! Clients must mask every frame and servers must never mask. A frame
//! that breaks a rule closes the connection with a close code; the
//! framing state cannot be resynchronized mid-stream, so there is no
//! "skip and continue" as there is for malformed packets.
//!
//! The opening handshake's accept key is computed with
//! `tungstenite`'s helper so the SHA-1/base64 step is not reimplemented.

use std::collections::HashMap;

use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;

use crate::framing::{FrameEvent, Framing};
use crate::TransportError;

/// Largest reassembled message the server accepts.
pub const MAX_MESSAGE_SIZE: usize = 4096;

/// Largest message the client role accepts from a server.
pub const MAX_CLIENT_MESSAGE_SIZE: usize = 64 * 1024;

const MAX_HEADER_SIZE: usize = 10;
const MASK_SIZE: usize = 4;
const MAX_CONTROL_PAYLOAD: usize = 125;
const MAX_HANDSHAKE_SIZE: usize = 8 * 1024;

/// Close codes this implementation sends.
pub mod close_code {
    pub const NORMAL: u16 = 1000;
    pub const PROTOCOL_ERROR: u16 = 1002;
    pub const INVALID_PAYLOAD: u16 = 1007;
    pub const MESSAGE_TOO_BIG: u16 = 1009;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpCode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xa,
}

impl OpCode {
    fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0x0 => Some(Self::Continuation),
            0x1 => Some(Self::Text),
            0x2 => Some(Self::Binary),
            0x8 => Some(Self::Close),
            0x9 => Some(Self::Ping),
            0xa => Some(Self::Pong),
            _ => None,
        }
    }

    fn is_control(raw: u8) -> bool {
        raw & 0x8 != 0
    }
}

/// Which end of the connection this codec plays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Accepts the handshake, expects masked frames.
    Server,
    /// Sends the handshake, masks outgoing frames.
    Client { host: String, path: String },
}

/// A close code may appear on the wire if it is in the registered range
/// and not one of the codes reserved for local use.
pub fn is_valid_close_code(code: u16) -> bool {
    (1000..=4999).contains(&code) && !matches!(code, 1004 | 1005 | 1006 | 1015)
}

// ---------------------------------------------------------------------------
// WebSocketCodec
// ---------------------------------------------------------------------------

/// WebSocket framing state for one socket.
#[derive(Debug)]
pub struct WebSocketCodec {
    role: Role,
    client_key: String,
    max_message_size: usize,
    open: bool,
    closing: bool,
    done: bool,
    buffer: Vec<u8>,
    fragment: Option<(OpCode, Vec<u8>)>,
    sent_close_code: Option<u16>,
}

impl WebSocketCodec {
    /// A server-side codec awaiting the client's opening handshake.
    pub fn server() -> Self {
        Self::with_role(Role::Server, MAX_MESSAGE_SIZE)
    }

    /// A client-side codec that will request `path` from `host:port`.
    pub fn client(host: &str, port: u16, path: &str) -> Self {
        let host = if host.contains(':') {
            format!("[{host}]:{port}")
        } else {
            format!("{host}:{port}")
        };
        let path = if path.is_empty() { "/" } else { path };
        Self::with_role(
            Role::Client {
                host,
                path: path.to_string(),
            },
            MAX_CLIENT_MESSAGE_SIZE,
        )
    }

    fn with_role(role: Role, max_message_size: usize) -> Self {
        let client_key = match role {
            Role::Client { .. } => generate_key(),
            Role::Server => String::new(),
        };
        Self {
            role,
            client_key,
            max_message_size,
            open: false,
            closing: false,
            done: false,
            buffer: Vec::new(),
            fragment: None,
            sent_close_code: None,
        }
    }

    /// Overrides the largest reassembled message accepted.
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    /// True once the opening handshake has completed.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// The code of the close frame this side sent, if any.
    pub fn sent_close_code(&self) -> Option<u16> {
        self.sent_close_code
    }

    fn is_server(&self) -> bool {
        self.role == Role::Server
    }

    /// Starts a close handshake with `code` and `reason`.
    ///
    /// Returns the close frame to write, or `None` when a close is
    /// already under way or the handshake never completed.
    pub fn close_with(&mut self, code: u16, reason: &str) -> Option<Vec<u8>> {
        if self.closing || !self.open {
            return None;
        }
        self.closing = true;
        self.sent_close_code = Some(code);
        let mut payload = Vec::with_capacity(2 + reason.len());
        payload.extend_from_slice(&code.to_be_bytes());
        payload.extend_from_slice(reason.as_bytes());
        payload.truncate(MAX_CONTROL_PAYLOAD);
        Some(self.encode_frame(OpCode::Close, &payload))
    }

    fn fail(&mut self, code: u16, reason: &str, out: &mut Vec<FrameEvent>) {
        tracing::warn!(code, reason, "closing websocket on protocol violation");
        if let Some(frame) = self.close_with(code, reason) {
            out.push(FrameEvent::Write(frame));
        }
        self.finish(out);
    }

    fn finish(&mut self, out: &mut Vec<FrameEvent>) {
        if !self.done {
            self.done = true;
            self.buffer.clear();
            self.fragment = None;
            out.push(FrameEvent::Closed);
        }
    }

    fn encode_frame(&self, opcode: OpCode, payload: &[u8]) -> Vec<u8> {
        let mask_bit = if self.is_server() { 0x00 } else { 0x80 };
        let mut frame = Vec::with_capacity(payload.len() + MAX_HEADER_SIZE + MASK_SIZE);
        frame.push(0x80 | opcode as u8);
        match payload.len() {
            n if n < 126 => frame.push(mask_bit | n as u8),
            n if n <= usize::from(u16::MAX) => {
                frame.push(mask_bit | 126);
                frame.extend_from_slice(&(n as u16).to_be_bytes());
            }
            n => {
                frame.push(mask_bit | 127);
                frame.extend_from_slice(&(n as u64).to_be_bytes());
            }
        }
        if self.is_server() {
            frame.extend_from_slice(payload);
        } else {
            let key: [u8; MASK_SIZE] = rand::random();
            frame.extend_from_slice(&key);
            frame.extend(payload.iter().enumerate().map(|(i, b)| b ^ key[i % MASK_SIZE]));
        }
        frame
    }

    // -----------------------------------------------------------------------
    // Opening handshake
    // -----------------------------------------------------------------------

    fn client_request(&self) -> Vec<u8> {
        let Role::Client { host, path } = &self.role else {
            return Vec::new();
        };
        format!(
            "GET {path} HTTP/1.1\r\n\
             Host: {host}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {key}\r\n\
             Sec-WebSocket-Version: 13\r\n\
             Sec-WebSocket-Protocol: binary\r\n\
             \r\n",
            key = self.client_key,
        )
        .into_bytes()
    }

    /// Splits a complete HTTP head off the buffer, if one has arrived.
    fn take_http_head(&mut self, out: &mut Vec<FrameEvent>) -> Option<String> {
        let Some(end) = self.buffer.windows(4).position(|w| w == b"\r\n\r\n") else {
            if self.buffer.len() > MAX_HANDSHAKE_SIZE {
                tracing::warn!(len = self.buffer.len(), "websocket handshake too large");
                self.finish(out);
            }
            return None;
        };
        let head = String::from_utf8_lossy(&self.buffer[..end]).into_owned();
        self.buffer.drain(..end + 4);
        Some(head)
    }

    fn accept_handshake(&mut self, out: &mut Vec<FrameEvent>) {
        let Some(head) = self.take_http_head(out) else {
            return;
        };
        match server_response(&head) {
            Ok(response) => {
                out.push(FrameEvent::Write(response.into_bytes()));
                self.open = true;
                out.push(FrameEvent::Opened);
                tracing::debug!("websocket handshake accepted");
            }
            Err(rejection) => {
                tracing::warn!(status = rejection.status_line(), "rejecting websocket handshake");
                out.push(FrameEvent::Write(rejection.response().into_bytes()));
                self.finish(out);
            }
        }
    }

    fn complete_handshake(&mut self, out: &mut Vec<FrameEvent>) {
        let Some(head) = self.take_http_head(out) else {
            return;
        };
        let (status, headers) = parse_head(&head);
        let status_code = status.split_whitespace().nth(1).unwrap_or("");
        let expected = derive_accept_key(self.client_key.as_bytes());
        let accepted = headers.get("sec-websocket-accept").map(String::as_str);
        if status_code != "101" {
            tracing::warn!(status, "websocket upgrade refused");
            self.finish(out);
        } else if accepted != Some(expected.as_str()) {
            tracing::warn!("websocket accept key mismatch");
            self.finish(out);
        } else {
            self.open = true;
            out.push(FrameEvent::Opened);
        }
    }

    // -----------------------------------------------------------------------
    // Frames
    // -----------------------------------------------------------------------

    fn decode_frames(&mut self, out: &mut Vec<FrameEvent>) {
        let mut pos = 0;
        while !self.done {
            let buf = &self.buffer[pos..];
            if buf.len() < 2 {
                break;
            }
            let fin = buf[0] & 0x80 != 0;
            let rsv = buf[0] & 0x70;
            let raw_opcode = buf[0] & 0x0f;
            let masked = buf[1] & 0x80 != 0;
            let len7 = buf[1] & 0x7f;

            if rsv != 0 {
                return self.fail(close_code::PROTOCOL_ERROR, "reserved bits set", out);
            }
            if self.is_server() && !masked {
                return self.fail(close_code::PROTOCOL_ERROR, "client frames must be masked", out);
            }
            if !self.is_server() && masked {
                return self.fail(close_code::PROTOCOL_ERROR, "server frames must not be masked", out);
            }

            let (header_len, payload_len) = match len7 {
                126 => {
                    let Some(ext) = buf.get(2..4) else { break };
                    (4, u16::from_be_bytes([ext[0], ext[1]]) as u64)
                }
                127 => {
                    let Some(ext) = buf.get(2..10) else { break };
                    let mut bytes = [0u8; 8];
                    bytes.copy_from_slice(ext);
                    let len = u64::from_be_bytes(bytes);
                    if len & (1 << 63) != 0 {
                        return self.fail(close_code::PROTOCOL_ERROR, "payload length top bit set", out);
                    }
                    (10, len)
                }
                n => (2, u64::from(n)),
            };

            if OpCode::is_control(raw_opcode) {
                if !fin {
                    return self.fail(close_code::PROTOCOL_ERROR, "fragmented control frame", out);
                }
                if payload_len > MAX_CONTROL_PAYLOAD as u64 {
                    return self.fail(close_code::PROTOCOL_ERROR, "control frame too large", out);
                }
            } else {
                let buffered = self.fragment.as_ref().map_or(0, |(_, data)| data.len()) as u64;
                if buffered.saturating_add(payload_len) > self.max_message_size as u64 {
                    return self.fail(close_code::MESSAGE_TOO_BIG, "message too big", out);
                }
            }

            let mask_len = if masked { MASK_SIZE } else { 0 };
            let payload_len = payload_len as usize;
            let frame_len = header_len + mask_len + payload_len;
            if buf.len() < frame_len {
                break;
            }

            let mut payload = buf[header_len + mask_len..frame_len].to_vec();
            if masked {
                let key = &buf[header_len..header_len + MASK_SIZE];
                for (i, b) in payload.iter_mut().enumerate() {
                    *b ^= key[i % MASK_SIZE];
                }
            }
            pos += frame_len;

            let Some(opcode) = OpCode::from_u8(raw_opcode) else {
                return self.fail(close_code::PROTOCOL_ERROR, "unknown opcode", out);
            };
            match opcode {
                OpCode::Ping => {
                    if !self.closing {
                        out.push(FrameEvent::Write(self.encode_frame(OpCode::Pong, &payload)));
                    }
                }
                OpCode::Pong => {}
                OpCode::Close => return self.on_close_frame(&payload, out),
                OpCode::Continuation | OpCode::Text | OpCode::Binary => {
                    self.on_data_frame(opcode, fin, payload, out);
                }
            }
        }

        if !self.done {
            self.buffer.drain(..pos);
            let limit = MAX_HEADER_SIZE + MASK_SIZE + self.max_message_size;
            if self.buffer.len() > limit {
                self.fail(close_code::MESSAGE_TOO_BIG, "frame buffer overflow", out);
            }
        }
    }

    fn on_data_frame(&mut self, opcode: OpCode, fin: bool, payload: Vec<u8>, out: &mut Vec<FrameEvent>) {
        match (self.fragment.take(), opcode) {
            (None, OpCode::Continuation) => {
                self.fail(close_code::PROTOCOL_ERROR, "unexpected continuation frame", out);
            }
            (None, first) if fin => self.deliver(first, payload, out),
            (None, first) => self.fragment = Some((first, payload)),
            (Some((first, mut data)), OpCode::Continuation) => {
                data.extend_from_slice(&payload);
                if fin {
                    self.deliver(first, data, out);
                } else {
                    self.fragment = Some((first, data));
                }
            }
            (Some(_), _) => {
                self.fail(close_code::PROTOCOL_ERROR, "expected continuation frame", out);
            }
        }
    }

    fn deliver(&mut self, opcode: OpCode, message: Vec<u8>, out: &mut Vec<FrameEvent>) {
        if self.closing {
            return;
        }
        if opcode == OpCode::Text && std::str::from_utf8(&message).is_err() {
            return self.fail(close_code::INVALID_PAYLOAD, "text frame is not utf-8", out);
        }
        out.push(FrameEvent::Message(message));
    }

    fn on_close_frame(&mut self, payload: &[u8], out: &mut Vec<FrameEvent>) {
        match payload.len() {
            0 => {}
            1 => return self.fail(close_code::PROTOCOL_ERROR, "incomplete close code", out),
            _ => {
                let code = u16::from_be_bytes([payload[0], payload[1]]);
                if !is_valid_close_code(code) {
                    return self.fail(close_code::PROTOCOL_ERROR, "invalid close code", out);
                }
                if std::str::from_utf8(&payload[2..]).is_err() {
                    return self.fail(close_code::INVALID_PAYLOAD, "close reason is not utf-8", out);
                }
                tracing::debug!(code, "peer closed websocket");
            }
        }
        if !self.closing {
            self.closing = true;
            out.push(FrameEvent::Write(self.encode_frame(OpCode::Close, payload)));
        }
        self.finish(out);
    }
}

impl Framing for WebSocketCodec {
    fn start(&mut self, out: &mut Vec<FrameEvent>) {
        if !self.is_server() {
            out.push(FrameEvent::Write(self.client_request()));
        }
    }

    fn decode(&mut self, data: &[u8], out: &mut Vec<FrameEvent>) {
        if self.done {
            return;
        }
        self.buffer.extend_from_slice(data);
        if !self.open {
            if self.is_server() {
                self.accept_handshake(out);
            } else {
                self.complete_handshake(out);
            }
            if !self.open {
                return;
            }
        }
        self.decode_frames(out);
    }

    fn encode(&mut self, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        if !self.open {
            return Err(TransportError::Handshake("handshake not complete".into()));
        }
        Ok(self.encode_frame(OpCode::Binary, payload))
    }

    fn close(&mut self) -> Option<Vec<u8>> {
        self.close_with(close_code::NORMAL, "")
    }
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

/// Splits an HTTP head into its first line and lower-cased headers.
fn parse_head(head: &str) -> (&str, HashMap<String, String>) {
    let mut lines = head.split("\r\n");
    let first = lines.next().unwrap_or("");
    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    (first, headers)
}

fn has_token(value: &str, token: &str) -> bool {
    value.split(',').any(|t| t.trim().eq_ignore_ascii_case(token))
}

#[derive(Debug, PartialEq, Eq)]
enum Rejection {
    NotFound,
    BadRequest,
}

impl Rejection {
    fn status_line(&self) -> &'static str {
        match self {
            Self::NotFound => "404 Not Found",
            Self::BadRequest => "400 Bad Request",
        }
    }

    fn response(&self) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            self.status_line()
        )
    }
}

/// Validates an upgrade request and builds the `101` response.
fn server_response(head: &str) -> Result<String, Rejection> {
    let (request_line, headers) = parse_head(head);
    let upgrade = headers.get("upgrade").ok_or(Rejection::NotFound)?;
    if !upgrade.eq_ignore_ascii_case("websocket") {
        return Err(Rejection::BadRequest);
    }
    if request_line.split_whitespace().next() != Some("GET") {
        return Err(Rejection::BadRequest);
    }
    if !headers
        .get("connection")
        .is_some_and(|c| has_token(c, "upgrade"))
    {
        return Err(Rejection::BadRequest);
    }
    let version = headers
        .get("sec-websocket-version")
        .ok_or(Rejection::BadRequest)?;
    let key = headers
        .get("sec-websocket-key")
        .filter(|k| !k.is_empty())
        .ok_or(Rejection::BadRequest)?;

    let mut response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n",
        derive_accept_key(key.as_bytes())
    );
    if version != "13" {
        response.push_str("Sec-WebSocket-Version: 13\r\n");
    }
    if headers
        .get("sec-websocket-protocol")
        .is_some_and(|p| has_token(p, "binary"))
    {
        response.push_str("Sec-WebSocket-Protocol: binary\r\n");
    }
    response.push_str("\r\n");
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUEST: &str = "GET /chat HTTP/1.1\r\n\
        Host: server.example.com\r\n\
        Upgrade: websocket\r\n\
        Connection: keep-alive, Upgrade\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
        Sec-WebSocket-Version: 13\r\n\
        \r\n";

    /// Builds a masked client frame by hand.
    fn client_frame(first_byte: u8, payload: &[u8]) -> Vec<u8> {
        let key = [0x11, 0x22, 0x33, 0x44];
        let mut frame = vec![first_byte];
        match payload.len() {
            n if n < 126 => frame.push(0x80 | n as u8),
            n if n <= 0xffff => {
                frame.push(0x80 | 126);
                frame.extend((n as u16).to_be_bytes());
            }
            n => {
                frame.push(0x80 | 127);
                frame.extend((n as u64).to_be_bytes());
            }
        }
        frame.extend(key);
        frame.extend(payload.iter().enumerate().map(|(i, b)| b ^ key[i % 4]));
        frame
    }

    fn open_server() -> WebSocketCodec {
        let mut codec = WebSocketCodec::server();
        let mut out = Vec::new();
        codec.decode(REQUEST.as_bytes(), &mut out);
        assert!(codec.is_open());
        codec
    }

    fn feed(codec: &mut WebSocketCodec, bytes: &[u8]) -> Vec<FrameEvent> {
        let mut out = Vec::new();
        codec.decode(bytes, &mut out);
        out
    }

    #[test]
    fn test_handshake_accept_key() {
        let mut codec = WebSocketCodec::server();
        let out = feed(&mut codec, REQUEST.as_bytes());
        let FrameEvent::Write(response) = &out[0] else {
            panic!("expected handshake response, got {out:?}");
        };
        let response = String::from_utf8_lossy(response);
        assert!(response.starts_with("HTTP/1.1 101"));
        // Sample key and accept value from RFC 6455 section 1.3.
        assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
        assert!(!response.contains("Sec-WebSocket-Protocol"));
        assert_eq!(out[1], FrameEvent::Opened);
    }

    #[test]
    fn test_handshake_split_across_reads_with_trailing_frame() {
        let mut codec = WebSocketCodec::server();
        let mut bytes = REQUEST.as_bytes().to_vec();
        bytes.extend(client_frame(0x82, b"hi"));
        let (a, b) = bytes.split_at(20);
        assert!(feed(&mut codec, a).is_empty());
        let out = feed(&mut codec, b);
        assert_eq!(out[1], FrameEvent::Opened);
        assert_eq!(out[2], FrameEvent::Message(b"hi".to_vec()));
    }

    #[test]
    fn test_binary_protocol_is_echoed_and_version_advertised() {
        let request = REQUEST
            .replace("Version: 13", "Version: 8")
            .replace("\r\n\r\n", "\r\nSec-WebSocket-Protocol: chat, binary\r\n\r\n");
        let response = server_response(request.trim_end_matches("\r\n\r\n")).unwrap();
        assert!(response.contains("Sec-WebSocket-Protocol: binary\r\n"));
        assert!(response.contains("Sec-WebSocket-Version: 13\r\n"));
    }

    #[test]
    fn test_plain_http_gets_404_and_bad_upgrade_gets_400() {
        let plain = "GET / HTTP/1.1\r\nHost: x";
        assert_eq!(server_response(plain), Err(Rejection::NotFound));

        let no_key = "GET / HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Version: 13";
        assert_eq!(server_response(no_key), Err(Rejection::BadRequest));

        let post = "POST / HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Version: 13\r\nSec-WebSocket-Key: a";
        assert_eq!(server_response(post), Err(Rejection::BadRequest));

        let mut codec = WebSocketCodec::server();
        let out = feed(&mut codec, b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
        let FrameEvent::Write(response) = &out[0] else {
            panic!("expected rejection response");
        };
        assert!(response.starts_with(b"HTTP/1.1 404"));
        assert_eq!(out[1], FrameEvent::Closed);
    }

    #[test]
    fn test_unmasked_client_frame_is_protocol_error() {
        let mut codec = open_server();
        let out = feed(&mut codec, &[0x82, 0x02, b'h', b'i']);
        assert_eq!(codec.sent_close_code(), Some(close_code::PROTOCOL_ERROR));
        assert!(matches!(out[0], FrameEvent::Write(ref f) if f[0] == 0x88 && f[2..4] == [0x03, 0xea]));
        assert_eq!(out.last(), Some(&FrameEvent::Closed));
        assert!(!out.iter().any(|e| matches!(e, FrameEvent::Message(_))));
    }

    #[test]
    fn test_oversized_message_is_1009() {
        let mut codec = open_server();
        let out = feed(&mut codec, &client_frame(0x82, &vec![0u8; MAX_MESSAGE_SIZE + 1]));
        assert_eq!(codec.sent_close_code(), Some(close_code::MESSAGE_TOO_BIG));
        assert!(!out.iter().any(|e| matches!(e, FrameEvent::Message(_))));
    }

    #[test]
    fn test_oversized_header_alone_is_1009() {
        // Declares 5000 bytes but only the header has arrived.
        let mut codec = open_server();
        feed(&mut codec, &[0x82, 0x80 | 126, 0x13, 0x88]);
        assert_eq!(codec.sent_close_code(), Some(close_code::MESSAGE_TOO_BIG));
    }

    #[test]
    fn test_fragmented_reassembly_over_limit_is_1009() {
        let mut codec = open_server();
        let half = vec![1u8; MAX_MESSAGE_SIZE / 2 + 1];
        let mut bytes = client_frame(0x02, &half);
        bytes.extend(client_frame(0x80, &half));
        let out = feed(&mut codec, &bytes);
        assert_eq!(codec.sent_close_code(), Some(close_code::MESSAGE_TOO_BIG));
        assert!(!out.iter().any(|e| matches!(e, FrameEvent::Message(_))));
    }

    /// A masked frame header declaring `len` bytes with a 64-bit length.
    fn header_64(first_byte: u8, len: u64) -> Vec<u8> {
        let mut frame = vec![first_byte, 0x80 | 127];
        frame.extend(len.to_be_bytes());
        frame.extend([0x11, 0x22, 0x33, 0x44]);
        frame
    }

    #[test]
    fn test_extended_64bit_length_frame() {
        let mut codec = WebSocketCodec::server().with_max_message_size(70_000);
        feed(&mut codec, REQUEST.as_bytes());
        assert!(codec.is_open());

        let payload = vec![7u8; 70_000];
        let out = feed(&mut codec, &client_frame(0x82, &payload));
        assert_eq!(out, vec![FrameEvent::Message(payload)]);
        assert_eq!(codec.sent_close_code(), None);
    }

    #[test]
    fn test_huge_extended_length_is_rejected() {
        let mut codec = open_server();
        let mut bytes = client_frame(0x02, b"a");
        bytes.extend(header_64(0x80, u64::MAX));
        bytes.extend([0u8; 16]);
        let out = feed(&mut codec, &bytes);
        assert_eq!(codec.sent_close_code(), Some(close_code::PROTOCOL_ERROR));
        assert_eq!(out.last(), Some(&FrameEvent::Closed));
        assert!(!out.iter().any(|e| matches!(e, FrameEvent::Message(_))));
    }

    #[test]
    fn test_oversized_continuation_after_fragments_is_1009() {
        let mut codec = open_server();
        let mut bytes = client_frame(0x02, b"abc");
        bytes.extend(header_64(0x80, i64::MAX as u64));
        bytes.extend([0u8; 16]);
        let out = feed(&mut codec, &bytes);
        assert_eq!(codec.sent_close_code(), Some(close_code::MESSAGE_TOO_BIG));
        assert!(!out.iter().any(|e| matches!(e, FrameEvent::Message(_))));
    }

    #[test]
    fn test_fragments_reassemble_with_interleaved_ping() {
        let mut codec = open_server();
        let mut bytes = client_frame(0x02, b"hel");
        bytes.extend(client_frame(0x89, b"p"));
        bytes.extend(client_frame(0x00, b"lo "));
        bytes.extend(client_frame(0x80, b"world"));
        let out = feed(&mut codec, &bytes);
        assert_eq!(
            out,
            vec![
                FrameEvent::Write(vec![0x8a, 0x01, b'p']),
                FrameEvent::Message(b"hello world".to_vec()),
            ]
        );
    }

    #[test]
    fn test_continuation_order_errors() {
        let mut codec = open_server();
        feed(&mut codec, &client_frame(0x80, b"x"));
        assert_eq!(codec.sent_close_code(), Some(close_code::PROTOCOL_ERROR));

        let mut codec = open_server();
        let mut bytes = client_frame(0x02, b"a");
        bytes.extend(client_frame(0x82, b"b"));
        feed(&mut codec, &bytes);
        assert_eq!(codec.sent_close_code(), Some(close_code::PROTOCOL_ERROR));
    }

    #[test]
    fn test_control_frame_rules() {
        let mut codec = open_server();
        feed(&mut codec, &client_frame(0x09, b"not fin"));
        assert_eq!(codec.sent_close_code(), Some(close_code::PROTOCOL_ERROR));

        let mut codec = open_server();
        feed(&mut codec, &client_frame(0x89, &[0u8; 126]));
        assert_eq!(codec.sent_close_code(), Some(close_code::PROTOCOL_ERROR));

        let mut codec = open_server();
        feed(&mut codec, &client_frame(0x83, b"?"));
        assert_eq!(codec.sent_close_code(), Some(close_code::PROTOCOL_ERROR));

        let mut codec = open_server();
        feed(&mut codec, &client_frame(0xc2, b"rsv1"));
        assert_eq!(codec.sent_close_code(), Some(close_code::PROTOCOL_ERROR));
    }

    #[test]
    fn test_invalid_text_is_1007() {
        let mut codec = open_server();
        feed(&mut codec, &client_frame(0x81, &[0xff, 0xfe]));
        assert_eq!(codec.sent_close_code(), Some(close_code::INVALID_PAYLOAD));
    }

    #[test]
    fn test_close_is_mirrored_before_closed() {
        let mut codec = open_server();
        let out = feed(&mut codec, &client_frame(0x88, &[0x03, 0xe8, b'b', b'y', b'e']));
        assert_eq!(
            out,
            vec![
                FrameEvent::Write(vec![0x88, 0x05, 0x03, 0xe8, b'b', b'y', b'e']),
                FrameEvent::Closed,
            ]
        );
        // Already closing: a local close adds nothing.
        assert_eq!(codec.close(), None);
    }

    #[test]
    fn test_close_code_validation() {
        for (code, valid) in [(1000, true), (4999, true), (999, false), (1005, false), (1015, false), (5000, false)] {
            assert_eq!(is_valid_close_code(code), valid, "{code}");
        }

        let mut codec = open_server();
        feed(&mut codec, &client_frame(0x88, &1006u16.to_be_bytes()));
        assert_eq!(codec.sent_close_code(), Some(close_code::PROTOCOL_ERROR));

        let mut codec = open_server();
        feed(&mut codec, &client_frame(0x88, &[0x03]));
        assert_eq!(codec.sent_close_code(), Some(close_code::PROTOCOL_ERROR));
    }

    #[test]
    fn test_local_close_is_idempotent() {
        let mut codec = open_server();
        let frame = codec.close().unwrap();
        assert_eq!(frame, vec![0x88, 0x02, 0x03, 0xe8]);
        assert_eq!(codec.close(), None);
    }

    #[test]
    fn test_server_frames_are_unmasked_fin_binary() {
        let mut codec = open_server();
        assert_eq!(codec.encode(b"abc").unwrap(), vec![0x82, 0x03, b'a', b'b', b'c']);
        let long = codec.encode(&[0u8; 300]).unwrap();
        assert_eq!(long[..4], [0x82, 126, 0x01, 0x2c]);
    }

    #[test]
    fn test_client_server_pair() {
        let mut client = WebSocketCodec::client("127.0.0.1", 6500, "/");
        let mut server = WebSocketCodec::server();

        let mut events = Vec::new();
        client.start(&mut events);
        let [FrameEvent::Write(request)] = events.as_slice() else {
            panic!("expected request");
        };
        let request = request.clone();

        let out = feed(&mut server, &request);
        let FrameEvent::Write(response) = &out[0] else {
            panic!("expected response");
        };
        assert!(String::from_utf8_lossy(response).contains("Sec-WebSocket-Protocol: binary"));

        let out = feed(&mut client, response);
        assert_eq!(out, vec![FrameEvent::Opened]);

        // Client frames are masked and the server unmasks them.
        let frame = client.encode(b"move").unwrap();
        assert_eq!(frame[1] & 0x80, 0x80);
        assert_eq!(feed(&mut server, &frame), vec![FrameEvent::Message(b"move".to_vec())]);

        // Server frames reach the client unchanged.
        let frame = server.encode(b"echo").unwrap();
        assert_eq!(feed(&mut client, &frame), vec![FrameEvent::Message(b"echo".to_vec())]);

        // A masked frame from the server is a violation on the client side.
        let out = feed(&mut client, &client_frame(0x82, b"x"));
        assert_eq!(client.sent_close_code(), Some(close_code::PROTOCOL_ERROR));
        assert_eq!(out.last(), Some(&FrameEvent::Closed));
    }

    #[test]
    fn test_client_rejects_wrong_accept_key() {
        let mut client = WebSocketCodec::client("example.org", 80, "/");
        let out = feed(
            &mut client,
            b"HTTP/1.1 101 Switching Protocols\r\nSec-WebSocket-Accept: bogus\r\n\r\n",
        );
        assert_eq!(out, vec![FrameEvent::Closed]);
        assert!(!client.is_open());
    }
}
