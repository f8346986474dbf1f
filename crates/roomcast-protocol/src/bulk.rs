//! Bulk packing and unpacking of sub-messages.
//!
//! Movement goes out every frame, so sending each packet as its own
//! transport message would mean one write syscall per packet per player.
//! Instead, queued packets are concatenated into a *bulk* of at most
//! [`MAX_BULK_SIZE`] bytes and sent as one message. Each sub-message is a
//! string16, so the receiver splits a bulk by walking length prefixes.
//!
//! ```text
//! bulk: [len][payload][len][payload][len][payload]...
//! ```

use crate::ProtocolError;

/// Largest bulk handed to the transport in one send.
pub const MAX_BULK_SIZE: usize = 4096;

// ---------------------------------------------------------------------------
// Packing
// ---------------------------------------------------------------------------

/// Accumulates serialized sub-messages into size-bounded bulks.
///
/// Order is preserved across and within bulks. A single sub-message
/// larger than the limit is not split; it travels alone.
#[derive(Debug)]
pub struct BulkPacker {
    max: usize,
    current: Vec<u8>,
    finished: Vec<Vec<u8>>,
}

impl BulkPacker {
    pub fn new(max: usize) -> Self {
        Self {
            max,
            current: Vec::new(),
            finished: Vec::new(),
        }
    }

    /// Appends one serialized sub-message.
    pub fn push(&mut self, sub_message: &[u8]) {
        if !self.current.is_empty() && self.current.len() + sub_message.len() > self.max {
            self.cut();
        }
        if sub_message.len() > self.max {
            tracing::debug!(
                len = sub_message.len(),
                max = self.max,
                "sub-message exceeds bulk size, sending alone"
            );
        }
        self.current.extend_from_slice(sub_message);
    }

    /// Closes the bulk being built, if it has any content.
    pub fn cut(&mut self) {
        if !self.current.is_empty() {
            self.finished.push(std::mem::take(&mut self.current));
        }
    }

    /// Returns all bulks, in order.
    pub fn finish(mut self) -> Vec<Vec<u8>> {
        self.cut();
        self.finished
    }
}

impl Default for BulkPacker {
    fn default() -> Self {
        Self::new(MAX_BULK_SIZE)
    }
}

/// Packs sub-messages into bulks of at most `max` bytes.
pub fn pack_bulks<I, B>(sub_messages: I, max: usize) -> Vec<Vec<u8>>
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut packer = BulkPacker::new(max);
    for sub in sub_messages {
        packer.push(sub.as_ref());
    }
    packer.finish()
}

// ---------------------------------------------------------------------------
// Unpacking
// ---------------------------------------------------------------------------

/// Iterates the sub-message payloads of one received bulk.
///
/// Yields each payload without its length prefix. A length prefix that
/// overruns the bulk yields one [`ProtocolError::Truncated`] and ends the
/// iteration, since nothing after it can be trusted.
#[derive(Debug, Clone)]
pub struct SubMessages<'a> {
    data: &'a [u8],
}

impl<'a> SubMessages<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl<'a> Iterator for SubMessages<'a> {
    type Item = Result<&'a [u8], ProtocolError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() {
            return None;
        }
        let Some((header, rest)) = self.data.split_first_chunk::<2>() else {
            let remaining = self.data.len();
            self.data = &[];
            return Some(Err(ProtocolError::Truncated {
                needed: 2,
                remaining,
            }));
        };
        let len = u16::from_be_bytes(*header) as usize;
        if len > rest.len() {
            self.data = &[];
            return Some(Err(ProtocolError::Truncated {
                needed: len,
                remaining: rest.len(),
            }));
        }
        let (payload, tail) = rest.split_at(len);
        self.data = tail;
        Some(Ok(payload))
    }
}
