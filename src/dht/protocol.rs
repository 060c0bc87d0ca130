//! DHT Wire Protocol
//!
//! Defines the single message shape exchanged between clients and servers.
//!
//! Every message has the same fixed size: a kind byte, a NUL-padded key slot of `MAX_KEYLEN`
//! bytes and a big-endian `i64`. The kind alone decides how the value is read (stored value,
//! aggregate count, or unused), so no further framing is needed.

use bytes::{Buf, BufMut};

use crate::error::{DhtError, Result};

/// Size of the key slot, terminator included.
pub const MAX_KEYLEN: usize = 64;

/// Longest key accepted by `put`/`get`.
pub const MAX_KEY_BYTES: usize = MAX_KEYLEN - 1;

/// Encoded size of one `Message`.
pub const MESSAGE_SIZE: usize = 1 + MAX_KEYLEN + 8;

/// Value returned by `get` for a key that was never put.
pub const NOT_FOUND: i64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Store a key/value pair on its owner.
    Put,
    /// Read a key from its owner.
    Get,
    /// Owner acknowledges a `Put` to the caller's server.
    Confirm,
    /// Ask a node to contribute its shard size to a reduction rooted at the sender.
    SizeRequest,
    /// Stop the receiving server. Only honoured when self-addressed.
    Destroy,
    /// Owner answers a `Get`, straight to the caller's client.
    ReturnValue,
    /// Reduction result, delivered by a node to its own client.
    SizeTotal,
}

impl MessageKind {
    pub fn code(self) -> u8 {
        match self {
            MessageKind::Put => 1,
            MessageKind::Get => 2,
            MessageKind::Confirm => 3,
            MessageKind::SizeRequest => 4,
            MessageKind::Destroy => 5,
            MessageKind::ReturnValue => 10,
            MessageKind::SizeTotal => 11,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(MessageKind::Put),
            2 => Some(MessageKind::Get),
            3 => Some(MessageKind::Confirm),
            4 => Some(MessageKind::SizeRequest),
            5 => Some(MessageKind::Destroy),
            10 => Some(MessageKind::ReturnValue),
            11 => Some(MessageKind::SizeTotal),
            _ => None,
        }
    }

    /// Replies are consumed by the client side of a node, everything else by its server.
    pub fn is_reply(self) -> bool {
        matches!(self, MessageKind::ReturnValue | MessageKind::SizeTotal)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub key: String,
    pub value: i64,
}

impl Message {
    fn control(kind: MessageKind, value: i64) -> Self {
        Self {
            kind,
            key: String::new(),
            value,
        }
    }

    pub fn put(key: &str, value: i64) -> Self {
        Self {
            kind: MessageKind::Put,
            key: key.to_string(),
            value,
        }
    }

    pub fn get(key: &str) -> Self {
        Self {
            kind: MessageKind::Get,
            key: key.to_string(),
            value: 0,
        }
    }

    pub fn confirm() -> Self {
        Self::control(MessageKind::Confirm, 0)
    }

    pub fn return_value(value: i64) -> Self {
        Self::control(MessageKind::ReturnValue, value)
    }

    pub fn size_request() -> Self {
        Self::control(MessageKind::SizeRequest, 0)
    }

    pub fn size_total(total: i64) -> Self {
        Self::control(MessageKind::SizeTotal, total)
    }

    pub fn destroy() -> Self {
        Self::control(MessageKind::Destroy, 0)
    }

    /// Appends exactly `MESSAGE_SIZE` bytes to `buf`.
    pub fn encode(&self, buf: &mut impl BufMut) -> Result<()> {
        validate_key(&self.key)?;

        buf.put_u8(self.kind.code());
        buf.put_slice(self.key.as_bytes());
        buf.put_bytes(0, MAX_KEYLEN - self.key.len());
        buf.put_i64(self.value);
        Ok(())
    }

    /// Reads one message; fails on short input, unknown kinds and unterminated or non UTF-8 keys.
    pub fn decode(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < MESSAGE_SIZE {
            return Err(DhtError::Decode(format!(
                "message needs {} bytes, got {}",
                MESSAGE_SIZE,
                buf.remaining()
            )));
        }

        let code = buf.get_u8();
        let kind = MessageKind::from_code(code)
            .ok_or_else(|| DhtError::Decode(format!("unknown message kind {code}")))?;

        let mut slot = [0u8; MAX_KEYLEN];
        buf.copy_to_slice(&mut slot);
        let len = slot
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| DhtError::Decode("key slot is not NUL-terminated".to_string()))?;
        let key = std::str::from_utf8(&slot[..len])
            .map_err(|e| DhtError::Decode(format!("key is not UTF-8: {e}")))?
            .to_string();

        let value = buf.get_i64();
        Ok(Self { kind, key, value })
    }
}

/// Rejects keys that cannot travel in the fixed key slot.
pub fn validate_key(key: &str) -> Result<()> {
    if key.len() > MAX_KEY_BYTES {
        return Err(DhtError::KeyTooLong {
            len: key.len(),
            max: MAX_KEY_BYTES,
        });
    }
    if key.as_bytes().contains(&0) {
        return Err(DhtError::KeyContainsNul);
    }
    Ok(())
}
