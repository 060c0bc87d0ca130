//! Transport frames.
//!
//! Every frame on a TCP link is exactly `FRAME_SIZE` bytes: the sender id, a tag, and a body
//! shaped like an encoded `Message`. Signal frames reuse the body's value slot, so one
//! `read_exact` always yields one frame and a dropped frame never desynchronizes the stream.

use bytes::{Buf, BufMut, BytesMut};

use crate::cluster::types::NodeId;
use crate::dht::protocol::{MAX_KEYLEN, MESSAGE_SIZE, Message};
use crate::error::{DhtError, Result};

pub const FRAME_SIZE: usize = 4 + 1 + MESSAGE_SIZE;

const TAG_HELLO: u8 = 0;
const TAG_MESSAGE: u8 = 1;
const TAG_BARRIER_ARRIVE: u8 = 2;
const TAG_BARRIER_RELEASE: u8 = 3;
const TAG_PARTIAL: u8 = 4;

/// Collective-operation traffic, never seen by the DHT layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    BarrierArrive,
    BarrierRelease,
    /// One node's contribution to a sum reduction, sent to the root.
    Partial,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// First frame on every stream; identifies the connecting node.
    Hello,
    Message(Message),
    Signal(SignalKind, i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: NodeId,
    pub payload: Payload,
}

impl Envelope {
    pub fn new(from: NodeId, payload: Payload) -> Self {
        Self { from, payload }
    }

    pub fn encode(&self) -> Result<BytesMut> {
        let mut buf = BytesMut::with_capacity(FRAME_SIZE);
        buf.put_u32(self.from.0);

        match &self.payload {
            Payload::Hello => {
                buf.put_u8(TAG_HELLO);
                buf.put_bytes(0, MESSAGE_SIZE);
            }
            Payload::Message(message) => {
                buf.put_u8(TAG_MESSAGE);
                message.encode(&mut buf)?;
            }
            Payload::Signal(kind, value) => {
                buf.put_u8(match kind {
                    SignalKind::BarrierArrive => TAG_BARRIER_ARRIVE,
                    SignalKind::BarrierRelease => TAG_BARRIER_RELEASE,
                    SignalKind::Partial => TAG_PARTIAL,
                });
                buf.put_bytes(0, 1 + MAX_KEYLEN);
                buf.put_i64(*value);
            }
        }

        Ok(buf)
    }

    pub fn decode(mut frame: &[u8]) -> Result<Self> {
        if frame.len() != FRAME_SIZE {
            return Err(DhtError::Decode(format!(
                "frame must be {} bytes, got {}",
                FRAME_SIZE,
                frame.len()
            )));
        }

        let from = NodeId(frame.get_u32());
        let tag = frame.get_u8();

        let payload = match tag {
            TAG_HELLO => Payload::Hello,
            TAG_MESSAGE => Payload::Message(Message::decode(&mut frame)?),
            TAG_BARRIER_ARRIVE => read_signal(&mut frame, SignalKind::BarrierArrive),
            TAG_BARRIER_RELEASE => read_signal(&mut frame, SignalKind::BarrierRelease),
            TAG_PARTIAL => read_signal(&mut frame, SignalKind::Partial),
            other => return Err(DhtError::Decode(format!("unknown frame tag {other}"))),
        };

        Ok(Self { from, payload })
    }
}

fn read_signal(body: &mut &[u8], kind: SignalKind) -> Payload {
    body.advance(1 + MAX_KEYLEN);
    Payload::Signal(kind, body.get_i64())
}
