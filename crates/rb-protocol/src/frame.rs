//! Wire header of a bus frame
//!
//! Every message on a connection is preceded by eight bytes:
//!
//! | bytes | field    | meaning                                              |
//! |-------|----------|------------------------------------------------------|
//! | 0..4  | serial   | call serial, big-endian; 0 for one-way traffic       |
//! | 4     | type     | [`MessageType`] of the body, checked against it      |
//! | 5..8  | length   | body length as a 24-bit big-endian integer           |
//!
//! The serial is how answers find their caller: a client numbers each
//! invoke, subscribe and get, and the server copies that number into the
//! `Reply`, `Status` or `EventValue` it sends back. Broadcasts and sends
//! carry serial 0 because nothing waits on them.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::ProtocolError;
use crate::ids::CallId;
use crate::message::MessageType;

/// Size of the frame header in bytes
pub const HEADER_SIZE: usize = 8;

/// Largest body the 24-bit length field can describe
pub const MAX_PAYLOAD_SIZE: usize = 0x00FF_FFFF;

const LENGTH_BYTES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Serial of the call this frame starts or answers
    pub serial: CallId,
    pub message_type: MessageType,
    /// Body length in bytes
    pub payload_length: u32,
}

impl FrameHeader {
    pub fn new(serial: CallId, message_type: MessageType, payload_length: u32) -> Self {
        Self {
            serial,
            message_type,
            payload_length,
        }
    }

    /// Whether the sender waits for an answer carrying this serial
    pub fn expects_reply(&self) -> bool {
        self.serial.expects_reply()
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE);
        dst.put_u32(self.serial.as_u32());
        dst.put_u8(self.message_type.as_u8());
        dst.put_uint(u64::from(self.payload_length), LENGTH_BYTES);
    }

    /// Read a header off the front of `src`.
    ///
    /// Leaves `src` untouched and returns `None` until eight bytes are
    /// buffered. An unknown type byte is an error and also consumes nothing.
    pub fn decode(src: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let type_byte = src[4];
        let message_type =
            MessageType::from_u8(type_byte).ok_or(ProtocolError::UnknownMessageType(type_byte))?;

        let serial = CallId::new(src.get_u32());
        src.advance(1);
        let payload_length = src.get_uint(LENGTH_BYTES) as u32;

        Ok(Some(Self {
            serial,
            message_type,
            payload_length,
        }))
    }
}
