//! SI camera packet header implementation
//!
//! The header is a fixed 6-byte structure that precedes every packet, in both
//! directions.

use crate::error::{Result, SiError};
use bytes::{Buf, BufMut, BytesMut};

/// Packet kind carried in the header `id` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketId {
    /// Outbound camera command
    Command,
    /// Command accepted/rejected acknowledgment
    Ack,
    /// Typed result payload (see [`DataType`](crate::protocol::data::DataType))
    Data,
    /// One fragment of an image transfer
    Image,
}

impl PacketId {
    /// Wire value of the packet id
    pub fn as_u8(self) -> u8 {
        match self {
            PacketId::Command => 128,
            PacketId::Ack => 129,
            PacketId::Data => 131,
            PacketId::Image => 132,
        }
    }

    /// Map a wire value to a packet id
    ///
    /// Returns [`SiError::UnknownPacketId`] for any value outside the protocol.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            128 => Ok(PacketId::Command),
            129 => Ok(PacketId::Ack),
            131 => Ok(PacketId::Data),
            132 => Ok(PacketId::Image),
            other => Err(SiError::UnknownPacketId(other)),
        }
    }

    /// Human readable name, used in logs and error messages
    pub fn name(self) -> &'static str {
        match self {
            PacketId::Command => "Command",
            PacketId::Ack => "Ack",
            PacketId::Data => "Data",
            PacketId::Image => "Image",
        }
    }
}

/// SI camera packet header (6 bytes fixed size)
///
/// # Header Structure (all numerical values in big-endian)
/// - Length: u32 (4 bytes) - total packet length, header included
/// - Id: u8 (1 byte) - packet kind
/// - Camera id: u8 (1 byte) - target camera
///
/// The raw `id` byte is kept as received; [`PacketHeader::kind`] validates it.
/// This lets the reader consume the body of an unknown packet before
/// reporting the error, so the stream stays aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Total packet length in bytes, including this header
    pub length: u32,
    /// Raw packet id
    pub id: u8,
    /// Camera identifier
    pub cam_id: u8,
}

impl PacketHeader {
    /// Header size in bytes
    pub const SIZE: usize = 6;

    /// Create a header for the given packet kind
    pub fn new(id: PacketId, cam_id: u8, length: u32) -> Self {
        PacketHeader {
            length,
            id: id.as_u8(),
            cam_id,
        }
    }

    /// Validated packet kind
    pub fn kind(&self) -> Result<PacketId> {
        PacketId::from_u8(self.id)
    }

    /// Number of bytes following the header
    pub fn body_len(&self) -> usize {
        (self.length as usize).saturating_sub(Self::SIZE)
    }

    /// Decode a header from a byte slice
    ///
    /// # Arguments
    /// * `buf` - Byte slice containing at least 6 bytes
    ///
    /// # Returns
    /// Decoded header, or an error if the buffer is short or the declared
    /// length cannot even hold the header itself. A declared length below the
    /// header size leaves the stream position unknown, so it is reported as a
    /// framing error.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(SiError::InvalidLength {
                expected: Self::SIZE,
                actual: buf.len(),
            });
        }

        let mut cursor = std::io::Cursor::new(buf);
        let length = cursor.get_u32();
        let id = cursor.get_u8();
        let cam_id = cursor.get_u8();

        if (length as usize) < Self::SIZE {
            return Err(SiError::Framing(format!(
                "declared packet length {} is shorter than the {}-byte header",
                length,
                Self::SIZE
            )));
        }

        Ok(PacketHeader { length, id, cam_id })
    }

    /// Encode the header into a buffer
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u32(self.length);
        buf.put_u8(self.id);
        buf.put_u8(self.cam_id);
    }

    /// Encode the header into a byte vector
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        self.encode_into(&mut buf);
        buf.to_vec()
    }
}
