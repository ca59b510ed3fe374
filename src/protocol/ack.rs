//! Ack packet implementation
//!
//! The camera answers every command with an Ack first. A positive Ack is
//! usually followed by a Data or Image packet carrying the actual result.

use crate::error::{Result, SiError};
use crate::protocol::header::PacketHeader;
use bytes::Buf;

/// Command acknowledgment
///
/// # Wire Layout (big-endian)
/// - Header: 6 bytes, id = 129
/// - Accept: u16 (non-zero = accepted)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckPacket {
    /// Packet header
    pub header: PacketHeader,
    /// Whether the camera accepted the command
    pub accept: bool,
}

impl AckPacket {
    /// Body size in bytes
    pub const BODY_SIZE: usize = 2;

    /// Decode the Ack body that follows an already decoded header
    pub fn decode_body(header: PacketHeader, body: &[u8]) -> Result<Self> {
        if body.len() < Self::BODY_SIZE {
            return Err(SiError::InvalidLength {
                expected: PacketHeader::SIZE + Self::BODY_SIZE,
                actual: PacketHeader::SIZE + body.len(),
            });
        }
        let mut cursor = body;
        let accept = cursor.get_u16() != 0;
        Ok(AckPacket { header, accept })
    }
}
