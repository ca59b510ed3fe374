//! Packet transmission and two-phase packet decoding
//!
//! Incoming packets are read in two steps: the fixed 6-byte header first,
//! then exactly `length - 6` body bytes. The body is always consumed in full
//! before it is decoded, so a malformed body fails only the current exchange
//! and leaves the stream positioned at the next packet.

use crate::error::{Result, SiError};
use crate::io::frame_reader::FrameReader;
use crate::protocol::ack::AckPacket;
use crate::protocol::command::CommandPacket;
use crate::protocol::data::DataPacket;
use crate::protocol::header::{PacketHeader, PacketId};
use crate::protocol::image::{Image, ImageAssembler, ImageFragmentHeader};
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace, warn};

/// A decoded packet received from the camera
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Ack(AckPacket),
    Data(DataPacket),
    /// One image fragment: head plus its raw sample bytes
    ImageFragment(ImageFragmentHeader, Bytes),
}

impl Incoming {
    pub fn packet_id(&self) -> PacketId {
        match self {
            Incoming::Ack(_) => PacketId::Ack,
            Incoming::Data(_) => PacketId::Data,
            Incoming::ImageFragment(..) => PacketId::Image,
        }
    }
}

/// Encode and transmit a command packet
pub async fn send_command<W>(stream: &mut W, packet: &CommandPacket) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let data = packet.encode();

    debug!(
        func_number = packet.func_number,
        cam_id = packet.cam_id,
        length = data.len(),
        "Sending command"
    );

    stream.write_all(&data).await?;
    stream.flush().await?;

    trace!(bytes_sent = data.len(), "Command sent");
    Ok(())
}

/// Read and decode the next packet
///
/// # Errors
///
/// - [`SiError::UnknownPacketId`] - Unknown id; the body has been skipped
/// - [`SiError::UnknownDataType`] - Unknown data type; the body has been skipped
/// - [`SiError::InvalidLength`] - Declared length shorter than the structure
/// - [`SiError::Io`] / [`SiError::ConnectionClosed`] - Transport failure
pub async fn read_packet<R>(reader: &mut FrameReader<R>) -> Result<Incoming>
where
    R: AsyncRead + Unpin,
{
    let header_bytes = reader.receive(PacketHeader::SIZE).await?;
    let header = PacketHeader::decode(&header_bytes)?;
    let body = reader.receive(header.body_len()).await?;

    trace!(
        packet_id = header.id,
        cam_id = header.cam_id,
        length = header.length,
        "Packet received"
    );

    match header.kind()? {
        PacketId::Ack => {
            let ack = AckPacket::decode_body(header, &body)?;
            debug!(accept = ack.accept, "Received ack");
            Ok(Incoming::Ack(ack))
        }
        PacketId::Data => {
            let packet = DataPacket::decode_body(header, &body)?;
            if packet.err_code != 0 {
                warn!(
                    err_code = packet.err_code,
                    data_type = ?packet.data_type(),
                    "Camera reported an error code"
                );
            }
            debug!(data_type = ?packet.data_type(), length = header.length, "Received data");
            Ok(Incoming::Data(packet))
        }
        PacketId::Image => {
            let split = ImageFragmentHeader::FIXED_SIZE.min(body.len());
            let head = ImageFragmentHeader::decode(header, &body[..split])?;
            Ok(Incoming::ImageFragment(head, body.slice(split..)))
        }
        PacketId::Command => Err(SiError::Framing(
            "camera sent a command packet".to_string(),
        )),
    }
}

/// Read the remaining fragments of an image and assemble it
///
/// `first` is the fragment that started the transfer. Any non-image packet
/// before the last fragment fails the transfer.
pub async fn read_image<R>(
    reader: &mut FrameReader<R>,
    first: ImageFragmentHeader,
    payload: Bytes,
) -> Result<Image>
where
    R: AsyncRead + Unpin,
{
    let mut assembler = ImageAssembler::new(&first);
    assembler.push(&first, &payload)?;

    while !assembler.is_complete() {
        match read_packet(reader).await? {
            Incoming::ImageFragment(head, payload) => assembler.push(&head, &payload)?,
            other => {
                return Err(SiError::Framing(format!(
                    "{} packet interrupted image transfer with {} fragments outstanding",
                    other.packet_id().name(),
                    assembler.remaining()
                )))
            }
        }
    }

    assembler.finish()
}
