//! Command packet implementation
//!
//! A command packet is the only outbound packet kind. It carries the function
//! number of the camera operation followed by an ordered list of typed
//! parameters.

use crate::error::{Result, SiError};
use crate::protocol::header::{PacketHeader, PacketId};
use bytes::{Buf, BufMut, BytesMut};

/// Wire type of a command parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F64,
    /// NUL-terminated byte string
    Str,
}

/// A typed command parameter
///
/// Strings are stored without their terminator; the encoder always appends
/// exactly one NUL byte.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F64(f64),
    Str(Vec<u8>),
}

impl Param {
    /// Create a string parameter
    pub fn str(value: impl Into<Vec<u8>>) -> Self {
        Param::Str(value.into())
    }

    /// Wire type of this parameter
    pub fn param_type(&self) -> ParamType {
        match self {
            Param::U8(_) => ParamType::U8,
            Param::U16(_) => ParamType::U16,
            Param::U32(_) => ParamType::U32,
            Param::U64(_) => ParamType::U64,
            Param::I8(_) => ParamType::I8,
            Param::I16(_) => ParamType::I16,
            Param::I32(_) => ParamType::I32,
            Param::I64(_) => ParamType::I64,
            Param::F64(_) => ParamType::F64,
            Param::Str(_) => ParamType::Str,
        }
    }

    /// Encoded size in bytes
    pub fn wire_size(&self) -> usize {
        match self {
            Param::U8(_) | Param::I8(_) => 1,
            Param::U16(_) | Param::I16(_) => 2,
            Param::U32(_) | Param::I32(_) => 4,
            Param::U64(_) | Param::I64(_) | Param::F64(_) => 8,
            Param::Str(s) => s.len() + 1,
        }
    }

    fn encode_into(&self, buf: &mut BytesMut) {
        match self {
            Param::U8(v) => buf.put_u8(*v),
            Param::U16(v) => buf.put_u16(*v),
            Param::U32(v) => buf.put_u32(*v),
            Param::U64(v) => buf.put_u64(*v),
            Param::I8(v) => buf.put_i8(*v),
            Param::I16(v) => buf.put_i16(*v),
            Param::I32(v) => buf.put_i32(*v),
            Param::I64(v) => buf.put_i64(*v),
            Param::F64(v) => buf.put_f64(*v),
            Param::Str(s) => {
                buf.put_slice(s);
                buf.put_u8(0);
            }
        }
    }

    fn decode_from(ty: ParamType, buf: &mut &[u8]) -> Result<Self> {
        let need = match ty {
            ParamType::U8 | ParamType::I8 => 1,
            ParamType::U16 | ParamType::I16 => 2,
            ParamType::U32 | ParamType::I32 => 4,
            ParamType::U64 | ParamType::I64 | ParamType::F64 => 8,
            ParamType::Str => 1,
        };
        if buf.remaining() < need {
            return Err(SiError::InvalidLength {
                expected: need,
                actual: buf.remaining(),
            });
        }

        Ok(match ty {
            ParamType::U8 => Param::U8(buf.get_u8()),
            ParamType::U16 => Param::U16(buf.get_u16()),
            ParamType::U32 => Param::U32(buf.get_u32()),
            ParamType::U64 => Param::U64(buf.get_u64()),
            ParamType::I8 => Param::I8(buf.get_i8()),
            ParamType::I16 => Param::I16(buf.get_i16()),
            ParamType::I32 => Param::I32(buf.get_i32()),
            ParamType::I64 => Param::I64(buf.get_i64()),
            ParamType::F64 => Param::F64(buf.get_f64()),
            ParamType::Str => {
                let end = buf.iter().position(|&b| b == 0).ok_or_else(|| {
                    SiError::InvalidParameter("string parameter is not NUL-terminated".into())
                })?;
                let value = buf[..end].to_vec();
                buf.advance(end + 1);
                Param::Str(value)
            }
        })
    }
}

/// Outbound command packet
///
/// # Wire Layout (big-endian)
/// - Header: 6 bytes, id = 128
/// - Function number: u16
/// - Parameters in declared order
///
/// # Examples
///
/// ```
/// use si_camera_rust::protocol::command::{CommandPacket, Param};
///
/// let mut cmd = CommandPacket::new(0, 1035);
/// cmd.push(Param::F64(2.5)).unwrap();
/// let bytes = cmd.encode();
/// assert_eq!(bytes.len(), 6 + 2 + 8);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CommandPacket {
    /// Target camera
    pub cam_id: u8,
    /// Camera operation
    pub func_number: u16,
    params: Vec<Param>,
}

impl CommandPacket {
    /// Fixed part of a command packet (header + function number)
    pub const FIXED_SIZE: usize = PacketHeader::SIZE + 2;

    /// Create a command with no parameters
    pub fn new(cam_id: u8, func_number: u16) -> Self {
        CommandPacket {
            cam_id,
            func_number,
            params: Vec::new(),
        }
    }

    /// Append a parameter
    ///
    /// A string parameter must be the last one; appending anything after it is
    /// rejected. Strings must not contain an interior NUL byte.
    pub fn push(&mut self, param: Param) -> Result<()> {
        if matches!(self.params.last(), Some(Param::Str(_))) {
            return Err(SiError::InvalidParameter(format!(
                "command {}: string parameter must be the final parameter",
                self.func_number
            )));
        }
        if let Param::Str(s) = &param {
            if s.contains(&0) {
                return Err(SiError::InvalidParameter(format!(
                    "command {}: string parameter contains a NUL byte",
                    self.func_number
                )));
            }
        }
        self.params.push(param);
        Ok(())
    }

    /// Builder-style variant of [`push`](Self::push)
    pub fn with(mut self, param: Param) -> Result<Self> {
        self.push(param)?;
        Ok(self)
    }

    /// Parameters in wire order
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Parameter layout, as needed by [`decode`](Self::decode)
    pub fn layout(&self) -> Vec<ParamType> {
        self.params.iter().map(Param::param_type).collect()
    }

    /// Total encoded length in bytes
    pub fn wire_size(&self) -> usize {
        Self::FIXED_SIZE + self.params.iter().map(Param::wire_size).sum::<usize>()
    }

    /// Encode the packet, patching the header length last
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.wire_size());

        // Placeholder header; length is patched once the body is known
        PacketHeader::new(PacketId::Command, self.cam_id, 0).encode_into(&mut buf);
        buf.put_u16(self.func_number);
        for param in &self.params {
            param.encode_into(&mut buf);
        }

        let length = buf.len() as u32;
        buf[..4].copy_from_slice(&length.to_be_bytes());
        buf.to_vec()
    }

    /// Decode a command packet given its parameter layout
    ///
    /// The camera never sends commands; this exists for mock devices and for
    /// checking encoder output.
    pub fn decode(data: &[u8], layout: &[ParamType]) -> Result<Self> {
        let header = PacketHeader::decode(data)?;
        if header.kind()? != PacketId::Command {
            return Err(SiError::UnknownPacketId(header.id));
        }
        let length = header.length as usize;
        if length < Self::FIXED_SIZE || data.len() < length {
            return Err(SiError::InvalidLength {
                expected: Self::FIXED_SIZE.max(length),
                actual: data.len().min(length),
            });
        }

        let mut body = &data[PacketHeader::SIZE..length];
        let func_number = body.get_u16();

        let mut params = Vec::with_capacity(layout.len());
        for ty in layout {
            params.push(Param::decode_from(*ty, &mut body)?);
        }

        if body.has_remaining() {
            return Err(SiError::InvalidParameter(format!(
                "command {}: {} trailing bytes after declared parameters",
                func_number,
                body.remaining()
            )));
        }

        Ok(CommandPacket {
            cam_id: header.cam_id,
            func_number,
            params,
        })
    }
}
