//! Data packet implementation
//!
//! Data packets carry typed command results. The body structure is selected
//! solely by the `data_type` field, never by the outer packet id.

use crate::error::{Result, SiError};
use crate::protocol::header::PacketHeader;
use bytes::Buf;
use serde::{Deserialize, Serialize};

/// Discriminator of a Data packet body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Camera status words (2002)
    Status,
    /// Exposure/readout progress (2004)
    AcquisitionStatus,
    /// FITS-style image header text (2006)
    ImageHeader,
    /// Command completion notice (2007)
    Done,
    /// SGL II exposure/readout/format settings (2008)
    Sgl2Structure,
    /// Camera parameter blob (2010)
    CameraParameterStructure,
    /// Camera XML file blob (2011)
    XmlFileStructure,
    /// Undocumented camera status blob (2012)
    CameraStatusLegacy,
    /// Menu information blob (2013)
    MenuInfoStructure,
}

impl DataType {
    /// Wire value
    pub fn as_u16(self) -> u16 {
        match self {
            DataType::Status => 2002,
            DataType::AcquisitionStatus => 2004,
            DataType::ImageHeader => 2006,
            DataType::Done => 2007,
            DataType::Sgl2Structure => 2008,
            DataType::CameraParameterStructure => 2010,
            DataType::XmlFileStructure => 2011,
            DataType::CameraStatusLegacy => 2012,
            DataType::MenuInfoStructure => 2013,
        }
    }

    /// Map a wire value to a data type; unknown values are an error
    pub fn from_u16(value: u16) -> Result<Self> {
        match value {
            2002 => Ok(DataType::Status),
            2004 => Ok(DataType::AcquisitionStatus),
            2006 => Ok(DataType::ImageHeader),
            2007 => Ok(DataType::Done),
            2008 => Ok(DataType::Sgl2Structure),
            2010 => Ok(DataType::CameraParameterStructure),
            2011 => Ok(DataType::XmlFileStructure),
            2012 => Ok(DataType::CameraStatusLegacy),
            2013 => Ok(DataType::MenuInfoStructure),
            other => Err(SiError::UnknownDataType(other)),
        }
    }
}

/// Camera status (data type 2002)
///
/// Sixteen status words. Only a handful have a documented meaning; the rest
/// are kept as received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraStatus {
    /// Raw status words in wire order
    pub words: [u32; 16],
}

impl CameraStatus {
    /// Body size in bytes
    pub const SIZE: usize = 64;

    /// CCD temperature word
    pub fn ccd_temp(&self) -> u32 {
        self.words[0]
    }

    /// Backplate temperature word
    pub fn backplate_temp(&self) -> u32 {
        self.words[1]
    }

    /// Chamber pressure word
    pub fn chamber_pressure(&self) -> u32 {
        self.words[2]
    }

    /// Shutter status word
    pub fn shutter_status(&self) -> u32 {
        self.words[8]
    }

    /// XIRQ status word
    pub fn xirq_status(&self) -> u32 {
        self.words[9]
    }

    fn decode(buf: &mut &[u8]) -> Self {
        let mut words = [0u32; 16];
        for word in words.iter_mut() {
            *word = buf.get_u32();
        }
        CameraStatus { words }
    }
}

/// Exposure and readout progress (data type 2004)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionStatus {
    /// Exposure progress, 0-100
    pub exp_done_percent: u16,
    /// Readout progress, 0-100
    pub readout_done_percent: u16,
    /// Current readout row relative to the frame start
    pub relative_readout_position: u32,
    /// Whether an acquisition is running
    ///
    /// Only some servers append this word; `false` when it is absent.
    pub acquiring: bool,
}

impl AcquisitionStatus {
    /// Minimum body size in bytes
    pub const SIZE: usize = 8;

    /// Exposure has reached 100 %
    pub fn is_exposure_done(&self) -> bool {
        self.exp_done_percent >= 100
    }

    /// Readout has reached 100 %
    pub fn is_readout_done(&self) -> bool {
        self.readout_done_percent >= 100
    }

    fn decode(buf: &mut &[u8]) -> Self {
        AcquisitionStatus {
            exp_done_percent: buf.get_u16(),
            readout_done_percent: buf.get_u16(),
            relative_readout_position: buf.get_u32(),
            acquiring: buf.remaining() >= 2 && buf.get_u16() != 0,
        }
    }
}

/// Command completion notice (data type 2007)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Done {
    /// Function number of the command that completed
    pub func_number: u16,
}

impl Done {
    /// Body size in bytes
    pub const SIZE: usize = 2;
}

/// SGL II settings (data type 2008)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sgl2Settings {
    /// Exposure time in seconds
    pub exposure_time: f64,
    pub averaging_count: i32,
    pub frame_count: i32,
    pub acquisition_mode: i32,
    pub acquisition_type: i32,
    pub serial_origin: i32,
    pub serial_length: i32,
    pub serial_binning: i32,
    pub parallel_origin: i32,
    pub parallel_length: i32,
    pub parallel_binning: i32,
}

impl Sgl2Settings {
    /// Body size in bytes
    pub const SIZE: usize = 8 + 10 * 4;

    fn decode(buf: &mut &[u8]) -> Self {
        Sgl2Settings {
            exposure_time: buf.get_f64(),
            averaging_count: buf.get_i32(),
            frame_count: buf.get_i32(),
            acquisition_mode: buf.get_i32(),
            acquisition_type: buf.get_i32(),
            serial_origin: buf.get_i32(),
            serial_length: buf.get_i32(),
            serial_binning: buf.get_i32(),
            parallel_origin: buf.get_i32(),
            parallel_length: buf.get_i32(),
            parallel_binning: buf.get_i32(),
        }
    }
}

/// Decoded Data packet body, one variant per [`DataType`]
#[derive(Debug, Clone, PartialEq)]
pub enum DataBody {
    Status(CameraStatus),
    AcquisitionStatus(AcquisitionStatus),
    ImageHeader(String),
    Done(Done),
    Sgl2Structure(Sgl2Settings),
    CameraParameterStructure(Vec<u8>),
    XmlFileStructure(Vec<u8>),
    CameraStatusLegacy(Vec<u8>),
    MenuInfoStructure(Vec<u8>),
}

impl DataBody {
    /// Data type of this body
    pub fn data_type(&self) -> DataType {
        match self {
            DataBody::Status(_) => DataType::Status,
            DataBody::AcquisitionStatus(_) => DataType::AcquisitionStatus,
            DataBody::ImageHeader(_) => DataType::ImageHeader,
            DataBody::Done(_) => DataType::Done,
            DataBody::Sgl2Structure(_) => DataType::Sgl2Structure,
            DataBody::CameraParameterStructure(_) => DataType::CameraParameterStructure,
            DataBody::XmlFileStructure(_) => DataType::XmlFileStructure,
            DataBody::CameraStatusLegacy(_) => DataType::CameraStatusLegacy,
            DataBody::MenuInfoStructure(_) => DataType::MenuInfoStructure,
        }
    }
}

/// Data packet
///
/// # Wire Layout (big-endian)
/// - Header: 6 bytes, id = 131
/// - Error code: i32
/// - Data type: u16
/// - Byte length: i32
/// - Body selected by data type
#[derive(Debug, Clone, PartialEq)]
pub struct DataPacket {
    /// Packet header
    pub header: PacketHeader,
    /// Device error code (0 = no error)
    pub err_code: i32,
    /// Byte length field as reported by the device
    pub byte_length: i32,
    /// Decoded body
    pub body: DataBody,
}

impl DataPacket {
    /// Size of the fixed data header that follows the packet header
    pub const FIXED_SIZE: usize = 10;

    /// Packet header + fixed data header
    pub const PREFIX_SIZE: usize = PacketHeader::SIZE + Self::FIXED_SIZE;

    /// Data type of the body
    pub fn data_type(&self) -> DataType {
        self.body.data_type()
    }

    /// Decode a Data packet body that follows an already decoded header
    ///
    /// `body` must hold exactly `header.length - 6` bytes. The fixed fields
    /// decode first, then the remainder according to `data_type`.
    pub fn decode_body(header: PacketHeader, body: &[u8]) -> Result<Self> {
        if body.len() < Self::FIXED_SIZE {
            return Err(SiError::InvalidLength {
                expected: Self::PREFIX_SIZE,
                actual: PacketHeader::SIZE + body.len(),
            });
        }

        let mut cursor = body;
        let err_code = cursor.get_i32();
        let data_type = DataType::from_u16(cursor.get_u16())?;
        let byte_length = cursor.get_i32();

        let need = match data_type {
            DataType::Status => CameraStatus::SIZE,
            DataType::AcquisitionStatus => AcquisitionStatus::SIZE,
            DataType::Done => Done::SIZE,
            DataType::Sgl2Structure => Sgl2Settings::SIZE,
            _ => 0,
        };
        if cursor.len() < need {
            return Err(SiError::InvalidLength {
                expected: Self::PREFIX_SIZE + need,
                actual: PacketHeader::SIZE + body.len(),
            });
        }

        let body = match data_type {
            DataType::Status => DataBody::Status(CameraStatus::decode(&mut cursor)),
            DataType::AcquisitionStatus => {
                DataBody::AcquisitionStatus(AcquisitionStatus::decode(&mut cursor))
            }
            DataType::Done => DataBody::Done(Done {
                func_number: cursor.get_u16(),
            }),
            DataType::Sgl2Structure => DataBody::Sgl2Structure(Sgl2Settings::decode(&mut cursor)),
            DataType::ImageHeader => {
                DataBody::ImageHeader(String::from_utf8(strip_nul(cursor).to_vec())?)
            }
            DataType::CameraParameterStructure => {
                DataBody::CameraParameterStructure(strip_nul(cursor).to_vec())
            }
            DataType::XmlFileStructure => DataBody::XmlFileStructure(strip_nul(cursor).to_vec()),
            DataType::CameraStatusLegacy => {
                DataBody::CameraStatusLegacy(strip_nul(cursor).to_vec())
            }
            DataType::MenuInfoStructure => {
                DataBody::MenuInfoStructure(strip_nul(cursor).to_vec())
            }
        };

        Ok(DataPacket {
            header,
            err_code,
            byte_length,
            body,
        })
    }
}

/// Drop exactly one trailing NUL byte, if present
fn strip_nul(blob: &[u8]) -> &[u8] {
    match blob.split_last() {
        Some((&0, rest)) => rest,
        _ => blob,
    }
}
