//! Discriminated command results
//!
//! The camera answers different commands with different packet kinds. This
//! module provides the [`Response`] enum that keeps that distinction visible
//! to callers, plus [`ResultKind`], the result a command declares up front.

use crate::error::{Result, SiError};
use crate::protocol::data::{
    AcquisitionStatus, CameraStatus, DataBody, DataPacket, DataType, Done, Sgl2Settings,
};
use crate::protocol::image::Image;

/// Result packet kind a command expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    /// A Data packet with the given data type
    Data(DataType),
    /// An image transfer
    Image,
}

impl ResultKind {
    /// Completion notice, the result of most setter commands
    pub const DONE: ResultKind = ResultKind::Data(DataType::Done);
}

/// Result of one command exchange
///
/// # Examples
///
/// ```no_run
/// # use si_camera_rust::protocol::response::Response;
/// # fn handle(response: Response) {
/// match response {
///     Response::Ack(accepted) => println!("accepted: {}", accepted),
///     Response::Data(packet) => println!("data type {:?}", packet.data_type()),
///     Response::Header(text) => println!("{}", text),
///     Response::Image(image) => println!("{} samples", image.pixels.len()),
/// }
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Acknowledgment of a fire-and-forget command
    Ack(bool),
    /// Typed data record
    Data(DataPacket),
    /// Image header text (data type 2006), unwrapped
    Header(String),
    /// Assembled image
    Image(Image),
}

impl Response {
    /// Variant name, used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Response::Ack(_) => "Ack",
            Response::Data(_) => "Data",
            Response::Header(_) => "Header",
            Response::Image(_) => "Image",
        }
    }

    /// Build the response for a decoded Data packet
    ///
    /// Image headers are handed to the caller as plain text.
    pub fn from_data(packet: DataPacket) -> Self {
        match packet.body {
            DataBody::ImageHeader(text) => Response::Header(text),
            _ => Response::Data(packet),
        }
    }

    fn unexpected(self, expected: &'static str) -> SiError {
        SiError::UnexpectedResponse {
            expected,
            actual: self.kind_name(),
        }
    }

    /// Acceptance flag of an Ack response
    pub fn into_ack(self) -> Result<bool> {
        match self {
            Response::Ack(accepted) => Ok(accepted),
            other => Err(other.unexpected("Ack")),
        }
    }

    /// Data packet of a Data response
    pub fn into_data(self) -> Result<DataPacket> {
        match self {
            Response::Data(packet) => Ok(packet),
            other => Err(other.unexpected("Data")),
        }
    }

    /// Header text of an image header response
    pub fn into_header(self) -> Result<String> {
        match self {
            Response::Header(text) => Ok(text),
            other => Err(other.unexpected("Header")),
        }
    }

    /// Image of an image transfer response
    pub fn into_image(self) -> Result<Image> {
        match self {
            Response::Image(image) => Ok(image),
            other => Err(other.unexpected("Image")),
        }
    }

    /// Completion notice
    pub fn into_done(self) -> Result<Done> {
        match self.into_data()?.body {
            DataBody::Done(done) => Ok(done),
            _ => Err(SiError::UnexpectedResponse {
                expected: "Done",
                actual: "Data",
            }),
        }
    }

    /// Acquisition progress record
    pub fn into_acquisition_status(self) -> Result<AcquisitionStatus> {
        match self.into_data()?.body {
            DataBody::AcquisitionStatus(status) => Ok(status),
            _ => Err(SiError::UnexpectedResponse {
                expected: "AcquisitionStatus",
                actual: "Data",
            }),
        }
    }

    /// Camera status words
    pub fn into_camera_status(self) -> Result<CameraStatus> {
        match self.into_data()?.body {
            DataBody::Status(status) => Ok(status),
            _ => Err(SiError::UnexpectedResponse {
                expected: "Status",
                actual: "Data",
            }),
        }
    }

    /// SGL II settings
    pub fn into_settings(self) -> Result<Sgl2Settings> {
        match self.into_data()?.body {
            DataBody::Sgl2Structure(settings) => Ok(settings),
            _ => Err(SiError::UnexpectedResponse {
                expected: "Sgl2Structure",
                actual: "Data",
            }),
        }
    }

    /// Raw blob of a blob-typed Data response
    pub fn into_blob(self) -> Result<Vec<u8>> {
        match self.into_data()?.body {
            DataBody::CameraParameterStructure(blob)
            | DataBody::XmlFileStructure(blob)
            | DataBody::CameraStatusLegacy(blob)
            | DataBody::MenuInfoStructure(blob) => Ok(blob),
            _ => Err(SiError::UnexpectedResponse {
                expected: "blob",
                actual: "Data",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::header::{PacketHeader, PacketId};

    fn data(body: DataBody) -> DataPacket {
        DataPacket {
            header: PacketHeader::new(PacketId::Data, 0, 18),
            err_code: 0,
            byte_length: 2,
            body,
        }
    }

    #[test]
    fn test_image_header_is_unwrapped() {
        let response = Response::from_data(data(DataBody::ImageHeader("BITPIX = 16".into())));
        assert_eq!(response.into_header().unwrap(), "BITPIX = 16");
    }

    #[test]
    fn test_done_accessor() {
        let response = Response::from_data(data(DataBody::Done(Done { func_number: 1035 })));
        assert_eq!(response.into_done().unwrap().func_number, 1035);
    }

    #[test]
    fn test_wrong_variant_is_reported() {
        let result = Response::Ack(true).into_image();
        assert!(matches!(
            result,
            Err(SiError::UnexpectedResponse {
                expected: "Image",
                actual: "Ack"
            })
        ));
    }

    #[test]
    fn test_done_expected_but_blob_received() {
        let response = Response::Data(data(DataBody::MenuInfoStructure(vec![1])));
        assert!(response.into_done().is_err());
    }
}
