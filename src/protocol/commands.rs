//! Camera command catalogue
//!
//! Each command is a thin data record: a function number, an ordered list of
//! typed parameters and the result kind the camera answers with. The
//! dispatcher only sees the [`CameraCommand`] trait, so applications can add
//! their own records for functions not listed here.

use crate::error::Result;
use crate::protocol::command::{CommandPacket, Param};
use crate::protocol::data::DataType;
use crate::protocol::response::ResultKind;

/// Interface every camera command implements
pub trait CameraCommand: Send + Sync {
    /// Function number identifying the camera operation
    fn func_number(&self) -> u16;

    /// Parameters in wire order
    fn params(&self) -> Vec<Param> {
        Vec::new()
    }

    /// Result the camera answers with
    fn expected(&self) -> ResultKind {
        ResultKind::DONE
    }

    /// Build the command packet for the given camera
    fn packet(&self, cam_id: u8) -> Result<CommandPacket> {
        let mut packet = CommandPacket::new(cam_id, self.func_number());
        for param in self.params() {
            packet.push(param)?;
        }
        Ok(packet)
    }
}

/// Pixel format used when retrieving or saving images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    #[default]
    U16,
    I16,
    I32,
    Sgl,
}

impl PixelFormat {
    fn code(self) -> u16 {
        match self {
            PixelFormat::U16 => 0,
            PixelFormat::I16 => 1,
            PixelFormat::I32 => 2,
            PixelFormat::Sgl => 3,
        }
    }
}

/// File container used by [`SaveImage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileFormat {
    #[default]
    Fits,
    Tiff,
}

/// Get camera status words (1011)
#[derive(Debug, Clone, Copy, Default)]
pub struct GetStatusFromCamera;

impl CameraCommand for GetStatusFromCamera {
    fn func_number(&self) -> u16 {
        1011
    }

    fn expected(&self) -> ResultKind {
        ResultKind::Data(DataType::Status)
    }
}

/// Inquire exposure/readout progress (1017)
#[derive(Debug, Clone, Copy, Default)]
pub struct InquireAcquisitionStatus;

impl CameraCommand for InquireAcquisitionStatus {
    fn func_number(&self) -> u16 {
        1017
    }

    fn expected(&self) -> ResultKind {
        ResultKind::Data(DataType::AcquisitionStatus)
    }
}

/// Terminate the running acquisition (1018)
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminateAcquisition;

impl CameraCommand for TerminateAcquisition {
    fn func_number(&self) -> u16 {
        1018
    }
}

/// Retrieve the last image (1019)
#[derive(Debug, Clone, Copy, Default)]
pub struct RetrieveImage {
    pub format: PixelFormat,
}

impl CameraCommand for RetrieveImage {
    fn func_number(&self) -> u16 {
        1019
    }

    fn params(&self) -> Vec<Param> {
        vec![Param::U16(self.format.code())]
    }

    fn expected(&self) -> ResultKind {
        ResultKind::Image
    }
}

/// Terminate a running image retrieval (1020)
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminateImageRetrieve;

impl CameraCommand for TerminateImageRetrieve {
    fn func_number(&self) -> u16 {
        1020
    }
}

/// Get the header of an image buffer (1024)
#[derive(Debug, Clone, Copy)]
pub struct GetImageHeader {
    /// Buffer number (1-2)
    pub buffer: u16,
}

impl CameraCommand for GetImageHeader {
    fn func_number(&self) -> u16 {
        1024
    }

    fn params(&self) -> Vec<Param> {
        vec![Param::U16(self.buffer)]
    }

    fn expected(&self) -> ResultKind {
        ResultKind::Data(DataType::ImageHeader)
    }
}

/// Save the last image on the camera server (1031)
#[derive(Debug, Clone)]
pub struct SaveImage {
    pub path: String,
    pub pixel_format: PixelFormat,
    pub file_format: FileFormat,
}

impl SaveImage {
    /// Save as U16 FITS
    pub fn fits(path: impl Into<String>) -> Self {
        SaveImage {
            path: path.into(),
            pixel_format: PixelFormat::U16,
            file_format: FileFormat::Fits,
        }
    }

    fn format_code(&self) -> u16 {
        let offset = match self.file_format {
            FileFormat::Fits => 0,
            FileFormat::Tiff => 4,
        };
        self.pixel_format.code() + offset
    }
}

impl CameraCommand for SaveImage {
    fn func_number(&self) -> u16 {
        1031
    }

    fn params(&self) -> Vec<Param> {
        vec![Param::U16(self.format_code()), Param::str(self.path.as_str())]
    }
}

/// Set acquisition mode, 0-4 (1034)
#[derive(Debug, Clone, Copy)]
pub struct SetAcquisitionMode {
    pub mode: u8,
}

impl CameraCommand for SetAcquisitionMode {
    fn func_number(&self) -> u16 {
        1034
    }

    fn params(&self) -> Vec<Param> {
        vec![Param::U8(self.mode)]
    }
}

/// Set exposure time in seconds (1035)
#[derive(Debug, Clone, Copy)]
pub struct SetExposureTime {
    pub seconds: f64,
}

impl CameraCommand for SetExposureTime {
    fn func_number(&self) -> u16 {
        1035
    }

    fn params(&self) -> Vec<Param> {
        vec![Param::F64(self.seconds)]
    }
}

/// Acquisition type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionType {
    Light,
    Dark,
    Triggered,
    TdiExternal,
    TdiInternal,
}

impl AcquisitionType {
    fn code(self) -> u8 {
        match self {
            AcquisitionType::Light => 0,
            AcquisitionType::Dark => 1,
            AcquisitionType::Triggered => 2,
            // 3 is not assigned
            AcquisitionType::TdiExternal => 4,
            AcquisitionType::TdiInternal => 5,
        }
    }
}

/// Set acquisition type (1036)
#[derive(Debug, Clone, Copy)]
pub struct SetAcquisitionType {
    pub acquisition_type: AcquisitionType,
}

impl CameraCommand for SetAcquisitionType {
    fn func_number(&self) -> u16 {
        1036
    }

    fn params(&self) -> Vec<Param> {
        vec![Param::U8(self.acquisition_type.code())]
    }
}

/// Start an acquisition (1037)
#[derive(Debug, Clone, Copy, Default)]
pub struct Acquire;

impl CameraCommand for Acquire {
    fn func_number(&self) -> u16 {
        1037
    }
}

/// Set number of frames (1039)
#[derive(Debug, Clone, Copy)]
pub struct SetNumberOfFrames {
    pub frames: u16,
}

impl CameraCommand for SetNumberOfFrames {
    fn func_number(&self) -> u16 {
        1039
    }

    fn params(&self) -> Vec<Param> {
        vec![Param::U16(self.frames)]
    }
}

/// Single (false) or multiple (true) frame buffer mode (1040)
#[derive(Debug, Clone, Copy)]
pub struct SetMultipleFrameBufferMode {
    pub multiple: bool,
}

impl CameraCommand for SetMultipleFrameBufferMode {
    fn func_number(&self) -> u16 {
        1040
    }

    fn params(&self) -> Vec<Param> {
        vec![Param::U8(self.multiple as u8)]
    }
}

/// Get SGL II settings (1041)
#[derive(Debug, Clone, Copy, Default)]
pub struct GetSIImageSGLIISettings;

impl CameraCommand for GetSIImageSGLIISettings {
    fn func_number(&self) -> u16 {
        1041
    }

    fn expected(&self) -> ResultKind {
        ResultKind::Data(DataType::Sgl2Structure)
    }
}

/// Set readout mode (1042)
#[derive(Debug, Clone, Copy)]
pub struct SetReadoutMode {
    pub mode: u8,
}

impl CameraCommand for SetReadoutMode {
    fn func_number(&self) -> u16 {
        1042
    }

    fn params(&self) -> Vec<Param> {
        vec![Param::U8(self.mode)]
    }
}

/// Set CCD format (1043)
#[derive(Debug, Clone, Copy)]
pub struct SetCCDFormatParameters {
    pub serial_origin: i32,
    pub serial_length: i32,
    pub serial_binning: i32,
    pub parallel_origin: i32,
    pub parallel_length: i32,
    pub parallel_binning: i32,
}

impl CameraCommand for SetCCDFormatParameters {
    fn func_number(&self) -> u16 {
        1043
    }

    fn params(&self) -> Vec<Param> {
        vec![
            Param::I32(self.serial_origin),
            Param::I32(self.serial_length),
            Param::I32(self.serial_binning),
            Param::I32(self.parallel_origin),
            Param::I32(self.parallel_length),
            Param::I32(self.parallel_binning),
        ]
    }
}

/// Set a single camera parameter given as `name=value` text (1044)
#[derive(Debug, Clone)]
pub struct SetCameraSingleParameter {
    pub parameter: String,
}

impl CameraCommand for SetCameraSingleParameter {
    fn func_number(&self) -> u16 {
        1044
    }

    fn params(&self) -> Vec<Param> {
        vec![Param::str(self.parameter.as_str())]
    }
}

/// Switch the cooler on or off (1046)
#[derive(Debug, Clone, Copy)]
pub struct SetCooler {
    pub on: bool,
}

impl CameraCommand for SetCooler {
    fn func_number(&self) -> u16 {
        1046
    }

    fn params(&self) -> Vec<Param> {
        vec![Param::U8(self.on as u8)]
    }
}

/// Set the folder the camera server saves images to (1047)
#[derive(Debug, Clone)]
pub struct SetSaveToFolderPath {
    pub path: String,
}

impl CameraCommand for SetSaveToFolderPath {
    fn func_number(&self) -> u16 {
        1047
    }

    fn params(&self) -> Vec<Param> {
        vec![Param::str(self.path.as_str())]
    }
}

/// Get the camera parameter blob (1048)
#[derive(Debug, Clone, Copy, Default)]
pub struct GetCameraParameters;

impl CameraCommand for GetCameraParameters {
    fn func_number(&self) -> u16 {
        1048
    }

    fn expected(&self) -> ResultKind {
        ResultKind::Data(DataType::CameraParameterStructure)
    }
}

/// Get a camera XML file (1060)
#[derive(Debug, Clone)]
pub struct GetCameraXMLFile {
    pub file: String,
}

impl CameraCommand for GetCameraXMLFile {
    fn func_number(&self) -> u16 {
        1060
    }

    fn params(&self) -> Vec<Param> {
        vec![Param::str(self.file.as_str())]
    }

    fn expected(&self) -> ResultKind {
        ResultKind::Data(DataType::XmlFileStructure)
    }
}

/// List image acquisition types (1061)
#[derive(Debug, Clone, Copy, Default)]
pub struct GetImageAcquisitionTypes;

impl CameraCommand for GetImageAcquisitionTypes {
    fn func_number(&self) -> u16 {
        1061
    }

    fn expected(&self) -> ResultKind {
        ResultKind::Data(DataType::MenuInfoStructure)
    }
}

/// Continuous clear mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuousClearMode {
    Enable,
    DisableOneCycle,
    Disable,
}

/// Set continuous clear mode (1062)
#[derive(Debug, Clone, Copy)]
pub struct SetContinuousClearMode {
    pub mode: ContinuousClearMode,
}

impl CameraCommand for SetContinuousClearMode {
    fn func_number(&self) -> u16 {
        1062
    }

    fn params(&self) -> Vec<Param> {
        let code = match self.mode {
            ContinuousClearMode::Enable => 0,
            ContinuousClearMode::DisableOneCycle => 1,
            ContinuousClearMode::Disable => 2,
        };
        vec![Param::U8(code)]
    }
}

/// Software camera reset (1063)
#[derive(Debug, Clone, Copy, Default)]
pub struct ResetCamera;

impl CameraCommand for ResetCamera {
    fn func_number(&self) -> u16 {
        1063
    }
}

/// Hardware camera reset (1064)
#[derive(Debug, Clone, Copy, Default)]
pub struct HardwareCameraReset;

impl CameraCommand for HardwareCameraReset {
    fn func_number(&self) -> u16 {
        1064
    }
}

/// List acquisition modes (1066)
#[derive(Debug, Clone, Copy, Default)]
pub struct GetAcquisitionModes;

impl CameraCommand for GetAcquisitionModes {
    fn func_number(&self) -> u16 {
        1066
    }

    fn expected(&self) -> ResultKind {
        ResultKind::Data(DataType::MenuInfoStructure)
    }
}

/// Interval and image count for multiple acquisitions (1069)
#[derive(Debug, Clone, Copy)]
pub struct SetMultipleAcquisitionOptions {
    pub interval: u32,
    pub images: u32,
}

impl CameraCommand for SetMultipleAcquisitionOptions {
    fn func_number(&self) -> u16 {
        1069
    }

    fn params(&self) -> Vec<Param> {
        vec![Param::U32(self.interval), Param::U32(self.images)]
    }
}
