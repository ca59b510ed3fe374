//! SI camera protocol implementation module
//!
//! This module contains the packet structures and the command catalogue.

pub mod ack;
pub mod command;
pub mod commands;
pub mod data;
pub mod header;
pub mod image;
pub mod response;

// Re-export commonly used types
pub use ack::AckPacket;
pub use command::{CommandPacket, Param, ParamType};
pub use commands::CameraCommand;
pub use data::{AcquisitionStatus, CameraStatus, DataBody, DataPacket, DataType, Done};
pub use header::{PacketHeader, PacketId};
pub use image::{Image, ImageAssembler, ImageFragmentHeader};
pub use response::{Response, ResultKind};
