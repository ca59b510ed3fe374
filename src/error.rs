//! Error types for SI camera protocol operations
//!
//! This module defines all error types that can occur while talking to the
//! camera server, including network I/O, packet framing and decoding, device
//! rejections and acquisition workflow failures.

use thiserror::Error;

/// SI camera protocol error types
///
/// All operations in this library return `Result<T, SiError>` to provide
/// explicit error handling. Errors produced on the dispatcher worker are moved
/// to the submitting caller unchanged, so the variant seen by the caller is
/// the one that was raised on the wire.
#[derive(Error, Debug)]
pub enum SiError {
    /// I/O error occurred during network communication
    ///
    /// This error wraps standard library I/O errors and occurs when:
    /// - TCP connection failed or was refused
    /// - A read stalled past the configured read timeout
    /// - Connection lost during transmission (broken pipe)
    ///
    /// # Example
    /// ```no_run
    /// # use si_camera_rust::error::SiError;
    /// # use std::io;
    /// let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "Connection refused");
    /// let err = SiError::Io(io_err);
    /// ```
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The camera server closed the connection in the middle of a packet
    #[error("Connection closed by peer after {received} of {expected} bytes")]
    ConnectionClosed {
        /// Bytes the frame reader was asked for
        expected: usize,
        /// Bytes actually received before EOF
        received: usize,
    },

    /// Frame reader could not deliver the requested byte count
    #[error("Framing error: {0}")]
    Framing(String),

    /// Declared packet length is inconsistent with the packet kind
    ///
    /// This error occurs when:
    /// - The header `length` is smaller than the fixed size of the packet kind
    /// - A body is shorter than the structure selected by its `data_type`
    /// - An image fragment declares a payload that does not fit its packet
    #[error("Invalid packet length: need at least {expected} bytes, got {actual}")]
    InvalidLength {
        /// Minimum size in bytes for the packet kind
        expected: usize,
        /// Size in bytes declared or available
        actual: usize,
    },

    /// Packet id is not one of Ack (129), Data (131) or Image (132)
    #[error("Unknown packet id: {0}")]
    UnknownPacketId(u8),

    /// Data packet carries a `data_type` this library does not know
    #[error("Unknown data type: {0}")]
    UnknownDataType(u16),

    /// A command parameter list violates the wire rules
    #[error("Invalid command parameter: {0}")]
    InvalidParameter(String),

    /// UTF-8 conversion error in a text payload (image header)
    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// The camera answered with a negative Ack
    ///
    /// `func_number` identifies the command that was refused.
    #[error("Command {func_number} rejected by camera")]
    Rejected {
        /// Function number of the refused command
        func_number: u16,
    },

    /// An exposure, status poll or reply wait exceeded its allotted time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Exposure was cancelled by an explicit abort request
    #[error("Acquisition aborted")]
    Aborted,

    /// Image fragments did not add up to the declared image dimensions
    #[error("Image assembly failed: expected {expected} samples, got {actual}")]
    Assembly {
        /// `serial_length * parallel_length`
        expected: usize,
        /// Samples actually received
        actual: usize,
    },

    /// The camera answered with a packet kind the caller did not ask for
    #[error("Unexpected response: expected {expected}, got {actual}")]
    UnexpectedResponse {
        /// What the caller expected
        expected: &'static str,
        /// What the dispatcher returned
        actual: &'static str,
    },

    /// The dispatcher worker has shut down and no longer accepts commands
    #[error("Dispatcher is closed")]
    DispatcherClosed,

    /// A background task panicked or was cancelled before returning a result
    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

impl SiError {
    /// Whether this error means the transport is no longer usable
    ///
    /// The dispatcher drops its connection after such errors so the next
    /// command reconnects from a clean stream.
    pub fn is_connection_fault(&self) -> bool {
        matches!(
            self,
            SiError::Io(_) | SiError::ConnectionClosed { .. } | SiError::Framing(_)
        )
    }
}

/// Result type alias for SI camera operations
pub type Result<T> = std::result::Result<T, SiError>;
