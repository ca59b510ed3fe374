//! Image packet implementation and fragment reassembly
//!
//! Image data is transferred as a sequence of Image packets. Every fragment
//! repeats the full fragment head, followed by its share of the 16-bit pixel
//! samples.

use crate::error::{Result, SiError};
use crate::protocol::header::PacketHeader;
use bytes::Buf;
use tracing::{debug, trace};

/// Fixed part of an Image packet body
///
/// # Wire Layout (big-endian)
/// - Header: 6 bytes, id = 132
/// - Image bytes: u32 (payload length of this fragment)
/// - Total packets: u16 (fragment count of the whole image)
/// - Serial length: u16 (image width)
/// - Parallel length: u16 (image height)
/// - `img_bytes` bytes of u16 samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageFragmentHeader {
    /// Packet header
    pub header: PacketHeader,
    /// Payload bytes carried by this fragment
    pub img_bytes: u32,
    /// Number of fragments in the full image
    pub total_packets: u16,
    /// Final image width in pixels
    pub serial_length: u16,
    /// Final image height in pixels
    pub parallel_length: u16,
}

impl ImageFragmentHeader {
    /// Size of the fixed fields after the packet header
    pub const FIXED_SIZE: usize = 10;

    /// Packet header + fixed fields
    pub const PREFIX_SIZE: usize = PacketHeader::SIZE + Self::FIXED_SIZE;

    /// Decode the fixed fields that follow an already decoded header
    ///
    /// Validates that the declared payload fits the packet exactly and holds a
    /// whole number of samples.
    pub fn decode(header: PacketHeader, fixed: &[u8]) -> Result<Self> {
        if (header.length as usize) < Self::PREFIX_SIZE || fixed.len() < Self::FIXED_SIZE {
            return Err(SiError::InvalidLength {
                expected: Self::PREFIX_SIZE,
                actual: (header.length as usize).min(PacketHeader::SIZE + fixed.len()),
            });
        }

        let mut cursor = fixed;
        let img_bytes = cursor.get_u32();
        let total_packets = cursor.get_u16();
        let serial_length = cursor.get_u16();
        let parallel_length = cursor.get_u16();

        let payload_room = header.length as usize - Self::PREFIX_SIZE;
        if img_bytes as usize != payload_room {
            return Err(SiError::InvalidLength {
                expected: Self::PREFIX_SIZE + img_bytes as usize,
                actual: header.length as usize,
            });
        }
        if img_bytes % 2 != 0 {
            return Err(SiError::Framing(format!(
                "image fragment carries {} bytes, not a whole number of 16-bit samples",
                img_bytes
            )));
        }

        Ok(ImageFragmentHeader {
            header,
            img_bytes,
            total_packets,
            serial_length,
            parallel_length,
        })
    }

    /// Number of samples carried by this fragment
    pub fn sample_count(&self) -> usize {
        self.img_bytes as usize / 2
    }
}

/// A fully assembled image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Width in pixels
    pub serial_length: u16,
    /// Height in pixels
    pub parallel_length: u16,
    /// Row-major 16-bit samples
    pub pixels: Vec<u16>,
}

impl Image {
    /// `(width, height, pixels)` view of the image
    pub fn into_parts(self) -> (u16, u16, Vec<u16>) {
        (self.serial_length, self.parallel_length, self.pixels)
    }
}

/// Reassembles an image from its fragments
///
/// The first fragment fixes the expected fragment count and dimensions;
/// following fragments must arrive in order.
///
/// # Examples
///
/// ```
/// use si_camera_rust::protocol::header::{PacketHeader, PacketId};
/// use si_camera_rust::protocol::image::{ImageAssembler, ImageFragmentHeader};
///
/// let head = ImageFragmentHeader {
///     header: PacketHeader::new(PacketId::Image, 0, 16 + 8),
///     img_bytes: 8,
///     total_packets: 1,
///     serial_length: 2,
///     parallel_length: 2,
/// };
/// let mut assembler = ImageAssembler::new(&head);
/// assembler.push(&head, &[0, 1, 0, 2, 0, 3, 0, 4]).unwrap();
/// let image = assembler.finish().unwrap();
/// assert_eq!(image.pixels, vec![1, 2, 3, 4]);
/// ```
#[derive(Debug)]
pub struct ImageAssembler {
    total_packets: u16,
    received_packets: u16,
    serial_length: u16,
    parallel_length: u16,
    pixels: Vec<u16>,
}

impl ImageAssembler {
    /// Start assembling from the first fragment head
    pub fn new(first: &ImageFragmentHeader) -> Self {
        let expected = first.serial_length as usize * first.parallel_length as usize;
        debug!(
            total_packets = first.total_packets,
            serial_length = first.serial_length,
            parallel_length = first.parallel_length,
            "Starting image assembly"
        );
        ImageAssembler {
            total_packets: first.total_packets,
            received_packets: 0,
            serial_length: first.serial_length,
            parallel_length: first.parallel_length,
            pixels: Vec::with_capacity(expected),
        }
    }

    /// Fragments still expected
    pub fn remaining(&self) -> u16 {
        self.total_packets.saturating_sub(self.received_packets)
    }

    /// Whether every announced fragment has been received
    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }

    /// Append one fragment's payload
    ///
    /// `payload` must be exactly `head.img_bytes` long. A fragment beyond the
    /// announced count, or one whose dimensions disagree with the first, is an
    /// assembly error.
    pub fn push(&mut self, head: &ImageFragmentHeader, payload: &[u8]) -> Result<()> {
        if self.is_complete() {
            return Err(SiError::Framing(format!(
                "received image fragment {} of {}",
                self.received_packets + 1,
                self.total_packets
            )));
        }
        if head.serial_length != self.serial_length || head.parallel_length != self.parallel_length
        {
            return Err(SiError::Framing(format!(
                "fragment dimensions {}x{} differ from image {}x{}",
                head.serial_length, head.parallel_length, self.serial_length, self.parallel_length
            )));
        }
        if payload.len() != head.img_bytes as usize {
            return Err(SiError::InvalidLength {
                expected: head.img_bytes as usize,
                actual: payload.len(),
            });
        }

        self.pixels.extend(
            payload
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]])),
        );
        self.received_packets += 1;

        trace!(
            fragment = self.received_packets,
            total_packets = self.total_packets,
            samples = self.pixels.len(),
            "Image fragment appended"
        );
        Ok(())
    }

    /// Finish the transfer
    ///
    /// Fails unless all fragments arrived and the sample count equals
    /// `serial_length * parallel_length`.
    pub fn finish(self) -> Result<Image> {
        let expected = self.serial_length as usize * self.parallel_length as usize;
        if !self.is_complete() || self.pixels.len() != expected {
            return Err(SiError::Assembly {
                expected,
                actual: self.pixels.len(),
            });
        }

        debug!(
            serial_length = self.serial_length,
            parallel_length = self.parallel_length,
            samples = self.pixels.len(),
            "Image assembled"
        );

        Ok(Image {
            serial_length: self.serial_length,
            parallel_length: self.parallel_length,
            pixels: self.pixels,
        })
    }
}
