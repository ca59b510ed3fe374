//! SI Scientific Camera Protocol Client in Rust
//!
//! This library talks to a Spectral Instruments (SI) camera server over its
//! binary TCP protocol: it sends commands, decodes the typed results, runs
//! timed exposures and reassembles fragmented images.
//!
//! # Features
//!
//! - **Typed packets** - Command, Ack, Data and Image packets as Rust types
//! - **Exact framing** - Two-phase decoding through a buffered frame reader
//! - **Serialized access** - One worker task owns the connection; any number
//!   of tasks submit commands and receive only their own results
//! - **Acquisition workflow** - Short exposures are polled, long ones can be
//!   aborted during most of the exposure
//! - **Image assembly** - Multi-fragment images become one `u16` pixel buffer
//!
//! # Quick Start
//!
//! ```no_run
//! use si_camera_rust::client::ClientBuilder;
//! use si_camera_rust::protocol::commands::{PixelFormat, SetCooler};
//!
//! # async fn example() -> si_camera_rust::Result<()> {
//! let client = ClientBuilder::new().tcp("192.168.1.20:2055").build();
//!
//! client.execute(&SetCooler { on: true }).await?;
//! let status = client.status().await?;
//! println!("CCD temperature word: {}", status.ccd_temp());
//!
//! let done = client.set_exposure_and_acquire(5.0).wait().await?;
//! println!("acquisition finished (function {})", done.func_number);
//!
//! let image = client.retrieve_image(PixelFormat::U16).await?;
//! println!("{} pixels", image.pixels.len());
//!
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! ## Module Structure
//!
//! - **`protocol`** - Packet layouts and the command catalogue
//!   - `header` - 6-byte packet header
//!   - `command` / `commands` - Command packet encoding and the known commands
//!   - `ack`, `data`, `image` - Received packet kinds
//!   - `response` - The discriminated `Response` returned to callers
//!
//! - **`io`** - Network I/O layer
//!   - `FrameReader` - Exact-length reads with an owned residual buffer
//!   - `codec` - Packet transmission and decoding
//!   - `Dispatcher` - Single-worker command queue
//!   - `Connector` / `TcpConnector` - Transport establishment
//!
//! - **`acquisition`** - Exposure workflow with abort support
//! - **`client`** - `CameraClient` facade and `ClientBuilder`
//!
//! - **`error`** - Error handling
//!   - `SiError` - Unified error type for all operations
//!   - `Result<T>` - Type alias for `Result<T, SiError>`
//!
//! # Logging
//!
//! The library emits `tracing` events and installs no subscriber. See
//! `demos/acquire.rs` for a `tracing-subscriber` setup.

pub mod acquisition;
pub mod client;
pub mod error;
pub mod io;
pub mod protocol;

// Re-export main error type
pub use error::{Result, SiError};
