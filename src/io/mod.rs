//! Network I/O for the camera protocol
//!
//! Provides the exact-length frame reader, packet transmission and decoding,
//! connection establishment and the single-worker command dispatcher.

pub mod codec;
pub mod connection;
pub mod dispatcher;
pub mod frame_reader;
pub mod reconnect;

pub use codec::Incoming;
pub use connection::{ConnectionConfig, Connector, TcpConnector};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use frame_reader::FrameReader;
pub use reconnect::ReconnectConfig;
