//! Transport establishment
//!
//! The dispatcher worker opens its connection through a [`Connector`], so the
//! transport can be swapped for an in-memory stream in tests.

use crate::error::Result;
use crate::io::frame_reader::DEFAULT_READ_TIMEOUT;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Connection settings for a camera server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Camera server address, `host:port`
    pub addr: String,
    /// Camera id placed in every command header
    pub cam_id: u8,
    /// Bound on establishing the TCP connection
    pub connect_timeout: Duration,
    /// Bound on each socket read after the first byte of a response
    pub read_timeout: Duration,
    /// Disable Nagle's algorithm
    pub nodelay: bool,
    /// SO_RCVBUF size, if set
    pub recv_buffer_size: Option<usize>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:2055".to_string(),
            cam_id: 0,
            connect_timeout: Duration::from_secs(10),
            read_timeout: DEFAULT_READ_TIMEOUT,
            nodelay: true,
            recv_buffer_size: None,
        }
    }
}

impl ConnectionConfig {
    /// Settings for the given address with default timeouts
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Default::default()
        }
    }
}

/// Opens a byte stream to the camera
pub trait Connector: Send + Sync + 'static {
    /// Stream type produced by this connector
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Establish a new connection
    fn connect(&self) -> impl Future<Output = Result<Self::Stream>> + Send;
}

/// TCP connector honoring [`ConnectionConfig`]
#[derive(Debug, Clone)]
pub struct TcpConnector {
    config: ConnectionConfig,
}

impl TcpConnector {
    pub fn new(config: ConnectionConfig) -> Self {
        TcpConnector { config }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self) -> Result<TcpStream> {
        let addr = self.config.addr.as_str();
        debug!(addr = addr, "Connecting to camera server");

        let stream = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {} timed out", addr),
                )
            })??;

        stream.set_nodelay(self.config.nodelay)?;
        if let Some(size) = self.config.recv_buffer_size {
            set_recv_buffer_size(&stream, size)?;
        }

        info!(
            addr = addr,
            nodelay = self.config.nodelay,
            "Connected to camera server"
        );
        Ok(stream)
    }
}

/// Set the size of the TCP receive buffer (SO_RCVBUF)
///
/// Large image transfers benefit from a receive buffer that holds several
/// fragments.
#[cfg(unix)]
fn set_recv_buffer_size(stream: &TcpStream, size: usize) -> Result<()> {
    use std::os::fd::AsRawFd;

    let fd = stream.as_raw_fd();
    let size = size as libc::c_int;

    let ret = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            &size as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error().into());
    }

    debug!(size = size, "Receive buffer size set");
    Ok(())
}

#[cfg(not(unix))]
fn set_recv_buffer_size(_stream: &TcpStream, size: usize) -> Result<()> {
    tracing::warn!(size = size, "SO_RCVBUF not supported on this platform");
    Ok(())
}
