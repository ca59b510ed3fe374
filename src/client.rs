//! Camera client facade and type-state builder
//!
//! [`CameraClient`] wraps a [`Dispatcher`] with typed helpers for the common
//! commands. [`ClientBuilder`] assembles one, with the transport chosen
//! before `build()` becomes available:
//! - `Unspecified -> TcpConfigured` via [`ClientBuilder::tcp`]
//! - `Unspecified -> CustomTransport<C>` via [`ClientBuilder::connector`]
//!
//! # Examples
//!
//! ```no_run
//! use si_camera_rust::client::ClientBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> si_camera_rust::Result<()> {
//! let client = ClientBuilder::new()
//!     .tcp("192.168.1.20:2055")
//!     .cam_id(0)
//!     .recv_buffer_size(4 * 1024 * 1024)
//!     .reply_timeout(Duration::from_secs(120))
//!     .build();
//!
//! let acquisition = client.set_exposure_and_acquire(2.0);
//! acquisition.wait().await?;
//! let image = client.retrieve_image(Default::default()).await?;
//! println!("{}x{}", image.serial_length, image.parallel_length);
//! # Ok(())
//! # }
//! ```

use crate::acquisition::{Acquisition, ExposureConfig};
use crate::error::Result;
use crate::io::{
    ConnectionConfig, Connector, Dispatcher, DispatcherConfig, ReconnectConfig, TcpConnector,
};
use crate::protocol::commands::{
    CameraCommand, GetImageHeader, GetSIImageSGLIISettings, GetStatusFromCamera,
    InquireAcquisitionStatus, PixelFormat, RetrieveImage,
};
use crate::protocol::data::{AcquisitionStatus, CameraStatus, Sgl2Settings};
use crate::protocol::image::Image;
use crate::protocol::response::Response;
use std::time::Duration;

/// High-level camera client
///
/// Cloning is cheap; clones share the same dispatcher worker.
#[derive(Debug, Clone)]
pub struct CameraClient {
    dispatcher: Dispatcher,
    exposure: ExposureConfig,
}

impl CameraClient {
    /// Wrap an already running dispatcher
    pub fn new(dispatcher: Dispatcher, exposure: ExposureConfig) -> Self {
        CameraClient {
            dispatcher,
            exposure,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Execute any command and return the raw response
    pub async fn execute<C: CameraCommand + ?Sized>(&self, command: &C) -> Result<Response> {
        self.dispatcher.execute(command).await
    }

    /// Camera status words
    pub async fn status(&self) -> Result<CameraStatus> {
        self.execute(&GetStatusFromCamera).await?.into_camera_status()
    }

    /// Exposure/readout progress
    pub async fn acquisition_status(&self) -> Result<AcquisitionStatus> {
        self.execute(&InquireAcquisitionStatus)
            .await?
            .into_acquisition_status()
    }

    /// Image header text of the given buffer
    pub async fn image_header(&self, buffer: u16) -> Result<String> {
        self.execute(&GetImageHeader { buffer })
            .await?
            .into_header()
    }

    /// Transfer the last image
    pub async fn retrieve_image(&self, format: PixelFormat) -> Result<Image> {
        self.execute(&RetrieveImage { format }).await?.into_image()
    }

    /// SGL II settings
    pub async fn settings(&self) -> Result<Sgl2Settings> {
        self.execute(&GetSIImageSGLIISettings)
            .await?
            .into_settings()
    }

    /// Set the exposure time and start an acquisition in the background
    pub fn set_exposure_and_acquire(&self, exposure_secs: f64) -> Acquisition {
        Acquisition::start(
            self.dispatcher.clone(),
            exposure_secs,
            self.exposure.clone(),
        )
    }

    /// Stop the dispatcher worker after queued commands complete
    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
    }
}

pub struct Unspecified;

pub struct TcpConfigured {
    connection: ConnectionConfig,
}

pub struct CustomTransport<C> {
    connector: C,
}

/// Type-state builder for [`CameraClient`]
pub struct ClientBuilder<Transport = Unspecified> {
    transport: Transport,
    dispatcher: DispatcherConfig,
    exposure: ExposureConfig,
}

impl ClientBuilder<Unspecified> {
    pub fn new() -> Self {
        Self {
            transport: Unspecified,
            dispatcher: DispatcherConfig::default(),
            exposure: ExposureConfig::default(),
        }
    }

    /// Connect over TCP to `host:port`
    pub fn tcp(self, addr: impl Into<String>) -> ClientBuilder<TcpConfigured> {
        ClientBuilder {
            transport: TcpConfigured {
                connection: ConnectionConfig::new(addr),
            },
            dispatcher: self.dispatcher,
            exposure: self.exposure,
        }
    }

    /// Connect through a custom [`Connector`]
    pub fn connector<C: Connector>(self, connector: C) -> ClientBuilder<CustomTransport<C>> {
        ClientBuilder {
            transport: CustomTransport { connector },
            dispatcher: self.dispatcher,
            exposure: self.exposure,
        }
    }
}

impl Default for ClientBuilder<Unspecified> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ClientBuilder<T> {
    pub fn cam_id(mut self, cam_id: u8) -> Self {
        self.dispatcher.cam_id = cam_id;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.dispatcher.read_timeout = timeout;
        self
    }

    /// Bound how long a caller waits for any single result
    pub fn reply_timeout(mut self, timeout: Duration) -> Self {
        self.dispatcher.reply_timeout = Some(timeout);
        self
    }

    pub fn with_reconnect(mut self, config: ReconnectConfig) -> Self {
        self.dispatcher.reconnect = config;
        self
    }

    pub fn exposure_config(mut self, config: ExposureConfig) -> Self {
        self.exposure = config;
        self
    }
}

impl ClientBuilder<TcpConfigured> {
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.transport.connection.connect_timeout = timeout;
        self
    }

    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.transport.connection.nodelay = nodelay;
        self
    }

    /// Set SO_RCVBUF on the socket
    pub fn recv_buffer_size(mut self, size: usize) -> Self {
        self.transport.connection.recv_buffer_size = Some(size);
        self
    }

    /// Start the dispatcher; the connection opens on the first command
    pub fn build(self) -> CameraClient {
        let mut connection = self.transport.connection;
        connection.cam_id = self.dispatcher.cam_id;
        connection.read_timeout = self.dispatcher.read_timeout;

        let dispatcher = Dispatcher::spawn(TcpConnector::new(connection), self.dispatcher);
        CameraClient::new(dispatcher, self.exposure)
    }
}

impl<C: Connector> ClientBuilder<CustomTransport<C>> {
    /// Start the dispatcher; the connection opens on the first command
    pub fn build(self) -> CameraClient {
        let dispatcher = Dispatcher::spawn(self.transport.connector, self.dispatcher);
        CameraClient::new(dispatcher, self.exposure)
    }
}
