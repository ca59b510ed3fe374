//! Mock camera helpers shared by the integration tests

#![allow(dead_code)]

use si_camera_rust::io::Connector;
use si_camera_rust::{Result, SiError};
use tokio::io::{AsyncRead, AsyncReadExt, DuplexStream};
use tokio::sync::mpsc;

/// Connector handing the device end of every new connection to the test
pub struct DuplexConnector {
    peers: mpsc::UnboundedSender<DuplexStream>,
}

impl DuplexConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DuplexStream>) {
        let (peers, rx) = mpsc::unbounded_channel();
        (DuplexConnector { peers }, rx)
    }
}

impl Connector for DuplexConnector {
    type Stream = DuplexStream;

    async fn connect(&self) -> Result<DuplexStream> {
        let (client, device) = tokio::io::duplex(64 * 1024);
        self.peers
            .send(device)
            .map_err(|_| SiError::Io(std::io::ErrorKind::ConnectionRefused.into()))?;
        Ok(client)
    }
}

/// Read one command packet; `None` once the client hung up
pub async fn read_command<S: AsyncRead + Unpin>(stream: &mut S) -> Option<(u16, Vec<u8>)> {
    let mut header = [0u8; 6];
    stream.read_exact(&mut header).await.ok()?;
    assert_eq!(header[4], 128, "expected a command packet");

    let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let mut body = vec![0u8; length - 6];
    stream.read_exact(&mut body).await.ok()?;

    let func_number = u16::from_be_bytes([body[0], body[1]]);
    Some((func_number, body[2..].to_vec()))
}

pub fn ack(accept: bool) -> Vec<u8> {
    vec![0, 0, 0, 8, 129, 0, 0, accept as u8]
}

pub fn data_with_error(err_code: i32, data_type: u16, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16 + payload.len());
    buf.extend_from_slice(&((16 + payload.len()) as u32).to_be_bytes());
    buf.extend_from_slice(&[131, 0]);
    buf.extend_from_slice(&err_code.to_be_bytes());
    buf.extend_from_slice(&data_type.to_be_bytes());
    buf.extend_from_slice(&(payload.len() as i32).to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

pub fn data(data_type: u16, payload: &[u8]) -> Vec<u8> {
    data_with_error(0, data_type, payload)
}

pub fn done(func_number: u16) -> Vec<u8> {
    data(2007, &func_number.to_be_bytes())
}

/// 2004 record in its 8-byte form, without the trailing acquiring word
pub fn acquisition_status(exp_done: u16, readout_done: u16) -> Vec<u8> {
    let mut payload = Vec::with_capacity(8);
    payload.extend_from_slice(&exp_done.to_be_bytes());
    payload.extend_from_slice(&readout_done.to_be_bytes());
    payload.extend_from_slice(&0u32.to_be_bytes());
    data(2004, &payload)
}

/// Split `pixels` into `fragments` Image packets
pub fn image(width: u16, height: u16, pixels: &[u16], fragments: usize) -> Vec<u8> {
    let per_fragment = pixels.len().div_ceil(fragments);
    let mut buf = Vec::new();
    for chunk in pixels.chunks(per_fragment) {
        let img_bytes = (chunk.len() * 2) as u32;
        buf.extend_from_slice(&(16 + img_bytes).to_be_bytes());
        buf.extend_from_slice(&[132, 0]);
        buf.extend_from_slice(&img_bytes.to_be_bytes());
        buf.extend_from_slice(&(fragments as u16).to_be_bytes());
        buf.extend_from_slice(&width.to_be_bytes());
        buf.extend_from_slice(&height.to_be_bytes());
        for sample in chunk {
            buf.extend_from_slice(&sample.to_be_bytes());
        }
    }
    buf
}
