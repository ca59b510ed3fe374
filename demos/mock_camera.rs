//! Simulated SI camera server
//!
//! Speaks enough of the camera protocol to exercise the client: exposure
//! progress follows the wall clock and images are a synthetic gradient sent
//! in several fragments.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example mock_camera -- 127.0.0.1:2055
//!
//! # Then, in another terminal
//! cargo run --example acquire -- 127.0.0.1:2055
//! ```

use bytes::{BufMut, BytesMut};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

const WIDTH: u16 = 64;
const HEIGHT: u16 = 48;
const FRAGMENTS: u16 = 4;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_target(false)
        .init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:2055".to_string());

    if let Err(e) = serve(&addr).await {
        eprintln!("[ERROR] {}", e);
        std::process::exit(1);
    }
}

async fn serve(addr: &str) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = addr, "Mock camera listening");

    loop {
        let (socket, peer) = listener.accept().await?;
        info!(peer = %peer, "Client connected");
        tokio::spawn(async move {
            if let Err(e) = session(socket).await {
                warn!(error = %e, "Session ended with error");
            }
            info!(peer = %peer, "Client disconnected");
        });
    }
}

struct Camera {
    exposure: Duration,
    started: Option<Instant>,
    done_sent: bool,
}

async fn session(mut socket: TcpStream) -> std::io::Result<()> {
    let mut camera = Camera {
        exposure: Duration::from_secs(1),
        started: None,
        done_sent: true,
    };

    loop {
        let mut header = [0u8; 6];
        if socket.read_exact(&mut header).await.is_err() {
            return Ok(());
        }
        let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let mut body = vec![0u8; length.saturating_sub(6)];
        socket.read_exact(&mut body).await?;
        if body.len() < 2 {
            warn!("Command without function number");
            continue;
        }

        let func = u16::from_be_bytes([body[0], body[1]]);
        let params = &body[2..];
        info!(func_number = func, "Command received");

        socket.write_all(&ack(true)).await?;
        match func {
            1035 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&params[..8]);
                camera.exposure = Duration::from_secs_f64(f64::from_be_bytes(raw).max(0.0));
                socket.write_all(&done(func)).await?;
            }
            1037 => {
                camera.started = Some(Instant::now());
                camera.done_sent = false;
            }
            1018 => {
                camera.started = None;
                socket.write_all(&done(func)).await?;
            }
            1017 => {
                let percent = match camera.started {
                    Some(started) if !camera.exposure.is_zero() => {
                        let ratio = started.elapsed().as_secs_f64() / camera.exposure.as_secs_f64();
                        (ratio * 100.0).min(100.0) as u16
                    }
                    _ => 100,
                };
                socket.write_all(&acquisition_status(percent)).await?;
                if percent >= 100 && !camera.done_sent {
                    camera.done_sent = true;
                    socket.write_all(&done(1037)).await?;
                }
            }
            1011 => {
                let mut words = BytesMut::with_capacity(64);
                for word in [173u32, 290, 1, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0] {
                    words.put_u32(word);
                }
                socket.write_all(&data(2002, &words)).await?;
            }
            1024 => {
                let header = format!(
                    "SIMPLE  = T\nBITPIX  = 16\nNAXIS1  = {}\nNAXIS2  = {}\0",
                    WIDTH, HEIGHT
                );
                socket.write_all(&data(2006, header.as_bytes())).await?;
            }
            1019 => socket.write_all(&image()).await?,
            _ => socket.write_all(&done(func)).await?,
        }
    }
}

fn ack(accept: bool) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(8);
    buf.put_u32(8);
    buf.put_u8(129);
    buf.put_u8(0);
    buf.put_u16(accept as u16);
    buf.to_vec()
}

fn data(data_type: u16, payload: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(16 + payload.len());
    buf.put_u32((16 + payload.len()) as u32);
    buf.put_u8(131);
    buf.put_u8(0);
    buf.put_i32(0);
    buf.put_u16(data_type);
    buf.put_i32(payload.len() as i32);
    buf.put_slice(payload);
    buf.to_vec()
}

fn done(func_number: u16) -> Vec<u8> {
    data(2007, &func_number.to_be_bytes())
}

fn acquisition_status(percent: u16) -> Vec<u8> {
    let mut payload = BytesMut::with_capacity(10);
    payload.put_u16(percent);
    payload.put_u16(if percent >= 100 { 100 } else { 0 });
    payload.put_u32(0);
    payload.put_u16((percent < 100) as u16);
    data(2004, &payload)
}

fn image() -> Vec<u8> {
    let total = WIDTH as usize * HEIGHT as usize;
    let pixels: Vec<u16> = (0..total).map(|i| (i % 4096) as u16).collect();
    let per_fragment = total.div_ceil(FRAGMENTS as usize);

    let mut buf = BytesMut::new();
    for chunk in pixels.chunks(per_fragment) {
        let img_bytes = (chunk.len() * 2) as u32;
        buf.put_u32(16 + img_bytes);
        buf.put_u8(132);
        buf.put_u8(0);
        buf.put_u32(img_bytes);
        buf.put_u16(FRAGMENTS);
        buf.put_u16(WIDTH);
        buf.put_u16(HEIGHT);
        for sample in chunk {
            buf.put_u16(*sample);
        }
    }
    buf.to_vec()
}
