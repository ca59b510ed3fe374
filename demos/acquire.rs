//! Acquire one image from an SI camera
//!
//! Cools the sensor, runs a timed exposure, then downloads the image and its
//! header.
//!
//! # Usage
//!
//! ```bash
//! # Against the simulator
//! cargo run --example mock_camera &
//! cargo run --example acquire -- 127.0.0.1:2055 2.0
//!
//! # With protocol-level logging
//! RUST_LOG=si_camera_rust=debug cargo run --example acquire -- 127.0.0.1:2055 2.0
//! ```

use si_camera_rust::client::ClientBuilder;
use si_camera_rust::io::ReconnectConfig;
use si_camera_rust::protocol::commands::{PixelFormat, SetCooler};
use si_camera_rust::Result;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    if let Err(e) = run().await {
        eprintln!("[ERROR] {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let addr = args.next().unwrap_or_else(|| "127.0.0.1:2055".to_string());
    let exposure: f64 = args
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(2.0);

    println!("=== SI Camera Acquisition ===\n");

    let client = ClientBuilder::new()
        .tcp(addr.as_str())
        .recv_buffer_size(4 * 1024 * 1024)
        .with_reconnect(ReconnectConfig::with_max_attempts(5))
        .reply_timeout(Duration::from_secs(300))
        .build();

    client.execute(&SetCooler { on: true }).await?;
    let status = client.status().await?;
    println!(
        "[STATUS] ccd={} backplate={} pressure={} shutter={}",
        status.ccd_temp(),
        status.backplate_temp(),
        status.chamber_pressure(),
        status.shutter_status()
    );

    println!("[ACQUIRE] Exposing for {:.1} s", exposure);
    let acquisition = client.set_exposure_and_acquire(exposure);
    let mut state = acquisition.subscribe();
    let watcher = tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let current = *state.borrow();
            println!("[STATE] {:?}", current);
            if current.is_terminal() {
                break;
            }
        }
    });
    acquisition.wait().await?;
    let _ = watcher.await;

    let image = client.retrieve_image(PixelFormat::U16).await?;
    let max = image.pixels.iter().copied().max().unwrap_or(0);
    println!(
        "[IMAGE] {}x{} pixels, max value {}",
        image.serial_length, image.parallel_length, max
    );

    let header = client.image_header(1).await?;
    println!("[HEADER]\n{}", header);

    client.shutdown().await;
    Ok(())
}
