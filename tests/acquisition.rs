//! Acquisition workflow tests against a simulated camera on paused time

mod common;

use common::{ack, acquisition_status, done, read_command, DuplexConnector};
use si_camera_rust::acquisition::AcquisitionState;
use si_camera_rust::client::{CameraClient, ClientBuilder};
use si_camera_rust::protocol::commands::SetCooler;
use si_camera_rust::SiError;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;

/// Simulated exposure behavior
#[derive(Clone, Copy, PartialEq)]
enum Exposure {
    /// Progress follows the clock
    Normal,
    /// Like `Normal`, but the completion notice is sent on its own as soon
    /// as the exposure ends, ahead of the next poll's reply
    EarlyNotice,
    /// Progress never passes 50 %
    Stuck,
}

/// Start a simulated camera; returns the client and the log of received
/// function numbers.
fn simulated_camera(behavior: Exposure) -> (CameraClient, Arc<Mutex<Vec<u16>>>) {
    let (connector, mut peers) = DuplexConnector::new();
    let client = ClientBuilder::new().connector(connector).build();
    let log = Arc::new(Mutex::new(Vec::new()));

    let device_log = log.clone();
    tokio::spawn(async move {
        let mut device = peers.recv().await.unwrap();
        let mut exposure = Duration::ZERO;
        let mut started = Instant::now();
        let mut notice_sent = true;

        while let Some((func, params)) = read_command(&mut device).await {
            device_log.lock().unwrap().push(func);

            let finished = started.elapsed() >= exposure;
            if behavior == Exposure::EarlyNotice && finished && !notice_sent {
                notice_sent = true;
                device.write_all(&done(1037)).await.unwrap();
            }
            device.write_all(&ack(true)).await.unwrap();

            match func {
                1035 => {
                    let seconds = f64::from_be_bytes(params[..8].try_into().unwrap());
                    exposure = Duration::from_secs_f64(seconds);
                    device.write_all(&done(func)).await.unwrap();
                }
                1037 => {
                    started = Instant::now();
                    notice_sent = false;
                }
                1018 => {
                    // The aborted acquisition reports before the terminate does
                    device.write_all(&done(1037)).await.unwrap();
                    device.write_all(&done(1018)).await.unwrap();
                    notice_sent = true;
                }
                1017 => {
                    let percent = match behavior {
                        Exposure::Stuck => 50,
                        _ => {
                            let ratio = started.elapsed().as_secs_f64() / exposure.as_secs_f64();
                            (ratio * 100.0).min(100.0) as u16
                        }
                    };
                    device
                        .write_all(&acquisition_status(percent, 0))
                        .await
                        .unwrap();
                    if percent >= 100 && !notice_sent {
                        notice_sent = true;
                        device.write_all(&done(1037)).await.unwrap();
                    }
                }
                _ => device.write_all(&done(func)).await.unwrap(),
            }
        }
    });

    (client, log)
}

#[tokio::test(start_paused = true)]
async fn test_short_exposure_polls_to_done() {
    let (client, log) = simulated_camera(Exposure::Normal);

    let acquisition = client.set_exposure_and_acquire(2.0);
    let state = acquisition.subscribe();
    let done = acquisition.wait().await.unwrap();

    assert_eq!(done.func_number, 1037);
    assert_eq!(*state.borrow(), AcquisitionState::Done);

    let log = log.lock().unwrap();
    assert_eq!(&log[..2], &[1035, 1037]);
    assert!(log[2..].iter().all(|&f| f == 1017));
    assert!(log.len() > 3, "expected several status polls");
}

#[tokio::test(start_paused = true)]
async fn test_long_exposure_abort_terminates() {
    let (client, log) = simulated_camera(Exposure::Normal);

    let acquisition = client.set_exposure_and_acquire(30.0);
    let state = acquisition.subscribe();
    let abort = acquisition.abort_handle();

    tokio::time::sleep(Duration::from_secs(5)).await;
    abort.abort();

    let result = acquisition.wait().await;
    assert!(matches!(result, Err(SiError::Aborted)));
    assert_eq!(*state.borrow(), AcquisitionState::Aborted);

    let log = log.lock().unwrap();
    assert_eq!(*log, vec![1035, 1037, 1018]);
}

#[tokio::test(start_paused = true)]
async fn test_commands_after_abort_get_their_own_results() {
    let (client, log) = simulated_camera(Exposure::Normal);

    let acquisition = client.set_exposure_and_acquire(30.0);
    let abort = acquisition.abort_handle();
    tokio::time::sleep(Duration::from_secs(5)).await;
    abort.abort();
    assert!(matches!(acquisition.wait().await, Err(SiError::Aborted)));

    let done = client.execute(&SetCooler { on: true }).await.unwrap();
    assert_eq!(done.into_done().unwrap().func_number, 1046);

    // A fresh acquisition is not satisfied by the aborted one's notice
    let started = Instant::now();
    let done = client.set_exposure_and_acquire(2.0).wait().await.unwrap();
    assert_eq!(done.func_number, 1037);
    assert!(started.elapsed() >= Duration::from_secs(2));

    let log = log.lock().unwrap();
    assert_eq!(&log[..4], &[1035, 1037, 1018, 1046]);
}

#[tokio::test(start_paused = true)]
async fn test_early_completion_notice_is_kept_for_readout() {
    let (client, log) = simulated_camera(Exposure::EarlyNotice);

    let acquisition = client.set_exposure_and_acquire(2.0);
    let state = acquisition.subscribe();
    let done = acquisition.wait().await.unwrap();

    assert_eq!(done.func_number, 1037);
    assert_eq!(*state.borrow(), AcquisitionState::Done);

    // Polling stays in step afterwards
    let status = client.acquisition_status().await.unwrap();
    assert!(status.is_exposure_done());
    assert!(log.lock().unwrap().iter().all(|&f| f != 1018));
}

#[tokio::test(start_paused = true)]
async fn test_long_exposure_completes_without_abort() {
    let (client, log) = simulated_camera(Exposure::Normal);
    let started = Instant::now();

    let done = client.set_exposure_and_acquire(30.0).wait().await.unwrap();
    assert_eq!(done.func_number, 1037);

    // Polling starts only once the abortable window has passed
    assert!(started.elapsed() >= Duration::from_secs(30));
    let log = log.lock().unwrap();
    assert!(!log.contains(&1018));
    assert!(log.iter().any(|&f| f == 1017));
}

#[tokio::test(start_paused = true)]
async fn test_stuck_exposure_times_out() {
    let (client, _log) = simulated_camera(Exposure::Stuck);
    let started = Instant::now();

    let acquisition = client.set_exposure_and_acquire(30.0);
    let state = acquisition.subscribe();
    let result = acquisition.wait().await;

    assert!(matches!(result, Err(SiError::Timeout(_))));
    assert_eq!(*state.borrow(), AcquisitionState::TimedOut);
    assert!(started.elapsed() > Duration::from_secs(40));
}

#[tokio::test(start_paused = true)]
async fn test_abort_after_window_is_ignored() {
    let (client, log) = simulated_camera(Exposure::Normal);

    let acquisition = client.set_exposure_and_acquire(30.0);
    let abort = acquisition.abort_handle();

    // The abortable window closes at 20 s
    tokio::time::sleep(Duration::from_secs(25)).await;
    abort.abort();

    let done = acquisition.wait().await.unwrap();
    assert_eq!(done.func_number, 1037);
    assert!(!log.lock().unwrap().contains(&1018));
}

#[tokio::test(start_paused = true)]
async fn test_rejected_acquire() {
    let (connector, mut peers) = DuplexConnector::new();
    let client = ClientBuilder::new().connector(connector).build();

    tokio::spawn(async move {
        let mut device = peers.recv().await.unwrap();
        while let Some((func, _)) = read_command(&mut device).await {
            if func == 1037 {
                device.write_all(&ack(false)).await.unwrap();
            } else {
                device.write_all(&ack(true)).await.unwrap();
                device.write_all(&done(func)).await.unwrap();
            }
        }
    });

    let acquisition = client.set_exposure_and_acquire(1.0);
    let state = acquisition.subscribe();
    let result = acquisition.wait().await;

    assert!(matches!(result, Err(SiError::Rejected { func_number: 1037 })));
    assert_eq!(*state.borrow(), AcquisitionState::Rejected);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_terminate_still_aborts() {
    let (connector, mut peers) = DuplexConnector::new();
    let client = ClientBuilder::new().connector(connector).build();

    tokio::spawn(async move {
        let mut device = peers.recv().await.unwrap();
        while let Some((func, _)) = read_command(&mut device).await {
            match func {
                1018 => device.write_all(&ack(false)).await.unwrap(),
                1037 => device.write_all(&ack(true)).await.unwrap(),
                _ => {
                    device.write_all(&ack(true)).await.unwrap();
                    device.write_all(&done(func)).await.unwrap();
                }
            }
        }
    });

    let acquisition = client.set_exposure_and_acquire(30.0);
    let state = acquisition.subscribe();
    let abort = acquisition.abort_handle();
    tokio::time::sleep(Duration::from_secs(1)).await;
    abort.abort();

    assert!(matches!(acquisition.wait().await, Err(SiError::Aborted)));
    assert_eq!(*state.borrow(), AcquisitionState::Aborted);

    let done = client.execute(&SetCooler { on: false }).await.unwrap();
    assert_eq!(done.into_done().unwrap().func_number, 1046);
}

#[tokio::test]
async fn test_negative_exposure_rejected_locally() {
    let (connector, _peers) = DuplexConnector::new();
    let client = ClientBuilder::new().connector(connector).build();

    let result = client.set_exposure_and_acquire(-1.0).wait().await;
    assert!(matches!(result, Err(SiError::InvalidParameter(_))));
}
